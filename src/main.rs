mod classify;
mod email;
mod enrich;
mod models;
mod table;

use std::path::{Path, PathBuf};

use anyhow::{Result, anyhow};
use clap::{Args, Parser, Subcommand};

use classify::classify_message;
use email::{MailConfig, MailScanner, ScanKind};
use enrich::{create_provider, enrich_rows, resolve_model};
use models::JobRow;
use table::JobTable;

#[derive(Parser)]
#[command(name = "apptrack")]
#[command(about = "Track job applications from your inbox into a CSV")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan for application confirmation emails
    ScanConfirmations(ScanArgs),

    /// Scan for rejection emails
    ScanRejections(ScanArgs),

    /// Scan for both confirmations and rejections
    ScanAll(ScanArgs),

    /// Summarize rows with a language model and write an enriched copy
    Enrich {
        /// Path to the input table
        #[arg(short, long, default_value = "jobs.csv")]
        input: PathBuf,

        /// Path to write the enriched table
        #[arg(short, long, default_value = "jobs_with_summaries.csv")]
        output: PathBuf,

        /// Model to use (sonnet, opus, haiku, gpt-5.2, gpt-4o)
        #[arg(short, long, default_value = "sonnet")]
        model: String,

        /// Re-summarize rows that already have a summary
        #[arg(long)]
        force: bool,
    },

    /// List tracked applications
    List {
        /// Filter by status (applied, rejected, unknown)
        #[arg(short, long)]
        status: Option<String>,

        /// Path to the jobs table
        #[arg(short, long, default_value = "jobs.csv")]
        table: PathBuf,
    },
}

#[derive(Args)]
struct ScanArgs {
    /// Mailbox address to scan
    #[arg(short, long)]
    username: String,

    /// Path to app password file
    #[arg(short, long, default_value = "~/.gmail.app_password.txt")]
    password_file: String,

    /// Number of days to look back
    #[arg(short, long, default_value = "365")]
    days: u32,

    /// Path to the jobs table
    #[arg(short, long, default_value = "jobs.csv")]
    table: PathBuf,

    /// Show what would be recorded without writing
    #[arg(long)]
    dry_run: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::ScanConfirmations(args) => run_scan(ScanKind::Confirmations, &args),
        Commands::ScanRejections(args) => run_scan(ScanKind::Rejections, &args),
        Commands::ScanAll(args) => run_scan(ScanKind::All, &args),
        Commands::Enrich {
            input,
            output,
            model,
            force,
        } => run_enrich(&input, &output, &model, force),
        Commands::List { status, table } => run_list(status.as_deref(), &table),
    }
}

fn run_scan(kind: ScanKind, args: &ScanArgs) -> Result<()> {
    let password_path = expand_home(&args.password_file);
    let config = MailConfig::from_password_file(&args.username, &password_path)?;

    let mut table = JobTable::load_or_empty(&args.table)?;
    let before = table.len();

    println!("Connecting to {} as {}...", config.server, args.username);
    let scanner = MailScanner::new(config);

    println!("Searching the last {} days...", args.days);
    let (messages, stats) = scanner.fetch_messages(kind, args.days)?;

    let mut classified_count = 0;
    let mut not_relevant = 0;
    for message in &messages {
        match classify_message(message) {
            Some(classified) => {
                classified_count += 1;
                if args.dry_run {
                    println!(
                        "[DRY RUN] Would record: {} - {} ({:?})",
                        classified.company, classified.role_title, classified.classification
                    );
                } else {
                    table = table.merge(&classified);
                }
            }
            None => not_relevant += 1,
        }
    }

    if !args.dry_run {
        table.save(&args.table)?;
    }

    println!("\nResults:");
    println!("  Emails found:  {}", stats.emails_found);
    println!("  Classified:    {}", classified_count);
    println!("  Not relevant:  {}", not_relevant);
    if !args.dry_run {
        println!("  New rows:      {}", table.len() - before);
    }
    if stats.errors > 0 {
        println!("  Errors:        {}", stats.errors);
    }

    if args.dry_run {
        println!("\n(Dry run - nothing was written)");
    } else {
        println!("Saved {} row(s) to {}", table.len(), args.table.display());
    }

    Ok(())
}

fn run_enrich(input: &Path, output: &Path, model: &str, force: bool) -> Result<()> {
    if !input.exists() {
        return Err(anyhow!("Input table not found: {}", input.display()));
    }

    // Any setup failure must happen before the output file is touched.
    let table = JobTable::load(input)?;
    let spec = resolve_model(model)?;
    let provider = create_provider(&spec)?;

    println!("Summarizing {} row(s) with {}...", table.len(), spec.short_name);
    let mut rows = table.into_rows();
    let stats = enrich_rows(provider.as_ref(), &mut rows, force);

    JobTable::from_rows(rows).save(output)?;

    println!(
        "\nDone. Enriched {} row(s), skipped {}, failed {}.",
        stats.enriched, stats.skipped, stats.failed
    );
    println!("Saved to: {}", output.display());
    Ok(())
}

fn run_list(status: Option<&str>, table_path: &Path) -> Result<()> {
    let table = JobTable::load_or_empty(table_path)?;
    let rows: Vec<&JobRow> = table
        .rows()
        .iter()
        .filter(|r| status.is_none_or(|s| r.status.to_string().eq_ignore_ascii_case(s)))
        .collect();

    if rows.is_empty() {
        println!("No jobs found.");
        return Ok(());
    }

    println!(
        "{:<25} {:<30} {:<10} {:<12}",
        "COMPANY", "ROLE", "STATUS", "UPDATED"
    );
    println!("{}", "-".repeat(79));
    for row in rows {
        println!(
            "{:<25} {:<30} {:<10} {:<12}",
            truncate(&row.company, 23),
            truncate(&row.role_title, 28),
            row.status.to_string(),
            row.last_updated_date.format("%Y-%m-%d").to_string()
        );
    }

    Ok(())
}

fn expand_home(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        let home = std::env::var("HOME").unwrap_or_default();
        PathBuf::from(home).join(rest)
    } else {
        PathBuf::from(path)
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        format!("{}...", &s[..max.saturating_sub(3)])
    }
}
