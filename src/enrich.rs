use std::env;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::models::JobRow;

// --- Provider trait ---

pub trait CompletionProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String>;
    #[allow(dead_code)]
    fn model_name(&self) -> &str;
}

#[derive(Debug, Clone)]
pub enum ProviderKind {
    Anthropic,
    OpenAI,
}

#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub provider: ProviderKind,
    pub model_id: String,
    pub short_name: String,
}

pub fn resolve_model(name: &str) -> Result<ModelSpec> {
    match name {
        // Anthropic (requires ANTHROPIC_API_KEY)
        "sonnet" | "claude-sonnet" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-sonnet-4-5-20250929".to_string(),
            short_name: "sonnet".to_string(),
        }),
        "opus" | "claude-opus" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-opus-4-6".to_string(),
            short_name: "opus".to_string(),
        }),
        "haiku" | "claude-haiku" => Ok(ModelSpec {
            provider: ProviderKind::Anthropic,
            model_id: "claude-haiku-4-5-20251001".to_string(),
            short_name: "haiku".to_string(),
        }),
        // OpenAI (requires OPENAI_API_KEY)
        "gpt-5.2" | "gpt5" => Ok(ModelSpec {
            provider: ProviderKind::OpenAI,
            model_id: "gpt-5.2".to_string(),
            short_name: "gpt-5.2".to_string(),
        }),
        "gpt-4o" => Ok(ModelSpec {
            provider: ProviderKind::OpenAI,
            model_id: "gpt-4o".to_string(),
            short_name: "gpt-4o".to_string(),
        }),
        _ => Err(anyhow!(
            "Unknown model '{}'. Available: sonnet (default), opus, haiku, gpt-5.2, gpt-4o",
            name
        )),
    }
}

pub fn create_provider(spec: &ModelSpec) -> Result<Box<dyn CompletionProvider>> {
    match spec.provider {
        ProviderKind::Anthropic => Ok(Box::new(AnthropicProvider::new(spec.model_id.clone())?)),
        ProviderKind::OpenAI => Ok(Box::new(OpenAIProvider::new(spec.model_id.clone())?)),
    }
}

fn http_client() -> Result<reqwest::blocking::Client> {
    reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(60))
        .build()
        .context("Failed to build HTTP client")
}

// --- Anthropic provider ---

const ANTHROPIC_API_URL: &str = "https://api.anthropic.com/v1/messages";

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<AnthropicMessage>,
}

#[derive(Debug, Deserialize)]
struct AnthropicContentBlock {
    #[allow(dead_code)]
    #[serde(rename = "type")]
    content_type: String,
    text: String,
}

#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<AnthropicContentBlock>,
}

#[derive(Debug)]
pub struct AnthropicProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl AnthropicProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("ANTHROPIC_API_KEY")
            .context("ANTHROPIC_API_KEY environment variable not set. Set it with: export ANTHROPIC_API_KEY=your-key-here")?;
        Ok(Self {
            api_key,
            model_id,
            client: http_client()?,
        })
    }
}

impl CompletionProvider for AnthropicProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = AnthropicRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![AnthropicMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(ANTHROPIC_API_URL)
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("content-type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to Anthropic API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "Anthropic API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: AnthropicResponse = response
            .json()
            .context("Failed to parse Anthropic API response")?;

        api_response
            .content
            .first()
            .map(|block| block.text.clone())
            .ok_or_else(|| anyhow!("No content in Anthropic API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- OpenAI provider ---

const OPENAI_API_URL: &str = "https://api.openai.com/v1/chat/completions";

#[derive(Debug, Serialize)]
struct OpenAIMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct OpenAIRequest {
    model: String,
    max_tokens: u32,
    messages: Vec<OpenAIMessage>,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponseMessage {
    content: String,
}

#[derive(Debug, Deserialize)]
struct OpenAIChoice {
    message: OpenAIResponseMessage,
}

#[derive(Debug, Deserialize)]
struct OpenAIResponse {
    choices: Vec<OpenAIChoice>,
}

#[derive(Debug)]
pub struct OpenAIProvider {
    api_key: String,
    model_id: String,
    client: reqwest::blocking::Client,
}

impl OpenAIProvider {
    pub fn new(model_id: String) -> Result<Self> {
        let api_key = env::var("OPENAI_API_KEY")
            .context("OPENAI_API_KEY environment variable not set. Set it with: export OPENAI_API_KEY=your-key-here")?;
        Ok(Self {
            api_key,
            model_id,
            client: http_client()?,
        })
    }
}

impl CompletionProvider for OpenAIProvider {
    fn complete(&self, prompt: &str, max_tokens: u32) -> Result<String> {
        let request = OpenAIRequest {
            model: self.model_id.clone(),
            max_tokens,
            messages: vec![OpenAIMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
        };

        let response = self
            .client
            .post(OPENAI_API_URL)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .context("Failed to send request to OpenAI API")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().unwrap_or_default();
            return Err(anyhow!(
                "OpenAI API request failed with status {}: {}",
                status,
                error_text
            ));
        }

        let api_response: OpenAIResponse = response
            .json()
            .context("Failed to parse OpenAI API response")?;

        api_response
            .choices
            .first()
            .map(|choice| choice.message.content.clone())
            .ok_or_else(|| anyhow!("No choices in OpenAI API response"))
    }

    fn model_name(&self) -> &str {
        &self.model_id
    }
}

// --- Enrichment ---

#[derive(Debug, Clone, Deserialize)]
pub struct Enrichment {
    pub summary: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default = "unknown_salary")]
    pub salary: String,
}

fn unknown_salary() -> String {
    "unknown".to_string()
}

fn input_text(row: &JobRow) -> String {
    let mut text = String::new();
    if let Some(description) = row.job_description.as_deref() {
        if !description.trim().is_empty() {
            text.push_str(description.trim());
        }
    }
    if !row.job_text.trim().is_empty() {
        if !text.is_empty() {
            text.push_str("\n\n");
        }
        text.push_str(row.job_text.trim());
    }
    text
}

pub fn build_prompt(row: &JobRow) -> String {
    format!(
        "You are helping track job applications.\n\n\
        Job title: {}\n\
        Company: {}\n\n\
        Here is some text related to the job (from the description, notes, or emails):\n\
        ---\n\
        {}\n\
        ---\n\n\
        1) Write a single-sentence summary of what this job is about. Maximum 25 words.\n\
        2) List 3-8 key skills or keywords the role seems to care about.\n\
        3) If a salary or salary range is mentioned, extract it as a short string\n\
           (for example: \"$30-35/hr\" or \"$95k-115k + bonus\"). If not mentioned, use \"unknown\".\n\n\
        Return ONLY a JSON object with this exact structure:\n\
        {{\"summary\": \"one-line summary here\", \"skills\": [\"Skill1\", \"Skill2\", \"Skill3\"], \"salary\": \"salary or 'unknown'\"}}",
        row.role_title, row.company, input_text(row)
    )
}

pub fn parse_enrichment(response: &str) -> Result<Enrichment> {
    let json = extract_json(response);
    let mut enrichment: Enrichment =
        serde_json::from_str(json).context("Model response was not the expected JSON object")?;

    enrichment.skills = enrichment
        .skills
        .into_iter()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .take(8)
        .collect();

    if enrichment.salary.trim().is_empty() {
        enrichment.salary = unknown_salary();
    }

    Ok(enrichment)
}

// Tolerates code fences and prose around the object.
fn extract_json(text: &str) -> &str {
    match (text.find('{'), text.rfind('}')) {
        (Some(start), Some(end)) if start < end => &text[start..=end],
        _ => text.trim(),
    }
}

#[derive(Debug, Default)]
pub struct EnrichStats {
    pub enriched: usize,
    pub skipped: usize,
    pub failed: usize,
}

/// Fill in summary/skills/salary for rows that lack them (all rows with
/// `force`). A failed row keeps whatever it had and the batch continues.
/// Status and dates are never touched.
pub fn enrich_rows(
    provider: &dyn CompletionProvider,
    rows: &mut [JobRow],
    force: bool,
) -> EnrichStats {
    let mut stats = EnrichStats::default();

    for row in rows.iter_mut() {
        if row.has_summary() && !force {
            stats.skipped += 1;
            continue;
        }
        if input_text(row).is_empty() {
            stats.skipped += 1;
            continue;
        }

        println!("Summarizing: {} - {} ...", row.company, row.role_title);
        match summarize_row(provider, row) {
            Ok(enrichment) => {
                row.summary = Some(enrichment.summary);
                row.skills = Some(enrichment.skills.join(", "));
                row.salary = Some(enrichment.salary);
                stats.enriched += 1;
            }
            Err(e) => {
                stats.failed += 1;
                eprintln!("  Error summarizing {} - {}: {}", row.company, row.role_title, e);
            }
        }
    }

    stats
}

fn summarize_row(provider: &dyn CompletionProvider, row: &JobRow) -> Result<Enrichment> {
    let response = provider.complete(&build_prompt(row), 1024)?;
    parse_enrichment(&response)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Status;
    use chrono::Utc;

    fn row(company: &str, role: &str, job_text: &str) -> JobRow {
        JobRow {
            company: company.to_string(),
            role_title: role.to_string(),
            status: Status::Applied,
            first_seen_date: Utc::now(),
            last_updated_date: Utc::now(),
            job_text: job_text.to_string(),
            job_description: None,
            summary: None,
            skills: None,
            salary: None,
        }
    }

    struct ScriptedProvider {
        fail_marker: String,
    }

    impl CompletionProvider for ScriptedProvider {
        fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<String> {
            if !self.fail_marker.is_empty() && prompt.contains(&self.fail_marker) {
                return Err(anyhow!("simulated timeout"));
            }
            Ok(r#"{"summary": "A backend role.", "skills": ["Rust", "SQL"], "salary": "unknown"}"#
                .to_string())
        }

        fn model_name(&self) -> &str {
            "scripted"
        }
    }

    #[test]
    fn test_resolve_model() {
        let spec = resolve_model("sonnet").unwrap();
        assert_eq!(spec.model_id, "claude-sonnet-4-5-20250929");
        assert!(matches!(spec.provider, ProviderKind::Anthropic));

        let spec = resolve_model("gpt-4o").unwrap();
        assert!(matches!(spec.provider, ProviderKind::OpenAI));

        assert!(resolve_model("gpt-3").is_err());
    }

    #[test]
    fn test_anthropic_provider_requires_api_key() {
        let original = env::var("ANTHROPIC_API_KEY").ok();
        unsafe {
            env::remove_var("ANTHROPIC_API_KEY");
        }

        let result = AnthropicProvider::new("claude-sonnet-4-5-20250929".to_string());

        if let Some(val) = original {
            unsafe {
                env::set_var("ANTHROPIC_API_KEY", val);
            }
        }

        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("ANTHROPIC_API_KEY"));
    }

    #[test]
    fn test_parse_enrichment_plain_json() {
        let enrichment = parse_enrichment(
            r#"{"summary": "Builds APIs.", "skills": ["Rust", "Postgres"], "salary": "$95k-115k"}"#,
        )
        .unwrap();
        assert_eq!(enrichment.summary, "Builds APIs.");
        assert_eq!(enrichment.skills, vec!["Rust", "Postgres"]);
        assert_eq!(enrichment.salary, "$95k-115k");
    }

    #[test]
    fn test_parse_enrichment_fenced_json() {
        let response = "```json\n{\"summary\": \"X.\", \"skills\": [\"Go\"], \"salary\": \"unknown\"}\n```";
        let enrichment = parse_enrichment(response).unwrap();
        assert_eq!(enrichment.summary, "X.");
        assert_eq!(enrichment.salary, "unknown");
    }

    #[test]
    fn test_parse_enrichment_cleans_skills_and_salary() {
        let response = r#"{"summary": "X.", "skills": [" Rust ", "", "a", "b", "c", "d", "e", "f", "g", "h"], "salary": "  "}"#;
        let enrichment = parse_enrichment(response).unwrap();
        assert_eq!(enrichment.skills.len(), 8);
        assert_eq!(enrichment.skills[0], "Rust");
        assert_eq!(enrichment.salary, "unknown");
    }

    #[test]
    fn test_parse_enrichment_rejects_garbage() {
        assert!(parse_enrichment("I could not determine anything.").is_err());
    }

    #[test]
    fn test_build_prompt_includes_description_and_text() {
        let mut r = row("Acme Corp", "SRE", "snippet text");
        r.job_description = Some("Keep the site up.".to_string());
        let prompt = build_prompt(&r);
        assert!(prompt.contains("Acme Corp"));
        assert!(prompt.contains("SRE"));
        assert!(prompt.contains("Keep the site up."));
        assert!(prompt.contains("snippet text"));
    }

    #[test]
    fn test_enrich_rows_populates_fields() {
        let provider = ScriptedProvider {
            fail_marker: String::new(),
        };
        let mut rows = vec![row("Acme", "SRE", "some text")];
        let stats = enrich_rows(&provider, &mut rows, false);

        assert_eq!(stats.enriched, 1);
        assert_eq!(rows[0].summary.as_deref(), Some("A backend role."));
        assert_eq!(rows[0].skills.as_deref(), Some("Rust, SQL"));
        assert_eq!(rows[0].salary.as_deref(), Some("unknown"));
    }

    #[test]
    fn test_enrich_rows_failure_is_isolated() {
        let provider = ScriptedProvider {
            fail_marker: "Initech".to_string(),
        };
        let mut rows = vec![
            row("Initech", "TPS Analyst", "flair required"),
            row("Acme", "SRE", "some text"),
        ];
        let before = rows[0].clone();
        let stats = enrich_rows(&provider, &mut rows, false);

        assert_eq!(stats.failed, 1);
        assert_eq!(stats.enriched, 1);
        // Failed row untouched, neighbor fully populated.
        assert_eq!(rows[0], before);
        assert!(rows[1].has_summary());
    }

    #[test]
    fn test_enrich_rows_skips_summarized_unless_forced() {
        let provider = ScriptedProvider {
            fail_marker: String::new(),
        };
        let mut rows = vec![row("Acme", "SRE", "some text")];
        rows[0].summary = Some("Already summarized.".to_string());

        let stats = enrich_rows(&provider, &mut rows, false);
        assert_eq!(stats.skipped, 1);
        assert_eq!(rows[0].summary.as_deref(), Some("Already summarized."));

        let stats = enrich_rows(&provider, &mut rows, true);
        assert_eq!(stats.enriched, 1);
        assert_eq!(rows[0].summary.as_deref(), Some("A backend role."));
    }

    #[test]
    fn test_enrich_rows_skips_empty_input() {
        let provider = ScriptedProvider {
            fail_marker: String::new(),
        };
        let mut rows = vec![row("Acme", "SRE", "")];
        let stats = enrich_rows(&provider, &mut rows, false);

        assert_eq!(stats.skipped, 1);
        assert!(rows[0].summary.is_none());
    }
}
