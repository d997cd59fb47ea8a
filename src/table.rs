use std::path::Path;

use anyhow::{Context, Result};

use crate::classify::{Classification, ClassifiedMessage, normalize_key};
use crate::models::{JobRow, Status};

/// The persisted table as an explicit value. Merging is a pure function of
/// (table, classified message) so repeated scans can be reasoned about
/// without file I/O.
#[derive(Debug, Default, Clone)]
pub struct JobTable {
    rows: Vec<JobRow>,
}

impl JobTable {
    pub fn from_rows(rows: Vec<JobRow>) -> Self {
        Self { rows }
    }

    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::Reader::from_path(path)
            .with_context(|| format!("Failed to open table: {}", path.display()))?;
        let mut rows = Vec::new();
        for record in reader.deserialize() {
            let row: JobRow =
                record.with_context(|| format!("Malformed row in {}", path.display()))?;
            rows.push(row);
        }
        Ok(Self { rows })
    }

    /// A missing file is an empty table; scans start from nothing.
    pub fn load_or_empty(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to write table: {}", path.display()))?;
        for row in &self.rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn rows(&self) -> &[JobRow] {
        &self.rows
    }

    pub fn into_rows(self) -> Vec<JobRow> {
        self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Merge one classified message into the table. Creates a row for an
    /// unseen key, otherwise appends the snippet (if new), advances the
    /// status monotonically and bumps the date range. Rows are never removed.
    pub fn merge(mut self, msg: &ClassifiedMessage) -> JobTable {
        // Should not reach here; NotRelevant messages are dropped upstream.
        if msg.classification == Classification::NotRelevant {
            return self;
        }
        match self.find_row(msg) {
            Some(idx) => merge_into(&mut self.rows[idx], msg),
            None => self.rows.push(new_row(msg)),
        }
        self
    }

    fn find_row(&self, msg: &ClassifiedMessage) -> Option<usize> {
        let company = normalize_key(&msg.company);
        let role = normalize_key(&msg.role_title);

        if let Some(idx) = self.rows.iter().position(|r| {
            normalize_key(&r.company) == company && normalize_key(&r.role_title) == role
        }) {
            return Some(idx);
        }

        // The role could not be parsed (rejections rarely repeat it): fold
        // into the row for this company if there is exactly one.
        if role.is_empty() {
            let matches: Vec<usize> = self
                .rows
                .iter()
                .enumerate()
                .filter(|(_, r)| normalize_key(&r.company) == company)
                .map(|(i, _)| i)
                .collect();
            if matches.len() == 1 {
                return Some(matches[0]);
            }
        }

        None
    }
}

fn new_row(msg: &ClassifiedMessage) -> JobRow {
    JobRow {
        company: msg.company.clone(),
        role_title: msg.role_title.clone(),
        status: match msg.classification {
            Classification::Applied => Status::Applied,
            Classification::Rejected => Status::Rejected,
            Classification::NotRelevant => Status::Unknown,
        },
        first_seen_date: msg.date,
        last_updated_date: msg.date,
        job_text: msg.snippet.clone(),
        job_description: None,
        summary: None,
        skills: None,
        salary: None,
    }
}

fn merge_into(row: &mut JobRow, msg: &ClassifiedMessage) {
    // Exact-substring check keeps repeat scans from duplicating snippets.
    if !msg.snippet.is_empty() && !row.job_text.contains(&msg.snippet) {
        if !row.job_text.is_empty() {
            row.job_text.push('\n');
        }
        row.job_text.push_str(&msg.snippet);
    }
    row.status = row.status.advance(msg.classification);
    if msg.date > row.last_updated_date {
        row.last_updated_date = msg.date;
    }
    if msg.date < row.first_seen_date {
        row.first_seen_date = msg.date;
    }
}
