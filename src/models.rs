use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::classify::Classification;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Status {
    Applied,
    Rejected,
    #[serde(other)]
    Unknown,
}

impl Status {
    /// Status only ever moves toward Rejected; a rejection is never
    /// downgraded by a later confirmation.
    pub fn advance(self, incoming: Classification) -> Status {
        match incoming {
            Classification::Rejected => Status::Rejected,
            Classification::Applied => match self {
                Status::Rejected => Status::Rejected,
                _ => Status::Applied,
            },
            Classification::NotRelevant => self,
        }
    }
}

impl std::fmt::Display for Status {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Status::Applied => write!(f, "Applied"),
            Status::Rejected => write!(f, "Rejected"),
            Status::Unknown => write!(f, "Unknown"),
        }
    }
}

/// One tracked application. Field order is the CSV column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobRow {
    pub company: String,
    pub role_title: String,
    pub status: Status,
    pub first_seen_date: DateTime<Utc>,
    pub last_updated_date: DateTime<Utc>,
    pub job_text: String,
    pub job_description: Option<String>, // user-supplied, never written by the tool
    pub summary: Option<String>,
    pub skills: Option<String>, // ", "-joined list
    pub salary: Option<String>,
}

impl JobRow {
    pub fn has_summary(&self) -> bool {
        self.summary
            .as_deref()
            .is_some_and(|s| !s.trim().is_empty())
    }
}

/// One message as returned by the mailbox search.
#[derive(Debug, Clone)]
pub struct EmailMessage {
    pub sender: String, // bare address, lowercased
    pub subject: String,
    pub snippet: String,
    pub date: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_advance_monotone() {
        assert_eq!(Status::Unknown.advance(Classification::Applied), Status::Applied);
        assert_eq!(Status::Applied.advance(Classification::Rejected), Status::Rejected);
        assert_eq!(Status::Unknown.advance(Classification::Rejected), Status::Rejected);

        // A rejection sticks.
        assert_eq!(Status::Rejected.advance(Classification::Applied), Status::Rejected);
        assert_eq!(Status::Rejected.advance(Classification::Rejected), Status::Rejected);
    }

    #[test]
    fn test_status_advance_not_relevant_is_noop() {
        assert_eq!(Status::Applied.advance(Classification::NotRelevant), Status::Applied);
        assert_eq!(Status::Rejected.advance(Classification::NotRelevant), Status::Rejected);
        assert_eq!(Status::Unknown.advance(Classification::NotRelevant), Status::Unknown);
    }
}
