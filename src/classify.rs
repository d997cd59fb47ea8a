use chrono::{DateTime, Utc};
use regex::Regex;

use crate::models::EmailMessage;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    Applied,
    Rejected,
    NotRelevant,
}

pub const REJECTION_PHRASES: &[&str] = &[
    "regret to inform",
    "decided not to move forward",
    "unfortunately we will not be moving forward",
    "will not be moving forward",
    "after careful consideration",
    "pursue other candidates",
    "not been selected",
    "position has been filled",
];

pub const CONFIRMATION_PHRASES: &[&str] = &[
    "application received",
    "thank you for applying",
    "thanks for applying",
    "we received your application",
    "your application has been submitted",
    "your application was sent",
];

struct PhraseRule {
    classification: Classification,
    phrases: &'static [&'static str],
}

// Rejection before confirmation: a "thanks for applying, unfortunately..."
// message is a rejection.
const RULES: &[PhraseRule] = &[
    PhraseRule {
        classification: Classification::Rejected,
        phrases: REJECTION_PHRASES,
    },
    PhraseRule {
        classification: Classification::Applied,
        phrases: CONFIRMATION_PHRASES,
    },
];

/// Case-insensitive substring match over subject and body; the first rule
/// with any matching phrase wins.
pub fn classify_text(subject: &str, body: &str) -> Classification {
    let haystack = format!("{}\n{}", subject, body).to_lowercase();
    for rule in RULES {
        if rule.phrases.iter().any(|p| haystack.contains(p)) {
            return rule.classification;
        }
    }
    Classification::NotRelevant
}

#[derive(Debug, Clone)]
pub struct ClassifiedMessage {
    pub classification: Classification,
    pub company: String,
    pub role_title: String,
    pub sender: String,
    pub snippet: String,
    pub date: DateTime<Utc>,
}

/// Classify one message and extract its key fields. Returns None for
/// messages matching neither phrase set; those never touch the table.
pub fn classify_message(message: &EmailMessage) -> Option<ClassifiedMessage> {
    let classification = classify_text(&message.subject, &message.snippet);
    if classification == Classification::NotRelevant {
        return None;
    }

    let (company, role_title) = extract_company_role(&message.subject);
    // When no company could be parsed the sender address keys the row, so a
    // rescan of the same message lands on the same row.
    let company = company
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| message.sender.clone());

    Some(ClassifiedMessage {
        classification,
        company,
        role_title: role_title.unwrap_or_default(),
        sender: message.sender.clone(),
        snippet: message.snippet.clone(),
        date: message.date,
    })
}

/// Keys compare lowercased with runs of whitespace collapsed.
pub fn normalize_key(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Best-effort (company, role) extraction from a subject line. Either side
/// may come back None; callers must not assume any particular parse worked.
pub fn extract_company_role(subject: &str) -> (Option<String>, Option<String>) {
    let subject = clean_subject(subject);

    // "Thank you for applying to Acme Corp — Software Engineer"
    if let Ok(re) = Regex::new(
        r"(?i)(?:thank(?:s| you) for applying|received your application|your application(?: has been)?(?: submitted| received)?)\s+(?:to|at|for|with)\s+(.+)",
    ) {
        if let Some(cap) = re.captures(&subject) {
            return split_company_role(cap[1].trim());
        }
    }

    // "Update on your Acme Corp application"
    if let Ok(re) = Regex::new(r"(?i)your\s+(.+?)\s+application") {
        if let Some(cap) = re.captures(&subject) {
            let company = cap[1].trim();
            if !company.is_empty() {
                return (Some(company.to_string()), None);
            }
        }
    }

    // "Software Engineer at Acme Corp"
    if let Ok(re) = Regex::new(r"(?i)\s+at\s+") {
        if let Some(m) = re.find(&subject) {
            let role = subject[..m.start()].trim();
            let company = subject[m.end()..].trim();
            if !role.is_empty() && !company.is_empty() && company.len() < 50 {
                return (Some(company.to_string()), Some(role.to_string()));
            }
        }
    }

    (None, None)
}

fn clean_subject(subject: &str) -> String {
    let mut s = subject.trim();
    loop {
        let lower = s.to_lowercase();
        if lower.starts_with("re:") || lower.starts_with("fw:") {
            s = s[3..].trim_start();
        } else if lower.starts_with("fwd:") {
            s = s[4..].trim_start();
        } else {
            break;
        }
    }
    s.to_string()
}

/// Split the remainder of a confirmation subject into (company, role).
/// "Acme Corp — Software Engineer" puts the company first; "Software
/// Engineer at Acme Corp" puts it last.
fn split_company_role(rest: &str) -> (Option<String>, Option<String>) {
    let rest = rest.trim().trim_end_matches(['.', '!']);

    for sep in [" — ", " – ", " - ", ": ", " | "] {
        if let Some(idx) = rest.find(sep) {
            let company = rest[..idx].trim();
            let role = rest[idx + sep.len()..].trim();
            if !company.is_empty() && !role.is_empty() {
                return (Some(company.to_string()), Some(role.to_string()));
            }
        }
    }

    if let Ok(re) = Regex::new(r"(?i)^(?:the\s+)?(.+?)(?:\s+(?:role|position|opening))?\s+at\s+(.+)$") {
        if let Some(cap) = re.captures(rest) {
            let role = cap[1].trim().to_string();
            let company = cap[2].trim().to_string();
            if !role.is_empty() && !company.is_empty() {
                return (Some(company), Some(role));
            }
        }
    }

    if rest.is_empty() {
        (None, None)
    } else {
        (Some(rest.to_string()), None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_confirmation() {
        assert_eq!(
            classify_text("Thank you for applying to Acme Corp", ""),
            Classification::Applied
        );
        assert_eq!(
            classify_text("Hello", "We received your application and will be in touch."),
            Classification::Applied
        );
    }

    #[test]
    fn test_classify_rejection() {
        assert_eq!(
            classify_text("Update on your application", "We regret to inform you that..."),
            Classification::Rejected
        );
        assert_eq!(
            classify_text(
                "Acme Corp application",
                "After careful consideration, we have decided to pursue other candidates."
            ),
            Classification::Rejected
        );
    }

    #[test]
    fn test_classify_is_case_insensitive() {
        assert_eq!(
            classify_text("THANK YOU FOR APPLYING", ""),
            Classification::Applied
        );
        assert_eq!(
            classify_text("", "WE REGRET TO INFORM YOU"),
            Classification::Rejected
        );
    }

    #[test]
    fn test_rejection_wins_over_confirmation() {
        // Both phrase sets present in one message: the rejection rule runs first.
        assert_eq!(
            classify_text(
                "Thanks for applying to Acme",
                "Thank you for applying. Unfortunately we will not be moving forward."
            ),
            Classification::Rejected
        );
    }

    #[test]
    fn test_classify_not_relevant() {
        assert_eq!(
            classify_text("Weekly newsletter", "Ten jobs you might like"),
            Classification::NotRelevant
        );
        assert_eq!(classify_text("", ""), Classification::NotRelevant);
    }

    #[test]
    fn test_extract_confirmation_with_dash() {
        let (company, role) =
            extract_company_role("Thank you for applying to Acme Corp — Software Engineer");
        assert_eq!(company.as_deref(), Some("Acme Corp"));
        assert_eq!(role.as_deref(), Some("Software Engineer"));
    }

    #[test]
    fn test_extract_confirmation_hyphen_and_colon() {
        let (company, role) =
            extract_company_role("Your application to Initech - Staff Engineer");
        assert_eq!(company.as_deref(), Some("Initech"));
        assert_eq!(role.as_deref(), Some("Staff Engineer"));

        let (company, role) =
            extract_company_role("We received your application for Globex: Data Analyst");
        assert_eq!(company.as_deref(), Some("Globex"));
        assert_eq!(role.as_deref(), Some("Data Analyst"));
    }

    #[test]
    fn test_extract_confirmation_role_at_company() {
        let (company, role) =
            extract_company_role("Thank you for applying for the Software Engineer role at Acme");
        assert_eq!(company.as_deref(), Some("Acme"));
        assert_eq!(role.as_deref(), Some("Software Engineer"));
    }

    #[test]
    fn test_extract_company_only() {
        let (company, role) = extract_company_role("Thanks for applying to Hooli");
        assert_eq!(company.as_deref(), Some("Hooli"));
        assert_eq!(role, None);
    }

    #[test]
    fn test_extract_your_company_application() {
        let (company, role) = extract_company_role(
            "Update on your Acme Corp application — we have decided not to move forward",
        );
        assert_eq!(company.as_deref(), Some("Acme Corp"));
        assert_eq!(role, None);
    }

    #[test]
    fn test_extract_role_at_company_subject() {
        let (company, role) = extract_company_role("Software Engineer at Acme Corp");
        assert_eq!(company.as_deref(), Some("Acme Corp"));
        assert_eq!(role.as_deref(), Some("Software Engineer"));
    }

    #[test]
    fn test_extract_strips_reply_prefixes() {
        let (company, role) =
            extract_company_role("Re: Fwd: Thank you for applying to Acme Corp — SRE");
        assert_eq!(company.as_deref(), Some("Acme Corp"));
        assert_eq!(role.as_deref(), Some("SRE"));
    }

    #[test]
    fn test_extract_unparseable() {
        let (company, role) = extract_company_role("Interview availability");
        assert_eq!(company, None);
        assert_eq!(role, None);
    }

    #[test]
    fn test_classify_message_sender_fallback() {
        let message = EmailMessage {
            sender: "no-reply@greenhouse.io".to_string(),
            subject: "Application received".to_string(),
            snippet: "Your application has been received.".to_string(),
            date: Utc::now(),
        };
        let classified = classify_message(&message).unwrap();
        assert_eq!(classified.classification, Classification::Applied);
        assert_eq!(classified.company, "no-reply@greenhouse.io");
        assert_eq!(classified.role_title, "");
    }

    #[test]
    fn test_classify_message_drops_not_relevant() {
        let message = EmailMessage {
            sender: "news@example.com".to_string(),
            subject: "Daily digest".to_string(),
            snippet: "Top stories today".to_string(),
            date: Utc::now(),
        };
        assert!(classify_message(&message).is_none());
    }

    #[test]
    fn test_normalize_key() {
        assert_eq!(normalize_key("  Acme   Corp "), "acme corp");
        assert_eq!(normalize_key("ACME Corp"), normalize_key("acme corp"));
        assert_eq!(normalize_key(""), "");
    }
}
