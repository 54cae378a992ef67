//! Solution filtering and fact extraction

use crate::source::HarvestCandidate;
use switchyard_common::models::{content_version, KnowledgeItem};

/// Id prefix for harvested facts in the target source
pub const FACT_ID_PREFIX: &str = "harvest-";

const REPLY_PREFIXES: &[&str] = &["re:", "fw:", "fwd:"];

/// Probable solution payload: any keyword appears in subject or body
pub fn is_probable_solution(candidate: &HarvestCandidate, keywords: &[String]) -> bool {
    let haystack = format!("{}\n{}", candidate.subject, candidate.body).to_lowercase();
    keywords
        .iter()
        .map(|k| k.trim().to_lowercase())
        .any(|k| !k.is_empty() && haystack.contains(&k))
}

/// Hex digits of the raw-id digest appended to every fact id
const FACT_ID_DIGEST_LEN: usize = 8;

/// Target item id for a candidate; stable across runs.
///
/// The readable part is the sanitized source id. A digest of the raw id keeps
/// ids that sanitize alike (`msg/42`, `msg_42`) apart.
pub fn fact_id(candidate: &HarvestCandidate) -> String {
    let raw = candidate.id.trim();
    let cleaned: String = raw
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
        .collect();
    let digest = content_version(raw);
    format!("{}{}-{}", FACT_ID_PREFIX, cleaned, &digest[..FACT_ID_DIGEST_LEN])
}

/// Build the fact record appended to the target source
pub fn extract_fact(candidate: &HarvestCandidate) -> KnowledgeItem {
    let mut item = KnowledgeItem::new(fact_id(candidate), clean_subject(&candidate.subject), clean_body(&candidate.body));
    item.updated_at = candidate.timestamp;
    item
}

fn clean_subject(subject: &str) -> String {
    let mut subject = subject.trim();
    loop {
        let lowered = subject.to_lowercase();
        match REPLY_PREFIXES.iter().find(|p| lowered.starts_with(*p)) {
            Some(prefix) => subject = subject[prefix.len()..].trim_start(),
            None => return subject.to_string(),
        }
    }
}

/// Drop quoted reply lines and collapse blank runs
fn clean_body(body: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    for line in body.lines().map(str::trim_end) {
        if line.trim_start().starts_with('>') {
            continue;
        }
        if line.trim().is_empty() && lines.last().map_or(true, |l| l.trim().is_empty()) {
            continue;
        }
        lines.push(line);
    }
    lines.join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn candidate(id: &str, subject: &str, body: &str) -> HarvestCandidate {
        HarvestCandidate {
            id: id.to_string(),
            subject: subject.to_string(),
            body: body.to_string(),
            timestamp: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    fn keywords() -> Vec<String> {
        vec!["resolved".to_string(), "workaround".to_string()]
    }

    #[test]
    fn test_solution_filter() {
        assert!(is_probable_solution(&candidate("1", "VPN issue RESOLVED", ""), &keywords()));
        assert!(is_probable_solution(&candidate("1", "VPN", "Workaround: reboot"), &keywords()));
        assert!(!is_probable_solution(&candidate("1", "VPN down?", "anyone else?"), &keywords()));
    }

    #[test]
    fn test_extract_fact() {
        let fact = extract_fact(&candidate(
            "msg/42@mail",
            "RE: Fwd: Printer offline",
            "Resolved by clearing the queue.\n\n\n> old quoted text\nThanks",
        ));
        assert!(fact.id.starts_with("harvest-msg_42_mail-"));
        assert_eq!(fact.id.len(), "harvest-msg_42_mail-".len() + FACT_ID_DIGEST_LEN);
        assert_eq!(fact.title, "Printer offline");
        assert_eq!(fact.body, "Resolved by clearing the queue.\n\nThanks");
        assert_eq!(fact.updated_at, Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap());
    }

    #[test]
    fn test_fact_id_keeps_similar_ids_apart() {
        let slash = fact_id(&candidate("msg/42", "a", "b"));
        let underscore = fact_id(&candidate("msg_42", "a", "b"));
        assert_ne!(slash, underscore);
        assert!(slash.starts_with("harvest-msg_42-"));
        assert!(underscore.starts_with("harvest-msg_42-"));

        // Stable across runs and insensitive to surrounding whitespace
        assert_eq!(fact_id(&candidate(" msg/42 ", "a", "b")), slash);
    }
}
