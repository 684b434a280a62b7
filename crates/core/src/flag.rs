//! Investigation flags raised by the parent application's security queue.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// The security daemon emits `info`, `warning` and `critical`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    #[default]
    Info,
    Low,
    Medium,
    Warning,
    High,
    Critical,
    /// Any severity this client does not know yet.
    #[serde(other)]
    Unknown,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "info",
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::Warning => "warning",
            Severity::High => "high",
            Severity::Critical => "critical",
            Severity::Unknown => "unknown",
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A flagged security finding handed to the chat for follow-up.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvestigationFlag {
    #[serde(deserialize_with = "deserialize_token")]
    pub id: String,
    #[serde(default)]
    pub severity: Severity,
    #[serde(default)]
    pub timestamp: String,
    #[serde(default)]
    pub summary: String,
    /// Stored as `event_ids` in the daemon's flag rows.
    #[serde(default, alias = "event_ids", deserialize_with = "deserialize_token_set")]
    pub related_event_ids: BTreeSet<String>,
    #[serde(default)]
    pub suggested_actions: Vec<String>,
}

/// Flag ids are integers in the server database but opaque tokens here.
#[derive(Deserialize)]
#[serde(untagged)]
enum Token {
    Text(String),
    Number(i64),
}

impl From<Token> for String {
    fn from(token: Token) -> Self {
        match token {
            Token::Text(s) => s,
            Token::Number(n) => n.to_string(),
        }
    }
}

fn deserialize_token<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    let token = Token::deserialize(deserializer)?;
    let id = String::from(token);
    if id.trim().is_empty() {
        return Err(de::Error::custom("flag id must not be empty"));
    }
    Ok(id)
}

fn deserialize_token_set<'de, D>(deserializer: D) -> Result<BTreeSet<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let tokens = Option::<Vec<Token>>::deserialize(deserializer)?;
    Ok(tokens
        .unwrap_or_default()
        .into_iter()
        .map(String::from)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_accepts_numeric_ids() {
        let json = r#"{
            "id": 42,
            "severity": "high",
            "timestamp": "2024-05-01T10:00:00Z",
            "summary": "Repeated SSH failures",
            "related_event_ids": [7, "8", 7],
            "suggested_actions": ["Block source IP"]
        }"#;
        let flag: InvestigationFlag = serde_json::from_str(json).unwrap();
        assert_eq!(flag.id, "42");
        assert_eq!(flag.severity, Severity::High);
        assert_eq!(flag.related_event_ids.len(), 2);
        assert!(flag.related_event_ids.contains("7"));
    }

    #[test]
    fn test_flag_defaults() {
        let flag: InvestigationFlag = serde_json::from_str(r#"{"id":"f-1"}"#).unwrap();
        assert_eq!(flag.severity, Severity::Info);
        assert!(flag.related_event_ids.is_empty());
        assert!(flag.suggested_actions.is_empty());
    }

    #[test]
    fn test_flag_from_daemon_row() {
        let json = r#"{
            "id": 3,
            "timestamp": "2024-05-01T10:00:00",
            "event_ids": [11, 12],
            "severity": "warning",
            "summary": "Port scan from 10.0.0.9",
            "suggested_actions": ["Check firewall logs"],
            "status": "pending"
        }"#;
        let flag: InvestigationFlag = serde_json::from_str(json).unwrap();
        assert_eq!(flag.id, "3");
        assert_eq!(flag.severity, Severity::Warning);
        assert_eq!(flag.severity.to_string(), "warning");
        assert_eq!(
            flag.related_event_ids,
            BTreeSet::from(["11".to_string(), "12".to_string()])
        );
        assert_eq!(flag.suggested_actions, vec!["Check firewall logs"]);
    }

    #[test]
    fn test_unrecognized_severity_keeps_flag() {
        let flag: InvestigationFlag =
            serde_json::from_str(r#"{"id": 9, "severity": "emergency", "summary": "x"}"#).unwrap();
        assert_eq!(flag.severity, Severity::Unknown);
        assert_eq!(flag.summary, "x");

        let critical: InvestigationFlag =
            serde_json::from_str(r#"{"id": 10, "severity": "critical"}"#).unwrap();
        assert_eq!(critical.severity, Severity::Critical);
    }

    #[test]
    fn test_flag_rejects_blank_id() {
        let result = serde_json::from_str::<InvestigationFlag>(r#"{"id":"  "}"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_null_related_ids() {
        let flag: InvestigationFlag =
            serde_json::from_str(r#"{"id":"x","related_event_ids":null}"#).unwrap();
        assert!(flag.related_event_ids.is_empty());
    }
}
