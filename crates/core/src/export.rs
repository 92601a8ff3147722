//! Results export
//!
//! Serializes the result buckets into a downloadable document. Each bucket
//! is an ordered list of `{ name, url, likes, dislikes }`.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::results::{ItemResult, Results};

/// One exported item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExportEntry {
    pub name: String,
    pub url: Option<String>,
    pub likes: u32,
    pub dislikes: u32,
}

impl From<&ItemResult> for ExportEntry {
    fn from(result: &ItemResult) -> Self {
        Self {
            name: result.item.name.clone(),
            url: result.item.url.clone(),
            likes: result.likes,
            dislikes: result.dislikes,
        }
    }
}

/// Exported results of one room
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResultsExport {
    pub room_code: String,
    pub generated_at: DateTime<Utc>,
    pub approved: Vec<ExportEntry>,
    pub rejected: Vec<ExportEntry>,
    pub controversial: Vec<ExportEntry>,
}

impl ResultsExport {
    pub fn from_results(room_code: &str, results: &Results) -> Self {
        let entries = |bucket: &[ItemResult]| bucket.iter().map(ExportEntry::from).collect();
        Self {
            room_code: room_code.to_string(),
            generated_at: Utc::now(),
            approved: entries(&results.approved),
            rejected: entries(&results.rejected),
            controversial: entries(&results.controversial),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Plain-text rendering, one section per bucket
    pub fn to_text(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for ResultsExport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Room {} results", self.room_code)?;
        writeln!(f, "Generated {}", self.generated_at.format("%Y-%m-%d %H:%M UTC"))?;

        for (title, bucket) in [
            ("Approved", &self.approved),
            ("Controversial", &self.controversial),
            ("Rejected", &self.rejected),
        ] {
            writeln!(f)?;
            writeln!(f, "{} ({})", title, bucket.len())?;
            if bucket.is_empty() {
                writeln!(f, "  (none)")?;
            }
            for (rank, entry) in bucket.iter().enumerate() {
                writeln!(f, "  {}. {}", rank + 1, entry)?;
            }
        }
        Ok(())
    }
}

impl fmt::Display for ExportEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [+{} / -{}]", self.name, self.likes, self.dislikes)?;
        if let Some(url) = &self.url {
            write!(f, " {}", url)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Ballot, Decision, Item};
    use crate::results::compute_results;

    fn item(id: &str, url: Option<&str>) -> Item {
        Item {
            id: id.to_string(),
            room_id: "ROOM01".to_string(),
            name: format!("Mod {}", id),
            description: "desc".to_string(),
            url: url.map(str::to_string),
            image: None,
            proposed_by: "u0".to_string(),
            created_at: Utc::now(),
        }
    }

    fn like(participant: &str, item: &str) -> Ballot {
        Ballot::new(
            "ROOM01".to_string(),
            item.to_string(),
            participant.to_string(),
            Decision::Like,
            None,
        )
    }

    #[test]
    fn test_export_buckets_in_order() {
        let items = vec![item("A", Some("https://a.example")), item("B", None), item("C", None)];
        let ballots = vec![like("u1", "A"), like("u1", "B"), like("u2", "B")];
        let export = ResultsExport::from_results("ROOM01", &compute_results(&items, &ballots));

        let names: Vec<_> = export.approved.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["Mod B", "Mod A"]);
        assert_eq!(export.approved[1].url.as_deref(), Some("https://a.example"));
        assert_eq!(export.rejected.len(), 1);
        assert!(export.controversial.is_empty());
    }

    #[test]
    fn test_export_json_shape() {
        let items = vec![item("A", None)];
        let export = ResultsExport::from_results("ROOM01", &compute_results(&items, &vec![like("u1", "A")]));
        let value: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();

        assert_eq!(value["roomCode"], "ROOM01");
        assert_eq!(value["approved"][0]["name"], "Mod A");
        assert_eq!(value["approved"][0]["likes"], 1);
        assert_eq!(value["approved"][0]["dislikes"], 0);
        assert!(value["approved"][0]["url"].is_null());
    }

    #[test]
    fn test_export_text() {
        let items = vec![item("A", Some("https://a.example"))];
        let export = ResultsExport::from_results("ROOM01", &compute_results(&items, &vec![like("u1", "A")]));
        let text = export.to_text();
        assert!(text.contains("Room ROOM01 results"));
        assert!(text.contains("1. Mod A [+1 / -0] https://a.example"));
        assert!(text.contains("Rejected (0)"));
    }

    #[test]
    fn test_export_text_sections() {
        let items = vec![item("A", None), item("B", None)];
        let export = ResultsExport::from_results("ROOM01", &compute_results(&items, &vec![like("u1", "A")]));
        let text = export.to_string();
        let lines: Vec<_> = text.lines().collect();

        assert_eq!(lines[0], "Room ROOM01 results");
        assert!(lines[1].starts_with("Generated "));
        assert_eq!(&lines[2..5], &["", "Approved (1)", "  1. Mod A [+1 / -0]"]);
        assert_eq!(&lines[5..8], &["", "Controversial (0)", "  (none)"]);
        assert_eq!(&lines[8..], &["", "Rejected (1)", "  1. Mod B [+0 / -0]"]);
        assert_eq!(export.to_text(), text);
    }
}
