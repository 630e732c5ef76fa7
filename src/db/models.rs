use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored quote together with its rotation metadata.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Quote {
    pub id: i64,
    pub text: String,
    pub author: String,
    pub source: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
    pub used_in_cycle: bool,
    pub added_at: DateTime<Utc>,
}

/// Content of a quote before it has been stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewQuote {
    pub text: String,
    pub author: String,
    pub source: Option<String>,
}

impl NewQuote {
    /// Trims every field. `None` when text or author is blank; a blank source becomes `None`.
    pub fn new(
        text: impl AsRef<str>,
        author: impl AsRef<str>,
        source: Option<impl AsRef<str>>,
    ) -> Option<Self> {
        let text = text.as_ref().trim();
        let author = author.as_ref().trim();
        if text.is_empty() || author.is_empty() {
            return None;
        }
        let source = source
            .map(|s| s.as_ref().trim().to_string())
            .filter(|s| !s.is_empty());
        Some(Self {
            text: text.to_string(),
            author: author.to_string(),
            source,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    /// `(text, author)` already present; carries the existing row id.
    Duplicate(i64),
}

impl InsertOutcome {
    pub fn id(&self) -> i64 {
        match self {
            Self::Inserted(id) | Self::Duplicate(id) => *id,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QuoteCounts {
    pub total: u64,
    pub used: u64,
    pub unused: u64,
}
