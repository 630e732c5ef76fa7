//! SQL DDL for initializing the quote store.

/// SQLite schema with:
/// - `id` INTEGER PRIMARY KEY AUTOINCREMENT
/// - `(text, author)` UNIQUE so re-imports cannot duplicate a quote
/// - `used_in_cycle` BOOLEAN (stored as INTEGER 0/1)
/// - timestamps stored as RFC3339 text
pub const SQLITE_INIT: &str = r#"
CREATE TABLE IF NOT EXISTS quotes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    text TEXT NOT NULL,
    author TEXT NOT NULL,
    source TEXT NULL,
    last_used_at TEXT NULL, -- RFC3339
    used_in_cycle INTEGER NOT NULL DEFAULT 0,
    added_at TEXT NOT NULL, -- RFC3339
    UNIQUE (text, author)
);

CREATE INDEX IF NOT EXISTS idx_quotes_used_in_cycle ON quotes(used_in_cycle);
"#;
