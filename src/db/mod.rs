//! Database module: models and schema for the quote store.
//!
//! Layout:
//! - `models.rs`: Rust structs mirroring DB rows
//! - `schema.rs`: SQL DDL for initializing the database (SQLite-first)
//! - `sqlite.rs`: sqlx-backed `QuoteRepository`

pub mod models;
pub mod schema;
pub mod sqlite;

pub use models::{InsertOutcome, NewQuote, Quote, QuoteCounts};
pub use schema::SQLITE_INIT;
pub use sqlite::{QuoteStorage, SqlitePool};
