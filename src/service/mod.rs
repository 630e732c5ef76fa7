//! Quote storage seam, rotation and import.

pub mod ingest;
pub mod memory;
pub mod repository;
pub mod rotation;

pub use ingest::{IngestReport, ParsedRow, ingest_quotes, parse_quotes, parse_quotes_file};
pub use memory::MemoryQuoteStore;
pub use repository::QuoteRepository;
pub use rotation::{QuoteSelector, RotationPool, Selection};
