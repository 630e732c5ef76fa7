pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod pipeline;
pub mod scheduler;
pub mod service;
pub mod types;

pub use config::Config;
pub use db::QuoteStorage;
pub use error::BotError;
pub use pipeline::{Pipeline, RunReport};
pub use scheduler::Scheduler;
