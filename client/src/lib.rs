#![deny(
    clippy::expect_used,
    clippy::panic,
    clippy::print_stdout,
    clippy::todo,
    clippy::unimplemented,
    clippy::unwrap_used
)]

pub mod cache;
pub mod config;
pub mod credentials;
pub mod logging;
pub mod search;
pub mod transport;

pub use config::ClientConfig;
pub use search::{
    Criteria, Database, ResultShape, SearchClient, SearchError, SearchOptions, SearchResult,
};
