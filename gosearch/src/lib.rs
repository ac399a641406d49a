pub mod cancel;
pub mod config;
pub mod engine;
pub mod errors;
pub mod ignore;
pub mod matcher;
pub mod metrics;
pub mod pipeline;
pub mod printer;
pub mod results;
pub mod walker;

// Re-export commonly used types
pub use cancel::CancelToken;
pub use config::{Config, FileConfig, OutputFormat};
pub use engine::{search, search_with_cancel};
pub use errors::{SearchError, SearchResult};
pub use matcher::{MatchRange, MatchStrategy};
pub use results::{PrintSummary, SearchReport};
