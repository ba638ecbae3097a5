pub mod config;
pub mod error;
pub mod paths;

pub use config::{BrowserConfig, Config, FinderConfig, MatchStrategy, MatcherConfig};
pub use error::{Error, MatchError, Result};
pub use paths::Paths;
