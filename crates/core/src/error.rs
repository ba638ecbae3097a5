use thiserror::Error;

/// Failure outcomes of matching a prompt against an accessibility snapshot.
///
/// Each variant is distinguishable so callers can tell "the page had nothing"
/// apart from "the page had something but nothing matched".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MatchError {
    #[error("Prompt must not be empty")]
    EmptyPrompt,

    #[error("No elements found matching the description.")]
    EmptySnapshot,

    #[error("No matching element found for: {prompt}")]
    NoMatch { prompt: String },

    #[error("Matched element \"{description}\" has no reference")]
    Unreferenced { description: String },
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Tool error: {0}")]
    Tool(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Ref '{0}' not found in the current snapshot. Take a new snapshot and try again.")]
    StaleRef(String),

    #[error("Timeout: {0}")]
    Timeout(String),

    #[error(transparent)]
    Match(#[from] MatchError),

    /// Every attempt to resolve a prompt failed; `source` is the last cause.
    #[error("Failed to find selector for prompt: {prompt}: {source}")]
    SelectorNotFound {
        prompt: String,
        #[source]
        source: Box<Error>,
    },
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_match_message_embeds_prompt() {
        let err = MatchError::NoMatch { prompt: "cancel".to_string() };
        assert_eq!(err.to_string(), "No matching element found for: cancel");
    }

    #[test]
    fn test_match_error_is_transparent() {
        let err: Error = MatchError::EmptySnapshot.into();
        assert_eq!(err.to_string(), "No elements found matching the description.");
        assert!(matches!(err, Error::Match(MatchError::EmptySnapshot)));
    }

    #[test]
    fn test_selector_not_found_keeps_cause() {
        let err = Error::SelectorNotFound {
            prompt: "cancel".to_string(),
            source: Box::new(Error::Tool("No matching element found for: cancel".to_string())),
        };
        assert_eq!(
            err.to_string(),
            "Failed to find selector for prompt: cancel: Tool error: No matching element found for: cancel"
        );
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_stale_ref_message() {
        let err = Error::StaleRef("s1e4".to_string());
        assert!(err.to_string().contains("s1e4"));
    }
}
