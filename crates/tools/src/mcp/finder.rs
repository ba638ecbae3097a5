//! `SelectorFinder`: ask a selectorfinder MCP server for element selectors.

use std::path::PathBuf;
use std::time::Duration;

use selectorfinder_core::{Config, Error, MatchError, Result};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::browser::SelectorResult;
use super::client::McpClient;

#[derive(Debug, Clone)]
pub struct FinderOptions {
    pub headless: bool,
    pub timeout_ms: u64,
    /// Extra attempts after the first failure.
    pub retries: u32,
    pub retry_delay_ms: u64,
    pub debug: bool,
    /// Server executable; the current binary when unset.
    pub server_command: Option<String>,
    pub server_args: Vec<String>,
}

impl Default for FinderOptions {
    fn default() -> Self {
        Self {
            headless: false,
            timeout_ms: 30_000,
            retries: 3,
            retry_delay_ms: 1_000,
            debug: false,
            server_command: None,
            server_args: Vec::new(),
        }
    }
}

impl FinderOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            headless: config.browser.headless,
            timeout_ms: config.finder.timeout_ms,
            retries: config.finder.retries,
            retry_delay_ms: config.finder.retry_delay_ms,
            debug: config.finder.debug,
            server_command: config.finder.server_command.clone(),
            server_args: config.finder.server_args.clone(),
        }
    }

    /// Command line used to start the server.
    fn server_invocation(&self) -> Result<(String, Vec<String>)> {
        let (command, mut args) = match &self.server_command {
            Some(cmd) => (cmd.clone(), self.server_args.clone()),
            None => {
                let exe: PathBuf = std::env::current_exe()?;
                (exe.to_string_lossy().into_owned(), vec!["serve".to_string()])
            }
        };
        if self.headless && !args.iter().any(|a| a == "--headless") {
            args.push("--headless".to_string());
        }
        Ok((command, args))
    }
}

pub struct SelectorFinder {
    options: FinderOptions,
    client: Option<McpClient>,
}

impl SelectorFinder {
    pub fn new(options: FinderOptions) -> Self {
        Self {
            options,
            client: None,
        }
    }

    pub fn options(&self) -> &FinderOptions {
        &self.options
    }

    /// Start the server and complete the handshake.
    pub async fn init(&mut self) -> Result<()> {
        if self.client.is_some() {
            return Ok(());
        }
        let (command, args) = self.options.server_invocation()?;
        info!(command = %command, ?args, "Starting selector server");
        let client = McpClient::start(
            "selectorfinder",
            &command,
            &args,
            Duration::from_millis(self.options.timeout_ms),
        )
        .await?;
        if !client.list_tools().await.iter().any(|t| t.name == "get_selector") {
            client.close().await;
            return Err(Error::Tool(format!("Server '{}' does not offer get_selector", command)));
        }
        self.client = Some(client);
        Ok(())
    }

    fn client(&self) -> Result<&McpClient> {
        self.client
            .as_ref()
            .ok_or_else(|| Error::Tool("SelectorFinder not initialized; call init() first".to_string()))
    }

    /// Open `url` in the server's browser before asking for selectors.
    pub async fn navigate(&self, url: &str) -> Result<()> {
        self.client()?
            .call_tool("browser_navigate", json!({"url": url}))
            .await?;
        Ok(())
    }

    /// Resolve `prompt` to a selector, retrying with a fixed delay.
    ///
    /// When every attempt fails the error carries the last attempt's cause,
    /// so "nothing on the page" and "nothing matched" stay apart.
    pub async fn find_selector(&self, prompt: &str) -> Result<SelectorResult> {
        if prompt.trim().is_empty() {
            return Err(MatchError::EmptyPrompt.into());
        }
        let client = self.client()?;

        let attempts = self.options.retries + 1;
        let mut last_err = None;
        for attempt in 1..=attempts {
            let outcome = client
                .call_tool("get_selector", json!({"prompt": prompt}))
                .await
                .and_then(parse_selector_response);
            match outcome {
                Ok(result) => {
                    debug!(prompt, attempt, selector = %result.selector, "Selector found");
                    return Ok(result);
                }
                Err(e) => {
                    if self.options.debug {
                        warn!(prompt, attempt, attempts, error = %e, "Error finding selector");
                    }
                    if attempt < attempts {
                        tokio::time::sleep(Duration::from_millis(self.options.retry_delay_ms)).await;
                    }
                    last_err = Some(e);
                }
            }
        }
        Err(Error::SelectorNotFound {
            prompt: prompt.to_string(),
            source: Box::new(
                last_err.unwrap_or_else(|| Error::Tool("no attempts were made".to_string())),
            ),
        })
    }

    pub async fn close(&mut self) {
        if let Some(client) = self.client.take() {
            client.close().await;
        }
    }
}

/// Decode the text returned by `get_selector` into a [`SelectorResult`].
pub fn parse_selector_response(output: Value) -> Result<SelectorResult> {
    let result: SelectorResult = match output {
        Value::String(text) => serde_json::from_str(&text)?,
        other => serde_json::from_value(other)?,
    };
    if result.selector.is_empty() {
        return Err(Error::Tool("Server returned an empty selector".to_string()));
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let opts = FinderOptions::default();
        assert!(!opts.headless);
        assert_eq!(opts.timeout_ms, 30_000);
        assert_eq!(opts.retries, 3);
        assert_eq!(opts.retry_delay_ms, 1_000);
        assert!(!opts.debug);
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.browser.headless = true;
        config.finder.retries = 0;
        let opts = FinderOptions::from_config(&config);
        assert!(opts.headless);
        assert_eq!(opts.retries, 0);
        assert_eq!(opts.timeout_ms, 30_000);
    }

    #[test]
    fn test_server_invocation() {
        let opts = FinderOptions {
            headless: true,
            server_command: Some("selectorfinder".to_string()),
            server_args: vec!["serve".to_string()],
            ..Default::default()
        };
        let (cmd, args) = opts.server_invocation().unwrap();
        assert_eq!(cmd, "selectorfinder");
        assert_eq!(args, vec!["serve".to_string(), "--headless".to_string()]);

        let headed = FinderOptions::default();
        let (_, args) = headed.server_invocation().unwrap();
        assert_eq!(args, vec!["serve".to_string()]);
    }

    #[test]
    fn test_parse_selector_response() {
        let text = r#"{"selector":"aria-ref=s1e4","description":"Submit","role":"button"}"#;
        let result = parse_selector_response(Value::String(text.to_string())).unwrap();
        assert_eq!(result.selector, "aria-ref=s1e4");
        assert_eq!(result.description, "Submit");
        assert_eq!(result.role, "button");
        assert_eq!(result.confidence, None);

        let with_conf = json!({"selector": "aria-ref=s2e9", "description": "Cart", "role": "link", "confidence": 0.5});
        assert_eq!(parse_selector_response(with_conf).unwrap().confidence, Some(0.5));
    }

    #[test]
    fn test_parse_selector_response_rejects_garbage() {
        assert!(parse_selector_response(Value::String("Navigated to x".to_string())).is_err());
        let empty = json!({"selector": "", "description": "x", "role": "button"});
        assert!(parse_selector_response(empty).is_err());
    }

    /// A stdio server that offers `get_selector` and answers every call with
    /// the given tool error.
    #[cfg(unix)]
    fn failing_server(message: &str) -> FinderOptions {
        let script = format!(
            r#"read l; printf '%s\n' '{{"jsonrpc":"2.0","id":1,"result":{{}}}}'
read l
read l; printf '%s\n' '{{"jsonrpc":"2.0","id":2,"result":{{"tools":[{{"name":"get_selector","inputSchema":{{}}}}]}}}}'
while read l; do
  id=$(printf '%s' "$l" | sed 's/.*"id":\([0-9]*\).*/\1/')
  printf '%s\n' '{{"jsonrpc":"2.0","id":'"$id"',"result":{{"content":[{{"type":"text","text":"{}"}}],"isError":true}}}}'
done"#,
            message
        );
        FinderOptions {
            retries: 1,
            retry_delay_ms: 0,
            timeout_ms: 5_000,
            server_command: Some("sh".to_string()),
            server_args: vec!["-c".to_string(), script],
            ..Default::default()
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_find_selector_failures_stay_distinct() {
        let mut empty_page = SelectorFinder::new(failing_server("No elements found matching the description."));
        empty_page.init().await.unwrap();
        let empty_err = empty_page.find_selector("cancel").await.unwrap_err();
        empty_page.close().await;

        let mut no_match = SelectorFinder::new(failing_server("No matching element found for: cancel"));
        no_match.init().await.unwrap();
        let miss_err = no_match.find_selector("cancel").await.unwrap_err();
        no_match.close().await;

        assert!(matches!(empty_err, Error::SelectorNotFound { .. }));
        assert!(matches!(miss_err, Error::SelectorNotFound { .. }));
        assert!(empty_err.to_string().starts_with("Failed to find selector for prompt: cancel"));
        assert!(empty_err.to_string().ends_with("No elements found matching the description."));
        assert!(miss_err.to_string().ends_with("No matching element found for: cancel"));
        assert_ne!(empty_err.to_string(), miss_err.to_string());
    }

    #[tokio::test]
    async fn test_find_selector_requires_init() {
        let finder = SelectorFinder::new(FinderOptions::default());
        let err = finder.find_selector("submit").await.unwrap_err();
        assert!(err.to_string().contains("not initialized"));

        let err = finder.find_selector(" ").await.unwrap_err();
        assert!(matches!(err, Error::Match(MatchError::EmptyPrompt)));
    }
}
