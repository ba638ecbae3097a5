//! Model Context Protocol plumbing: the stdio server exposing the browser
//! tools, and the client used by [`finder::SelectorFinder`] to drive it.

pub mod client;
pub mod finder;
pub mod protocol;
pub mod server;

pub use client::{McpClient, McpTool};
pub use finder::{FinderOptions, SelectorFinder};
pub use server::McpServer;
