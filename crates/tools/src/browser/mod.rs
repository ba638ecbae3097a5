//! CDP-based browser automation.
//!
//! - Explicit `BrowserContext`: one Chrome per context, launched on first use
//! - CDP protocol over WebSocket
//! - Accessibility snapshot + ref system: every node gets a generation-scoped ref
//! - Matcher: natural-language prompt → `aria-ref=` selector

pub mod cdp;
pub mod matcher;
pub mod session;
pub mod snapshot;
pub mod tools;

pub use matcher::{find_best_match, find_match, select, Scored, SelectorResult};
pub use session::{BrowserContext, BrowserSession, LaunchOptions, ReferenceResolver, SnapshotProvider};
pub use snapshot::{AXNode, RefTable};
pub use tools::{
    find_selector, ClickTool, CloseTool, DragTool, GetSelectorTool, GoBackTool, GoForwardTool,
    HoverTool, NavigateTool, PressKeyTool, SaveAsPdfTool, SnapshotTool, TypeTool, WaitTool,
};
