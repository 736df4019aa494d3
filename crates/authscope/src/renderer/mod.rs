//! Renderer abstraction for browser-driven site analysis.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over
//! the browser engine (Chromium via chromiumoxide, or the in-memory
//! scripted page model used by tests).

pub mod chromium;
pub mod scripted;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Result of navigating to a URL.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// The final URL after any redirects.
    pub final_url: String,
    /// Time taken to reach DOM ready in milliseconds.
    pub load_time_ms: u64,
}

/// How to locate elements in the current document.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ElementQuery {
    /// A CSS selector.
    Css(String),
    /// Elements matching `scope` whose trimmed text equals `text`,
    /// ignoring case.
    Text { scope: String, text: String },
}

impl ElementQuery {
    pub fn css(selector: impl Into<String>) -> Self {
        Self::Css(selector.into())
    }

    pub fn text(scope: impl Into<String>, text: impl Into<String>) -> Self {
        Self::Text {
            scope: scope.into(),
            text: text.into(),
        }
    }
}

impl fmt::Display for ElementQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Css(selector) => f.write_str(selector),
            Self::Text { scope, text } => write!(f, "{scope}:text(\"{text}\")"),
        }
    }
}

/// Stable identity of a DOM node within one context.
///
/// Two queries that reach the same node yield the same id, so identity is
/// what deduplication compares, not label text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ElementId(pub i64);

/// A resolved element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ElementHandle {
    pub id: ElementId,
    /// Lowercase tag name (`a`, `button`, ...).
    pub tag: String,
    /// Trimmed rendered text.
    pub text: String,
}

/// Rendered geometry of an element.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BoundingBox {
    /// Non-zero rendered width and height.
    pub fn is_visible(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }
}

/// A new window opened by the page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OpenedPopup {
    pub url: String,
}

/// A one-shot listener for a "new window opened" event.
///
/// Must be armed before the action that may open the window so the event
/// cannot fire ahead of the listener.
pub struct PopupWatch {
    rx: oneshot::Receiver<OpenedPopup>,
    task: Option<JoinHandle<()>>,
}

impl PopupWatch {
    /// Build a watch fed by `rx`. `task` is the background listener, if any,
    /// and is aborted when the watch is dropped.
    pub fn new(rx: oneshot::Receiver<OpenedPopup>, task: Option<JoinHandle<()>>) -> Self {
        Self { rx, task }
    }

    /// Wait up to `timeout` for the window. `None` on timeout.
    pub async fn wait(mut self, timeout: Duration) -> Option<OpenedPopup> {
        match tokio::time::timeout(timeout, &mut self.rx).await {
            Ok(Ok(popup)) => Some(popup),
            _ => None,
        }
    }
}

impl Drop for PopupWatch {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// A browser engine that can create isolated sessions.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Create a new browser context (tab). Request observation starts here.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Shut down the browser engine.
    async fn shutdown(&self) -> Result<()>;
    /// Number of currently active contexts.
    fn active_contexts(&self) -> usize;
}

/// A single isolated browser context (tab) used for one site.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Navigate to a URL and wait for DOM ready, bounded by `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Resolve all elements matching `query`, in document order.
    async fn query(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>>;
    /// Current geometry of `element`; `None` when it has no layout box.
    async fn bounding_box(&self, element: &ElementHandle) -> Result<Option<BoundingBox>>;
    /// Activate `element`.
    async fn click(&self, element: &ElementHandle) -> Result<()>;
    /// Arm a one-shot listener for the next window this page opens.
    async fn watch_popup(&self) -> Result<PopupWatch>;
    /// Close a window previously reported by a [`PopupWatch`].
    async fn close_popup(&self, popup: &OpenedPopup) -> Result<()>;
    /// Outbound request URLs observed since the context was created.
    fn observed_requests(&self) -> Vec<String>;
    /// Get the full page HTML.
    async fn get_html(&self) -> Result<String>;
    /// Get the current URL.
    async fn get_url(&self) -> Result<String>;
    /// Close this context.
    async fn close(self: Box<Self>) -> Result<()>;
}

/// A no-op renderer used when Chromium is unavailable.
///
/// Every site fails with a transient error, which lets `doctor`-style dry
/// runs exercise the batch loop and output files without a browser.
pub struct NoopRenderer;

#[async_trait]
impl Renderer for NoopRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        Err(anyhow::anyhow!("browser not available"))
    }
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }
    fn active_contexts(&self) -> usize {
        0
    }
}
