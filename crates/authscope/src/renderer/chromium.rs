//! Chromium-based renderer using chromiumoxide.

use super::{
    BoundingBox, ElementHandle, ElementId, ElementQuery, NavigationResult, OpenedPopup,
    PopupWatch, RenderContext, Renderer,
};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::EventRequestWillBeSent;
use chromiumoxide::cdp::browser_protocol::page::EventWindowOpen;
use chromiumoxide::element::Element;
use chromiumoxide::page::Page;
use futures::StreamExt;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::debug;

/// Attribute that tags the elements matched by the latest query.
const MARK_ATTR: &str = "data-authscope-mark";

/// Build the in-page script for one query. It clears earlier marks, tags every
/// element under `selector` (optionally whose trimmed text equals `text`,
/// case-insensitively) and returns their descriptions as a JSON string in
/// document order.
fn mark_script(selector: &str, text: Option<&str>) -> Result<String> {
    let selector = serde_json::to_string(selector)?;
    let wanted = match text {
        Some(text) => serde_json::to_string(&text.trim().to_lowercase())?,
        None => "null".to_string(),
    };
    Ok(format!(
        "(() => {{ \
            document.querySelectorAll('[{MARK_ATTR}]').forEach(e => e.removeAttribute('{MARK_ATTR}')); \
            const wanted = {wanted}; \
            const out = []; \
            for (const el of document.querySelectorAll({selector})) {{ \
                const text = (el.innerText || el.textContent || '').trim(); \
                if (wanted !== null && text.toLowerCase() !== wanted) continue; \
                el.setAttribute('{MARK_ATTR}', ''); \
                out.push({{ tag: (el.tagName || '').toLowerCase(), text }}); \
            }} \
            return JSON.stringify(out); \
        }})()"
    ))
}

fn unmark_script() -> String {
    format!(
        "document.querySelectorAll('[{MARK_ATTR}]') \
            .forEach(e => e.removeAttribute('{MARK_ATTR}'))"
    )
}

fn parse_descriptions(json: &str) -> Result<Vec<Description>> {
    serde_json::from_str(json).context("malformed element descriptions")
}

/// Find the Chromium binary path.
pub fn find_chromium(explicit: Option<&PathBuf>) -> Option<PathBuf> {
    // 1. Explicit path (CLI flag or AUTHSCOPE_CHROMIUM_PATH via RunConfig)
    if let Some(path) = explicit {
        if path.exists() {
            return Some(path.clone());
        }
    }

    // 2. ~/.authscope/chromium/
    if let Some(home) = dirs::home_dir() {
        let candidates = if cfg!(target_os = "macos") {
            vec![
                home.join(".authscope/chromium/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing"),
                home.join(".authscope/chromium/chrome"),
            ]
        } else {
            vec![
                home.join(".authscope/chromium/chrome-linux64/chrome"),
                home.join(".authscope/chromium/chrome"),
            ]
        };
        for c in candidates {
            if c.exists() {
                return Some(c);
            }
        }
    }

    // 3. System PATH
    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    // 4. Common macOS location
    if cfg!(target_os = "macos") {
        let common =
            PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
        if common.exists() {
            return Some(common);
        }
    }

    None
}

/// Launch options for the shared browser process.
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    pub headless: bool,
    pub chromium_path: Option<PathBuf>,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: true,
            chromium_path: None,
        }
    }
}

/// Chromium-based renderer.
pub struct ChromiumRenderer {
    browser: Arc<Browser>,
    handler_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumRenderer {
    /// Launch the shared Chromium instance.
    pub async fn launch(options: &LaunchOptions) -> Result<Self> {
        let chrome_path = find_chromium(options.chromium_path.as_ref())
            .context("Chromium not found. Set AUTHSCOPE_CHROMIUM_PATH or install Chrome.")?;

        let mut builder = BrowserConfig::builder().chrome_executable(chrome_path);
        builder = if options.headless {
            builder.arg("--headless=new")
        } else {
            builder.with_head()
        };

        let config = builder
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--ignore-certificate-errors")
            .arg("--disable-extensions")
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        let handler_task = tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("chromium handler event error: {e}");
                }
            }
        });

        Ok(Self {
            browser: Arc::new(browser),
            handler_task,
            active_count: Arc::new(AtomicUsize::new(0)),
        })
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("failed to create new page")?;

        // Subscribe before any navigation so early requests are not missed.
        let requests = Arc::new(Mutex::new(Vec::new()));
        let mut stream = page
            .event_listener::<EventRequestWillBeSent>()
            .await
            .context("failed to subscribe to network requests")?;
        let sink = Arc::clone(&requests);
        let request_task = tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                if let Ok(mut urls) = sink.lock() {
                    urls.push(event.request.url.clone());
                }
            }
        });

        self.active_count.fetch_add(1, Ordering::Relaxed);

        Ok(Box::new(ChromiumContext {
            page,
            browser: Arc::clone(&self.browser),
            elements: Mutex::new(HashMap::new()),
            requests,
            request_task,
            active_count: Arc::clone(&self.active_count),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        // Browser process is killed when the last handle is dropped
        self.handler_task.abort();
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Deserialize)]
struct Description {
    tag: String,
    text: String,
}

/// A single Chromium page context.
pub struct ChromiumContext {
    page: Page,
    browser: Arc<Browser>,
    elements: Mutex<HashMap<i64, Arc<Element>>>,
    requests: Arc<Mutex<Vec<String>>>,
    request_task: JoinHandle<()>,
    active_count: Arc<AtomicUsize>,
}

impl ChromiumContext {
    fn remember(&self, element: Element) -> i64 {
        let id = *element.backend_node_id.inner();
        if let Ok(mut elements) = self.elements.lock() {
            elements.entry(id).or_insert_with(|| Arc::new(element));
        }
        id
    }

    fn element(&self, handle: &ElementHandle) -> Result<Arc<Element>> {
        let elements = self
            .elements
            .lock()
            .map_err(|_| anyhow::anyhow!("element table poisoned"))?;
        elements
            .get(&handle.id.0)
            .cloned()
            .with_context(|| format!("unknown element {}", handle.id.0))
    }
}

#[async_trait]
impl RenderContext for ChromiumContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let start = Instant::now();

        let result = tokio::time::timeout(
            std::time::Duration::from_millis(timeout_ms),
            self.page.goto(url),
        )
        .await;

        let load_time_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                let final_url = self
                    .page
                    .url()
                    .await
                    .unwrap_or_default()
                    .unwrap_or_else(|| url.to_string());

                Ok(NavigationResult {
                    final_url,
                    load_time_ms,
                })
            }
            Ok(Err(e)) => bail!("navigation failed: {e}"),
            Err(_) => bail!("navigation timed out after {timeout_ms}ms"),
        }
    }

    async fn query(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>> {
        let (selector, wanted) = match query {
            ElementQuery::Css(selector) => (selector.as_str(), None),
            ElementQuery::Text { scope, text } => (scope.as_str(), Some(text.as_str())),
        };

        let json: String = self
            .page
            .evaluate_expression(mark_script(selector, wanted)?)
            .await
            .with_context(|| format!("query failed: {selector}"))?
            .into_value()
            .context("query returned no descriptions")?;
        let descriptions = parse_descriptions(&json)?;
        if descriptions.is_empty() {
            return Ok(Vec::new());
        }

        let found = self
            .page
            .find_elements(format!("[{MARK_ATTR}]"))
            .await
            .with_context(|| format!("failed to resolve matches for {selector}"))?;
        if let Err(e) = self.page.evaluate_expression(unmark_script()).await {
            debug!("failed to clear query marks: {e}");
        }
        if found.len() != descriptions.len() {
            bail!(
                "page changed during query {selector}: {} described, {} resolved",
                descriptions.len(),
                found.len()
            );
        }

        Ok(found
            .into_iter()
            .zip(descriptions)
            .map(|(element, description)| ElementHandle {
                id: ElementId(self.remember(element)),
                tag: description.tag,
                text: description.text,
            })
            .collect())
    }

    async fn bounding_box(&self, element: &ElementHandle) -> Result<Option<BoundingBox>> {
        let element = self.element(element)?;
        match element.bounding_box().await {
            Ok(b) => Ok(Some(BoundingBox {
                x: b.x,
                y: b.y,
                width: b.width,
                height: b.height,
            })),
            // No box model: detached or display:none
            Err(_) => Ok(None),
        }
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        let element = self.element(element)?;
        element.click().await.context("click failed")?;
        Ok(())
    }

    async fn watch_popup(&self) -> Result<PopupWatch> {
        let mut stream = self
            .page
            .event_listener::<EventWindowOpen>()
            .await
            .context("failed to subscribe to window.open events")?;
        let (tx, rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            if let Some(event) = stream.next().await {
                let _ = tx.send(OpenedPopup {
                    url: event.url.clone(),
                });
            }
        });
        Ok(PopupWatch::new(rx, Some(task)))
    }

    async fn close_popup(&self, popup: &OpenedPopup) -> Result<()> {
        let own_target = self.page.target_id().clone();
        let pages = self.browser.pages().await.context("failed to list pages")?;
        for page in pages {
            if page.opener_id().as_ref() == Some(&own_target) {
                debug!("closing popup {}", popup.url);
                page.close().await.context("failed to close popup")?;
            }
        }
        Ok(())
    }

    fn observed_requests(&self) -> Vec<String> {
        self.requests
            .lock()
            .map(|urls| urls.clone())
            .unwrap_or_default()
    }

    async fn get_html(&self) -> Result<String> {
        self.page.content().await.context("failed to get HTML")
    }

    async fn get_url(&self) -> Result<String> {
        let url = self
            .page
            .url()
            .await
            .context("failed to get URL")?
            .unwrap_or_default();
        Ok(url)
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        self.request_task.abort();
        let _ = self.page.close().await;
        Ok(())
    }
}
