//! Deterministic in-memory renderer.
//!
//! Pages are described up front as a list of elements with the selectors
//! they answer to and what clicking them does. Used by the test suite and
//! for offline runs where launching Chromium is not possible.

use super::{
    BoundingBox, ElementHandle, ElementId, ElementQuery, NavigationResult, OpenedPopup,
    PopupWatch, RenderContext, Renderer,
};
use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// What clicking a scripted element does.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickEffect {
    Nothing,
    /// Opens a new window at `url`.
    OpenPopup { url: String },
    /// Makes the listed elements present and visible (menus, modals).
    Reveal(Vec<i64>),
    /// Detaches the listed elements (a menu closing another).
    Hide(Vec<i64>),
    /// Navigates to `url`; every element except `reveal` is detached.
    Navigate { url: String, reveal: Vec<i64> },
    /// The click raises.
    Fail(String),
}

/// One element of a scripted page.
#[derive(Debug, Clone)]
pub struct ScriptedElement {
    pub id: i64,
    pub tag: String,
    pub text: String,
    /// CSS selectors this element answers to. Bare tag names in a query are
    /// matched against `tag` instead.
    pub selectors: Vec<String>,
    /// Rendered with a non-zero box.
    pub visible: bool,
    /// Attached to the document.
    pub present: bool,
    pub on_click: ClickEffect,
}

impl ScriptedElement {
    pub fn new(id: i64, tag: &str, text: &str) -> Self {
        Self {
            id,
            tag: tag.to_lowercase(),
            text: text.trim().to_string(),
            selectors: Vec::new(),
            visible: true,
            present: true,
            on_click: ClickEffect::Nothing,
        }
    }

    /// A password input, absent until revealed.
    pub fn password(id: i64) -> Self {
        Self::new(id, "input", "")
            .matches("input[type=\"password\"]")
            .absent()
    }

    pub fn matches(mut self, selector: &str) -> Self {
        self.selectors.push(selector.to_string());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    pub fn absent(mut self) -> Self {
        self.present = false;
        self
    }

    pub fn on_click(mut self, effect: ClickEffect) -> Self {
        self.on_click = effect;
        self
    }

    fn answers(&self, selector: &str) -> bool {
        selector.split(',').map(str::trim).any(|part| {
            if !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()) {
                part.eq_ignore_ascii_case(&self.tag)
            } else {
                self.selectors.iter().any(|s| s == part)
            }
        })
    }

    fn handle(&self) -> ElementHandle {
        ElementHandle {
            id: ElementId(self.id),
            tag: self.tag.clone(),
            text: self.text.clone(),
        }
    }
}

/// A scripted page reachable at one URL.
#[derive(Debug, Clone, Default)]
pub struct ScriptedPage {
    pub url: String,
    pub html: String,
    pub elements: Vec<ScriptedElement>,
    /// Requests issued while the page loads.
    pub requests: Vec<String>,
    /// Selectors whose query raises.
    pub broken_selectors: Vec<String>,
}

impl ScriptedPage {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_string(),
            ..Default::default()
        }
    }

    pub fn html(mut self, html: &str) -> Self {
        self.html = html.to_string();
        self
    }

    pub fn element(mut self, element: ScriptedElement) -> Self {
        self.elements.push(element);
        self
    }

    pub fn request(mut self, url: &str) -> Self {
        self.requests.push(url.to_string());
        self
    }

    pub fn broken_selector(mut self, selector: &str) -> Self {
        self.broken_selectors.push(selector.to_string());
        self
    }
}

/// Interactions recorded across all contexts of a [`ScriptedRenderer`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Interaction {
    Navigate(String),
    Click(i64),
    ClosePopup(String),
}

/// Renderer serving [`ScriptedPage`]s by URL.
#[derive(Default)]
pub struct ScriptedRenderer {
    pages: HashMap<String, ScriptedPage>,
    nav_failures: Arc<Mutex<HashMap<String, u32>>>,
    interactions: Arc<Mutex<Vec<Interaction>>>,
    active_count: Arc<AtomicUsize>,
    created_count: AtomicUsize,
}

impl ScriptedRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_page(mut self, page: ScriptedPage) -> Self {
        self.pages.insert(page.url.clone(), page);
        self
    }

    /// Make the next `times` navigations to `url` time out.
    pub fn failing_navigation(self, url: &str, times: u32) -> Self {
        if let Ok(mut failures) = self.nav_failures.lock() {
            failures.insert(url.to_string(), times);
        }
        self
    }

    pub fn interactions(&self) -> Vec<Interaction> {
        self.interactions
            .lock()
            .map(|log| log.clone())
            .unwrap_or_default()
    }

    /// Element ids clicked so far, in order.
    pub fn clicks(&self) -> Vec<i64> {
        self.interactions()
            .into_iter()
            .filter_map(|i| match i {
                Interaction::Click(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    /// Contexts created over the renderer's lifetime.
    pub fn contexts_created(&self) -> usize {
        self.created_count.load(Ordering::Relaxed)
    }
}

#[async_trait]
impl Renderer for ScriptedRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        self.active_count.fetch_add(1, Ordering::Relaxed);
        self.created_count.fetch_add(1, Ordering::Relaxed);
        Ok(Box::new(ScriptedContext {
            pages: self.pages.clone(),
            nav_failures: Arc::clone(&self.nav_failures),
            interactions: Arc::clone(&self.interactions),
            active_count: Arc::clone(&self.active_count),
            state: Mutex::new(PageState {
                url: "about:blank".to_string(),
                ..Default::default()
            }),
        }))
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    fn active_contexts(&self) -> usize {
        self.active_count.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
struct PageState {
    url: String,
    html: String,
    elements: Vec<ScriptedElement>,
    broken_selectors: Vec<String>,
    requests: Vec<String>,
    popup_tx: Option<oneshot::Sender<OpenedPopup>>,
}

/// A context over one scripted page.
pub struct ScriptedContext {
    pages: HashMap<String, ScriptedPage>,
    nav_failures: Arc<Mutex<HashMap<String, u32>>>,
    interactions: Arc<Mutex<Vec<Interaction>>>,
    active_count: Arc<AtomicUsize>,
    state: Mutex<PageState>,
}

impl ScriptedContext {
    fn state(&self) -> Result<std::sync::MutexGuard<'_, PageState>> {
        self.state.lock().map_err(|_| anyhow!("page state poisoned"))
    }

    fn record(&self, interaction: Interaction) {
        if let Ok(mut log) = self.interactions.lock() {
            log.push(interaction);
        }
    }

    fn take_failure(&self, url: &str) -> bool {
        let Ok(mut failures) = self.nav_failures.lock() else {
            return false;
        };
        match failures.get_mut(url) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                true
            }
            _ => false,
        }
    }
}

#[async_trait]
impl RenderContext for ScriptedContext {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        self.record(Interaction::Navigate(url.to_string()));
        if self.take_failure(url) {
            bail!("navigation timed out after {timeout_ms}ms");
        }
        let page = self
            .pages
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("navigation failed: net::ERR_NAME_NOT_RESOLVED at {url}"))?;

        let mut state = self.state()?;
        state.url = page.url.clone();
        state.html = page.html;
        state.elements = page.elements;
        state.broken_selectors = page.broken_selectors;
        state.requests.push(page.url.clone());
        state.requests.extend(page.requests);

        Ok(NavigationResult {
            final_url: page.url,
            load_time_ms: 0,
        })
    }

    async fn query(&self, query: &ElementQuery) -> Result<Vec<ElementHandle>> {
        let state = self.state()?;
        let (selector, text) = match query {
            ElementQuery::Css(selector) => (selector.as_str(), None),
            ElementQuery::Text { scope, text } => (scope.as_str(), Some(text.trim())),
        };
        if state.broken_selectors.iter().any(|s| s == selector) {
            bail!("invalid selector: {selector}");
        }
        Ok(state
            .elements
            .iter()
            .filter(|e| e.present && e.answers(selector))
            .filter(|e| text.map_or(true, |t| e.text.to_lowercase() == t.to_lowercase()))
            .map(ScriptedElement::handle)
            .collect())
    }

    async fn bounding_box(&self, element: &ElementHandle) -> Result<Option<BoundingBox>> {
        let state = self.state()?;
        let Some(found) = state
            .elements
            .iter()
            .find(|e| e.id == element.id.0 && e.present)
        else {
            return Ok(None);
        };
        let (width, height) = if found.visible { (120.0, 32.0) } else { (0.0, 0.0) };
        Ok(Some(BoundingBox {
            x: 0.0,
            y: 0.0,
            width,
            height,
        }))
    }

    async fn click(&self, element: &ElementHandle) -> Result<()> {
        self.record(Interaction::Click(element.id.0));
        let mut state = self.state()?;
        let effect = state
            .elements
            .iter()
            .find(|e| e.id == element.id.0 && e.present)
            .map(|e| e.on_click.clone())
            .ok_or_else(|| anyhow!("element {} is detached", element.id.0))?;

        match effect {
            ClickEffect::Nothing => {}
            ClickEffect::OpenPopup { url } => {
                if let Some(tx) = state.popup_tx.take() {
                    let _ = tx.send(OpenedPopup { url });
                }
            }
            ClickEffect::Reveal(ids) => {
                for e in state.elements.iter_mut().filter(|e| ids.contains(&e.id)) {
                    e.present = true;
                    e.visible = true;
                }
            }
            ClickEffect::Hide(ids) => {
                for e in state.elements.iter_mut().filter(|e| ids.contains(&e.id)) {
                    e.present = false;
                }
            }
            ClickEffect::Navigate { url, reveal } => {
                for e in state.elements.iter_mut() {
                    e.present = reveal.contains(&e.id);
                }
                state.requests.push(url.clone());
                state.url = url;
            }
            ClickEffect::Fail(message) => bail!("{message}"),
        }
        Ok(())
    }

    async fn watch_popup(&self) -> Result<PopupWatch> {
        let (tx, rx) = oneshot::channel();
        self.state()?.popup_tx = Some(tx);
        Ok(PopupWatch::new(rx, None))
    }

    async fn close_popup(&self, popup: &OpenedPopup) -> Result<()> {
        self.record(Interaction::ClosePopup(popup.url.clone()));
        Ok(())
    }

    fn observed_requests(&self) -> Vec<String> {
        self.state()
            .map(|state| state.requests.clone())
            .unwrap_or_default()
    }

    async fn get_html(&self) -> Result<String> {
        Ok(self.state()?.html.clone())
    }

    async fn get_url(&self) -> Result<String> {
        Ok(self.state()?.url.clone())
    }

    async fn close(self: Box<Self>) -> Result<()> {
        self.active_count.fetch_sub(1, Ordering::Relaxed);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn page() -> ScriptedPage {
        ScriptedPage::new("https://shop.example/")
            .html("<html>shop</html>")
            .request("https://cdn.example/app.js")
            .element(
                ScriptedElement::new(1, "a", " Log in ")
                    .matches("a[href*=\"login\"]")
                    .on_click(ClickEffect::Reveal(vec![2])),
            )
            .element(ScriptedElement::password(2))
    }

    #[tokio::test]
    async fn test_navigate_loads_page_and_requests() {
        let renderer = ScriptedRenderer::new().with_page(page());
        let mut ctx = renderer.new_context().await.unwrap();
        let nav = ctx.navigate("https://shop.example/", 1000).await.unwrap();
        assert_eq!(nav.final_url, "https://shop.example/");
        assert_eq!(
            ctx.observed_requests(),
            vec!["https://shop.example/", "https://cdn.example/app.js"]
        );
        assert_eq!(ctx.get_html().await.unwrap(), "<html>shop</html>");
        ctx.close().await.unwrap();
        assert_eq!(renderer.active_contexts(), 0);
    }

    #[tokio::test]
    async fn test_query_by_tag_selector_and_text() {
        let renderer = ScriptedRenderer::new().with_page(page());
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate("https://shop.example/", 1000).await.unwrap();

        let by_tag = ctx.query(&ElementQuery::css("a, button")).await.unwrap();
        assert_eq!(by_tag.len(), 1);
        assert_eq!(by_tag[0].text, "Log in");

        let by_text = ctx.query(&ElementQuery::text("a", "LOG IN")).await.unwrap();
        assert_eq!(by_text.len(), 1);

        // Password input is absent until revealed
        let pw = ElementQuery::css("input[type=\"password\"]");
        assert!(ctx.query(&pw).await.unwrap().is_empty());
        ctx.click(&by_tag[0]).await.unwrap();
        assert_eq!(ctx.query(&pw).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_scripted_navigation_failures_are_consumed() {
        let renderer = ScriptedRenderer::new()
            .with_page(page())
            .failing_navigation("https://shop.example/", 1);
        let mut ctx = renderer.new_context().await.unwrap();
        assert!(ctx.navigate("https://shop.example/", 50).await.is_err());
        assert!(ctx.navigate("https://shop.example/", 50).await.is_ok());
    }

    #[tokio::test]
    async fn test_click_on_detached_element_fails() {
        let renderer = ScriptedRenderer::new().with_page(
            ScriptedPage::new("https://a.example/")
                .element(ScriptedElement::new(1, "a", "Sign in").on_click(ClickEffect::Navigate {
                    url: "https://a.example/login".into(),
                    reveal: vec![],
                }))
                .element(ScriptedElement::new(2, "button", "Login")),
        );
        let mut ctx = renderer.new_context().await.unwrap();
        ctx.navigate("https://a.example/", 1000).await.unwrap();
        let all = ctx.query(&ElementQuery::css("a, button")).await.unwrap();
        ctx.click(&all[0]).await.unwrap();
        assert_eq!(ctx.get_url().await.unwrap(), "https://a.example/login");
        assert!(ctx.click(&all[1]).await.is_err());
        assert_eq!(ctx.bounding_box(&all[1]).await.unwrap(), None);
    }
}
