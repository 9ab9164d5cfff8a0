//! Scripted fakes for every seam, so the route, the orchestrator, and the
//! resolver can be exercised without a browser, a broker, or a model.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use url::Url;

use crate::browser::{BrowserConnector, BrowsingProfile, ElementState, FrameRef, PortalPage};
use crate::error::{BrowserError, ExplainError, ProvisionError, StoreError};
use crate::local::{ContextRetriever, Explainer, ParcelRecord, ParcelStore};
use crate::model::{ExtractionFailure, Identifier, Session, ZoningFields, ZoningRecord};
use crate::navigate::REPORT_LINK_SELECTOR;
use crate::orchestrator::ZoningFallback;
use crate::provision::SessionProvisioner;

pub const DEFAULT_REPORT: &str = r#"<html><body>
<table id="basic"><tbody>
<tr><td>Address:</td><td>100 N SPRING ST</td></tr>
<tr><td>Zone(s):</td><td>R1</td></tr>
</tbody></table>
</body></html>"#;

pub const DEFAULT_HREF: &str = "https://zimas.lacity.org/map.aspx?pin=ParcelProfileDetail2 &ajax=yes";

/// One call observed by a [`ScriptedPage`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageCall {
    Goto { url: String },
    Title,
    FindFrame { pattern: String },
    WaitFor { selector: String, state: ElementState },
    Click { selector: String },
    Fill { selector: String, text: String },
    Press { selector: String, key: String },
    ScrollIntoView { selector: String },
    Attribute { selector: String, name: String },
    NetworkIdle,
    Content,
    Screenshot,
    Close,
}

/// Shared record of page calls, readable after the page is gone.
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<PageCall>>>);

impl Journal {
    fn lock(&self) -> MutexGuard<'_, Vec<PageCall>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, call: PageCall) {
        self.lock().push(call);
    }

    pub fn calls(&self) -> Vec<PageCall> {
        self.lock().clone()
    }

    pub fn visited(&self) -> Vec<String> {
        self.lock()
            .iter()
            .filter_map(|c| match c {
                PageCall::Goto { url } => Some(url.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn closes(&self) -> usize {
        self.count(|c| matches!(c, PageCall::Close))
    }

    pub fn screenshots(&self) -> usize {
        self.count(|c| matches!(c, PageCall::Screenshot))
    }

    fn count(&self, pred: impl Fn(&PageCall) -> bool) -> usize {
        self.lock().iter().filter(|c| pred(c)).count()
    }
}

/// A page that behaves like the portal unless told otherwise.
#[derive(Debug, Clone)]
pub struct ScriptedPage {
    title: String,
    widget: bool,
    missing: HashSet<String>,
    unclickable: HashSet<String>,
    unreachable: HashSet<String>,
    busy_network: bool,
    href: Option<String>,
    report: String,
    panic_on_content: bool,
    fail_screenshot: bool,
    journal: Journal,
}

impl Default for ScriptedPage {
    fn default() -> Self {
        Self::new()
    }
}

impl ScriptedPage {
    pub fn new() -> Self {
        Self {
            title: "LADBS Atlas".to_string(),
            widget: true,
            missing: HashSet::new(),
            unclickable: HashSet::new(),
            unreachable: HashSet::new(),
            busy_network: false,
            href: Some(DEFAULT_HREF.to_string()),
            report: DEFAULT_REPORT.to_string(),
            panic_on_content: false,
            fail_screenshot: false,
            journal: Journal::default(),
        }
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }

    pub fn without_widget(mut self) -> Self {
        self.widget = false;
        self
    }

    /// Make `selector` never appear inside the widget.
    pub fn missing(mut self, selector: &str) -> Self {
        self.missing.insert(selector.to_string());
        self
    }

    /// `selector` is visible but every click on it fails.
    pub fn unclickable(mut self, selector: &str) -> Self {
        self.unclickable.insert(selector.to_string());
        self
    }

    /// Navigating to `url` fails.
    pub fn unreachable_url(mut self, url: &str) -> Self {
        self.unreachable.insert(url.to_string());
        self
    }

    /// The network never goes quiet.
    pub fn busy_network(mut self) -> Self {
        self.busy_network = true;
        self
    }

    pub fn with_href(mut self, href: &str) -> Self {
        self.href = Some(href.to_string());
        self
    }

    pub fn without_href(mut self) -> Self {
        self.href = None;
        self
    }

    pub fn with_report(mut self, html: &str) -> Self {
        self.report = html.to_string();
        self
    }

    pub fn panicking_content(mut self) -> Self {
        self.panic_on_content = true;
        self
    }

    pub fn failing_screenshot(mut self) -> Self {
        self.fail_screenshot = true;
        self
    }

    fn present(&self, selector: &str) -> Result<(), BrowserError> {
        if self.missing.contains(selector) {
            return Err(BrowserError::NotFound(selector.to_string()));
        }
        Ok(())
    }
}

impl PortalPage for ScriptedPage {
    fn goto(&mut self, url: &Url, _timeout: Duration) -> Result<(), BrowserError> {
        self.journal.record(PageCall::Goto {
            url: url.to_string(),
        });
        if self.unreachable.contains(url.as_str()) {
            return Err(BrowserError::Navigation {
                url: url.to_string(),
                message: "net::ERR_CONNECTION_RESET".to_string(),
            });
        }
        Ok(())
    }

    fn title(&mut self) -> Result<String, BrowserError> {
        self.journal.record(PageCall::Title);
        Ok(self.title.clone())
    }

    fn find_frame(
        &mut self,
        url_pattern: &str,
        _timeout: Duration,
    ) -> Result<Option<FrameRef>, BrowserError> {
        self.journal.record(PageCall::FindFrame {
            pattern: url_pattern.to_string(),
        });
        Ok(self.widget.then(|| FrameRef::new(url_pattern)))
    }

    fn wait_for(
        &mut self,
        _frame: &FrameRef,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        self.journal.record(PageCall::WaitFor {
            selector: selector.to_string(),
            state,
        });
        self.present(selector).map_err(|_| BrowserError::Timeout {
            selector: selector.to_string(),
            after: timeout,
        })
    }

    fn click(&mut self, _frame: &FrameRef, selector: &str) -> Result<(), BrowserError> {
        self.journal.record(PageCall::Click {
            selector: selector.to_string(),
        });
        self.present(selector)?;
        if self.unclickable.contains(selector) {
            return Err(BrowserError::Protocol(format!("`{selector}` is covered by another element")));
        }
        Ok(())
    }

    fn fill(&mut self, _frame: &FrameRef, selector: &str, text: &str) -> Result<(), BrowserError> {
        self.journal.record(PageCall::Fill {
            selector: selector.to_string(),
            text: text.to_string(),
        });
        self.present(selector)
    }

    fn press(&mut self, _frame: &FrameRef, selector: &str, key: &str) -> Result<(), BrowserError> {
        self.journal.record(PageCall::Press {
            selector: selector.to_string(),
            key: key.to_string(),
        });
        self.present(selector)
    }

    fn scroll_into_view(&mut self, _frame: &FrameRef, selector: &str) -> Result<(), BrowserError> {
        self.journal.record(PageCall::ScrollIntoView {
            selector: selector.to_string(),
        });
        self.present(selector)
    }

    fn attribute(
        &mut self,
        _frame: &FrameRef,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.journal.record(PageCall::Attribute {
            selector: selector.to_string(),
            name: name.to_string(),
        });
        self.present(selector)?;
        if selector == REPORT_LINK_SELECTOR && name == "href" {
            return Ok(self.href.clone());
        }
        Ok(None)
    }

    fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        self.journal.record(PageCall::NetworkIdle);
        if self.busy_network {
            return Err(BrowserError::Timeout {
                selector: "network idle".to_string(),
                after: timeout,
            });
        }
        Ok(())
    }

    fn content(&mut self) -> Result<String, BrowserError> {
        self.journal.record(PageCall::Content);
        if self.panic_on_content {
            panic!("scripted page crashed while reading content");
        }
        Ok(self.report.clone())
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        self.journal.record(PageCall::Screenshot);
        if self.fail_screenshot {
            return Err(BrowserError::Protocol("capture refused".to_string()));
        }
        std::fs::write(path, b"\x89PNG\r\n\x1a\n")?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        self.journal.record(PageCall::Close);
        Ok(())
    }
}

/// Hands out copies of one [`ScriptedPage`], all sharing a journal.
#[derive(Debug, Clone)]
pub struct ScriptedConnector {
    page: Option<ScriptedPage>,
    journal: Journal,
    connects: Arc<AtomicUsize>,
    profiles: Arc<Mutex<Vec<BrowsingProfile>>>,
}

impl ScriptedConnector {
    pub fn new(mut page: ScriptedPage) -> Self {
        let journal = Journal::default();
        page.journal = journal.clone();
        Self {
            page: Some(page),
            journal,
            connects: Arc::new(AtomicUsize::new(0)),
            profiles: Arc::default(),
        }
    }

    /// Every connect attempt fails.
    pub fn unreachable() -> Self {
        Self {
            page: None,
            journal: Journal::default(),
            connects: Arc::new(AtomicUsize::new(0)),
            profiles: Arc::default(),
        }
    }

    pub fn journal(&self) -> Journal {
        self.journal.clone()
    }

    pub fn connects(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    pub fn profiles(&self) -> Vec<BrowsingProfile> {
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl BrowserConnector for ScriptedConnector {
    fn connect(
        &self,
        _session: &Session,
        profile: &BrowsingProfile,
    ) -> Result<Box<dyn PortalPage>, BrowserError> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        self.profiles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(profile.clone());
        match &self.page {
            Some(page) => Ok(Box::new(page.clone())),
            None => Err(BrowserError::Connect("connection refused".to_string())),
        }
    }
}

#[derive(Debug, Clone)]
pub struct StaticProvisioner {
    reject_with: Option<u16>,
    calls: Arc<AtomicUsize>,
}

impl StaticProvisioner {
    pub fn ok() -> Self {
        Self {
            reject_with: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn rejecting(status: u16) -> Self {
        Self {
            reject_with: Some(status),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionProvisioner for StaticProvisioner {
    async fn provision(&self) -> Result<Session, ProvisionError> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        match self.reject_with {
            Some(status) => Err(ProvisionError::Rejected {
                status,
                body: "scripted rejection".to_string(),
            }),
            None => Ok(Session {
                id: format!("scripted-{n}"),
                connect_url: format!("wss://connect.example/scripted-{n}"),
                proxies: true,
            }),
        }
    }
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    parcels: HashMap<String, ParcelRecord>,
    failing: bool,
}

impl MemoryStore {
    pub fn with(parcel: ParcelRecord) -> Self {
        let mut parcels = HashMap::new();
        parcels.insert(parcel.ain.clone(), parcel);
        Self {
            parcels,
            failing: false,
        }
    }

    /// Every lookup fails as if the database were unreachable.
    pub fn failing() -> Self {
        Self {
            parcels: HashMap::new(),
            failing: true,
        }
    }
}

#[async_trait]
impl ParcelStore for MemoryStore {
    async fn find_parcel(&self, identifier: &Identifier) -> Result<Option<ParcelRecord>, StoreError> {
        if self.failing {
            return Err(StoreError::Database(sqlx::Error::PoolTimedOut));
        }
        Ok(self.parcels.get(identifier.as_str()).cloned())
    }
}

#[derive(Debug, Clone)]
pub struct StaticRetriever {
    passages: Option<Vec<String>>,
}

impl StaticRetriever {
    pub fn passages<I, S>(passages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            passages: Some(passages.into_iter().map(Into::into).collect()),
        }
    }

    pub fn failing() -> Self {
        Self { passages: None }
    }
}

#[async_trait]
impl ContextRetriever for StaticRetriever {
    async fn retrieve(&self, _query: &str) -> Result<Vec<String>, StoreError> {
        self.passages
            .clone()
            .ok_or(StoreError::Database(sqlx::Error::PoolClosed))
    }
}

#[derive(Debug, Clone)]
pub struct CannedExplainer {
    text: String,
    last_context: Arc<Mutex<Option<String>>>,
}

impl CannedExplainer {
    pub fn new(text: &str) -> Self {
        Self {
            text: text.to_string(),
            last_context: Arc::default(),
        }
    }

    pub fn last_context(&self) -> Option<String> {
        self.last_context
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl Explainer for CannedExplainer {
    async fn explain(&self, _parcel: &ParcelRecord, context: &str) -> Result<String, ExplainError> {
        *self.last_context.lock().unwrap_or_else(PoisonError::into_inner) = Some(context.to_string());
        Ok(self.text.clone())
    }
}

/// Answers every scrape the same way and counts the calls.
#[derive(Debug, Clone)]
pub struct CountingFallback {
    failure: Option<String>,
    calls: Arc<AtomicUsize>,
}

impl CountingFallback {
    pub fn succeeding() -> Self {
        Self {
            failure: None,
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            calls: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ZoningFallback for CountingFallback {
    async fn scrape_zoning(&self, identifier: &Identifier) -> Result<ZoningRecord, ExtractionFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.failure {
            Some(message) => Err(ExtractionFailure::new(identifier.clone(), message.clone())),
            None => Ok(ZoningRecord::new(
                identifier.clone(),
                "https://example.org/ParcelProfileDetail2".to_string(),
                ZoningFields {
                    zones: vec!["R1".to_string()],
                    flood_hazard_zone: "Not Found".to_string(),
                },
            )),
        }
    }
}
