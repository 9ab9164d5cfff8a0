//! Browser backends driven by the navigation route.
//!
//! The route only talks to [`PortalPage`], so the remote Chrome backend in
//! [`chrome`] and the scripted page in [`crate::testing`] are interchangeable.

pub mod chrome;

use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::error::BrowserError;
use crate::model::Session;

pub use chrome::ChromeConnector;

/// Identity presented by a fresh browsing context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowsingProfile {
    pub user_agent: String,
    pub width: u32,
    pub height: u32,
}

impl BrowsingProfile {
    /// Randomised user agent with a desktop-sized viewport.
    pub fn randomized() -> Self {
        Self {
            user_agent: ua_generator::ua::spoof_ua().to_string(),
            width: 1920,
            height: 1080,
        }
    }
}

/// Handle to an embedded document found by [`PortalPage::find_frame`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRef {
    pub url_pattern: String,
}

impl FrameRef {
    pub fn new(url_pattern: impl Into<String>) -> Self {
        Self {
            url_pattern: url_pattern.into(),
        }
    }

    /// Selector for the owning `<iframe>` in the top-level document.
    pub fn owner_selector(&self) -> String {
        format!("iframe[src*='{}']", self.url_pattern)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ElementState {
    Attached,
    Visible,
}

pub trait BrowserConnector: Send + Sync {
    /// Attach to the session's browser and open one isolated page.
    fn connect(
        &self,
        session: &Session,
        profile: &BrowsingProfile,
    ) -> Result<Box<dyn PortalPage>, BrowserError>;
}

/// One page in an isolated browsing context.
///
/// Calls block until the operation completes or its timeout expires.
pub trait PortalPage: Send {
    fn goto(&mut self, url: &Url, timeout: Duration) -> Result<(), BrowserError>;

    fn title(&mut self) -> Result<String, BrowserError>;

    /// `Ok(None)` when no embedded document matches within `timeout`.
    fn find_frame(
        &mut self,
        url_pattern: &str,
        timeout: Duration,
    ) -> Result<Option<FrameRef>, BrowserError>;

    fn wait_for(
        &mut self,
        frame: &FrameRef,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), BrowserError>;

    fn click(&mut self, frame: &FrameRef, selector: &str) -> Result<(), BrowserError>;

    /// Replace the element's value with `text`.
    fn fill(&mut self, frame: &FrameRef, selector: &str, text: &str) -> Result<(), BrowserError>;

    fn press(&mut self, frame: &FrameRef, selector: &str, key: &str) -> Result<(), BrowserError>;

    fn scroll_into_view(&mut self, frame: &FrameRef, selector: &str) -> Result<(), BrowserError>;

    fn attribute(
        &mut self,
        frame: &FrameRef,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, BrowserError>;

    fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError>;

    /// Serialized DOM of the top-level document.
    fn content(&mut self) -> Result<String, BrowserError>;

    fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError>;

    fn close(&mut self) -> Result<(), BrowserError>;
}
