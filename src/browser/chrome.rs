//! [`PortalPage`] over a remote Chrome reached through the DevTools protocol.

use headless_chrome::{
    protocol::cdp::{Emulation::SetDeviceMetricsOverride, Page::CaptureScreenshotFormatOption, DOM},
    util::Wait,
    Browser, Element, Tab,
};
use std::{
    cell::Cell,
    path::Path,
    sync::Arc,
    time::{Duration, Instant},
};
use tracing::debug;
use url::Url;

use super::{BrowserConnector, BrowsingProfile, ElementState, FrameRef, PortalPage};
use crate::error::BrowserError;
use crate::model::Session;

/// How long the resource count must hold still to call the page idle.
const IDLE_WINDOW: Duration = Duration::from_millis(500);

pub struct ChromeConnector {
    idle_browser_timeout: Duration,
}

impl Default for ChromeConnector {
    fn default() -> Self {
        Self {
            idle_browser_timeout: Duration::from_secs(120),
        }
    }
}

impl BrowserConnector for ChromeConnector {
    fn connect(
        &self,
        session: &Session,
        profile: &BrowsingProfile,
    ) -> Result<Box<dyn PortalPage>, BrowserError> {
        let browser =
            Browser::connect_with_timeout(session.connect_url.clone(), self.idle_browser_timeout)
                .map_err(|e| BrowserError::Connect(e.to_string()))?;

        let tab = browser
            .new_context()
            .and_then(|context| context.new_tab())
            .map_err(|e| BrowserError::Connect(e.to_string()))?;

        tab.set_user_agent(&profile.user_agent, None, None)
            .map_err(protocol)?;
        tab.call_method(viewport_override(profile))
            .map_err(protocol)?;

        debug!(session_id = %session.id, "attached to remote browser");
        Ok(Box::new(ChromePage {
            _browser: browser,
            tab,
            closed: false,
        }))
    }
}

/// Dropping the page drops the browser handle, which ends the CDP connection.
pub struct ChromePage {
    _browser: Browser,
    tab: Arc<Tab>,
    closed: bool,
}

/// Pin the page layout to the profile's desktop viewport.
fn viewport_override(profile: &BrowsingProfile) -> SetDeviceMetricsOverride {
    SetDeviceMetricsOverride {
        width: profile.width,
        height: profile.height,
        device_scale_factor: 1.0,
        mobile: false,
        scale: None,
        screen_width: Some(profile.width),
        screen_height: Some(profile.height),
        position_x: None,
        position_y: None,
        dont_set_visible_size: None,
        screen_orientation: None,
        viewport: None,
        display_feature: None,
        device_posture: None,
    }
}

fn protocol(e: impl std::fmt::Display) -> BrowserError {
    BrowserError::Protocol(e.to_string())
}

impl ChromePage {
    /// Content document of the frame's owning `<iframe>`.
    ///
    /// Resolved on every call; node ids go stale as the widget re-renders.
    fn frame_document(&self, frame: &FrameRef) -> Result<Element<'_>, BrowserError> {
        let owner_selector = frame.owner_selector();
        let owner = self
            .tab
            .find_element(&owner_selector)
            .map_err(|_| BrowserError::NotFound(owner_selector.clone()))?;

        let described = self
            .tab
            .call_method(DOM::DescribeNode {
                node_id: Some(owner.node_id),
                backend_node_id: None,
                object_id: None,
                depth: Some(1),
                pierce: Some(true),
            })
            .map_err(protocol)?;
        let document = described
            .node
            .content_document
            .ok_or_else(|| BrowserError::NotFound(format!("{owner_selector} document")))?;

        let pushed = self
            .tab
            .call_method(DOM::PushNodesByBackendIdsToFrontend {
                backend_node_ids: vec![document.backend_node_id],
            })
            .map_err(protocol)?;
        let node_id = pushed
            .node_ids
            .into_iter()
            .find(|id| *id != 0)
            .ok_or_else(|| BrowserError::NotFound(format!("{owner_selector} document")))?;

        Element::new(&self.tab, node_id).map_err(protocol)
    }

    fn frame_element(&self, frame: &FrameRef, selector: &str) -> Result<Element<'_>, BrowserError> {
        let document = self.frame_document(frame)?;
        let element = document
            .find_element(selector)
            .map_err(|_| BrowserError::NotFound(selector.to_string()))?;
        Ok(element)
    }

    fn is_rendered(element: &Element<'_>) -> bool {
        element
            .get_box_model()
            .map(|b| b.width > 0.0 && b.height > 0.0)
            .unwrap_or(false)
    }
}

impl PortalPage for ChromePage {
    fn goto(&mut self, url: &Url, timeout: Duration) -> Result<(), BrowserError> {
        self.tab.set_default_timeout(timeout);
        self.tab
            .navigate_to(url.as_str())
            .and_then(|tab| tab.wait_until_navigated())
            .map_err(|e| BrowserError::Navigation {
                url: url.to_string(),
                message: e.to_string(),
            })?;
        Ok(())
    }

    fn title(&mut self) -> Result<String, BrowserError> {
        self.tab.get_title().map_err(protocol)
    }

    fn find_frame(
        &mut self,
        url_pattern: &str,
        timeout: Duration,
    ) -> Result<Option<FrameRef>, BrowserError> {
        let frame = FrameRef::new(url_pattern);
        let found = Wait::with_timeout(timeout).until(|| self.frame_document(&frame).ok().map(|_| ()));
        Ok(found.ok().map(|_| frame))
    }

    fn wait_for(
        &mut self,
        frame: &FrameRef,
        selector: &str,
        state: ElementState,
        timeout: Duration,
    ) -> Result<(), BrowserError> {
        Wait::with_timeout(timeout)
            .until(|| {
                let element = self.frame_element(frame, selector).ok()?;
                match state {
                    ElementState::Attached => Some(()),
                    ElementState::Visible => Self::is_rendered(&element).then_some(()),
                }
            })
            .map_err(|_| BrowserError::Timeout {
                selector: selector.to_string(),
                after: timeout,
            })
    }

    fn click(&mut self, frame: &FrameRef, selector: &str) -> Result<(), BrowserError> {
        self.frame_element(frame, selector)?
            .click()
            .map_err(protocol)?;
        Ok(())
    }

    fn fill(&mut self, frame: &FrameRef, selector: &str, text: &str) -> Result<(), BrowserError> {
        let element = self.frame_element(frame, selector)?;
        element
            .call_js_fn("function() { this.value = ''; }", vec![], false)
            .map_err(protocol)?;
        // Key events, so the value reaches the widget as typed text and never as script.
        element.type_into(text).map_err(protocol)?;
        Ok(())
    }

    fn press(&mut self, frame: &FrameRef, selector: &str, key: &str) -> Result<(), BrowserError> {
        self.frame_element(frame, selector)?
            .focus()
            .map_err(protocol)?;
        self.tab.press_key(key).map_err(protocol)?;
        Ok(())
    }

    fn scroll_into_view(&mut self, frame: &FrameRef, selector: &str) -> Result<(), BrowserError> {
        self.frame_element(frame, selector)?
            .scroll_into_view()
            .map_err(protocol)?;
        Ok(())
    }

    fn attribute(
        &mut self,
        frame: &FrameRef,
        selector: &str,
        name: &str,
    ) -> Result<Option<String>, BrowserError> {
        self.frame_element(frame, selector)?
            .get_attribute_value(name)
            .map_err(protocol)
    }

    fn wait_for_network_idle(&mut self, timeout: Duration) -> Result<(), BrowserError> {
        let last_count = Cell::new(None::<i64>);
        let quiet_since = Cell::new(Instant::now());
        Wait::with_timeout(timeout)
            .until(|| {
                let count = self
                    .tab
                    .evaluate(
                        "document.readyState === 'complete' \
                         ? performance.getEntriesByType('resource').length : -1",
                        false,
                    )
                    .ok()?
                    .value?
                    .as_i64()?;
                if count < 0 {
                    return None;
                }
                if last_count.get() != Some(count) {
                    last_count.set(Some(count));
                    quiet_since.set(Instant::now());
                    return None;
                }
                (quiet_since.get().elapsed() >= IDLE_WINDOW).then_some(())
            })
            .map_err(|_| BrowserError::Timeout {
                selector: "network idle".to_string(),
                after: timeout,
            })
    }

    fn content(&mut self) -> Result<String, BrowserError> {
        self.tab.get_content().map_err(protocol)
    }

    fn screenshot(&mut self, path: &Path) -> Result<(), BrowserError> {
        let png = self
            .tab
            .capture_screenshot(CaptureScreenshotFormatOption::Png, None, None, true)
            .map_err(protocol)?;
        std::fs::write(path, png)?;
        Ok(())
    }

    fn close(&mut self) -> Result<(), BrowserError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        self.tab.close(false).map_err(protocol)?;
        Ok(())
    }
}
