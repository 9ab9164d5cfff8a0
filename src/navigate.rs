//! The portal route: from the Atlas landing page to a parcel's report URL.
//!
//! Each [`Step`] runs once, in order, against the same page. Every step is
//! fatal on failure except [`Step::DismissModal`], which is attempted and
//! logged when it does not succeed.

use rand::Rng;
use std::{fmt, sync::Arc, time::Duration};
use tracing::{debug, info, warn};
use url::Url;

use crate::browser::{BrowserConnector, BrowsingProfile, ElementState, FrameRef, PortalPage};
use crate::error::{NavigationError, StepFault};
use crate::model::{Identifier, Session};

pub const PORTAL_URL: &str = "https://ladbs.org/atlas/";
pub const WIDGET_URL: &str =
    "https://experience.arcgis.com/experience/31c73214b7034356a3cd4903bab233f7/page/Page";
pub const ACKNOWLEDGE_SELECTOR: &str = "#jimu-link-app-2 > span.touch-ripple-root";
pub const SEARCH_SELECTOR: &str = "input[placeholder*='Search by Address']";
pub const RESULT_SELECTOR: &str = "calcite-flow-item";
pub const REPORT_LINK_SELECTOR: &str = "calcite-flow-item a[href*='ParcelProfileDetail2']";
pub const UNAVAILABLE_TITLE: &str = "Service unavailable";

const PAGE_LOAD: Duration = Duration::from_secs(60);
const MODAL_WAIT: Duration = Duration::from_secs(60);
const RESULT_PANEL: Duration = Duration::from_secs(60);
const REPORT_LOAD: Duration = Duration::from_secs(90);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    Connect,
    LoadPortal,
    LocateWidget,
    DismissModal,
    Submit,
    AwaitResult,
    ExtractLink,
    FollowLink,
}

impl Step {
    pub fn name(self) -> &'static str {
        match self {
            Step::Connect => "connect",
            Step::LoadPortal => "load-portal",
            Step::LocateWidget => "locate-widget",
            Step::DismissModal => "dismiss-modal",
            Step::Submit => "submit",
            Step::AwaitResult => "await-result",
            Step::ExtractLink => "extract-link",
            Step::FollowLink => "follow-link",
        }
    }

    pub fn is_fatal(self) -> bool {
        !matches!(self, Step::DismissModal)
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Randomised pause after submitting the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pacing {
    pub min: Duration,
    pub max: Duration,
}

impl Pacing {
    pub fn human() -> Self {
        Self {
            min: Duration::from_secs(3),
            max: Duration::from_secs(6),
        }
    }

    pub fn none() -> Self {
        Self {
            min: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    pub fn pick(&self) -> Duration {
        if self.max <= self.min {
            return self.min;
        }
        let secs = rand::thread_rng().gen_range(self.min.as_secs_f64()..=self.max.as_secs_f64());
        Duration::from_secs_f64(secs)
    }

    fn pause(&self) {
        let delay = self.pick();
        if delay.is_zero() {
            return;
        }
        debug!(secs = format_args!("{:.2}", delay.as_secs_f64()), "pausing");
        std::thread::sleep(delay);
    }
}

/// The cleaned URL of a parcel's complete profile report.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReportLink(pub Url);

impl ReportLink {
    /// Strip every whitespace character from `href` and resolve it against
    /// the widget document.
    pub fn from_href(href: &str) -> Result<Self, StepFault> {
        let cleaned: String = href.chars().filter(|c| !c.is_whitespace()).collect();
        let bad_link = |source| StepFault::BadLink {
            href: href.to_string(),
            source,
        };
        let base = Url::parse(WIDGET_URL).map_err(bad_link)?;
        base.join(&cleaned).map(Self).map_err(bad_link)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

struct RouteState<'a> {
    identifier: &'a Identifier,
    pacing: Pacing,
    widget: Option<FrameRef>,
    link: Option<ReportLink>,
}

impl RouteState<'_> {
    fn widget(&self) -> Result<&FrameRef, StepFault> {
        self.widget.as_ref().ok_or(StepFault::FrameNotFound)
    }
}

type StepFn = fn(&mut dyn PortalPage, &mut RouteState<'_>) -> Result<(), StepFault>;

/// Steps run on an already connected page, in order.
const ROUTE: [(Step, StepFn); 7] = [
    (Step::LoadPortal, load_portal),
    (Step::LocateWidget, locate_widget),
    (Step::DismissModal, dismiss_modal),
    (Step::Submit, submit),
    (Step::AwaitResult, await_result),
    (Step::ExtractLink, extract_link),
    (Step::FollowLink, follow_link),
];

pub struct NavigationDriver {
    connector: Arc<dyn BrowserConnector>,
    pacing: Pacing,
}

impl NavigationDriver {
    pub fn new(connector: Arc<dyn BrowserConnector>) -> Self {
        Self {
            connector,
            pacing: Pacing::human(),
        }
    }

    pub fn with_pacing(mut self, pacing: Pacing) -> Self {
        self.pacing = pacing;
        self
    }

    /// [`Step::Connect`]: attach to the session with a fresh browsing profile.
    pub fn connect(&self, session: &Session) -> Result<Box<dyn PortalPage>, NavigationError> {
        let profile = BrowsingProfile::randomized();
        debug!(session_id = %session.id, user_agent = %profile.user_agent, "connecting");
        self.connector
            .connect(session, &profile)
            .map_err(|e| NavigationError::new(Step::Connect, StepFault::Connect(e)))
    }

    /// Walk the route from the portal to the report and leave `page` there.
    pub fn resolve_report_link(
        &self,
        page: &mut dyn PortalPage,
        identifier: &Identifier,
    ) -> Result<ReportLink, NavigationError> {
        let mut state = RouteState {
            identifier,
            pacing: self.pacing,
            widget: None,
            link: None,
        };

        for (step, run) in ROUTE {
            debug!(apn = %identifier, %step, "step started");
            match run(page, &mut state) {
                Ok(()) => debug!(apn = %identifier, %step, "step complete"),
                Err(fault) if !step.is_fatal() => {
                    warn!(apn = %identifier, %step, error = %fault, "step skipped");
                }
                Err(fault) => return Err(NavigationError::new(step, fault)),
            }
        }

        let link = state.link.ok_or_else(|| {
            NavigationError::new(Step::ExtractLink, StepFault::MissingHref)
        })?;
        info!(apn = %identifier, link = %link.as_str(), "report page loaded");
        Ok(link)
    }
}

fn load_portal(page: &mut dyn PortalPage, _state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let portal = Url::parse(PORTAL_URL).map_err(|source| StepFault::BadLink {
        href: PORTAL_URL.to_string(),
        source,
    })?;
    page.goto(&portal, PAGE_LOAD)?;
    let title = page.title()?;
    debug!(%title, "portal loaded");
    if title.contains(UNAVAILABLE_TITLE) {
        return Err(StepFault::ServiceUnavailable { title });
    }
    Ok(())
}

fn locate_widget(page: &mut dyn PortalPage, state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let frame = page
        .find_frame(WIDGET_URL, PAGE_LOAD)?
        .ok_or(StepFault::FrameNotFound)?;
    state.widget = Some(frame);
    Ok(())
}

fn dismiss_modal(page: &mut dyn PortalPage, state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let widget = state.widget()?;
    page.wait_for(widget, ACKNOWLEDGE_SELECTOR, ElementState::Visible, MODAL_WAIT)?;
    page.click(widget, ACKNOWLEDGE_SELECTOR)?;
    Ok(())
}

fn submit(page: &mut dyn PortalPage, state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let widget = state.widget()?;
    page.fill(widget, SEARCH_SELECTOR, state.identifier.as_str())?;
    page.press(widget, SEARCH_SELECTOR, "Enter")?;
    state.pacing.pause();
    Ok(())
}

fn await_result(page: &mut dyn PortalPage, state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let widget = state.widget()?;
    page.wait_for(widget, RESULT_SELECTOR, ElementState::Attached, RESULT_PANEL)?;
    page.scroll_into_view(widget, RESULT_SELECTOR)?;
    page.wait_for(widget, RESULT_SELECTOR, ElementState::Visible, RESULT_PANEL)?;
    Ok(())
}

fn extract_link(page: &mut dyn PortalPage, state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let widget = state.widget()?;
    page.wait_for(widget, REPORT_LINK_SELECTOR, ElementState::Visible, RESULT_PANEL)?;
    let href = page
        .attribute(widget, REPORT_LINK_SELECTOR, "href")?
        .ok_or(StepFault::MissingHref)?;
    let link = ReportLink::from_href(&href)?;
    debug!(raw = %href, cleaned = %link.as_str(), "report link cleaned");
    state.link = Some(link);
    Ok(())
}

fn follow_link(page: &mut dyn PortalPage, state: &mut RouteState<'_>) -> Result<(), StepFault> {
    let link = state.link.as_ref().ok_or(StepFault::MissingHref)?;
    page.goto(&link.0, REPORT_LOAD)?;
    page.wait_for_network_idle(REPORT_LOAD)?;
    Ok(())
}
