use std::time::Duration;
use thiserror::Error;

use crate::navigate::Step;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("identifier must be a non-empty string")]
pub struct InvalidIdentifier;

/// Session broker failures. Never retried here.
#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("missing broker credential: {0}")]
    MissingCredential(&'static str),
    #[error("session broker unreachable: {0}")]
    Network(#[from] reqwest::Error),
    #[error("session broker rejected request with status {status}: {body}")]
    Rejected { status: u16, body: String },
    #[error("session broker returned an unusable body (status {status}): {body}")]
    MalformedBody { status: u16, body: String },
}

impl ProvisionError {
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Rejected { status, .. } | Self::MalformedBody { status, .. } => Some(*status),
            Self::Network(e) => e.status().map(|s| s.as_u16()),
            Self::MissingCredential(_) => None,
        }
    }
}

/// Faults raised by a browser backend.
#[derive(Debug, Error)]
pub enum BrowserError {
    #[error("could not attach to remote browser: {0}")]
    Connect(String),
    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },
    #[error("timed out after {after:?} waiting for `{selector}`")]
    Timeout { selector: String, after: Duration },
    #[error("no element matches `{0}`")]
    NotFound(String),
    #[error("devtools protocol error: {0}")]
    Protocol(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Why a navigation step failed.
#[derive(Debug, Error)]
pub enum StepFault {
    #[error("connect failed: {0}")]
    Connect(#[source] BrowserError),
    #[error("service unavailable (page title: {title:?})")]
    ServiceUnavailable { title: String },
    #[error("iframe not found")]
    FrameNotFound,
    #[error("report link has no href")]
    MissingHref,
    #[error("report link {href:?} is not a valid url: {source}")]
    BadLink {
        href: String,
        #[source]
        source: url::ParseError,
    },
    #[error(transparent)]
    Browser(#[from] BrowserError),
}

#[derive(Debug, Error)]
#[error("{step} step failed: {fault}")]
pub struct NavigationError {
    pub step: Step,
    #[source]
    pub fault: StepFault,
}

impl NavigationError {
    pub fn new(step: Step, fault: StepFault) -> Self {
        Self { step, fault }
    }

    pub fn is_service_unavailable(&self) -> bool {
        matches!(self.fault, StepFault::ServiceUnavailable { .. })
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("table not found (expected table#{0})")]
    TableNotFound(&'static str),
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Error)]
pub enum ExplainError {
    #[error("generation request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("generation API returned {status}: {body}")]
    Api { status: u16, body: String },
    #[error("generation API returned no choices")]
    Empty,
}

/// Tier-1 failures surfaced to the boundary instead of triggering a scrape.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("local parcel lookup failed: {0}")]
    Store(#[source] StoreError),
    #[error("explanation failed: {0}")]
    Explain(#[source] ExplainError),
}
