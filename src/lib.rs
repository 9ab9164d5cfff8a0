//! Parcel zoning lookup.
//!
//! A parcel number is answered from the local parcel table when possible
//! ([`local`]), and otherwise by driving a remote browser through the LADBS
//! Atlas portal and reading the parcel profile report ([`orchestrator`]).

pub mod browser;
pub mod config;
pub mod error;
pub mod extract;
pub mod local;
pub mod model;
pub mod navigate;
pub mod orchestrator;
pub mod provision;
pub mod resolve;
pub mod server;
pub mod testing;

pub use error::{ExtractionError, NavigationError, ProvisionError, ResolveError};
pub use extract::extract_zoning;
pub use model::{ExtractionFailure, Identifier, Session, ZoningFields, ZoningRecord};
pub use navigate::{NavigationDriver, Pacing, Step};
pub use orchestrator::{ArtifactDir, FallbackScraper, ZoningFallback};
pub use provision::{BrowserbaseProvisioner, SessionProvisioner};
pub use resolve::{LookupResponse, Resolver};
