//! Tier-1: the local parcel table, zoning passages, and the generated explanation.

pub mod context;
pub mod explain;
pub mod store;

pub use context::{ContextRetriever, SqliteContextRetriever};
pub use explain::{Explainer, OpenRouterExplainer};
pub use store::{ParcelRecord, ParcelStore, SqliteParcelStore};
