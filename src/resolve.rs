//! Two-tier resolution and the response envelope returned to callers.

use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::ResolveError;
use crate::local::context::{NO_DOCUMENTS, RETRIEVAL_ERROR};
use crate::local::{ContextRetriever, Explainer, ParcelRecord, ParcelStore};
use crate::model::{ExtractionFailure, Identifier, ZoningRecord};
use crate::orchestrator::ZoningFallback;

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseAnswer {
    pub parcel_data: ParcelRecord,
    pub context: String,
    pub explanation: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum ScrapeOutcome {
    Record(ZoningRecord),
    Failure(ExtractionFailure),
}

impl From<Result<ZoningRecord, ExtractionFailure>> for ScrapeOutcome {
    fn from(result: Result<ZoningRecord, ExtractionFailure>) -> Self {
        match result {
            Ok(record) => Self::Record(record),
            Err(failure) => Self::Failure(failure),
        }
    }
}

/// Tagged by `source` with the tier that answered.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "source", rename_all = "lowercase")]
pub enum LookupResponse {
    Database(DatabaseAnswer),
    Webscraper(ScrapeOutcome),
}

pub struct Resolver {
    store: Arc<dyn ParcelStore>,
    retriever: Arc<dyn ContextRetriever>,
    explainer: Arc<dyn Explainer>,
    fallback: Arc<dyn ZoningFallback>,
}

impl Resolver {
    pub fn new(
        store: Arc<dyn ParcelStore>,
        retriever: Arc<dyn ContextRetriever>,
        explainer: Arc<dyn Explainer>,
        fallback: Arc<dyn ZoningFallback>,
    ) -> Self {
        Self {
            store,
            retriever,
            explainer,
            fallback,
        }
    }

    /// Local store first; the portal only on a clean miss.
    pub async fn resolve(&self, identifier: &Identifier) -> Result<LookupResponse, ResolveError> {
        let parcel = self
            .store
            .find_parcel(identifier)
            .await
            .map_err(ResolveError::Store)?;

        let Some(parcel) = parcel else {
            info!(apn = %identifier, "not in local store, falling back to portal");
            let outcome = self.fallback.scrape_zoning(identifier).await;
            return Ok(LookupResponse::Webscraper(outcome.into()));
        };

        let query = format!(
            "Zoning and regulations for {}",
            parcel.situs_address.as_deref().unwrap_or("this area")
        );
        let context = self.context_for(&query).await;
        let explanation = self
            .explainer
            .explain(&parcel, &context)
            .await
            .map_err(ResolveError::Explain)?;

        Ok(LookupResponse::Database(DatabaseAnswer {
            parcel_data: parcel,
            context,
            explanation,
        }))
    }

    async fn context_for(&self, query: &str) -> String {
        match self.retriever.retrieve(query).await {
            Ok(passages) if passages.is_empty() => NO_DOCUMENTS.to_string(),
            Ok(passages) => passages.join("\n"),
            Err(e) => {
                warn!(error = %e, "context retrieval failed");
                RETRIEVAL_ERROR.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{CannedExplainer, CountingFallback, MemoryStore, StaticRetriever};

    fn apn(s: &str) -> Identifier {
        Identifier::parse(s).unwrap()
    }

    fn parcel(ain: &str) -> ParcelRecord {
        ParcelRecord {
            ain: ain.into(),
            situs_address: Some("100 N SPRING ST".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn local_hit_never_scrapes() {
        let fallback = CountingFallback::succeeding();
        let explainer = CannedExplainer::new("explained");
        let resolver = Resolver::new(
            Arc::new(MemoryStore::with(parcel("5555-010-020"))),
            Arc::new(StaticRetriever::passages(["a", "b"])),
            Arc::new(explainer.clone()),
            Arc::new(fallback.clone()),
        );

        let response = resolver.resolve(&apn("5555-010-020")).await.unwrap();
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["source"], "database");
        assert_eq!(v["context"], "a\nb");
        assert_eq!(v["explanation"], "explained");
        assert_eq!(v["parcel_data"]["AIN"], "5555-010-020");
        assert_eq!(fallback.calls(), 0);
        assert_eq!(explainer.last_context().as_deref(), Some("a\nb"));
    }

    #[tokio::test]
    async fn local_miss_scrapes_once() {
        let fallback = CountingFallback::succeeding();
        let resolver = Resolver::new(
            Arc::new(MemoryStore::default()),
            Arc::new(StaticRetriever::passages(Vec::<String>::new())),
            Arc::new(CannedExplainer::new("unused")),
            Arc::new(fallback.clone()),
        );

        let response = resolver.resolve(&apn("1234-001-002")).await.unwrap();
        let v = serde_json::to_value(&response).unwrap();
        assert_eq!(v["source"], "webscraper");
        assert_eq!(v["apn"], "1234-001-002");
        assert_eq!(fallback.calls(), 1);
    }

    #[tokio::test]
    async fn store_error_is_surfaced_not_scraped() {
        let fallback = CountingFallback::succeeding();
        let resolver = Resolver::new(
            Arc::new(MemoryStore::failing()),
            Arc::new(StaticRetriever::passages(Vec::<String>::new())),
            Arc::new(CannedExplainer::new("unused")),
            Arc::new(fallback.clone()),
        );

        let err = resolver.resolve(&apn("1234-001-002")).await.unwrap_err();
        assert!(matches!(err, ResolveError::Store(_)));
        assert_eq!(fallback.calls(), 0);
    }

    #[tokio::test]
    async fn retrieval_degrades_to_placeholders() {
        let store = Arc::new(MemoryStore::with(parcel("1")));
        let empty = Resolver::new(
            store.clone(),
            Arc::new(StaticRetriever::passages(Vec::<String>::new())),
            Arc::new(CannedExplainer::new("x")),
            Arc::new(CountingFallback::succeeding()),
        );
        let failing = Resolver::new(
            store,
            Arc::new(StaticRetriever::failing()),
            Arc::new(CannedExplainer::new("x")),
            Arc::new(CountingFallback::succeeding()),
        );

        let v = serde_json::to_value(empty.resolve(&apn("1")).await.unwrap()).unwrap();
        assert_eq!(v["context"], NO_DOCUMENTS);
        let v = serde_json::to_value(failing.resolve(&apn("1")).await.unwrap()).unwrap();
        assert_eq!(v["context"], RETRIEVAL_ERROR);
    }

    #[tokio::test]
    async fn scrape_failure_is_tagged_webscraper() {
        let resolver = Resolver::new(
            Arc::new(MemoryStore::default()),
            Arc::new(StaticRetriever::passages(Vec::<String>::new())),
            Arc::new(CannedExplainer::new("unused")),
            Arc::new(CountingFallback::failing("session creation failed")),
        );

        let v = serde_json::to_value(resolver.resolve(&apn("9")).await.unwrap()).unwrap();
        assert_eq!(v["source"], "webscraper");
        assert_eq!(v["error"], "session creation failed");
        assert_eq!(v["apn"], "9");
    }
}
