//! Tier-2: one provisioned browser session per attempt, always released.

use async_trait::async_trait;
use std::{
    ops::{Deref, DerefMut},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

use crate::browser::PortalPage;
use crate::extract::extract_zoning;
use crate::model::{ExtractionFailure, Identifier, Session, ZoningRecord};
use crate::navigate::NavigationDriver;
use crate::provision::SessionProvisioner;

#[async_trait]
pub trait ZoningFallback: Send + Sync {
    async fn scrape_zoning(&self, identifier: &Identifier) -> Result<ZoningRecord, ExtractionFailure>;
}

/// Where failure screenshots go.
#[derive(Debug, Clone)]
pub struct ArtifactDir(PathBuf);

impl ArtifactDir {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self(dir.into())
    }

    pub fn path(&self) -> &Path {
        &self.0
    }

    /// `<dir>/<apn>-<timestamp>.png`
    pub fn screenshot_path(&self, identifier: &Identifier) -> PathBuf {
        let ts = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
        self.0.join(format!("{}-{}.png", identifier.file_stem(), ts))
    }
}

/// Closes the page when dropped, so every exit path releases it once.
struct OpenPage(Box<dyn PortalPage>);

impl Deref for OpenPage {
    type Target = dyn PortalPage;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl DerefMut for OpenPage {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.0.as_mut()
    }
}

impl Drop for OpenPage {
    fn drop(&mut self) {
        match self.0.close() {
            Ok(()) => info!("browser closed"),
            Err(e) => warn!(error = %e, "browser close failed"),
        }
    }
}

pub struct FallbackScraper {
    provisioner: Arc<dyn SessionProvisioner>,
    driver: Arc<NavigationDriver>,
    artifacts: ArtifactDir,
}

impl FallbackScraper {
    pub fn new(
        provisioner: Arc<dyn SessionProvisioner>,
        driver: NavigationDriver,
        artifacts: ArtifactDir,
    ) -> Self {
        Self {
            provisioner,
            driver: Arc::new(driver),
            artifacts,
        }
    }

    pub async fn scrape(&self, identifier: &Identifier) -> Result<ZoningRecord, ExtractionFailure> {
        let session = match self.provisioner.provision().await {
            Ok(session) => session,
            Err(e) => {
                warn!(apn = %identifier, status = ?e.status(), error = %e, "session creation failed");
                return Err(ExtractionFailure::new(identifier.clone(), "session creation failed"));
            }
        };

        let driver = Arc::clone(&self.driver);
        let artifacts = self.artifacts.clone();
        let id = identifier.clone();
        let attempt =
            tokio::task::spawn_blocking(move || run_attempt(&driver, &session, &id, &artifacts));

        match attempt.await {
            Ok(outcome) => outcome,
            Err(join) => {
                warn!(apn = %identifier, error = %join, "scrape attempt aborted");
                Err(ExtractionFailure::new(
                    identifier.clone(),
                    format!("unexpected fault: {join}"),
                ))
            }
        }
    }
}

#[async_trait]
impl ZoningFallback for FallbackScraper {
    async fn scrape_zoning(&self, identifier: &Identifier) -> Result<ZoningRecord, ExtractionFailure> {
        self.scrape(identifier).await
    }
}

fn run_attempt(
    driver: &NavigationDriver,
    session: &Session,
    identifier: &Identifier,
    artifacts: &ArtifactDir,
) -> Result<ZoningRecord, ExtractionFailure> {
    let page = driver.connect(session).map_err(|e| {
        warn!(apn = %identifier, error = %e, "navigation failed");
        ExtractionFailure::new(identifier.clone(), e.to_string())
    })?;
    let mut page = OpenPage(page);

    let fail = |page: &mut OpenPage, message: String| {
        warn!(apn = %identifier, error = %message, "scrape failed");
        let artifact = capture(&mut **page, identifier, artifacts);
        ExtractionFailure::new(identifier.clone(), message).with_artifact(artifact)
    };

    let link = match driver.resolve_report_link(&mut *page, identifier) {
        Ok(link) => link,
        Err(e) => return Err(fail(&mut page, e.to_string())),
    };

    let html = match page.content() {
        Ok(html) => html,
        Err(e) => return Err(fail(&mut page, e.to_string())),
    };

    match extract_zoning(&html) {
        Ok(fields) => {
            info!(apn = %identifier, zones = fields.zones.len(), "zoning extracted");
            Ok(ZoningRecord::new(identifier.clone(), link.as_str().to_string(), fields))
        }
        Err(e) => Err(fail(&mut page, e.to_string())),
    }
}

/// Best-effort screenshot; a failure here is logged and never replaces the
/// error being reported.
fn capture(page: &mut dyn PortalPage, identifier: &Identifier, artifacts: &ArtifactDir) -> Option<PathBuf> {
    if let Err(e) = std::fs::create_dir_all(artifacts.path()) {
        warn!(dir = %artifacts.path().display(), error = %e, "artifact dir unavailable");
        return None;
    }
    let path = artifacts.screenshot_path(identifier);
    match page.screenshot(&path) {
        Ok(()) => {
            info!(path = %path.display(), "failure screenshot saved");
            Some(path)
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failure screenshot not captured");
            None
        }
    }
}
