use serde::{Deserialize, Serialize};
use std::{fmt, path::PathBuf};

use crate::error::InvalidIdentifier;

/// Assessor's parcel number as supplied by the caller.
///
/// The value is opaque: it is used verbatim as the local store key and typed
/// into the portal's search box.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identifier(String);

impl Identifier {
    pub fn parse(raw: &str) -> Result<Self, InvalidIdentifier> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(InvalidIdentifier);
        }
        Ok(Self(trimmed.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Filesystem-safe rendition used for artifact names.
    pub fn file_stem(&self) -> String {
        self.0
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' { c } else { '_' })
            .collect()
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for Identifier {
    type Error = InvalidIdentifier;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Identifier> for String {
    fn from(id: Identifier) -> Self {
        id.0
    }
}

/// A remote browser session issued by the session broker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: String,
    pub connect_url: String,
    pub proxies: bool,
}

/// Fields pulled out of the parcel profile report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoningFields {
    pub zones: Vec<String>,
    pub flood_hazard_zone: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ZoningRecord {
    #[serde(rename = "apn")]
    pub identifier: Identifier,
    #[serde(rename = "link")]
    pub source_link: String,
    pub zones: Vec<String>,
    pub flood_hazard_zone: String,
}

impl ZoningRecord {
    pub fn new(identifier: Identifier, source_link: String, fields: ZoningFields) -> Self {
        Self {
            identifier,
            source_link,
            zones: fields.zones,
            flood_hazard_zone: fields.flood_hazard_zone,
        }
    }
}

/// Outcome of a failed fallback attempt, returned to the caller as data.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ExtractionFailure {
    #[serde(rename = "apn")]
    pub identifier: Identifier,
    #[serde(rename = "error")]
    pub message: String,
    #[serde(rename = "screenshot", skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
}

impl ExtractionFailure {
    pub fn new(identifier: Identifier, message: impl Into<String>) -> Self {
        Self {
            identifier,
            message: message.into(),
            artifact: None,
        }
    }

    pub fn with_artifact(mut self, artifact: Option<PathBuf>) -> Self {
        self.artifact = artifact;
        self
    }
}
