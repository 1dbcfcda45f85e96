//! Error types for catalog and configuration problems.
//!
//! Per-row outcomes (absent, unmatched, ambiguous) are never errors; they are
//! reported through [`crate::MatchOutcome`]. Only a broken catalog definition
//! surfaces here.

use thiserror::Error;

use crate::ruleset::RulesetKind;

/// A problem with one region catalog entry. Fatal for that entry only.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("region type '{region_type}': malformed record: {source}")]
    Malformed {
        region_type: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("region type '{region_type}': invalid {kind} pattern '{pattern}': {source}")]
    InvalidPattern {
        region_type: String,
        kind: RulesetKind,
        pattern: String,
        #[source]
        source: regex::Error,
    },
    #[error("region type '{region_type}': feature {feature} has no '{property}' property")]
    MissingProperty {
        region_type: String,
        property: String,
        feature: usize,
    },
    #[error("region type '{region_type}': value {index} of '{property}' is not text or a number")]
    NonPrimitiveValue {
        region_type: String,
        property: String,
        index: usize,
    },
    #[error("region type '{region_type}': unknown disambiguation region '{reference}'")]
    UnknownDisambiguationRegion {
        region_type: String,
        reference: String,
    },
    #[error("region type '{region_type}': {what} already loaded")]
    AlreadyLoaded {
        region_type: String,
        what: &'static str,
    },
    #[error("region type '{region_type}': {found} disambiguation values for {expected} regions")]
    LengthMismatch {
        region_type: String,
        expected: usize,
        found: usize,
    },
}

impl ConfigError {
    /// Region type of the entry this error belongs to.
    pub fn region_type(&self) -> &str {
        match self {
            ConfigError::Malformed { region_type, .. }
            | ConfigError::InvalidPattern { region_type, .. }
            | ConfigError::MissingProperty { region_type, .. }
            | ConfigError::NonPrimitiveValue { region_type, .. }
            | ConfigError::UnknownDisambiguationRegion { region_type, .. }
            | ConfigError::AlreadyLoaded { region_type, .. }
            | ConfigError::LengthMismatch { region_type, .. } => region_type,
        }
    }
}

/// Failure to read a whole input document.
#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("JSON parse error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid GeoJSON: {0}")]
    InvalidGeoJson(String),
    #[error(transparent)]
    Config(#[from] ConfigError),
}
