//! Region mapping configuration records.
//!
//! The shape follows `regionMapping.json`:
//!
//! ```json
//! {
//!   "regionWmsMap": {
//!     "POA": {
//!       "regionProp": "POA_CODE",
//!       "aliases": ["poa", "postcode", "zip"],
//!       "serverReplacements": [["^poa", ""]],
//!       "dataReplacements": [["^poa", ""]]
//!     }
//!   }
//! }
//! ```
//!
//! Property names are matched case-sensitively. Unknown keys are ignored.
//! Each region type record is decoded on its own, so one malformed record
//! only costs that region type.

use indexmap::IndexMap;
use serde::Deserialize;
use serde_json::Value;

use crate::error::{CatalogError, ConfigError};

/// A `[pattern, replacement]` pair.
pub type ReplacementPair = (String, String);

/// Top-level configuration; region types keep their declaration order.
///
/// Records stay raw JSON until [`RegionProviderConfig::from_value`] decodes
/// them one at a time.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionMappingConfig {
    #[serde(default)]
    pub region_wms_map: IndexMap<String, Value>,
}

impl RegionMappingConfig {
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Decode every record, in declaration order.
    pub fn providers(
        &self,
    ) -> impl Iterator<Item = (&str, Result<RegionProviderConfig, ConfigError>)> + '_ {
        self.region_wms_map
            .iter()
            .map(|(region_type, record)| {
                (region_type.as_str(), RegionProviderConfig::from_value(region_type, record))
            })
    }
}

/// Configuration for one region type.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegionProviderConfig {
    /// Feature property holding the region code
    pub region_prop: String,
    /// Feature property holding a human-readable name
    #[serde(default)]
    pub name_prop: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub layer_name: Option<String>,
    #[serde(default)]
    pub server: Option<String>,
    /// `"WMS"` or `"MVT"`; anything else is treated as MVT
    #[serde(default)]
    pub server_type: Option<String>,
    /// Column names resolving to this region type. Defaults to the type name.
    #[serde(default)]
    pub aliases: Option<Vec<String>>,
    #[serde(default)]
    pub data_replacements: Vec<ReplacementPair>,
    #[serde(default)]
    pub server_replacements: Vec<ReplacementPair>,
    #[serde(default)]
    pub disambig_data_replacements: Vec<ReplacementPair>,
    #[serde(default)]
    pub disambig_server_replacements: Vec<ReplacementPair>,
    /// Feature property used to tell apart regions sharing a code
    #[serde(default)]
    pub disambig_prop: Option<String>,
    /// Region type whose rules and aliases describe the disambiguation column
    #[serde(default)]
    pub disambig_region_id: Option<String>,
    /// Pre-generated ids list the loader should fetch
    #[serde(default)]
    pub region_ids_file: Option<String>,
    #[serde(default)]
    pub region_disambig_ids_file: Option<String>,
    /// Region codes are text even when they look numeric
    #[serde(default)]
    pub text_codes: bool,
    /// Feature property holding a unique feature id
    #[serde(default)]
    pub unique_id_prop: Option<String>,
}

impl RegionProviderConfig {
    /// Decode one `regionWmsMap` record.
    pub fn from_value(region_type: &str, record: &Value) -> Result<Self, ConfigError> {
        Self::deserialize(record).map_err(|source| ConfigError::Malformed {
            region_type: region_type.to_string(),
            source,
        })
    }
}

/// A pre-generated ids file: values in feature order.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RegionIdsFile {
    pub values: Vec<Value>,
}

impl RegionIdsFile {
    pub fn from_json(text: &str) -> Result<Self, CatalogError> {
        Ok(serde_json::from_str(text)?)
    }
}
