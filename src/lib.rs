//! Region identifier matching
//!
//! Resolves free-text region identifiers from tabular data (postcodes,
//! suburb names, state names) to the features of a boundary dataset.
//! Values are normalized with per-region-type regex rules, cached, and
//! looked up against the dataset's known ids; repeated codes are told apart
//! with a secondary disambiguation column.
//!
//! Build with the `python` feature for the native extension module.

mod boundary;
mod catalog;
mod columns;
mod config;
mod entry;
mod error;
mod matcher;
mod normalize;
mod ruleset;
mod synthesize;
mod tile_index;
mod value;

#[cfg(feature = "python")]
mod python;

pub use boundary::{features_from_geojson, BoundaryFeature};
pub use catalog::{CatalogLoad, RegionCatalog, RegionDetail};
pub use columns::find_variable_for_aliases;
pub use config::{RegionIdsFile, RegionMappingConfig, RegionProviderConfig, ReplacementPair};
pub use entry::{RegionCatalogEntry, ServerKind};
pub use error::{CatalogError, ConfigError};
pub use matcher::{resolve, resolve_columns, resolve_parallel, ColumnJob, MatchOutcome, RowMatch};
pub use normalize::{normalize, ReplacementCache};
pub use ruleset::{ReplacementRule, Ruleset, RulesetKind, Rulesets};
pub use synthesize::{
    inject_feature_ids, primitive_properties, synthesize, synthesize_geojson, unique_properties,
    FEATURE_ID_PROP,
};
pub use tile_index::{BoundingBox, TileIndex, TileKey};
pub use value::RegionValue;
