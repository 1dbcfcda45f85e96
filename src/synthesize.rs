//! Build catalog entries for a boundary dataset that has no configuration.
//!
//! Every property holding a unique primitive value on every feature can
//! serve as a region code, so each such property becomes one entry. A
//! zero-based `FID` is injected first, so a non-empty dataset always yields
//! at least one entry.

use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::boundary::{features_from_geojson, BoundaryFeature};
use crate::entry::{RegionCatalogEntry, ServerKind};
use crate::error::CatalogError;
use crate::tile_index::TileIndex;
use crate::value::RegionValue;

/// Property injected into every synthesized feature: its position.
pub const FEATURE_ID_PROP: &str = "FID";

static AD_HOC_SEQ: AtomicUsize = AtomicUsize::new(0);

/// Set `FID` on every feature to its zero-based position.
pub fn inject_feature_ids(features: &mut [BoundaryFeature]) {
    for (i, feature) in features.iter_mut().enumerate() {
        if let Some(old) = feature.properties.insert(FEATURE_ID_PROP.to_string(), Value::from(i)) {
            debug!(feature = i, replaced = %old, "overwrote existing FID");
        }
    }
}

/// Property names holding a string or number on every feature.
pub fn primitive_properties(features: &[BoundaryFeature]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut names = Vec::new();
    for feature in features {
        for key in feature.properties.keys() {
            if seen.insert(key.as_str()) {
                names.push(key.clone());
            }
        }
    }

    names.retain(|name| {
        features
            .iter()
            .all(|f| f.property(name).and_then(RegionValue::from_json).is_some())
    });
    names
}

/// The subset of `candidates` whose values are distinct across all features.
///
/// Values are compared after folding (trimmed, lowercased) since that is how
/// they will be matched.
pub fn unique_properties(features: &[BoundaryFeature], candidates: Vec<String>) -> Vec<String> {
    candidates
        .into_iter()
        .filter(|name| {
            let mut values = HashSet::with_capacity(features.len());
            features.iter().all(|f| {
                f.property(name)
                    .and_then(RegionValue::from_json)
                    .is_some_and(|v| values.insert(v.folded()))
            })
        })
        .collect()
}

/// One entry per property that uniquely identifies features.
///
/// All entries share one tile index built over the dataset. An empty
/// dataset yields no entries.
pub fn synthesize(mut features: Vec<BoundaryFeature>) -> Vec<RegionCatalogEntry> {
    if features.is_empty() {
        return Vec::new();
    }

    inject_feature_ids(&mut features);
    let properties = unique_properties(&features, primitive_properties(&features));
    debug!(
        features = features.len(),
        properties = ?properties,
        "selected region properties"
    );

    let index = Arc::new(TileIndex::build(&features));
    let seq = AD_HOC_SEQ.fetch_add(1, Ordering::Relaxed);

    properties
        .into_iter()
        .filter_map(|prop| {
            let region_type = format!("ad-hoc-{}-{}", seq, prop);
            let mut entry = RegionCatalogEntry::new(region_type, prop.as_str())
                .with_aliases([prop.as_str()])
                .with_server_kind(ServerKind::TileIndex(Arc::clone(&index)));
            match entry.load_boundaries(&features) {
                Ok(()) => Some(entry),
                Err(e) => {
                    warn!(error = %e, "skipping synthesized region type");
                    None
                }
            }
        })
        .collect()
}

/// Read a GeoJSON dataset and synthesize entries for it.
pub fn synthesize_geojson(value: &Value) -> Result<Vec<RegionCatalogEntry>, CatalogError> {
    Ok(synthesize(features_from_geojson(value)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::RegionCatalog;
    use serde_json::json;

    fn feature(props: Value) -> BoundaryFeature {
        BoundaryFeature::new(props.as_object().cloned().unwrap_or_default())
    }

    fn props(entries: &[RegionCatalogEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.region_prop()).collect()
    }

    #[test]
    fn test_fid_always_available() {
        let features = vec![
            feature(json!({"kind": "park"})),
            feature(json!({"kind": "park"})),
        ];
        let entries = synthesize(features);
        assert_eq!(props(&entries), vec!["FID"]);
        assert_eq!(entries[0].known_ids()[1], Some(RegionValue::from(1)));
    }

    #[test]
    fn test_duplicates_and_nested_values_excluded() {
        let features = vec![
            feature(json!({"code": "A1", "name": "Alpha", "state": "X", "geo": {"a": 1}})),
            feature(json!({"code": "a1 ", "name": "Beta", "state": "Y", "geo": {"a": 2}})),
            feature(json!({"code": "B2", "name": "Gamma", "state": "X", "geo": {"a": 3}})),
        ];
        let entries = synthesize(features);
        // "code" collides once folded
        assert_eq!(props(&entries), vec!["FID", "name"]);
        for entry in &entries {
            assert_eq!(entry.name_prop(), entry.region_prop());
            assert!(entry.rulesets().get(crate::ruleset::RulesetKind::Disambiguation).is_empty());
            assert!(matches!(entry.server_kind(), ServerKind::TileIndex(_)));
        }
    }

    #[test]
    fn test_property_missing_on_some_features() {
        let features = vec![
            feature(json!({"id": 1, "label": "one"})),
            feature(json!({"id": 2})),
            feature(json!({"id": 3, "label": null})),
        ];
        assert_eq!(props(&synthesize(features)), vec!["FID", "id"]);
    }

    #[test]
    fn test_existing_fid_overwritten() {
        let mut features = vec![feature(json!({"FID": "x"})), feature(json!({"FID": "x"}))];
        inject_feature_ids(&mut features);
        assert_eq!(features[0].property("FID"), Some(&json!(0)));
        assert_eq!(features[1].property("FID"), Some(&json!(1)));
    }

    #[test]
    fn test_empty_dataset() {
        assert!(synthesize(Vec::new()).is_empty());
    }

    #[test]
    fn test_region_types_unique_across_calls() {
        let a = synthesize(vec![feature(json!({}))]);
        let b = synthesize(vec![feature(json!({}))]);
        assert_ne!(a[0].region_type(), b[0].region_type());
        assert!(a[0].region_type().starts_with("ad-hoc-"));
        assert!(a[0].region_type().ends_with("-FID"));
    }

    #[test]
    fn test_synthesized_entries_resolve() {
        let geojson = json!({
            "type": "FeatureCollection",
            "features": [
                {
                    "type": "Feature",
                    "properties": {"zone": "North"},
                    "geometry": {"type": "Point", "coordinates": [10.5, 20.5]}
                },
                {
                    "type": "Feature",
                    "properties": {"zone": "South"},
                    "geometry": {"type": "Point", "coordinates": [10.5, -20.5]}
                }
            ]
        });
        let mut catalog = RegionCatalog::new();
        catalog.extend(synthesize_geojson(&geojson).unwrap());

        let entry = catalog.find_entry("zone").unwrap();
        let rows = vec![
            Some(RegionValue::from("south")),
            Some(RegionValue::from("East")),
        ];
        let outcome = entry.resolve(&rows, None);
        assert_eq!(outcome.resolved, vec![Some(1), None]);

        let ServerKind::TileIndex(index) = entry.server_kind() else {
            panic!("expected a tile index");
        };
        assert_eq!(index.features_at(10.5, -20.5), vec![1]);
    }

    #[test]
    fn test_invalid_geojson() {
        assert!(synthesize_geojson(&json!({"type": "Polygon"})).is_err());
    }
}
