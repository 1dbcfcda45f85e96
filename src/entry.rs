//! One family of regions: configuration plus precomputed matching state.
//!
//! An entry owns its rulesets, the known region ids of its boundary dataset
//! and the replacement cache for those rulesets. It is built once and reused
//! for every column matched against it; loading a changed boundary dataset
//! requires a fresh entry.

use std::borrow::Cow;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use serde_json::Value;
use tracing::debug;

use crate::boundary::BoundaryFeature;
use crate::columns::find_variable_for_aliases;
use crate::config::RegionProviderConfig;
use crate::error::ConfigError;
use crate::matcher::{self, MatchOutcome, RegionIndex};
use crate::normalize::{normalize, ReplacementCache};
use crate::ruleset::{Ruleset, RulesetKind, Rulesets};
use crate::synthesize::FEATURE_ID_PROP;
use crate::tile_index::TileIndex;
use crate::value::RegionValue;

/// How boundary geometry for an entry is served. Opaque to the matcher.
#[derive(Debug, Clone)]
pub enum ServerKind {
    /// Remote vector tile server
    Mvt {
        server: Option<String>,
        layer: Option<String>,
    },
    /// Remote WMS/WFS server
    Wms {
        server: Option<String>,
        layer: Option<String>,
    },
    /// In-memory index built for an ad-hoc boundary dataset
    TileIndex(Arc<TileIndex>),
}

impl Default for ServerKind {
    fn default() -> Self {
        ServerKind::Mvt {
            server: None,
            layer: None,
        }
    }
}

#[derive(Debug)]
pub struct RegionCatalogEntry {
    region_type: String,
    region_prop: String,
    name_prop: String,
    description: Option<String>,
    aliases: Vec<String>,
    disambig_prop: Option<String>,
    disambig_region_type: Option<String>,
    disambig_aliases: Vec<String>,
    unique_id_prop: String,
    text_codes: bool,
    server_kind: ServerKind,
    rulesets: Rulesets,
    /// Region code per boundary feature, in feature order
    known_ids: Vec<Option<RegionValue>>,
    names: Vec<Option<RegionValue>>,
    disambig_values: Vec<Option<RegionValue>>,
    cache: ReplacementCache,
    index: OnceCell<RegionIndex>,
}

impl RegionCatalogEntry {
    /// Entry with no rules, no aliases and no regions loaded yet.
    pub fn new(region_type: impl Into<String>, region_prop: impl Into<String>) -> Self {
        let region_prop = region_prop.into();
        Self {
            region_type: region_type.into(),
            name_prop: region_prop.clone(),
            region_prop,
            description: None,
            aliases: Vec::new(),
            disambig_prop: None,
            disambig_region_type: None,
            disambig_aliases: Vec::new(),
            unique_id_prop: FEATURE_ID_PROP.to_string(),
            text_codes: false,
            server_kind: ServerKind::default(),
            rulesets: Rulesets::default(),
            known_ids: Vec::new(),
            names: Vec::new(),
            disambig_values: Vec::new(),
            cache: ReplacementCache::new(),
            index: OnceCell::new(),
        }
    }

    /// Build an entry from its `regionWmsMap` record.
    pub fn from_config(
        region_type: &str,
        config: &RegionProviderConfig,
    ) -> Result<Self, ConfigError> {
        let mut entry = Self::new(region_type, config.region_prop.as_str());
        if let Some(name_prop) = &config.name_prop {
            entry.name_prop = name_prop.clone();
        }
        entry.description = config.description.clone();
        entry.aliases = config
            .aliases
            .clone()
            .unwrap_or_else(|| vec![region_type.to_string()]);
        entry.disambig_prop = config.disambig_prop.clone();
        entry.disambig_region_type = config.disambig_region_id.clone();
        if let Some(prop) = &config.unique_id_prop {
            entry.unique_id_prop = prop.clone();
        }
        entry.text_codes = config.text_codes;

        let server = config.server.clone();
        let layer = config.layer_name.clone();
        entry.server_kind = match config.server_type.as_deref() {
            Some(t) if t.eq_ignore_ascii_case("WMS") => ServerKind::Wms { server, layer },
            _ => ServerKind::Mvt { server, layer },
        };

        let lists = [
            (RulesetKind::DataSide, &config.data_replacements),
            (RulesetKind::ServerSide, &config.server_replacements),
            (RulesetKind::Disambiguation, &config.disambig_data_replacements),
            (
                RulesetKind::DisambiguationServerSide,
                &config.disambig_server_replacements,
            ),
        ];
        for (kind, pairs) in lists {
            let ruleset = Ruleset::from_pairs(pairs).map_err(|(pattern, source)| {
                ConfigError::InvalidPattern {
                    region_type: region_type.to_string(),
                    kind,
                    pattern,
                    source,
                }
            })?;
            entry.rulesets.set(kind, ruleset);
        }

        Ok(entry)
    }

    pub fn with_name_prop(mut self, name_prop: impl Into<String>) -> Self {
        self.name_prop = name_prop.into();
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_aliases<I, S>(mut self, aliases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.aliases = aliases.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_disambig_prop(mut self, prop: impl Into<String>) -> Self {
        self.disambig_prop = Some(prop.into());
        self
    }

    pub fn with_ruleset(mut self, kind: RulesetKind, ruleset: Ruleset) -> Self {
        self.rulesets.set(kind, ruleset);
        self
    }

    pub fn with_server_kind(mut self, server_kind: ServerKind) -> Self {
        self.server_kind = server_kind;
        self
    }

    pub fn region_type(&self) -> &str {
        &self.region_type
    }

    pub fn region_prop(&self) -> &str {
        &self.region_prop
    }

    pub fn name_prop(&self) -> &str {
        &self.name_prop
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn aliases(&self) -> &[String] {
        &self.aliases
    }

    pub fn disambig_prop(&self) -> Option<&str> {
        self.disambig_prop.as_deref()
    }

    /// Region type named as this entry's disambiguator, if any.
    pub fn disambig_region_type(&self) -> Option<&str> {
        self.disambig_region_type.as_deref()
    }

    pub fn disambig_aliases(&self) -> &[String] {
        &self.disambig_aliases
    }

    /// Feature property holding a unique feature id. Defaults to `FID`.
    pub fn unique_id_prop(&self) -> &str {
        &self.unique_id_prop
    }

    pub fn text_codes(&self) -> bool {
        self.text_codes
    }

    pub fn server_kind(&self) -> &ServerKind {
        &self.server_kind
    }

    pub fn rulesets(&self) -> &Rulesets {
        &self.rulesets
    }

    pub fn cache(&self) -> &ReplacementCache {
        &self.cache
    }

    pub fn known_ids(&self) -> &[Option<RegionValue>] {
        &self.known_ids
    }

    pub fn disambig_values(&self) -> &[Option<RegionValue>] {
        &self.disambig_values
    }

    /// Number of boundary features.
    pub fn region_count(&self) -> usize {
        self.known_ids.len()
    }

    /// Normalize a value with this entry's ruleset for `kind`, through its cache.
    pub fn normalize(&self, raw: Option<&RegionValue>, kind: RulesetKind) -> Option<String> {
        normalize(raw, kind, &self.rulesets, &self.cache)
    }

    /// Lookup table of server-side normalized ids, built on first use.
    pub(crate) fn region_index(&self) -> &RegionIndex {
        self.index.get_or_init(|| RegionIndex::build(self))
    }

    /// Load region codes (feature order) from a pre-generated ids list.
    ///
    /// `null` marks a feature without a code; it never matches.
    pub fn load_region_ids(&mut self, values: &[Value]) -> Result<(), ConfigError> {
        if !self.known_ids.is_empty() {
            return Err(self.already_loaded("region ids"));
        }
        self.check_disambig_len(values.len(), self.disambig_values.len())?;
        let ids = self.primitive_values(&self.region_prop, values)?;
        self.known_ids = ids;
        self.index = OnceCell::new();
        debug!(region_type = %self.region_type, count = self.known_ids.len(), "loaded region ids");
        Ok(())
    }

    /// Load disambiguation property values (feature order).
    pub fn load_disambig_ids(&mut self, values: &[Value]) -> Result<(), ConfigError> {
        if !self.disambig_values.is_empty() {
            return Err(self.already_loaded("disambiguation ids"));
        }
        self.check_disambig_len(self.known_ids.len(), values.len())?;
        let prop = self.disambig_prop.clone().unwrap_or_default();
        self.disambig_values = self.primitive_values(&prop, values)?;
        self.index = OnceCell::new();
        Ok(())
    }

    /// Extract codes, names and disambiguation values from boundary features.
    ///
    /// Every feature must carry the region property as text or a number.
    pub fn load_boundaries(&mut self, features: &[BoundaryFeature]) -> Result<(), ConfigError> {
        if !self.known_ids.is_empty() {
            return Err(self.already_loaded("region ids"));
        }

        let mut ids = Vec::with_capacity(features.len());
        for (i, feature) in features.iter().enumerate() {
            let value = match feature.property(&self.region_prop) {
                None | Some(Value::Null) => {
                    return Err(ConfigError::MissingProperty {
                        region_type: self.region_type.clone(),
                        property: self.region_prop.clone(),
                        feature: i,
                    })
                }
                Some(v) => v,
            };
            let id = RegionValue::from_json(value).ok_or_else(|| ConfigError::NonPrimitiveValue {
                region_type: self.region_type.clone(),
                property: self.region_prop.clone(),
                index: i,
            })?;
            ids.push(Some(id));
        }

        self.names = features
            .iter()
            .map(|f| f.property(&self.name_prop).and_then(RegionValue::from_json))
            .collect();
        if let Some(prop) = &self.disambig_prop {
            self.disambig_values = features
                .iter()
                .map(|f| f.property(prop).and_then(RegionValue::from_json))
                .collect();
        }
        self.known_ids = ids;
        self.index = OnceCell::new();
        debug!(
            region_type = %self.region_type,
            count = self.known_ids.len(),
            "loaded boundary features"
        );
        Ok(())
    }

    /// Take disambiguation rules and aliases from the region type named by
    /// `disambigRegionId`. Rulesets configured on this entry are kept.
    pub(crate) fn inherit_disambiguation(&mut self, source: &DisambiguationSource) {
        if self.rulesets.get(RulesetKind::Disambiguation).is_empty() {
            self.rulesets
                .set(RulesetKind::Disambiguation, source.data_rules.clone());
        }
        if self.rulesets.get(RulesetKind::DisambiguationServerSide).is_empty() {
            self.rulesets
                .set(RulesetKind::DisambiguationServerSide, source.server_rules.clone());
        }
        self.disambig_aliases = source.aliases.clone();
    }

    pub(crate) fn disambiguation_source(&self) -> DisambiguationSource {
        let mut aliases = vec![self.region_type.clone()];
        aliases.extend(self.aliases.iter().cloned());
        DisambiguationSource {
            data_rules: self.rulesets.get(RulesetKind::DataSide).clone(),
            server_rules: self.rulesets.get(RulesetKind::ServerSide).clone(),
            aliases,
        }
    }

    /// First column naming this region type or one of its aliases.
    pub fn find_region_variable<'a, C: AsRef<str>>(&self, var_names: &'a [C]) -> Option<&'a str> {
        let mut aliases: Vec<&str> = Vec::with_capacity(self.aliases.len() + 1);
        aliases.push(&self.region_type);
        aliases.extend(self.aliases.iter().map(String::as_str));
        find_variable_for_aliases(var_names, &aliases)
    }

    /// First column matching the disambiguation aliases, if any are known.
    pub fn find_disambig_variable<'a, C: AsRef<str>>(&self, var_names: &'a [C]) -> Option<&'a str> {
        if self.disambig_aliases.is_empty() {
            return None;
        }
        find_variable_for_aliases(var_names, &self.disambig_aliases)
    }

    /// Index of the first feature whose code equals `code` after server-side
    /// normalization.
    pub fn find_region_by_id(&self, code: &RegionValue) -> Option<usize> {
        let normalized = self.normalize(Some(code), RulesetKind::ServerSide)?;
        self.region_index().candidates(&normalized).first().copied()
    }

    /// Human-readable label of a feature, falling back to its code.
    pub fn region_name(&self, index: usize) -> Option<Cow<'_, str>> {
        self.names
            .get(index)
            .and_then(Option::as_ref)
            .or_else(|| self.known_ids.get(index).and_then(Option::as_ref))
            .map(RegionValue::as_text)
    }

    /// Resolve a column of raw values against this entry.
    pub fn resolve(
        &self,
        values: &[Option<RegionValue>],
        disambig: Option<&[Option<RegionValue>]>,
    ) -> MatchOutcome {
        matcher::resolve(self, values, disambig)
    }

    /// Like [`resolve`](Self::resolve), evaluating rows in parallel.
    pub fn resolve_parallel(
        &self,
        values: &[Option<RegionValue>],
        disambig: Option<&[Option<RegionValue>]>,
    ) -> MatchOutcome {
        matcher::resolve_parallel(self, values, disambig)
    }

    fn primitive_values(
        &self,
        property: &str,
        values: &[Value],
    ) -> Result<Vec<Option<RegionValue>>, ConfigError> {
        values
            .iter()
            .enumerate()
            .map(|(i, v)| match v {
                Value::Null => Ok(None),
                other => RegionValue::from_json(other).map(Some).ok_or_else(|| {
                    ConfigError::NonPrimitiveValue {
                        region_type: self.region_type.clone(),
                        property: property.to_string(),
                        index: i,
                    }
                }),
            })
            .collect()
    }

    fn check_disambig_len(&self, ids: usize, disambig: usize) -> Result<(), ConfigError> {
        if ids > 0 && disambig > 0 && ids != disambig {
            return Err(ConfigError::LengthMismatch {
                region_type: self.region_type.clone(),
                expected: ids,
                found: disambig,
            });
        }
        Ok(())
    }

    fn already_loaded(&self, what: &'static str) -> ConfigError {
        ConfigError::AlreadyLoaded {
            region_type: self.region_type.clone(),
            what,
        }
    }
}

/// Rules and aliases lent by a disambiguating region type.
#[derive(Debug, Clone)]
pub(crate) struct DisambiguationSource {
    data_rules: Ruleset,
    server_rules: Ruleset,
    aliases: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn feature(props: Value) -> BoundaryFeature {
        BoundaryFeature::new(props.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn test_from_config_defaults() {
        let config = RegionProviderConfig {
            region_prop: "POA_CODE".to_string(),
            server_type: Some("WMS".to_string()),
            ..Default::default()
        };
        let entry = RegionCatalogEntry::from_config("POA", &config).unwrap();
        assert_eq!(entry.name_prop(), "POA_CODE");
        assert_eq!(entry.aliases(), &["POA".to_string()]);
        assert_eq!(entry.unique_id_prop(), "FID");
        assert!(!entry.text_codes());
        assert!(matches!(entry.server_kind(), ServerKind::Wms { .. }));
        assert!(RulesetKind::ALL.iter().all(|&k| entry.rulesets().get(k).is_empty()));
    }

    #[test]
    fn test_from_config_bad_pattern() {
        let config = RegionProviderConfig {
            region_prop: "LGA_CODE".to_string(),
            server_replacements: vec![("([".to_string(), "".to_string())],
            ..Default::default()
        };
        let err = RegionCatalogEntry::from_config("LGA", &config).unwrap_err();
        match err {
            ConfigError::InvalidPattern { kind, pattern, .. } => {
                assert_eq!(kind, RulesetKind::ServerSide);
                assert_eq!(pattern, "([");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_load_boundaries() {
        let mut entry = RegionCatalogEntry::new("SA4", "code")
            .with_name_prop("name")
            .with_disambig_prop("state");
        entry
            .load_boundaries(&[
                feature(json!({"code": 101, "name": "Capital Region", "state": "NSW"})),
                feature(json!({"code": "102", "state": "VIC"})),
            ])
            .unwrap();
        assert_eq!(entry.region_count(), 2);
        assert_eq!(entry.region_name(0).as_deref(), Some("Capital Region"));
        assert_eq!(entry.region_name(1).as_deref(), Some("102"));
        assert_eq!(entry.region_name(7), None);
        assert_eq!(entry.disambig_values()[1], Some(RegionValue::from("VIC")));
    }

    #[test]
    fn test_load_boundaries_missing_property() {
        let mut entry = RegionCatalogEntry::new("SA4", "code");
        let err = entry
            .load_boundaries(&[feature(json!({"code": "A"})), feature(json!({"name": "B"}))])
            .unwrap_err();
        assert!(matches!(err, ConfigError::MissingProperty { feature: 1, .. }));

        let err = entry
            .load_boundaries(&[feature(json!({"code": ["A"]}))])
            .unwrap_err();
        assert!(matches!(err, ConfigError::NonPrimitiveValue { index: 0, .. }));
    }

    #[test]
    fn test_load_twice_rejected() {
        let mut entry = RegionCatalogEntry::new("STE", "STE_CODE");
        entry.load_region_ids(&[json!(1), json!(2)]).unwrap();
        assert!(matches!(
            entry.load_region_ids(&[json!(3)]),
            Err(ConfigError::AlreadyLoaded { .. })
        ));
    }

    #[test]
    fn test_disambig_length_checked() {
        let mut entry = RegionCatalogEntry::new("SSC", "SSC_NAME").with_disambig_prop("STE");
        entry.load_region_ids(&[json!("a"), json!("b")]).unwrap();
        assert!(matches!(
            entry.load_disambig_ids(&[json!("x")]),
            Err(ConfigError::LengthMismatch { expected: 2, found: 1, .. })
        ));
        entry.load_disambig_ids(&[json!("x"), json!(null)]).unwrap();
        assert_eq!(entry.disambig_values()[1], None);
    }

    #[test]
    fn test_find_region_by_id_uses_server_rules() {
        let rules = Ruleset::from_pairs(&[(r" \(.\)$", "")]).unwrap();
        let mut entry =
            RegionCatalogEntry::new("LGA", "LGA_NAME").with_ruleset(RulesetKind::ServerSide, rules);
        entry
            .load_region_ids(&[json!("Baw Baw (S)"), json!("Melbourne (C)")])
            .unwrap();
        assert_eq!(entry.find_region_by_id(&RegionValue::from("Melbourne")), Some(1));
        assert_eq!(entry.find_region_by_id(&RegionValue::from("Baw Baw (S)")), Some(0));
        assert_eq!(entry.find_region_by_id(&RegionValue::from("Sydney")), None);
    }

    #[test]
    fn test_find_region_variable() {
        let entry = RegionCatalogEntry::new("POA", "POA_CODE").with_aliases(["postcode", "zip"]);
        let cols = ["Year", "Post Code", "Count"];
        assert_eq!(entry.find_region_variable(&cols), Some("Post Code"));
        let cols = ["poa", "postcode"];
        assert_eq!(entry.find_region_variable(&cols), Some("poa"));
        assert_eq!(entry.find_disambig_variable(&cols), None);
    }

    #[test]
    fn test_inherit_disambiguation_keeps_own_rules() {
        let own = Ruleset::from_pairs(&[("own", "x")]).unwrap();
        let mut entry = RegionCatalogEntry::new("SSC", "SSC_NAME")
            .with_ruleset(RulesetKind::Disambiguation, own);
        let source = RegionCatalogEntry::new("STE", "STE_NAME")
            .with_aliases(["state"])
            .with_ruleset(RulesetKind::DataSide, Ruleset::from_pairs(&[("a", "b")]).unwrap())
            .with_ruleset(RulesetKind::ServerSide, Ruleset::from_pairs(&[("c", "d")]).unwrap())
            .disambiguation_source();
        entry.inherit_disambiguation(&source);

        assert_eq!(entry.rulesets().get(RulesetKind::Disambiguation).rules()[0].pattern(), "own");
        assert_eq!(
            entry.rulesets().get(RulesetKind::DisambiguationServerSide).rules()[0].pattern(),
            "c"
        );
        assert_eq!(entry.disambig_aliases(), &["STE".to_string(), "state".to_string()]);
        assert_eq!(entry.find_disambig_variable(&["State"]), Some("State"));
    }
}
