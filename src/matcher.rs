//! Region identifier resolution.
//!
//! Known region ids are normalized once with the entry's server-side rules
//! and indexed. Each row is normalized with the data-side rules and looked up;
//! rows matching several regions are narrowed with the disambiguation column.
//! Rows are independent, so a column can also be resolved in parallel via Rayon.

use std::collections::{BTreeSet, HashMap};

use rayon::prelude::*;
use tracing::{debug, trace};

use crate::entry::RegionCatalogEntry;
use crate::ruleset::RulesetKind;
use crate::value::RegionValue;

/// Lookup tables derived from an entry's known ids.
#[derive(Debug, Default)]
pub(crate) struct RegionIndex {
    /// Normalized id -> feature indices, ascending
    by_id: HashMap<String, Vec<usize>>,
    /// Server-side normalized disambiguation value per feature
    disambig: Vec<Option<String>>,
}

impl RegionIndex {
    pub(crate) fn build(entry: &RegionCatalogEntry) -> Self {
        let mut by_id: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, id) in entry.known_ids().iter().enumerate() {
            if let Some(key) = entry.normalize(id.as_ref(), RulesetKind::ServerSide) {
                by_id.entry(key).or_default().push(i);
            }
        }

        let disambig = entry
            .disambig_values()
            .iter()
            .map(|v| entry.normalize(v.as_ref(), RulesetKind::DisambiguationServerSide))
            .collect();

        debug!(
            region_type = entry.region_type(),
            regions = entry.region_count(),
            distinct_ids = by_id.len(),
            "built region index"
        );
        Self { by_id, disambig }
    }

    pub(crate) fn candidates(&self, normalized: &str) -> &[usize] {
        self.by_id.get(normalized).map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Result for a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowMatch {
    Resolved(usize),
    Unmatched,
    Ambiguous,
}

/// Outcome of resolving one column.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MatchOutcome {
    /// Feature index per row, `None` when unresolved
    pub resolved: Vec<Option<usize>>,
    /// Rows matching several regions that disambiguation could not narrow to one
    pub ambiguous_rows: BTreeSet<usize>,
    /// Rows with no value or no matching region
    pub unmatched_rows: BTreeSet<usize>,
}

impl MatchOutcome {
    fn from_rows(rows: Vec<RowMatch>) -> Self {
        let mut outcome = MatchOutcome {
            resolved: Vec::with_capacity(rows.len()),
            ..Default::default()
        };
        for (row, m) in rows.into_iter().enumerate() {
            match m {
                RowMatch::Resolved(index) => outcome.resolved.push(Some(index)),
                RowMatch::Unmatched => {
                    outcome.resolved.push(None);
                    outcome.unmatched_rows.insert(row);
                }
                RowMatch::Ambiguous => {
                    outcome.resolved.push(None);
                    outcome.ambiguous_rows.insert(row);
                }
            }
        }
        outcome
    }

    pub fn len(&self) -> usize {
        self.resolved.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resolved.is_empty()
    }

    pub fn matched_count(&self) -> usize {
        self.resolved.iter().filter(|r| r.is_some()).count()
    }

    /// True when every row resolved.
    pub fn is_complete(&self) -> bool {
        self.ambiguous_rows.is_empty() && self.unmatched_rows.is_empty()
    }

    /// Resolved region code per row, as known to `entry`.
    pub fn region_codes<'e>(&self, entry: &'e RegionCatalogEntry) -> Vec<Option<&'e RegionValue>> {
        self.resolved
            .iter()
            .map(|r| r.and_then(|i| entry.known_ids().get(i)).and_then(Option::as_ref))
            .collect()
    }
}

/// Resolve a column of raw values against `entry`.
///
/// `disambig` is the secondary column consulted when a value matches several
/// regions; rows past its end count as having no disambiguation value.
pub fn resolve(
    entry: &RegionCatalogEntry,
    values: &[Option<RegionValue>],
    disambig: Option<&[Option<RegionValue>]>,
) -> MatchOutcome {
    let index = entry.region_index();
    let rows = values
        .iter()
        .enumerate()
        .map(|(row, value)| {
            resolve_row(entry, index, value.as_ref(), disambig_value(disambig, row))
        })
        .collect();
    finish(entry, rows)
}

/// Same result as [`resolve`], with rows evaluated on the Rayon pool.
pub fn resolve_parallel(
    entry: &RegionCatalogEntry,
    values: &[Option<RegionValue>],
    disambig: Option<&[Option<RegionValue>]>,
) -> MatchOutcome {
    let index = entry.region_index();
    let rows = values
        .par_iter()
        .enumerate()
        .map(|(row, value)| {
            resolve_row(entry, index, value.as_ref(), disambig_value(disambig, row))
        })
        .collect();
    finish(entry, rows)
}

/// One column of a batch: entry, values and optional disambiguation column.
pub type ColumnJob<'a> = (
    &'a RegionCatalogEntry,
    &'a [Option<RegionValue>],
    Option<&'a [Option<RegionValue>]>,
);

/// Resolve several columns on the Rayon pool, one outcome per column.
pub fn resolve_columns(jobs: &[ColumnJob<'_>]) -> Vec<MatchOutcome> {
    jobs.par_iter()
        .map(|&(entry, values, disambig)| resolve(entry, values, disambig))
        .collect()
}

fn disambig_value(
    column: Option<&[Option<RegionValue>]>,
    row: usize,
) -> Option<&RegionValue> {
    column.and_then(|c| c.get(row)).and_then(Option::as_ref)
}

fn finish(entry: &RegionCatalogEntry, rows: Vec<RowMatch>) -> MatchOutcome {
    let outcome = MatchOutcome::from_rows(rows);
    debug!(
        region_type = entry.region_type(),
        rows = outcome.len(),
        matched = outcome.matched_count(),
        unmatched = outcome.unmatched_rows.len(),
        ambiguous = outcome.ambiguous_rows.len(),
        "resolved column"
    );
    outcome
}

fn resolve_row(
    entry: &RegionCatalogEntry,
    index: &RegionIndex,
    value: Option<&RegionValue>,
    disambig: Option<&RegionValue>,
) -> RowMatch {
    // Blank cells never match, even a feature with an empty code
    let Some(code) = entry
        .normalize(value, RulesetKind::DataSide)
        .filter(|code| !code.is_empty())
    else {
        return RowMatch::Unmatched;
    };

    match index.candidates(&code) {
        [] => RowMatch::Unmatched,
        [only] => RowMatch::Resolved(*only),
        candidates => {
            let resolved = disambiguate(entry, index, candidates, disambig);
            if resolved.is_none() {
                trace!(region_type = entry.region_type(), code = %code, "ambiguous value");
            }
            resolved.map_or(RowMatch::Ambiguous, RowMatch::Resolved)
        }
    }
}

/// Narrow candidates to the one whose disambiguation property matches.
fn disambiguate(
    entry: &RegionCatalogEntry,
    index: &RegionIndex,
    candidates: &[usize],
    disambig: Option<&RegionValue>,
) -> Option<usize> {
    if index.disambig.is_empty() {
        return None;
    }
    let wanted = entry.normalize(disambig, RulesetKind::Disambiguation)?;

    let mut survivors = candidates.iter().copied().filter(|&i| {
        let raw = entry.disambig_values().get(i).and_then(Option::as_ref);
        let normalized = index.disambig.get(i).and_then(Option::as_deref);
        normalized == Some(wanted.as_str()) || raw.is_some_and(|r| r.as_text() == wanted)
    });

    match (survivors.next(), survivors.next()) {
        (Some(only), None) => Some(only),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boundary::BoundaryFeature;
    use crate::ruleset::Ruleset;
    use proptest::prelude::*;
    use serde_json::{json, Value};

    fn features(rows: Value) -> Vec<BoundaryFeature> {
        rows.as_array()
            .unwrap()
            .iter()
            .map(|p| BoundaryFeature::new(p.as_object().unwrap().clone()))
            .collect()
    }

    fn column(values: &[Option<&str>]) -> Vec<Option<RegionValue>> {
        values.iter().map(|v| v.map(RegionValue::from)).collect()
    }

    fn duplicate_code_entry() -> RegionCatalogEntry {
        let mut entry = RegionCatalogEntry::new("TEST", "code")
            .with_name_prop("name")
            .with_disambig_prop("name");
        entry
            .load_boundaries(&features(json!([
                {"code": "AB", "name": "Alpha"},
                {"code": "AB", "name": "Beta"}
            ])))
            .unwrap();
        entry
    }

    #[test]
    fn test_disambiguation_example() {
        let entry = duplicate_code_entry();
        let rows = column(&[Some("ab"), Some("ab")]);
        let dab = column(&[Some("Alpha"), Some("Gamma")]);

        let outcome = resolve(&entry, &rows, Some(&dab));
        assert_eq!(outcome.resolved, vec![Some(0), None]);
        assert_eq!(outcome.ambiguous_rows, BTreeSet::from([1]));
        assert!(outcome.unmatched_rows.is_empty());
    }

    #[test]
    fn test_ambiguous_without_disambiguation_column() {
        let entry = duplicate_code_entry();
        let outcome = resolve(&entry, &column(&[Some("AB")]), None);
        assert_eq!(outcome.resolved, vec![None]);
        assert_eq!(outcome.ambiguous_rows, BTreeSet::from([0]));
    }

    #[test]
    fn test_ambiguous_without_disambiguation_property() {
        let mut entry = RegionCatalogEntry::new("TEST", "code");
        entry
            .load_boundaries(&features(json!([{"code": "AB"}, {"code": "ab "}])))
            .unwrap();
        let dab = column(&[Some("Alpha")]);
        let outcome = resolve(&entry, &column(&[Some("ab")]), Some(&dab));
        assert_eq!(outcome.ambiguous_rows, BTreeSet::from([0]));
    }

    #[test]
    fn test_data_rules_example() {
        let mut entry = RegionCatalogEntry::new("STREET", "street").with_ruleset(
            RulesetKind::DataSide,
            Ruleset::from_pairs(&[(r"\bst\b", "street")]).unwrap(),
        );
        entry
            .load_boundaries(&features(json!([
                {"street": "High Street"},
                {"street": "Main Street"}
            ])))
            .unwrap();

        let outcome = resolve(&entry, &column(&[Some("Main St")]), None);
        assert_eq!(outcome.resolved, vec![Some(1)]);
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_resolve_columns_with_disambiguation() {
        let entry = duplicate_code_entry();
        let first = column(&[Some("ab"), Some("zz")]);
        let second = column(&[Some("AB"), Some("ab")]);
        let dab = column(&[Some("beta"), Some("alpha")]);

        let jobs: [ColumnJob<'_>; 2] = [
            (&entry, first.as_slice(), None),
            (&entry, second.as_slice(), Some(dab.as_slice())),
        ];
        let outcomes = resolve_columns(&jobs);
        assert_eq!(outcomes.len(), 2);
        assert_eq!(outcomes[0].ambiguous_rows, BTreeSet::from([0]));
        assert_eq!(outcomes[0].unmatched_rows, BTreeSet::from([1]));
        assert_eq!(outcomes[1].resolved, vec![Some(1), Some(0)]);
        assert_eq!(outcomes[1], resolve(&entry, &second, Some(&dab)));
    }

    #[test]
    fn test_blank_cells_unmatched() {
        let mut entry = RegionCatalogEntry::new("LGA", "code").with_ruleset(
            RulesetKind::DataSide,
            Ruleset::from_pairs(&[("^unknown$", "")]).unwrap(),
        );
        entry
            .load_region_ids(&[json!(""), json!("  "), json!("Ballarat")])
            .unwrap();

        let rows = column(&[Some(""), Some("   "), Some("Unknown"), Some("ballarat")]);
        let outcome = resolve(&entry, &rows, None);
        assert_eq!(outcome.resolved, vec![None, None, None, Some(2)]);
        assert_eq!(outcome.unmatched_rows, BTreeSet::from([0, 1, 2]));
        assert!(outcome.ambiguous_rows.is_empty());
    }

    #[test]
    fn test_unique_id_always_resolves() {
        let mut entry = RegionCatalogEntry::new("POA", "POA_CODE");
        entry
            .load_region_ids(&[json!(3000), json!(3001), json!("3002")])
            .unwrap();
        let rows = vec![
            Some(RegionValue::from(3001)),
            Some(RegionValue::from(" 3002 ")),
            Some(RegionValue::from("9999")),
            None,
        ];
        let outcome = resolve(&entry, &rows, None);
        assert_eq!(outcome.resolved, vec![Some(1), Some(2), None, None]);
        assert_eq!(outcome.unmatched_rows, BTreeSet::from([2, 3]));
        assert!(outcome.ambiguous_rows.is_empty());
        assert_eq!(outcome.matched_count(), 2);
        assert_eq!(
            outcome.region_codes(&entry),
            vec![
                Some(&RegionValue::from(3001)),
                Some(&RegionValue::from("3002")),
                None,
                None
            ]
        );
    }

    #[test]
    fn test_empty_known_ids_all_unmatched() {
        let entry = RegionCatalogEntry::new("EMPTY", "code");
        let outcome = resolve(&entry, &column(&[Some("a"), None]), None);
        assert_eq!(outcome.resolved, vec![None, None]);
        assert_eq!(outcome.unmatched_rows, BTreeSet::from([0, 1]));
    }

    #[test]
    fn test_empty_rows() {
        let entry = duplicate_code_entry();
        let outcome = resolve(&entry, &[], None);
        assert!(outcome.is_empty());
        assert!(outcome.is_complete());
    }

    #[test]
    fn test_disambiguation_rulesets() {
        let mut entry = RegionCatalogEntry::new("SSC", "name")
            .with_disambig_prop("state")
            .with_ruleset(
                RulesetKind::Disambiguation,
                Ruleset::from_pairs(&[("^victoria$", "vic")]).unwrap(),
            )
            .with_ruleset(
                RulesetKind::DisambiguationServerSide,
                Ruleset::from_pairs(&[("^new south wales$", "nsw")]).unwrap(),
            );
        entry
            .load_boundaries(&features(json!([
                {"name": "Richmond", "state": "New South Wales"},
                {"name": "Richmond", "state": "VIC"},
                {"name": "Richmond", "state": "vic"}
            ])))
            .unwrap();

        let rows = column(&[Some("Richmond"), Some("Richmond"), Some("Richmond")]);
        let dab = column(&[Some("NSW"), Some("Victoria")]);
        let outcome = resolve(&entry, &rows, Some(&dab));
        // "victoria" -> "vic" matches two features; the third row has no value
        assert_eq!(outcome.resolved, vec![Some(0), None, None]);
        assert_eq!(outcome.ambiguous_rows, BTreeSet::from([1, 2]));
    }

    #[test]
    fn test_server_side_cache_shared_across_columns() {
        let entry = duplicate_code_entry();
        resolve(&entry, &column(&[Some("ab")]), None);
        let index_ptr = entry.region_index() as *const RegionIndex;
        resolve(&entry, &column(&[Some("zz")]), None);
        assert_eq!(index_ptr, entry.region_index() as *const RegionIndex);
    }

    proptest! {
        #[test]
        fn parallel_matches_sequential(rows in proptest::collection::vec(
            proptest::option::of(prop_oneof![
                Just("ab".to_string()),
                Just("AB ".to_string()),
                Just("cd".to_string()),
                "[a-z]{1,3}",
            ]),
            0..40,
        )) {
            let mut entry = RegionCatalogEntry::new("P", "code").with_disambig_prop("name");
            entry.load_boundaries(&features(json!([
                {"code": "AB", "name": "x"},
                {"code": "AB", "name": "y"},
                {"code": "CD", "name": "z"}
            ]))).unwrap();
            let values: Vec<Option<RegionValue>> =
                rows.into_iter().map(|r| r.map(RegionValue::Text)).collect();
            let dab: Vec<Option<RegionValue>> = (0..values.len())
                .map(|i| Some(RegionValue::from(if i % 2 == 0 { "x" } else { "q" })))
                .collect();

            let seq = resolve(&entry, &values, Some(&dab));
            let par = resolve_parallel(&entry, &values, Some(&dab));
            prop_assert_eq!(&seq, &par);
            prop_assert_eq!(seq.len(), values.len());
            for row in 0..values.len() {
                let flagged = seq.ambiguous_rows.contains(&row) as u8
                    + seq.unmatched_rows.contains(&row) as u8
                    + seq.resolved[row].is_some() as u8;
                prop_assert_eq!(flagged, 1);
            }
        }
    }
}
