//! Python bindings
//!
//! Thin wrappers over the Rust API. Resolution releases the GIL, so Python
//! threads can match columns concurrently.

use pyo3::exceptions::PyValueError;
use pyo3::prelude::*;

use crate::catalog::{CatalogLoad, RegionCatalog};
use crate::config::RegionIdsFile;
use crate::entry::RegionCatalogEntry;
use crate::matcher::{resolve_columns, ColumnJob, MatchOutcome};
use crate::ruleset::Ruleset;
use crate::synthesize::synthesize_geojson;
use crate::value::RegionValue;

/// A cell value as Python hands it over
#[derive(FromPyObject)]
enum PyRegionValue {
    Text(String),
    Int(i64),
    Float(f64),
}

impl From<PyRegionValue> for RegionValue {
    fn from(value: PyRegionValue) -> Self {
        match value {
            PyRegionValue::Text(s) => RegionValue::Text(s),
            PyRegionValue::Int(n) => RegionValue::from(n),
            PyRegionValue::Float(n) => RegionValue::Number(n),
        }
    }
}

type ResolvedColumn = (Vec<Option<usize>>, Vec<usize>, Vec<usize>);
type PyColumn = Vec<Option<PyRegionValue>>;
type BatchColumn = (String, PyColumn, Option<PyColumn>);

fn to_values(values: Vec<Option<PyRegionValue>>) -> Vec<Option<RegionValue>> {
    values.into_iter().map(|v| v.map(RegionValue::from)).collect()
}

fn into_tuple(outcome: MatchOutcome) -> ResolvedColumn {
    (
        outcome.resolved,
        outcome.ambiguous_rows.into_iter().collect(),
        outcome.unmatched_rows.into_iter().collect(),
    )
}

fn value_error(e: impl std::fmt::Display) -> PyErr {
    PyValueError::new_err(e.to_string())
}

/// Region catalog plus matching
#[pyclass]
pub struct RegionMatcher {
    catalog: RegionCatalog,
    rejected: Vec<String>,
}

#[pymethods]
impl RegionMatcher {
    /// Load a catalog from `regionMapping.json` text
    ///
    /// Entries with broken configuration are skipped; see `rejected`.
    #[new]
    fn new(config_json: &str) -> PyResult<Self> {
        let CatalogLoad { catalog, errors } =
            RegionCatalog::from_json(config_json).map_err(value_error)?;
        Ok(Self {
            catalog,
            rejected: errors.iter().map(ToString::to_string).collect(),
        })
    }

    /// Messages for entries that failed to load
    #[getter]
    fn rejected(&self) -> Vec<String> {
        self.rejected.clone()
    }

    /// Region types in declaration order
    fn region_types(&self) -> Vec<String> {
        self.catalog
            .entries()
            .iter()
            .map(|e| e.region_type().to_string())
            .collect()
    }

    /// Region type for a column name or alias, if any
    fn find_entry(&self, name: &str) -> Option<String> {
        self.catalog.find_entry(name).map(|e| e.region_type().to_string())
    }

    /// Load region ids from an ids file (`{"values": [...]}`)
    fn load_region_ids(&mut self, region_type: &str, ids_json: &str) -> PyResult<()> {
        let ids = RegionIdsFile::from_json(ids_json).map_err(value_error)?;
        self.entry_mut(region_type)?
            .load_region_ids(&ids.values)
            .map_err(value_error)
    }

    /// Load disambiguation values from an ids file
    fn load_disambig_ids(&mut self, region_type: &str, ids_json: &str) -> PyResult<()> {
        let ids = RegionIdsFile::from_json(ids_json).map_err(value_error)?;
        self.entry_mut(region_type)?
            .load_disambig_ids(&ids.values)
            .map_err(value_error)
    }

    /// Resolve a column of values to feature indices
    ///
    /// Args:
    ///     region_type: Region type name or alias
    ///     values: Cell values (str, int, float or None)
    ///     disambig: Optional parallel column of disambiguation values
    ///
    /// Returns:
    ///     (resolved, ambiguous_rows, unmatched_rows)
    #[pyo3(signature = (region_type, values, disambig=None))]
    fn resolve(
        &self,
        py: Python<'_>,
        region_type: &str,
        values: Vec<Option<PyRegionValue>>,
        disambig: Option<Vec<Option<PyRegionValue>>>,
    ) -> PyResult<ResolvedColumn> {
        let entry = self.entry(region_type)?;
        let values = to_values(values);
        let disambig = disambig.map(to_values);

        Ok(py.allow_threads(|| {
            into_tuple(entry.resolve_parallel(&values, disambig.as_deref()))
        }))
    }

    /// Resolve several columns in parallel (batch API)
    ///
    /// Args:
    ///     columns: List of (region_type, values, disambig) tuples; disambig
    ///         may be None
    ///
    /// Returns:
    ///     One (resolved, ambiguous_rows, unmatched_rows) tuple per column
    fn resolve_many(
        &self,
        py: Python<'_>,
        columns: Vec<BatchColumn>,
    ) -> PyResult<Vec<ResolvedColumn>> {
        let jobs = columns
            .into_iter()
            .map(|(region_type, values, disambig)| {
                let entry = self.entry(&region_type)?;
                Ok((entry, to_values(values), disambig.map(to_values)))
            })
            .collect::<PyResult<Vec<_>>>()?;

        Ok(py.allow_threads(|| {
            let batch: Vec<ColumnJob<'_>> = jobs
                .iter()
                .map(|(entry, values, disambig)| (*entry, values.as_slice(), disambig.as_deref()))
                .collect();
            resolve_columns(&batch).into_iter().map(into_tuple).collect()
        }))
    }

    /// Add entries synthesized from GeoJSON text; returns their region types
    fn synthesize_geojson(&mut self, geojson: &str) -> PyResult<Vec<String>> {
        let value: serde_json::Value = serde_json::from_str(geojson).map_err(value_error)?;
        let entries = synthesize_geojson(&value).map_err(value_error)?;
        let types = entries.iter().map(|e| e.region_type().to_string()).collect();
        self.catalog.extend(entries);
        Ok(types)
    }

    fn __len__(&self) -> usize {
        self.catalog.len()
    }

    fn __repr__(&self) -> String {
        format!(
            "RegionMatcher(region_types={}, rejected={})",
            self.catalog.len(),
            self.rejected.len()
        )
    }
}

impl RegionMatcher {
    fn entry(&self, region_type: &str) -> PyResult<&RegionCatalogEntry> {
        self.catalog
            .find_entry(region_type)
            .ok_or_else(|| value_error(format!("unknown region type '{}'", region_type)))
    }

    fn entry_mut(&mut self, region_type: &str) -> PyResult<&mut RegionCatalogEntry> {
        self.catalog
            .find_entry_mut(region_type)
            .ok_or_else(|| value_error(format!("unknown region type '{}'", region_type)))
    }
}

/// Fold a value and apply `[pattern, replacement]` rules to it
#[pyfunction]
fn normalize_value(value: PyRegionValue, rules: Vec<(String, String)>) -> PyResult<String> {
    let ruleset = Ruleset::from_pairs(&rules)
        .map_err(|(pattern, e)| value_error(format!("invalid pattern '{}': {}", pattern, e)))?;
    Ok(ruleset.apply(&RegionValue::from(value).folded()))
}

/// Region matching native extension module
#[pymodule]
fn regionmatch(m: &Bound<'_, PyModule>) -> PyResult<()> {
    m.add_class::<RegionMatcher>()?;
    m.add_function(wrap_pyfunction!(normalize_value, m)?)?;
    Ok(())
}
