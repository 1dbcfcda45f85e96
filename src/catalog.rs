//! The region catalog: every known region type, in declaration order.

use tracing::{info, warn};

use crate::columns::eq_ignore_case;
use crate::config::RegionMappingConfig;
use crate::entry::RegionCatalogEntry;
use crate::error::{CatalogError, ConfigError};

#[derive(Debug, Default)]
pub struct RegionCatalog {
    entries: Vec<RegionCatalogEntry>,
}

/// A loaded catalog plus the entries that failed to load.
#[derive(Debug)]
pub struct CatalogLoad {
    pub catalog: RegionCatalog,
    pub errors: Vec<ConfigError>,
}

/// A region column found in a table, with its disambiguation column.
#[derive(Debug, Clone, Copy)]
pub struct RegionDetail<'a> {
    pub entry: &'a RegionCatalogEntry,
    pub region_column: &'a str,
    pub disambig_column: Option<&'a str>,
}

impl RegionCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build entries from configuration.
    ///
    /// A broken entry is left out and reported in [`CatalogLoad::errors`];
    /// the remaining entries load normally.
    pub fn from_config(config: &RegionMappingConfig) -> CatalogLoad {
        let mut entries = Vec::with_capacity(config.region_wms_map.len());
        let mut errors = Vec::new();

        for (region_type, provider) in config.providers() {
            let entry = provider.and_then(|p| RegionCatalogEntry::from_config(region_type, &p));
            match entry {
                Ok(entry) => entries.push(entry),
                Err(e) => {
                    warn!(error = %e, "skipping region type");
                    errors.push(e);
                }
            }
        }

        let mut catalog = RegionCatalog { entries };
        errors.extend(catalog.link_disambiguation());

        info!(
            loaded = catalog.len(),
            rejected = errors.len(),
            "loaded region catalog"
        );
        CatalogLoad { catalog, errors }
    }

    /// Parse `regionMapping.json` text and build the catalog.
    pub fn from_json(text: &str) -> Result<CatalogLoad, CatalogError> {
        let config = RegionMappingConfig::from_json(text)?;
        Ok(Self::from_config(&config))
    }

    /// Resolve `disambigRegionId` references, dropping entries whose
    /// reference is unknown.
    fn link_disambiguation(&mut self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        let mut broken = Vec::new();

        for i in 0..self.entries.len() {
            let Some(reference) = self.entries[i].disambig_region_type().map(str::to_string) else {
                continue;
            };
            match self.position_by_type(&reference) {
                Some(j) => {
                    let source = self.entries[j].disambiguation_source();
                    self.entries[i].inherit_disambiguation(&source);
                }
                None => {
                    let e = ConfigError::UnknownDisambiguationRegion {
                        region_type: self.entries[i].region_type().to_string(),
                        reference,
                    };
                    warn!(error = %e, "skipping region type");
                    errors.push(e);
                    broken.push(i);
                }
            }
        }

        if !broken.is_empty() {
            let mut i = 0;
            self.entries.retain(|_| {
                let keep = !broken.contains(&i);
                i += 1;
                keep
            });
        }
        errors
    }

    /// Add an entry, e.g. one synthesized from an ad-hoc boundary dataset.
    pub fn push(&mut self, entry: RegionCatalogEntry) {
        self.entries.push(entry);
    }

    pub fn entries(&self) -> &[RegionCatalogEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Find the entry for a column name or alias.
    ///
    /// Region type names are tried across all entries before any alias;
    /// within each pass declaration order wins. Comparison ignores case.
    pub fn find_entry(&self, name: &str) -> Option<&RegionCatalogEntry> {
        self.position(name).map(|i| &self.entries[i])
    }

    pub fn find_entry_mut(&mut self, name: &str) -> Option<&mut RegionCatalogEntry> {
        let i = self.position(name)?;
        self.entries.get_mut(i)
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.position_by_type(name).or_else(|| {
            self.entries
                .iter()
                .position(|e| e.aliases().iter().any(|a| eq_ignore_case(a, name)))
        })
    }

    fn position_by_type(&self, name: &str) -> Option<usize> {
        self.entries
            .iter()
            .position(|e| eq_ignore_case(e.region_type(), name))
    }

    /// Every entry with a matching column among `var_names`, in catalog order.
    pub fn region_details<'a, C: AsRef<str>>(
        &'a self,
        var_names: &'a [C],
    ) -> Vec<RegionDetail<'a>> {
        self.entries
            .iter()
            .filter_map(|entry| {
                let region_column = entry.find_region_variable(var_names)?;
                Some(RegionDetail {
                    entry,
                    region_column,
                    disambig_column: entry.find_disambig_variable(var_names),
                })
            })
            .collect()
    }
}

impl Extend<RegionCatalogEntry> for RegionCatalog {
    fn extend<T: IntoIterator<Item = RegionCatalogEntry>>(&mut self, iter: T) {
        self.entries.extend(iter);
    }
}
