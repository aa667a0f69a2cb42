use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use tracing::debug;

use crate::error::CapError;
use crate::organism::Organism;

/// Column of the bundled tables holding canonical Ensembl gene ids.
pub const GENE_ID_COLUMN: &str = "ENSEMBL_gene";

pub const DEFAULT_ORGANISMS: [Organism; 2] = [Organism::HomoSapiens, Organism::MusMusculus];

/// Canonical gene identifiers for one or more organisms.
#[derive(Debug, Clone, Default)]
pub struct GeneCatalog {
    ids: Vec<String>,
    lookup: HashSet<String>,
}

impl GeneCatalog {
    pub fn from_ids<I, S>(ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut catalog = Self::default();
        catalog.extend(ids.into_iter().map(Into::into));
        catalog
    }

    fn extend(&mut self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            self.lookup.insert(id.clone());
            self.ids.push(id);
        }
    }

    pub fn contains(&self, id: &str) -> bool {
        self.lookup.contains(id)
    }

    /// Identifiers in load order, duplicates across organisms included.
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Reads the per-organism gene tables from a catalog directory.
#[derive(Debug, Clone)]
pub struct CatalogLoader {
    root: Utf8PathBuf,
}

impl CatalogLoader {
    pub fn new(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    /// Loader over the tables shipped in the crate's `data/` directory.
    pub fn bundled() -> Self {
        Self::new(bundled_catalog_dir())
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn table_path(&self, organism: Organism) -> Option<Utf8PathBuf> {
        organism
            .catalog_stem()
            .map(|stem| self.root.join(format!("{stem}.csv")))
    }

    pub fn load_default(&self) -> Result<Option<GeneCatalog>, CapError> {
        self.load(&DEFAULT_ORGANISMS)
    }

    pub fn load_organism(&self, organism: Organism) -> Result<Option<GeneCatalog>, CapError> {
        self.load(&[organism])
    }

    /// Concatenates the tables of every selected organism in order.
    /// Returns `None` when the selection names no catalog at all.
    pub fn load(&self, organisms: &[Organism]) -> Result<Option<GeneCatalog>, CapError> {
        let mut catalog = GeneCatalog::default();
        let mut loaded = 0usize;
        for member in organisms.iter().flat_map(|organism| organism.catalog_members()) {
            let Some(path) = self.table_path(*member) else {
                continue;
            };
            let ids = read_gene_table(&path)?;
            debug!(organism = %member, path = %path, genes = ids.len(), "loaded gene table");
            catalog.extend(ids);
            loaded += 1;
        }
        if loaded == 0 {
            return Ok(None);
        }
        Ok(Some(catalog))
    }
}

impl Default for CatalogLoader {
    fn default() -> Self {
        Self::bundled()
    }
}

pub fn bundled_catalog_dir() -> Utf8PathBuf {
    Utf8PathBuf::from(concat!(env!("CARGO_MANIFEST_DIR"), "/data"))
}

fn read_gene_table(path: &Utf8Path) -> Result<Vec<String>, CapError> {
    let content = fs::read_to_string(path.as_std_path())
        .map_err(|_| CapError::CatalogRead(path.to_path_buf()))?;
    parse_gene_table(&content).map_err(|message| CapError::CatalogParse {
        path: path.to_path_buf(),
        message,
    })
}

fn parse_gene_table(content: &str) -> Result<Vec<String>, String> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let column = reader
        .headers()
        .map_err(|err| format!("failed to read header: {err}"))?
        .iter()
        .position(|name| name == GENE_ID_COLUMN)
        .ok_or_else(|| format!("missing column {GENE_ID_COLUMN}"))?;

    reader
        .records()
        .map(|record| {
            let record = record.map_err(|err| err.to_string())?;
            let line = record.position().map_or(0, |position| position.line());
            record
                .get(column)
                .map(str::to_string)
                .ok_or_else(|| format!("line {line}: missing {GENE_ID_COLUMN} value"))
        })
        .collect()
}
