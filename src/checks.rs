//! Structural checks run by the validator.
//!
//! Every check is a pure function over an opened [`DatasetView`]. A failing
//! check hands back the single [`ValidationError`] it is responsible for and
//! the validator decides what to do with it; checks never stop one another.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::catalog::CatalogLoader;
use crate::dataset::{DatasetView, Matrix};
use crate::error::{CapError, ErrorKind, ValidationError};
use crate::organism::DatasetOrganism;

/// Rows of the count matrix inspected by [`check_count_matrix`]. Values past
/// this prefix are never read.
pub const MAX_OBS_ROWS_TO_CHECK: usize = 100;
pub const EMBEDDING_PREFIX: &str = "X_";
pub const ORGANISM_COLUMN: &str = "organism";
pub const OBS_COLUMNS_REQUIRED: [&str; 4] = ["assay", "disease", ORGANISM_COLUMN, "tissue"];

static PLAIN_NUMBER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*[+-]?(\d+\.?\d*|\.\d+)([eE][+-]?\d+)?\s*$").expect("numeric pattern compiles")
});

/// Sampled check that the submitted counts are non-negative integers.
pub fn check_count_matrix(view: &dyn DatasetView) -> Result<(), ValidationError> {
    debug!("checking count matrix");
    let Some(matrix) = view.count_matrix() else {
        debug!("no count matrix in raw.X or X");
        return Err(ErrorKind::MissingCountMatrix.into());
    };
    if !is_positive_integer_sample(matrix, view.n_obs()) {
        debug!("non-integer or negative values found in count matrix sample");
        return Err(ErrorKind::MissingCountMatrix.into());
    }
    Ok(())
}

/// True when the first `min(n_obs, 100)` rows hold only non-negative
/// integral values. For sparse matrices only stored values are inspected.
pub fn is_positive_integer_sample(matrix: &Matrix, n_obs: usize) -> bool {
    let max_rows = n_obs.min(MAX_OBS_ROWS_TO_CHECK);
    debug!(
        n_obs,
        max_rows,
        is_sparse = matrix.is_sparse(),
        "sampling count matrix"
    );
    let sample = matrix.leading_values(max_rows).collect::<Vec<_>>();
    has_only_integers(&sample) && !has_negative_values(&sample)
}

pub fn has_only_integers(values: &[f64]) -> bool {
    values
        .iter()
        .all(|value| value.is_finite() && *value == value.trunc())
}

pub fn has_negative_values(values: &[f64]) -> bool {
    values.iter().any(|value| *value < 0.0)
}

pub fn check_embeddings(view: &dyn DatasetView) -> Result<(), ValidationError> {
    debug!("checking obsm");
    let Some(obsm) = view.obsm() else {
        debug!("obsm is not present");
        return Err(ErrorKind::MissingEmbeddings.into());
    };
    let expected = (view.n_obs(), 2);
    let found = obsm
        .iter()
        .any(|(name, embedding)| name.starts_with(EMBEDDING_PREFIX) && embedding.dim() == expected);
    if !found {
        debug!(keys = ?obsm.keys().collect::<Vec<_>>(), "no qualifying embedding in obsm");
        return Err(ErrorKind::MissingEmbeddings.into());
    }
    Ok(())
}

/// Full scan of the required obs columns. Blank strings count as missing.
pub fn check_obs(view: &dyn DatasetView) -> Result<(), ValidationError> {
    debug!(required = ?OBS_COLUMNS_REQUIRED, "checking obs");
    let Some(obs) = view.obs() else {
        return Err(ErrorKind::MissingObsColumns.into());
    };
    for name in OBS_COLUMNS_REQUIRED {
        let Some(column) = obs.column(name) else {
            debug!(column = name, "required obs column is absent");
            return Err(ErrorKind::MissingObsColumns.into());
        };
        if column.iter().any(|value| is_blank(value.as_deref())) {
            debug!(column = name, "required obs column has blank values");
            return Err(ErrorKind::MissingObsColumns.into());
        }
    }
    Ok(())
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|value| value.trim().is_empty())
}

/// Result of the gene identifier check together with what it recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneIdCheck {
    /// Var index with version suffixes removed.
    pub gene_ids: Vec<String>,
    /// `None` when the check stopped before organisms were resolved.
    pub organism: Option<DatasetOrganism>,
    pub outcome: Result<(), ValidationError>,
}

impl GeneIdCheck {
    fn stop(gene_ids: Vec<String>) -> Self {
        Self {
            gene_ids,
            organism: None,
            outcome: Err(ErrorKind::NonStandardVar.into()),
        }
    }
}

/// Checks the var index against the catalog of the dataset's organism.
///
/// Returns `Err` only when a catalog cannot be loaded; defects in the dataset
/// are reported through [`GeneIdCheck::outcome`].
pub fn check_gene_ids(
    view: &dyn DatasetView,
    catalogs: &CatalogLoader,
) -> Result<GeneIdCheck, CapError> {
    debug!("checking var index");
    let index = view.var().index();
    let gene_ids = remove_gene_versions(index);

    if !is_unique(&gene_ids) {
        debug!("var index has duplicate gene ids");
        return Ok(GeneIdCheck::stop(gene_ids));
    }

    if let Some(raw_var) = view.raw().and_then(|raw| raw.var.as_ref()) {
        debug!("raw is present, checking var index is a subset of raw.var index");
        // Both indices are compared with their version suffixes intact.
        let raw_ids = raw_var
            .index()
            .iter()
            .map(String::as_str)
            .collect::<HashSet<_>>();
        if !index.iter().all(|id| raw_ids.contains(id.as_str())) {
            return Ok(GeneIdCheck::stop(gene_ids));
        }
    }

    let organism = DatasetOrganism::resolve(organism_labels(view));
    debug!(label = ?organism.label, organism = %organism.organism, "resolved dataset organism");

    let outcome = if organism.requires_gene_check() {
        validate_gene_ids(&gene_ids, &organism, catalogs)?
    } else {
        debug!("no supported organism in dataset, gene id validation skipped");
        Ok(())
    };

    Ok(GeneIdCheck {
        gene_ids,
        organism: Some(organism),
        outcome,
    })
}

fn validate_gene_ids(
    gene_ids: &[String],
    organism: &DatasetOrganism,
    catalogs: &CatalogLoader,
) -> Result<Result<(), ValidationError>, CapError> {
    if gene_ids.is_empty() || looks_numeric(gene_ids) {
        debug!("gene ids are missing");
        return Ok(Err(ErrorKind::NonStandardVar.into()));
    }
    let members = organism.organism.catalog_members();
    let Some(catalog) = catalogs.load(members)? else {
        return Ok(Err(ErrorKind::NonStandardVar.into()));
    };
    if let Some(unknown) = gene_ids.iter().find(|id| !catalog.contains(id.as_str())) {
        debug!(gene_id = %unknown, "gene id is not in the catalog");
        return Ok(Err(ErrorKind::NonStandardVar.into()));
    }
    Ok(Ok(()))
}

/// Strips the version suffix: `ENSG0001.8` becomes `ENSG0001`.
pub fn remove_gene_version(id: &str) -> &str {
    id.split('.').next().unwrap_or(id)
}

pub fn remove_gene_versions(ids: &[String]) -> Vec<String> {
    ids.iter()
        .map(|id| remove_gene_version(id).to_string())
        .collect()
}

/// True when every identifier parses as a plain number.
pub fn looks_numeric(ids: &[String]) -> bool {
    !ids.is_empty() && ids.iter().all(|id| PLAIN_NUMBER.is_match(id))
}

fn is_unique(ids: &[String]) -> bool {
    let mut seen = HashSet::with_capacity(ids.len());
    ids.iter().all(|id| seen.insert(id.as_str()))
}

fn organism_labels(view: &dyn DatasetView) -> Vec<&str> {
    view.obs()
        .and_then(|obs| obs.column(ORGANISM_COLUMN))
        .map(|column| column.iter().flatten().map(String::as_str).collect())
        .unwrap_or_default()
}
