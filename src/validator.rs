use std::fmt;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info};

use crate::catalog::CatalogLoader;
use crate::checks::{check_count_matrix, check_embeddings, check_gene_ids, check_obs};
use crate::dataset::DatasetReader;
use crate::error::{CapError, ErrorAggregate};

pub const H5AD_EXTENSION: &str = "h5ad";

/// Stages of a single validation run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    Init,
    OpenSource,
    CheckMatrix,
    CheckEmbeddings,
    CheckMetadata,
    CheckGeneIds,
    Aggregate,
    Passed,
    Failed,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Init => "Init",
            Stage::OpenSource => "OpenSource",
            Stage::CheckMatrix => "CheckMatrix",
            Stage::CheckEmbeddings => "CheckEmbeddings",
            Stage::CheckMetadata => "CheckMetadata",
            Stage::CheckGeneIds => "CheckGeneIds",
            Stage::Aggregate => "Aggregate",
            Stage::Passed => "Passed",
            Stage::Failed => "Failed",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

/// Everything a run found out about one dataset.
#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub path: Utf8PathBuf,
    pub passed: bool,
    /// Organism label resolved from the obs `organism` column.
    pub organism: Option<String>,
    /// Var index with version suffixes removed.
    pub gene_ids: Vec<String>,
    pub errors: ErrorAggregate,
    pub validated_at: String,
}

impl ValidationReport {
    /// Turns a failed report into [`CapError::Validation`].
    pub fn into_result(self) -> Result<Self, CapError> {
        if self.errors.has_errors() {
            return Err(CapError::Validation(self.errors));
        }
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct Validator<R: DatasetReader> {
    reader: R,
    catalogs: CatalogLoader,
}

impl<R: DatasetReader> Validator<R> {
    pub fn new(reader: R, catalogs: CatalogLoader) -> Self {
        Self { reader, catalogs }
    }

    /// Validates the dataset at `path` and fails with the aggregated
    /// findings if there are any.
    pub fn validate(
        &self,
        path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ValidationReport, CapError> {
        self.inspect(path, sink)?.into_result()
    }

    /// Runs every check and reports the findings without failing on them.
    ///
    /// Only an unsupported file format stops the run before the checks;
    /// catalog or reader faults are returned as errors. The dataset view is
    /// dropped before this returns on every path.
    pub fn inspect(
        &self,
        path: &Utf8Path,
        sink: &dyn ProgressSink,
    ) -> Result<ValidationReport, CapError> {
        let started = Instant::now();
        emit(sink, started, Stage::Init, format!("validating {path}"));

        if !is_h5ad(path) {
            debug!(path = %path, "unsupported file extension");
            return Err(CapError::BadFile {
                path: path.to_path_buf(),
            });
        }

        emit(sink, started, Stage::OpenSource, "opening dataset".to_string());
        let view = self.reader.open(path)?;
        let mut errors = ErrorAggregate::new();

        emit(sink, started, Stage::CheckMatrix, "checking X".to_string());
        errors.record(check_count_matrix(&view));

        emit(sink, started, Stage::CheckEmbeddings, "checking obsm".to_string());
        errors.record(check_embeddings(&view));

        emit(sink, started, Stage::CheckMetadata, "checking obs".to_string());
        errors.record(check_obs(&view));

        emit(sink, started, Stage::CheckGeneIds, "checking var index".to_string());
        let gene_check = check_gene_ids(&view, &self.catalogs)?;
        errors.record(gene_check.outcome);
        drop(view);

        emit(
            sink,
            started,
            Stage::Aggregate,
            format!("{} error(s) collected", errors.len()),
        );
        let passed = !errors.has_errors();
        if passed {
            emit(sink, started, Stage::Passed, "validation passed".to_string());
        } else {
            emit(sink, started, Stage::Failed, "validation failed".to_string());
        }
        info!(path = %path, passed, errors = errors.len(), "finished anndata validation");

        Ok(ValidationReport {
            path: path.to_path_buf(),
            passed,
            organism: gene_check.organism.and_then(|organism| organism.label),
            gene_ids: gene_check.gene_ids,
            errors,
            validated_at: chrono::Utc::now().to_rfc3339(),
        })
    }
}

pub fn is_h5ad(path: &Utf8Path) -> bool {
    path.extension() == Some(H5AD_EXTENSION)
}

fn emit(sink: &dyn ProgressSink, started: Instant, stage: Stage, message: String) {
    debug!(stage = %stage, "{message}");
    sink.event(ProgressEvent {
        stage,
        message: format!("phase={stage}; {message}"),
        elapsed: Some(started.elapsed()),
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_h5ad_extension_is_accepted() {
        assert!(is_h5ad(Utf8Path::new("data/pbmc.h5ad")));
        assert!(!is_h5ad(Utf8Path::new("data/pbmc.h5")));
        assert!(!is_h5ad(Utf8Path::new("data/pbmc.h5ad.gz")));
        assert!(!is_h5ad(Utf8Path::new("h5ad")));
    }
}
