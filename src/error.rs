use std::fmt;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use miette::Diagnostic;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum CapError {
    #[error("BadAnnDataFile: File format is not supported! ({path})")]
    #[diagnostic(help("the validator accepts AnnData files with the .h5ad extension"))]
    BadFile { path: Utf8PathBuf },

    #[error(transparent)]
    #[diagnostic(transparent)]
    Validation(#[from] ErrorAggregate),

    #[error("failed to read dataset {path}: {message}")]
    DatasetRead { path: Utf8PathBuf, message: String },

    #[error("malformed dataset: {0}")]
    MalformedDataset(String),

    #[error("failed to read gene catalog at {0}")]
    CatalogRead(Utf8PathBuf),

    #[error("failed to parse gene catalog {path}: {message}")]
    CatalogParse { path: Utf8PathBuf, message: String },

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),
}

impl CapError {
    /// True when the error describes a problem with the submitted file rather
    /// than with the environment the validator runs in.
    pub fn is_submission_defect(&self) -> bool {
        matches!(self, CapError::BadFile { .. } | CapError::Validation(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    BadFile,
    MissingCountMatrix,
    MissingEmbeddings,
    MissingObsColumns,
    NonStandardVar,
}

impl ErrorKind {
    /// Stable symbolic name shown to submitters and documented on the wiki.
    pub fn name(&self) -> &'static str {
        match self {
            ErrorKind::BadFile => "BadAnnDataFile",
            ErrorKind::MissingCountMatrix => "AnnDataFileMissingCountMatrix",
            ErrorKind::MissingEmbeddings => "AnnDataMissingEmbeddings",
            ErrorKind::MissingObsColumns => "AnnDataMisingObsColumns",
            ErrorKind::NonStandardVar => "AnnDataNonStandardVarError",
        }
    }

    pub fn message(&self) -> &'static str {
        match self {
            ErrorKind::BadFile => "File format is not supported!",
            ErrorKind::MissingCountMatrix => {
                "DataFile Incorrect format: raw data matrix is missing in .raw.X or .X."
            }
            ErrorKind::MissingEmbeddings => {
                "The embedding is missing or is incorrectly named: embeddings must be saved with the prefix X_, for example: X_tsne, X_pca or X_umap."
            }
            ErrorKind::MissingObsColumns => {
                "Required obs column(s) missing: file must contain 'assay', 'disease', 'organism' and 'tissue' fields with valid values, see (link to obs section of upload requirements) for more information."
            }
            ErrorKind::NonStandardVar => {
                "File does not contain ENSEMBL terms in var: see (link to var section of upload requirements). We currently support Homo sapiens and Mus musculus. If there are other species you wish to upload to CAP, please contact support@celltype.info and we will work to accommodate your request."
            }
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One finding about a submitted dataset. Two errors are equal when kind and
/// message match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Error, Diagnostic)]
#[error("{kind}: {message}")]
pub struct ValidationError {
    kind: ErrorKind,
    message: String,
}

impl ValidationError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            message: kind.message().to_string(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl From<ErrorKind> for ValidationError {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Ordered collection of findings from a single validation run.
///
/// A fresh aggregate is created for every run and the validator owns it for
/// the duration of that run only. Once it holds at least one error it can be
/// returned as an error itself through [`CapError::Validation`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Diagnostic)]
#[diagnostic(code(capval::validation))]
pub struct ErrorAggregate {
    #[related]
    errors: Vec<ValidationError>,
}

impl ErrorAggregate {
    pub fn new() -> Self {
        Self { errors: Vec::new() }
    }

    pub fn append(&mut self, error: impl Into<ValidationError>) {
        self.errors.push(error.into());
    }

    /// Appends the error carried by a failed check, if any.
    pub fn record(&mut self, outcome: Result<(), ValidationError>) {
        if let Err(error) = outcome {
            self.append(error);
        }
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ValidationError> {
        self.errors.get(index)
    }

    pub fn iter(&self) -> impl Iterator<Item = &ValidationError> {
        self.errors.iter()
    }

    pub fn kinds(&self) -> Vec<ErrorKind> {
        self.errors.iter().map(ValidationError::kind).collect()
    }

    pub fn to_list(&self) -> Vec<ValidationError> {
        self.errors.clone()
    }
}

impl fmt::Display for ErrorAggregate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "validation failed with {} error(s)", self.errors.len())?;
        for error in &self.errors {
            write!(f, "\n{error}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ErrorAggregate {}
