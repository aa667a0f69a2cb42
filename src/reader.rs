use std::collections::BTreeMap;
use std::fs;
use std::io::Read;

use camino::Utf8Path;
use flate2::read::GzDecoder;
use ndarray::Array2;
use serde::Deserialize;
use tracing::debug;

use crate::dataset::{
    CsrMatrix, Dataset, DatasetReader, Embeddings, Matrix, ObsTable, RawData, VarTable,
};
use crate::error::CapError;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Reads the JSON interchange encoding of an h5ad payload, gzip-compressed
/// or not.
#[derive(Debug, Clone, Copy, Default)]
pub struct SnapshotReader;

impl SnapshotReader {
    pub fn new() -> Self {
        Self
    }

    pub fn parse(content: &[u8]) -> Result<Dataset, CapError> {
        let parsed = if content.starts_with(&GZIP_MAGIC) {
            let mut decoder = GzDecoder::new(content);
            let mut text = String::new();
            decoder
                .read_to_string(&mut text)
                .map_err(|err| CapError::MalformedDataset(format!("gzip: {err}")))?;
            serde_json::from_str::<SnapshotDocument>(&text)
        } else {
            serde_json::from_slice::<SnapshotDocument>(content)
        };
        let document = parsed.map_err(|err| CapError::MalformedDataset(err.to_string()))?;
        document.into_dataset()
    }
}

impl DatasetReader for SnapshotReader {
    type View = Dataset;

    fn open(&self, path: &Utf8Path) -> Result<Dataset, CapError> {
        let content = fs::read(path.as_std_path()).map_err(|err| CapError::DatasetRead {
            path: path.to_path_buf(),
            message: err.to_string(),
        })?;
        debug!(path = %path, bytes = content.len(), "read dataset snapshot");
        Self::parse(&content)
    }
}

#[derive(Debug, Deserialize)]
struct SnapshotDocument {
    shape: (usize, usize),
    #[serde(default, rename = "X")]
    x: Option<MatrixDocument>,
    #[serde(default)]
    raw: Option<RawDocument>,
    #[serde(default)]
    obs: Option<ObsDocument>,
    #[serde(default)]
    var: Option<VarDocument>,
    #[serde(default)]
    obsm: Option<BTreeMap<String, Vec<Vec<f64>>>>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
enum MatrixDocument {
    Dense(Vec<Vec<f64>>),
    Csr(CsrDocument),
}

#[derive(Debug, Deserialize)]
struct CsrDocument {
    shape: (usize, usize),
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

#[derive(Debug, Deserialize)]
struct RawDocument {
    #[serde(default, rename = "X")]
    x: Option<MatrixDocument>,
    #[serde(default)]
    var: Option<VarDocument>,
}

#[derive(Debug, Deserialize)]
struct ObsDocument {
    #[serde(default)]
    columns: BTreeMap<String, Vec<Option<String>>>,
}

#[derive(Debug, Deserialize)]
struct VarDocument {
    index: Vec<String>,
}

impl SnapshotDocument {
    fn into_dataset(self) -> Result<Dataset, CapError> {
        let (n_obs, n_vars) = self.shape;

        let x = self.x.map(MatrixDocument::into_matrix).transpose()?;
        if let Some(matrix) = &x {
            if matrix.shape() != self.shape {
                return Err(CapError::MalformedDataset(format!(
                    "X has shape {:?}, dataset shape is {:?}",
                    matrix.shape(),
                    self.shape
                )));
            }
        }

        let raw = self
            .raw
            .map(|raw| -> Result<RawData, CapError> {
                Ok(RawData {
                    x: raw.x.map(MatrixDocument::into_matrix).transpose()?,
                    var: raw.var.map(|var| VarTable::new(var.index)),
                })
            })
            .transpose()?;

        let obs = self
            .obs
            .map(|obs| {
                obs.columns
                    .into_iter()
                    .try_fold(ObsTable::new(n_obs), |table, (name, values)| {
                        table.with_column(&name, values)
                    })
            })
            .transpose()?;

        let var = match self.var {
            Some(var) if var.index.len() != n_vars => {
                return Err(CapError::MalformedDataset(format!(
                    "var index has {} entries, dataset has {n_vars} vars",
                    var.index.len()
                )));
            }
            Some(var) => VarTable::new(var.index),
            None => VarTable::positional(n_vars),
        };

        let obsm = self
            .obsm
            .map(|obsm| {
                obsm.into_iter()
                    .map(|(name, rows)| dense_from_rows(rows).map(|array| (name, array)))
                    .collect::<Result<Embeddings, CapError>>()
            })
            .transpose()?;

        Ok(Dataset {
            n_obs,
            n_vars,
            x,
            raw,
            obs,
            var,
            obsm,
        })
    }
}

impl MatrixDocument {
    fn into_matrix(self) -> Result<Matrix, CapError> {
        match self {
            MatrixDocument::Dense(rows) => dense_from_rows(rows).map(Matrix::Dense),
            MatrixDocument::Csr(csr) => {
                CsrMatrix::new(csr.shape, csr.indptr, csr.indices, csr.data).map(Matrix::Sparse)
            }
        }
    }
}

fn dense_from_rows(rows: Vec<Vec<f64>>) -> Result<Array2<f64>, CapError> {
    let n_rows = rows.len();
    let n_cols = rows.first().map(Vec::len).unwrap_or(0);
    if rows.iter().any(|row| row.len() != n_cols) {
        return Err(CapError::MalformedDataset(
            "dense array rows have different lengths".to_string(),
        ));
    }
    let values = rows.into_iter().flatten().collect::<Vec<_>>();
    Array2::from_shape_vec((n_rows, n_cols), values)
        .map_err(|err| CapError::MalformedDataset(err.to_string()))
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use assert_matches::assert_matches;
    use flate2::Compression;
    use flate2::write::GzEncoder;

    use super::*;
    use crate::dataset::DatasetView;

    const SNAPSHOT: &str = r#"{
        "shape": [2, 3],
        "X": {"csr": {"shape": [2, 3], "indptr": [0, 1, 3], "indices": [2, 0, 1], "data": [1.0, 4.0, 2.0]}},
        "obs": {"columns": {"organism": ["Homo sapiens", null]}},
        "var": {"index": ["ENSG00000141510", "ENSG00000111640", "ENSG00000075624"]},
        "obsm": {"X_umap": [[0.1, 0.2], [0.3, 0.4]]}
    }"#;

    #[test]
    fn parse_plain_snapshot() {
        let dataset = SnapshotReader::parse(SNAPSHOT.as_bytes()).unwrap();
        assert_eq!(dataset.shape(), (2, 3));
        assert_matches!(dataset.x(), Some(Matrix::Sparse(_)));
        assert_eq!(dataset.var().len(), 3);

        let organism = dataset.obs().and_then(|obs| obs.column("organism")).unwrap();
        assert_eq!(organism[0].as_deref(), Some("Homo sapiens"));
        assert_eq!(organism[1], None);

        let umap = &dataset.obsm().unwrap()["X_umap"];
        assert_eq!(umap.dim(), (2, 2));
    }

    #[test]
    fn parse_gzip_snapshot() {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(SNAPSHOT.as_bytes()).unwrap();
        let compressed = encoder.finish().unwrap();

        let dataset = SnapshotReader::parse(&compressed).unwrap();
        assert_eq!(dataset.shape(), (2, 3));
    }

    #[test]
    fn missing_var_gets_positional_index() {
        let dataset = SnapshotReader::parse(br#"{"shape": [1, 2]}"#).unwrap();
        assert_eq!(dataset.var().index(), &["0".to_string(), "1".to_string()]);
        assert!(dataset.x().is_none());
        assert!(dataset.obs().is_none());
    }

    #[test]
    fn ragged_dense_matrix_is_malformed() {
        let err = SnapshotReader::parse(br#"{"shape": [2, 2], "X": {"dense": [[1.0, 2.0], [3.0]]}}"#)
            .unwrap_err();
        assert_matches!(err, CapError::MalformedDataset(_));
    }

    #[test]
    fn shape_mismatch_is_malformed() {
        let err = SnapshotReader::parse(br#"{"shape": [1, 1], "X": {"dense": [[1.0, 2.0]]}}"#)
            .unwrap_err();
        assert_matches!(err, CapError::MalformedDataset(_));
    }
}
