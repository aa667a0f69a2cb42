use std::collections::BTreeMap;

use camino::Utf8Path;
use ndarray::{Array2, s};

use crate::error::CapError;

/// Named low-dimensional embeddings (the AnnData `obsm` mapping).
pub type Embeddings = BTreeMap<String, Array2<f64>>;

/// Read-only access to an opened AnnData container.
///
/// Views are released by dropping them; the validator holds one for exactly
/// the duration of a single run.
pub trait DatasetView {
    /// `(n_obs, n_vars)` of the primary matrix.
    fn shape(&self) -> (usize, usize);
    fn x(&self) -> Option<&Matrix>;
    fn raw(&self) -> Option<&RawData>;
    fn obs(&self) -> Option<&ObsTable>;
    fn var(&self) -> &VarTable;
    fn obsm(&self) -> Option<&Embeddings>;

    fn n_obs(&self) -> usize {
        self.shape().0
    }

    /// Matrix holding the submitted counts: `raw.X` when present, else `X`.
    fn count_matrix(&self) -> Option<&Matrix> {
        match self.raw() {
            Some(raw) => raw.x.as_ref(),
            None => self.x(),
        }
    }
}

pub trait DatasetReader {
    type View: DatasetView;

    fn open(&self, path: &Utf8Path) -> Result<Self::View, CapError>;
}

#[derive(Debug, Clone, PartialEq)]
pub enum Matrix {
    Dense(Array2<f64>),
    Sparse(CsrMatrix),
}

impl Matrix {
    pub fn shape(&self) -> (usize, usize) {
        match self {
            Matrix::Dense(array) => array.dim(),
            Matrix::Sparse(csr) => csr.shape(),
        }
    }

    pub fn n_rows(&self) -> usize {
        self.shape().0
    }

    pub fn is_sparse(&self) -> bool {
        matches!(self, Matrix::Sparse(_))
    }

    /// Values of the first `rows` rows. Sparse matrices yield stored values
    /// only.
    pub fn leading_values(&self, rows: usize) -> Box<dyn Iterator<Item = f64> + '_> {
        let rows = rows.min(self.n_rows());
        match self {
            Matrix::Dense(array) => Box::new(array.slice(s![..rows, ..]).into_iter().copied()),
            Matrix::Sparse(csr) => Box::new(csr.row_data(rows).iter().copied()),
        }
    }
}

/// Compressed sparse row matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct CsrMatrix {
    shape: (usize, usize),
    indptr: Vec<usize>,
    indices: Vec<usize>,
    data: Vec<f64>,
}

impl CsrMatrix {
    pub fn new(
        shape: (usize, usize),
        indptr: Vec<usize>,
        indices: Vec<usize>,
        data: Vec<f64>,
    ) -> Result<Self, CapError> {
        let (rows, cols) = shape;
        if indptr.len() != rows + 1 {
            return Err(CapError::MalformedDataset(format!(
                "csr indptr has {} entries, expected {}",
                indptr.len(),
                rows + 1
            )));
        }
        if indptr.first() != Some(&0) || indptr.windows(2).any(|pair| pair[0] > pair[1]) {
            return Err(CapError::MalformedDataset(
                "csr indptr must start at 0 and be non-decreasing".to_string(),
            ));
        }
        if indptr[rows] != data.len() || indices.len() != data.len() {
            return Err(CapError::MalformedDataset(format!(
                "csr stores {} values but indptr ends at {} with {} indices",
                data.len(),
                indptr[rows],
                indices.len()
            )));
        }
        if let Some(column) = indices.iter().find(|column| **column >= cols) {
            return Err(CapError::MalformedDataset(format!(
                "csr column index {column} out of bounds for {cols} columns"
            )));
        }
        Ok(Self {
            shape,
            indptr,
            indices,
            data,
        })
    }

    pub fn from_dense(array: &Array2<f64>) -> Self {
        let mut indptr = vec![0];
        let mut indices = Vec::new();
        let mut data = Vec::new();
        for row in array.rows() {
            for (column, value) in row.iter().enumerate() {
                if *value != 0.0 {
                    indices.push(column);
                    data.push(*value);
                }
            }
            indptr.push(data.len());
        }
        Self {
            shape: array.dim(),
            indptr,
            indices,
            data,
        }
    }

    pub fn shape(&self) -> (usize, usize) {
        self.shape
    }

    pub fn nnz(&self) -> usize {
        self.data.len()
    }

    /// Stored values of the first `rows` rows.
    pub fn row_data(&self, rows: usize) -> &[f64] {
        let rows = rows.min(self.shape.0);
        &self.data[..self.indptr[rows]]
    }
}

/// Per-cell metadata. Missing values are `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObsTable {
    n_rows: usize,
    columns: BTreeMap<String, Vec<Option<String>>>,
}

impl ObsTable {
    pub fn new(n_rows: usize) -> Self {
        Self {
            n_rows,
            columns: BTreeMap::new(),
        }
    }

    pub fn with_column<I, S>(mut self, name: &str, values: I) -> Result<Self, CapError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        self.insert_column(name, values)?;
        Ok(self)
    }

    /// Fills a column with the same value on every row.
    pub fn with_constant(mut self, name: &str, value: &str) -> Self {
        let column = vec![Some(value.to_string()); self.n_rows];
        self.columns.insert(name.to_string(), column);
        self
    }

    pub fn insert_column<I, S>(&mut self, name: &str, values: I) -> Result<(), CapError>
    where
        I: IntoIterator<Item = Option<S>>,
        S: Into<String>,
    {
        let values = values
            .into_iter()
            .map(|value| value.map(Into::into))
            .collect::<Vec<_>>();
        if values.len() != self.n_rows {
            return Err(CapError::MalformedDataset(format!(
                "obs column {name} has {} values, expected {}",
                values.len(),
                self.n_rows
            )));
        }
        self.columns.insert(name.to_string(), values);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Vec<Option<String>>> {
        self.columns.remove(name)
    }

    pub fn n_rows(&self) -> usize {
        self.n_rows
    }

    pub fn column(&self, name: &str) -> Option<&[Option<String>]> {
        self.columns.get(name).map(Vec::as_slice)
    }
}

/// Per-gene metadata; only the index matters to validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VarTable {
    index: Vec<String>,
}

impl VarTable {
    pub fn new<I, S>(index: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            index: index.into_iter().map(Into::into).collect(),
        }
    }

    /// Positional index `"0"`, `"1"`, ... as AnnData assigns by default.
    pub fn positional(n_vars: usize) -> Self {
        Self::new((0..n_vars).map(|i| i.to_string()))
    }

    pub fn index(&self) -> &[String] {
        &self.index
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// The `raw` slot: unfiltered counts with their own gene index.
#[derive(Debug, Clone, PartialEq)]
pub struct RawData {
    pub x: Option<Matrix>,
    pub var: Option<VarTable>,
}

/// Fully materialised dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Dataset {
    pub n_obs: usize,
    pub n_vars: usize,
    pub x: Option<Matrix>,
    pub raw: Option<RawData>,
    pub obs: Option<ObsTable>,
    pub var: VarTable,
    pub obsm: Option<Embeddings>,
}

impl Dataset {
    /// Dataset shaped like a fresh AnnData object: positional indices, an
    /// obs table without columns and no embeddings.
    pub fn new(n_obs: usize, n_vars: usize) -> Self {
        Self {
            n_obs,
            n_vars,
            x: None,
            raw: None,
            obs: Some(ObsTable::new(n_obs)),
            var: VarTable::positional(n_vars),
            obsm: None,
        }
    }

    /// Dataset built around a dense primary matrix.
    pub fn from_dense(x: Array2<f64>) -> Self {
        let (n_obs, n_vars) = x.dim();
        let mut dataset = Self::new(n_obs, n_vars);
        dataset.x = Some(Matrix::Dense(x));
        dataset
    }

    pub fn set_embedding(&mut self, name: &str, embedding: Array2<f64>) {
        self.obsm
            .get_or_insert_with(Embeddings::new)
            .insert(name.to_string(), embedding);
    }
}

impl DatasetView for Dataset {
    fn shape(&self) -> (usize, usize) {
        (self.n_obs, self.n_vars)
    }

    fn x(&self) -> Option<&Matrix> {
        self.x.as_ref()
    }

    fn raw(&self) -> Option<&RawData> {
        self.raw.as_ref()
    }

    fn obs(&self) -> Option<&ObsTable> {
        self.obs.as_ref()
    }

    fn var(&self) -> &VarTable {
        &self.var
    }

    fn obsm(&self) -> Option<&Embeddings> {
        self.obsm.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use ndarray::array;

    use super::*;

    #[test]
    fn csr_from_dense_keeps_nonzero_values() {
        let dense = array![[0.0, 1.0, 2.0], [3.0, 0.0, 0.0], [0.0, 0.0, 4.0]];
        let csr = CsrMatrix::from_dense(&dense);
        assert_eq!(csr.shape(), (3, 3));
        assert_eq!(csr.nnz(), 4);
        assert_eq!(csr.row_data(2), &[1.0, 2.0, 3.0]);
        assert_eq!(csr.row_data(10), &[1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn csr_rejects_inconsistent_layout() {
        let err = CsrMatrix::new((2, 2), vec![0, 1], vec![0], vec![1.0]).unwrap_err();
        assert_matches!(err, CapError::MalformedDataset(_));

        let err = CsrMatrix::new((1, 2), vec![0, 1], vec![5], vec![1.0]).unwrap_err();
        assert_matches!(err, CapError::MalformedDataset(_));
    }

    #[test]
    fn leading_values_limits_rows() {
        let matrix = Matrix::Dense(array![[1.0, 2.0], [3.0, 4.0], [5.0, 6.0]]);
        let values = matrix.leading_values(2).collect::<Vec<_>>();
        assert_eq!(values, vec![1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn count_matrix_prefers_raw() {
        let mut dataset = Dataset::from_dense(array![[0.5]]);
        assert_eq!(dataset.count_matrix(), dataset.x.as_ref());

        dataset.raw = Some(RawData {
            x: Some(Matrix::Dense(array![[1.0]])),
            var: None,
        });
        assert_eq!(dataset.count_matrix(), Some(&Matrix::Dense(array![[1.0]])));
    }

    #[test]
    fn obs_column_length_must_match_rows() {
        let err = ObsTable::new(2)
            .with_column("assay", [Some("10x")])
            .unwrap_err();
        assert_matches!(err, CapError::MalformedDataset(_));
    }
}
