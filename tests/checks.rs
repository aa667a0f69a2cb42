use ndarray::{Array2, array};

use cap_upload_validator::catalog::CatalogLoader;
use cap_upload_validator::checks::{
    MAX_OBS_ROWS_TO_CHECK, OBS_COLUMNS_REQUIRED, ORGANISM_COLUMN, check_count_matrix,
    check_embeddings, check_gene_ids, check_obs, is_positive_integer_sample,
};
use cap_upload_validator::dataset::{CsrMatrix, Dataset, Matrix, ObsTable, RawData, VarTable};
use cap_upload_validator::error::{ErrorKind, ValidationError};
use cap_upload_validator::organism::Organism;

fn both_layouts(dense: Array2<f64>) -> [Matrix; 2] {
    let sparse = CsrMatrix::from_dense(&dense);
    [Matrix::Dense(dense), Matrix::Sparse(sparse)]
}

fn human_genes(n: usize) -> Vec<String> {
    let catalog = CatalogLoader::bundled()
        .load_organism(Organism::HomoSapiens)
        .unwrap()
        .unwrap();
    catalog.ids()[..n].to_vec()
}

fn dataset_with_genes(genes: Vec<String>, organism: Option<&str>) -> Dataset {
    let n = genes.len();
    let mut dataset = Dataset::from_dense(Array2::<f64>::eye(n));
    dataset.var = VarTable::new(genes);
    if let Some(organism) = organism {
        dataset.obs = Some(ObsTable::new(n).with_constant(ORGANISM_COLUMN, organism));
    }
    dataset
}

fn err(kind: ErrorKind) -> Result<(), ValidationError> {
    Err(ValidationError::new(kind))
}

fn gene_outcome(dataset: &Dataset) -> Result<(), ValidationError> {
    check_gene_ids(dataset, &CatalogLoader::bundled())
        .unwrap()
        .outcome
}

#[test]
fn integer_counts_pass_for_dense_and_sparse() {
    let counts = array![[0.0, 1.0, 2.0], [3.0, 4.0, 5.0], [6.0, 7.0, 0.0]];
    for matrix in both_layouts(counts) {
        assert!(is_positive_integer_sample(&matrix, 3), "{matrix:?}");
    }
}

#[test]
fn fractional_counts_fail_for_dense_and_sparse() {
    let counts = array![[0.0, 1.5, 2.5], [3.5, 4.5, 5.5], [6.5, 7.5, 0.0]];
    for matrix in both_layouts(counts) {
        assert!(!is_positive_integer_sample(&matrix, 3), "{matrix:?}");
    }
}

#[test]
fn negative_counts_fail_for_dense_and_sparse() {
    let counts = array![[0.0, -1.0, -2.0], [-3.0, 4.0, -5.0], [6.0, 7.0, 0.0]];
    for matrix in both_layouts(counts) {
        assert!(!is_positive_integer_sample(&matrix, 3), "{matrix:?}");
    }
}

#[test]
fn rows_past_the_sample_are_not_inspected() {
    let mut counts = Array2::<f64>::ones((MAX_OBS_ROWS_TO_CHECK + 1, 2));
    counts[[MAX_OBS_ROWS_TO_CHECK, 0]] = 0.5;
    for matrix in both_layouts(counts) {
        assert!(is_positive_integer_sample(&matrix, MAX_OBS_ROWS_TO_CHECK + 1));
    }

    let mut counts = Array2::<f64>::ones((MAX_OBS_ROWS_TO_CHECK + 1, 2));
    counts[[MAX_OBS_ROWS_TO_CHECK - 1, 1]] = -1.0;
    for matrix in both_layouts(counts) {
        assert!(!is_positive_integer_sample(&matrix, MAX_OBS_ROWS_TO_CHECK + 1));
    }
}

#[test]
fn count_matrix_check_prefers_raw_counts() {
    let mut dataset = Dataset::from_dense(Array2::<f64>::eye(3) + 0.1);
    assert_eq!(
        check_count_matrix(&dataset),
        err(ErrorKind::MissingCountMatrix)
    );

    dataset.raw = Some(RawData {
        x: Some(Matrix::Dense(Array2::<f64>::eye(3))),
        var: None,
    });
    assert_eq!(check_count_matrix(&dataset), Ok(()));
}

#[test]
fn count_matrix_check_fails_without_matrix() {
    let mut dataset = Dataset::new(3, 3);
    assert_eq!(
        check_count_matrix(&dataset),
        err(ErrorKind::MissingCountMatrix)
    );

    dataset.x = Some(Matrix::Dense(Array2::<f64>::eye(3)));
    dataset.raw = Some(RawData { x: None, var: None });
    assert_eq!(
        check_count_matrix(&dataset),
        err(ErrorKind::MissingCountMatrix)
    );
}

#[test]
fn embedding_with_prefix_and_shape_passes() {
    let mut dataset = Dataset::from_dense(Array2::<f64>::eye(10));
    assert_eq!(
        check_embeddings(&dataset),
        err(ErrorKind::MissingEmbeddings)
    );

    dataset.set_embedding("X_test", Array2::ones((10, 2)));
    assert_eq!(check_embeddings(&dataset), Ok(()));

    dataset.obsm.as_mut().unwrap().remove("X_test");
    assert_eq!(
        check_embeddings(&dataset),
        err(ErrorKind::MissingEmbeddings)
    );
}

#[test]
fn embedding_needs_prefix_and_two_columns() {
    let mut dataset = Dataset::from_dense(Array2::<f64>::eye(10));
    dataset.set_embedding("umap", Array2::ones((10, 2)));
    dataset.set_embedding("X_pca", Array2::ones((10, 50)));
    dataset.set_embedding("X_tsne", Array2::ones((9, 2)));
    assert_eq!(
        check_embeddings(&dataset),
        err(ErrorKind::MissingEmbeddings)
    );

    dataset.set_embedding("X_umap", Array2::ones((10, 2)));
    assert_eq!(check_embeddings(&dataset), Ok(()));
}

fn complete_obs(n: usize) -> ObsTable {
    OBS_COLUMNS_REQUIRED
        .iter()
        .fold(ObsTable::new(n), |obs, column| obs.with_constant(column, "test_value"))
}

#[test]
fn complete_obs_passes() {
    let mut dataset = Dataset::from_dense(Array2::<f64>::eye(10));
    dataset.obs = Some(complete_obs(10));
    assert_eq!(check_obs(&dataset), Ok(()));
}

#[test]
fn dropping_any_required_column_fails() {
    for column in OBS_COLUMNS_REQUIRED {
        let mut obs = complete_obs(10);
        obs.remove_column(column);
        let mut dataset = Dataset::from_dense(Array2::<f64>::eye(10));
        dataset.obs = Some(obs);
        assert_eq!(
            check_obs(&dataset),
            err(ErrorKind::MissingObsColumns),
            "column {column}"
        );
    }

    let dataset = Dataset::from_dense(Array2::<f64>::eye(10));
    assert_eq!(
        check_obs(&dataset),
        err(ErrorKind::MissingObsColumns)
    );
}

#[test]
fn blank_values_in_required_columns_fail() {
    for blank in [Some(""), Some("   "), Some("\t"), None] {
        for column in OBS_COLUMNS_REQUIRED {
            let mut obs = complete_obs(3);
            obs.insert_column(column, [Some("value"), blank, Some("value")])
                .unwrap();
            let mut dataset = Dataset::from_dense(Array2::<f64>::eye(3));
            dataset.obs = Some(obs);
            assert_eq!(
                check_obs(&dataset),
                err(ErrorKind::MissingObsColumns),
                "column {column} with {blank:?}"
            );
        }
    }
}

#[test]
fn catalog_genes_with_known_organism_pass() {
    let dataset = dataset_with_genes(human_genes(10), Some("Homo sapiens"));
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, Ok(()));
    assert_eq!(check.gene_ids, human_genes(10));
    assert_eq!(
        check.organism.and_then(|organism| organism.label).as_deref(),
        Some("Homo sapiens")
    );
}

#[test]
fn version_suffixes_are_ignored() {
    let versioned = human_genes(10)
        .into_iter()
        .enumerate()
        .map(|(i, gene)| format!("{gene}.{i}"))
        .collect();
    let dataset = dataset_with_genes(versioned, Some("Homo sapiens"));
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, Ok(()));
    assert_eq!(check.gene_ids, human_genes(10));
}

#[test]
fn organism_label_is_matched_case_insensitively() {
    let dataset = dataset_with_genes(human_genes(10), Some(" HOMO SAPIENS "));
    assert_eq!(gene_outcome(&dataset), Ok(()));
}

#[test]
fn non_catalog_genes_with_known_organism_fail() {
    let genes = (0..10).map(|i| i.to_string()).collect();
    let dataset = dataset_with_genes(genes, Some("Homo sapiens"));
    assert_eq!(
        gene_outcome(&dataset),
        err(ErrorKind::NonStandardVar)
    );

    let genes = (0..10).map(|i| format!("GENE{i}")).collect();
    let dataset = dataset_with_genes(genes, Some("Homo sapiens"));
    assert_eq!(
        gene_outcome(&dataset),
        err(ErrorKind::NonStandardVar)
    );
}

#[test]
fn mouse_genes_are_not_human_genes() {
    let mouse = CatalogLoader::bundled()
        .load_organism(Organism::MusMusculus)
        .unwrap()
        .unwrap();
    let genes = mouse.ids()[..5].to_vec();

    let dataset = dataset_with_genes(genes.clone(), Some("Mus musculus"));
    assert_eq!(gene_outcome(&dataset), Ok(()));

    let dataset = dataset_with_genes(genes, Some("Homo sapiens"));
    assert_eq!(
        gene_outcome(&dataset),
        err(ErrorKind::NonStandardVar)
    );
}

#[test]
fn unsupported_organism_skips_gene_validation() {
    let genes = (0..10).map(|i| i.to_string()).collect();
    let dataset = dataset_with_genes(genes, Some("unsupported"));
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, Ok(()));
    assert_eq!(
        check.organism.and_then(|organism| organism.label).as_deref(),
        Some("unsupported")
    );
}

#[test]
fn missing_organism_skips_gene_validation() {
    let genes = (0..10).map(|i| i.to_string()).collect();
    let dataset = dataset_with_genes(genes, None);
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, Ok(()));
    assert_eq!(check.organism.and_then(|organism| organism.label), None);
}

fn with_second_organism(mut dataset: Dataset) -> Dataset {
    let obs = dataset.obs.as_mut().unwrap();
    let mut labels = obs.column(ORGANISM_COLUMN).unwrap().to_vec();
    labels[0] = Some("new organism".to_string());
    obs.insert_column(ORGANISM_COLUMN, labels).unwrap();
    dataset
}

#[test]
fn multiple_organisms_use_combined_catalog() {
    let genes = (0..10).map(|i| i.to_string()).collect();
    let dataset = with_second_organism(dataset_with_genes(genes, Some("unsupported")));
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, err(ErrorKind::NonStandardVar));
    assert_eq!(
        check.organism.and_then(|organism| organism.label).as_deref(),
        Some("Multi species")
    );

    let mouse = CatalogLoader::bundled()
        .load_organism(Organism::MusMusculus)
        .unwrap()
        .unwrap();
    let mut genes = human_genes(5);
    genes.extend(mouse.ids()[..5].iter().cloned());
    let dataset = with_second_organism(dataset_with_genes(genes, Some("unsupported")));
    assert_eq!(gene_outcome(&dataset), Ok(()));
}

#[test]
fn duplicate_canonical_genes_fail_before_organism_resolution() {
    let gene = human_genes(1).remove(0);
    let genes = vec![format!("{gene}.1"), format!("{gene}.2")];
    let dataset = dataset_with_genes(genes, Some("Homo sapiens"));
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, err(ErrorKind::NonStandardVar));
    assert_eq!(check.organism, None);
}

#[test]
fn var_index_must_be_subset_of_raw_index() {
    let genes = human_genes(10);
    let mut dataset = dataset_with_genes(genes.clone(), Some("Homo sapiens"));
    dataset.raw = Some(RawData {
        x: None,
        var: Some(VarTable::new(genes[..9].to_vec())),
    });
    assert_eq!(
        gene_outcome(&dataset),
        err(ErrorKind::NonStandardVar)
    );

    dataset.raw = Some(RawData {
        x: None,
        var: Some(VarTable::new(human_genes(12))),
    });
    assert_eq!(gene_outcome(&dataset), Ok(()));
}

#[test]
fn raw_index_is_compared_as_stored() {
    let genes = human_genes(10);
    let mut raw_genes = genes.clone();
    raw_genes[0].push_str(".3");
    let mut dataset = dataset_with_genes(genes, Some("Homo sapiens"));
    dataset.raw = Some(RawData {
        x: None,
        var: Some(VarTable::new(raw_genes)),
    });
    assert_eq!(gene_outcome(&dataset), err(ErrorKind::NonStandardVar));
}

#[test]
fn versioned_var_must_match_raw_index_as_stored() {
    let versioned = |suffix: &str| {
        human_genes(10)
            .into_iter()
            .map(|gene| format!("{gene}.{suffix}"))
            .collect::<Vec<_>>()
    };

    let mut dataset = dataset_with_genes(versioned("1"), Some("Homo sapiens"));
    dataset.raw = Some(RawData {
        x: None,
        var: Some(VarTable::new(versioned("1"))),
    });
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, Ok(()));
    assert_eq!(check.gene_ids, human_genes(10));

    dataset.raw = Some(RawData {
        x: None,
        var: Some(VarTable::new(human_genes(10))),
    });
    assert_eq!(gene_outcome(&dataset), err(ErrorKind::NonStandardVar));

    dataset.raw = Some(RawData {
        x: None,
        var: Some(VarTable::new(versioned("7"))),
    });
    assert_eq!(gene_outcome(&dataset), err(ErrorKind::NonStandardVar));
}

#[test]
fn blank_organism_label_alongside_real_one_uses_combined_catalog() {
    let mut dataset = dataset_with_genes(human_genes(4), Some("Homo sapiens"));
    let obs = dataset.obs.as_mut().unwrap();
    obs.insert_column(
        ORGANISM_COLUMN,
        [Some("Homo sapiens"), Some(" "), Some("Homo sapiens"), Some("")],
    )
    .unwrap();
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, Ok(()));
    assert_eq!(
        check.organism.map(|organism| organism.organism),
        Some(Organism::MultiSpecies)
    );
}

#[test]
fn empty_var_index_fails_for_known_organism() {
    let mut dataset = Dataset::new(3, 0);
    dataset.obs = Some(ObsTable::new(3).with_constant(ORGANISM_COLUMN, "Mus musculus"));
    let check = check_gene_ids(&dataset, &CatalogLoader::bundled()).unwrap();
    assert_eq!(check.outcome, err(ErrorKind::NonStandardVar));
    assert!(check.gene_ids.is_empty());
}
