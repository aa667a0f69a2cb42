use std::collections::BTreeSet;
use std::fmt;

use serde::Serialize;

/// Organisms the upload gate knows how to cross-reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Organism {
    HomoSapiens,
    MusMusculus,
    MultiSpecies,
    Unknown,
}

const LABELS: [(&str, Organism); 3] = [
    ("homo sapiens", Organism::HomoSapiens),
    ("mus musculus", Organism::MusMusculus),
    ("multi species", Organism::MultiSpecies),
];

const MULTI_SPECIES_CATALOGS: [Organism; 2] = [Organism::HomoSapiens, Organism::MusMusculus];

impl Organism {
    /// Maps a free-text label to an organism after trimming and lowercasing.
    pub fn from_label(label: &str) -> Self {
        let normalized = label.trim().to_lowercase();
        LABELS
            .iter()
            .find(|(known, _)| *known == normalized)
            .map(|(_, organism)| *organism)
            .unwrap_or(Organism::Unknown)
    }

    pub fn name(&self) -> Option<&'static str> {
        match self {
            Organism::HomoSapiens => Some("Homo sapiens"),
            Organism::MusMusculus => Some("Mus musculus"),
            Organism::MultiSpecies => Some("Multi species"),
            Organism::Unknown => None,
        }
    }

    pub fn taxonomy_id(&self) -> Option<&'static str> {
        match self {
            Organism::HomoSapiens => Some("NCBITaxon:9606"),
            Organism::MusMusculus => Some("NCBITaxon:10090"),
            Organism::MultiSpecies | Organism::Unknown => None,
        }
    }

    pub fn gene_prefix(&self) -> Option<&'static str> {
        match self {
            Organism::HomoSapiens | Organism::MultiSpecies => Some("ENSG"),
            Organism::MusMusculus => Some("ENSMUSG"),
            Organism::Unknown => None,
        }
    }

    /// File stem of the bundled catalog table, for single organisms only.
    pub fn catalog_stem(&self) -> Option<&'static str> {
        match self {
            Organism::HomoSapiens => Some("homo_sapiens"),
            Organism::MusMusculus => Some("mus_musculus"),
            Organism::MultiSpecies | Organism::Unknown => None,
        }
    }

    /// Single organisms whose catalogs make up this organism's catalog.
    pub fn catalog_members(&self) -> &'static [Organism] {
        match self {
            Organism::HomoSapiens => &MULTI_SPECIES_CATALOGS[..1],
            Organism::MusMusculus => &MULTI_SPECIES_CATALOGS[1..],
            Organism::MultiSpecies => &MULTI_SPECIES_CATALOGS,
            Organism::Unknown => &[],
        }
    }

    pub fn is_known(&self) -> bool {
        !matches!(self, Organism::Unknown)
    }
}

impl fmt::Display for Organism {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name().unwrap_or("unknown"))
    }
}

/// Organism resolved from every label found in a dataset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetOrganism {
    /// Label recorded for downstream consumers. `None` when the dataset
    /// carries no organism labels at all.
    pub label: Option<String>,
    pub organism: Organism,
}

impl DatasetOrganism {
    /// Resolves the distinct organism labels of a dataset.
    ///
    /// Empty labels are ignored. A single label resolves on its own; two or
    /// more distinct labels always resolve to [`Organism::MultiSpecies`],
    /// whichever organisms they name.
    pub fn resolve<'a, I>(labels: I) -> Self
    where
        I: IntoIterator<Item = &'a str>,
    {
        let distinct = labels
            .into_iter()
            .filter(|label| !label.is_empty())
            .collect::<BTreeSet<_>>();

        let mut iter = distinct.iter();
        match (iter.next(), iter.next()) {
            (None, _) => Self {
                label: None,
                organism: Organism::Unknown,
            },
            (Some(label), None) => Self {
                label: Some((*label).to_string()),
                organism: Organism::from_label(label),
            },
            (Some(_), Some(_)) => Self {
                label: Organism::MultiSpecies.name().map(str::to_string),
                organism: Organism::MultiSpecies,
            },
        }
    }

    /// Whether gene identifiers must be cross-referenced against a catalog.
    pub fn requires_gene_check(&self) -> bool {
        self.organism.is_known()
    }
}
