//! Upload-gate validation of AnnData datasets for the Cell Annotation
//! Platform.
//!
//! A [`validator::Validator`] opens a dataset through a
//! [`dataset::DatasetReader`], runs every structural check and collects all
//! findings into one [`error::ErrorAggregate`], so a submitter sees the full
//! list of defects after a single run.

pub mod catalog;
pub mod checks;
pub mod config;
pub mod dataset;
pub mod error;
pub mod organism;
pub mod output;
pub mod reader;
pub mod validator;
