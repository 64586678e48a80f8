//! easyvisa-classifiers: exploratory analysis and classical classifiers for
//! visa application outcomes.
//!
//! The crate covers the whole batch pipeline: loading the EasyVisa CSV into
//! typed records, descriptive statistics, outlier capping with categorical
//! encoding and a stratified split, a roster of tree-based classifiers with
//! cross-validated hyperparameter search, evaluation, and HTML reporting.
//!
//! Stages pass explicit values to each other and never share mutable state.
pub mod config;
pub mod data_handling;
pub mod error;
pub mod evaluation;
pub mod io;
pub mod model_selection;
pub mod models;
pub mod preprocessing;
pub mod report;
pub mod stats;
pub mod trainer;
