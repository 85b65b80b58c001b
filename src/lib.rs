//! Derives a hierarchical parts catalog from a saved Digi-Key
//! product-category listing page: anchor scraping into a flat key table,
//! a single sorted pass building the directory/table tree, a consistency
//! check against the staging table, and a regrouping pass that folds
//! " - "-prefixed sibling tables into synthetic sub-directories.

pub mod archiver;
pub mod catalog;
pub mod error;
pub mod fetcher;
pub mod models;
pub mod parser;
