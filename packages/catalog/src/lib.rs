#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Catalog access for the GIS pipeline.
//!
//! The catalog table `m_gis_data_catalog_main` is externally managed; this
//! crate only reads it (row lookup, entity universe) and builds the dynamic
//! UPDATE statement that the upload stage hands to `psql`. Reads go through
//! `switchy_database`; the write path is subprocess-only so production
//! hosts never see a direct connection from the pipeline.

pub mod db;
pub mod gateway;
pub mod update;

/// Errors that can occur during catalog operations.
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Database query error.
    #[error("Database error: {0}")]
    Database(#[from] switchy_database::DatabaseError),

    /// Row value conversion error.
    #[error("Data conversion error: {message}")]
    Conversion {
        /// Description of what went wrong.
        message: String,
    },
}
