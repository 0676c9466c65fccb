//! Core library for the tooling-sync command line application.
//!
//! The crate reconciles tooling lifecycle records with the Excel workbooks
//! suppliers fill in offline. Cell values are normalised in [`normalize`],
//! expiration forecasts live in [`forecast`], field-level change tracking and
//! the audit log in [`changes`], the workbook contract in [`layout`] and
//! [`io`], persistence behind the traits in [`store`], and the export/import
//! orchestration in [`sync`].

pub mod changes;
pub mod config;
pub mod error;
pub mod forecast;
pub mod io;
pub mod layout;
pub mod model;
pub mod normalize;
pub mod records;
pub mod store;
pub mod sync;

pub use error::{Result, ToolError};
