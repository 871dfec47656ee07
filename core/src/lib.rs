//! Core of the bolus carb and insulin log.
//!
//! - [`models`]: rows of the three sheets, their headers and cell parsing
//! - [`error`]: the error kinds callers branch on
//! - [`dose`]: pure carb / correction / total dose calculation
//! - [`session`]: the portions picked for one meal
//! - [`sheet`]: the tabular store abstraction and an in-memory sheet
//! - [`catalog`]: food catalog lookups and upsert-by-name
//! - [`catalog_import`]: bulk catalog upsert from CSV
//! - [`reconcile`]: insulin log upsert keyed by date and meal
//! - [`service`]: the operations a user drives, across all three tables

pub mod catalog;
pub mod catalog_import;
pub mod dose;
pub mod error;
pub mod models;
pub mod reconcile;
pub mod service;
pub mod session;
pub mod sheet;

pub use error::BolusError;
pub use service::BolusService;
pub use session::CarbSession;
