//! Controller layer: views bound to routes, record forms, grids, importers
//! and the composites that wire them together.

pub mod composite;
pub mod database;
pub mod form;
pub mod grid;
pub mod importer;
pub mod records;
pub mod view;
pub mod view_controller;

pub use composite::{
    GridAndFormController, GridAndFormOptions, GridFormImporterController, GridFormImporterOptions,
};
pub use database::{DatabaseApi, DatabaseHandle, MissingDatabaseApi, DATABASE_INJECTION};
pub use form::{FormController, FormLabels, FormMode, FormOptions, FORM_MODE_KEY};
pub use grid::{GridController, GridFilter, GridOptions};
pub use importer::{ImportReport, ImporterController};
pub use view::{LongTaskGate, View};
pub use view_controller::{
    view_initializer, view_lifecycle, ViewBehavior, ViewController, ViewOptions,
};

#[cfg(test)]
#[path = "tests/support.rs"]
mod test_support;
