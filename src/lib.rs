//! Courier rate import service
//!
//! Bulk import of courier shipping rates from spreadsheet rate sheets. The
//! API accepts uploads and queues import jobs; the worker parses each sheet,
//! validates it cell by cell and upserts the rates, reporting progress that
//! clients poll for.

pub mod app_state;
pub mod config;
pub mod db;
pub mod models;
pub mod routes;
pub mod services;
