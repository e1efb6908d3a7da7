pub mod importer;
pub mod queue;
pub mod rate_sheet;
pub mod repository;
pub mod storage;
pub mod validation;
