pub mod error;
pub mod health;
pub mod imports;
pub mod metrics;
pub mod rates;
