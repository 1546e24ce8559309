//! API request handlers

pub mod config;
pub mod health;
pub mod instances;
pub mod replication;

pub use config::*;
pub use health::*;
pub use instances::*;
pub use replication::*;
