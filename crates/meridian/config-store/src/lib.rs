//! Meridian config store
//!
//! Resolves `(application, profiles, label)` requests into
//! [`ConfigDocument`](meridian_types::ConfigDocument)s by reading property
//! files from a versioned backing store.

pub mod backend;
pub mod error;
pub mod render;
pub mod resolver;
pub mod source;

pub use backend::{ConfigBackend, FileSystemBackend, GitBackend, InMemoryBackend};
pub use error::{ConfigStoreError, Result};
pub use render::to_properties;
pub use resolver::{ConfigResolver, ConfigStoreConfig, MissingApplicationPolicy};
pub use source::{parse_properties, parse_source, parse_yaml};
