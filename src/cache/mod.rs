//! Cache keystore and key construction

pub mod keys;
pub mod keystore;

pub use keys::Namespace;
pub use keystore::{CacheKeystore, KeystoreConfig};
