//! Core domain types and shared logic for the kennel portal services.
//!
//! This crate defines the data model used across all other crates:
//! - Storage references and the reference extractor
//! - Strictly validated dog identifiers
//! - CSV serialization of typed records
//! - Principals, permission roles and token hashing
//! - Configuration

pub mod config;
pub mod csv;
pub mod error;
pub mod ids;
pub mod principal;
pub mod reference;

pub use error::{Error, Result};
pub use ids::DogId;
pub use principal::{PermissionRole, Principal, hash_token};
pub use reference::{ReferenceExtractor, StorageReference};

/// Bucket holding dog profile pictures.
pub const DEFAULT_AVATARS_BUCKET: &str = "dog-avatars";

/// Bucket holding media attached to dog updates.
pub const DEFAULT_UPDATES_BUCKET: &str = "dog-updates";

/// Path segment preceding `{bucket}/{path}` in public object URLs.
pub const DEFAULT_PUBLIC_URL_MARKER: &str = "/storage/v1/object/public/";
