//! # Profile Store
//!
//! Local persistence for a single user profile.
//!
//! This crate provides:
//! - The profile data model and gameplay mutations
//! - Device-bound blob encryption
//! - A single-slot backup
//! - Schema validation and repair
//! - Stepwise schema migration
//! - The coordinator that ties load, save and recovery together
//! - An autosave scheduler with retry

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod autosave;
pub mod backup;
pub mod codec;
pub mod config;
pub mod events;
pub mod migration;
pub mod profile;
pub mod providers;
pub mod store;
pub mod validation;

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::autosave::*;
    pub use crate::backup::*;
    pub use crate::codec::*;
    pub use crate::config::*;
    pub use crate::events::*;
    pub use crate::migration::*;
    pub use crate::profile::*;
    pub use crate::providers::*;
    pub use crate::store::*;
    pub use crate::validation::*;
    pub use profile_common::prelude::*;
}

pub use prelude::*;
