//! # Profile Common
//!
//! Common types shared across Profile Vault crates:
//! - Error taxonomy for persistence failures
//! - Schema version constants and compatibility checks
//! - Identifier types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::version::*;
}

pub use prelude::*;
