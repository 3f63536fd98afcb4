//! # Grovewatch Common
//!
//! Common types and shared abstractions for Grovewatch.
//!
//! This crate provides foundational types used by the simulation and the server:
//! - ID types (EntityId, OwnerId, GroupId, CampId)
//! - Horizontal-plane math helpers
//! - Protocol version information for replication frames
//! - Common error types
//! - Prelude for convenient imports

#![warn(missing_docs)]
#![warn(clippy::all)]
#![deny(clippy::unwrap_used)]

pub mod error;
pub mod ids;
pub mod math;
pub mod version;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::error::*;
    pub use crate::ids::*;
    pub use crate::math::*;
    pub use crate::version::*;
}

pub use prelude::*;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_compatibility() {
        let v1 = ProtocolVersion::new(1, 0, 0);
        let v2 = ProtocolVersion::new(1, 1, 0);
        let v3 = ProtocolVersion::new(2, 0, 0);

        assert!(v2.is_compatible_with(&v1));
        assert!(!v1.is_compatible_with(&v2));
        assert!(!v1.is_compatible_with(&v3));
    }

    #[test]
    fn test_version_mismatch_message() {
        let err = GrovewatchError::VersionMismatch {
            expected: ProtocolVersion::REPLICATION,
            actual: ProtocolVersion::new(9, 0, 0),
        };
        assert_eq!(
            err.to_string(),
            "Protocol version mismatch: expected 1.0.0, got 9.0.0"
        );
    }
}
