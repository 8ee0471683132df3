//! Object identity for cross-renderer checks
//!
//! Buffers, uniform handles, samplers and shaders remember which window or
//! renderer they were created against. Every use validates that identity so
//! that mixing objects from two object graphs fails loudly instead of
//! touching another device's handles.

use crate::render::vulkan::{VulkanError, VulkanResult};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_OWNER_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a window or renderer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(u64);

impl OwnerId {
    /// Allocate a fresh identity
    pub fn next() -> Self {
        Self(NEXT_OWNER_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, for diagnostics
    pub const fn get(self) -> u64 {
        self.0
    }

    /// Fail with an owner mismatch unless `found` equals `self`
    pub fn ensure_owns(self, object: &'static str, found: Self) -> VulkanResult<()> {
        if self == found {
            Ok(())
        } else {
            log::error!("{object} belongs to #{} but was used with #{}", found.0, self.0);
            Err(VulkanError::OwnerMismatch {
                object,
                expected: self.0,
                found: found.0,
            })
        }
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
