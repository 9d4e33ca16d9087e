//! Resource identity allocation.
//!
//! Rule modules mint fresh subjects and objects (new concepts, relation
//! nodes) through this interface; the store itself never invents ids.

use ulid::Ulid;

use crate::core::model::ResourceId;

pub trait IdentityAllocator: Send + Sync {
    fn fresh(&self) -> ResourceId;
}

/// ULID-backed allocator. Ids sort by creation time, which keeps freshly
/// minted concepts stable in listings.
#[derive(Debug, Default, Clone)]
pub struct UlidAllocator {
    prefix: Option<String>,
}

impl UlidAllocator {
    pub fn new() -> Self {
        Self { prefix: None }
    }

    /// Namespaced allocator, e.g. `concept-01J9W...`.
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: Some(prefix.into()),
        }
    }
}

impl IdentityAllocator for UlidAllocator {
    fn fresh(&self) -> ResourceId {
        let id = Ulid::new().to_string();
        match &self.prefix {
            Some(p) => ResourceId::new(format!("{}-{}", p, id)),
            None => ResourceId::new(id),
        }
    }
}
