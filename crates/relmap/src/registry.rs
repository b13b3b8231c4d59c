//! The type descriptor cache.
//!
//! One slot per type. The map lock is only held to fetch or create a slot;
//! construction runs inside the slot's `OnceLock`, so callers asking for the
//! same uncached type wait for a single build while other types proceed.

use relmap_core::{ConfigError, Entity, Error, Result, TypeDescriptor};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, OnceLock, RwLock};

/// A built descriptor, or the message of the configuration error that
/// prevented building it.
type Built = std::result::Result<Arc<dyn Any + Send + Sync>, String>;
type Slot = Arc<OnceLock<Built>>;

/// Memoizes one [`TypeDescriptor`] per mapped type.
///
/// A failed build is cached too: every later request for that type gets a
/// configuration error with the same message, and the build is never retried.
#[derive(Default)]
pub struct DescriptorRegistry {
    slots: RwLock<HashMap<TypeId, Slot>>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fetch the descriptor for `E`, building it on first request.
    #[allow(clippy::result_large_err)]
    pub fn descriptor<E: Entity>(&self) -> Result<Arc<TypeDescriptor<E>>> {
        let slot = self.slot(TypeId::of::<E>());
        let built = slot.get_or_init(|| match TypeDescriptor::<E>::build() {
            Ok(desc) => Ok(Arc::new(desc) as Arc<dyn Any + Send + Sync>),
            Err(e) => {
                tracing::warn!(entity = E::TYPE_NAME, error = %e, "Type descriptor construction failed");
                Err(match e {
                    Error::Config(config) => config.message,
                    other => other.to_string(),
                })
            }
        });

        match built {
            Ok(desc) => Arc::clone(desc)
                .downcast::<TypeDescriptor<E>>()
                .map_err(|_| {
                    Error::Config(ConfigError::new(format!(
                        "descriptor slot for {} holds another type",
                        E::TYPE_NAME
                    )))
                }),
            Err(message) => Err(Error::Config(ConfigError::new(message.clone()))),
        }
    }

    fn slot(&self, id: TypeId) -> Slot {
        {
            let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
            if let Some(slot) = slots.get(&id) {
                return Arc::clone(slot);
            }
        }
        let mut slots = self.slots.write().unwrap_or_else(|e| e.into_inner());
        Arc::clone(slots.entry(id).or_default())
    }

    /// Has a build for `E` completed, successfully or not?
    pub fn contains<E: Entity>(&self) -> bool {
        let slots = self.slots.read().unwrap_or_else(|e| e.into_inner());
        slots
            .get(&TypeId::of::<E>())
            .is_some_and(|slot| slot.get().is_some())
    }

    /// Number of types requested so far.
    pub fn len(&self) -> usize {
        self.slots.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for DescriptorRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DescriptorRegistry")
            .field("types", &self.len())
            .finish()
    }
}
