//! Atomically replaceable read-mostly state.
//!
//! Readers take an `Arc` to the current value and keep using it for the
//! whole evaluation; a writer swaps in a complete new value. A reader
//! therefore sees either the old value or the new one, never a mix.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::ConfigSnapshot;
use crate::personality::PersonalityRegistry;

/// A cloneable handle to a value that can be swapped in one step.
#[derive(Debug)]
pub struct Shared<T> {
    inner: Arc<RwLock<Arc<T>>>,
}

impl<T> Shared<T> {
    /// Wrap an initial value.
    #[must_use]
    pub fn new(value: T) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(value))),
        }
    }

    /// The current value.
    #[must_use]
    pub fn load(&self) -> Arc<T> {
        Arc::clone(&self.inner.read())
    }

    /// Replace the value, returning the previous one.
    pub fn store(&self, value: T) -> Arc<T> {
        let mut guard = self.inner.write();
        std::mem::replace(&mut *guard, Arc::new(value))
    }
}

impl<T> Clone for Shared<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Shared handle to the active configuration.
pub type SharedConfig = Shared<ConfigSnapshot>;

/// Shared handle to the active personality table.
pub type SharedPersonalities = Shared<PersonalityRegistry>;
