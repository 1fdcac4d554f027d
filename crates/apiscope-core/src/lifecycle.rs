//! Disposal bookkeeping for long-lived model elements
//!
//! Modules and baselines hold open archives and cached structures. Once they
//! are disposed every further query must fail fast, and the failure must say
//! where the disposal happened so lifetime races can be tracked down.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::error::CoreError;

/// Where an element was disposed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisposalSite {
    pub location: &'static Location<'static>,
    pub thread: Option<String>,
}

impl DisposalSite {
    #[track_caller]
    pub fn capture() -> Self {
        Self {
            location: Location::caller(),
            thread: std::thread::current().name().map(str::to_string),
        }
    }
}

impl fmt::Display for DisposalSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "disposed at {}", self.location)?;
        if let Some(thread) = &self.thread {
            write!(f, " on thread '{}'", thread)?;
        }
        Ok(())
    }
}

/// Tracks whether an element has been disposed
#[derive(Debug, Default)]
pub struct DisposalState {
    site: Mutex<Option<DisposalSite>>,
}

impl DisposalState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks the element disposed. Returns `false` if it already was.
    #[track_caller]
    pub fn mark(&self) -> bool {
        let mut site = self.site.lock();
        if site.is_some() {
            return false;
        }
        *site = Some(DisposalSite::capture());
        true
    }

    pub fn is_disposed(&self) -> bool {
        self.site.lock().is_some()
    }

    pub fn site(&self) -> Option<DisposalSite> {
        self.site.lock().clone()
    }

    /// Fails with [`CoreError::Disposed`] once the element has been disposed
    pub fn check(&self, element: &str) -> Result<(), CoreError> {
        match self.site.lock().as_ref() {
            Some(site) => Err(CoreError::Disposed {
                element: element.to_string(),
                site: site.clone(),
            }),
            None => Ok(()),
        }
    }
}

/// A derived value computed once under a per-instance lock
///
/// Readers take the shared lock on the fast path. Initialization and
/// [`LazySlot::take`] run under the exclusive lock, so nobody observes a
/// half-cleared slot. A failed initialization stores nothing.
pub struct LazySlot<T> {
    value: RwLock<Option<Arc<T>>>,
}

impl<T> Default for LazySlot<T> {
    fn default() -> Self {
        Self {
            value: RwLock::new(None),
        }
    }
}

impl<T> LazySlot<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_try_init<E>(&self, init: impl FnOnce() -> Result<T, E>) -> Result<Arc<T>, E> {
        if let Some(value) = self.value.read().as_ref() {
            return Ok(value.clone());
        }
        let mut slot = self.value.write();
        if let Some(value) = slot.as_ref() {
            return Ok(value.clone());
        }
        let value = Arc::new(init()?);
        *slot = Some(value.clone());
        Ok(value)
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.read().clone()
    }

    pub fn is_initialized(&self) -> bool {
        self.value.read().is_some()
    }

    /// Clears the slot, returning what it held
    pub fn take(&self) -> Option<Arc<T>> {
        self.value.write().take()
    }
}

impl<T> fmt::Debug for LazySlot<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazySlot")
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
