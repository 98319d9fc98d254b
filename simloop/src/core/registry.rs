//! Append-only record of where completed tasks left their output.
//!
//! [`WorkingDirectoryRegistry`] is a plain value: readers hold a snapshot that
//! never changes. [`SharedRegistry`] owns the current snapshot and replaces it
//! whole when a phase barrier publishes, so readers never observe half a phase.

use std::collections::BTreeMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};
use percent_encoding::percent_decode_str;
use url::Url;

use crate::core::error::RegistryError;
use crate::core::types::{Coordinate, Phase};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkingDirectoryRegistry {
    entries: BTreeMap<Coordinate, String>,
}

impl WorkingDirectoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, coordinate: &Coordinate) -> Option<&str> {
        self.entries.get(coordinate).map(String::as_str)
    }

    pub fn contains(&self, coordinate: &Coordinate) -> bool {
        self.entries.contains_key(coordinate)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in coordinate order.
    pub fn iter(&self) -> impl Iterator<Item = (&Coordinate, &str)> {
        self.entries
            .iter()
            .map(|(coordinate, path)| (coordinate, path.as_str()))
    }

    /// Record one working directory. `location` may be a URI; only its path is kept.
    pub fn publish(&mut self, coordinate: Coordinate, location: &str) -> Result<(), RegistryError> {
        self.check_insertable(&coordinate)?;
        self.entries
            .insert(coordinate, working_dir_path(location));
        Ok(())
    }

    /// Copy of `self` with every instance of one phase added.
    ///
    /// Either the whole batch is accepted or `self` is returned unchanged.
    pub fn with_phase<I, S>(
        &self,
        iteration: u32,
        phase: Phase,
        locations: I,
    ) -> Result<Self, RegistryError>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: AsRef<str>,
    {
        let mut next = self.clone();
        for (instance, location) in locations {
            next.publish(Coordinate::task(iteration, phase, instance), location.as_ref())?;
        }
        Ok(next)
    }

    fn check_insertable(&self, coordinate: &Coordinate) -> Result<(), RegistryError> {
        if !coordinate.is_valid() {
            return Err(RegistryError::InvalidCoordinate(*coordinate));
        }
        if self.entries.contains_key(coordinate) {
            return Err(RegistryError::DuplicateEntry(*coordinate));
        }
        Ok(())
    }
}

/// Shared handle to the current registry snapshot.
///
/// Clones share the same registry.
#[derive(Debug, Clone, Default)]
pub struct SharedRegistry {
    current: Arc<RwLock<Arc<WorkingDirectoryRegistry>>>,
}

impl SharedRegistry {
    pub fn new(initial: WorkingDirectoryRegistry) -> Self {
        Self {
            current: Arc::new(RwLock::new(Arc::new(initial))),
        }
    }

    /// Current snapshot. Later publishes do not affect it.
    pub fn snapshot(&self) -> Arc<WorkingDirectoryRegistry> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard)
    }

    pub fn publish(&self, coordinate: Coordinate, location: &str) -> Result<(), RegistryError> {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let mut next = WorkingDirectoryRegistry::clone(&guard);
        next.publish(coordinate, location)?;
        *guard = Arc::new(next);
        Ok(())
    }

    /// Publish all instances of a phase as one atomic step.
    pub fn publish_phase<I, S>(
        &self,
        iteration: u32,
        phase: Phase,
        locations: I,
    ) -> Result<(), RegistryError>
    where
        I: IntoIterator<Item = (u32, S)>,
        S: AsRef<str>,
    {
        let mut guard = self.current.write().unwrap_or_else(PoisonError::into_inner);
        let next = guard.with_phase(iteration, phase, locations)?;
        *guard = Arc::new(next);
        Ok(())
    }
}

/// Extract the filesystem path from a backend-reported location.
///
/// Locations with a scheme (`file://host/path`, `sftp://host/path`) keep only
/// the decoded URI path; anything else is returned as given.
pub fn working_dir_path(location: &str) -> String {
    if !location.contains("://") {
        return location.to_string();
    }
    let Ok(url) = Url::parse(location) else {
        return location.to_string();
    };
    match percent_decode_str(url.path()).decode_utf8() {
        Ok(path) => path.into_owned(),
        Err(_) => location.to_string(),
    }
}
