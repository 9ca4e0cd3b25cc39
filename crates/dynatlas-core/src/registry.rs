use crate::atlas::Atlas;
use crate::surface::{MemorySurface, SurfaceProvider};
use std::collections::BTreeMap;

/// Named atlases owned by the application.
///
/// There is no process-wide instance; create one where atlases are composed and pass it
/// to whatever needs to look atlases up by name.
pub struct AtlasRegistry<S: SurfaceProvider = MemorySurface> {
    atlases: BTreeMap<String, Atlas<S>>,
}

impl<S: SurfaceProvider> Default for AtlasRegistry<S> {
    fn default() -> Self {
        Self {
            atlases: BTreeMap::new(),
        }
    }
}

impl<S: SurfaceProvider> AtlasRegistry<S> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `atlas` under `name`, returning the atlas previously registered there.
    pub fn insert(&mut self, name: impl Into<String>, atlas: Atlas<S>) -> Option<Atlas<S>> {
        self.atlases.insert(name.into(), atlas)
    }

    pub fn get(&self, name: &str) -> Option<&Atlas<S>> {
        self.atlases.get(name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut Atlas<S>> {
        self.atlases.get_mut(name)
    }

    pub fn remove(&mut self, name: &str) -> Option<Atlas<S>> {
        self.atlases.remove(name)
    }

    /// Registered names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.atlases.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Atlas<S>)> + '_ {
        self.atlases.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.atlases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atlases.is_empty()
    }
}
