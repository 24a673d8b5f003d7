//! Data categories that can be fully synced.

use crate::error::{SyncError, SyncResult};
use edgesync_codec::{DigestBuilder, Value};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// A category of local state (options, posts, users, ...).
///
/// Modules enumerate their state in chunks. The cursor is opaque to the
/// engine; only the module knows what it means.
pub trait SyncModule: Send + Sync {
    /// Stable module name.
    fn name(&self) -> &str;

    /// Short human-readable description.
    fn description(&self) -> &str {
        ""
    }

    /// Reads at most `limit` items starting at `cursor`.
    ///
    /// Returns the items and the cursor of the next chunk, or `None` once
    /// the module is exhausted. Enumeration must be deterministic for a
    /// given local state.
    fn read_chunk(&self, cursor: u64, limit: usize) -> SyncResult<(Vec<Value>, Option<u64>)>;
}

/// Name and description of a module.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleDescriptor {
    /// Module name.
    pub name: String,
    /// Description.
    pub description: String,
}

/// A module over a fixed list of items, enumerated by index.
#[derive(Debug, Clone)]
pub struct StaticModule {
    name: String,
    description: String,
    items: Vec<Value>,
}

impl StaticModule {
    /// Creates a module.
    pub fn new(name: impl Into<String>, items: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            items,
        }
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

impl SyncModule for StaticModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn read_chunk(&self, cursor: u64, limit: usize) -> SyncResult<(Vec<Value>, Option<u64>)> {
        let start = usize::try_from(cursor).unwrap_or(usize::MAX).min(self.items.len());
        let end = start.saturating_add(limit.max(1)).min(self.items.len());
        let next = (end < self.items.len()).then_some(end as u64);
        Ok((self.items[start..end].to_vec(), next))
    }
}

/// Registered modules, ordered by name.
#[derive(Clone, Default)]
pub struct ModuleRegistry {
    modules: BTreeMap<String, Arc<dyn SyncModule>>,
}

impl ModuleRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a module, replacing one with the same name.
    #[must_use]
    pub fn with_module(mut self, module: impl SyncModule + 'static) -> Self {
        self.register(Arc::new(module));
        self
    }

    /// Adds a module, replacing one with the same name.
    pub fn register(&mut self, module: Arc<dyn SyncModule>) {
        self.modules.insert(module.name().to_string(), module);
    }

    /// Looks a module up.
    pub fn get(&self, name: &str) -> Option<&Arc<dyn SyncModule>> {
        self.modules.get(name)
    }

    /// Looks a module up, failing with [`SyncError::UnknownModule`].
    pub fn require(&self, name: &str) -> SyncResult<&Arc<dyn SyncModule>> {
        self.get(name)
            .ok_or_else(|| SyncError::UnknownModule(name.to_string()))
    }

    /// Returns true if the module exists.
    pub fn contains(&self, name: &str) -> bool {
        self.modules.contains_key(name)
    }

    /// Module names in order.
    pub fn names(&self) -> Vec<String> {
        self.modules.keys().cloned().collect()
    }

    /// Modules in name order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn SyncModule>> {
        self.modules.values()
    }

    /// Descriptors in name order.
    pub fn descriptors(&self) -> Vec<ModuleDescriptor> {
        self.iter()
            .map(|m| ModuleDescriptor {
                name: m.name().to_string(),
                description: m.description().to_string(),
            })
            .collect()
    }

    /// Number of modules.
    pub fn len(&self) -> usize {
        self.modules.len()
    }

    /// Returns true if no module is registered.
    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }
}

impl std::fmt::Debug for ModuleRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list().entries(self.modules.keys()).finish()
    }
}

/// Digest over every item a module enumerates, with the item count.
pub fn module_digest(module: &dyn SyncModule, chunk_size: usize) -> SyncResult<(String, u64)> {
    let mut digest = DigestBuilder::new();
    let mut cursor = Some(0);
    while let Some(current) = cursor {
        let (items, next) = module.read_chunk(current, chunk_size)?;
        for item in &items {
            digest.update(item)?;
        }
        cursor = next;
    }
    let items = digest.items();
    Ok((digest.finish(), items))
}
