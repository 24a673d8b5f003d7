//! Module-state API.
//!
//! Backs the settings page that toggles modules on and off. Activation is
//! stored in the state store under `module.<name>.active`; a module nobody
//! has toggled is active.
//!
//! An inactive module gets no checksum record and is skipped by a full sync
//! that names no modules. Naming it explicitly is an error.

use crate::error::{SyncError, SyncResult};
use crate::module::{ModuleDescriptor, ModuleRegistry};
use edgesync_store::StateStore;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;

/// A module and whether it is active.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModuleInfo {
    /// Name and description.
    #[serde(flatten)]
    pub descriptor: ModuleDescriptor,
    /// Whether the module is active.
    pub active: bool,
}

/// Reads and toggles module activation.
#[derive(Debug, Clone)]
pub struct Features {
    state: Arc<StateStore>,
    descriptors: BTreeMap<String, ModuleDescriptor>,
}

impl Features {
    /// Exposes the given modules.
    pub fn new(state: Arc<StateStore>, descriptors: Vec<ModuleDescriptor>) -> Self {
        let descriptors = descriptors
            .into_iter()
            .map(|d| (d.name.clone(), d))
            .collect();
        Self { state, descriptors }
    }

    /// Exposes the modules of `registry`.
    pub fn from_registry(state: Arc<StateStore>, registry: &ModuleRegistry) -> Self {
        Self::new(state, registry.descriptors())
    }

    /// Returns true unless the module was deactivated.
    pub fn is_module_activated(&self, name: &str) -> SyncResult<bool> {
        self.descriptor(name)?;
        Ok(self.state.get::<bool>(&activation_key(name))?.unwrap_or(true))
    }

    /// Activates a module.
    pub fn activate_module(&self, name: &str) -> SyncResult<()> {
        self.set_active(name, true)
    }

    /// Deactivates a module.
    pub fn deactivate_module(&self, name: &str) -> SyncResult<()> {
        self.set_active(name, false)
    }

    /// Describes one module.
    pub fn get_module(&self, name: &str) -> SyncResult<ModuleInfo> {
        let descriptor = self.descriptor(name)?.clone();
        let active = self.is_module_activated(name)?;
        Ok(ModuleInfo { descriptor, active })
    }

    /// Every module in name order.
    pub fn list_modules(&self) -> SyncResult<Vec<ModuleInfo>> {
        self.descriptors
            .keys()
            .map(|name| self.get_module(name))
            .collect()
    }

    fn descriptor(&self, name: &str) -> SyncResult<&ModuleDescriptor> {
        self.descriptors
            .get(name)
            .ok_or_else(|| SyncError::UnknownModule(name.to_string()))
    }

    fn set_active(&self, name: &str, active: bool) -> SyncResult<()> {
        self.descriptor(name)?;
        self.state.put(&activation_key(name), &active)?;
        tracing::info!(module = name, active, "module state changed");
        Ok(())
    }
}

fn activation_key(name: &str) -> String {
    format!("module.{name}.active")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::StaticModule;

    fn features() -> (Features, Arc<StateStore>) {
        let state = Arc::new(StateStore::in_memory().unwrap());
        let registry = ModuleRegistry::new()
            .with_module(StaticModule::new("posts", vec![]).with_description("Posts and pages"))
            .with_module(StaticModule::new("options", vec![]));
        (Features::from_registry(Arc::clone(&state), &registry), state)
    }

    #[test]
    fn modules_start_active() {
        let (features, _) = features();
        assert!(features.is_module_activated("posts").unwrap());

        let info = features.get_module("posts").unwrap();
        assert_eq!(info.descriptor.description, "Posts and pages");
        assert!(info.active);
    }

    #[test]
    fn toggling_is_persisted() {
        let (features, state) = features();
        features.deactivate_module("options").unwrap();
        assert!(!features.is_module_activated("options").unwrap());
        assert_eq!(state.get::<bool>("module.options.active").unwrap(), Some(false));

        features.activate_module("options").unwrap();
        assert!(features.is_module_activated("options").unwrap());
    }

    #[test]
    fn listing_is_ordered() {
        let (features, _) = features();
        features.deactivate_module("posts").unwrap();
        let modules = features.list_modules().unwrap();
        let summary: Vec<(&str, bool)> = modules
            .iter()
            .map(|m| (m.descriptor.name.as_str(), m.active))
            .collect();
        assert_eq!(summary, vec![("options", true), ("posts", false)]);
    }

    #[test]
    fn unknown_modules_are_errors() {
        let (features, _) = features();
        assert!(matches!(
            features.activate_module("themes"),
            Err(SyncError::UnknownModule(_))
        ));
        assert!(features.get_module("themes").is_err());
    }

    #[test]
    fn info_serializes_flat() {
        let (features, _) = features();
        let json = serde_json::to_value(features.get_module("options").unwrap()).unwrap();
        assert_eq!(json["name"], "options");
        assert_eq!(json["active"], true);
    }
}
