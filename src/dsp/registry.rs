//! Module registry for instantiating sequencer modules by ID.
//!
//! The registry is the catalog a host uses to list the available module
//! types and to create instances when a patch or preset is loaded.

use std::collections::HashMap;

use super::module_trait::{DspModule, ModuleInfo};
use crate::modules::{BigButtonSeq, Clocked, MultiTrackSeq, PhraseSeq16, PhraseSeq32};

/// Factory function type for creating module instances.
pub type ModuleFactory = fn() -> Box<dyn DspModule>;

/// Catalog of available module types.
pub struct ModuleRegistry {
    /// Map of module ID to factory function.
    factories: HashMap<&'static str, ModuleFactory>,
    /// Module information in registration order.
    infos: Vec<ModuleInfo>,
}

impl ModuleRegistry {
    /// Creates a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
            infos: Vec::new(),
        }
    }

    /// Registers a module type.
    ///
    /// A temporary instance is created to read the module's info. Returns
    /// false (and leaves the registry unchanged) if the ID is already taken.
    pub fn register<M: DspModule + Default + 'static>(&mut self) -> bool {
        let temp = M::default();
        let info = temp.info().clone();
        if self.factories.contains_key(info.id) {
            return false;
        }
        self.factories.insert(info.id, create_module::<M>);
        self.infos.push(info);
        true
    }

    /// Creates a new instance of the module registered under `id`.
    pub fn create(&self, id: &str) -> Option<Box<dyn DspModule>> {
        self.factories.get(id).map(|factory| factory())
    }

    /// Returns all registered module types, in registration order.
    pub fn list_modules(&self) -> &[ModuleInfo] {
        &self.infos
    }

    /// Returns the number of registered modules.
    pub fn len(&self) -> usize {
        self.factories.len()
    }

    /// Returns true if no modules are registered.
    pub fn is_empty(&self) -> bool {
        self.factories.is_empty()
    }

    /// Checks if a module with the given ID is registered.
    pub fn contains(&self, id: &str) -> bool {
        self.factories.contains_key(id)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn create_module<M: DspModule + Default + 'static>() -> Box<dyn DspModule> {
    Box::new(M::default())
}

/// Creates a registry holding every built-in module.
pub fn create_module_registry() -> ModuleRegistry {
    let mut registry = ModuleRegistry::new();
    registry.register::<MultiTrackSeq>();
    registry.register::<PhraseSeq16>();
    registry.register::<PhraseSeq32>();
    registry.register::<BigButtonSeq>();
    registry.register::<Clocked>();
    registry
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_registry() {
        let registry = ModuleRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.create("seq.phrase16").is_none());
    }

    #[test]
    fn test_builtin_registry() {
        let registry = create_module_registry();
        assert_eq!(registry.len(), 5);
        for id in [
            "seq.multitrack",
            "seq.phrase16",
            "seq.phrase32",
            "seq.bigbutton",
            "clk.clocked",
        ] {
            assert!(registry.contains(id), "missing {}", id);
            let module = registry.create(id).expect("registered module");
            assert_eq!(module.info().id, id);
        }
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ModuleRegistry::new();
        assert!(registry.register::<Clocked>());
        assert!(!registry.register::<Clocked>());
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.list_modules().len(), 1);
    }

    #[test]
    fn test_list_preserves_order() {
        let registry = create_module_registry();
        let ids: Vec<_> = registry.list_modules().iter().map(|i| i.id).collect();
        assert_eq!(ids[0], "seq.multitrack");
        assert_eq!(ids[4], "clk.clocked");
    }
}
