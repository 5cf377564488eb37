//! Module registry for the dispatch server.
//!
//! Provides a `ModuleRegistry` holding every subsystem module by name. This
//! uses constructor-injection rather than global state: the registry is
//! built at startup, populated via `register()`, and handed to the
//! `Dispatcher` by value. After that it is never modified.

use crate::error::RegistryError;
use growth_common::consts::CONTROLLER_TARGET;
use growth_common::module::DetectorModule;
use growth_common::protocol::{Options, Reply};
use std::collections::{HashMap, HashSet};
use tracing::info;

struct Entry {
    verbs: HashSet<&'static str>,
    module: Box<dyn DetectorModule>,
}

/// Registry of named subsystem modules.
pub struct ModuleRegistry {
    entries: HashMap<&'static str, Entry>,
    order: Vec<&'static str>,
}

impl ModuleRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Register a module under `name`.
    ///
    /// # Errors
    /// Returns `RegistryError::Duplicate` if `name` is already taken and
    /// `RegistryError::Reserved` for the controller's own name.
    pub fn register(
        &mut self,
        name: &'static str,
        module: Box<dyn DetectorModule>,
    ) -> Result<(), RegistryError> {
        if name == CONTROLLER_TARGET {
            return Err(RegistryError::Reserved(name.to_string()));
        }
        if self.entries.contains_key(name) {
            return Err(RegistryError::Duplicate(name.to_string()));
        }
        let verbs: HashSet<_> = module.verbs().into_iter().collect();
        info!("Module {} added ({} commands)", name, verbs.len());
        self.entries.insert(name, Entry { verbs, module });
        self.order.push(name);
        Ok(())
    }

    /// Look up a module by name.
    pub fn resolve(&self, name: &str) -> Option<&dyn DetectorModule> {
        self.entries.get(name).map(|entry| entry.module.as_ref())
    }

    /// True if module `name` serves `verb`.
    pub fn supports(&self, name: &str, verb: &str) -> bool {
        self.entries
            .get(name)
            .is_some_and(|entry| entry.verbs.contains(verb))
    }

    /// Registered module names, in registration order.
    pub fn list(&self) -> &[&'static str] {
        &self.order
    }

    /// Sorted verbs of a module.
    pub fn verbs(&self, name: &str) -> Option<Vec<&'static str>> {
        self.entries.get(name).map(|entry| {
            let mut verbs: Vec<_> = entry.verbs.iter().copied().collect();
            verbs.sort_unstable();
            verbs
        })
    }

    /// Invoke `name.verb`. `None` if the module or verb is not registered.
    pub fn invoke(&mut self, name: &str, verb: &str, options: &Options) -> Option<Reply> {
        let entry = self.entries.get_mut(name)?;
        if !entry.verbs.contains(verb) {
            return None;
        }
        entry.module.invoke(verb, options)
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::new()
    }
}
