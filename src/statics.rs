use std::collections::HashMap;

use crate::entity::EntityMap;

/// A type that declares translations up front instead of through call sites
pub trait ProvidesTranslations {
    fn provide_entities(&self) -> EntityMap;
}

impl<F> ProvidesTranslations for F
where
    F: Fn() -> EntityMap,
{
    fn provide_entities(&self) -> EntityMap {
        self()
    }
}

/// Static translation sources, grouped by the module that owns them
#[derive(Default)]
pub struct StaticsRegistry {
    providers: HashMap<String, Vec<Box<dyn ProvidesTranslations>>>,
}

impl StaticsRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        module: impl Into<String>,
        provider: impl ProvidesTranslations + 'static,
    ) {
        self.providers
            .entry(module.into())
            .or_default()
            .push(Box::new(provider));
    }

    /// Entities from every provider of `module`, in registration order.
    /// Returns the merged map and how many keys a later provider overwrote.
    pub fn collect(&self, module: &str) -> (EntityMap, usize) {
        let mut entities = EntityMap::new();
        let mut overwritten = 0;
        for provider in self.providers.get(module).into_iter().flatten() {
            overwritten += entities.merge(provider.provide_entities());
        }
        (entities, overwritten)
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl std::fmt::Debug for StaticsRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<&str, usize> = self
            .providers
            .iter()
            .map(|(module, providers)| (module.as_str(), providers.len()))
            .collect();
        f.debug_struct("StaticsRegistry")
            .field("providers", &counts)
            .finish()
    }
}
