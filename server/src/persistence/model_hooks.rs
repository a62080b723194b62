//! Hooks that run after a record update, whoever performed it.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::Arc;

use tournament::{Collection, Record};

use super::{PersistenceError, StoreTx};

/// A hook run on the saving transaction right after a record of its
/// collection was updated. An error aborts the save that triggered it.
pub trait AfterUpdateHook: Send + Sync {
    /// Short label for logs.
    fn name(&self) -> String;

    fn run<'a>(
        &'a self,
        tx: &'a mut StoreTx,
        record: &'a Record,
    ) -> BoxFuture<'a, Result<(), PersistenceError>>;
}

/// Registry of model hooks, built once at startup.
#[derive(Default)]
pub struct ModelHooks {
    after_update: HashMap<Collection, Vec<Arc<dyn AfterUpdateHook>>>,
}

impl ModelHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_after_update(&mut self, collection: Collection, hook: impl AfterUpdateHook + 'static) {
        tracing::debug!(%collection, hook = %hook.name(), "Registering after-update hook");
        self.after_update
            .entry(collection)
            .or_default()
            .push(Arc::new(hook));
    }

    pub fn after_update(&self, collection: Collection) -> &[Arc<dyn AfterUpdateHook>] {
        self.after_update
            .get(&collection)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.after_update.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
