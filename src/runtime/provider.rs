//! Resolution provider seam and the loading-name registry
//!
//! The provider is the external collaborator of the core: it hands out
//! already-loaded classes by name, caches newly parsed ones, is told about
//! inner-class linkage, and executes methods the core has no bytecode for.

use std::any::Any;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::classfile::class::{InnerClassRecord, JvmClass};
use crate::error::Result;
use crate::runtime::value::Value;

/// A resolved class: either one this crate parsed, or an opaque host-side
/// representation the provider manages itself
#[derive(Clone)]
pub enum ClassHandle {
    Vm(Arc<JvmClass>),
    Host(Arc<dyn Any + Send + Sync>),
}

impl ClassHandle {
    pub fn as_vm(&self) -> Option<&Arc<JvmClass>> {
        match self {
            ClassHandle::Vm(class) => Some(class),
            ClassHandle::Host(_) => None,
        }
    }
}

/// Names of classes currently mid-parse, scoped to one provider instance.
///
/// This is a cycle breaker, not a lock: inner-class and interface
/// resolution targeting a name in this set is skipped instead of recursed
/// into. Concurrent loads of the same name are not deduplicated here;
/// providers that need that guarantee serialize at their own layer.
#[derive(Debug, Default)]
pub struct LoadingNames {
    names: Mutex<HashSet<String>>,
}

impl LoadingNames {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.lock().expect("loading set poisoned").contains(name)
    }

    pub fn len(&self) -> usize {
        self.names.lock().expect("loading set poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Register a name for the duration of the returned guard; the name is
    /// removed again when the guard drops, on every exit path.
    pub fn guard(&self, name: String) -> LoadingGuard<'_> {
        self.names
            .lock()
            .expect("loading set poisoned")
            .insert(name.clone());
        LoadingGuard {
            registry: self,
            name,
        }
    }
}

/// Removes its name from the registry on drop
pub struct LoadingGuard<'a> {
    registry: &'a LoadingNames,
    name: String,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.registry
            .names
            .lock()
            .expect("loading set poisoned")
            .remove(&self.name);
    }
}

/// External resolution services consumed by the class model and the
/// interpreter
pub trait Provider: Send + Sync {
    /// Return a previously loaded or host-native class for a jvm formatted
    /// name; `None` when the provider knows nothing about it. May itself
    /// trigger a lazy load.
    fn resolve_class(&self, class_name: &str) -> Result<Option<ClassHandle>>;

    /// Notification about a discovered inner-class linkage. Called only
    /// once the inner class itself is not mid-load.
    fn resolve_inner_class(&self, _outer: &JvmClass, _record: &InnerClassRecord) -> Result<()> {
        Ok(())
    }

    /// Announce a newly completed class for process-wide caching
    fn register_external_class(&self, class_name: &str, class: Arc<JvmClass>) -> Result<()>;

    /// Execute a method body the core has no bytecode for. The result
    /// becomes the call's return value (`None` for void).
    fn invoke_native(
        &self,
        class_name: &str,
        receiver: Option<&Value>,
        method_name: &str,
        method_signature: &str,
        args: &[Value],
    ) -> Result<Option<Value>>;

    /// The registry of names currently mid-parse for this provider
    fn loading(&self) -> &LoadingNames;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn guard_removes_name_on_drop() {
        let registry = LoadingNames::new();
        {
            let _guard = registry.guard("com/demo/A".to_string());
            assert!(registry.contains("com/demo/A"));
            assert_eq!(registry.len(), 1);
        }
        assert!(!registry.contains("com/demo/A"));
        assert!(registry.is_empty());
    }
}
