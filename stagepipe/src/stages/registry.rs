//! Stage registry: resolves stage names to fresh stage instances.

use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

use super::{builtin, FnStage, Stage};
use crate::context::StageContext;
use crate::errors::{ExecutionError, MultiplicityError, PypeError, UnknownStageError};
use crate::members::MemberDescriptor;

/// A zero-argument stage constructor.
pub type StageFactory = Arc<dyn Fn() -> Box<dyn Stage> + Send + Sync>;

/// Registry of stage factories by name.
///
/// A name may be registered more than once; resolving such a name is an
/// error, so ambiguity is reported instead of silently picking one.
#[derive(Default)]
pub struct StageRegistry {
    factories: RwLock<HashMap<String, Vec<StageFactory>>>,
}

impl StageRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a registry holding the built-in stages.
    #[must_use]
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        builtin::register_builtins(&registry);
        registry
    }

    /// Registers a factory under `name`.
    pub fn register<F>(&self, name: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Stage> + Send + Sync + 'static,
    {
        let name = name.into();
        debug!(stage = %name, "Registering stage");
        self.factories
            .write()
            .entry(name)
            .or_default()
            .push(Arc::new(factory));
    }

    /// Registers a closure-backed stage.
    pub fn register_fn<F>(
        &self,
        name: impl Into<String>,
        inputs: Vec<MemberDescriptor>,
        outputs: Vec<MemberDescriptor>,
        func: F,
    ) where
        F: Fn(&mut StageContext<'_>) -> Result<(), ExecutionError> + Send + Sync + 'static,
    {
        let name = name.into();
        let stage = FnStage::new(name.clone(), inputs, outputs, func);
        self.register(name, move || Box::new(stage.clone()));
    }

    /// Creates a fresh instance of the stage registered as `name`.
    pub fn resolve(&self, name: &str) -> Result<Box<dyn Stage>, PypeError> {
        let factory = {
            let factories = self.factories.read();
            match factories.get(name).map(Vec::as_slice) {
                None | Some([]) => return Err(UnknownStageError::new(name).into()),
                Some([factory]) => Arc::clone(factory),
                Some(candidates) => {
                    return Err(MultiplicityError::new(name, candidates.len()).into())
                }
            }
        };
        Ok(factory())
    }

    /// Returns true if `name` has at least one candidate.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.factories
            .read()
            .get(name)
            .is_some_and(|candidates| !candidates.is_empty())
    }

    /// Number of candidates registered under `name`.
    #[must_use]
    pub fn candidates(&self, name: &str) -> usize {
        self.factories.read().get(name).map_or(0, Vec::len)
    }

    /// Registered names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.factories.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of registered names.
    #[must_use]
    pub fn len(&self) -> usize {
        self.factories.read().len()
    }

    /// Returns true if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.factories.read().is_empty()
    }
}

impl std::fmt::Debug for StageRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageRegistry")
            .field("stages", &self.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::members::TypeTag;

    fn noop(registry: &StageRegistry, name: &str) {
        registry.register_fn(
            name,
            vec![MemberDescriptor::new("Value", "value", TypeTag::Int)],
            vec![],
            |_| Ok(()),
        );
    }

    #[test]
    fn test_resolve_registered_stage() {
        let registry = StageRegistry::new();
        noop(&registry, "stageA");

        let stage = registry.resolve("stageA").unwrap();
        assert_eq!(stage.name(), "stageA");
        assert!(registry.contains("stageA"));
    }

    #[test]
    fn test_resolve_unknown_stage() {
        let registry = StageRegistry::new();
        let err = registry.resolve("nosuchstage").unwrap_err();
        assert!(matches!(err, PypeError::UnknownStage(ref e) if e.name == "nosuchstage"));
    }

    #[test]
    fn test_duplicate_registration_is_ambiguous() {
        let registry = StageRegistry::new();
        noop(&registry, "stageA");
        noop(&registry, "stageA");

        assert_eq!(registry.candidates("stageA"), 2);
        let err = registry.resolve("stageA").unwrap_err();
        assert!(matches!(err, PypeError::Multiplicity(ref e) if e.candidates == 2));
    }

    #[test]
    fn test_names_sorted() {
        let registry = StageRegistry::new();
        noop(&registry, "zeta");
        noop(&registry, "alpha");

        assert_eq!(registry.names(), vec!["alpha", "zeta"]);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_builtins_registered() {
        let registry = StageRegistry::with_builtins();
        for name in ["echo", "textreader", "textstats", "textwriter"] {
            assert!(registry.contains(name), "missing {name}");
        }
    }

    #[test]
    fn test_each_resolve_creates_fresh_instance() {
        let registry = StageRegistry::with_builtins();
        let first = registry.resolve("echo").unwrap();
        let second = registry.resolve("echo").unwrap();
        assert_eq!(first.name(), second.name());
    }
}
