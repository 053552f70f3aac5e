use crate::errors::{CoreError, CoreResult};
use parking_lot::Mutex;
use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

type AnyArc = Arc<dyn Any + Send + Sync>;
type Factory = Arc<dyn Fn(&Container) -> AnyArc + Send + Sync>;

enum Binding {
    /// New instance on every resolution
    Transient(Factory),
    /// Built on first resolution, then shared
    Singleton {
        factory: Factory,
        instance: Mutex<Option<AnyArc>>,
    },
    Instance(AnyArc),
}

/// Type-keyed service registry
#[derive(Default)]
pub struct Container {
    bindings: HashMap<TypeId, (&'static str, Binding)>,
    aliases: HashMap<String, TypeId>,
}

impl std::fmt::Debug for Container {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut services: Vec<&str> = self.bindings.values().map(|(name, _)| *name).collect();
        services.sort_unstable();
        f.debug_struct("Container")
            .field("services", &services)
            .field("aliases", &self.aliases.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl Container {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a factory that runs on every `make`
    pub fn bind<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |c| Arc::new(factory(c)) as AnyArc);
        self.insert::<T>(Binding::Transient(factory));
    }

    /// Register a factory whose result is built once and shared
    pub fn singleton<T, F>(&mut self, factory: F)
    where
        T: Send + Sync + 'static,
        F: Fn(&Container) -> T + Send + Sync + 'static,
    {
        let factory: Factory = Arc::new(move |c| Arc::new(factory(c)) as AnyArc);
        self.insert::<T>(Binding::Singleton {
            factory,
            instance: Mutex::new(None),
        });
    }

    /// Register an already built instance
    pub fn instance<T: Send + Sync + 'static>(&mut self, instance: Arc<T>) {
        self.insert::<T>(Binding::Instance(instance));
    }

    fn insert<T: 'static>(&mut self, binding: Binding) {
        tracing::trace!(service = type_name::<T>(), "binding service");
        self.bindings
            .insert(TypeId::of::<T>(), (type_name::<T>(), binding));
    }

    pub fn make<T: Send + Sync + 'static>(&self) -> CoreResult<Arc<T>> {
        self.resolve(TypeId::of::<T>(), type_name::<T>())?
            .downcast::<T>()
            .map_err(|_| CoreError::ServiceTypeMismatch {
                service_type: type_name::<T>().to_string(),
            })
    }

    /// Resolve through a string alias
    pub fn make_named<T: Send + Sync + 'static>(&self, name: &str) -> CoreResult<Arc<T>> {
        let type_id = self
            .aliases
            .get(name)
            .copied()
            .ok_or_else(|| CoreError::service_not_found(name))?;
        self.resolve(type_id, name)?
            .downcast::<T>()
            .map_err(|_| CoreError::ServiceTypeMismatch {
                service_type: name.to_string(),
            })
    }

    fn resolve(&self, type_id: TypeId, name: &str) -> CoreResult<AnyArc> {
        let (_, binding) = self
            .bindings
            .get(&type_id)
            .ok_or_else(|| CoreError::service_not_found(name))?;

        Ok(match binding {
            Binding::Transient(factory) => factory(self),
            Binding::Instance(instance) => instance.clone(),
            Binding::Singleton { factory, instance } => {
                if let Some(existing) = instance.lock().as_ref() {
                    return Ok(existing.clone());
                }
                // Build outside the lock so the factory may resolve other services
                let built = factory(self);
                instance.lock().get_or_insert(built).clone()
            }
        })
    }

    pub fn bound<T: 'static>(&self) -> bool {
        self.bindings.contains_key(&TypeId::of::<T>())
    }

    pub fn alias(&mut self, name: impl Into<String>, type_id: TypeId) {
        self.aliases.insert(name.into(), type_id);
    }

    /// Alias a registered type by name
    pub fn alias_type<T: 'static>(&mut self, name: impl Into<String>) {
        self.alias(name, TypeId::of::<T>());
    }

    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }

    /// Drop every binding and alias
    pub fn flush(&mut self) {
        self.bindings.clear();
        self.aliases.clear();
    }
}
