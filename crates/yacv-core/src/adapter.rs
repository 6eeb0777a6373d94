//! Shape adapters: normalizing producer objects into [`Geometry`].
//!
//! Producers hand the scene objects of arbitrary types (a part, a sketch, a
//! builder wrapping a part, ...). The [`AdapterRegistry`] holds an ordered
//! table of [`ShapeAdapter`] probes. Each probe either recognises the object
//! and returns its geometry, recognises a wrapper and returns the wrapped
//! object to probe again, or passes. The first matching probe wins; if none
//! matches, the object is rejected with [`SceneError::UnsupportedObject`].

use std::any::Any;
use std::fmt;
use std::marker::PhantomData;

use yacv_types::{Geometry, Placement, Shape};

use crate::error::SceneError;

/// How deep wrapper chains are followed before giving up.
const DEFAULT_MAX_UNWRAP_DEPTH: usize = 16;

/// Outcome of a successful probe.
pub enum Probe<'a> {
    /// The object was recognised and normalized.
    Geometry(Geometry),
    /// The object wraps another one that should be probed next.
    Unwrap(&'a dyn Any),
}

/// A single entry in the adapter table.
pub trait ShapeAdapter: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// Try to recognise `object`. Returns `None` to pass to the next probe.
    fn probe<'a>(&self, object: &'a dyn Any) -> Option<Probe<'a>>;
}

struct TypedAdapter<T, F> {
    name: &'static str,
    convert: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ShapeAdapter for TypedAdapter<T, F>
where
    T: Any,
    F: Fn(&T) -> Option<Geometry> + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn probe<'a>(&self, object: &'a dyn Any) -> Option<Probe<'a>> {
        object
            .downcast_ref::<T>()
            .and_then(|value| (self.convert)(value))
            .map(Probe::Geometry)
    }
}

struct UnwrapAdapter<T, F> {
    name: &'static str,
    unwrap: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ShapeAdapter for UnwrapAdapter<T, F>
where
    T: Any,
    F: (for<'a> Fn(&'a T) -> &'a dyn Any) + Send + Sync,
{
    fn name(&self) -> &str {
        self.name
    }

    fn probe<'a>(&self, object: &'a dyn Any) -> Option<Probe<'a>> {
        object
            .downcast_ref::<T>()
            .map(|value| Probe::Unwrap((self.unwrap)(value)))
    }
}

/// Ordered table of shape adapters.
pub struct AdapterRegistry {
    adapters: Vec<Box<dyn ShapeAdapter>>,
    max_unwrap_depth: usize,
}

impl AdapterRegistry {
    /// An empty registry that rejects everything.
    pub fn empty() -> Self {
        Self {
            adapters: Vec::new(),
            max_unwrap_depth: DEFAULT_MAX_UNWRAP_DEPTH,
        }
    }

    /// A registry that understands the canonical types: [`Geometry`],
    /// [`Placement`] (drawn as axes) and [`Shape`], in that order.
    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry
            .register_fn("geometry", |geometry: &Geometry| Some(geometry.clone()))
            .register_fn("placement", |placement: &Placement| {
                Some(Geometry::Location(*placement))
            })
            .register_fn("shape", |shape: &Shape| Some(Geometry::Shape(shape.clone())));
        registry
    }

    /// Limit how many wrappers are looked through.
    #[must_use]
    pub fn with_max_unwrap_depth(mut self, depth: usize) -> Self {
        self.max_unwrap_depth = depth;
        self
    }

    /// Append an adapter. Earlier adapters take priority.
    pub fn register(&mut self, adapter: Box<dyn ShapeAdapter>) -> &mut Self {
        self.adapters.push(adapter);
        self
    }

    /// Append an adapter for values of type `T`.
    pub fn register_fn<T, F>(&mut self, name: &'static str, convert: F) -> &mut Self
    where
        T: Any,
        F: Fn(&T) -> Option<Geometry> + Send + Sync + 'static,
    {
        self.register(Box::new(TypedAdapter {
            name,
            convert,
            _marker: PhantomData,
        }))
    }

    /// Append an adapter that looks through wrappers of type `T`.
    pub fn register_unwrap<T, F>(&mut self, name: &'static str, unwrap: F) -> &mut Self
    where
        T: Any,
        F: (for<'a> Fn(&'a T) -> &'a dyn Any) + Send + Sync + 'static,
    {
        self.register(Box::new(UnwrapAdapter {
            name,
            unwrap,
            _marker: PhantomData,
        }))
    }

    /// Names of the registered adapters, in probe order.
    pub fn names(&self) -> Vec<&str> {
        self.adapters.iter().map(|adapter| adapter.name()).collect()
    }

    /// Normalize `object` into geometry.
    ///
    /// `type_name` only feeds the error message.
    pub fn normalize(
        &self,
        object: &dyn Any,
        type_name: &'static str,
    ) -> Result<Geometry, SceneError> {
        let mut current = object;
        for _ in 0..=self.max_unwrap_depth {
            match self.adapters.iter().find_map(|adapter| adapter.probe(current)) {
                Some(Probe::Geometry(geometry)) => return Ok(geometry),
                Some(Probe::Unwrap(inner)) => current = inner,
                None => break,
            }
        }
        Err(SceneError::UnsupportedObject { type_name })
    }
}

impl Default for AdapterRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("adapters", &self.names())
            .field("max_unwrap_depth", &self.max_unwrap_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Part {
        shape: Shape,
    }

    struct Builder {
        part: Part,
    }

    /// A wrapper that claims to wrap itself.
    struct Mirror;

    fn part_registry() -> AdapterRegistry {
        let mut registry = AdapterRegistry::with_defaults();
        registry
            .register_unwrap("builder", |builder: &Builder| &builder.part as &dyn Any)
            .register_unwrap("part", |part: &Part| &part.shape as &dyn Any);
        registry
    }

    #[test]
    fn canonical_types_are_accepted() {
        let registry = AdapterRegistry::with_defaults();
        let placement = Placement::default();
        let geometry = registry
            .normalize(&placement, std::any::type_name::<Placement>())
            .unwrap();
        assert_eq!(geometry, Geometry::Location(placement));
        assert_eq!(registry.names(), vec!["geometry", "placement", "shape"]);
    }

    #[test]
    fn wrappers_are_followed() {
        let builder = Builder {
            part: Part {
                shape: Shape {
                    vertices: vec![[1.0, 2.0, 3.0]],
                    ..Shape::default()
                },
            },
        };
        let geometry = part_registry()
            .normalize(&builder, std::any::type_name::<Builder>())
            .unwrap();
        let Geometry::Shape(shape) = geometry else {
            panic!("expected a shape");
        };
        assert_eq!(shape.vertices, vec![[1.0, 2.0, 3.0]]);
    }

    #[test]
    fn first_matching_adapter_wins() {
        let mut registry = AdapterRegistry::empty();
        registry
            .register_fn("first", |_: &u8| {
                Some(Geometry::Location(Placement::default()))
            })
            .register_fn("second", |_: &u8| Some(Geometry::Shape(Shape::default())));
        let geometry = registry.normalize(&7_u8, "u8").unwrap();
        assert!(matches!(geometry, Geometry::Location(_)));
    }

    #[test]
    fn declining_adapter_passes_to_the_next() {
        let mut registry = AdapterRegistry::empty();
        registry
            .register_fn("declines", |_: &u8| None)
            .register_fn("accepts", |_: &u8| Some(Geometry::Shape(Shape::default())));
        assert!(registry.normalize(&7_u8, "u8").is_ok());
    }

    #[test]
    fn unknown_type_is_rejected() {
        let registry = AdapterRegistry::with_defaults();
        let err = registry.normalize(&42_u32, "u32").unwrap_err();
        assert!(matches!(
            err,
            SceneError::UnsupportedObject { type_name: "u32" }
        ));
    }

    #[test]
    fn endless_wrapper_chain_is_rejected() {
        let mut registry = AdapterRegistry::empty().with_max_unwrap_depth(4);
        registry.register_unwrap("mirror", |mirror: &Mirror| mirror as &dyn Any);
        let err = registry.normalize(&Mirror, "Mirror").unwrap_err();
        assert!(matches!(err, SceneError::UnsupportedObject { .. }));
    }

    #[test]
    fn registry_with_unwrap_adapters_is_shared_across_threads() {
        let registry = std::sync::Arc::new(part_registry());
        let worker = {
            let registry = std::sync::Arc::clone(&registry);
            std::thread::spawn(move || {
                let part = Part {
                    shape: Shape::default(),
                };
                registry
                    .normalize(&part, std::any::type_name::<Part>())
                    .is_ok()
            })
        };
        assert!(worker.join().unwrap());
        assert_eq!(registry.names().len(), 5);
    }
}
