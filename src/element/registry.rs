//! Element builder registry

use super::{BuildContext, Element, ElementBuilder, GenericBuilder, PlaceBuilder};
use crate::error::ExtractionError;
use crate::geo::GeometryRecord;
use crate::style::AttributeSet;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tracing::info;

/// Builders keyed by the name `builder: <name>` declarations refer to
///
/// Lookups happen per match during extraction, so registration may happen
/// at any time and concurrent extractions share the registry.
#[derive(Default)]
pub struct ElementBuilderRegistry {
    builders: RwLock<HashMap<String, Arc<dyn ElementBuilder>>>,
}

impl ElementBuilderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `builder` under `name`, replacing any previous one
    pub fn register(&self, name: impl Into<String>, builder: Arc<dyn ElementBuilder>) {
        let name = name.into();
        info!(builder = %name, "Registering element builder");
        self.builders
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, builder);
    }

    /// Register a built-in builder by name: `place` gets the place builder,
    /// anything else a pass-through builder
    pub fn register_named(&self, name: &str) {
        let builder: Arc<dyn ElementBuilder> = match name {
            PlaceBuilder::NAME => Arc::new(PlaceBuilder),
            other => Arc::new(GenericBuilder::new(other)),
        };
        self.register(name, builder);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn ElementBuilder>> {
        self.builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .builders
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.builders.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up `name` and build; a missing builder is reported, not fatal
    pub fn build(
        &self,
        name: &str,
        record: &GeometryRecord,
        style: &AttributeSet,
        ctx: &BuildContext<'_>,
    ) -> Result<Option<Element>, ExtractionError> {
        let builder = self.get(name).ok_or_else(|| ExtractionError::BuilderNotFound {
            name: name.to_string(),
        })?;
        builder
            .build(record, style, ctx)
            .map_err(|source| ExtractionError::Element {
                id: ctx.record_id,
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::elevation::FlatElevation;
    use crate::error::ElementError;
    use crate::geo::{Geometry, Point, QuadKey, TagSet};

    struct Failing;

    impl ElementBuilder for Failing {
        fn build(
            &self,
            _record: &GeometryRecord,
            _style: &AttributeSet,
            _ctx: &BuildContext<'_>,
        ) -> Result<Option<Element>, ElementError> {
            Err(ElementError::Unsupported {
                builder: "failing".into(),
                reason: "always".into(),
            })
        }
    }

    fn ctx() -> BuildContext<'static> {
        BuildContext {
            record_id: 5,
            quadkey: QuadKey::new(0, 0, 0).unwrap(),
            elevation: &FlatElevation,
        }
    }

    fn point() -> GeometryRecord {
        GeometryRecord::new(Some(5), TagSet::new(), Geometry::Point(Point::new(1.0, 1.0)))
    }

    #[test]
    fn test_register_named_and_build() {
        let registry = ElementBuilderRegistry::new();
        registry.register_named("place");
        registry.register_named("poi");
        assert_eq!(registry.names(), vec!["place", "poi"]);

        let element = registry.build("place", &point(), &AttributeSet::new(), &ctx()).unwrap().unwrap();
        assert_eq!(element.style, vec!["builder=place"]);
        let element = registry.build("poi", &point(), &AttributeSet::new(), &ctx()).unwrap().unwrap();
        assert_eq!(element.style, vec!["builder=poi"]);
    }

    #[test]
    fn test_missing_builder() {
        let registry = ElementBuilderRegistry::new();
        let err = registry.build("place", &point(), &AttributeSet::new(), &ctx()).unwrap_err();
        assert!(matches!(err, ExtractionError::BuilderNotFound { ref name } if name == "place"));
        assert!(!err.is_structural());
    }

    #[test]
    fn test_builder_failure_carries_record_id() {
        let registry = ElementBuilderRegistry::new();
        registry.register("failing", Arc::new(Failing));
        let err = registry.build("failing", &point(), &AttributeSet::new(), &ctx()).unwrap_err();
        assert!(matches!(err, ExtractionError::Element { id: 5, .. }));
    }

    #[test]
    fn test_re_registration_replaces() {
        let registry = ElementBuilderRegistry::new();
        registry.register("place", Arc::new(Failing));
        registry.register_named("place");
        assert_eq!(registry.len(), 1);
        assert!(registry.build("place", &point(), &AttributeSet::new(), &ctx()).is_ok());
    }
}
