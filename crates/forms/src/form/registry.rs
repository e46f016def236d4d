//! Field kinds by tag.
//!
//! Form definitions name their fields by kind (`"text"`, `"select"`, ...);
//! the registry turns the tag into a fresh controller.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::errors::FormError;
use crate::field::{DeviceField, Field, FieldContext, MultiselectField, PhoneField, SelectField, TextField};

pub type FieldFactory = Arc<dyn Fn(FieldContext) -> Arc<dyn Field> + Send + Sync>;

#[derive(Clone)]
pub struct FieldRegistry {
    factories: IndexMap<String, FieldFactory>,
}

impl FieldRegistry {
    /// Registry without any kinds.
    pub fn empty() -> Self {
        Self {
            factories: IndexMap::new(),
        }
    }

    /// Registry with the built-in kinds.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(TextField::KIND, |ctx| Arc::new(TextField::new(ctx)));
        registry.register(SelectField::KIND, |ctx| Arc::new(SelectField::new(ctx)));
        registry.register(MultiselectField::KIND, |ctx| Arc::new(MultiselectField::new(ctx)));
        registry.register(PhoneField::KIND, |ctx| Arc::new(PhoneField::new(ctx)));
        registry.register(DeviceField::KIND, |ctx| Arc::new(DeviceField::new(ctx)));
        registry
    }

    /// Add or replace a kind.
    pub fn register(
        &mut self,
        kind: impl Into<String>,
        factory: impl Fn(FieldContext) -> Arc<dyn Field> + Send + Sync + 'static,
    ) -> &mut Self {
        self.factories.insert(kind.into(), Arc::new(factory));
        self
    }

    pub fn contains(&self, kind: &str) -> bool {
        self.factories.contains_key(kind)
    }

    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, kind: &str, ctx: FieldContext) -> Result<Arc<dyn Field>, FormError> {
        let factory = self
            .factories
            .get(kind)
            .ok_or_else(|| FormError::UnknownFieldKind(kind.to_string()))?;
        Ok(factory(ctx))
    }
}

impl Default for FieldRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl fmt::Debug for FieldRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
