//! Field controllers.
//!
//! Every kind implements [`Field`] on top of a shared [`FieldCore`]; the
//! defaults of the trait are the generic behavior, kinds override what they
//! do differently (a select validates on blur and snaps back on clear, a
//! phone field runs its own country-aware check, ...).

use std::any::Any;
use std::fmt;
use std::sync::Arc;

use countries::CountryLookup;
use indexmap::IndexMap;
use serde_json::Value;

use crate::config::FieldConfig;
use crate::reactive::Emitter;
use crate::schedule::{Scheduler, Timing};

mod core;
pub mod device;
pub mod multiselect;
pub mod options;
pub mod phone;
pub mod select;
pub mod text;

pub use self::core::FieldCore;
pub use device::{Device, DeviceCatalog, DeviceField, DeviceKind};
pub use multiselect::MultiselectField;
pub use options::{IdPolicy, SelectOption};
pub use phone::PhoneField;
pub use select::SelectField;
pub use text::{KeyVerdict, TextField};

/// What a field reports to its owner after a user-driven change.
#[derive(Clone, Debug, PartialEq)]
pub enum FieldChange {
    Value(Value),
    /// Select-like fields report which control changed.
    Select { select_id: String, new_value: Value },
}

impl FieldChange {
    pub fn new_value(&self) -> &Value {
        match self {
            FieldChange::Value(value) => value,
            FieldChange::Select { new_value, .. } => new_value,
        }
    }
}

/// Maps translation keys (option texts, extra options) to display text.
pub trait Translator: Send + Sync {
    fn translate(&self, key: &str) -> String;
}

/// Shows keys as they are.
#[derive(Clone, Copy, Debug, Default)]
pub struct Untranslated;

impl Translator for Untranslated {
    fn translate(&self, key: &str) -> String {
        key.to_string()
    }
}

/// Fixed key table; unknown keys fall through unchanged.
impl Translator for IndexMap<String, String> {
    fn translate(&self, key: &str) -> String {
        self.get(key).cloned().unwrap_or_else(|| key.to_string())
    }
}

/// Services a field is constructed with.
#[derive(Clone)]
pub struct FieldContext {
    pub scheduler: Arc<dyn Scheduler>,
    pub timing: Timing,
    pub countries: Arc<dyn CountryLookup>,
    pub devices: Arc<DeviceCatalog>,
    pub translator: Arc<dyn Translator>,
}

impl FieldContext {
    pub fn new(scheduler: Arc<dyn Scheduler>, countries: Arc<dyn CountryLookup>) -> Self {
        Self {
            scheduler,
            timing: Timing::default(),
            countries,
            devices: Arc::new(DeviceCatalog::default()),
            translator: Arc::new(Untranslated),
        }
    }

    pub fn with_timing(mut self, timing: Timing) -> Self {
        self.timing = timing;
        self
    }

    pub fn with_devices(mut self, devices: Arc<DeviceCatalog>) -> Self {
        self.devices = devices;
        self
    }

    pub fn with_translator(mut self, translator: Arc<dyn Translator>) -> Self {
        self.translator = translator;
        self
    }
}

impl fmt::Debug for FieldContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldContext")
            .field("timing", &self.timing)
            .field("locale", &self.countries.locale())
            .field("devices", &self.devices.len())
            .finish()
    }
}

/// A form field controller.
pub trait Field: Send + Sync + 'static {
    fn core(&self) -> &FieldCore;

    fn as_any(&self) -> &dyn Any;

    fn kind(&self) -> &'static str {
        self.core().kind()
    }

    /// Apply a configuration; `false` when nothing changed.
    fn set_configuration(&self, config: FieldConfig) -> bool {
        self.core().set_configuration(config)
    }

    fn mount(&self) {
        self.core().mount();
    }

    fn value(&self) -> Value {
        self.core().value().get()
    }

    /// Programmatic write; no validation and no change event.
    fn set_value(&self, value: Value) {
        self.core().set_value(value);
    }

    fn validate(&self, value: &Value, emit_error: bool) -> bool {
        self.core().validate(value, emit_error)
    }

    fn validate_current(&self, emit_error: bool) -> bool {
        let value = self.value();
        self.validate(&value, emit_error)
    }

    fn error(&self) -> Option<String> {
        self.core().error().get()
    }

    fn changes(&self) -> &Emitter<FieldChange> {
        self.core().changes()
    }

    /// What [`Field::value`] is compared against to tell whether the user
    /// changed anything.
    fn initial_value(&self) -> Value {
        self.core().with_config(|c| c.value.initial())
    }

    fn focus(&self) {
        self.core().focus();
    }

    fn blur(&self) {
        self.core().blur();
        self.validate_current(true);
    }

    fn teardown(&self) {
        self.core().teardown();
    }
}

impl fmt::Debug for dyn Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Field")
            .field("kind", &self.kind())
            .field("id", &self.core().id())
            .field("value", &self.value())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::schedule::ManualScheduler;
    use countries::CountryDictionary;

    pub(crate) fn context() -> (FieldContext, ManualScheduler) {
        let scheduler = ManualScheduler::new();
        let countries = CountryDictionary::bundled("ru-RU").expect("bundled countries");
        let ctx = FieldContext::new(Arc::new(scheduler.clone()), Arc::new(countries));
        (ctx, scheduler)
    }

    #[test]
    fn translation_table_falls_through() {
        let mut table = IndexMap::new();
        table.insert("options.any".to_string(), "Any".to_string());
        assert_eq!(table.translate("options.any"), "Any");
        assert_eq!(table.translate("options.none"), "options.none");
        assert_eq!(Untranslated.translate("x"), "x");
    }

    #[test]
    fn change_exposes_new_value() {
        let change = FieldChange::Select {
            select_id: "size".into(),
            new_value: Value::from(30),
        };
        assert_eq!(change.new_value(), &Value::from(30));
    }
}
