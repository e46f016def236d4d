//! Declarative field configuration.
//!
//! A [`FieldConfig`] is a value: fields compare the incoming configuration
//! with the applied one and only re-run setup when they differ structurally.
//! Closures (handlers, transforms) and bound cells compare by identity, so
//! re-sending the same configuration object is always a no-op.
//!
//! Everything except closures and bound cells can be read from a JSON5 form
//! definition:
//!
//! ```json5
//! {
//!   label: "Size",
//!   value: 30,
//!   group: "pizza",
//!   validate: { allow_null: false },
//!   select: { options: [{ value: 25, text: "25 cm" }, { value: 30, text: "30 cm" }] },
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

use crate::field::options::SelectOption;
use crate::reactive::{structural_eq_via_partial_eq, Cell};
use crate::validation::{Mask, ValidationRule};
use crate::value::deep_equal;

/// Where the field's value comes from.
#[derive(Clone, Debug, Default)]
pub enum ValueSource {
    #[default]
    Unset,
    /// Initial value, applied only while the field's own value is unset.
    Literal(Value),
    /// External cell kept in sync with the field in both directions.
    Bound(Cell<Value>),
}

impl ValueSource {
    /// The value a field starts from; what "changed" is measured against.
    pub fn initial(&self) -> Value {
        match self {
            ValueSource::Unset => Value::Null,
            ValueSource::Literal(value) => value.clone(),
            ValueSource::Bound(cell) => cell.get(),
        }
    }

    pub fn literal(&self) -> Option<&Value> {
        match self {
            ValueSource::Literal(value) if !value.is_null() => Some(value),
            _ => None,
        }
    }
}

impl PartialEq for ValueSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (ValueSource::Unset, ValueSource::Unset) => true,
            (ValueSource::Literal(a), ValueSource::Literal(b)) => deep_equal(a, b),
            (ValueSource::Bound(a), ValueSource::Bound(b)) => a.same(b),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for ValueSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Value::deserialize(deserializer)? {
            Value::Null => ValueSource::Unset,
            value => ValueSource::Literal(value),
        })
    }
}

#[derive(Clone, Debug, Default)]
pub enum PlaceholderSource {
    #[default]
    None,
    Text(String),
    Bound(Cell<String>),
}

impl PlaceholderSource {
    pub fn current(&self) -> Option<String> {
        match self {
            PlaceholderSource::None => None,
            PlaceholderSource::Text(text) => Some(text.clone()),
            PlaceholderSource::Bound(cell) => Some(cell.get()),
        }
    }
}

impl PartialEq for PlaceholderSource {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (PlaceholderSource::None, PlaceholderSource::None) => true,
            (PlaceholderSource::Text(a), PlaceholderSource::Text(b)) => a == b,
            (PlaceholderSource::Bound(a), PlaceholderSource::Bound(b)) => a.same(b),
            _ => false,
        }
    }
}

impl<'de> Deserialize<'de> for PlaceholderSource {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Ok(match Option::<String>::deserialize(deserializer)? {
            Some(text) => PlaceholderSource::Text(text),
            None => PlaceholderSource::None,
        })
    }
}

/// Rewrites the edit buffer on every input event: `(text, cursor)` in,
/// `(text, cursor)` out. Cursor positions count characters.
#[derive(Clone)]
pub struct Transform(Arc<dyn Fn(&str, usize) -> (String, usize) + Send + Sync>);

impl Transform {
    pub fn new(f: impl Fn(&str, usize) -> (String, usize) + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn apply(&self, text: &str, cursor: usize) -> (String, usize) {
        (self.0)(text, cursor)
    }
}

impl PartialEq for Transform {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Transform")
    }
}

/// Suppress the generic validation triggers of a text input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct IgnoreValidate {
    pub on_change: bool,
    pub on_blur: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct TextOptions {
    /// Pattern every typed character must match.
    pub mask: Option<Mask>,
    pub upper_case: bool,
    /// Keep inner whitespace runs on change (edges are still trimmed).
    pub no_trim_inside: bool,
    /// Limit the input to the digit count of `validate.max`.
    pub limit_chars: bool,
    /// Validate and commit the value on every input event.
    pub on_input: bool,
    /// Select the whole text once the field is mounted.
    pub select_all: bool,
    pub ignore_validate: IgnoreValidate,
    pub input_mode: Option<String>,
    #[serde(skip)]
    pub transform: Option<Transform>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupTitles {
    #[default]
    Default,
    Separator,
    None,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct SelectOptions {
    pub options: Vec<SelectOption>,
    /// Live option list; takes precedence over `options`.
    #[serde(skip)]
    pub options_source: Option<Cell<Vec<SelectOption>>>,
    /// Option values shown until the user searches or the full list is
    /// revealed. An empty list shows everything but still counts as set.
    pub short_list: Option<Vec<Value>>,
    pub no_default_selection: bool,
    pub no_search: bool,
    pub not_found_text: Option<String>,
    /// Options are filtered by the host, local search always matches.
    pub async_search: bool,
    /// Label of the "add" button below the options.
    pub show_add_button: Option<String>,
    pub dropdown_max_width: Option<f64>,
    pub hide_dropdown: bool,
    pub group_titles: GroupTitles,
    pub option_class: Option<String>,
    pub translate_options: bool,
    pub translate_extra_options: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PhoneOptions {
    /// Country used to format numbers that do not resolve to one.
    pub default_country: Option<String>,
}

/// Per-field configuration.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FieldConfig {
    /// Defaults to the key of the field in the form.
    pub id: Option<String>,
    pub label: Option<String>,
    pub value: ValueSource,
    pub placeholder: PlaceholderSource,
    pub disabled: bool,
    pub readonly: bool,
    pub autofocus: bool,
    pub css_class: Option<String>,
    /// `Some("")` drops the default wrapper class.
    pub wrapper_class: Option<String>,
    pub input_class: Option<String>,
    pub css_styles: IndexMap<String, String>,
    pub validate: Option<ValidationRule>,
    pub hide_error_message: bool,
    /// Visual cluster the field is rendered in.
    pub group: Option<String>,
    /// Styles merged into the group container.
    pub group_style: IndexMap<String, String>,
    pub text: TextOptions,
    pub select: SelectOptions,
    pub phone: PhoneOptions,
}

structural_eq_via_partial_eq!(FieldConfig);

impl FieldConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn value(mut self, value: Value) -> Self {
        self.value = ValueSource::Literal(value);
        self
    }

    pub fn bind(mut self, cell: Cell<Value>) -> Self {
        self.value = ValueSource::Bound(cell);
        self
    }

    pub fn placeholder(mut self, text: impl Into<String>) -> Self {
        self.placeholder = PlaceholderSource::Text(text.into());
        self
    }

    pub fn validate(mut self, rule: ValidationRule) -> Self {
        self.validate = Some(rule);
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn group_style(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.group_style.insert(key.into(), value.into());
        self
    }

    pub fn options(mut self, options: Vec<SelectOption>) -> Self {
        self.select.options = options;
        self
    }

    pub fn allows_null(&self) -> bool {
        self.validate.as_ref().is_some_and(|rule| rule.allow_null)
    }
}
