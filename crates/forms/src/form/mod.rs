//! Form orchestration: one field controller per item, change forwarding,
//! grouping and aggregate operations.
//!
//! ```ignore
//! let mut form = Form::new(ctx);
//! form.set_items(items)?;
//! let _sub = form.changes().subscribe(|c| println!("{} = {}", c.key, c.new_value));
//! if form.is_valid() {
//!     submit(form.get_values());
//! } else {
//!     show(form.validate_all());
//! }
//! ```

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::FieldConfig;
use crate::errors::FormError;
use crate::field::{Field, FieldContext};
use crate::reactive::{Emitter, Subscription};
use crate::value::deep_equal;

mod registry;
mod schema;

pub use registry::{FieldFactory, FieldRegistry};
pub use schema::FormSchema;

/// One entry of a form definition.
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
pub struct ItemConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub config: FieldConfig,
}

impl ItemConfig {
    pub fn new(kind: impl Into<String>, config: FieldConfig) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

/// Form definition, in display order.
pub type Items = IndexMap<String, ItemConfig>;

/// Field `key` changed to `new_value`.
#[derive(Clone, Debug, PartialEq)]
pub struct FormChange {
    pub key: String,
    pub new_value: Value,
}

pub type Styles = IndexMap<String, String>;

/// A single class or a list of them.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "ClassList")]
pub struct Classes(pub Vec<String>);

#[derive(Deserialize)]
#[serde(untagged)]
enum ClassList {
    One(String),
    Many(Vec<String>),
}

impl From<ClassList> for Classes {
    fn from(list: ClassList) -> Self {
        match list {
            ClassList::One(class) => Classes(class.split_whitespace().map(str::to_string).collect()),
            ClassList::Many(classes) => Classes(classes),
        }
    }
}

impl Classes {
    pub fn joined(&self) -> Option<String> {
        (!self.0.is_empty()).then(|| self.0.join(" "))
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TitleTag {
    pub text: String,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
    pub style: Styles,
    pub class: Option<String>,
    /// Tooltip.
    pub tp: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormTitle {
    pub text: String,
    pub style: Styles,
    pub tag: Option<TitleTag>,
}

/// Presentation of the form as a whole.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FormConfig {
    pub class: Classes,
    pub style: Styles,
    /// Flow layout only; grid layout computes its own container style.
    pub container_style: Styles,
    pub title: Option<FormTitle>,
    /// Switches to grid layout with one equal column per entry.
    pub grid_group: Vec<u32>,
}

impl FormConfig {
    pub fn layout(&self) -> Layout {
        if self.grid_group.is_empty() {
            Layout::Flow
        } else {
            Layout::Grid {
                columns: self.grid_group.len(),
            }
        }
    }

    pub fn container_style(&self) -> Styles {
        match self.layout() {
            Layout::Flow => self.container_style.clone(),
            Layout::Grid { columns } => {
                let mut style = Styles::new();
                style.insert(
                    "grid-template-columns".into(),
                    format!("repeat({columns}, minmax(0, 1fr))"),
                );
                style
            }
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Layout {
    /// Fields wrap left to right.
    Flow,
    Grid { columns: usize },
}

impl Layout {
    pub fn container_class(self) -> &'static str {
        match self {
            Layout::Flow => "form-flex",
            Layout::Grid { .. } => "form-grid",
        }
    }
}

/// Container of the fields sharing a `group` tag.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Group {
    pub tag: String,
    pub element_id: String,
    pub style: Styles,
    pub keys: Vec<String>,
}

impl Group {
    fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_string(),
            element_id: format!("form-group-{tag}"),
            ..Self::default()
        }
    }
}

/// Top-level placement: a field on its own or a group at the position of
/// its first member.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Slot {
    Field(String),
    Group(String),
}

pub struct Form {
    ctx: FieldContext,
    registry: Arc<FieldRegistry>,
    config: FormConfig,
    fields: IndexMap<String, Arc<dyn Field>>,
    subscriptions: Vec<Subscription>,
    /// Containers survive rebuilds and are reused by tag.
    groups: IndexMap<String, Group>,
    slots: Vec<Slot>,
    changes: Emitter<FormChange>,
}

impl Form {
    pub fn new(ctx: FieldContext) -> Self {
        Self::with_registry(ctx, Arc::new(FieldRegistry::builtin()))
    }

    pub fn with_registry(ctx: FieldContext, registry: Arc<FieldRegistry>) -> Self {
        Self {
            ctx,
            registry,
            config: FormConfig::default(),
            fields: IndexMap::new(),
            subscriptions: Vec::new(),
            groups: IndexMap::new(),
            slots: Vec::new(),
            changes: Emitter::new(),
        }
    }

    pub fn from_schema(ctx: FieldContext, schema: FormSchema) -> Result<Self, FormError> {
        let mut form = Self::new(ctx);
        let (config, items) = schema.into_parts();
        form.set_config(config);
        form.set_items(items)?;
        Ok(form)
    }

    pub fn config(&self) -> &FormConfig {
        &self.config
    }

    pub fn set_config(&mut self, config: FormConfig) {
        self.config = config;
    }

    pub fn layout(&self) -> Layout {
        self.config.layout()
    }

    /// Replace every field.
    ///
    /// The current fields are torn down before any new one is created.
    /// Unknown kinds abort the rebuild and leave the form empty.
    pub fn set_items(&mut self, items: Items) -> Result<(), FormError> {
        self.clear();

        let mut fields: IndexMap<String, Arc<dyn Field>> = IndexMap::with_capacity(items.len());
        let mut subscriptions = Vec::with_capacity(items.len());
        let mut slots = Vec::new();
        let mut merged: IndexMap<String, Styles> = IndexMap::new();

        for (key, item) in items {
            let mut config = item.config;
            if config.id.is_none() {
                config.id = Some(key.clone());
            }

            match config.group.as_deref() {
                Some(tag) => {
                    let group = self.groups.entry(tag.to_string()).or_insert_with(|| Group::new(tag));
                    if group.keys.is_empty() {
                        slots.push(Slot::Group(tag.to_string()));
                    }
                    group.keys.push(key.clone());
                    merged
                        .entry(tag.to_string())
                        .or_default()
                        .extend(config.group_style.clone());
                }
                None => slots.push(Slot::Field(key.clone())),
            }

            let field = match self.registry.create(&item.kind, self.ctx.clone()) {
                Ok(field) => field,
                Err(err) => {
                    for field in fields.values() {
                        field.teardown();
                    }
                    for group in self.groups.values_mut() {
                        group.keys.clear();
                    }
                    return Err(err);
                }
            };
            subscriptions.push(field.changes().subscribe({
                let changes = self.changes.clone();
                let key = key.clone();
                move |change| {
                    changes.emit(&FormChange {
                        key: key.clone(),
                        new_value: change.new_value().clone(),
                    })
                }
            }));
            field.set_configuration(config);
            fields.insert(key, field);
        }

        for (tag, style) in merged {
            if let Some(group) = self.groups.get_mut(&tag) {
                group.style.extend(style);
            }
        }

        debug!(fields = fields.len(), groups = self.groups().count(), "form rebuilt");
        self.fields = fields;
        self.subscriptions = subscriptions;
        self.slots = slots;
        Ok(())
    }

    fn clear(&mut self) {
        self.subscriptions.clear();
        for (_, field) in self.fields.drain(..) {
            field.teardown();
        }
        for group in self.groups.values_mut() {
            group.keys.clear();
        }
        self.slots.clear();
    }

    pub fn changes(&self) -> &Emitter<FormChange> {
        &self.changes
    }

    pub fn field(&self, key: &str) -> Option<&Arc<dyn Field>> {
        self.fields.get(key)
    }

    /// Field `key` as its concrete kind.
    pub fn field_as<F: Field>(&self, key: &str) -> Option<&F> {
        self.fields.get(key)?.as_any().downcast_ref::<F>()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &Arc<dyn Field>)> {
        self.fields.iter().map(|(k, f)| (k.as_str(), f))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Groups that hold at least one field.
    pub fn groups(&self) -> impl Iterator<Item = &Group> {
        self.groups.values().filter(|g| !g.keys.is_empty())
    }

    pub fn group(&self, tag: &str) -> Option<&Group> {
        self.groups.get(tag).filter(|g| !g.keys.is_empty())
    }

    pub fn slots(&self) -> &[Slot] {
        &self.slots
    }

    /// Nothing to render.
    pub fn is_hidden(&self) -> bool {
        self.fields.is_empty()
    }

    /// Every field passes validation. Visible errors are left alone.
    pub fn is_valid(&self) -> bool {
        self.fields.values().all(|field| field.validate_current(false))
    }

    /// Validate every field, showing errors. `None` when all pass.
    pub fn validate_all(&self) -> Option<IndexMap<String, String>> {
        for field in self.fields.values() {
            field.validate_current(true);
        }
        self.errors()
    }

    /// [`Form::validate_all`], then give async checks the settle delay to
    /// report before collecting errors.
    pub async fn validate_all_settled(&self) -> Option<IndexMap<String, String>> {
        self.validate_all();
        self.ctx.scheduler.sleep(self.ctx.timing.settle()).await;
        self.errors()
    }

    /// Errors currently shown, by key.
    pub fn errors(&self) -> Option<IndexMap<String, String>> {
        let errors: IndexMap<String, String> = self
            .fields
            .iter()
            .filter_map(|(key, field)| field.error().map(|error| (key.clone(), error)))
            .collect();
        (!errors.is_empty()).then_some(errors)
    }

    pub fn get_values(&self) -> IndexMap<String, Value> {
        self.fields
            .iter()
            .map(|(key, field)| (key.clone(), field.value()))
            .collect()
    }

    /// Values that differ from the configured ones. `None` when nothing
    /// changed.
    pub fn get_changed_values(&self) -> Option<IndexMap<String, Value>> {
        let changed: IndexMap<String, Value> = self
            .fields
            .iter()
            .filter_map(|(key, field)| {
                let value = field.value();
                (!deep_equal(&field.initial_value(), &value)).then(|| (key.clone(), value))
            })
            .collect();
        (!changed.is_empty()).then_some(changed)
    }

    /// Unset every value except those of `except`.
    pub fn reset_values(&self, except: &[&str]) {
        for (key, field) in &self.fields {
            if !except.contains(&key.as_str()) {
                field.set_value(Value::Null);
            }
        }
    }
}

impl Drop for Form {
    fn drop(&mut self) {
        self.clear();
    }
}

impl fmt::Debug for Form {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Form")
            .field("config", &self.config)
            .field("fields", &self.fields)
            .field("groups", &self.groups)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::tests::context;
    use crate::field::{SelectField, SelectOption, TextField};
    use crate::validation::ValidationRule;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    fn form() -> Form {
        let (ctx, _) = context();
        Form::new(ctx)
    }

    fn text(config: FieldConfig) -> ItemConfig {
        ItemConfig::new("text", config)
    }

    #[test]
    fn ids_default_to_keys() {
        let mut form = form();
        let mut items = Items::new();
        items.insert("name".into(), text(FieldConfig::new()));
        items.insert("street".into(), text(FieldConfig::new().id("addr-street")));
        form.set_items(items).unwrap();

        assert_eq!(form.field("name").unwrap().core().id(), "name");
        assert_eq!(form.field("street").unwrap().core().id(), "addr-street");
        assert!(form.field_as::<TextField>("name").is_some());
        assert!(form.field_as::<SelectField>("name").is_none());
    }

    #[test]
    fn rebuild_tears_down_previous_fields() {
        let mut form = form();
        let mut items = Items::new();
        items.insert("name".into(), text(FieldConfig::new()));
        form.set_items(items.clone()).unwrap();
        let old = form.field("name").unwrap().clone();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            form.changes().subscribe(move |c: &FormChange| seen.lock().unwrap().push(c.key.clone()))
        };

        form.set_items(items).unwrap();
        assert!(old.core().is_torn_down());
        assert!(!Arc::ptr_eq(&old, form.field("name").unwrap()));

        // the old controller no longer reaches the form
        old.core().emit_change(crate::field::FieldChange::Value(json!("x")));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[test]
    fn unknown_kind_leaves_form_empty() {
        let mut form = form();
        let mut items = Items::new();
        items.insert("name".into(), text(FieldConfig::new()));
        items.insert("slider".into(), ItemConfig::new("slider", FieldConfig::new()));
        let err = form.set_items(items).unwrap_err();
        assert!(matches!(err, FormError::UnknownFieldKind(_)));
        assert!(form.is_hidden());
    }

    #[test]
    fn groups_are_found_or_created_and_styles_merge() {
        let mut form = form();
        let mut items = Items::new();
        items.insert("city".into(), text(FieldConfig::new().group("addr").group_style("gap", "8px")));
        items.insert("note".into(), text(FieldConfig::new()));
        items.insert(
            "street".into(),
            text(FieldConfig::new().group("addr").group_style("gap", "12px").group_style("display", "flex")),
        );
        form.set_items(items.clone()).unwrap();

        let group = form.group("addr").unwrap();
        assert_eq!(group.element_id, "form-group-addr");
        assert_eq!(group.keys, vec!["city", "street"]);
        assert_eq!(group.style.get("gap").map(String::as_str), Some("12px"));
        assert_eq!(group.style.get("display").map(String::as_str), Some("flex"));
        assert_eq!(
            form.slots(),
            &[Slot::Group("addr".into()), Slot::Field("note".into())]
        );

        form.set_items(items).unwrap();
        assert_eq!(form.groups().count(), 1);
        assert_eq!(form.group("addr").unwrap().keys.len(), 2);
    }

    #[test]
    fn layout_follows_grid_group() {
        let mut config = FormConfig::default();
        config.container_style.insert("gap".into(), "16px".into());
        assert_eq!(config.layout(), Layout::Flow);
        assert_eq!(config.layout().container_class(), "form-flex");
        assert_eq!(config.container_style().get("gap").map(String::as_str), Some("16px"));

        config.grid_group = vec![2, 2, 6];
        assert_eq!(config.layout(), Layout::Grid { columns: 3 });
        assert_eq!(
            config.container_style().get("grid-template-columns").map(String::as_str),
            Some("repeat(3, minmax(0, 1fr))")
        );
    }

    #[test]
    fn class_accepts_string_or_list() {
        let config: FormConfig = json5::from_str(r#"{ class: "flex-with-gap-8 no-wrap" }"#).unwrap();
        assert_eq!(config.class.joined().as_deref(), Some("flex-with-gap-8 no-wrap"));
        let config: FormConfig = json5::from_str(r#"{ class: ["a", "b"] }"#).unwrap();
        assert_eq!(config.class.0, vec!["a", "b"]);
    }

    #[test]
    fn aggregates() {
        let mut form = form();
        let mut items = Items::new();
        items.insert(
            "name".into(),
            text(FieldConfig::new().value(json!("Ann")).validate(ValidationRule::required())),
        );
        items.insert(
            "size".into(),
            ItemConfig::new(
                "select",
                FieldConfig::new()
                    .options(vec![SelectOption::new(json!(25), "25"), SelectOption::new(json!(30), "30")])
                    .validate(ValidationRule::required()),
            ),
        );
        items.insert("comment".into(), text(FieldConfig::new().validate(ValidationRule::required())));
        form.set_items(items).unwrap();

        assert!(!form.is_valid());
        assert_eq!(form.field("comment").unwrap().error(), None);
        // the select defaulted to its first option
        assert_eq!(form.get_changed_values().unwrap().keys().collect::<Vec<_>>(), vec!["size"]);

        let errors = form.validate_all().unwrap();
        assert_eq!(errors.len(), 1);
        assert_eq!(errors["comment"], "Required field");

        form.field("comment").unwrap().set_value(json!("ring twice"));
        assert!(form.is_valid());
        assert_eq!(form.validate_all(), None);

        let values = form.get_values();
        assert_eq!(values["name"], json!("Ann"));
        assert_eq!(values["size"], json!(25));
        assert_eq!(values["comment"], json!("ring twice"));

        form.reset_values(&["name"]);
        assert_eq!(form.field("name").unwrap().value(), json!("Ann"));
        assert_eq!(form.field("comment").unwrap().value(), Value::Null);
    }
}
