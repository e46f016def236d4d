//! Multiple-choice select. The value is an array of option values.

use std::any::Any;
use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::options::{group_options, option_list, visible_options, DisplayedOption, IdPolicy, OptionGroup, SelectOption};
use super::{Field, FieldChange, FieldContext, FieldCore};
use crate::dropdown::{Dropdown, DropdownSurface};
use crate::reactive::{Cell, Derived, Emitter};
use crate::value::deep_equal;

/// Option ids of a multiselect never stand for null.
const POLICY: IdPolicy = IdPolicy {
    allow_null: false,
    no_default_selection: true,
};

pub struct MultiselectField {
    core: Arc<FieldCore>,
    search: Cell<String>,
    provided: Cell<Option<Vec<SelectOption>>>,
    displayed: Derived<Vec<DisplayedOption>>,
    dropdown: Dropdown,
    closed: Emitter<()>,
    add_clicked: Emitter<()>,
}

impl MultiselectField {
    pub const KIND: &'static str = "multiselect";

    pub fn new(ctx: FieldContext) -> Self {
        let core = FieldCore::new(Self::KIND, ctx.clone());
        let provided = Cell::new(None);
        let displayed = Derived::new(&[core.config_cell(), &provided], {
            let config = core.config_cell().clone();
            let provided = provided.clone();
            move || {
                let options = config.with(|c| provided.with(|p| option_list(&c.select, p.as_ref(), None)));
                options
                    .into_iter()
                    .map(|option| DisplayedOption::new(option, POLICY))
                    .collect()
            }
        });
        Self {
            core,
            search: Cell::new(String::new()),
            provided,
            displayed,
            dropdown: Dropdown::new(ctx.scheduler.clone(), ctx.timing),
            closed: Emitter::new(),
            add_clicked: Emitter::new(),
        }
    }

    pub fn displayed(&self) -> Vec<DisplayedOption> {
        self.displayed.get()
    }

    pub fn visible(&self) -> Vec<DisplayedOption> {
        let displayed = self.displayed.get();
        let term = self.search.get();
        self.core
            .with_config(|c| visible_options(&displayed, &term, &c.select, self.core.context().translator.as_ref()))
    }

    pub fn visible_groups(&self) -> Vec<OptionGroup> {
        let titles = self.core.with_config(|c| c.select.group_titles);
        group_options(&self.visible(), titles)
    }

    pub fn set_options(&self, options: Option<Vec<SelectOption>>) {
        self.provided.set(options);
    }

    pub fn search(&self) -> &Cell<String> {
        &self.search
    }

    /// Selected values in selection order. Null reads as nothing selected.
    pub fn selected_values(&self) -> Vec<Value> {
        self.core.value().with(|value| match value {
            Value::Array(items) => items.clone(),
            Value::Null => Vec::new(),
            other => vec![other.clone()],
        })
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.selected_values()
            .iter()
            .filter_map(|value| POLICY.id_of(value))
            .collect()
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected_ids().iter().any(|selected| selected == id)
    }

    /// Add the displayed option `id`. Unknown ids are ignored.
    pub fn select(&self, id: &str) -> bool {
        if self.is_selected(id) {
            return false;
        }
        let Some(value) = self.option_value(id) else {
            debug!(field = %self.core.id(), id, "unknown option");
            return false;
        };
        let mut values = self.selected_values();
        values.push(value);
        self.commit(values)
    }

    pub fn deselect(&self, id: &str) -> bool {
        let values: Vec<Value> = self
            .selected_values()
            .into_iter()
            .filter(|value| POLICY.id_of(value).as_deref() != Some(id))
            .collect();
        self.commit(values)
    }

    pub fn toggle(&self, id: &str) -> bool {
        if self.is_selected(id) {
            self.deselect(id)
        } else {
            self.select(id)
        }
    }

    pub fn clear(&self) -> bool {
        self.commit(Vec::new())
    }

    /// Label under the option list, when the add button is configured.
    pub fn add_button(&self) -> Option<String> {
        self.core.with_config(|c| c.select.show_add_button.clone())
    }

    pub fn click_add_button(&self) {
        self.close();
        self.add_clicked.emit(&());
    }

    pub fn add_clicked(&self) -> &Emitter<()> {
        &self.add_clicked
    }

    pub fn is_open(&self) -> &Cell<bool> {
        self.dropdown.is_open()
    }

    pub fn attach_surface(&self, surface: Arc<dyn DropdownSurface>) {
        self.dropdown.attach(surface);
    }

    pub fn dropdown(&self) -> &Dropdown {
        &self.dropdown
    }

    pub fn open_dropdown(&self) {
        let (hidden, max_width) = self
            .core
            .with_config(|c| (c.select.hide_dropdown, c.select.dropdown_max_width));
        if !hidden {
            self.dropdown.open(&self.core.id(), max_width);
        }
    }

    pub fn close(&self) {
        if self.is_open().get() {
            self.dropdown.close();
            self.search.set(String::new());
            self.closed.emit(&());
        }
    }

    pub fn closed(&self) -> &Emitter<()> {
        &self.closed
    }

    fn option_value(&self, id: &str) -> Option<Value> {
        self.displayed
            .with(|d| d.iter().find(|o| o.id.as_deref() == Some(id)).map(|o| o.value().clone()))
    }

    fn commit(&self, values: Vec<Value>) -> bool {
        let new_value = Value::Array(values);
        if self.core.value().with(|current| deep_equal(current, &new_value)) {
            return false;
        }
        self.validate(&new_value, true);
        self.core.set_value(new_value.clone());
        self.core.emit_change(FieldChange::Select {
            select_id: self.core.id(),
            new_value,
        });
        true
    }
}

impl Field for MultiselectField {
    fn core(&self) -> &FieldCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// An empty selection counts as no value.
    fn validate(&self, value: &Value, emit_error: bool) -> bool {
        match value {
            Value::Array(items) if items.is_empty() => self.core.validate(&Value::Null, emit_error),
            other => self.core.validate(other, emit_error),
        }
    }

    fn teardown(&self) {
        self.dropdown.teardown();
        self.core.teardown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FieldConfig;
    use crate::field::tests::context;
    use crate::validation::ValidationRule;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Mutex;

    fn toppings() -> Vec<SelectOption> {
        vec![
            SelectOption::new(json!("cheese"), "Cheese"),
            SelectOption::new(json!("olives"), "Olives"),
            SelectOption::new(json!("ham"), "Ham"),
        ]
    }

    fn multiselect(config: FieldConfig) -> MultiselectField {
        let (ctx, _) = context();
        let field = MultiselectField::new(ctx);
        field.set_configuration(config);
        field
    }

    #[test]
    fn selection_keeps_order_and_reports() {
        let field = multiselect(FieldConfig::new().id("toppings").options(toppings()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            field.changes().subscribe(move |c: &FieldChange| seen.lock().unwrap().push(c.new_value().clone()))
        };

        assert!(field.select("ham"));
        assert!(field.toggle("cheese"));
        assert!(!field.select("ham"));
        assert!(!field.select("pineapple"));
        assert_eq!(field.value(), json!(["ham", "cheese"]));
        assert_eq!(field.selected_ids(), vec!["ham", "cheese"]);

        assert!(field.toggle("ham"));
        assert_eq!(field.value(), json!(["cheese"]));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![json!(["ham"]), json!(["ham", "cheese"]), json!(["cheese"])]
        );
    }

    #[test]
    fn change_event_names_the_control() {
        let field = multiselect(FieldConfig::new().id("toppings").options(toppings()));
        let seen = Arc::new(Mutex::new(None));
        let _sub = {
            let seen = seen.clone();
            field.changes().subscribe(move |c: &FieldChange| *seen.lock().unwrap() = Some(c.clone()))
        };
        field.select("olives");
        assert_eq!(
            seen.lock().unwrap().clone(),
            Some(FieldChange::Select {
                select_id: "toppings".into(),
                new_value: json!(["olives"])
            })
        );
    }

    #[test]
    fn empty_selection_is_required_error() {
        let field = multiselect(FieldConfig::new().options(toppings()).validate(ValidationRule::required()));
        field.select("cheese");
        assert_eq!(field.error(), None);
        field.clear();
        assert_eq!(field.value(), json!([]));
        assert_eq!(field.error().as_deref(), Some("Required field"));
    }

    #[test]
    fn max_counts_selected_items() {
        let field = multiselect(
            FieldConfig::new()
                .options(toppings())
                .validate(ValidationRule::optional().max(1.0)),
        );
        field.select("cheese");
        assert_eq!(field.error(), None);
        field.select("ham");
        assert_eq!(field.error().as_deref(), Some("Maximum 1"));
    }

    #[test]
    fn null_value_reads_as_empty() {
        let field = multiselect(FieldConfig::new().options(toppings()));
        assert!(field.selected_values().is_empty());
        assert!(!field.is_selected("cheese"));
    }

    #[test]
    fn add_button_closes_dropdown() {
        let mut config = FieldConfig::new().options(toppings());
        config.select.show_add_button = Some("common.add".into());
        let field = multiselect(config);
        let clicks = Arc::new(Mutex::new(0));
        let _sub = {
            let clicks = clicks.clone();
            field.add_clicked().subscribe(move |_| *clicks.lock().unwrap() += 1)
        };
        field.open_dropdown();
        assert!(field.is_open().get());
        field.click_add_button();
        assert!(!field.is_open().get());
        assert_eq!(*clicks.lock().unwrap(), 1);
        assert_eq!(field.add_button().as_deref(), Some("common.add"));
    }

    #[test]
    fn search_filters_visible_options() {
        let field = multiselect(FieldConfig::new().options(toppings()));
        field.search().set("ol".into());
        let ids: Vec<_> = field.visible().into_iter().filter_map(|o| o.id).collect();
        assert_eq!(ids, vec!["olives"]);
    }
}
