//! Single-choice select with search, short list and default selection.
//!
//! ```text
//!  [ selected value / search ]
//!  | Group A                 |
//!  | short list entry 1      |
//!  | short list entry 2      |
//!  | Group B                 |
//!  | remaining entries ...   |
//!  +-------------------------+
//! ```
//!
//! While a short list is configured, only its entries are displayed until
//! the user searches or the current value is found outside of it.

use std::any::Any;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tracing::debug;

use super::options::{
    group_options, option_list, visible_options, DisplayedOption, IdPolicy, OptionGroup, SelectOption,
};
use super::{Field, FieldChange, FieldContext, FieldCore};
use crate::config::FieldConfig;
use crate::dropdown::{Dropdown, DropdownSurface};
use crate::reactive::{Cell, Derived, Emitter, Subscription};
use crate::value::deep_equal;

pub const NOT_SELECTED_TEXT: &str = "Not selected";
pub const DEFAULT_OPTION_CLASS: &str = "select-option-shared";

struct SelectInner {
    core: Arc<FieldCore>,
    search: Cell<String>,
    show_full: Cell<bool>,
    /// Options handed in by the host, overriding the configuration.
    provided: Cell<Option<Vec<SelectOption>>>,
    /// Mirror of the configuration's live option source.
    live: Cell<Option<Vec<SelectOption>>>,
    live_sub: Mutex<Option<Subscription>>,
    displayed: Derived<Vec<DisplayedOption>>,
    dropdown: Dropdown,
    closed: Emitter<()>,
    add_clicked: Emitter<()>,
    /// Suppresses default selection while a configuration is half applied.
    configuring: AtomicBool,
}

pub struct SelectField {
    inner: Arc<SelectInner>,
}

impl SelectField {
    pub const KIND: &'static str = "select";

    pub fn new(ctx: FieldContext) -> Self {
        let core = FieldCore::new(Self::KIND, ctx.clone());
        let search = Cell::new(String::new());
        let show_full = Cell::new(false);
        let provided = Cell::new(None);
        let live = Cell::new(None);
        let displayed = Derived::new(
            &[core.config_cell(), core.placeholder(), &search, &show_full, &provided, &live],
            {
                let config = core.config_cell().clone();
                let placeholder = core.placeholder().clone();
                let (search, show_full) = (search.clone(), show_full.clone());
                let (provided, live) = (provided.clone(), live.clone());
                move || {
                    config.with(|config| {
                        let options = provided.with(|p| live.with(|l| option_list(&config.select, p.as_ref(), l.as_ref())));
                        displayed_options(
                            config,
                            options,
                            placeholder.get(),
                            search.with(String::is_empty),
                            show_full.get(),
                        )
                    })
                }
            },
        );

        let inner = Arc::new(SelectInner {
            core,
            search,
            show_full,
            provided,
            live,
            live_sub: Mutex::new(None),
            displayed,
            dropdown: Dropdown::new(ctx.scheduler.clone(), ctx.timing),
            closed: Emitter::new(),
            add_clicked: Emitter::new(),
            configuring: AtomicBool::new(false),
        });

        let weak = Arc::downgrade(&inner);
        inner.core.retain(inner.displayed.subscribe({
            let weak = weak.clone();
            move |_| reconcile(&weak)
        }));
        inner.core.retain(inner.core.value().subscribe(move |_| reconcile(&weak)));

        Self { inner }
    }

    /// Options as listed: synthetic "not selected" entry first when null is
    /// allowed, then the short list or all options.
    pub fn displayed(&self) -> Vec<DisplayedOption> {
        self.inner.displayed.get()
    }

    /// Displayed options that match the current search.
    pub fn visible(&self) -> Vec<DisplayedOption> {
        let displayed = self.inner.displayed.get();
        let term = self.inner.search.get();
        self.inner.core.with_config(|c| {
            visible_options(&displayed, &term, &c.select, self.inner.core.context().translator.as_ref())
        })
    }

    pub fn visible_groups(&self) -> Vec<OptionGroup> {
        let titles = self.inner.core.with_config(|c| c.select.group_titles);
        group_options(&self.visible(), titles)
    }

    pub fn policy(&self) -> IdPolicy {
        self.inner.policy()
    }

    /// Id of the option shown as selected: the value, or the configured
    /// literal while the value is unset.
    pub fn selected_id(&self) -> Option<String> {
        self.policy().id_of(&self.inner.shown_value())
    }

    pub fn default_option_id(&self) -> Option<String> {
        self.inner.default_option().and_then(|d| d.id)
    }

    /// Clearing is offered while searching in an open dropdown unless the
    /// default is already selected.
    pub fn can_clear(&self) -> bool {
        let no_search = self.inner.core.with_config(|c| c.select.no_search);
        !no_search && self.is_open().get() && self.selected_id() != self.default_option_id()
    }

    pub fn option_class(&self) -> String {
        self.inner.core.with_config(|c| {
            c.select
                .option_class
                .clone()
                .filter(|class| !class.is_empty())
                .unwrap_or_else(|| DEFAULT_OPTION_CLASS.to_string())
        })
    }

    pub fn search(&self) -> &Cell<String> {
        &self.inner.search
    }

    pub fn show_full(&self) -> &Cell<bool> {
        &self.inner.show_full
    }

    /// Replace the option list from the outside.
    pub fn set_options(&self, options: Option<Vec<SelectOption>>) {
        self.inner.provided.set(options);
    }

    pub fn is_open(&self) -> &Cell<bool> {
        self.inner.dropdown.is_open()
    }

    pub fn attach_surface(&self, surface: Arc<dyn DropdownSurface>) {
        self.inner.dropdown.attach(surface);
    }

    pub fn dropdown(&self) -> &Dropdown {
        &self.inner.dropdown
    }

    pub fn open_dropdown(&self) {
        let (hidden, max_width) = self
            .inner
            .core
            .with_config(|c| (c.select.hide_dropdown, c.select.dropdown_max_width));
        if hidden {
            return;
        }
        self.inner.dropdown.open(&self.inner.core.id(), max_width);
    }

    pub fn close(&self) {
        if self.is_open().get() {
            self.inner.dropdown.close();
            self.inner.search.set(String::new());
            self.inner.closed.emit(&());
        }
    }

    pub fn closed(&self) -> &Emitter<()> {
        &self.inner.closed
    }

    pub fn click_add_button(&self) {
        self.close();
        self.inner.add_clicked.emit(&());
    }

    pub fn add_clicked(&self) -> &Emitter<()> {
        &self.inner.add_clicked
    }

    /// The user picked `selected`, or cleared the field with `None`.
    ///
    /// Clearing snaps back to the configured value, or to the first
    /// displayed option when null is not allowed.
    pub fn on_change(&self, selected: Option<Value>) {
        let inner = &self.inner;
        let new_value = match selected.filter(|v| !v.is_null()) {
            Some(value) => value,
            None => {
                let (literal, allow_null) = inner
                    .core
                    .with_config(|c| (c.value.literal().cloned(), c.allows_null()));
                match (literal, allow_null) {
                    (Some(literal), _) => literal,
                    (None, true) => Value::Null,
                    (None, false) => inner
                        .displayed
                        .with(|d| d.first().map(|o| o.value().clone()))
                        .unwrap_or(Value::Null),
                }
            }
        };
        if inner.core.value().with(|current| deep_equal(current, &new_value)) {
            return;
        }
        self.validate(&new_value, true);
        inner.core.set_value(new_value.clone());
        inner.core.emit_change(FieldChange::Select {
            select_id: inner.core.id(),
            new_value,
        });
    }

    /// Pick the displayed option with `id`. Returns `false` for unknown ids.
    pub fn select_id(&self, id: &str) -> bool {
        let value = self
            .inner
            .displayed
            .with(|d| d.iter().find(|o| o.id.as_deref() == Some(id)).map(|o| o.value().clone()));
        match value {
            Some(value) => {
                self.on_change(Some(value));
                self.close();
                true
            }
            None => false,
        }
    }
}

impl SelectInner {
    fn policy(&self) -> IdPolicy {
        self.core.with_config(|c| IdPolicy {
            allow_null: c.allows_null(),
            no_default_selection: c.select.no_default_selection,
        })
    }

    fn shown_value(&self) -> Value {
        let value = self.core.value().get();
        if !value.is_null() {
            return value;
        }
        self.core
            .with_config(|c| c.value.literal().cloned())
            .unwrap_or(Value::Null)
    }

    fn all_options(&self) -> Vec<SelectOption> {
        self.core.with_config(|c| {
            self.provided.with(|p| self.live.with(|l| option_list(&c.select, p.as_ref(), l.as_ref())))
        })
    }

    fn default_option(&self) -> Option<DisplayedOption> {
        let (allow_null, no_default) = self
            .core
            .with_config(|c| (c.allows_null(), c.select.no_default_selection));
        self.displayed.with(|displayed| match (no_default, allow_null) {
            (true, _) => None,
            (false, true) if displayed.len() > 1 => Some(displayed[1].clone()),
            (false, false) => displayed.first().cloned(),
            _ => None,
        })
    }

    fn follow_live_source(&self, config: &FieldConfig) {
        let sub = config.select.options_source.as_ref().map(|source| {
            self.live.set(Some(source.get()));
            let live = self.live.downgrade();
            source.subscribe(move |options| {
                if let Some(live) = live.upgrade() {
                    live.set(Some(options.clone()));
                }
            })
        });
        if sub.is_none() {
            self.live.set(None);
        }
        *self.live_sub.lock().unwrap_or_else(PoisonError::into_inner) = sub;
    }
}

fn displayed_options(
    config: &FieldConfig,
    options: Vec<SelectOption>,
    placeholder: Option<String>,
    search_empty: bool,
    show_full: bool,
) -> Vec<DisplayedOption> {
    let policy = IdPolicy {
        allow_null: config.allows_null(),
        no_default_selection: config.select.no_default_selection,
    };
    let short_list = config.select.short_list.as_deref().unwrap_or_default();
    let use_short_list = !show_full && search_empty && !short_list.is_empty();

    let mut displayed = Vec::with_capacity(options.len() + 1);
    if policy.allow_null {
        let text = placeholder.unwrap_or_else(|| NOT_SELECTED_TEXT.to_string());
        displayed.push(DisplayedOption::new(SelectOption::not_selected(text), policy));
    }
    displayed.extend(
        options
            .into_iter()
            .map(|option| DisplayedOption::new(option, policy))
            .filter(|option| {
                !use_short_list || short_list.iter().any(|value| deep_equal(value, option.value()))
            }),
    );
    displayed
}

/// Keep the value on a displayed option: fall back to the default option
/// when the value is unknown, reveal the full list when the value exists
/// outside the short list.
fn reconcile(inner: &Weak<SelectInner>) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    if inner.configuring.load(Ordering::SeqCst) || inner.core.is_torn_down() {
        return;
    }

    let value = inner.core.value().get();
    if inner.core.validate(&value, false) {
        inner.core.error().set(None);
    }

    let default_value = inner
        .default_option()
        .map(|o| o.value().clone())
        .unwrap_or(Value::Null);
    let has_short_list = inner.core.with_config(|c| c.select.short_list.is_some());
    let probe = inner.shown_value();
    let policy = inner.policy();
    let selected_id = policy.id_of(&probe);

    let shown = inner
        .displayed
        .with(|displayed| displayed.iter().any(|o| o.id == selected_id));
    if shown {
        return;
    }
    if selected_id.is_none() || !has_short_list {
        debug!(field = %inner.core.id(), ?selected_id, "value not among options, selecting default");
        inner.core.set_value(default_value);
        return;
    }
    let known = inner
        .all_options()
        .iter()
        .any(|o| policy.id_of(&o.value) == selected_id);
    if known {
        inner.show_full.set(true);
    } else {
        inner.core.set_value(default_value);
    }
}

impl Field for SelectField {
    fn core(&self) -> &FieldCore {
        &self.inner.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn set_configuration(&self, config: FieldConfig) -> bool {
        let inner = &self.inner;
        inner.configuring.store(true, Ordering::SeqCst);
        let live_changed = inner
            .core
            .with_config(|applied| applied.select.options_source != config.select.options_source);
        if live_changed || !inner.core.is_configured() {
            inner.follow_live_source(&config);
        }
        let applied = inner.core.set_configuration(config);
        inner.configuring.store(false, Ordering::SeqCst);
        if applied {
            if inner.core.with_config(|c| c.select.hide_dropdown) {
                inner.dropdown.close();
            }
            reconcile(&Arc::downgrade(inner));
        }
        applied
    }

    fn teardown(&self) {
        self.inner.dropdown.teardown();
        self.inner
            .live_sub
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.inner.core.teardown();
    }
}
