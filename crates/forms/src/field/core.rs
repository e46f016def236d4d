//! State and behavior every field kind shares.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use super::{FieldChange, FieldContext};
use crate::config::{FieldConfig, PlaceholderSource, ValueSource};
use crate::reactive::{Cell, Derived, Emitter, StructuralEq, Subscription};
use crate::validation::{ErrorSink, ValidationRule};

/// Value, error, focus and configuration of one field.
///
/// Configuration and validity are tracked independently: `config_epoch`
/// advances on every applied configuration, the error cell holds the
/// visible validation result, and `check_generation` stamps async checks so
/// that only the latest one may write the error.
pub struct FieldCore {
    kind: &'static str,
    ctx: FieldContext,
    config: Cell<FieldConfig>,
    value: Cell<Value>,
    error: Cell<Option<String>>,
    focused: Cell<bool>,
    placeholder: Cell<Option<String>>,
    classes: Derived<Vec<String>>,
    changes: Emitter<FieldChange>,
    config_epoch: AtomicU64,
    value_epoch: Arc<AtomicU64>,
    check_generation: Arc<AtomicU64>,
    configured: AtomicBool,
    mounted: AtomicBool,
    torn_down: AtomicBool,
    bindings: Mutex<Vec<Subscription>>,
    internal: Mutex<Vec<Subscription>>,
    this: Weak<FieldCore>,
}

impl FieldCore {
    pub fn new(kind: &'static str, ctx: FieldContext) -> Arc<Self> {
        let config = Cell::new(FieldConfig::default());
        let value = Cell::new(Value::Null);
        let error = Cell::new(None);
        let focused = Cell::new(false);
        let classes = Derived::new(&[&config, &value, &error, &focused], {
            let (config, error, focused) = (config.clone(), error.clone(), focused.clone());
            move || input_classes(&config.get(), error.with(Option::is_some), focused.get())
        });
        let value_epoch = Arc::new(AtomicU64::new(0));
        let epoch_sub = {
            let epoch = value_epoch.clone();
            value.subscribe(move |_| {
                epoch.fetch_add(1, Ordering::SeqCst);
            })
        };

        Arc::new_cyclic(|this| Self {
            kind,
            ctx,
            config,
            value,
            error,
            focused,
            placeholder: Cell::new(None),
            classes,
            changes: Emitter::new(),
            config_epoch: AtomicU64::new(0),
            value_epoch,
            check_generation: Arc::new(AtomicU64::new(0)),
            configured: AtomicBool::new(false),
            mounted: AtomicBool::new(false),
            torn_down: AtomicBool::new(false),
            bindings: Mutex::new(Vec::new()),
            internal: Mutex::new(vec![epoch_sub]),
            this: this.clone(),
        })
    }

    pub fn kind(&self) -> &'static str {
        self.kind
    }

    pub fn context(&self) -> &FieldContext {
        &self.ctx
    }

    pub fn id(&self) -> String {
        self.config.with(|c| c.id.clone().unwrap_or_default())
    }

    pub fn config(&self) -> FieldConfig {
        self.config.get()
    }

    pub fn with_config<R>(&self, f: impl FnOnce(&FieldConfig) -> R) -> R {
        self.config.with(f)
    }

    pub fn config_cell(&self) -> &Cell<FieldConfig> {
        &self.config
    }

    pub fn value(&self) -> &Cell<Value> {
        &self.value
    }

    pub fn error(&self) -> &Cell<Option<String>> {
        &self.error
    }

    pub fn focused(&self) -> &Cell<bool> {
        &self.focused
    }

    pub fn placeholder(&self) -> &Cell<Option<String>> {
        &self.placeholder
    }

    pub fn changes(&self) -> &Emitter<FieldChange> {
        &self.changes
    }

    /// `input-shared` plus the configured class and the state classes
    /// `readonly`, `disabled`, `invalid`, `focused`.
    pub fn classes(&self) -> &Derived<Vec<String>> {
        &self.classes
    }

    pub fn wrapper_classes(&self) -> Vec<String> {
        self.config.with(|c| match c.wrapper_class.as_deref() {
            Some("") => Vec::new(),
            Some(extra) => vec!["input-shared-wrapper".to_string(), extra.to_string()],
            None => vec!["input-shared-wrapper".to_string()],
        })
    }

    pub fn config_epoch(&self) -> u64 {
        self.config_epoch.load(Ordering::SeqCst)
    }

    pub fn value_epoch(&self) -> u64 {
        self.value_epoch.load(Ordering::SeqCst)
    }

    pub fn is_configured(&self) -> bool {
        self.configured.load(Ordering::SeqCst)
    }

    pub fn is_torn_down(&self) -> bool {
        self.torn_down.load(Ordering::SeqCst)
    }

    pub fn rule(&self) -> Option<ValidationRule> {
        self.config.with(|c| c.validate.clone())
    }

    /// Apply a configuration. Returns `false` when it is structurally equal
    /// to the applied one.
    ///
    /// The value source is adopted first: a bound cell is linked both ways,
    /// a literal is copied only while the field's value is unset. The first
    /// configuration with `autofocus` schedules a deferred focus.
    pub fn set_configuration(&self, config: FieldConfig) -> bool {
        let first = !self.configured.load(Ordering::SeqCst);
        if !first && self.config.with(|applied| applied.structural_eq(&config)) {
            return false;
        }

        let mut bindings = Vec::new();
        match &config.value {
            ValueSource::Bound(cell) => bindings.extend(self.value.bind(cell)),
            ValueSource::Literal(value) => {
                if self.value.with(Value::is_null) {
                    self.value.set(value.clone());
                }
            }
            ValueSource::Unset => {}
        }

        match &config.placeholder {
            PlaceholderSource::Bound(cell) => {
                self.placeholder.set(Some(cell.get()));
                let placeholder = self.placeholder.downgrade();
                bindings.push(cell.subscribe(move |text| {
                    if let Some(placeholder) = placeholder.upgrade() {
                        placeholder.set(Some(text.clone()));
                    }
                }));
            }
            other => {
                self.placeholder.set(other.current());
            }
        }

        // replacing drops the previous bindings
        *self.bindings.lock().unwrap_or_else(PoisonError::into_inner) = bindings;

        let autofocus = config.autofocus;
        self.config.set(config);
        let epoch = self.config_epoch.fetch_add(1, Ordering::SeqCst) + 1;
        self.configured.store(true, Ordering::SeqCst);
        debug!(field = %self.id(), kind = self.kind, epoch, "configuration applied");

        if first && autofocus {
            self.mount();
        }
        true
    }

    /// Schedule the deferred autofocus. Only the first call has an effect.
    pub fn mount(&self) {
        if self.mounted.swap(true, Ordering::SeqCst) || !self.config.with(|c| c.autofocus) {
            return;
        }
        let this = self.this.clone();
        self.ctx.scheduler.after(
            self.ctx.timing.autofocus(),
            Box::new(move || {
                if let Some(core) = this.upgrade() {
                    if !core.is_torn_down() {
                        core.focus();
                    }
                }
            }),
        );
    }

    /// Store a value. Validation is left to the caller.
    pub fn set_value(&self, value: Value) -> bool {
        self.value.set(value)
    }

    /// Check `value` against the configured rule.
    ///
    /// With `emit_error` the visible error is updated, failures are logged
    /// and, once the synchronous checks pass, the async handler is started.
    /// Without it nothing observable changes.
    pub fn validate(&self, value: &Value, emit_error: bool) -> bool {
        let Some(rule) = self.rule() else {
            if emit_error {
                self.error.set(None);
            }
            return true;
        };
        match rule.evaluate(value) {
            Ok(()) => {
                if emit_error {
                    self.error.set(None);
                    self.start_async_check(&rule, value);
                }
                true
            }
            Err(err) => {
                if emit_error {
                    warn!(field = %self.id(), %value, ?rule, "validation error: {}", err.message);
                    self.supersede_async_checks();
                    self.error.set(Some(err.message));
                } else {
                    debug!(field = %self.id(), %value, "value would not validate: {}", err.message);
                }
                false
            }
        }
    }

    /// Run the rule's async handler (if any) for `value`. Earlier checks
    /// that are still in flight lose the right to report.
    pub fn start_async_check(&self, rule: &ValidationRule, value: &Value) {
        match &rule.async_handler {
            Some(handler) => {
                let sink = ErrorSink::new(
                    self.id(),
                    self.error.clone(),
                    self.value.clone(),
                    self.check_generation.clone(),
                    value.clone(),
                );
                self.ctx.scheduler.spawn(handler.call(value.clone(), sink));
            }
            None => self.supersede_async_checks(),
        }
    }

    pub fn supersede_async_checks(&self) {
        self.check_generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn focus(&self) {
        self.focused.set(true);
    }

    pub fn blur(&self) {
        self.focused.set(false);
    }

    pub fn emit_change(&self, change: FieldChange) {
        self.changes.emit(&change);
    }

    /// Keep a subscription alive for the lifetime of the field.
    pub fn retain(&self, subscription: Subscription) {
        self.internal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(subscription);
    }

    /// Release bindings and internal subscriptions. Pending timers and
    /// async checks find the field torn down and do nothing.
    pub fn teardown(&self) {
        if self.torn_down.swap(true, Ordering::SeqCst) {
            return;
        }
        self.supersede_async_checks();
        self.bindings
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.internal
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
        self.focused.set(false);
        debug!(field = %self.id(), kind = self.kind, "field torn down");
    }
}

fn input_classes(config: &FieldConfig, invalid: bool, focused: bool) -> Vec<String> {
    let mut classes = vec!["input-shared".to_string()];
    if let Some(class) = config.css_class.as_deref().filter(|c| !c.is_empty()) {
        classes.push(class.to_string());
    }
    for (on, class) in [
        (config.readonly, "readonly"),
        (config.disabled, "disabled"),
        (invalid, "invalid"),
        (focused, "focused"),
    ] {
        if on {
            classes.push(class.to_string());
        }
    }
    classes
}
