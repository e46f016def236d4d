//! Phone number input.
//!
//! The public value is the bare digit string (`"79991234567"`). Editing
//! happens in an inner [`TextField`] that only accepts digits and shows the
//! number formatted with the mask of the country it resolves to.

use std::any::Any;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use countries::{only_digits, Country};
use serde_json::Value;
use tracing::warn;

use super::text::TextField;
use super::{Field, FieldChange, FieldContext, FieldCore};
use crate::config::{FieldConfig, IgnoreValidate, PlaceholderSource, Transform, ValueSource};
use crate::reactive::Derived;
use crate::validation::{HandlerError, Mask, RuleType, SyncHandler, ValidationRule};
use crate::value::{is_empty, text};

pub const MSG_NO_PHONE: &str = "No phone number";
pub const MSG_INVALID_PHONE: &str = "Invalid phone number";
pub const DEFAULT_PLACEHOLDER: &str = "Phone number";

struct PhoneInner {
    core: Arc<FieldCore>,
    text: TextField,
    /// Set while the formatted number is pushed into the text field, so the
    /// write is not mistaken for typing.
    syncing: AtomicBool,
    last_spaces: AtomicUsize,
    handler: SyncHandler,
    transform: Transform,
}

pub struct PhoneField {
    inner: Arc<PhoneInner>,
    _formatted: Derived<String>,
}

impl PhoneField {
    pub const KIND: &'static str = "phone";

    pub fn new(ctx: FieldContext) -> Self {
        let inner = Arc::new_cyclic(|this: &Weak<PhoneInner>| {
            let handler = {
                let this = this.clone();
                SyncHandler::new(move |value| match this.upgrade() {
                    Some(phone) => phone.check(&text(value)).map_err(HandlerError::validation),
                    None => Ok(()),
                })
            };
            let transform = {
                let this = this.clone();
                Transform::new(move |raw, cursor| match this.upgrade() {
                    Some(phone) => phone.transform(raw, cursor),
                    None => (raw.to_string(), cursor),
                })
            };
            PhoneInner {
                core: FieldCore::new(Self::KIND, ctx.clone()),
                text: TextField::new(ctx),
                syncing: AtomicBool::new(false),
                last_spaces: AtomicUsize::new(0),
                handler,
                transform,
            }
        });

        let formatted = Derived::new(&[inner.core.value(), inner.core.config_cell()], {
            let this = Arc::downgrade(&inner);
            move || this.upgrade().map(|p| p.text_value()).unwrap_or_default()
        });
        inner.push_text(&formatted.get());
        inner.core.retain(formatted.subscribe({
            let this = Arc::downgrade(&inner);
            move |shown| {
                if let Some(phone) = this.upgrade() {
                    phone.push_text(shown);
                }
            }
        }));

        // typing in the text field
        inner.core.retain(inner.text.core().value().subscribe({
            let this = Arc::downgrade(&inner);
            move |typed| {
                if let Some(phone) = this.upgrade() {
                    if !phone.syncing.load(Ordering::SeqCst) {
                        phone.text_value_change(typed);
                    }
                }
            }
        }));

        inner.core.retain(inner.text.focus_events().subscribe({
            let this = Arc::downgrade(&inner);
            move |focused| {
                if let Some(phone) = this.upgrade() {
                    if *focused {
                        phone.core.focus();
                    } else {
                        phone.core.blur();
                        phone.validate_current();
                    }
                }
            }
        }));

        for sub in inner.core.error().bind(inner.text.core().error()) {
            inner.core.retain(sub);
        }

        Self {
            inner,
            _formatted: formatted,
        }
    }

    /// The inner text field, for key events and focus handling.
    pub fn text(&self) -> &TextField {
        &self.inner.text
    }

    /// Country the current number resolves to, or the fallback country.
    pub fn selected_country(&self) -> Country {
        self.inner.selected_country()
    }

    /// The number as shown in the text field.
    pub fn text_value(&self) -> String {
        self.inner.text_value()
    }
}

impl PhoneInner {
    fn countries(&self) -> &dyn countries::CountryLookup {
        self.core.context().countries.as_ref()
    }

    fn allows_null(&self) -> bool {
        self.core.with_config(FieldConfig::allows_null)
    }

    fn selected_country(&self) -> Country {
        let lookup = self.countries();
        let digits = self.core.value().with(text);
        if let Some(country) = lookup.by_phone(&digits) {
            return country.clone();
        }
        let fallback = self.core.with_config(|c| c.phone.default_country.clone());
        match fallback {
            Some(key) => lookup.get(&key).clone(),
            None => lookup.current().clone(),
        }
    }

    fn text_value(&self) -> String {
        let value = self.core.value().get();
        if is_empty(&value) && self.allows_null() {
            return String::new();
        }
        let country = self.selected_country();
        self.countries().format_phone(&text(&value), Some(&country.key))
    }

    fn transform(&self, raw: &str, cursor: usize) -> (String, usize) {
        if self.allows_null() && (raw.is_empty() || raw == "+") {
            return (String::new(), 0);
        }
        let input = if raw == "89" && self.countries().locale() == "ru-RU" {
            "79"
        } else {
            raw
        };
        let country = self.selected_country();
        let formatted = self.countries().format_phone(input, Some(&country.key));
        let grown = formatted.chars().count() as isize - input.chars().count() as isize;
        let cursor = (cursor as isize + grown).max(0) as usize;
        (formatted, cursor)
    }

    fn push_text(&self, shown: &str) {
        self.syncing.store(true, Ordering::SeqCst);
        self.text.core().set_value(Value::String(shown.to_string()));
        self.syncing.store(false, Ordering::SeqCst);
    }

    fn text_value_change(&self, typed: &Value) {
        let digits = Value::String(only_digits(&text(typed)));
        if self.core.value().with(|current| *current == digits) {
            return;
        }
        self.validate(&digits, true);
        self.core.set_value(digits.clone());
        self.core.emit_change(FieldChange::Value(digits));
    }

    fn validate_current(&self) -> bool {
        let value = self.core.value().get();
        self.validate(&value, true)
    }

    /// Length and area checks against the resolved country.
    fn check(&self, number: &str) -> Result<(), &'static str> {
        let digits = only_digits(number);
        let lookup = self.countries();
        let country = lookup
            .by_phone(&digits)
            .cloned()
            .unwrap_or_else(|| self.selected_country());
        if digits.chars().count() != country.phone_length {
            return Err(MSG_INVALID_PHONE);
        }
        if !country.accepts_area(&digits) || country.is_excluded(&digits) {
            return Err(MSG_INVALID_PHONE);
        }
        Ok(())
    }

    /// Messages that repeat get a growing run of trailing spaces (1 to 5,
    /// never the same count twice in a row) so the error cell registers a
    /// new failure.
    fn distinct(&self, message: &str) -> String {
        let repeated = self
            .core
            .error()
            .with(|shown| shown.as_deref().is_some_and(|s| s.trim_end() == message));
        if !repeated {
            return message.to_string();
        }
        let previous = self.last_spaces.load(Ordering::SeqCst);
        let spaces = previous % 5 + 1;
        self.last_spaces.store(spaces, Ordering::SeqCst);
        format!("{message}{}", " ".repeat(spaces))
    }

    fn validate(&self, value: &Value, emit_error: bool) -> bool {
        let set = |error: Option<String>| {
            if emit_error {
                self.core.error().set(error);
            }
        };
        if is_empty(value) {
            if self.allows_null() {
                set(None);
                return true;
            }
            set(Some(MSG_NO_PHONE.to_string()));
            return false;
        }

        let digits = only_digits(&text(value));
        let failure = self.check(&digits).err();
        if emit_error {
            if let Some(message) = failure {
                warn!(field = %self.core.id(), %value, "validation error: {message}");
                self.core.supersede_async_checks();
            }
            set(failure.map(|m| self.distinct(m)));
        }

        let rule = self.core.rule();
        let digits = Value::String(digits);
        if let Some(handler) = rule.as_ref().and_then(|r| r.handler.as_ref()) {
            if let Err(err) = handler.call(&digits) {
                let err = rule.as_ref().map(|r| r.handler_error(err));
                set(err.map(|e| e.message));
                return false;
            }
        }
        if let (true, None, Some(rule)) = (emit_error, failure, rule.as_ref()) {
            self.core.start_async_check(rule, &digits);
        }
        failure.is_none()
    }

    /// Configuration of the inner text field.
    fn text_config(&self, outer: &FieldConfig) -> FieldConfig {
        let mut config = outer.clone();
        config.value = ValueSource::Unset;
        if matches!(config.placeholder, PlaceholderSource::None) {
            config.placeholder = PlaceholderSource::Text(DEFAULT_PLACEHOLDER.to_string());
        }
        config.wrapper_class = Some(String::new());
        config.validate = Some(ValidationRule {
            allow_null: outer.allows_null(),
            handler: Some(self.handler.clone()),
            value_type: Some(RuleType::String),
            ..ValidationRule::default()
        });
        config.text.ignore_validate = IgnoreValidate {
            on_change: true,
            on_blur: true,
        };
        config.text.on_input = true;
        config.text.mask = Mask::new(r"\d").ok();
        config.text.transform = Some(self.transform.clone());
        config.text.input_mode = Some("tel".to_string());
        config
    }
}

impl Field for PhoneField {
    fn core(&self) -> &FieldCore {
        &self.inner.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn set_configuration(&self, config: FieldConfig) -> bool {
        let text_config = self.inner.text_config(&config);
        if !self.inner.core.set_configuration(config) {
            return false;
        }
        self.inner.text.set_configuration(text_config);
        // the text field starts out with whatever the number formats to
        self.inner.push_text(&self.inner.text_value());
        true
    }

    fn validate(&self, value: &Value, emit_error: bool) -> bool {
        self.inner.validate(value, emit_error)
    }

    fn focus(&self) {
        self.inner.text.on_focus();
    }

    fn blur(&self) {
        self.inner.text.on_blur();
    }

    fn teardown(&self) {
        self.inner.text.teardown();
        self.inner.core.teardown();
    }
}
