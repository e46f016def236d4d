//! Single-line text input.
//!
//! The edit buffer is a [`tui_input::Input`]; the host feeds it key events
//! through [`TextField::handle_key`] (or whole strings through
//! [`TextField::input_text`]) and reports focus changes. The pipeline is the
//! one of a browser text input:
//!
//! * key down: masked characters are rejected before they reach the buffer
//! * input: upper-casing, transform hook, optional validate-and-commit
//! * change (Enter, or the host committing): whitespace collapse, commit,
//!   validation, change event
//! * blur: validation

use std::any::Any;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crossterm::event::{Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use serde_json::Value;
use tracing::trace;
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;

use super::{Field, FieldChange, FieldContext, FieldCore};
use crate::config::FieldConfig;
use crate::reactive::{Cell, Emitter};
use crate::validation::{format_bound, RuleType};
use crate::value::text;

/// Character limit when the rule sets no maximum.
pub const DEFAULT_MAX_CHARS: usize = 500;

/// Outcome of [`TextField::on_key_down`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum KeyVerdict {
    /// Control key or chord; masking does not apply.
    Pass,
    Accept,
    Reject,
}

impl KeyVerdict {
    pub fn allows(self) -> bool {
        self != KeyVerdict::Reject
    }
}

pub struct TextField {
    core: Arc<FieldCore>,
    buffer: Arc<Mutex<Input>>,
    all_selected: Cell<bool>,
    inputs: Emitter<String>,
    focus_events: Emitter<bool>,
    enter: Emitter<()>,
}

impl TextField {
    pub const KIND: &'static str = "text";

    pub fn new(ctx: FieldContext) -> Self {
        let core = FieldCore::new(Self::KIND, ctx);
        let buffer = Arc::new(Mutex::new(Input::default()));

        // programmatic writes show up in the buffer; typing does not reset it
        let follow = {
            let buffer = Arc::downgrade(&buffer);
            core.value().subscribe(move |value| {
                if let Some(buffer) = buffer.upgrade() {
                    let shown = text(value);
                    let mut input = buffer.lock().unwrap_or_else(PoisonError::into_inner);
                    if input.value() != shown {
                        *input = Input::new(shown);
                    }
                }
            })
        };
        core.retain(follow);

        Self {
            core,
            buffer,
            all_selected: Cell::new(false),
            inputs: Emitter::new(),
            focus_events: Emitter::new(),
            enter: Emitter::new(),
        }
    }

    fn buffer(&self) -> MutexGuard<'_, Input> {
        self.buffer.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current buffer content (not necessarily committed).
    pub fn buffer_text(&self) -> String {
        self.buffer().value().to_string()
    }

    pub fn cursor(&self) -> usize {
        self.buffer().cursor()
    }

    pub fn all_selected(&self) -> &Cell<bool> {
        &self.all_selected
    }

    /// Raw input events, after upper-casing and transform.
    pub fn inputs(&self) -> &Emitter<String> {
        &self.inputs
    }

    /// `true` on focus, `false` on blur.
    pub fn focus_events(&self) -> &Emitter<bool> {
        &self.focus_events
    }

    pub fn enter_pressed(&self) -> &Emitter<()> {
        &self.enter
    }

    /// Longest text the buffer accepts: the digit count of `max` with
    /// `limit_chars`, `max` itself otherwise.
    pub fn max_chars(&self) -> usize {
        self.core.with_config(|c| {
            let max = c.validate.as_ref().and_then(|r| r.max).filter(|m| *m > 0.0);
            match max {
                Some(max) if c.text.limit_chars => format_bound(max).chars().count(),
                Some(max) => max as usize,
                None => DEFAULT_MAX_CHARS,
            }
        })
    }

    /// Whether a key may reach the buffer.
    pub fn on_key_down(&self, key: &KeyEvent) -> KeyVerdict {
        if key
            .modifiers
            .intersects(KeyModifiers::CONTROL | KeyModifiers::SUPER | KeyModifiers::META)
        {
            return KeyVerdict::Pass;
        }
        let KeyCode::Char(c) = key.code else {
            return KeyVerdict::Pass;
        };
        let mask = self.core.with_config(|cfg| cfg.text.mask.clone());
        match mask {
            Some(mask) if !mask.is_match(c.encode_utf8(&mut [0; 4])) => KeyVerdict::Reject,
            _ => KeyVerdict::Accept,
        }
    }

    /// Feed a key press through the whole pipeline.
    pub fn handle_key(&self, key: KeyEvent) -> KeyVerdict {
        if key.kind == KeyEventKind::Release {
            return KeyVerdict::Pass;
        }
        let verdict = self.on_key_down(&key);
        if !verdict.allows() {
            trace!(field = %self.core.id(), ?key, "key rejected by mask");
            return verdict;
        }
        if key.code == KeyCode::Enter {
            self.on_change();
            self.enter.emit(&());
            return verdict;
        }
        if verdict == KeyVerdict::Accept && self.buffer().value().chars().count() >= self.max_chars() {
            return KeyVerdict::Reject;
        }

        let changed = {
            let mut buffer = self.buffer();
            if self.all_selected.get() && matches!(key.code, KeyCode::Char(_) | KeyCode::Backspace) {
                *buffer = Input::default();
            }
            buffer.handle_event(&Event::Key(key))
        };
        self.all_selected.set(false);
        if changed.is_some_and(|state| state.value) {
            self.on_input();
        }
        verdict
    }

    /// Replace the buffer (paste, autofill) and run the input pipeline.
    pub fn input_text(&self, text: &str) {
        let limited: String = text.chars().take(self.max_chars()).collect();
        *self.buffer() = Input::new(limited);
        self.all_selected.set(false);
        self.on_input();
    }

    pub fn on_input(&self) {
        let (upper_case, transform, on_input) = self
            .core
            .with_config(|c| (c.text.upper_case, c.text.transform.clone(), c.text.on_input));

        let new_text = {
            let mut buffer = self.buffer();
            if upper_case {
                let cursor = buffer.cursor();
                *buffer = Input::new(buffer.value().to_uppercase()).with_cursor(cursor);
            }
            if let Some(transform) = transform {
                let (text, cursor) = transform.apply(buffer.value(), buffer.cursor());
                let cursor = cursor.min(text.chars().count());
                *buffer = Input::new(text).with_cursor(cursor);
            }
            buffer.value().to_string()
        };

        let new_value = Value::String(new_text.clone());
        if on_input || self.core.error().with(Option::is_some) {
            self.validate(&new_value, true);
        }
        self.inputs.emit(&new_text);
        if on_input {
            self.core.set_value(new_value);
        }
    }

    /// Commit the buffer: collapse whitespace, store, validate, report.
    pub fn on_change(&self) {
        let (keep_inner, ignore) = self
            .core
            .with_config(|c| (c.text.no_trim_inside, c.text.ignore_validate.on_change));
        let raw = self.buffer_text();
        let committed = if keep_inner {
            raw.trim().to_string()
        } else {
            raw.split_whitespace().collect::<Vec<_>>().join(" ")
        };
        let new_value = Value::String(committed);
        self.core.set_value(new_value.clone());

        if ignore {
            return;
        }
        self.validate(&new_value, true);
        self.core.emit_change(FieldChange::Value(new_value));
    }

    pub fn on_focus(&self) {
        self.core.focus();
        self.focus_events.emit(&true);
    }

    pub fn on_blur(&self) {
        self.core.blur();
        self.all_selected.set(false);
        self.focus_events.emit(&false);
        if self.core.with_config(|c| c.text.ignore_validate.on_blur) {
            return;
        }
        self.validate_current(true);
    }

    /// Focus after [`Timing::focus_ms`](crate::schedule::Timing).
    pub fn set_focus(&self) {
        let core = Arc::downgrade(&self.core);
        let events = self.focus_events.clone();
        self.core.context().scheduler.after(
            self.core.context().timing.focus(),
            Box::new(move || {
                if let Some(core) = core.upgrade().filter(|c| !c.is_torn_down()) {
                    core.focus();
                    events.emit(&true);
                }
            }),
        );
    }

    /// Select the whole buffer after [`Timing::focus_ms`](crate::schedule::Timing);
    /// the next edit replaces it.
    pub fn select_all(&self) {
        let core = Arc::downgrade(&self.core);
        let selected = self.all_selected.downgrade();
        self.core.context().scheduler.after(
            self.core.context().timing.focus(),
            Box::new(move || {
                let alive = core.upgrade().is_some_and(|c| !c.is_torn_down());
                if let (true, Some(selected)) = (alive, selected.upgrade()) {
                    selected.set(true);
                }
            }),
        );
    }
}

impl Field for TextField {
    fn core(&self) -> &FieldCore {
        &self.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    /// Rules without an explicit type measure text by length.
    fn set_configuration(&self, mut config: FieldConfig) -> bool {
        if let Some(rule) = config.validate.as_mut() {
            rule.value_type.get_or_insert(RuleType::String);
        }
        let first = !self.core.is_configured();
        let applied = self.core.set_configuration(config);
        if applied && first {
            self.mount();
        }
        applied
    }

    fn mount(&self) {
        self.core.mount();
        let (autofocus, select_all) = self.core.with_config(|c| (c.autofocus, c.text.select_all));
        if autofocus {
            self.set_focus();
        }
        if select_all {
            self.select_all();
        }
    }

    fn focus(&self) {
        self.on_focus();
    }

    fn blur(&self) {
        self.on_blur();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Transform;
    use crate::field::tests::context;
    use crate::validation::{Mask, ValidationRule};
    use serde_json::json;
    use std::time::Duration;

    fn field(config: FieldConfig) -> (TextField, crate::schedule::ManualScheduler) {
        let (ctx, scheduler) = context();
        let field = TextField::new(ctx);
        field.set_configuration(config);
        (field, scheduler)
    }

    fn key(c: char) -> KeyEvent {
        KeyEvent::new(KeyCode::Char(c), KeyModifiers::NONE)
    }

    fn type_str(field: &TextField, s: &str) {
        for c in s.chars() {
            field.handle_key(key(c));
        }
    }

    #[test]
    fn mask_rejects_characters_but_not_control_keys() {
        let mut config = FieldConfig::new();
        config.text.mask = Some(Mask::new(r"\d").unwrap());
        let (field, _) = field(config);

        assert_eq!(field.on_key_down(&key('5')), KeyVerdict::Accept);
        assert_eq!(field.on_key_down(&key('a')), KeyVerdict::Reject);
        for code in [KeyCode::Backspace, KeyCode::Tab, KeyCode::Enter, KeyCode::Left, KeyCode::Up] {
            assert_eq!(field.on_key_down(&KeyEvent::new(code, KeyModifiers::NONE)), KeyVerdict::Pass);
        }
        let paste = KeyEvent::new(KeyCode::Char('v'), KeyModifiers::CONTROL);
        assert_eq!(field.on_key_down(&paste), KeyVerdict::Pass);

        type_str(&field, "1a2");
        assert_eq!(field.buffer_text(), "12");
    }

    #[test]
    fn rule_type_defaults_to_string() {
        let (field, _) = field(FieldConfig::new().validate(ValidationRule::required().max(3.0)));
        let rule = field.core().rule().unwrap();
        assert_eq!(rule.value_type, Some(RuleType::String));
        // "12345" is too long even though it reads as a number
        assert!(!field.validate(&json!("12345"), false));
        // the defaulted type does not make an equal configuration look new
        let epoch = field.core().config_epoch();
        assert!(!field.set_configuration(FieldConfig::new().validate(ValidationRule::required().max(3.0))));
        assert_eq!(field.core().config_epoch(), epoch);
    }

    #[test]
    fn change_collapses_whitespace_and_emits() {
        let (field, _) = field(FieldConfig::new().validate(ValidationRule::required()));
        let seen = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let seen = seen.clone();
            field.changes().subscribe(move |c: &FieldChange| seen.lock().unwrap().push(c.clone()))
        };
        field.input_text("  Pepperoni   with   extra  cheese ");
        field.on_change();

        assert_eq!(field.value(), json!("Pepperoni with extra cheese"));
        assert_eq!(
            *seen.lock().unwrap(),
            vec![FieldChange::Value(json!("Pepperoni with extra cheese"))]
        );
    }

    #[test]
    fn no_trim_inside_keeps_inner_runs() {
        let mut config = FieldConfig::new();
        config.text.no_trim_inside = true;
        let (field, _) = field(config);
        field.input_text(" a  b ");
        field.on_change();
        assert_eq!(field.value(), json!("a  b"));
    }

    #[test]
    fn ignored_change_validation_commits_silently() {
        let mut config = FieldConfig::new().validate(ValidationRule::required());
        config.text.ignore_validate.on_change = true;
        let (field, _) = field(config);
        let count = Arc::new(Mutex::new(0));
        let _sub = {
            let count = count.clone();
            field.changes().subscribe(move |_| *count.lock().unwrap() += 1)
        };
        field.on_change();
        assert_eq!(field.value(), json!(""));
        assert_eq!(field.error(), None);
        assert_eq!(*count.lock().unwrap(), 0);
    }

    #[test]
    fn input_revalidates_once_an_error_is_showing() {
        let (field, _) = field(FieldConfig::new().validate(ValidationRule::required().min(3.0)));
        field.input_text("ab");
        // no on_input and no error yet: typing does not validate
        assert_eq!(field.error(), None);
        field.on_blur();
        assert_eq!(field.error(), Some("Required field".into()));

        field.input_text("abc");
        assert_eq!(field.error(), None);
        // not committed without on_input
        assert_eq!(field.value(), Value::Null);
    }

    #[test]
    fn on_input_commits_every_keystroke() {
        let mut config = FieldConfig::new().validate(ValidationRule::required().min(2.0));
        config.text.on_input = true;
        let (field, _) = field(config);
        type_str(&field, "a");
        assert_eq!(field.value(), json!("a"));
        assert_eq!(field.error(), Some("Minimum 2".into()));
        type_str(&field, "b");
        assert_eq!(field.value(), json!("ab"));
        assert_eq!(field.error(), None);
    }

    #[test]
    fn upper_case_and_transform_rewrite_buffer() {
        let mut config = FieldConfig::new();
        config.text.upper_case = true;
        config.text.transform = Some(Transform::new(|text, cursor| {
            (format!("#{}", text.trim_start_matches('#')), cursor + 1)
        }));
        let (field, _) = field(config);
        field.input_text("ab");
        assert_eq!(field.buffer_text(), "#AB");
        assert_eq!(field.cursor(), 3);
    }

    #[test]
    fn max_chars_follows_rule() {
        let (plain, _) = field(FieldConfig::new());
        assert_eq!(plain.max_chars(), DEFAULT_MAX_CHARS);

        let (bounded, _) = field(FieldConfig::new().validate(ValidationRule::required().max(20.0)));
        assert_eq!(bounded.max_chars(), 20);

        let mut config = FieldConfig::new().validate(ValidationRule::required().max(99.0));
        config.text.limit_chars = true;
        let (limited, _) = field(config);
        assert_eq!(limited.max_chars(), 2);
        type_str(&limited, "123");
        assert_eq!(limited.buffer_text(), "12");
    }

    #[test]
    fn enter_commits_and_notifies() {
        let (field, _) = field(FieldConfig::new());
        let pressed = Arc::new(Mutex::new(0));
        let _sub = {
            let pressed = pressed.clone();
            field.enter_pressed().subscribe(move |_| *pressed.lock().unwrap() += 1)
        };
        type_str(&field, "hi");
        field.handle_key(KeyEvent::new(KeyCode::Enter, KeyModifiers::NONE));
        assert_eq!(field.value(), json!("hi"));
        assert_eq!(*pressed.lock().unwrap(), 1);
    }

    #[test]
    fn external_value_shows_in_buffer() {
        let (field, _) = field(FieldConfig::new().value(json!(42)));
        assert_eq!(field.buffer_text(), "42");
        field.set_value(json!("Main street 1"));
        assert_eq!(field.buffer_text(), "Main street 1");
    }

    #[test]
    fn select_all_is_replaced_by_next_keystroke() {
        let mut config = FieldConfig::new().value(json!("old"));
        config.text.select_all = true;
        let (field, scheduler) = field(config);
        scheduler.advance(Duration::from_millis(200));
        assert!(field.all_selected().get());
        field.handle_key(key('n'));
        assert_eq!(field.buffer_text(), "n");
    }

    #[test]
    fn autofocus_requests_focus() {
        let mut config = FieldConfig::new();
        config.autofocus = true;
        let (field, scheduler) = field(config);
        let focused = Arc::new(Mutex::new(Vec::new()));
        let _sub = {
            let focused = focused.clone();
            field.focus_events().subscribe(move |f: &bool| focused.lock().unwrap().push(*f))
        };
        scheduler.advance(Duration::from_millis(200));
        assert!(field.core().focused().get());
        assert_eq!(*focused.lock().unwrap(), vec![true]);
    }
}
