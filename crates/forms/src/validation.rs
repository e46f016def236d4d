//! Validation rules and their evaluation.
//!
//! [`ValidationRule::evaluate`] runs the synchronous checks in a fixed order
//! and stops at the first failure:
//!
//! 1. empty value with `allow_null`: pass
//! 2. empty value without `allow_null`: [`ErrorKind::Required`]
//! 3. type: `value_type` if set, otherwise numeric when the value reads as a
//!    finite number, length-based otherwise
//! 4. `min` (value or length)
//! 5. `max` (value or length)
//! 6. `mask`
//! 7. `handler`
//!
//! The async handler is not part of evaluation; the owning field fires it
//! after the synchronous checks pass (see `FieldCore::validate`), and the
//! handler reports through an [`ErrorSink`].

use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use strum::{Display, EnumString};
use thiserror::Error;
use tracing::error;

use crate::errors::FormError;
use crate::reactive::{structural_eq_via_partial_eq, Cell};
use crate::value::{as_number, deep_equal, is_empty, length, text};

pub const MSG_REQUIRED: &str = "Required field";
pub const MSG_UNKNOWN: &str = "Unknown error";

/// How bounds are applied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum RuleType {
    /// Bounds apply to the length.
    String,
    /// Bounds apply to the numeric value.
    Number,
    /// Bounds do not apply.
    Boolean,
}

#[derive(Clone, Debug, PartialEq)]
pub enum ErrorKind {
    Required,
    Min,
    Max,
    Mask,
    /// Raised by a handler, carries the handler's message.
    Custom(String),
    /// A handler failed for a reason other than validation.
    Unexpected,
}

#[derive(Clone, Debug, PartialEq, Error)]
#[error("{message}")]
pub struct ValidationError {
    pub kind: ErrorKind,
    pub message: String,
}

/// Failure reported by a custom handler.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Shown to the user verbatim.
    #[error("{0}")]
    Validation(String),
    /// Logged; the user sees [`MSG_UNKNOWN`].
    #[error(transparent)]
    Unexpected(#[from] anyhow::Error),
}

impl HandlerError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }
}

type HandlerFn = dyn Fn(&Value) -> Result<(), HandlerError> + Send + Sync;

/// Synchronous custom check.
#[derive(Clone)]
pub struct SyncHandler(Arc<HandlerFn>);

impl SyncHandler {
    pub fn new(f: impl Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self, value: &Value) -> Result<(), HandlerError> {
        (self.0)(value)
    }
}

impl PartialEq for SyncHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for SyncHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("SyncHandler")
    }
}

type AsyncHandlerFn = dyn Fn(Value, ErrorSink) -> BoxFuture<'static, ()> + Send + Sync;

/// Asynchronous custom check. It receives the validated value and a sink
/// to report into once it is done.
#[derive(Clone)]
pub struct AsyncHandler(Arc<AsyncHandlerFn>);

impl AsyncHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(Value, ErrorSink) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self(Arc::new(move |value, sink| f(value, sink).boxed()))
    }

    /// Handler whose future returns the outcome; the outcome is written to
    /// the sink the same way a synchronous handler's would be.
    pub fn checked<F, Fut>(f: F) -> Self
    where
        F: Fn(Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), HandlerError>> + Send + 'static,
    {
        let f = Arc::new(f);
        Self::new(move |value, sink: ErrorSink| {
            let f = f.clone();
            async move {
                match f(value).await {
                    Ok(()) => {
                        sink.clear();
                    }
                    Err(HandlerError::Validation(message)) => {
                        sink.fail(message);
                    }
                    Err(HandlerError::Unexpected(err)) => {
                        error!(field = %sink.field_id(), "async validation failed: {err:?}");
                        sink.fail(MSG_UNKNOWN);
                    }
                }
            }
        })
    }

    pub fn call(&self, value: Value, sink: ErrorSink) -> BoxFuture<'static, ()> {
        (self.0)(value, sink)
    }
}

impl PartialEq for AsyncHandler {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for AsyncHandler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AsyncHandler")
    }
}

/// Where an async handler reports its result.
///
/// Each sink is stamped with the generation of the check that created it and
/// the value it checked. A report is dropped when a newer check has been
/// issued since, or when the field no longer holds the checked value.
#[derive(Clone)]
pub struct ErrorSink {
    field_id: String,
    error: Cell<Option<String>>,
    value: Cell<Value>,
    generation: Arc<AtomicU64>,
    stamp: u64,
    checked: Value,
}

impl ErrorSink {
    pub(crate) fn new(
        field_id: String,
        error: Cell<Option<String>>,
        value: Cell<Value>,
        generation: Arc<AtomicU64>,
        checked: Value,
    ) -> Self {
        let stamp = generation.fetch_add(1, Ordering::SeqCst) + 1;
        Self {
            field_id,
            error,
            value,
            generation,
            stamp,
            checked,
        }
    }

    pub fn field_id(&self) -> &str {
        &self.field_id
    }

    /// The value this check was issued for.
    pub fn checked_value(&self) -> &Value {
        &self.checked
    }

    pub fn is_current(&self) -> bool {
        self.generation.load(Ordering::SeqCst) == self.stamp
            && self.value.with(|current| deep_equal(current, &self.checked))
    }

    /// Write the outcome. Returns `false` when the report was stale.
    pub fn set(&self, error: Option<String>) -> bool {
        if !self.is_current() {
            tracing::debug!(field = %self.field_id, "discarding stale async validation result");
            return false;
        }
        self.error.set(error);
        true
    }

    pub fn fail(&self, message: impl Into<String>) -> bool {
        self.set(Some(message.into()))
    }

    pub fn clear(&self) -> bool {
        self.set(None)
    }
}

impl fmt::Debug for ErrorSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ErrorSink")
            .field("field_id", &self.field_id)
            .field("stamp", &self.stamp)
            .finish()
    }
}

/// Regex a value must match, kept as its source text for (de)serialization.
#[derive(Clone, Debug)]
pub struct Mask(Regex);

impl Mask {
    pub fn new(pattern: &str) -> Result<Self, FormError> {
        Regex::new(pattern)
            .map(Self)
            .map_err(|source| FormError::InvalidMask {
                pattern: pattern.to_string(),
                source,
            })
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.0.is_match(text)
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl PartialEq for Mask {
    fn eq(&self, other: &Self) -> bool {
        self.as_str() == other.as_str()
    }
}

impl fmt::Display for Mask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "/{}/", self.as_str())
    }
}

impl Serialize for Mask {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Mask {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let pattern = String::deserialize(deserializer)?;
        Mask::new(&pattern).map_err(serde::de::Error::custom)
    }
}

/// Per-kind message overrides. `{min}`, `{max}` and `{mask}` are replaced
/// with the rule's bounds.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Messages {
    pub required: Option<String>,
    pub min: Option<String>,
    pub max: Option<String>,
    pub mask: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationRule {
    pub allow_null: bool,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub mask: Option<Mask>,
    #[serde(skip)]
    pub handler: Option<SyncHandler>,
    #[serde(skip)]
    pub async_handler: Option<AsyncHandler>,
    pub messages: Messages,
    #[serde(rename = "type")]
    pub value_type: Option<RuleType>,
}

structural_eq_via_partial_eq!(ValidationRule);

impl ValidationRule {
    pub fn required() -> Self {
        Self::default()
    }

    pub fn optional() -> Self {
        Self {
            allow_null: true,
            ..Self::default()
        }
    }

    pub fn min(mut self, min: f64) -> Self {
        self.min = Some(min);
        self
    }

    pub fn max(mut self, max: f64) -> Self {
        self.max = Some(max);
        self
    }

    pub fn mask(mut self, mask: Mask) -> Self {
        self.mask = Some(mask);
        self
    }

    pub fn value_type(mut self, value_type: RuleType) -> Self {
        self.value_type = Some(value_type);
        self
    }

    pub fn handler(
        mut self,
        f: impl Fn(&Value) -> Result<(), HandlerError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(SyncHandler::new(f));
        self
    }

    pub fn async_handler(mut self, handler: AsyncHandler) -> Self {
        self.async_handler = Some(handler);
        self
    }

    pub fn messages(mut self, messages: Messages) -> Self {
        self.messages = messages;
        self
    }

    /// Synchronous checks, first failure wins.
    pub fn evaluate(&self, value: &Value) -> Result<(), ValidationError> {
        if is_empty(value) {
            return if self.allow_null {
                Ok(())
            } else {
                Err(self.error(ErrorKind::Required))
            };
        }

        match self.effective_type(value) {
            RuleType::Number => {
                // a value that does not read as a number cannot be compared
                if let Some(number) = as_number(value) {
                    if self.min.is_some_and(|min| number < min) {
                        return Err(self.error(ErrorKind::Min));
                    }
                    if self.max.is_some_and(|max| number > max) {
                        return Err(self.error(ErrorKind::Max));
                    }
                }
            }
            RuleType::String => {
                let len = length(value) as f64;
                if self.min.is_some_and(|min| len < min) {
                    return Err(self.error(ErrorKind::Min));
                }
                if self.max.is_some_and(|max| len > max) {
                    return Err(self.error(ErrorKind::Max));
                }
            }
            RuleType::Boolean => {}
        }

        if let Some(mask) = &self.mask {
            if !mask.is_match(&text(value)) {
                return Err(self.error(ErrorKind::Mask));
            }
        }

        if let Some(handler) = &self.handler {
            return handler.call(value).map_err(|err| self.handler_error(err));
        }

        Ok(())
    }

    pub fn effective_type(&self, value: &Value) -> RuleType {
        if let Some(value_type) = self.value_type {
            return value_type;
        }
        match value {
            Value::Array(_) | Value::Object(_) => RuleType::String,
            Value::Bool(_) => RuleType::Boolean,
            other if as_number(other).is_some() => RuleType::Number,
            _ => RuleType::String,
        }
    }

    /// Map a handler failure onto the taxonomy, logging unexpected ones.
    pub fn handler_error(&self, err: HandlerError) -> ValidationError {
        match err {
            HandlerError::Validation(message) => ValidationError {
                kind: ErrorKind::Custom(message.clone()),
                message,
            },
            HandlerError::Unexpected(err) => {
                error!("validation handler failed: {err:?}");
                self.error(ErrorKind::Unexpected)
            }
        }
    }

    pub fn error(&self, kind: ErrorKind) -> ValidationError {
        let message = self.message(&kind);
        ValidationError { kind, message }
    }

    fn message(&self, kind: &ErrorKind) -> String {
        let bound = |b: Option<f64>| b.map(format_bound).unwrap_or_default();
        let mask = self.mask.as_ref().map(ToString::to_string).unwrap_or_default();
        let fill = |template: &str| {
            template
                .replace("{min}", &bound(self.min))
                .replace("{max}", &bound(self.max))
                .replace("{mask}", &mask)
        };
        match kind {
            ErrorKind::Required => self
                .messages
                .required
                .clone()
                .unwrap_or_else(|| MSG_REQUIRED.to_string()),
            ErrorKind::Min => fill(self.messages.min.as_deref().unwrap_or("Minimum {min}")),
            ErrorKind::Max => fill(self.messages.max.as_deref().unwrap_or("Maximum {max}")),
            ErrorKind::Mask => fill(
                self.messages
                    .mask
                    .as_deref()
                    .unwrap_or("Invalid format {mask}"),
            ),
            ErrorKind::Custom(message) => message.clone(),
            ErrorKind::Unexpected => MSG_UNKNOWN.to_string(),
        }
    }
}

/// `3` rather than `3.0` for whole bounds.
pub(crate) fn format_bound(bound: f64) -> String {
    if bound.fract() == 0.0 && bound.abs() < 1e15 {
        format!("{}", bound as i64)
    } else {
        bound.to_string()
    }
}
