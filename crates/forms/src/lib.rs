//! Dynamic form engine.
//!
//! A form is described as an ordered map of field name to field kind and
//! configuration ([`form::Items`]). The [`form::Form`] orchestrator builds
//! one controller per entry through a [`form::FieldRegistry`], forwards
//! their change events and answers aggregate questions (is it valid, what
//! changed, ...).
//!
//! Fields keep their state in observable [`reactive::Cell`]s and validate
//! through [`validation::ValidationRule`]. Timers and async validation go
//! through an injected [`schedule::Scheduler`], the country dictionary
//! through [`countries::CountryLookup`].

pub mod config;
pub mod dropdown;
pub mod errors;
pub mod field;
pub mod form;
pub mod reactive;
pub mod schedule;
pub mod validation;
pub mod value;

pub use config::{FieldConfig, PlaceholderSource, ValueSource};
pub use errors::FormError;
pub use field::{Field, FieldChange, FieldContext, SelectOption, Translator};
pub use form::{FieldRegistry, Form, FormChange, FormConfig, FormSchema, ItemConfig, Items};
pub use reactive::{Cell, Derived, Emitter, StructuralEq, Subscription};
pub use schedule::{ManualScheduler, Scheduler, Timing, TokioScheduler};
pub use validation::{AsyncHandler, ErrorKind, ErrorSink, HandlerError, Mask, RuleType, ValidationRule};
