//! Declarative form definitions.
//!
//! A definition is a JSON5 document with the presentation of the form and
//! its items in display order:
//!
//! ```json5
//! {
//!   form: { grid_group: [1, 1], title: { text: "Delivery" } },
//!   items: {
//!     name:  { type: "text", config: { label: "Name", validate: { min: 2 } } },
//!     phone: { type: "phone", config: { label: "Phone" } },
//!   },
//! }
//! ```
//!
//! Handlers, transforms and bound cells cannot be expressed here; attach
//! them to the parsed items before building the form.

use serde::Deserialize;

use super::{FormConfig, ItemConfig, Items};
use crate::errors::FormError;

#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct FormSchema {
    pub form: FormConfig,
    pub items: Items,
}

impl FormSchema {
    pub fn from_json5(source: &str) -> Result<Self, FormError> {
        Ok(json5::from_str(source)?)
    }

    pub fn item(&self, key: &str) -> Option<&ItemConfig> {
        self.items.get(key)
    }

    pub fn item_mut(&mut self, key: &str) -> Option<&mut ItemConfig> {
        self.items.get_mut(key)
    }

    pub fn field_count(&self) -> usize {
        self.items.len()
    }

    pub fn into_parts(self) -> (FormConfig, Items) {
        (self.form, self.items)
    }
}
