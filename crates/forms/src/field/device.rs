//! QA device picker: a multiselect over the shared device catalog whose
//! public value is the array of selected device records.

use std::any::Any;
use std::sync::{Arc, Weak};

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::debug;

use super::multiselect::MultiselectField;
use super::options::SelectOption;
use super::{Field, FieldContext, FieldCore};
use crate::config::{FieldConfig, GroupTitles, ValueSource};
use crate::errors::FormError;
use crate::reactive::Emitter;

pub const DEVICE_OPTION_CLASS: &str = "qa-device-option";
pub const ADD_DEVICE_LABEL: &str = "common.addDevice";

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum DeviceKind {
    Phone,
    Tablet,
    Laptop,
    Desktop,
    Tv,
    Watch,
    #[default]
    Other,
}

impl DeviceKind {
    /// Translation key of the group title.
    pub fn title(self) -> String {
        format!("device.type.{self}")
    }

    pub fn icon(self) -> &'static str {
        match self {
            DeviceKind::Phone => "smartphone",
            DeviceKind::Tablet => "tablet",
            DeviceKind::Laptop => "laptop",
            DeviceKind::Desktop => "desktop_windows",
            DeviceKind::Tv => "tv",
            DeviceKind::Watch => "watch",
            DeviceKind::Other => "devices",
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Device {
    #[serde(rename = "ID")]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: DeviceKind,
    pub vendor: String,
    pub model: String,
    pub os: String,
    pub screen_w: Option<u32>,
    pub screen_h: Option<u32>,
}

impl Device {
    pub fn option(&self) -> SelectOption {
        let screen = match (self.screen_w, self.screen_h) {
            (Some(w), Some(h)) if w > 0 && h > 0 => format!(" [{w} x {h}]"),
            _ => String::new(),
        };
        SelectOption {
            value: Value::String(self.id.clone()),
            group: Some(self.kind.title()),
            search_field: Some(format!("{} {} {}", self.vendor, self.model, self.os)),
            checkbox_icon: true,
            icon: Some(self.kind.icon().to_string()),
            icon_color: Some("secondary".into()),
            icon_size: Some(16),
            text: Some(self.model.clone()),
            text_before: Some(self.vendor.clone()),
            text_after: Some(format!("{}{screen}", self.os)),
            css_class: Some(DEVICE_OPTION_CLASS.into()),
            ..SelectOption::default()
        }
    }
}

/// Read-only device dictionary, in catalog order.
#[derive(Clone, Debug, Default)]
pub struct DeviceCatalog {
    devices: IndexMap<String, Device>,
}

impl DeviceCatalog {
    pub fn new(devices: impl IntoIterator<Item = Device>) -> Self {
        Self {
            devices: devices.into_iter().map(|d| (d.id.clone(), d)).collect(),
        }
    }

    /// Either a list of devices or a map keyed by id; `null` entries are
    /// skipped.
    pub fn from_json(json: &str) -> Result<Self, FormError> {
        let raw: Value = serde_json::from_str(json)?;
        let entries = match raw {
            Value::Object(map) => map.into_iter().map(|(_, v)| v).collect(),
            Value::Array(items) => items,
            Value::Null => Vec::new(),
            other => {
                return Err(FormError::Field {
                    key: "devices".into(),
                    message: format!("expected a list or map of devices, got {other}"),
                })
            }
        };
        let devices = entries
            .into_iter()
            .filter(|v| !v.is_null())
            .map(serde_json::from_value)
            .collect::<Result<Vec<Device>, _>>()?;
        Ok(Self::new(devices))
    }

    pub fn len(&self) -> usize {
        self.devices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Device> {
        self.devices.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Device> {
        self.devices.values()
    }

    pub fn options(&self) -> Vec<SelectOption> {
        self.iter().map(Device::option).collect()
    }

    /// Devices whose id is in `ids`, in catalog order.
    pub fn select(&self, ids: &[String]) -> Vec<Device> {
        self.iter().filter(|d| ids.contains(&d.id)).cloned().collect()
    }
}

/// Ids of a device array; bare id strings are accepted too.
fn device_ids(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(id) => Some(id.clone()),
                Value::Object(map) => map.get("ID").and_then(Value::as_str).map(str::to_string),
                _ => None,
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn devices_value(devices: &[Device]) -> Value {
    Value::Array(
        devices
            .iter()
            .filter_map(|d| serde_json::to_value(d).ok())
            .collect(),
    )
}

struct DeviceInner {
    core: Arc<FieldCore>,
    multiselect: MultiselectField,
    add_requested: Emitter<()>,
}

pub struct DeviceField {
    inner: Arc<DeviceInner>,
}

impl DeviceField {
    pub const KIND: &'static str = "device";

    pub fn new(ctx: FieldContext) -> Self {
        let core = FieldCore::new(Self::KIND, ctx.clone());
        let multiselect = MultiselectField::new(ctx);
        let inner = Arc::new(DeviceInner {
            core,
            multiselect,
            add_requested: Emitter::new(),
        });

        let weak = Arc::downgrade(&inner);
        let core = &inner.core;
        core.retain(core.value().subscribe({
            let weak = weak.clone();
            move |value| push_ids(&weak, value)
        }));
        core.retain(inner.multiselect.core().value().subscribe({
            let weak = weak.clone();
            move |ids| pull_devices(&weak, ids)
        }));
        core.retain(inner.multiselect.changes().subscribe({
            let weak = weak.clone();
            move |change| {
                if let Some(inner) = weak.upgrade() {
                    inner.core.emit_change(change.clone());
                }
            }
        }));
        core.retain(inner.multiselect.add_clicked().subscribe(move |_| {
            if let Some(inner) = weak.upgrade() {
                debug!(field = %inner.core.id(), "add device requested");
                inner.add_requested.emit(&());
            }
        }));
        for sub in core.error().bind(inner.multiselect.core().error()) {
            core.retain(sub);
        }

        Self { inner }
    }

    pub fn multiselect(&self) -> &MultiselectField {
        &self.inner.multiselect
    }

    /// Selected devices, as records.
    pub fn devices(&self) -> Vec<Device> {
        let ids = device_ids(&self.value());
        ids.iter()
            .filter_map(|id| self.inner.core.context().devices.get(id).cloned())
            .collect()
    }

    /// The host should open its device editor.
    pub fn add_device_requested(&self) -> &Emitter<()> {
        &self.inner.add_requested
    }

    fn multiselect_config(&self, outer: &FieldConfig) -> FieldConfig {
        let mut config = outer.clone();
        config.value = ValueSource::Unset;
        config.select.options = self.inner.core.context().devices.options();
        config.select.options_source = None;
        config.select.option_class = Some(DEVICE_OPTION_CLASS.into());
        config.select.no_default_selection = true;
        config.select.no_search = true;
        config.select.show_add_button = Some(ADD_DEVICE_LABEL.into());
        config.select.group_titles = GroupTitles::Separator;
        config
    }
}

/// Device records changed: hand the id list to the multiselect.
fn push_ids(inner: &Weak<DeviceInner>, value: &Value) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let ids = device_ids(value);
    if ids != inner.multiselect.selected_ids() {
        inner
            .multiselect
            .set_value(Value::Array(ids.into_iter().map(Value::String).collect()));
    }
}

/// Multiselect ids changed: resolve them against the catalog.
fn pull_devices(inner: &Weak<DeviceInner>, ids: &Value) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let selected = inner.core.context().devices.select(&device_ids(ids));
    let current: Vec<String> = inner.core.value().with(device_ids);
    let same = selected.len() == current.len() && selected.iter().zip(&current).all(|(d, id)| &d.id == id);
    if !same {
        inner.core.set_value(devices_value(&selected));
    }
}

impl Field for DeviceField {
    fn core(&self) -> &FieldCore {
        &self.inner.core
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn set_configuration(&self, config: FieldConfig) -> bool {
        let inner_config = self.multiselect_config(&config);
        if !self.inner.core.set_configuration(config) {
            return false;
        }
        self.inner.multiselect.set_configuration(inner_config);
        push_ids(&Arc::downgrade(&self.inner), &self.value());
        true
    }

    fn validate(&self, value: &Value, emit_error: bool) -> bool {
        match value {
            Value::Array(items) if items.is_empty() => self.inner.core.validate(&Value::Null, emit_error),
            other => self.inner.core.validate(other, emit_error),
        }
    }

    fn focus(&self) {
        self.inner.core.focus();
        self.inner.multiselect.open_dropdown();
    }

    fn blur(&self) {
        self.inner.multiselect.close();
        self.inner.core.blur();
        self.validate_current(true);
    }

    fn teardown(&self) {
        self.inner.multiselect.teardown();
        self.inner.core.teardown();
    }
}
