use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use color_eyre::{eyre::eyre, Result};
use countries::{CountryDictionary, CountryLookup};
use forms::field::DeviceCatalog;
use forms::form::{Layout, Slot};
use forms::{FieldContext, Form, FormSchema, Scheduler, TokioScheduler};
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::assets;
use crate::cli::Cmd;
use crate::config::Config;

/// Outcome of `storefront check`.
#[derive(Debug, Default, PartialEq, Serialize)]
pub struct CheckReport {
    pub valid: bool,
    pub errors: IndexMap<String, String>,
    pub values: IndexMap<String, Value>,
    pub changed: IndexMap<String, Value>,
    /// Keys of the input that no field answers to.
    pub unknown: Vec<String>,
}

pub struct Storefront {
    config: Config,
    countries: Arc<CountryDictionary>,
    devices: Arc<DeviceCatalog>,
}

impl Storefront {
    pub fn new(config: Config, locale: Option<String>) -> Result<Self> {
        let locale = locale.unwrap_or_else(|| config.locale.clone());
        let countries = CountryDictionary::bundled(&locale)?;
        let devices = match config.devices_path() {
            Some(path) => {
                let catalog = DeviceCatalog::from_json(&fs::read_to_string(&path)?)?;
                debug!(path = %path.display(), count = catalog.len(), "device catalog loaded");
                catalog
            }
            None => DeviceCatalog::default(),
        };
        Ok(Self {
            config,
            countries: Arc::new(countries),
            devices: Arc::new(devices),
        })
    }

    pub fn context(&self, scheduler: Arc<dyn Scheduler>) -> FieldContext {
        FieldContext::new(scheduler, self.countries.clone())
            .with_timing(self.config.timing)
            .with_devices(self.devices.clone())
            .with_translator(Arc::new(self.config.translations.clone()))
    }

    /// Definition from `path`, the bundled order form otherwise.
    pub fn load_schema(path: Option<&Path>) -> Result<FormSchema> {
        let schema = match path {
            Some(path) => FormSchema::from_json5(&fs::read_to_string(path)?)?,
            None => FormSchema::from_json5(&assets::form_definition(assets::ORDER_FORM)?)?,
        };
        Ok(schema)
    }

    pub fn build_form(&self, scheduler: Arc<dyn Scheduler>, schema: FormSchema) -> Result<Form> {
        let form = Form::from_schema(self.context(scheduler), schema)?;
        info!(fields = form.keys().count(), "form built");
        Ok(form)
    }

    /// Apply `values` to the form and validate, waiting for async checks.
    pub async fn check(form: &Form, values: IndexMap<String, Value>) -> CheckReport {
        let mut unknown = Vec::new();
        for (key, value) in values {
            match form.field(&key) {
                Some(field) => field.set_value(value),
                None => {
                    warn!(key, "no such field");
                    unknown.push(key);
                }
            }
        }

        let errors = form.validate_all_settled().await.unwrap_or_default();
        CheckReport {
            valid: errors.is_empty(),
            errors,
            values: form.get_values(),
            changed: form.get_changed_values().unwrap_or_default(),
            unknown,
        }
    }

    /// Human readable outline of the form.
    pub fn describe(form: &Form) -> String {
        let mut out = String::new();
        let layout = match form.layout() {
            Layout::Flow => "flow".to_string(),
            Layout::Grid { columns } => format!("grid, {columns} columns"),
        };
        let title = form.config().title.as_ref().map(|t| t.text.as_str()).unwrap_or("Form");
        let _ = writeln!(out, "{title} ({layout})");

        let line = |out: &mut String, indent: &str, key: &str| {
            if let Some(field) = form.field(key) {
                let label = field.core().with_config(|c| c.label.clone()).unwrap_or_default();
                let _ = writeln!(out, "{indent}{key:<12}{:<12}{label}", field.kind());
            }
        };
        for slot in form.slots() {
            match slot {
                Slot::Field(key) => line(&mut out, "  ", key),
                Slot::Group(tag) => {
                    let Some(group) = form.group(tag) else {
                        continue;
                    };
                    let _ = writeln!(out, "  [{}] #{}", group.tag, group.element_id);
                    for key in &group.keys {
                        line(&mut out, "    ", key);
                    }
                }
            }
        }
        out
    }

    /// `digits` in the national format and the country it resolves to.
    pub fn phone(&self, digits: &str, country: Option<&str>) -> String {
        let formatted = self.countries.format_phone(digits, country);
        let resolved = match country {
            Some(key) => Some(self.countries.get(key)),
            None => self.countries.by_phone(digits),
        };
        match resolved {
            Some(c) => format!("{formatted} ({})", c.display_name(self.countries.locale())),
            None => formatted,
        }
    }

    pub async fn run(&self, cmd: Cmd) -> Result<ExitCode> {
        match cmd {
            Cmd::Check { form, values } => {
                let schema = Self::load_schema(form.as_deref())?;
                let values: IndexMap<String, Value> = json5::from_str(&fs::read_to_string(&values)?)?;
                let scheduler = TokioScheduler::current().ok_or_else(|| eyre!("no tokio runtime"))?;
                let form = self.build_form(Arc::new(scheduler), schema)?;
                let report = Self::check(&form, values).await;
                println!("{}", serde_json::to_string_pretty(&report)?);
                Ok(if report.valid {
                    ExitCode::SUCCESS
                } else {
                    ExitCode::FAILURE
                })
            }
            Cmd::Describe { form } => {
                let schema = Self::load_schema(form.as_deref())?;
                let scheduler = TokioScheduler::current().ok_or_else(|| eyre!("no tokio runtime"))?;
                let form = self.build_form(Arc::new(scheduler), schema)?;
                print!("{}", Self::describe(&form));
                Ok(ExitCode::SUCCESS)
            }
            Cmd::Phone { digits, country } => {
                println!("{}", self.phone(&digits, country.as_deref()));
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use forms::ManualScheduler;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn storefront() -> Storefront {
        Storefront::new(Config::default(), None).unwrap()
    }

    fn values(json: Value) -> IndexMap<String, Value> {
        serde_json::from_value(json).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn complete_order_passes() {
        let app = storefront();
        let scheduler = Arc::new(TokioScheduler::current().unwrap());
        let form = app
            .build_form(scheduler, Storefront::load_schema(None).unwrap())
            .unwrap();

        let report = Storefront::check(
            &form,
            values(json!({
                "name": "Anna",
                "phone": "79991234567",
                "street": "Lenina",
                "house": "12a",
                "toppings": ["cheese", "olives"],
            })),
        )
        .await;

        assert!(report.valid, "{report:?}");
        assert!(report.errors.is_empty());
        assert_eq!(report.values["size"], json!(30));
        assert_eq!(
            report.changed.keys().collect::<Vec<_>>(),
            vec!["name", "phone", "street", "house", "toppings"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn broken_order_lists_errors() {
        let app = storefront();
        let scheduler = Arc::new(TokioScheduler::current().unwrap());
        let form = app
            .build_form(scheduler, Storefront::load_schema(None).unwrap())
            .unwrap();

        let report = Storefront::check(
            &form,
            values(json!({
                "name": "A",
                "phone": "79991234567",
                "street": "Lenina",
                "house": "twelve",
                "toppings": ["cheese", "bacon", "chili", "olives"],
                "tip": 100,
            })),
        )
        .await;

        assert!(!report.valid);
        assert_eq!(report.unknown, vec!["tip".to_string()]);
        assert_eq!(report.errors["name"], "At least 2 letters");
        assert_eq!(report.errors["house"], "House number like 12, 12a or 12/3");
        assert_eq!(report.errors["toppings"], "No more than 3 toppings");
        assert_eq!(report.errors.len(), 3);
    }

    #[test]
    fn describe_outlines_groups() {
        let app = storefront();
        let form = app
            .build_form(Arc::new(ManualScheduler::new()), Storefront::load_schema(None).unwrap())
            .unwrap();
        let outline = Storefront::describe(&form);
        let lines: Vec<&str> = outline.lines().collect();

        assert_eq!(lines[0], "Delivery (grid, 2 columns)");
        assert_eq!(lines[1], "  [contact] #form-group-contact");
        assert!(lines[2].starts_with("    name        text"));
        assert!(lines[3].starts_with("    phone       phone"));
        assert_eq!(lines[4], "  [address] #form-group-address");
        assert!(lines.iter().any(|l| l.starts_with("  size        select")));
        assert!(lines.last().unwrap().starts_with("  comment"));
    }

    #[test]
    fn phone_is_formatted_with_country() {
        let app = storefront();
        let out = app.phone("79991234567", None);
        assert!(out.starts_with("+7 (999) 123-45-67"), "{out}");
        assert_eq!(app.phone("", Some("ru")), format!("+7 ({})", app.countries.get("ru").display_name("ru-RU")));
    }
}
