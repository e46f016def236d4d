use std::sync::{Arc, Mutex};
use std::time::Duration;

use countries::CountryDictionary;
use forms::field::phone::MSG_INVALID_PHONE;
use forms::field::{PhoneField, SelectField, TextField};
use forms::{
    AsyncHandler, Field, FieldContext, Form, FormChange, FormSchema, HandlerError, ManualScheduler,
    TokioScheduler, ValidationRule,
};
use pretty_assertions::assert_eq;
use serde_json::{json, Value};

const ORDER_FORM: &str = r#"{
    form: { title: { text: "Your order" } },
    items: {
        name: {
            type: "text",
            config: { label: "Name", validate: { min: 2, messages: { min: "At least {min} letters" } } },
        },
        phone: { type: "phone", config: { label: "Phone", group: "contact" } },
        email: {
            type: "text",
            config: { label: "E-mail", group: "contact", validate: { allow_null: true, mask: "^[^@]+@[^@]+$" } },
        },
        size: {
            type: "select",
            config: {
                value: 30,
                select: { options: [{ value: 25, text: "25 cm" }, { value: 30, text: "30 cm" }, { value: 35, text: "35 cm" }] },
            },
        },
    },
}"#;

fn context(scheduler: Arc<dyn forms::Scheduler>) -> FieldContext {
    let countries = CountryDictionary::bundled("ru-RU").unwrap();
    FieldContext::new(scheduler, Arc::new(countries))
}

fn order_form() -> Form {
    let schema = FormSchema::from_json5(ORDER_FORM).unwrap();
    Form::from_schema(context(Arc::new(ManualScheduler::new())), schema).unwrap()
}

#[test]
fn order_form_builds_from_definition() {
    let form = order_form();
    assert!(!form.is_hidden());
    assert_eq!(form.keys().collect::<Vec<_>>(), vec!["name", "phone", "email", "size"]);
    assert_eq!(form.config().title.as_ref().map(|t| t.text.as_str()), Some("Your order"));
    assert_eq!(form.group("contact").unwrap().keys, vec!["phone", "email"]);
    assert!(form.field_as::<PhoneField>("phone").is_some());
    assert_eq!(form.field("size").unwrap().value(), json!(30));
    assert_eq!(form.get_changed_values(), None);
}

#[test]
fn submit_flow() {
    let form = order_form();
    assert!(!form.is_valid());

    let errors = form.validate_all().unwrap();
    assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["name", "phone"]);
    assert_eq!(errors["name"], "Required field");
    assert_eq!(errors["phone"], "No phone number");

    let name = form.field_as::<TextField>("name").unwrap();
    name.input_text("A");
    name.on_change();
    assert_eq!(name.error().as_deref(), Some("At least 2 letters"));
    name.input_text("Anna");
    name.on_change();
    assert_eq!(name.error(), None);

    let phone = form.field_as::<PhoneField>("phone").unwrap();
    phone.text().input_text("7495");
    // the message may carry a trailing run of spaces when it repeats
    assert_eq!(phone.error().as_deref().map(str::trim_end), Some(MSG_INVALID_PHONE));
    phone.text().input_text("79991234567");
    assert_eq!(phone.value(), json!("79991234567"));
    assert_eq!(phone.text_value(), "+7 (999) 123-45-67");

    assert!(form.is_valid());
    assert_eq!(form.validate_all(), None);

    let changed = form.get_changed_values().unwrap();
    assert_eq!(changed["name"], json!("Anna"));
    assert_eq!(changed["phone"], json!("79991234567"));
    assert!(!changed.contains_key("size"));
}

#[test]
fn changes_are_forwarded_with_keys() {
    let form = order_form();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let _sub = {
        let seen = seen.clone();
        form.changes().subscribe(move |c: &FormChange| seen.lock().unwrap().push(c.clone()))
    };

    form.field_as::<SelectField>("size").unwrap().select_id("35");
    let name = form.field_as::<TextField>("name").unwrap();
    name.input_text("Boris");
    name.on_change();

    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            FormChange {
                key: "size".into(),
                new_value: json!(35)
            },
            FormChange {
                key: "name".into(),
                new_value: json!("Boris")
            },
        ]
    );
}

#[test]
fn reset_keeps_excepted_keys() {
    let form = order_form();
    form.field("name").unwrap().set_value(json!("Anna"));
    form.field("email").unwrap().set_value(json!("anna@example.com"));
    form.reset_values(&["email"]);

    let values = form.get_values();
    assert_eq!(values["name"], Value::Null);
    assert_eq!(values["email"], json!("anna@example.com"));
    // the select keeps null and shows its configured 30
    assert_eq!(values["size"], Value::Null);
    let size = form.field_as::<SelectField>("size").unwrap();
    assert_eq!(size.selected_id().as_deref(), Some("30"));
}

#[tokio::test(start_paused = true)]
async fn settled_validation_waits_for_async_checks() {
    let scheduler = Arc::new(TokioScheduler::current().unwrap());
    let mut schema = FormSchema::from_json5(ORDER_FORM).unwrap();
    let login_check = AsyncHandler::checked(|value: Value| async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        match value.as_str() {
            Some("Admin") => Err(HandlerError::validation("Name is taken")),
            _ => Ok(()),
        }
    });
    let name = schema.item_mut("name").unwrap();
    name.config.validate = name.config.validate.take().map(|rule| rule.async_handler(login_check));

    let form = Form::from_schema(context(scheduler), schema).unwrap();
    form.field("name").unwrap().set_value(json!("Admin"));
    form.field("phone").unwrap().set_value(json!("79991234567"));

    // synchronously everything passes
    assert_eq!(form.validate_all(), None);

    let errors = form.validate_all_settled().await.unwrap();
    assert_eq!(errors.len(), 1);
    assert_eq!(errors["name"], "Name is taken");
}

#[tokio::test(start_paused = true)]
async fn stale_async_result_is_dropped() {
    let scheduler = Arc::new(TokioScheduler::current().unwrap());
    let ctx = context(scheduler);
    let field = TextField::new(ctx);
    let rule = ValidationRule::required().async_handler(AsyncHandler::checked(|value: Value| async move {
        let delay = if value == json!("slow") { 500 } else { 50 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Err(HandlerError::validation(format!("{value} rejected")))
    }));
    field.set_configuration(forms::FieldConfig::new().validate(rule));

    field.input_text("slow");
    field.on_change();
    field.input_text("fast");
    field.on_change();

    tokio::time::sleep(Duration::from_millis(1000)).await;
    assert_eq!(field.error().as_deref(), Some("\"fast\" rejected"));
}
