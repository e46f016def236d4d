//! Select options: identity, display and search.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::Translator;
use crate::config::{GroupTitles, SelectOptions};
use crate::reactive::structural_eq_via_partial_eq;

/// Id of the null option when null is an allowed value.
pub const NO_SELECTED_ID: &str = "no-selected";
/// Id of a null value when null is not allowed.
pub const NONE_ID: &str = "none";

/// Values the UI renders as translated "extra" choices.
pub const EXTRA_OPTION_VALUES: [&str; 4] = ["none", "all", "any", "unknown"];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectOption {
    pub value: Value,
    pub group: Option<String>,
    /// Extra text matched by search but not displayed.
    pub search_field: Option<String>,
    pub icon: Option<String>,
    pub icon_color: Option<String>,
    pub icon_size: Option<u32>,
    pub checkbox_icon: bool,
    pub text: Option<String>,
    pub text_before: Option<String>,
    pub text_after: Option<String>,
    pub css_class: Option<String>,
    pub css_style: IndexMap<String, String>,
}

structural_eq_via_partial_eq!(SelectOption);

impl SelectOption {
    pub fn new(value: Value, text: impl Into<String>) -> Self {
        Self {
            value,
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// Placeholder entry standing for "nothing selected".
    pub fn not_selected(text: impl Into<String>) -> Self {
        Self {
            value: Value::Null,
            text: Some(text.into()),
            css_class: Some("select-option-no-selected".into()),
            ..Self::default()
        }
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    pub fn search_field(mut self, search: impl Into<String>) -> Self {
        self.search_field = Some(search.into());
        self
    }

    pub fn is_extra(&self) -> bool {
        self.value
            .as_str()
            .is_some_and(|v| EXTRA_OPTION_VALUES.contains(&v))
    }
}

/// Rules for turning values into option ids.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IdPolicy {
    pub allow_null: bool,
    pub no_default_selection: bool,
}

impl IdPolicy {
    /// Selection id of `value`.
    ///
    /// Null maps to [`NO_SELECTED_ID`] or [`NONE_ID`] depending on whether
    /// null is allowed, or to no id at all when default selection is off.
    /// Primitives stringify; objects become `#key=value` pairs over sorted
    /// keys, so key order never changes the id.
    pub fn id_of(&self, value: &Value) -> Option<String> {
        match value {
            Value::Null if self.no_default_selection => None,
            Value::Null if self.allow_null => Some(NO_SELECTED_ID.to_string()),
            Value::Null => Some(NONE_ID.to_string()),
            other => Some(value_id(other)),
        }
    }
}

fn value_id(value: &Value) -> String {
    match value {
        Value::Null => NONE_ID.to_string(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(value_id).collect();
            format!("[{}]", parts.join(","))
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            keys.into_iter()
                .map(|key| format!("#{key}={}", value_id(&map[key.as_str()])))
                .collect()
        }
    }
}

/// Case-insensitive match of `term` against the option's display texts and
/// its search field. `translate` maps option text to what the user sees.
pub fn matches_search(option: &SelectOption, term: &str, translate: impl Fn(&str) -> String) -> bool {
    let term = term.to_lowercase();
    if term.is_empty() {
        return true;
    }
    let text = option.text.as_deref().map(translate);
    let found = [
        text.as_deref(),
        option.text_before.as_deref(),
        option.text_after.as_deref(),
        option.search_field.as_deref(),
    ]
    .into_iter()
    .flatten()
    .any(|candidate| candidate.to_lowercase().contains(&term));
    found
}

/// An option together with its selection id, as listed in a dropdown.
#[derive(Clone, Debug, PartialEq)]
pub struct DisplayedOption {
    pub id: Option<String>,
    pub option: SelectOption,
}

structural_eq_via_partial_eq!(DisplayedOption);

impl DisplayedOption {
    pub fn new(option: SelectOption, policy: IdPolicy) -> Self {
        Self {
            id: policy.id_of(&option.value),
            option,
        }
    }

    pub fn value(&self) -> &Value {
        &self.option.value
    }
}

/// A run of consecutive options sharing a group.
#[derive(Clone, Debug, PartialEq)]
pub struct OptionGroup {
    /// Shown above the run; `None` for ungrouped options or when titles are
    /// off.
    pub title: Option<String>,
    /// Draw a separator line instead of a title.
    pub separator: bool,
    pub options: Vec<DisplayedOption>,
}

/// Split options into runs by group, labelled according to `titles`.
pub fn group_options(options: &[DisplayedOption], titles: GroupTitles) -> Vec<OptionGroup> {
    let mut groups: Vec<OptionGroup> = Vec::new();
    for option in options {
        let group = option.option.group.clone();
        let same_run = groups.last().is_some_and(|last| {
            last.options
                .last()
                .is_some_and(|prev| prev.option.group == group)
        });
        if same_run {
            if let Some(last) = groups.last_mut() {
                last.options.push(option.clone());
            }
            continue;
        }
        let first = groups.is_empty();
        let (title, separator) = match titles {
            GroupTitles::Default => (group, false),
            GroupTitles::Separator => (None, !first && group.is_some()),
            GroupTitles::None => (None, false),
        };
        groups.push(OptionGroup {
            title,
            separator,
            options: vec![option.clone()],
        });
    }
    groups
}

/// The option list a select works from: the host-provided list, then the
/// live source of the configuration, then its static options.
pub fn option_list(
    config: &SelectOptions,
    provided: Option<&Vec<SelectOption>>,
    live: Option<&Vec<SelectOption>>,
) -> Vec<SelectOption> {
    provided
        .or(live)
        .cloned()
        .unwrap_or_else(|| config.options.clone())
}

/// Text the user sees for `option`, translated when the configuration asks
/// for it.
pub fn shown_text(option: &SelectOption, config: &SelectOptions, translator: &dyn Translator) -> Option<String> {
    let text = option.text.as_deref()?;
    if config.translate_options || (config.translate_extra_options && option.is_extra()) {
        Some(translator.translate(text))
    } else {
        Some(text.to_string())
    }
}

/// Options matching the search term; everything when the host searches.
pub fn visible_options(
    displayed: &[DisplayedOption],
    term: &str,
    config: &SelectOptions,
    translator: &dyn Translator,
) -> Vec<DisplayedOption> {
    if config.async_search || term.is_empty() {
        return displayed.to_vec();
    }
    displayed
        .iter()
        .filter(|d| {
            matches_search(&d.option, term, |_| {
                shown_text(&d.option, config, translator).unwrap_or_default()
            })
        })
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const STRICT: IdPolicy = IdPolicy {
        allow_null: false,
        no_default_selection: false,
    };

    #[test]
    fn primitive_ids() {
        assert_eq!(STRICT.id_of(&json!("thin")).as_deref(), Some("thin"));
        assert_eq!(STRICT.id_of(&json!(30)).as_deref(), Some("30"));
        assert_eq!(STRICT.id_of(&json!(true)).as_deref(), Some("true"));
    }

    #[test]
    fn record_ids_ignore_key_order() {
        let a: Value = serde_json::from_str(r#"{"size": 30, "dough": "thin"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"dough": "thin", "size": 30}"#).unwrap();
        assert_eq!(STRICT.id_of(&a), STRICT.id_of(&b));
        assert_eq!(STRICT.id_of(&a).as_deref(), Some("#dough=thin#size=30"));
    }

    #[test]
    fn record_ids_are_type_sensitive() {
        assert_ne!(
            STRICT.id_of(&json!({"size": [30]})),
            STRICT.id_of(&json!({"size": 30}))
        );
    }

    #[test]
    fn null_ids_follow_policy() {
        assert_eq!(STRICT.id_of(&Value::Null).as_deref(), Some(NONE_ID));
        let nullable = IdPolicy {
            allow_null: true,
            no_default_selection: false,
        };
        assert_eq!(nullable.id_of(&Value::Null).as_deref(), Some(NO_SELECTED_ID));
        let placeholder_only = IdPolicy {
            allow_null: true,
            no_default_selection: true,
        };
        assert_eq!(placeholder_only.id_of(&Value::Null), None);
    }

    #[test]
    fn search_covers_all_texts() {
        let option = SelectOption {
            text: Some("Margherita".into()),
            text_before: Some("Classic".into()),
            text_after: Some("30 cm".into()),
            search_field: Some("tomato mozzarella".into()),
            ..SelectOption::new(json!(1), "")
        };
        let id = |t: &str| t.to_string();
        assert!(matches_search(&option, "MARGH", id));
        assert!(matches_search(&option, "classic", id));
        assert!(matches_search(&option, "30 CM", id));
        assert!(matches_search(&option, "mozza", id));
        assert!(!matches_search(&option, "pepperoni", id));
    }

    #[test]
    fn groups_follow_title_mode() {
        let policy = STRICT;
        let options: Vec<DisplayedOption> = [
            SelectOption::new(json!("a"), "Phone A").group("Phones"),
            SelectOption::new(json!("b"), "Phone B").group("Phones"),
            SelectOption::new(json!("c"), "Tablet C").group("Tablets"),
        ]
        .into_iter()
        .map(|o| DisplayedOption::new(o, policy))
        .collect();

        let titled = group_options(&options, GroupTitles::Default);
        assert_eq!(titled.len(), 2);
        assert_eq!(titled[0].title.as_deref(), Some("Phones"));
        assert_eq!(titled[0].options.len(), 2);

        let separated = group_options(&options, GroupTitles::Separator);
        assert_eq!(separated[0].title, None);
        assert!(!separated[0].separator);
        assert!(separated[1].separator);

        let flat = group_options(&options, GroupTitles::None);
        assert!(flat.iter().all(|g| g.title.is_none() && !g.separator));
    }

    #[test]
    fn async_search_shows_everything() {
        let options = vec![DisplayedOption::new(SelectOption::new(json!(1), "One"), STRICT)];
        let mut config = SelectOptions::default();
        let translator = crate::field::Untranslated;
        assert!(visible_options(&options, "two", &config, &translator).is_empty());
        config.async_search = true;
        assert_eq!(visible_options(&options, "two", &config, &translator).len(), 1);
    }

    #[test]
    fn search_uses_translated_text() {
        let option = SelectOption::new(json!("any"), "options.any");
        assert!(matches_search(&option, "whatever", |_| "Whatever".to_string()));
        assert!(option.is_extra());
    }
}
