use serde::{Deserialize, Serialize};

/// Mask character standing for one digit of the phone number.
pub const MASK_SLOT: char = 'x';

/// One entry of the phone dictionary.
///
/// `code` is the calling code without `+`. `area` lists the area codes
/// that identify the country when several countries share a calling code;
/// an empty list makes the country the fallback for its code.
/// `phone_length` counts the calling code digits as well.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Country {
    pub key: String,
    pub name_ru: String,
    pub name_en: String,
    pub iso: String,
    pub lang: String,
    pub code: String,
    #[serde(default)]
    pub area: Vec<String>,
    #[serde(default)]
    pub locale: Option<String>,
    pub mask: String,
    pub phone_length: usize,
    /// Prefixes (after the calling code) that belong to another country.
    #[serde(default)]
    pub invalid_area: Vec<String>,
}

impl Country {
    /// True if `digits` starts with the calling code followed by one of `areas`.
    fn matches_any(&self, digits: &str, areas: &[String]) -> bool {
        digits
            .strip_prefix(self.code.as_str())
            .is_some_and(|rest| areas.iter().any(|area| rest.starts_with(area.as_str())))
    }

    pub fn has_areas(&self) -> bool {
        !self.area.is_empty()
    }

    /// The number carries one of this country's area codes.
    /// Countries without area codes accept every number.
    pub fn accepts_area(&self, digits: &str) -> bool {
        !self.has_areas() || self.matches_any(digits, &self.area)
    }

    /// The number carries a prefix that is reserved for another country.
    pub fn is_excluded(&self, digits: &str) -> bool {
        self.matches_any(digits, &self.invalid_area)
    }

    /// Fill the national mask with `digits`, stopping at the first slot
    /// that has no digit left.
    pub fn fill_mask(&self, digits: &str) -> String {
        let mut digits = digits.chars().take(self.phone_length).peekable();
        let mut out = String::with_capacity(self.mask.len() + 1);
        out.push('+');
        for slot in self.mask.chars() {
            if digits.peek().is_none() {
                break;
            }
            if slot == MASK_SLOT {
                if let Some(d) = digits.next() {
                    out.push(d);
                }
            } else {
                out.push(slot);
            }
        }
        out
    }

    /// Name in the language of `locale` (Russian for `ru-*`, English otherwise).
    pub fn display_name(&self, locale: &str) -> &str {
        if locale.starts_with("ru") {
            &self.name_ru
        } else {
            &self.name_en
        }
    }
}

/// Keep only ASCII digits.
pub fn only_digits(value: &str) -> String {
    value.chars().filter(|c| c.is_ascii_digit()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn russia() -> Country {
        Country {
            key: "ru".into(),
            name_ru: "РОССИЯ".into(),
            name_en: "Russia".into(),
            iso: "RU".into(),
            lang: "ru".into(),
            code: "7".into(),
            area: vec!["999".into(), "929".into()],
            locale: Some("ru-RU".into()),
            mask: "x (xxx) xxx-xx-xx".into(),
            phone_length: 11,
            invalid_area: vec!["929".into()],
        }
    }

    #[test]
    fn fill_mask_stops_at_last_digit() {
        let ru = russia();
        assert_eq!(ru.fill_mask("7999"), "+7 (999");
        assert_eq!(ru.fill_mask("79991234567"), "+7 (999) 123-45-67");
    }

    #[test]
    fn fill_mask_truncates_to_phone_length() {
        assert_eq!(russia().fill_mask("7999123456789"), "+7 (999) 123-45-67");
    }

    #[test]
    fn area_and_exclusion_are_checked_after_code() {
        let ru = russia();
        assert!(ru.accepts_area("79991234567"));
        assert!(!ru.accepts_area("74951234567"));
        assert!(ru.is_excluded("79291234567"));
        assert!(!ru.is_excluded("92912345678"));
    }

    #[test]
    fn only_digits_strips_everything_else() {
        assert_eq!(only_digits("+7 (999) 123-45-67"), "79991234567");
        assert_eq!(only_digits("abc"), "");
    }
}
