//! Phone dictionary lookups.
//!
//! [`CountryDictionary`] is constructed once by the host and shared behind an
//! `Arc<dyn CountryLookup>`; fields only ever read from it.

use tracing::{debug, warn};

use crate::{assets, only_digits, CountriesError, Country};

pub const DEFAULT_LOCALE: &str = "ru-RU";
pub const DEFAULT_COUNTRY_KEY: &str = "ru";

/// Read-only country lookup consumed by the phone field.
pub trait CountryLookup: Send + Sync {
    /// Locale the dictionary was created for, e.g. `ru-RU`.
    fn locale(&self) -> &str;

    /// Country matching [`CountryLookup::locale`].
    fn current(&self) -> &Country;

    /// Country by key, falling back to [`CountryLookup::current`].
    fn get(&self, key: &str) -> &Country;

    fn by_locale(&self, locale: &str) -> Option<&Country>;

    /// Resolve the country of a phone number.
    ///
    /// Countries are walked in dictionary order. A country is skipped when
    /// the number does not start with its calling code or starts with one of
    /// its excluded prefixes. The first code+area match wins; countries
    /// without area codes are remembered as the fallback (the last one wins).
    fn by_phone(&self, phone: &str) -> Option<&Country>;

    /// Format `phone` with the national mask of `key` (or of the country the
    /// number resolves to).
    fn format_phone(&self, phone: &str, key: Option<&str>) -> String {
        let country = match key {
            Some(key) => Some(self.get(key)),
            None => self.by_phone(phone),
        };
        let Some(country) = country else {
            return phone.to_string();
        };
        if phone.is_empty() {
            return format!("+{}", country.code);
        }
        let digits = only_digits(phone);
        if digits.len() <= country.code.len() {
            return format!("+{digits}");
        }
        country.fill_mask(&digits)
    }
}

#[derive(Debug, Clone)]
pub struct CountryDictionary {
    countries: Vec<Country>,
    locale: String,
    current: usize,
}

impl CountryDictionary {
    /// Dictionary backed by the bundled country table.
    pub fn bundled(locale: &str) -> Result<Self, CountriesError> {
        let source = assets::default_countries()?;
        Self::from_ron(&source, locale)
    }

    pub fn from_ron(source: &str, locale: &str) -> Result<Self, CountriesError> {
        let countries: Vec<Country> = ron::from_str(source)?;
        Self::new(countries, locale)
    }

    pub fn new(countries: Vec<Country>, locale: &str) -> Result<Self, CountriesError> {
        if countries.is_empty() {
            return Err(CountriesError::Empty);
        }
        let position = |loc: &str| {
            countries
                .iter()
                .position(|c| c.locale.as_deref() == Some(loc))
        };
        let current = match position(locale).or_else(|| position(DEFAULT_LOCALE)) {
            Some(index) => index,
            None => {
                return Err(CountriesError::UnknownLocale {
                    locale: locale.to_string(),
                    fallback: DEFAULT_LOCALE.to_string(),
                })
            }
        };
        if countries[current].locale.as_deref() != Some(locale) {
            warn!(locale, "no country for locale, using {}", DEFAULT_LOCALE);
        }
        debug!(count = countries.len(), locale, "country dictionary loaded");
        Ok(Self {
            countries,
            locale: locale.to_string(),
            current,
        })
    }

    pub fn iter(&self) -> impl Iterator<Item = &Country> {
        self.countries.iter()
    }

    /// All countries ordered by their name in the dictionary's language.
    pub fn sorted_list(&self) -> Vec<&Country> {
        let mut list: Vec<&Country> = self.countries.iter().collect();
        list.sort_by(|a, b| {
            a.display_name(&self.locale)
                .to_lowercase()
                .cmp(&b.display_name(&self.locale).to_lowercase())
        });
        list
    }
}

impl CountryLookup for CountryDictionary {
    fn locale(&self) -> &str {
        &self.locale
    }

    fn current(&self) -> &Country {
        &self.countries[self.current]
    }

    fn get(&self, key: &str) -> &Country {
        self.countries
            .iter()
            .find(|c| c.key == key)
            .unwrap_or_else(|| self.current())
    }

    fn by_locale(&self, locale: &str) -> Option<&Country> {
        let found = self
            .countries
            .iter()
            .find(|c| c.locale.as_deref() == Some(locale));
        if found.is_none() {
            warn!(locale, "country with locale not found");
        }
        found
    }

    fn by_phone(&self, phone: &str) -> Option<&Country> {
        let digits = only_digits(phone);
        if digits.is_empty() {
            return None;
        }
        let mut fallback = None;
        for country in &self.countries {
            if !digits.starts_with(country.code.as_str()) || country.is_excluded(&digits) {
                continue;
            }
            if !country.has_areas() {
                fallback = Some(country);
            } else if country.accepts_area(&digits) {
                return Some(country);
            }
        }
        if fallback.is_none() {
            debug!(phone = %digits, "no country for phone");
        }
        fallback
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn dictionary() -> CountryDictionary {
        CountryDictionary::bundled(DEFAULT_LOCALE).expect("bundled dictionary")
    }

    fn key_for(dict: &CountryDictionary, phone: &str) -> Option<String> {
        dict.by_phone(phone).map(|c| c.key.clone())
    }

    #[test]
    fn current_follows_locale() {
        assert_eq!(dictionary().current().key, DEFAULT_COUNTRY_KEY);
        let us = CountryDictionary::bundled("en-US").unwrap();
        assert_eq!(us.current().key, "us");
    }

    #[test]
    fn unknown_locale_falls_back_to_default() {
        let dict = CountryDictionary::bundled("xx-XX").unwrap();
        assert_eq!(dict.current().key, DEFAULT_COUNTRY_KEY);
        assert_eq!(dict.locale(), "xx-XX");
    }

    #[test]
    fn get_unknown_key_returns_current() {
        let dict = dictionary();
        assert_eq!(dict.get("gb").code, "44");
        assert_eq!(dict.get("zz").key, "ru");
    }

    #[test]
    fn by_phone_resolves_russia() {
        assert_eq!(key_for(&dictionary(), "79991234567").as_deref(), Some("ru"));
        assert_eq!(key_for(&dictionary(), "+7 (999) 123-45-67").as_deref(), Some("ru"));
    }

    #[test]
    fn by_phone_uses_area_codes_for_shared_calling_code() {
        let dict = dictionary();
        assert_eq!(key_for(&dict, "77011234567").as_deref(), Some("kz"));
        assert_eq!(key_for(&dict, "79401234567").as_deref(), Some("ab"));
        assert_eq!(key_for(&dict, "79291234567").as_deref(), Some("os"));
        assert_eq!(key_for(&dict, "12421234567").as_deref(), Some("bs"));
    }

    #[test]
    fn by_phone_falls_back_to_country_without_areas() {
        let dict = dictionary();
        assert_eq!(key_for(&dict, "12125550100").as_deref(), Some("us"));
        assert_eq!(key_for(&dict, "442071234567").as_deref(), Some("gb"));
        assert_eq!(key_for(&dict, "441481123456").as_deref(), Some("gg"));
    }

    #[test]
    fn by_phone_without_match() {
        let dict = dictionary();
        assert_eq!(key_for(&dict, ""), None);
        assert_eq!(key_for(&dict, "74951234567"), None);
        assert_eq!(key_for(&dict, "0000"), None);
    }

    #[test]
    fn format_phone_cases() {
        let dict = dictionary();
        assert_eq!(dict.format_phone("", Some("ru")), "+7");
        assert_eq!(dict.format_phone("7", Some("ru")), "+7");
        assert_eq!(dict.format_phone("799", Some("ru")), "+7 (99");
        assert_eq!(dict.format_phone("79991234567", None), "+7 (999) 123-45-67");
        assert_eq!(dict.format_phone("380441234567", Some("ua")), "+380 (44) 123-4567");
    }

    #[test]
    fn format_phone_keeps_input_for_unknown_numbers() {
        assert_eq!(dictionary().format_phone("0000", None), "0000");
    }

    #[test]
    fn sorted_list_uses_locale_names() {
        let dict = CountryDictionary::bundled("en-US").unwrap();
        let names: Vec<&str> = dict.sorted_list().iter().take(3).map(|c| c.name_en.as_str()).collect();
        assert_eq!(names, vec!["Abkhazia", "Armenia", "Bahamas"]);
    }

    #[test]
    fn empty_data_is_rejected() {
        assert!(matches!(
            CountryDictionary::from_ron("[]", DEFAULT_LOCALE),
            Err(CountriesError::Empty)
        ));
    }
}
