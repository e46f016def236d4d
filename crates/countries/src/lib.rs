//! Country / phone-number dictionary used by the storefront phone field.

mod assets;
mod country;
mod dictionary;
mod errors;

pub use assets::{asset_str, default_countries, CountryAssets};
pub use country::{only_digits, Country, MASK_SLOT};
pub use dictionary::{CountryDictionary, CountryLookup, DEFAULT_COUNTRY_KEY, DEFAULT_LOCALE};
pub use errors::CountriesError;
