use rust_embed::RustEmbed;
use std::borrow::Cow;

use crate::CountriesError;

#[derive(RustEmbed)]
#[folder = "assets/"]
#[include = "*.ron"]
pub struct CountryAssets;

pub const COUNTRIES_PATH: &str = "countries.ron";

/// Borrow an embedded asset as text.
pub fn asset_str<A: RustEmbed>(path: &str) -> Result<Cow<'static, str>, CountriesError> {
    let file = A::get(path).ok_or_else(|| CountriesError::MissingAsset(path.to_string()))?;
    match file.data {
        Cow::Borrowed(bytes) => std::str::from_utf8(bytes)
            .map(Cow::Borrowed)
            .map_err(|_| CountriesError::InvalidEncoding(path.to_string())),
        Cow::Owned(bytes) => String::from_utf8(bytes)
            .map(Cow::Owned)
            .map_err(|_| CountriesError::InvalidEncoding(path.to_string())),
    }
}

pub fn default_countries() -> Result<Cow<'static, str>, CountriesError> {
    asset_str::<CountryAssets>(COUNTRIES_PATH)
}
