use thiserror::Error;

#[derive(Error, Debug)]
pub enum CountriesError {
    #[error("asset not found: {0}")]
    MissingAsset(String),

    #[error("asset is not valid utf-8: {0}")]
    InvalidEncoding(String),

    #[error("ron error: {0}")]
    Ron(#[from] ron::error::SpannedError),

    #[error("country data is empty")]
    Empty,

    #[error("no country for locale {locale} and no fallback for {fallback}")]
    UnknownLocale { locale: String, fallback: String },
}
