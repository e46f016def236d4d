use std::borrow::Cow;

use color_eyre::{eyre::eyre, Result};
use rust_embed::RustEmbed;

#[derive(RustEmbed)]
#[folder = "assets/"]
#[include = "*.json5"]
pub struct FormAssets;

pub const ORDER_FORM: &str = "order_form.json5";

/// Embedded form definition by file name.
pub fn form_definition(name: &str) -> Result<Cow<'static, str>> {
    let file = FormAssets::get(name).ok_or_else(|| eyre!("no embedded form definition {name}"))?;
    Ok(match file.data {
        Cow::Borrowed(bytes) => Cow::Borrowed(std::str::from_utf8(bytes)?),
        Cow::Owned(bytes) => Cow::Owned(String::from_utf8(bytes)?),
    })
}
