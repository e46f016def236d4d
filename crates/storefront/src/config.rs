use std::fs;
use std::{env, path::PathBuf};

use color_eyre::Result;
use countries::DEFAULT_LOCALE;
use directories::ProjectDirs;
use forms::Timing;
use indexmap::IndexMap;
use lazy_static::lazy_static;
use serde::Deserialize;
use tracing::warn;

#[derive(Clone, Debug, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub data_dir: PathBuf,
    #[serde(default)]
    pub config_dir: PathBuf,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default, flatten)]
    pub config: AppConfig,
    /// Locale of the phone dictionary.
    #[serde(default = "default_locale")]
    pub locale: String,
    #[serde(default)]
    pub timing: Timing,
    /// JSON catalog of the customer's devices for `device` fields, relative
    /// to the config directory unless absolute.
    #[serde(default)]
    pub devices: Option<PathBuf>,
    /// Translation keys of option texts.
    #[serde(default)]
    pub translations: IndexMap<String, String>,
}

fn default_locale() -> String {
    DEFAULT_LOCALE.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            config: AppConfig::default(),
            locale: default_locale(),
            timing: Timing::default(),
            devices: None,
            translations: IndexMap::new(),
        }
    }
}

lazy_static! {
    pub static ref PROJECT_NAME: String = env!("CARGO_CRATE_NAME").to_uppercase();
    pub static ref DATA_FOLDER: Option<PathBuf> =
        env::var(format!("{}_DATA", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
    pub static ref CONFIG_FOLDER: Option<PathBuf> =
        env::var(format!("{}_CONFIG", PROJECT_NAME.clone()))
            .ok()
            .map(PathBuf::from);
}

impl Config {
    pub fn new() -> Result<Self, config::ConfigError> {
        Self::load(get_config_dir(), get_data_dir())
    }

    /// Read `config.json5` / `config.toml` from `config_dir`; both are
    /// optional.
    pub fn load(config_dir: PathBuf, data_dir: PathBuf) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder()
            .set_default("data_dir", data_dir.to_string_lossy().to_string())?
            .set_default("config_dir", config_dir.to_string_lossy().to_string())?;

        let config_files = [
            ("config.json5", config::FileFormat::Json5),
            ("config.toml", config::FileFormat::Toml),
        ];
        let mut found_config = false;
        for (file, format) in &config_files {
            let source = config::File::from(config_dir.join(file))
                .format(*format)
                .required(false);
            builder = builder.add_source(source);
            if config_dir.join(file).exists() {
                found_config = true
            }
        }
        if !found_config {
            warn!(dir = %config_dir.display(), "no configuration file found, using defaults");
        }

        builder.build()?.try_deserialize()
    }

    pub fn devices_path(&self) -> Option<PathBuf> {
        self.devices.as_ref().map(|path| self.config.config_dir.join(path))
    }
}

pub fn get_data_dir() -> PathBuf {
    if let Some(s) = DATA_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.data_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".data")
    }
}

pub fn get_config_dir() -> PathBuf {
    if let Some(s) = CONFIG_FOLDER.clone() {
        s
    } else if let Some(proj_dirs) = project_directory() {
        proj_dirs.config_local_dir().to_path_buf()
    } else {
        PathBuf::from(".").join(".config")
    }
}

fn project_directory() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "storefront", env!("CARGO_PKG_NAME"))
}

pub fn ensure_data_and_config_dirs_exist() -> std::io::Result<()> {
    for dir in [get_data_dir(), get_config_dir()] {
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = env::temp_dir().join(format!("storefront-config-{name}-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn missing_files_give_defaults() {
        let dir = scratch_dir("empty");
        let config = Config::load(dir.clone(), dir.join("data")).unwrap();
        assert_eq!(config.locale, "ru-RU");
        assert_eq!(config.timing, Timing::default());
        assert_eq!(config.config.config_dir, dir);
        assert_eq!(config.devices, None);
    }

    #[test]
    fn json5_file_overrides_defaults() {
        let dir = scratch_dir("json5");
        fs::write(
            dir.join("config.json5"),
            r#"{
                // phone dictionary
                locale: "kk-KZ",
                timing: { settle_ms: 1000 },
                translations: { phone: "Phone" },
            }"#,
        )
        .unwrap();
        let config = Config::load(dir.clone(), dir.join("data")).unwrap();
        assert_eq!(config.locale, "kk-KZ");
        assert_eq!(config.timing.settle_ms, 1000);
        assert_eq!(config.timing.focus_ms, Timing::default().focus_ms);
        assert_eq!(config.translations["phone"], "Phone");
        fs::remove_dir_all(dir).unwrap();
    }

    #[test]
    fn device_catalog_resolves_against_config_dir() {
        let dir = scratch_dir("devices");
        fs::write(dir.join("config.toml"), "devices = \"devices.json\"\n").unwrap();
        let config = Config::load(dir.clone(), dir.join("data")).unwrap();
        assert_eq!(config.devices_path(), Some(dir.join("devices.json")));

        let absolute = env::temp_dir().join("devices.json");
        let config = Config {
            devices: Some(absolute.clone()),
            ..config
        };
        assert_eq!(config.devices_path(), Some(absolute));
        fs::remove_dir_all(dir).unwrap();
    }
}
