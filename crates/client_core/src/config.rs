use std::{path::Path, time::Duration};

use anyhow::Context;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::{attachments::AttachmentPolicy, tables::TableLimits};

pub const SETTINGS_FILE: &str = "achievements.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub session_database_url: String,
    pub max_files: usize,
    pub max_file_size_mb: u64,
    pub table_max_rows: usize,
    pub table_max_cols: usize,
    pub max_tables: usize,
    pub request_timeout_secs: u64,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:3000".into(),
            session_database_url: "sqlite://./data/session.db".into(),
            max_files: 2,
            max_file_size_mb: 8,
            table_max_rows: 50,
            table_max_cols: 20,
            max_tables: 5,
            request_timeout_secs: 30,
        }
    }
}

impl ClientSettings {
    pub fn attachment_policy(&self) -> AttachmentPolicy {
        AttachmentPolicy {
            max_files: self.max_files,
            max_file_size_mb: self.max_file_size_mb,
        }
    }

    pub fn table_limits(&self) -> TableLimits {
        TableLimits {
            max_rows: self.table_max_rows.max(1),
            max_cols: self.table_max_cols.max(1),
            max_tables: self.max_tables,
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }

    /// Base URL without a trailing slash, ready for `format!("{base}/path")`.
    pub fn api_base(&self) -> &str {
        self.api_base_url.trim_end_matches('/')
    }
}

pub fn load_settings() -> anyhow::Result<ClientSettings> {
    load_settings_from(Path::new(SETTINGS_FILE))
}

/// Defaults, then `path` when it exists, then `APP__*` environment variables.
pub fn load_settings_from(path: &Path) -> anyhow::Result<ClientSettings> {
    let defaults = ClientSettings::default();
    let settings = Config::builder()
        .set_default("api_base_url", defaults.api_base_url)?
        .set_default("session_database_url", defaults.session_database_url)?
        .set_default("max_files", defaults.max_files as u64)?
        .set_default("max_file_size_mb", defaults.max_file_size_mb)?
        .set_default("table_max_rows", defaults.table_max_rows as u64)?
        .set_default("table_max_cols", defaults.table_max_cols as u64)?
        .set_default("max_tables", defaults.max_tables as u64)?
        .set_default("request_timeout_secs", defaults.request_timeout_secs)?
        .add_source(File::from(path).required(false))
        .add_source(
            Environment::with_prefix("APP")
                .prefix_separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read settings from '{}'", path.display()))?;

    let mut settings: ClientSettings = settings
        .try_deserialize()
        .context("invalid client settings")?;
    settings.session_database_url = normalize_database_url(&settings.session_database_url);
    Ok(settings)
}

pub fn prepare_database_url(raw_database_url: &str) -> anyhow::Result<String> {
    let database_url = normalize_database_url(raw_database_url);
    storage::ensure_sqlite_parent_dir_exists(&database_url)?;
    Ok(database_url)
}

pub fn normalize_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return ClientSettings::default().session_database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:")
        || raw_database_url.starts_with("sqlite://")
        || raw_database_url.contains("://")
    {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        let path = path.replace('\\', "/");
        return format!("sqlite://{path}");
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
