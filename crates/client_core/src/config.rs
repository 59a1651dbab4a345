use std::{fs, path::Path, time::Duration};

use serde::Deserialize;
use tracing::warn;

use crate::route_gate::ProfilePolicy;

pub const SETTINGS_FILE: &str = "client.toml";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    pub api_base_url: String,
    pub database_url: String,
    pub request_timeout_secs: u64,
    pub profile_policy: ProfilePolicy,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8001".into(),
            database_url: "sqlite://./data/session.db".into(),
            request_timeout_secs: 15,
            profile_policy: ProfilePolicy::AllowIncomplete,
        }
    }
}

impl ClientSettings {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

/// Defaults, then `client.toml` in the working directory, then environment.
pub fn load_settings() -> ClientSettings {
    let settings = read_settings_file(Path::new(SETTINGS_FILE)).unwrap_or_default();
    apply_overrides(settings, |key| std::env::var(key).ok())
}

pub fn read_settings_file(path: &Path) -> Option<ClientSettings> {
    let raw = fs::read_to_string(path).ok()?;
    match toml::from_str::<ClientSettings>(&raw) {
        Ok(settings) => Some(settings),
        Err(error) => {
            warn!(path = %path.display(), %error, "ignoring unreadable settings file");
            None
        }
    }
}

/// Later keys win: `APP__*` overrides the short form.
pub fn apply_overrides<F>(mut settings: ClientSettings, lookup: F) -> ClientSettings
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = lookup("API_BASE_URL") {
        settings.api_base_url = v;
    }
    if let Some(v) = lookup("APP__API_BASE_URL") {
        settings.api_base_url = v;
    }

    if let Some(v) = lookup("SESSION_DATABASE_URL") {
        settings.database_url = v;
    }
    if let Some(v) = lookup("APP__DATABASE_URL") {
        settings.database_url = v;
    }

    if let Some(v) = lookup("APP__REQUEST_TIMEOUT_SECS") {
        match v.parse::<u64>() {
            Ok(parsed) => settings.request_timeout_secs = parsed,
            Err(error) => warn!(value = %v, %error, "ignoring APP__REQUEST_TIMEOUT_SECS"),
        }
    }

    if let Some(v) = lookup("APP__PROFILE_POLICY") {
        match v.parse::<ProfilePolicy>() {
            Ok(policy) => settings.profile_policy = policy,
            Err(error) => warn!(%error, "ignoring APP__PROFILE_POLICY"),
        }
    }

    settings
}

pub fn prepare_database_url(raw_database_url: &str) -> String {
    let raw_database_url = raw_database_url.trim();

    if raw_database_url.is_empty() {
        return ClientSettings::default().database_url;
    }

    if raw_database_url.starts_with("sqlite::memory:") || raw_database_url.contains("://") {
        return raw_database_url.to_string();
    }

    if let Some(path) = raw_database_url.strip_prefix("sqlite:") {
        return format!("sqlite://{}", path.replace('\\', "/"));
    }

    format!("sqlite://{}", raw_database_url.replace('\\', "/"))
}
