use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::error::{RemoteError, StorageError, ValidationError};
use crate::models::ViewMode;
use crate::remote::{DashboardService, ServerSettings};
use crate::storage::KeyValueStore;

pub const LOCAL_SETTINGS_KEY: &str = "instructorSettings";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub client_refresh_seconds: u64,
    pub server_poll_interval_seconds: u64,
    pub instructor_name: String,
    pub instructor_email: String,
    pub notify_updates: bool,
    pub sound_enabled: bool,
    pub default_view: ViewMode,
    pub items_per_page: usize,
    pub show_viewed_students: bool,
    pub github_token: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            client_refresh_seconds: 60,
            server_poll_interval_seconds: 300,
            instructor_name: String::new(),
            instructor_email: String::new(),
            notify_updates: true,
            sound_enabled: false,
            default_view: ViewMode::Card,
            items_per_page: 20,
            show_viewed_students: true,
            github_token: String::new(),
        }
    }
}

/// Keys persisted on this device only.
#[derive(Debug, Clone, PartialEq, Serialize)]
struct LocalSettings<'a> {
    instructor_name: &'a str,
    instructor_email: &'a str,
    notify_updates: bool,
    sound_enabled: bool,
    default_view: ViewMode,
    items_per_page: usize,
    show_viewed_students: bool,
    github_token: &'a str,
}

impl Settings {
    pub fn server_subset(&self) -> ServerSettings {
        ServerSettings {
            client_refresh_seconds: self.client_refresh_seconds,
            server_poll_interval_seconds: self.server_poll_interval_seconds,
        }
    }

    fn local_subset(&self) -> LocalSettings<'_> {
        LocalSettings {
            instructor_name: &self.instructor_name,
            instructor_email: &self.instructor_email,
            notify_updates: self.notify_updates,
            sound_enabled: self.sound_enabled,
            default_view: self.default_view,
            items_per_page: self.items_per_page,
            show_viewed_students: self.show_viewed_students,
            github_token: &self.github_token,
        }
    }

    fn apply_server(&mut self, server: ServerSettings) {
        self.client_refresh_seconds = server.client_refresh_seconds;
        self.server_poll_interval_seconds = server.server_poll_interval_seconds;
    }

    fn apply_local_from(&mut self, other: &Settings) {
        let server = self.server_subset();
        *self = other.clone();
        self.apply_server(server);
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.client_refresh_seconds == 0 || self.server_poll_interval_seconds == 0 {
            return Err(ValidationError::ZeroInterval);
        }
        Ok(())
    }
}

/// Later layers win key by key. A key whose value does not fit the
/// settings schema is dropped and the earlier value is kept.
pub fn merge_layers(defaults: &Settings, layers: &[&Map<String, Value>]) -> Settings {
    let mut merged = match serde_json::to_value(defaults) {
        Ok(Value::Object(map)) => map,
        _ => return defaults.clone(),
    };

    for layer in layers {
        for (key, value) in layer.iter() {
            if !merged.contains_key(key) {
                continue;
            }
            let mut candidate = merged.clone();
            candidate.insert(key.clone(), value.clone());
            if serde_json::from_value::<Settings>(Value::Object(candidate)).is_ok() {
                merged.insert(key.clone(), value.clone());
            } else {
                warn!(key = %key, value = %value, "ignoring settings value of the wrong type");
            }
        }
    }

    serde_json::from_value(Value::Object(merged)).unwrap_or_else(|_| defaults.clone())
}

#[derive(Debug)]
pub struct LoadedSettings {
    pub effective: Settings,
    pub server_error: Option<RemoteError>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SettingsLayer {
    Server,
    Local,
}

/// Result of the two independent writes performed by a save.
#[derive(Debug)]
pub enum SaveOutcome {
    Saved(Settings),
    Partial {
        effective: Settings,
        failed: SettingsLayer,
        error: String,
    },
    Failed {
        server_error: RemoteError,
        local_error: StorageError,
    },
}

impl SaveOutcome {
    pub fn effective(&self) -> Option<&Settings> {
        match self {
            SaveOutcome::Saved(settings) | SaveOutcome::Partial { effective: settings, .. } => {
                Some(settings)
            }
            SaveOutcome::Failed { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            SaveOutcome::Saved(_) => "✓ 所有设置已保存".to_string(),
            SaveOutcome::Partial {
                failed: SettingsLayer::Server,
                ..
            } => "⚠ 本地设置已保存，服务器设置保存失败".to_string(),
            SaveOutcome::Partial {
                failed: SettingsLayer::Local,
                ..
            } => "⚠ 服务器设置已保存，本地设置保存失败".to_string(),
            SaveOutcome::Failed { .. } => "✗ 保存设置失败".to_string(),
        }
    }
}

#[derive(Clone)]
pub struct SettingsReconciler {
    service: Arc<dyn DashboardService>,
    storage: Arc<dyn KeyValueStore>,
    defaults: Settings,
}

impl SettingsReconciler {
    pub fn new(service: Arc<dyn DashboardService>, storage: Arc<dyn KeyValueStore>) -> Self {
        Self {
            service,
            storage,
            defaults: Settings::default(),
        }
    }

    /// Missing or unreadable layers count as empty; a failed server read
    /// is reported alongside the effective settings.
    pub async fn load(&self) -> LoadedSettings {
        let (server_layer, server_error) = match self.service.fetch_settings().await {
            Ok(map) => (map, None),
            Err(err) => {
                warn!(error = %err, "server settings unavailable, using defaults");
                (Map::new(), Some(err))
            }
        };
        let local_layer = self.local_layer().await;
        let effective = merge_layers(&self.defaults, &[&server_layer, &local_layer]);
        info!(
            refresh = effective.client_refresh_seconds,
            poll = effective.server_poll_interval_seconds,
            "settings loaded"
        );
        LoadedSettings {
            effective,
            server_error,
        }
    }

    async fn local_layer(&self) -> Map<String, Value> {
        let raw = match self.storage.get(LOCAL_SETTINGS_KEY).await {
            Ok(Some(raw)) => raw,
            Ok(None) => return Map::new(),
            Err(err) => {
                warn!(error = %err, "device-local settings unreadable");
                return Map::new();
            }
        };
        match serde_json::from_str(&raw) {
            Ok(Value::Object(map)) => map,
            Ok(_) | Err(_) => {
                warn!("device-local settings are not a JSON object, ignoring");
                Map::new()
            }
        }
    }

    /// Writes the server-owned subset, then the device-local subset. The
    /// second write is attempted whatever happened to the first.
    pub async fn save(
        &self,
        current: &Settings,
        desired: &Settings,
    ) -> Result<SaveOutcome, ValidationError> {
        desired.validate()?;

        let server_result = self.service.save_settings(desired.server_subset()).await;
        let local_result = match serde_json::to_string(&desired.local_subset()) {
            Ok(encoded) => self.storage.set(LOCAL_SETTINGS_KEY, &encoded).await,
            Err(err) => Err(StorageError::Encoding(err)),
        };

        let mut effective = current.clone();
        let outcome = match (server_result, local_result) {
            (Ok(saved), Ok(())) => {
                effective.apply_local_from(desired);
                effective.apply_server(saved);
                SaveOutcome::Saved(effective)
            }
            (Ok(saved), Err(local_error)) => {
                effective.apply_server(saved);
                SaveOutcome::Partial {
                    effective,
                    failed: SettingsLayer::Local,
                    error: local_error.to_string(),
                }
            }
            (Err(server_error), Ok(())) => {
                effective.apply_local_from(desired);
                SaveOutcome::Partial {
                    effective,
                    failed: SettingsLayer::Server,
                    error: server_error.to_string(),
                }
            }
            (Err(server_error), Err(local_error)) => SaveOutcome::Failed {
                server_error,
                local_error,
            },
        };
        match &outcome {
            SaveOutcome::Saved(_) => info!("settings saved"),
            SaveOutcome::Partial { failed, error, .. } => {
                warn!(?failed, %error, "settings saved partially")
            }
            SaveOutcome::Failed {
                server_error,
                local_error,
            } => warn!(%server_error, %local_error, "settings save failed"),
        }
        Ok(outcome)
    }

    /// Drops the device-local layer; server-owned values are untouched.
    pub async fn reset_local(&self, current: &Settings) -> Result<Settings, StorageError> {
        self.storage.remove(LOCAL_SETTINGS_KEY).await?;
        let mut effective = self.defaults.clone();
        effective.apply_server(current.server_subset());
        Ok(effective)
    }
}
