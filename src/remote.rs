use async_trait::async_trait;
use reqwest::Url;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{RejectReason, RemoteError};
use crate::models::{
    ImportSummary, LeaderboardEntry, Remarks, SortKey, StudentDetails, StudentDraft,
    StudentRecord,
};

/// Settings keys the service owns. Everything else stays on this device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerSettings {
    pub client_refresh_seconds: u64,
    pub server_poll_interval_seconds: u64,
}

/// Request surface of the dashboard service.
#[async_trait]
pub trait DashboardService: Send + Sync {
    async fn list_students(&self) -> Result<Vec<StudentRecord>, RemoteError>;
    async fn trigger_check(&self) -> Result<(), RemoteError>;
    async fn mark_viewed(&self, name: &str) -> Result<(), RemoteError>;
    async fn fetch_settings(&self) -> Result<Map<String, Value>, RemoteError>;
    async fn save_settings(&self, settings: ServerSettings) -> Result<ServerSettings, RemoteError>;
    async fn import_students(&self, text: &str) -> Result<ImportSummary, RemoteError>;
    async fn add_student(&self, draft: &StudentDraft) -> Result<(), RemoteError>;
    async fn update_student(&self, old_name: &str, draft: &StudentDraft)
        -> Result<(), RemoteError>;
    async fn delete_student(&self, name: &str) -> Result<(), RemoteError>;
    async fn set_score(&self, name: &str, phase: usize, score: u8) -> Result<(), RemoteError>;
    async fn export_csv(&self) -> Result<String, RemoteError>;
    async fn leaderboard(&self, sort: SortKey) -> Result<Vec<LeaderboardEntry>, RemoteError>;
    async fn student_details(&self, name: &str) -> Result<StudentDetails, RemoteError>;
    async fn save_remarks(&self, name: &str, remarks: &Remarks) -> Result<(), RemoteError>;
}

#[derive(Debug, Deserialize)]
struct SavedSettings {
    settings: ServerSettings,
}

pub struct HttpService {
    client: reqwest::Client,
    base: Url,
}

impl HttpService {
    pub fn new(base_url: &str) -> Result<Self, RemoteError> {
        let base = Url::parse(base_url)
            .map_err(|e| RemoteError::Transport(format!("invalid server url {base_url}: {e}")))?;
        let client = reqwest::Client::builder()
            .user_agent(concat!("homework-dashboard/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client, base })
    }

    fn endpoint(&self, segments: &[&str]) -> Result<Url, RemoteError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| RemoteError::Transport(format!("{} cannot be a base url", self.base)))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    async fn get_json<R: DeserializeOwned>(&self, segments: &[&str]) -> Result<R, RemoteError> {
        let url = self.endpoint(segments)?;
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        decode(response).await
    }

    async fn post_json<B, R>(&self, segments: &[&str], body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let url = self.endpoint(segments)?;
        debug!(%url, "POST");
        let response = self.client.post(url).json(body).send().await?;
        decode(response).await
    }

    async fn post_ack<B: Serialize + ?Sized>(
        &self,
        segments: &[&str],
        body: &B,
    ) -> Result<(), RemoteError> {
        let _: Value = self.post_json(segments, body).await?;
        Ok(())
    }
}

/// Applies the `{ok, error}` envelope: a non-2xx status or `ok: false`
/// becomes a rejection carrying the service's error code.
async fn decode<R: DeserializeOwned>(response: reqwest::Response) -> Result<R, RemoteError> {
    let status = response.status();
    let bytes = response.bytes().await?;
    let body: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(_) if !status.is_success() => Value::Null,
        Err(e) => return Err(RemoteError::Decode(e.to_string())),
    };

    let refused = body.get("ok").and_then(Value::as_bool) == Some(false);
    if !status.is_success() || refused {
        let code = body.get("error").and_then(Value::as_str).unwrap_or_default();
        return Err(RemoteError::Rejected {
            status: status.as_u16(),
            reason: RejectReason::from_code(code),
        });
    }

    serde_json::from_value(body).map_err(|e| RemoteError::Decode(e.to_string()))
}

#[async_trait]
impl DashboardService for HttpService {
    async fn list_students(&self) -> Result<Vec<StudentRecord>, RemoteError> {
        self.get_json(&["api", "list"]).await
    }

    async fn trigger_check(&self) -> Result<(), RemoteError> {
        let url = self.endpoint(&["api", "check"])?;
        debug!(%url, "POST");
        let response = self.client.post(url).send().await?;
        let _: Value = decode(response).await?;
        Ok(())
    }

    async fn mark_viewed(&self, name: &str) -> Result<(), RemoteError> {
        self.post_ack(&["api", "mark_viewed"], &serde_json::json!({ "name": name }))
            .await
    }

    async fn fetch_settings(&self) -> Result<Map<String, Value>, RemoteError> {
        self.get_json(&["api", "settings"]).await
    }

    async fn save_settings(&self, settings: ServerSettings) -> Result<ServerSettings, RemoteError> {
        let saved: SavedSettings = self.post_json(&["api", "settings"], &settings).await?;
        Ok(saved.settings)
    }

    async fn import_students(&self, text: &str) -> Result<ImportSummary, RemoteError> {
        self.post_json(&["api", "students", "import"], &serde_json::json!({ "text": text }))
            .await
    }

    async fn add_student(&self, draft: &StudentDraft) -> Result<(), RemoteError> {
        self.post_ack(&["api", "students", "add"], draft).await
    }

    async fn update_student(
        &self,
        old_name: &str,
        draft: &StudentDraft,
    ) -> Result<(), RemoteError> {
        let body = serde_json::json!({
            "name": draft.name,
            "repo": draft.repo,
            "old_name": old_name,
        });
        self.post_ack(&["api", "students", "update"], &body).await
    }

    async fn delete_student(&self, name: &str) -> Result<(), RemoteError> {
        self.post_ack(&["api", "students", "delete"], &serde_json::json!({ "name": name }))
            .await
    }

    async fn set_score(&self, name: &str, phase: usize, score: u8) -> Result<(), RemoteError> {
        let body = serde_json::json!({ "name": name, "phase": phase, "score": score });
        self.post_ack(&["api", "students", "score"], &body).await
    }

    async fn export_csv(&self) -> Result<String, RemoteError> {
        let url = self.endpoint(&["api", "export", "csv"])?;
        debug!(%url, "GET");
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                reason: RejectReason::Other(status.to_string()),
            });
        }
        let bytes = response.bytes().await?;
        let text = String::from_utf8(bytes.to_vec()).map_err(|e| RemoteError::Decode(e.to_string()))?;
        Ok(text.trim_start_matches('\u{feff}').to_string())
    }

    async fn leaderboard(&self, sort: SortKey) -> Result<Vec<LeaderboardEntry>, RemoteError> {
        let url = self.endpoint(&["api", "leaderboard"])?;
        debug!(%url, sort = sort.as_param(), "GET");
        let response = self
            .client
            .get(url)
            .query(&[("sort_by", sort.as_param())])
            .send()
            .await?;
        decode(response).await
    }

    async fn student_details(&self, name: &str) -> Result<StudentDetails, RemoteError> {
        self.get_json(&["api", "students", name, "details"]).await
    }

    async fn save_remarks(&self, name: &str, remarks: &Remarks) -> Result<(), RemoteError> {
        self.post_ack(&["api", "students", name, "remarks"], remarks).await
    }
}
