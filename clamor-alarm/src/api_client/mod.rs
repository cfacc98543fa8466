//! HTTP client for the daemon's API, used by `clamor-cli`.

pub mod types;

use anyhow::{Context, Result, anyhow, bail};
use reqwest::{Response, StatusCode, Url};
use serde::de::DeserializeOwned;

use types::{AlarmDraft, AlarmId, AlarmRecord, EnabledPatch, RingStatus, Silenced};

pub const DEFAULT_BASE_URL: &str = "http://127.0.0.1:7786";

pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl Client {
    pub fn new() -> Self {
        Self::with_base_url(DEFAULT_BASE_URL)
    }

    pub fn with_base_url(base_url: impl Into<String>) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api/v0{path}", self.base_url)
    }

    /// URL of one alarm. The id is a single path segment, escaped.
    fn alarm_url(&self, id: &AlarmId) -> Result<Url> {
        let mut url = Url::parse(&self.url("/alarms"))
            .with_context(|| format!("invalid API URL {}", self.base_url))?;
        url.path_segments_mut()
            .map_err(|()| anyhow!("API URL {} cannot take a path", self.base_url))?
            .push(id.as_str());
        Ok(url)
    }

    pub async fn list_alarms(&self) -> Result<Vec<AlarmRecord>> {
        let response = self.http.get(self.url("/alarms")).send().await?;
        json(response).await
    }

    pub async fn create_alarm(&self, draft: &AlarmDraft) -> Result<AlarmRecord> {
        let response = self
            .http
            .post(self.url("/alarms"))
            .json(draft)
            .send()
            .await?;
        json(response).await
    }

    pub async fn edit_alarm(&self, id: &AlarmId, draft: &AlarmDraft) -> Result<AlarmRecord> {
        let response = self
            .http
            .put(self.alarm_url(id)?)
            .json(draft)
            .send()
            .await?;
        json(response).await
    }

    pub async fn delete_alarm(&self, id: &AlarmId) -> Result<()> {
        let response = self
            .http
            .delete(self.alarm_url(id)?)
            .send()
            .await?;
        check(response).await.map(drop)
    }

    pub async fn set_enabled(&self, id: &AlarmId, enabled: bool) -> Result<AlarmRecord> {
        let response = self
            .http
            .patch(self.alarm_url(id)?)
            .json(&EnabledPatch { enabled })
            .send()
            .await?;
        json(response).await
    }

    pub async fn ring_status(&self) -> Result<RingStatus> {
        let response = self.http.get(self.url("/ringing")).send().await?;
        json(response).await
    }

    pub async fn silence(&self) -> Result<AlarmId> {
        let response = self
            .http
            .post(self.url("/ringing/silence"))
            .send()
            .await?;
        let silenced: Silenced = json(response).await?;
        Ok(silenced.alarm_id)
    }
}

impl Default for Client {
    fn default() -> Self {
        Self::new()
    }
}

/// Turn non-success statuses into errors carrying the server's message.
async fn check(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    match status {
        StatusCode::NOT_FOUND => bail!("no such alarm"),
        StatusCode::CONFLICT if !body.is_empty() => bail!("{body}"),
        _ => bail!("daemon returned {status}: {body}"),
    }
}

async fn json<T: DeserializeOwned>(response: Response) -> Result<T> {
    check(response)
        .await?
        .json()
        .await
        .context("decoding daemon response")
}
