//! Recipient and settings sources: a local supporter export or the campaign site's backend.

use crate::model::Recipient;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid supporter data: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("backend request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("invalid backend url: {0}")]
    Url(#[from] url::ParseError),
}

/// Parse a JSON array of supporter rows. Rows without a usable name are dropped;
/// rows without a phone are kept so the run logs them as skipped.
pub fn parse_recipients(json: &str) -> Result<Vec<Recipient>, SourceError> {
    let rows: Vec<serde_json::Value> = serde_json::from_str(json)?;
    let mut out = Vec::with_capacity(rows.len());
    for (i, row) in rows.into_iter().enumerate() {
        match serde_json::from_value::<Recipient>(row) {
            Ok(r) if !r.display_name.trim().is_empty() => out.push(r),
            Ok(_) => warn!(row = i, "dropping supporter row with empty name"),
            Err(e) => warn!(row = i, error = %e, "dropping malformed supporter row"),
        }
    }
    Ok(out)
}

pub fn load_recipients_file(path: &Path) -> Result<Vec<Recipient>, SourceError> {
    let json = std::fs::read_to_string(path).map_err(|source| SourceError::Io {
        path: path.display().to_string(),
        source,
    })?;
    let recipients = parse_recipients(&json)?;
    info!(path = %path.display(), count = recipients.len(), "loaded recipients");
    Ok(recipients)
}

/// Read-only client for the campaign site's REST backend.
pub struct BackendClient {
    http: reqwest::Client,
    base_url: url::Url,
}

impl BackendClient {
    pub fn new(base_url: &str, user_agent: &str) -> Result<Self, SourceError> {
        let http = reqwest::Client::builder().user_agent(user_agent).build()?;
        let base_url = url::Url::parse(base_url.trim())?;
        Ok(Self { http, base_url })
    }

    fn api_url(&self, resource: &str) -> Result<url::Url, SourceError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["api", resource]);
        Ok(url)
    }

    /// `GET /api/supporters`
    pub async fn fetch_supporters(&self) -> Result<Vec<Recipient>, SourceError> {
        let body = self
            .http
            .get(self.api_url("supporters")?)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        let recipients = parse_recipients(&body)?;
        info!(count = recipients.len(), "fetched supporters from backend");
        Ok(recipients)
    }

    /// `GET /api/settings`, a flat key/value object. Null and non-string values are
    /// stringified or dropped.
    pub async fn fetch_settings(&self) -> Result<HashMap<String, String>, SourceError> {
        let raw: HashMap<String, serde_json::Value> = self
            .http
            .get(self.api_url("settings")?)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|(k, v)| match v {
                serde_json::Value::String(s) => Some((k, s)),
                serde_json::Value::Null => None,
                other => Some((k, other.to_string())),
            })
            .collect())
    }
}
