//! HTTP client for the WhatsApp messaging gateway.

use crate::model::GatewayConfig;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("gateway returned {status}: {body}")]
    Status { status: StatusCode, body: String },
    #[error("gateway request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("invalid gateway url: {0}")]
    Url(#[from] url::ParseError),
}

/// Outbound messaging to a single, already normalized destination.
///
/// Success means the gateway accepted the request with a 2xx status. Payloads are not
/// inspected for delivery confirmation and nothing is retried.
#[async_trait]
pub trait Gateway: Send + Sync {
    async fn send_text(&self, destination: &str, text: &str) -> Result<(), GatewayError>;

    async fn send_image(
        &self,
        destination: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<(), GatewayError>;
}

#[derive(Serialize)]
struct TextBody<'a> {
    number: &'a str,
    text: &'a str,
}

#[derive(Serialize)]
struct MediaBody<'a> {
    number: &'a str,
    mediatype: &'static str,
    media: &'a str,
    caption: &'a str,
}

pub struct HttpGateway {
    http: reqwest::Client,
    base_url: Url,
    instance: String,
    api_key: Option<String>,
}

impl HttpGateway {
    pub fn new(cfg: &GatewayConfig) -> Result<Self, GatewayError> {
        let mut builder = reqwest::Client::builder().user_agent(cfg.user_agent.clone());
        if let Some(timeout) = cfg.request_timeout {
            builder = builder.timeout(timeout);
        }
        let http = builder.build()?;

        let base_url = Url::parse(cfg.base_url.trim())?;

        Ok(Self {
            http,
            base_url,
            instance: cfg.instance.clone(),
            api_key: cfg.api_key.clone().filter(|k| !k.is_empty()),
        })
    }

    /// `{base_url}/message/{action}/{instance}`, keeping any path prefix of the base.
    fn endpoint(&self, action: &str) -> Result<Url, GatewayError> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| url::ParseError::RelativeUrlWithCannotBeABaseBase)?
            .pop_if_empty()
            .extend(["message", action, self.instance.as_str()]);
        Ok(url)
    }

    async fn post<B: Serialize + ?Sized>(&self, action: &str, body: &B) -> Result<(), GatewayError> {
        let url = self.endpoint(action)?;
        let mut req = self.http.post(url).json(body);
        if let Some(key) = &self.api_key {
            req = req.header("apikey", key);
        }

        let resp = req.send().await?;
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(GatewayError::Status { status, body })
    }
}

#[async_trait]
impl Gateway for HttpGateway {
    async fn send_text(&self, destination: &str, text: &str) -> Result<(), GatewayError> {
        self.post(
            "sendText",
            &TextBody {
                number: destination,
                text,
            },
        )
        .await
    }

    async fn send_image(
        &self,
        destination: &str,
        image_url: &str,
        caption: &str,
    ) -> Result<(), GatewayError> {
        self.post(
            "sendMedia",
            &MediaBody {
                number: destination,
                mediatype: "image",
                media: image_url,
                caption,
            },
        )
        .await
    }
}
