use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::app::Result;
use crate::domain::Credential;
use crate::partner::{LinkApi, LinkOutcome};

#[derive(Serialize)]
struct CreateLinkRequest<'a> {
    url: &'a str,
}

#[derive(Deserialize, Default)]
struct CreateLinkResponse {
    link: Option<String>,
    #[serde(rename = "shortLink")]
    short_link: Option<String>,
    url: Option<String>,
}

/// Link generation over HTTP: `POST {"url": ...}` with a bearer token.
pub struct HttpLinkApi {
    client: Client,
    endpoint: Url,
}

impl HttpLinkApi {
    pub fn new(endpoint: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .user_agent(concat!("affilink/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            endpoint: Url::parse(endpoint)?,
        })
    }

    pub fn endpoint(&self) -> &Url {
        &self.endpoint
    }
}

#[async_trait]
impl LinkApi for HttpLinkApi {
    async fn create_link(&self, url: &str, credential: &Credential) -> LinkOutcome {
        let response = self
            .client
            .post(self.endpoint.clone())
            .bearer_auth(&credential.token)
            .json(&CreateLinkRequest { url })
            .send()
            .await;

        let response = match response {
            Ok(response) => response,
            Err(e) if e.is_timeout() => {
                return LinkOutcome::Fatal(format!("link request timed out: {}", e))
            }
            Err(e) => return LinkOutcome::Fatal(e.to_string()),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return LinkOutcome::Fatal(format!("failed to read response: {}", e)),
        };

        classify_response(status, &body)
    }
}

fn classify_response(status: StatusCode, body: &str) -> LinkOutcome {
    if status == StatusCode::CONFLICT || mentions_in_progress(body) {
        return LinkOutcome::Transient;
    }

    if !status.is_success() {
        return LinkOutcome::Fatal(format!("partner returned HTTP {}", status));
    }

    let parsed: CreateLinkResponse = match serde_json::from_str(body) {
        Ok(parsed) => parsed,
        // Some partners answer with the bare link as text.
        Err(_) if body.trim().starts_with("http") => {
            return LinkOutcome::Success(body.trim().to_string())
        }
        Err(e) => return LinkOutcome::Fatal(format!("unexpected response body: {}", e)),
    };

    parsed
        .link
        .or(parsed.short_link)
        .or(parsed.url)
        .filter(|link| !link.trim().is_empty())
        .map(LinkOutcome::Success)
        .unwrap_or_else(|| LinkOutcome::Fatal("response carried no link".to_string()))
}

fn mentions_in_progress(body: &str) -> bool {
    let body = body.to_lowercase();
    body.contains("in progress") || body.contains("already being generated")
}
