use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::multipart::Form;
use serde::Deserialize;
use tracing::{info, warn};

use crate::ai::{strip_data_uri, truncate_for_log};
use crate::config::ImageHostConfig;
use crate::error::HostError;

/// Durable hosting for generated images.
#[async_trait]
pub trait ImageUploader: Send + Sync {
    /// Upload a base64 data-URI image and return its public URL.
    async fn upload(&self, data_uri: &str) -> Result<String>;
}

/// imgbb-style uploader: multipart POST of the base64 payload, key in the query.
pub struct ImgbbUploader {
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    expiration: Option<u64>,
}

#[derive(Deserialize, Debug)]
struct HostResponse {
    success: Option<bool>,
    data: Option<HostData>,
}

#[derive(Deserialize, Debug)]
struct HostData {
    url: Option<String>,
}

impl ImgbbUploader {
    pub fn new(config: &ImageHostConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .user_agent(concat!("blogsmith/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(HostError::Http)?;

        Ok(Self {
            http,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().filter(|k| !k.is_empty()),
            expiration: config.expiration,
        })
    }
}

#[async_trait]
impl ImageUploader for ImgbbUploader {
    async fn upload(&self, data_uri: &str) -> Result<String> {
        let api_key = self.api_key.as_deref().ok_or(HostError::MissingCredential)?;
        let payload = strip_data_uri(data_uri).to_string();

        let mut query = vec![("key", api_key.to_string())];
        if let Some(expiration) = self.expiration {
            query.push(("expiration", expiration.to_string()));
        }

        let form = Form::new().text("image", payload);

        let response = self
            .http
            .post(&self.endpoint)
            .query(&query)
            .multipart(form)
            .send()
            .await
            .map_err(HostError::Http)?;

        let status = response.status();
        let body = response.text().await.map_err(HostError::Http)?;

        if !status.is_success() {
            warn!(status = %status, body = %truncate_for_log(&body, 500), "image upload rejected");
            return Err(HostError::UploadRejected {
                status: status.as_u16(),
                body,
            }
            .into());
        }

        let url = parse_host_response(&body)?;
        info!(url = %url, "image hosted");
        Ok(url)
    }
}

/// Require both a true success flag and a URL.
fn parse_host_response(body: &str) -> Result<String, HostError> {
    let parsed: HostResponse =
        serde_json::from_str(body).map_err(|e| HostError::MalformedHostResponse(e.to_string()))?;

    if parsed.success != Some(true) {
        return Err(HostError::MalformedHostResponse(format!(
            "success flag missing or false: {}",
            truncate_for_log(body, 200)
        )));
    }

    parsed
        .data
        .and_then(|d| d.url)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| HostError::MalformedHostResponse("response has no data.url".to_string()))
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    use axum::Router;
    use axum::extract::Query;
    use axum::http::StatusCode;
    use axum::routing::post;

    use super::*;
    use crate::ai::tests::serve_stub;

    #[derive(Default)]
    struct Captured {
        query: HashMap<String, String>,
        body: String,
    }

    /// Upload stub answering with `status` and `reply`, recording query and raw multipart body.
    async fn host_stub(status: StatusCode, reply: &'static str) -> (String, Arc<Mutex<Captured>>) {
        let captured: Arc<Mutex<Captured>> = Arc::default();
        let seen = captured.clone();
        let router = Router::new().route(
            "/upload",
            post(move |Query(query): Query<HashMap<String, String>>, body: String| {
                let seen = seen.clone();
                async move {
                    *seen.lock().unwrap() = Captured { query, body };
                    (status, reply)
                }
            }),
        );
        (format!("{}/upload", serve_stub(router).await), captured)
    }

    fn uploader(endpoint: String, expiration: Option<u64>) -> ImgbbUploader {
        ImgbbUploader::new(&ImageHostConfig {
            endpoint,
            api_key: Some("host-key".to_string()),
            expiration,
        })
        .unwrap()
    }

    #[test]
    fn accepts_successful_response() {
        let body = r#"{"data": {"id": "abc", "url": "https://i.ibb.co/abc/image.png"}, "success": true, "status": 200}"#;
        assert_eq!(parse_host_response(body).unwrap(), "https://i.ibb.co/abc/image.png");
    }

    #[test]
    fn rejects_missing_success_or_url() {
        let no_flag = r#"{"data": {"url": "https://i.ibb.co/x.png"}}"#;
        assert!(matches!(parse_host_response(no_flag), Err(HostError::MalformedHostResponse(_))));

        let no_url = r#"{"data": {}, "success": true}"#;
        assert!(matches!(parse_host_response(no_url), Err(HostError::MalformedHostResponse(_))));

        assert!(matches!(
            parse_host_response("<html>oops</html>"),
            Err(HostError::MalformedHostResponse(_))
        ));
    }

    #[tokio::test]
    async fn missing_key_fails_before_request() {
        let uploader = ImgbbUploader::new(&ImageHostConfig {
            api_key: Some(String::new()),
            ..ImageHostConfig::default()
        })
        .unwrap();
        let err = uploader.upload("data:image/png;base64,AAAA").await.unwrap_err();
        assert!(matches!(err.downcast_ref::<HostError>(), Some(HostError::MissingCredential)));
    }

    #[tokio::test]
    async fn uploads_raw_payload_and_returns_url() {
        let (endpoint, captured) = host_stub(
            StatusCode::OK,
            r#"{"data": {"url": "https://i.ibb.co/x.png"}, "success": true, "status": 200}"#,
        )
        .await;

        let url = uploader(endpoint, Some(600))
            .upload("data:image/png;base64,iVBORw0KGgo")
            .await
            .unwrap();
        assert_eq!(url, "https://i.ibb.co/x.png");

        let captured = captured.lock().unwrap();
        assert_eq!(captured.query.get("key").map(String::as_str), Some("host-key"));
        assert_eq!(captured.query.get("expiration").map(String::as_str), Some("600"));
        assert!(captured.body.contains("name=\"image\""));
        assert!(captured.body.contains("\r\n\r\niVBORw0KGgo\r\n"));
        assert!(!captured.body.contains("data:image"));
    }

    #[tokio::test]
    async fn rejected_upload_carries_status_and_body() {
        let (endpoint, captured) = host_stub(StatusCode::BAD_REQUEST, "quota exceeded").await;

        let err = uploader(endpoint, None).upload("iVBORw0KGgo").await.unwrap_err();
        match err.downcast_ref::<HostError>() {
            Some(HostError::UploadRejected { status, body }) => {
                assert_eq!(*status, 400);
                assert_eq!(body, "quota exceeded");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(!captured.lock().unwrap().query.contains_key("expiration"));
    }

    #[tokio::test]
    async fn success_status_with_failed_flag_is_malformed() {
        let (endpoint, _) = host_stub(StatusCode::OK, r#"{"success": false}"#).await;

        let err = uploader(endpoint, None).upload("iVBORw0KGgo").await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<HostError>(),
            Some(HostError::MalformedHostResponse(_))
        ));
    }
}
