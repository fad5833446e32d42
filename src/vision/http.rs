//! JSON-over-HTTP vision client.
//!
//! `POST {endpoint}/detect-labels` with `{"image": {..}, "min_confidence": f}`
//! answers `{"labels": [{"name", "confidence"}]}`.
//! `POST {endpoint}/detect-text` with `{"image": {..}}` answers
//! `{"text_detections": [{"text", "kind": "WORD" | "LINE"}]}`.

use super::{Annotator, Classifier};
use crate::config::secrets::{ExposeSecret, SecretString};
use crate::error::{Error, Result};
use crate::model::{ImageRef, Label, TextDetection};
use crate::telemetry::vision::{record_result_count, start_vision_span};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::Instrument;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Serialize)]
struct DetectLabelsRequest<'a> {
    image: &'a ImageRef,
    min_confidence: f32,
}

#[derive(Deserialize)]
struct DetectLabelsResponse {
    labels: Vec<Label>,
}

#[derive(Serialize)]
struct DetectTextRequest<'a> {
    image: &'a ImageRef,
}

#[derive(Deserialize)]
struct DetectTextResponse {
    text_detections: Vec<TextDetection>,
}

pub struct HttpVision {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<SecretString>,
}

impl HttpVision {
    /// Client with [`DEFAULT_TIMEOUT`] per request.
    pub fn new(endpoint: impl Into<String>, api_key: Option<SecretString>) -> Result<Self> {
        Self::with_timeout(endpoint, api_key, DEFAULT_TIMEOUT)
    }

    /// A call that takes longer than `timeout` fails with `Error::Http`.
    pub fn with_timeout(
        endpoint: impl Into<String>,
        api_key: Option<SecretString>,
        timeout: Duration,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn post<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let mut request = self
            .client
            .post(format!("{}/{path}", self.endpoint))
            .json(body);
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key.expose_secret());
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(Error::Vision(format!("{path} returned {status}: {detail}")));
        }
        Ok(response.json().await?)
    }
}

impl Classifier for HttpVision {
    async fn detect_labels(&self, image: &ImageRef, min_confidence: f32) -> Result<Vec<Label>> {
        let span = start_vision_span("detect_labels", image);
        async {
            let response: DetectLabelsResponse = self
                .post(
                    "detect-labels",
                    &DetectLabelsRequest {
                        image,
                        min_confidence,
                    },
                )
                .await?;
            record_result_count(&tracing::Span::current(), response.labels.len());
            Ok(response.labels)
        }
        .instrument(span)
        .await
    }
}

impl Annotator for HttpVision {
    async fn detect_text(&self, image: &ImageRef) -> Result<Vec<TextDetection>> {
        let span = start_vision_span("detect_text", image);
        async {
            let response: DetectTextResponse = self
                .post("detect-text", &DetectTextRequest { image })
                .await?;
            record_result_count(&tracing::Span::current(), response.text_detections.len());
            Ok(response.text_detections)
        }
        .instrument(span)
        .await
    }
}
