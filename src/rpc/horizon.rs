//! Horizon-style transaction submission.
//!
//! An alternative submission endpoint that accepts a form-encoded signed
//! envelope and answers with a JSON body carrying `successful` and
//! `hash`. Used by the general execution surface when a horizon endpoint
//! is configured; the RPC submission path is the default.

use std::time::Duration;

use serde_json::Value;
use tracing::debug;

use crate::error::PipelineError;

/// Client for a horizon-style `POST /transactions` endpoint.
pub struct HorizonClient {
    client: reqwest::Client,
    base_url: String,
}

impl HorizonClient {
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, PipelineError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Submit a signed envelope. A response without `successful: true`
    /// is a submission failure carrying the raw body; resubmission is
    /// the caller's decision, never automatic.
    pub async fn submit(&self, envelope_b64: &str) -> Result<String, PipelineError> {
        let url = format!("{}/transactions", self.base_url.trim_end_matches('/'));
        debug!(%url, "horizon submission");
        let response = self
            .client
            .post(&url)
            .form(&[("tx", envelope_b64)])
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    PipelineError::RpcTimeout {
                        method: "horizon/transactions".to_string(),
                    }
                } else {
                    PipelineError::Http(e)
                }
            })?;

        let status = response.status();
        let body: Value = response.json().await.unwrap_or(Value::Null);

        let successful = body
            .get("successful")
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if !status.is_success() || !successful {
            return Err(PipelineError::Submission {
                status: status.as_u16().to_string(),
                raw: body.to_string(),
            });
        }
        body.get("hash")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(PipelineError::MalformedResponse {
                method: "horizon/transactions".to_string(),
                raw: body,
            })
    }
}
