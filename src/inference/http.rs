use anyhow::{anyhow, Context, Result};
use std::time::Duration;

use super::InferenceTransport;

/// HTTP transport for the inference service.
///
/// Posts one JPEG still per call to the configured analyze endpoint. The
/// frame is sent as a raw `image/jpeg` body; the endpoint contract is one
/// still image per request.
pub struct HttpTransport {
    url: String,
    agent: ureq::Agent,
}

impl HttpTransport {
    pub fn new(url: String, timeout: Duration) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout_connect(timeout)
            .timeout(timeout)
            .build();
        Self { url, agent }
    }
}

impl InferenceTransport for HttpTransport {
    fn post_frame(&mut self, jpeg: &[u8]) -> Result<String> {
        let response = self
            .agent
            .post(&self.url)
            .set("Content-Type", "image/jpeg")
            .send_bytes(jpeg)
            .map_err(|e| match e {
                ureq::Error::Status(code, _) => anyhow!("API error: {}", code),
                other => anyhow!("{}", other),
            })
            .with_context(|| format!("post frame to {}", self.url))?;

        response
            .into_string()
            .context("read inference response body")
    }
}
