//! Push notification channel.
//!
//! Reports go out through a ServerChan-compatible push gateway: an HTTP POST
//! of `title`/`desp` form fields to `{api_base}/{key}.send`, answered with a
//! JSON envelope whose `code` is zero on success.

use std::time::Duration;

use serde::Deserialize;
use tracing::info;

#[derive(thiserror::Error, Debug)]
pub enum NotifyError {
    #[error("push request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("push gateway rejected the message: {0}")]
    Rejected(String),
}

#[derive(Debug, Deserialize)]
struct PushReply {
    code: i64,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Clone)]
pub struct PushNotifier {
    client: reqwest::Client,
    api_base: String,
}

impl PushNotifier {
    pub fn new(api_base: &str) -> Result<Self, NotifyError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
        })
    }

    /// Send one message through the per-device key. A transport failure and
    /// a gateway rejection both surface as errors; the caller decides how
    /// loudly to log them.
    pub async fn send(&self, key: &str, title: &str, body: &str) -> Result<(), NotifyError> {
        let url = format!("{}/{key}.send", self.api_base);
        let reply: PushReply = self
            .client
            .post(&url)
            .form(&[("title", title), ("desp", body)])
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        if reply.code == 0 {
            info!(title = %title, "push notification sent");
            Ok(())
        } else {
            Err(NotifyError::Rejected(reply.message))
        }
    }
}
