//! Shared HTTP plumbing for the adapters.

use std::time::Duration;

use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;

use lifeline_shared::constants::USER_AGENT;
use lifeline_shared::error::SourceError;

/// Client used by every adapter. Met Norway rejects requests without a
/// `User-Agent`, so one is always set.
pub fn build_client(request_timeout: Duration) -> reqwest::Result<Client> {
    Client::builder()
        .user_agent(USER_AGENT)
        .timeout(request_timeout)
        .build()
}

/// Send `request` and decode a 2xx JSON body.
pub async fn fetch_json<T: DeserializeOwned>(request: RequestBuilder) -> Result<T, SourceError> {
    let response = request.send().await.map_err(|e| {
        if e.is_timeout() {
            SourceError::Timeout
        } else {
            SourceError::Request(e.to_string())
        }
    })?;

    let status = response.status();
    if !status.is_success() {
        return Err(SourceError::Status(status.as_u16()));
    }

    response
        .json::<T>()
        .await
        .map_err(|e| SourceError::Decode(e.to_string()))
}
