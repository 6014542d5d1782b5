//! Thin GET wrapper around `reqwest` carrying a single total-request
//! deadline, used by the HTTP tracker client.
use super::WireResult;
use std::time::Duration;
use tracing::instrument;
use url::Url;

const TOTAL_TIMEOUT: Duration = Duration::from_secs(15);

#[instrument(skip(url), level = "debug")]
pub async fn get(url: Url) -> WireResult<bytes::Bytes> {
    let client = reqwest::Client::builder().timeout(TOTAL_TIMEOUT).build()?;
    let response = client.get(url).send().await?;
    let body = response.bytes().await?;
    Ok(body)
}
