use crate::error::DataError;
use serde::de::DeserializeOwned;
use smol_str::SmolStr;
use std::time::Duration;

/// Default `User-Agent` sent to public market data APIs.
pub const USER_AGENT: &str = concat!("strikebot/", env!("CARGO_PKG_VERSION"));

/// Build the shared HTTP client used by public data sources.
pub fn client(timeout: Duration) -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(USER_AGENT)
        .build()
        .unwrap_or_default()
}

/// GET `url` and deserialise the JSON body, attributing any failure to `source_name`.
pub async fn get_json<T: DeserializeOwned>(
    client: &reqwest::Client,
    source_name: &str,
    url: &str,
    timeout: Duration,
) -> Result<T, DataError> {
    let response = client
        .get(url)
        .timeout(timeout)
        .send()
        .await
        .map_err(|error| classify(source_name, error))?;

    let status = response.status();
    if status.as_u16() == 429 {
        return Err(DataError::RateLimited {
            source_name: SmolStr::new(source_name),
        });
    }
    if !status.is_success() {
        return Err(DataError::Status {
            source_name: SmolStr::new(source_name),
            status: status.as_u16(),
        });
    }

    let body = response
        .text()
        .await
        .map_err(|error| classify(source_name, error))?;
    serde_json::from_str(&body).map_err(|error| DataError::parse(source_name, error))
}

/// Attribute a transport error to timeout, connection or parse.
pub fn classify(source_name: &str, error: reqwest::Error) -> DataError {
    let source_name = SmolStr::new(source_name);
    if error.is_timeout() {
        DataError::Timeout { source_name }
    } else if error.is_decode() {
        DataError::Parse {
            source_name,
            message: error.to_string(),
        }
    } else if let Some(status) = error.status() {
        DataError::Status {
            source_name,
            status: status.as_u16(),
        }
    } else {
        DataError::Connection {
            source_name,
            message: error.to_string(),
        }
    }
}
