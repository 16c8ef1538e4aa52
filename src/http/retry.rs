//! Classification of HTTP failures into retryable and final ones.

use reqwest::StatusCode;
use thiserror::Error;

/// Maximum number of attempts for a request against the package index.
pub const MAX_RETRIES: usize = 3;

/// Delay between attempts in milliseconds.
pub const RETRY_DELAY_MS: u64 = 1000;

/// Responses from the package index that will not change on retry.
#[derive(Debug, Error)]
pub enum NonRetryableError {
    #[error("Too many requests to the package index: {0}. Try again later.")]
    RateLimitExceeded(String),

    #[error("The package index refused the request: {0}. Check SEAMM_INDEX_URL.")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Request error: {0}")]
    ClientError(String),
}

/// Returns Ok(()) when the error is worth retrying (server errors, connection
/// problems, timeouts), or the final error otherwise.
pub fn classify_error(error: &reqwest::Error) -> Result<(), NonRetryableError> {
    let Some(status) = error.status() else {
        return Ok(());
    };

    let url = error
        .url()
        .map(|u| u.to_string())
        .unwrap_or_else(|| "unknown URL".to_string());

    match status {
        StatusCode::TOO_MANY_REQUESTS => Err(NonRetryableError::RateLimitExceeded(url)),
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(NonRetryableError::Forbidden(
            format!("HTTP {} for {}", status.as_u16(), url),
        )),
        StatusCode::NOT_FOUND | StatusCode::GONE => Err(NonRetryableError::NotFound(url)),
        s if s.is_client_error() => Err(NonRetryableError::ClientError(format!(
            "HTTP {} for {}",
            s.as_u16(),
            url
        ))),
        _ => Ok(()),
    }
}

/// Maps an error from `error_for_status()` to an anyhow error, wrapping final
/// failures in [`NonRetryableError`].
pub fn check_retryable(error: reqwest::Error) -> anyhow::Error {
    match classify_error(&error) {
        Ok(()) => anyhow::Error::from(error),
        Err(non_retryable) => anyhow::Error::from(non_retryable),
    }
}

/// True when the error (or anything in its chain) is a 404 from the index.
pub fn is_not_found(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<NonRetryableError>(),
        Some(NonRetryableError::NotFound(_))
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn error_for(status: usize) -> reqwest::Error {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/pypi/seamm/json")
            .with_status(status)
            .create_async()
            .await;

        let client = reqwest::Client::new();
        let response = client
            .get(format!("{}/pypi/seamm/json", server.url()))
            .send()
            .await
            .unwrap();
        response.error_for_status().unwrap_err()
    }

    #[test]
    fn test_non_retryable_error_display() {
        let err = NonRetryableError::RateLimitExceeded("https://pypi.org".to_string());
        assert!(err.to_string().contains("Too many requests"));

        let err = NonRetryableError::Forbidden("HTTP 403".to_string());
        assert!(err.to_string().contains("SEAMM_INDEX_URL"));

        let err = NonRetryableError::NotFound("seamm".to_string());
        assert_eq!(err.to_string(), "Not found: seamm");

        let err = NonRetryableError::ClientError("HTTP 400".to_string());
        assert!(err.to_string().contains("HTTP 400"));
    }

    #[tokio::test]
    async fn test_classify_error_statuses() {
        assert!(matches!(
            classify_error(&error_for(429).await),
            Err(NonRetryableError::RateLimitExceeded(_))
        ));
        assert!(matches!(
            classify_error(&error_for(403).await),
            Err(NonRetryableError::Forbidden(_))
        ));
        assert!(matches!(
            classify_error(&error_for(404).await),
            Err(NonRetryableError::NotFound(_))
        ));
        assert!(matches!(
            classify_error(&error_for(400).await),
            Err(NonRetryableError::ClientError(_))
        ));
        assert!(classify_error(&error_for(500).await).is_ok());
    }

    #[tokio::test]
    async fn test_check_retryable() {
        let err = check_retryable(error_for(404).await);
        assert!(is_not_found(&err));

        let err = check_retryable(error_for(503).await);
        assert!(err.downcast_ref::<NonRetryableError>().is_none());
        assert!(!is_not_found(&err));
    }
}
