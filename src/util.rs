use std::sync::Arc;

use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest_cookie_store::CookieStoreMutex;
use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{policies::ExponentialBackoff, RetryTransientMiddleware};

pub const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_6) \
AppleWebKit/605.1.15 (KHTML, like Gecko) Version/14.0.1 Safari/605.1.15";

// The CDN only serves a stream URL to the client identity that requested
// it, so the capture process reuses these headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    pub user_agent: String,
    pub headers: Vec<(&'static str, String)>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            user_agent: USER_AGENT.to_string(),
            headers: vec![
                (
                    "accept",
                    "text/html,application/xhtml+xml,application/xml;q=0.9".to_string(),
                ),
                ("accept-language", "zh-cn".to_string()),
                ("connection", "keep-alive".to_string()),
            ],
        }
    }
}

impl ClientConfig {
    pub fn header_map(&self) -> Result<HeaderMap, HttpError> {
        let mut map = HeaderMap::new();
        for &(name, ref value) in &self.headers {
            map.insert(
                HeaderName::from_bytes(name.as_bytes())
                    .map_err(|_| HttpError::InvalidHeader(name))?,
                HeaderValue::from_str(value).map_err(|_| HttpError::InvalidHeader(name))?,
            );
        }

        Ok(map)
    }

    pub fn capture_headers(&self) -> String {
        format!("User-Agent: {}\r\n", self.user_agent)
    }
}

pub struct HttpClient {
    pub client: ClientWithMiddleware,
    pub cookies: Arc<CookieStoreMutex>,
    pub config: ClientConfig,
}

#[derive(thiserror::Error, Debug)]
pub enum HttpError {
    #[error("reqwest error: {0}")]
    ReqwestError(#[from] reqwest::Error),
    #[error("reqwest middleware error: {0}")]
    ReqwestMiddlewareError(#[from] reqwest_middleware::Error),
    #[error("invalid value for header {0}")]
    InvalidHeader(&'static str),
}

impl HttpClient {
    pub fn new(config: ClientConfig) -> Result<HttpClient, HttpError> {
        let cookies = Arc::new(CookieStoreMutex::default());
        let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);

        let client = reqwest::Client::builder()
            .cookie_provider(cookies.clone())
            .user_agent(config.user_agent.as_str())
            .default_headers(config.header_map()?)
            .build()?;

        let client = reqwest_middleware::ClientBuilder::new(client)
            .with(RetryTransientMiddleware::new_with_policy(retry_policy))
            .build();

        Ok(HttpClient {
            client,
            cookies,
            config,
        })
    }

    pub async fn fetch_text(&self, url: &str) -> Result<String, HttpError> {
        self.client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .text()
            .await
            .map_err(|e| e.into())
    }
}

pub fn format_bytes(bytes: u64) -> String {
    let mut bytes = bytes as f64;
    let mut suffix = "B";

    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "KiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "MiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "GiB";
    }
    if bytes > 1024.0 {
        bytes /= 1024.0;
        suffix = "TiB";
    }

    format!("{:.2} {}", bytes, suffix)
}

#[cfg(test)]
mod tests {
    use reqwest::header::{ACCEPT, ACCEPT_LANGUAGE, CONNECTION};

    use super::*;

    #[test]
    fn capture_headers_match_session_agent() {
        let config = ClientConfig::default();
        let blob = config.capture_headers();

        assert!(blob.starts_with("User-Agent: Mozilla/5.0"));
        assert!(blob.ends_with("\r\n"));
        assert!(blob.contains(&config.user_agent));
    }

    #[test]
    fn header_map_contains_fixed_headers() {
        let map = ClientConfig::default()
            .header_map()
            .expect("Could not build headers");

        assert_eq!(map.get(ACCEPT_LANGUAGE).unwrap(), "zh-cn");
        assert_eq!(map.get(CONNECTION).unwrap(), "keep-alive");
        assert!(map.get(ACCEPT).is_some());
    }

    #[test]
    fn invalid_header_value_is_rejected() {
        let config = ClientConfig {
            user_agent: USER_AGENT.to_string(),
            headers: vec![("accept", "bad\nvalue".to_string())],
        };

        assert!(matches!(
            config.header_map(),
            Err(HttpError::InvalidHeader("accept"))
        ));
    }

    #[test]
    fn bytes() {
        assert_eq!(format_bytes(512), "512.00 B");
        assert_eq!(format_bytes(2048), "2.00 KiB");
        assert_eq!(format_bytes(3 * 1024 * 1024), "3.00 MiB");
    }
}
