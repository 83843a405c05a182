use std::time::Duration;

use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Proxy, Response};
use url::form_urlencoded;
use vendex_core::error::AppError;
use vendex_core::models::Page;
use vendex_core::traits::{ImageFetcher, PageFetcher};

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:128.0) Gecko/20100101 Firefox/128.0";

/// Builder options for [`ReqwestFetcher`].
#[derive(Debug, Clone)]
pub struct FetcherOptions {
    pub timeout: Duration,
    /// Proxy URL, e.g. `socks5h://127.0.0.1:9050`. Applies to every scheme.
    pub proxy: Option<String>,
    pub user_agent: String,
}

impl Default for FetcherOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(60),
            proxy: None,
            user_agent: USER_AGENT.to_string(),
        }
    }
}

/// HTTP fetcher using reqwest.
///
/// Keeps a cookie store for the lifetime of the client so a negotiated
/// session survives between the login form and later page loads. Clones
/// share the same connection pool and cookies.
#[derive(Clone)]
pub struct ReqwestFetcher {
    client: Client,
    timeout_secs: u64,
}

impl ReqwestFetcher {
    pub fn with_options(options: FetcherOptions) -> Result<Self, AppError> {
        let mut builder = Client::builder()
            .user_agent(options.user_agent)
            .timeout(options.timeout)
            .cookie_store(true);

        if let Some(proxy) = &options.proxy {
            let proxy = Proxy::all(proxy)
                .map_err(|e| AppError::ConfigError(format!("Invalid proxy {proxy}: {e}")))?;
            builder = builder.proxy(proxy);
        }

        let client = builder
            .build()
            .map_err(|e| AppError::HttpError(e.to_string()))?;

        tracing::debug!(
            timeout_secs = options.timeout.as_secs(),
            proxied = options.proxy.is_some(),
            "HTTP client ready"
        );

        Ok(Self {
            client,
            timeout_secs: options.timeout.as_secs(),
        })
    }

    fn map_send_error(&self, e: reqwest::Error) -> AppError {
        if e.is_timeout() {
            AppError::Timeout(self.timeout_secs)
        } else if e.is_connect() {
            AppError::NetworkError(format!("Connection failed: {e}"))
        } else {
            AppError::HttpError(e.to_string())
        }
    }

    async fn into_page(&self, response: Response) -> Result<Page, AppError> {
        let status = response.status();
        let url = response.url().to_string();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let body = response
            .text()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read response body: {e}")))?;
        tracing::debug!(%url, status = status.as_u16(), bytes = body.len(), "Fetched page");

        Ok(Page {
            url,
            body,
            status: status.as_u16(),
        })
    }
}

/// `application/x-www-form-urlencoded` body, pairs kept in order.
fn encode_form(pairs: &[(String, String)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

impl PageFetcher for ReqwestFetcher {
    async fn fetch(&self, url: &str) -> Result<Page, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.into_page(response).await
    }

    async fn submit_form(&self, url: &str, pairs: &[(String, String)]) -> Result<Page, AppError> {
        tracing::info!(%url, fields = pairs.len(), "Submitting form");
        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(encode_form(pairs))
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;
        self.into_page(response).await
    }
}

impl ImageFetcher for ReqwestFetcher {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>, AppError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(AppError::HttpError(format!(
                "HTTP {} for {}",
                status.as_u16(),
                url
            )));
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| AppError::HttpError(format!("Failed to read image body: {e}")))?;
        Ok(bytes.to_vec())
    }
}
