//! HTTP fetch primitives
//!
//! Redirects are followed manually so redirect handling is identical for
//! text probes and streaming downloads, with a hard hop cap instead of
//! relying on client defaults.

use std::path::Path;
use std::time::Duration;

use reqwest::header::LOCATION;
use reqwest::{Client, Response};
use tokio::io::AsyncWriteExt;
use tracing::debug;
use url::Url;

use crate::errors::{Result, UpdateError};

/// Maximum redirect hops before giving up
const MAX_REDIRECTS: u32 = 10;

pub const USER_AGENT_STRING: &str = concat!("pulsepatch/", env!("CARGO_PKG_VERSION"));

/// HTTP fetcher with manual redirect following
#[derive(Debug, Clone)]
pub struct Fetcher {
    client: Client,
    probe_timeout: Duration,
}

impl Fetcher {
    pub fn new(probe_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .user_agent(USER_AGENT_STRING)
            .build()?;
        Ok(Self {
            client,
            probe_timeout,
        })
    }

    /// GET a URL, following 3xx Location responses up to [`MAX_REDIRECTS`] hops.
    ///
    /// Returns the final response; a non-2xx final status is an error.
    async fn get_following(&self, url: &str, timeout: Option<Duration>) -> Result<Response> {
        let mut current = Url::parse(url)?;

        for _ in 0..=MAX_REDIRECTS {
            let mut request = self.client.get(current.clone());
            if let Some(t) = timeout {
                request = request.timeout(t);
            }
            let response = request.send().await?;

            if response.status().is_redirection() {
                let location = response
                    .headers()
                    .get(LOCATION)
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| UpdateError::Http {
                        status: response.status().as_u16(),
                        url: current.to_string(),
                    })?;
                // Location may be relative; resolve against the current URL
                current = current.join(location)?;
                debug!(location = %current, "following redirect");
                continue;
            }

            if !response.status().is_success() {
                return Err(UpdateError::Http {
                    status: response.status().as_u16(),
                    url: current.to_string(),
                });
            }
            return Ok(response);
        }

        Err(UpdateError::TooManyRedirects(MAX_REDIRECTS))
    }

    /// Fetch a URL body as text, with the short probe timeout applied.
    pub async fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self.get_following(url, Some(self.probe_timeout)).await?;
        Ok(response.text().await?)
    }

    /// Stream a URL body into `dest`, reporting `(bytes_so_far, content_length)`
    /// after each chunk. Progress is skipped when the server sends no
    /// Content-Length. The partial file is removed if the stream fails.
    pub async fn fetch_to_file(
        &self,
        url: &str,
        dest: &Path,
        mut on_chunk: impl FnMut(u64, Option<u64>),
    ) -> Result<u64> {
        let response = self.get_following(url, None).await?;
        let total = response.content_length();

        match self.stream_body(response, dest, total, &mut on_chunk).await {
            Ok(written) => Ok(written),
            Err(e) => {
                // Never leave a truncated download behind
                let _ = tokio::fs::remove_file(dest).await;
                Err(e)
            }
        }
    }

    async fn stream_body(
        &self,
        mut response: Response,
        dest: &Path,
        total: Option<u64>,
        on_chunk: &mut impl FnMut(u64, Option<u64>),
    ) -> Result<u64> {
        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;

        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
            if total.is_some() {
                on_chunk(written, total);
            }
        }

        file.flush().await?;
        Ok(written)
    }
}
