use anyhow::Result;
use reqwest::cookie::Jar;
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:129.0) Gecko/20100101 Firefox/129.0";
const PAGE_TIMEOUT: Duration = Duration::from_secs(20);

/// One exclusive fetch session with its own cookie jar. Each pool worker owns
/// a `Session` for its whole batch; nothing here is shared across workers,
/// and dropping the session releases the resource on every exit path.
pub struct Session {
    client: Client,
    jar: Arc<Jar>,
}

impl Session {
    /// Open a fresh session. The `headless` flag is part of the job surface;
    /// an HTTP session has no display to toggle, so it only shows up in the
    /// log trail.
    pub fn open(headless: bool) -> Result<Self> {
        let jar = Arc::new(Jar::default());
        let client = Client::builder()
            .user_agent(USER_AGENT)
            .redirect(reqwest::redirect::Policy::limited(5))
            .timeout(PAGE_TIMEOUT)
            .cookie_provider(jar.clone())
            .build()?;
        tracing::debug!(headless, "fetch session opened");
        Ok(Self { client, jar })
    }

    /// Fetch one page, tolerating failure: timeouts, transport errors, and
    /// non-success statuses all degrade to `None` so the caller can treat the
    /// page as empty or the field as missing.
    pub async fn fetch_page(&self, url: &str) -> Option<String> {
        match self.client.get(url).send().await {
            Ok(resp) if resp.status().is_success() => match resp.text().await {
                Ok(body) => Some(body),
                Err(err) => {
                    tracing::warn!(url, %err, "failed to read page body");
                    None
                }
            },
            Ok(resp) => {
                tracing::warn!(url, status = %resp.status(), "non-success response");
                None
            }
            Err(err) => {
                tracing::warn!(url, %err, "page fetch failed or timed out");
                None
            }
        }
    }

    /// Best-effort cookie-consent dismissal: prime the jar with one request
    /// to the base page and record the consent cookie the banner would set.
    /// Failures are ignored; the crawl proceeds either way.
    pub async fn dismiss_cookie_banner(&self, base_url: &str) {
        if self.fetch_page(base_url).await.is_none() {
            tracing::debug!(base_url, "consent priming request failed; continuing");
        }
        if let Ok(url) = Url::parse(base_url) {
            self.jar.add_cookie_str(
                "OptanonAlertBoxClosed=2024-01-01T00:00:00.000Z; Path=/",
                &url,
            );
        }
    }
}
