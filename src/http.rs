//! Authenticated JSON transport shared by the gateway and analysis clients.

use anyhow::{Context, Result};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use tokio::sync::Mutex;

const MIN_REQUEST_INTERVAL: Duration = Duration::from_millis(100);
const TOKEN_TTL_SECS: u64 = 120;
const ISSUER: &str = "trade-orchestrator";

#[derive(Debug, Serialize)]
struct ServiceClaims {
    iss: String,
    aud: String,
    iat: u64,
    exp: u64,
}

pub struct ServiceClient {
    client: Client,
    base_url: String,
    audience: String,
    secret: String,
    last_request: Mutex<Option<Instant>>,
}

impl ServiceClient {
    pub fn new(base_url: &str, audience: &str, secret: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            audience: audience.to_string(),
            secret: secret.to_string(),
            last_request: Mutex::new(None),
        })
    }

    /// Short-lived HS256 token identifying the orchestrator to the service.
    fn service_token(&self) -> Result<String> {
        let now = SystemTime::now().duration_since(UNIX_EPOCH)?.as_secs();
        let claims = ServiceClaims {
            iss: ISSUER.to_string(),
            aud: self.audience.clone(),
            iat: now,
            exp: now + TOKEN_TTL_SECS,
        };
        let key = EncodingKey::from_secret(self.secret.as_bytes());
        encode(&Header::new(Algorithm::HS256), &claims, &key).context("Failed to encode JWT")
    }

    async fn rate_limit(&self) {
        let mut last = self.last_request.lock().await;
        if let Some(prev) = *last {
            let elapsed = prev.elapsed();
            if elapsed < MIN_REQUEST_INTERVAL {
                tokio::time::sleep(MIN_REQUEST_INTERVAL - elapsed).await;
            }
        }
        *last = Some(Instant::now());
    }

    pub async fn post_json<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        self.rate_limit().await;
        let token = self.service_token()?;

        let resp = self
            .client
            .post(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {} failed", path))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} {} error {}: {}", self.audience, path, status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    pub async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.rate_limit().await;
        let token = self.service_token()?;

        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .bearer_auth(token)
            .send()
            .await
            .with_context(|| format!("GET {} failed", path))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("{} {} error {}: {}", self.audience, path, status, body);
        }

        resp.json()
            .await
            .with_context(|| format!("Failed to parse {} response", path))
    }

    /// Succeeds on any 2xx from `path`, ignoring the body.
    pub async fn ping(&self, path: &str) -> Result<()> {
        let resp = self
            .client
            .get(format!("{}{}", self.base_url, path))
            .send()
            .await
            .with_context(|| format!("{} health check failed", self.audience))?;

        let status = resp.status();
        if !status.is_success() {
            anyhow::bail!("{} health returned {}", self.audience, status);
        }
        Ok(())
    }
}
