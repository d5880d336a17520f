use log::debug;
use reqwest::{Client, StatusCode, Url};

use streetcard_logic::{Card, CardApi, FetchError, prelude::*};

use crate::server::{Endpoint, SERVER_HTTP_URL};

/// [CardApi] over HTTP, one GET per card with the platform's default timeouts
pub struct HttpCardApi {
    client: Client,
    base_url: String,
}

fn describe(err: reqwest::Error) -> String {
    format!("{:#}", anyhow::Error::from(err))
}

impl HttpCardApi {
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .build()
            .context("Failed to create HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.into(),
        })
    }

    /// Client for the server baked in at build time
    pub fn from_build_env() -> Result<Self> {
        Self::new(SERVER_HTTP_URL)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn request_url(&self, lat: f64, lon: f64, acc: f64) -> Result<Url, FetchError> {
        Url::parse_with_params(
            &Endpoint::Card.on(&self.base_url),
            &[
                ("lat", lat.to_string()),
                ("lon", lon.to_string()),
                ("acc", acc.to_string()),
            ],
        )
        .map_err(|why| FetchError::Transport(format!("Invalid server URL: {why}")))
    }

    /// Check the card server is up
    pub async fn health(&self) -> Result<bool> {
        let resp = self
            .client
            .get(Endpoint::Health.on(&self.base_url))
            .send()
            .await
            .context("Failed to make request")?;
        Ok(resp.status() == StatusCode::OK)
    }
}

impl CardApi for HttpCardApi {
    async fn fetch_card(&self, lat: f64, lon: f64, acc: f64) -> Result<Card, FetchError> {
        let url = self.request_url(lat, lon, acc)?;
        debug!("Requesting {url}");

        let resp = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|why| FetchError::Transport(describe(why)))?;

        let status = resp.status();
        if !status.is_success() {
            return Err(FetchError::Server(status.as_u16()));
        }

        let body = resp
            .bytes()
            .await
            .map_err(|why| FetchError::Transport(describe(why)))?;

        serde_json::from_slice::<Card>(&body).map_err(|why| FetchError::Decode(why.to_string()))
    }
}
