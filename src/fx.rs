//! FX rates from the Frankfurter API (ECB daily reference rates).
//!
//! Used to convert manual foreign-currency balances to JPY before writing
//! them to the site. No API key required.

use std::collections::HashMap;

use anyhow::{anyhow, Result};
use reqwest::Client;
use serde::Deserialize;

const FRANKFURTER_BASE_URL: &str = "https://api.frankfurter.app";

#[derive(Debug, Deserialize)]
struct FrankfurterResponse {
    rates: HashMap<String, f64>,
}

/// Frankfurter FX rate client.
#[derive(Debug, Clone)]
pub struct FxClient {
    client: Client,
    base_url: String,
}

impl FxClient {
    pub fn new() -> Self {
        Self {
            client: Client::new(),
            base_url: FRANKFURTER_BASE_URL.to_string(),
        }
    }

    /// Point the client at a different endpoint (tests use a mock server).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Latest `base`/`quote` rate: how many units of `quote` one unit of
    /// `base` buys.
    pub async fn rate(&self, base: &str, quote: &str) -> Result<f64> {
        let url = format!("{}/latest?from={base}&to={quote}", self.base_url);

        let response = self
            .client
            .get(&url)
            .send()
            .await?
            .error_for_status()?
            .json::<FrankfurterResponse>()
            .await?;

        response
            .rates
            .get(quote)
            .copied()
            .ok_or_else(|| anyhow!("Frankfurter response missing rate for {quote}"))
    }
}

impl Default for FxClient {
    fn default() -> Self {
        Self::new()
    }
}
