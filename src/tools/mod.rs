//! The tool surface: uniform envelopes over the scrape routines.
//!
//! Every tool returns the same JSON shape: `status`/`data`/`metadata` on
//! success (metadata says whether the payload came from the cache) and
//! `status`/`error{message,type}` on failure. Tools never propagate errors;
//! a failed scrape becomes an error envelope and the process keeps serving.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value};

use crate::auth::AuthError;
use crate::cache::{SnapshotStore, TtlCache};
use crate::config::ManualAccount;
use crate::fx::FxClient;
use crate::scrape::{jst_timestamp, ScrapeError, Scraper};

/// Everything the tools need, wired once at startup.
pub struct Toolkit {
    pub scraper: Arc<Scraper>,
    pub cache: Arc<TtlCache>,
    pub snapshots: Arc<SnapshotStore>,
    pub fx: FxClient,
    pub accounts: Vec<ManualAccount>,
}

/// Build a success envelope.
pub fn success_envelope(data: Value, ttl_seconds: u64, source: &str, cached: bool) -> Value {
    json!({
        "status": "success",
        "data": data,
        "metadata": {
            "fetched_at": jst_timestamp(),
            "source": source,
            "cached": cached,
            "cache_ttl_seconds": ttl_seconds,
        },
    })
}

/// Build an error envelope.
pub fn error_envelope(message: &str, error_type: &str) -> Value {
    json!({
        "status": "error",
        "error": {
            "message": message,
            "type": error_type,
        },
        "metadata": {
            "fetched_at": jst_timestamp(),
        },
    })
}

/// Machine-readable error class for an envelope, distinguishing "code never
/// arrived" from "code was wrong" and auth failures from plain scrape
/// breakage.
pub fn classify_error(err: &ScrapeError) -> &'static str {
    match err {
        ScrapeError::Auth(AuthError::PasscodeTimeout { .. }) => "OTP_TIMEOUT",
        ScrapeError::Auth(AuthError::IncorrectPasscode) => "OTP_INCORRECT",
        ScrapeError::Auth(AuthError::Initialization(_)) => "INITIALIZATION_ERROR",
        ScrapeError::Auth(_) => "AUTHENTICATION_ERROR",
        ScrapeError::AccountNotFound { .. } => "ACCOUNT_NOT_FOUND",
        ScrapeError::Extraction { .. } | ScrapeError::Other(_) => "SCRAPING_ERROR",
    }
}

/// Cache-first execution: serve a fresh cached value if present, otherwise
/// scrape, cache and serve. Errors become error envelopes.
pub async fn cached_call<T, Fut>(cache: &TtlCache, key: &str, fetch: Fut) -> Value
where
    T: Serialize,
    Fut: Future<Output = Result<T, ScrapeError>>,
{
    let ttl_seconds = cache.default_ttl().as_secs();

    if let Some(data) = cache.get(key).await {
        return success_envelope(data, ttl_seconds, "cache", true);
    }

    match fetch.await {
        Ok(data) => match serde_json::to_value(data) {
            Ok(value) => {
                cache.set(key, value.clone()).await;
                success_envelope(value, ttl_seconds, "scraping", false)
            }
            Err(err) => error_envelope(&err.to_string(), "SERIALIZATION_ERROR"),
        },
        Err(err) => {
            tracing::error!(cache_key = key, error = %err, "Tool scrape failed");
            error_envelope(&err.to_string(), classify_error(&err))
        }
    }
}

impl Toolkit {
    /// Current total assets and daily change, cached. A fresh scrape also
    /// appends an asset snapshot for historical tracking.
    pub async fn get_total_assets(&self) -> Value {
        let response = cached_call(&self.cache, "total_assets", async {
            let summary = self.scraper.total_assets().await?;
            if let Ok(snapshot) = serde_json::to_value(&summary) {
                if let Err(err) = self.snapshots.append(snapshot) {
                    tracing::warn!(error = %err, "Failed to record asset snapshot");
                }
            }
            Ok(summary)
        })
        .await;
        response
    }

    /// Recent transactions, cached per requested count (clamped to 1..=100).
    pub async fn list_recent_transactions(&self, count: usize) -> Value {
        let count = count.clamp(1, 100);
        let key = format!("transactions:{count}");
        cached_call(&self.cache, &key, async {
            let transactions = self.scraper.recent_transactions(count).await?;
            Ok(json!({ "transactions": transactions }))
        })
        .await
    }

    /// Current month's budget status, cached.
    pub async fn get_budget_status(&self) -> Value {
        cached_call(&self.cache, "budget_status", self.scraper.budget_status()).await
    }

    /// Trigger account aggregation. Real-time; never cached.
    pub async fn trigger_refresh(&self) -> Value {
        match self.scraper.trigger_refresh().await {
            Ok(result) => match serde_json::to_value(result) {
                Ok(value) => {
                    success_envelope(value, self.cache.default_ttl().as_secs(), "scraping", false)
                }
                Err(err) => error_envelope(&err.to_string(), "SERIALIZATION_ERROR"),
            },
            Err(err) => error_envelope(&err.to_string(), classify_error(&err)),
        }
    }

    /// Browser, session and cache health.
    pub async fn health_check(&self) -> Value {
        let health = self.scraper.health().await;
        let data = json!({
            "browser_status": health.browser_status,
            "session_valid": health.session_valid,
            "cache_status": "ok",
            "checked_at": health.checked_at,
        });
        success_envelope(data, self.cache.default_ttl().as_secs(), "scraping", false)
    }

    /// Configured manual accounts.
    pub fn list_manual_accounts(&self) -> Value {
        let data = json!({
            "accounts": self.accounts,
            "count": self.accounts.len(),
        });
        success_envelope(data, self.cache.default_ttl().as_secs(), "config", false)
    }

    /// Convert a foreign-currency balance to JPY at the live rate and write
    /// it to the matching manual account.
    pub async fn update_manual_account(&self, account_name: &str, amount: f64) -> Value {
        let Some(account) = self
            .accounts
            .iter()
            .find(|account| account.name == account_name)
        else {
            return error_envelope(
                &format!("Account {account_name:?} is not configured"),
                "ACCOUNT_NOT_FOUND",
            );
        };

        let rate = match self.fx.rate(&account.currency, "JPY").await {
            Ok(rate) => rate,
            Err(err) => {
                tracing::error!(currency = %account.currency, error = %err, "FX rate fetch failed");
                return error_envelope(&err.to_string(), "EXCHANGE_RATE_ERROR");
            }
        };

        let amount_jpy = (amount * rate).round() as i64;

        match self
            .scraper
            .update_manual_account(&account.mf_display_name, amount_jpy, &account.currency)
            .await
        {
            Ok(()) => {
                let data = json!({
                    "account_name": account.name,
                    "mf_display_name": account.mf_display_name,
                    "amount": amount,
                    "amount_jpy": amount_jpy,
                    "exchange_rate": rate,
                    "currency": account.currency,
                    "updated_at": jst_timestamp(),
                });
                success_envelope(data, self.cache.default_ttl().as_secs(), "scraping", false)
            }
            Err(err) => error_envelope(&err.to_string(), classify_error(&err)),
        }
    }
}
