//! Data extraction from MoneyForward ME pages.
//!
//! Every routine here is a thin DOM read: ensure the session is usable,
//! open a page, navigate, pull text through the selector table, parse.
//! The selectors are swappable config; the authentication orchestration is
//! where the real machinery lives.

mod currency;

pub use currency::parse_currency;

use std::sync::Arc;

use anyhow::Context;
use chromiumoxide::Page;
use chrono::Utc;
use chrono_tz::Asia::Tokyo;
use serde::{Deserialize, Serialize};

use crate::auth::{AuthError, Authenticator};
use crate::browser::{current_url, extract_text, settle, wait_for_selector, BrowserHandle};
use crate::selectors::Selectors;

const TABLE_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(10);
const MODAL_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
pub enum ScrapeError {
    #[error("authentication failed: {0}")]
    Auth(#[from] AuthError),

    #[error("failed to extract {what}")]
    Extraction { what: String },

    #[error("manual account {name:?} not found on accounts page")]
    AccountNotFound { name: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Total assets and daily change from the portfolio page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetSummary {
    pub total_assets_jpy: i64,
    pub daily_change_jpy: i64,
    pub fetched_at: String,
}

/// One row from the cash-flow table.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransactionRow {
    pub date: String,
    pub description: String,
    pub amount: i64,
    pub category: String,
}

/// Current-month budget picture.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BudgetStatus {
    pub month: String,
    pub budget: i64,
    pub spent: i64,
    pub remaining: i64,
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshResult {
    pub status: String,
    pub refreshed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub browser_status: String,
    pub session_valid: bool,
    pub checked_at: String,
}

/// Scraper over the shared persistent context.
pub struct Scraper {
    browser: Arc<BrowserHandle>,
    auth: Arc<Authenticator>,
    selectors: Selectors,
}

impl Scraper {
    pub fn new(browser: Arc<BrowserHandle>, auth: Arc<Authenticator>, selectors: Selectors) -> Self {
        Self {
            browser,
            auth,
            selectors,
        }
    }

    /// Scrape total assets and daily change from the portfolio page.
    pub async fn total_assets(&self) -> Result<AssetSummary, ScrapeError> {
        tracing::info!("Scraping total assets");
        self.auth.ensure_authenticated().await?;

        self.with_page(|page| async move {
            navigate(&page, &self.selectors.portfolio.url).await?;

            let total_text = extract_text(&page, &self.selectors.portfolio.total_assets)
                .await
                .ok_or_else(|| ScrapeError::Extraction {
                    what: "total assets".to_string(),
                })?;
            let total_assets_jpy = parse_currency(&total_text);

            let daily_change_jpy = extract_text(&page, &self.selectors.portfolio.daily_change)
                .await
                .map(|text| parse_currency(&text))
                .unwrap_or(0);

            tracing::info!(total_assets_jpy, daily_change_jpy, "Total assets scraped");
            Ok(AssetSummary {
                total_assets_jpy,
                daily_change_jpy,
                fetched_at: jst_timestamp(),
            })
        })
        .await
    }

    /// Scrape up to `limit` recent transactions from the cash-flow page.
    /// Rows that fail to parse are skipped with a warning.
    pub async fn recent_transactions(&self, limit: usize) -> Result<Vec<TransactionRow>, ScrapeError> {
        tracing::info!(limit, "Scraping recent transactions");
        self.auth.ensure_authenticated().await?;

        let table = &self.selectors.transactions;
        self.with_page(|page| async move {
            navigate(&page, &table.url).await?;

            wait_for_selector(&page, &table.table, TABLE_TIMEOUT)
                .await?
                .ok_or_else(|| ScrapeError::Extraction {
                    what: "transactions table".to_string(),
                })?;

            let rows = page
                .find_elements(table.rows.as_str())
                .await
                .context("Failed to query transaction rows")?;

            let mut transactions = Vec::new();
            for (index, row) in rows.into_iter().take(limit).enumerate() {
                match parse_row(&row, table).await {
                    Ok(transaction) => transactions.push(transaction),
                    Err(err) => {
                        tracing::warn!(row_index = index, error = %err, "Skipping transaction row");
                    }
                }
            }

            tracing::info!(count = transactions.len(), "Transactions scraped");
            Ok(transactions)
        })
        .await
    }

    /// Scrape the current month's budget summary.
    pub async fn budget_status(&self) -> Result<BudgetStatus, ScrapeError> {
        tracing::info!("Scraping budget status");
        self.auth.ensure_authenticated().await?;

        let budget_selectors = &self.selectors.budget;
        self.with_page(|page| async move {
            navigate(&page, &budget_selectors.url).await?;

            let budget = extract_text(&page, &budget_selectors.total_budget)
                .await
                .map(|text| parse_currency(&text))
                .unwrap_or(0);
            let spent = extract_text(&page, &budget_selectors.total_spent)
                .await
                .map(|text| parse_currency(&text))
                .unwrap_or(0);

            let mut categories = Vec::new();
            if let Ok(elements) = page.find_elements(budget_selectors.categories.as_str()).await {
                for element in elements {
                    match element.inner_text().await {
                        Ok(Some(name)) if !name.trim().is_empty() => {
                            categories.push(name.trim().to_string());
                        }
                        Ok(_) => {}
                        Err(err) => tracing::warn!(error = %err, "Category parse error"),
                    }
                }
            }

            tracing::info!(budget, spent, "Budget status scraped");
            Ok(BudgetStatus {
                month: Utc::now().with_timezone(&Tokyo).format("%Y-%m").to_string(),
                budget,
                spent,
                remaining: budget - spent,
                categories,
            })
        })
        .await
    }

    /// Click the aggregate-all control and report the status indicator.
    pub async fn trigger_refresh(&self) -> Result<RefreshResult, ScrapeError> {
        tracing::info!("Triggering account refresh");
        self.auth.ensure_authenticated().await?;

        let refresh = &self.selectors.refresh;
        self.with_page(|page| async move {
            navigate(&page, &refresh.url).await?;

            let button = wait_for_selector(&page, &refresh.refresh_button, TABLE_TIMEOUT)
                .await?
                .ok_or_else(|| ScrapeError::Extraction {
                    what: "refresh button".to_string(),
                })?;
            button.click().await.context("Failed to click refresh button")?;

            // Give the aggregation a moment to kick off before reading status.
            tokio::time::sleep(std::time::Duration::from_secs(2)).await;

            let status = extract_text(&page, &refresh.status_indicator)
                .await
                .unwrap_or_else(|| "refresh_triggered".to_string());

            tracing::info!(status, "Account refresh triggered");
            Ok(RefreshResult {
                status,
                refreshed_at: jst_timestamp(),
            })
        })
        .await
    }

    /// Set a manual account's balance, editing the existing asset entry if
    /// one exists or creating a new one through the modal.
    pub async fn update_manual_account(
        &self,
        display_name: &str,
        amount_jpy: i64,
        currency: &str,
    ) -> Result<(), ScrapeError> {
        tracing::info!(display_name, amount_jpy, "Updating manual account balance");
        self.auth.ensure_authenticated().await?;

        let manual = &self.selectors.manual_accounts;
        let display_name = display_name.to_string();
        let currency = currency.to_string();
        self.with_page(|page| async move {
            navigate(&page, &manual.accounts_url).await?;

            let link = find_manual_account_link(&page, &display_name)
                .await?
                .ok_or_else(|| ScrapeError::AccountNotFound {
                    name: display_name.clone(),
                })?;
            link.click().await.context("Failed to open manual account page")?;
            settle(&page).await?;

            // Existing entries carry a non-delete action button that opens
            // the edit modal.
            let change_selector = "a.btn-asset-action:not([data-method=\"delete\"])";
            if let Ok(change_button) = page.find_element(change_selector).await {
                tracing::debug!(display_name, "Updating existing asset entry");
                change_button.click().await.context("Failed to open edit modal")?;
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;

                let value_selector = ".modal.in input[name=\"user_asset_det[value]\"], \
                     .modal.show input[name=\"user_asset_det[value]\"]";
                fill_modal_value(&page, value_selector, amount_jpy).await?;

                let submit_selector =
                    ".modal.in input[type=\"submit\"], .modal.show input[type=\"submit\"]";
                page.find_element(submit_selector)
                    .await
                    .context("Edit modal submit not found")?
                    .click()
                    .await
                    .context("Failed to submit edit modal")?;
            } else {
                tracing::debug!(display_name, "Creating new asset entry");
                page.evaluate("$(\"#modal_asset_new\").modal(\"show\")")
                    .await
                    .context("Failed to open new-asset modal")?;
                tokio::time::sleep(std::time::Duration::from_millis(500)).await;

                let subclass_selector =
                    "#modal_asset_new select[name=\"user_asset_det[asset_subclass_id]\"]";
                select_option(&page, subclass_selector, &manual.default_asset_subclass_id).await?;

                page.find_element("#modal_asset_new input[name=\"user_asset_det[name]\"]")
                    .await
                    .context("New-asset name input not found")?
                    .type_str(format!("{display_name} ({currency})"))
                    .await
                    .context("Failed to fill asset name")?;

                fill_modal_value(
                    &page,
                    "#modal_asset_new input[name=\"user_asset_det[value]\"]",
                    amount_jpy,
                )
                .await?;

                page.find_element("#modal_asset_new input[type=\"submit\"]")
                    .await
                    .context("New-asset modal submit not found")?
                    .click()
                    .await
                    .context("Failed to submit new-asset modal")?;
            }

            settle(&page).await?;
            tracing::info!(display_name, amount_jpy, "Manual account balance updated");
            Ok(())
        })
        .await
    }

    /// Browser and session health.
    pub async fn health(&self) -> HealthStatus {
        let browser_status = if self.browser.is_running().await {
            "ok"
        } else {
            "unavailable"
        };

        let session_valid = self.auth.is_session_valid().await;

        HealthStatus {
            browser_status: browser_status.to_string(),
            session_valid,
            checked_at: jst_timestamp(),
        }
    }

    /// Run `body` with a fresh page, closing it on every exit path.
    async fn with_page<T, F, Fut>(&self, body: F) -> Result<T, ScrapeError>
    where
        F: FnOnce(Page) -> Fut,
        Fut: std::future::Future<Output = Result<T, ScrapeError>>,
    {
        let page = self
            .browser
            .new_page()
            .await
            .context("Failed to open scrape page")?;

        let result = body(page.clone()).await;

        if let Err(err) = page.close().await {
            tracing::warn!(error = %err, "Error closing scrape page");
        }

        result
    }
}

async fn navigate(page: &Page, url: &str) -> Result<(), ScrapeError> {
    tracing::debug!(url, "Navigating");
    page.goto(url)
        .await
        .with_context(|| format!("Failed to navigate to {url}"))?;
    settle(page).await?;
    let url = current_url(page).await?;
    tracing::debug!(url, "Navigation complete");
    Ok(())
}

async fn parse_row(
    row: &chromiumoxide::Element,
    table: &crate::selectors::TransactionSelectors,
) -> Result<TransactionRow, anyhow::Error> {
    let cell = |selector: &str| {
        let selector = selector.to_string();
        async move {
            match row.find_element(selector.as_str()).await {
                Ok(element) => Ok::<_, anyhow::Error>(
                    element.inner_text().await?.unwrap_or_default().trim().to_string(),
                ),
                Err(_) => Ok(String::new()),
            }
        }
    };

    let amount_text = cell(&table.amount).await?;
    Ok(TransactionRow {
        date: cell(&table.date).await?,
        description: cell(&table.description).await?,
        amount: parse_currency(&amount_text),
        category: cell(&table.category).await?,
    })
}

/// Find the manual-account link whose visible text carries the display name.
async fn find_manual_account_link(
    page: &Page,
    display_name: &str,
) -> Result<Option<chromiumoxide::Element>, ScrapeError> {
    let links = page
        .find_elements("a[href*=\"/accounts/show_manual/\"]")
        .await
        .unwrap_or_default();

    for link in links {
        let text = link.inner_text().await.ok().flatten().unwrap_or_default();
        if text.contains(display_name) {
            return Ok(Some(link));
        }
    }

    Ok(None)
}

async fn fill_modal_value(page: &Page, selector: &str, amount_jpy: i64) -> Result<(), ScrapeError> {
    let input = wait_for_selector(page, selector, MODAL_TIMEOUT)
        .await?
        .ok_or_else(|| ScrapeError::Extraction {
            what: "balance input".to_string(),
        })?;

    input.focus().await.context("Failed to focus balance input")?;
    page.evaluate(format!(
        "document.querySelector('{}').value = ''",
        selector.split(',').next().unwrap_or(selector).trim()
    ))
    .await
    .context("Failed to clear balance input")?;
    input
        .type_str(amount_jpy.to_string())
        .await
        .context("Failed to fill balance input")?;
    Ok(())
}

/// Set a `<select>`'s value and fire its change event.
async fn select_option(page: &Page, selector: &str, value: &str) -> Result<(), ScrapeError> {
    wait_for_selector(page, selector, MODAL_TIMEOUT)
        .await?
        .ok_or_else(|| ScrapeError::Extraction {
            what: "asset subclass select".to_string(),
        })?;

    page.evaluate(format!(
        "const el = document.querySelector('{selector}'); \
         el.value = '{value}'; el.dispatchEvent(new Event('change', {{ bubbles: true }}));"
    ))
    .await
    .context("Failed to select asset subclass")?;
    Ok(())
}

/// ISO-8601 timestamp in JST, the timezone the site reports in.
pub fn jst_timestamp() -> String {
    Utc::now().with_timezone(&Tokyo).to_rfc3339()
}

#[cfg(test)]
mod tests {
    use super::*;

    // Scrape calls cross task boundaries, so their futures must stay Send.
    #[allow(dead_code)]
    fn scrape_future_is_send(
        scraper: &Scraper,
    ) -> impl std::future::Future<Output = Result<AssetSummary, ScrapeError>> + Send + '_ {
        scraper.total_assets()
    }
}
