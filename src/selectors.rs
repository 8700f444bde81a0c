//! CSS selector and URL table for MoneyForward ME pages.
//!
//! The target site's markup is the real protocol this crate speaks, and it
//! changes out from under us. Everything page-specific lives here so a markup
//! change is a config edit, not a code change.

use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Login flow selectors and markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthSelectors {
    pub login_url: String,
    pub email_input: String,
    pub password_input: String,
    pub submit_button: String,
    pub otp_input: String,
    pub otp_submit: String,
}

impl Default for AuthSelectors {
    fn default() -> Self {
        Self {
            login_url: "https://id.moneyforward.com/sign_in".to_string(),
            email_input: "input[name=\"mfid_user[email]\"]".to_string(),
            password_input: "input[name=\"mfid_user[password]\"]".to_string(),
            submit_button: "#submitto".to_string(),
            otp_input: "input[name=\"mfid_user[code]\"]".to_string(),
            otp_submit: "input[type=\"submit\"]".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PortfolioSelectors {
    pub url: String,
    pub total_assets: String,
    pub daily_change: String,
}

impl Default for PortfolioSelectors {
    fn default() -> Self {
        Self {
            url: "https://moneyforward.com/bs/portfolio".to_string(),
            total_assets: ".heading-radius-box".to_string(),
            daily_change: ".heading-radius-box .v-prev-diff".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransactionSelectors {
    pub url: String,
    pub table: String,
    pub rows: String,
    pub date: String,
    pub description: String,
    pub amount: String,
    pub category: String,
}

impl Default for TransactionSelectors {
    fn default() -> Self {
        Self {
            url: "https://moneyforward.com/cf".to_string(),
            table: "#cf-detail-table".to_string(),
            rows: "#cf-detail-table tbody tr.transaction_list".to_string(),
            date: "td.date".to_string(),
            description: "td.content".to_string(),
            amount: "td.amount".to_string(),
            category: "td.lctg".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshSelectors {
    pub url: String,
    pub refresh_button: String,
    pub status_indicator: String,
}

impl Default for RefreshSelectors {
    fn default() -> Self {
        Self {
            url: "https://moneyforward.com/accounts".to_string(),
            refresh_button: "a.btn-aggregation-all".to_string(),
            status_indicator: ".aggregation-status".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BudgetSelectors {
    pub url: String,
    pub total_budget: String,
    pub total_spent: String,
    pub categories: String,
}

impl Default for BudgetSelectors {
    fn default() -> Self {
        Self {
            url: "https://moneyforward.com/spending_summaries".to_string(),
            total_budget: ".budget-total .amount".to_string(),
            total_spent: ".spending-total .amount".to_string(),
            categories: ".category-summary .category-name".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ManualAccountSelectors {
    pub accounts_url: String,
    /// Asset subclass preselected when creating a new entry
    /// ("foreign currency deposit" on MoneyForward).
    pub default_asset_subclass_id: String,
}

impl Default for ManualAccountSelectors {
    fn default() -> Self {
        Self {
            accounts_url: "https://moneyforward.com/accounts".to_string(),
            default_asset_subclass_id: "3".to_string(),
        }
    }
}

/// The full selector table, loaded from `selectors.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Selectors {
    pub auth: AuthSelectors,
    pub portfolio: PortfolioSelectors,
    pub transactions: TransactionSelectors,
    pub refresh: RefreshSelectors,
    pub budget: BudgetSelectors,
    pub manual_accounts: ManualAccountSelectors,
}

impl Selectors {
    /// Load the selector table, falling back to the built-in defaults when
    /// the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read selectors file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse selectors file: {}", path.display()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let selectors =
            Selectors::load_or_default(Path::new("/nonexistent/selectors.toml")).unwrap();
        assert_eq!(selectors.auth.login_url, "https://id.moneyforward.com/sign_in");
        assert_eq!(selectors.portfolio.url, "https://moneyforward.com/bs/portfolio");
    }

    #[test]
    fn partial_table_keeps_defaults_for_the_rest() {
        let selectors: Selectors = toml::from_str(
            r#"
            [auth]
            login_url = "https://id.example.com/sign_in"
            "#,
        )
        .unwrap();

        assert_eq!(selectors.auth.login_url, "https://id.example.com/sign_in");
        // Untouched sections and fields keep their defaults.
        assert_eq!(selectors.auth.otp_input, "input[name=\"mfid_user[code]\"]");
        assert_eq!(selectors.transactions.url, "https://moneyforward.com/cf");
    }
}
