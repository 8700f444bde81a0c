use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use mfbridge::auth::{Authenticator, BrowserLoginDriver, LoginFlow, OtpRelay};
use mfbridge::browser::{BrowserHandle, BrowserSettings};
use mfbridge::cache::{SnapshotStore, TtlCache};
use mfbridge::config::Config;
use mfbridge::fx::FxClient;
use mfbridge::scrape::Scraper;
use mfbridge::selectors::Selectors;
use mfbridge::tools::Toolkit;

#[derive(Parser)]
#[command(name = "mfbridge")]
#[command(about = "Headless-browser bridge for MoneyForward ME")]
struct Cli {
    /// Path to config file
    #[arg(short, long, default_value = "mfbridge.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Total assets and daily change
    Assets,
    /// Recent transactions
    Transactions {
        /// Maximum number of transactions (1-100)
        #[arg(short = 'n', long, default_value_t = 20)]
        count: usize,
    },
    /// Current month's budget status
    Budget,
    /// Trigger account aggregation
    Refresh,
    /// Browser/session/cache health
    Health,
    /// List configured manual accounts
    Accounts,
    /// Update a manual account balance (foreign-currency amount)
    UpdateAccount {
        /// Account name from the config
        name: String,
        /// Balance in the account's own currency
        amount: f64,
    },
    /// Log in now, retrying as needed, without scraping anything
    Login,
    /// Show resolved configuration paths
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(
                "info,chromiumoxide=warn,chromiumoxide::conn=off,chromiumoxide::handler=off",
            )
        }))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_level(true)
                .json(),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load config: {}", cli.config.display()))?;

    if let Command::Config = cli.command {
        println!("Config file:      {}", cli.config.display());
        println!("Selectors file:   {}", config.selectors_path.display());
        println!("Browser profile:  {}", config.profile_dir()?.display());
        println!("Snapshot file:    {}", config.snapshot_path()?.display());
        println!("OTP relay file:   {}", config.browser.otp_relay_path.display());
        println!("Cache TTL:        {}s", config.cache.ttl_seconds);
        return Ok(());
    }

    let selectors = Selectors::load_or_default(&config.selectors_path)?;

    let browser = Arc::new(BrowserHandle::new(BrowserSettings {
        profile_dir: config.profile_dir()?,
        headless: config.browser.headless,
        chrome_executable: config.browser.chrome_executable.clone(),
    }));
    browser
        .initialize()
        .await
        .context("Browser engine failed to initialize")?;

    let relay = OtpRelay::new(config.browser.otp_relay_path.clone());
    let flow = LoginFlow::new(selectors.auth.clone(), config.identity.clone(), relay);
    let driver = BrowserLoginDriver::new(
        Arc::clone(&browser),
        flow,
        selectors.portfolio.url.clone(),
    );
    let auth = Arc::new(Authenticator::new(Arc::new(driver)));

    let scraper = Arc::new(Scraper::new(
        Arc::clone(&browser),
        Arc::clone(&auth),
        selectors,
    ));

    let toolkit = Toolkit {
        scraper,
        cache: Arc::new(TtlCache::new(Duration::from_secs(config.cache.ttl_seconds))),
        snapshots: Arc::new(SnapshotStore::new(config.snapshot_path()?)),
        fx: FxClient::new(),
        accounts: config.accounts.clone(),
    };

    let response = match cli.command {
        Command::Assets => toolkit.get_total_assets().await,
        Command::Transactions { count } => toolkit.list_recent_transactions(count).await,
        Command::Budget => toolkit.get_budget_status().await,
        Command::Refresh => toolkit.trigger_refresh().await,
        Command::Health => toolkit.health_check().await,
        Command::Accounts => toolkit.list_manual_accounts(),
        Command::UpdateAccount { name, amount } => {
            toolkit.update_manual_account(&name, amount).await
        }
        Command::Login => match auth.login().await {
            Ok(()) => serde_json::json!({ "status": "success" }),
            Err(err) => {
                let err = mfbridge::scrape::ScrapeError::Auth(err);
                mfbridge::tools::error_envelope(
                    &err.to_string(),
                    mfbridge::tools::classify_error(&err),
                )
            }
        },
        Command::Config => unreachable!("handled above"),
    };

    println!("{}", serde_json::to_string_pretty(&response)?);

    browser.shutdown().await;
    Ok(())
}
