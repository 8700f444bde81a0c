//! Lifecycle of the single persistent Chromium instance.
//!
//! One `BrowserHandle` owns one browser process backed by an on-disk profile
//! directory, so cookies and login sessions survive process restarts. The
//! handle is constructed once at startup and shared by `Arc`; every page any
//! caller opens comes from this one context.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::Page;
use futures::StreamExt;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Launch parameters for the persistent browser.
#[derive(Debug, Clone)]
pub struct BrowserSettings {
    pub profile_dir: PathBuf,
    pub headless: bool,
    pub chrome_executable: Option<PathBuf>,
}

struct Engine {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

/// Owner of the single long-lived browser process.
pub struct BrowserHandle {
    settings: BrowserSettings,
    engine: Mutex<Option<Engine>>,
}

impl BrowserHandle {
    pub fn new(settings: BrowserSettings) -> Self {
        Self {
            settings,
            engine: Mutex::new(None),
        }
    }

    /// Launch the browser if it is not already running.
    ///
    /// Idempotent; concurrent callers collapse into one launch behind the
    /// engine lock. A launch failure is fatal to the process and is not
    /// retried here.
    pub async fn initialize(&self) -> Result<()> {
        let mut engine = self.engine.lock().await;
        if engine.is_some() {
            tracing::debug!("Browser already initialized");
            return Ok(());
        }

        *engine = Some(self.launch().await?);
        Ok(())
    }

    async fn launch(&self) -> Result<Engine> {
        std::fs::create_dir_all(&self.settings.profile_dir).with_context(|| {
            format!(
                "Failed to create browser profile dir: {}",
                self.settings.profile_dir.display()
            )
        })?;

        let chrome_path = match &self.settings.chrome_executable {
            Some(path) => path.display().to_string(),
            None => find_chrome().context(
                "Chrome/Chromium not found. Install Chrome or set browser.chrome_executable.",
            )?,
        };

        tracing::info!(
            profile_dir = %self.settings.profile_dir.display(),
            headless = self.settings.headless,
            "Launching persistent browser context"
        );

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .user_data_dir(&self.settings.profile_dir)
            .window_size(1920, 1080)
            .viewport(None)
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--no-first-run")
            .arg("--no-default-browser-check")
            .arg("--lang=ja-JP")
            .arg(format!("--user-agent={USER_AGENT}"));

        if !self.settings.headless {
            builder = builder.with_head();
        }

        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to configure browser: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("Failed to launch browser")?;

        // Drain CDP events for the lifetime of the browser.
        let handler_task = tokio::spawn(async move { while (handler.next().await).is_some() {} });

        Ok(Engine {
            browser,
            handler_task,
        })
    }

    /// Open a new page in the persistent context, initializing first if
    /// needed. The caller owns the page and must close it on every exit path.
    pub async fn new_page(&self) -> Result<Page> {
        let mut engine = self.engine.lock().await;
        if engine.is_none() {
            *engine = Some(self.launch().await?);
        }

        let engine = engine.as_ref().context("Browser context is not available")?;
        let page = engine
            .browser
            .new_page("about:blank")
            .await
            .context("Failed to open new page")?;

        Ok(page)
    }

    /// Close the browser and stop the event handler.
    ///
    /// Idempotent. Close errors are logged and swallowed; shutdown must not
    /// mask whatever outcome the caller is already reporting.
    pub async fn shutdown(&self) {
        let mut engine = self.engine.lock().await;
        if let Some(mut engine) = engine.take() {
            tracing::info!("Closing browser context");
            if let Err(err) = engine.browser.close().await {
                tracing::warn!(error = %err, "Error closing browser");
            }
            engine.handler_task.abort();
        }
        tracing::debug!("Browser shutdown complete");
    }

    /// Whether the browser has been launched and not shut down.
    pub async fn is_running(&self) -> bool {
        self.engine.lock().await.is_some()
    }
}

/// Find a Chrome/Chromium executable.
fn find_chrome() -> Option<String> {
    for binary in ["google-chrome", "chromium"] {
        if let Ok(output) = std::process::Command::new("which").arg(binary).output() {
            if output.status.success() {
                let path = String::from_utf8_lossy(&output.stdout).trim().to_string();
                if !path.is_empty() {
                    return Some(path);
                }
            }
        }
    }

    let candidates = [
        "/usr/bin/google-chrome",
        "/usr/bin/google-chrome-stable",
        "/usr/bin/chromium",
        "/usr/bin/chromium-browser",
        "/snap/bin/chromium",
        "/run/current-system/sw/bin/google-chrome",
        "/run/current-system/sw/bin/chromium",
        "/Applications/Google Chrome.app/Contents/MacOS/Google Chrome",
        "/Applications/Chromium.app/Contents/MacOS/Chromium",
    ];

    candidates
        .iter()
        .find(|candidate| Path::new(candidate).exists())
        .map(|candidate| candidate.to_string())
}
