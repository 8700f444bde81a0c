//! Small DOM helpers shared by the login flow and the scrapers.

use std::time::Duration;

use anyhow::{Context, Result};
use chromiumoxide::{Element, Page};

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const SETTLE_NAVIGATION_TIMEOUT: Duration = Duration::from_secs(15);
const KEYSTROKE_DELAY: Duration = Duration::from_millis(50);

/// Poll for an element until it appears or the timeout elapses.
///
/// Returns `Ok(None)` on timeout so callers can attach their own typed
/// timeout error.
pub async fn wait_for_selector(
    page: &Page,
    selector: &str,
    timeout: Duration,
) -> Result<Option<Element>> {
    let deadline = tokio::time::Instant::now() + timeout;
    loop {
        if let Ok(element) = page.find_element(selector).await {
            return Ok(Some(element));
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(None);
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Clear a field and type into it with a deliberate inter-keystroke delay.
///
/// Instantaneous form fills are a bot-detection signal on the identity
/// provider, so keystrokes are paced like a human.
pub async fn type_slowly(page: &Page, element: &Element, selector: &str, text: &str) -> Result<()> {
    element.focus().await.context("Failed to focus input")?;

    page.evaluate(format!("document.querySelector('{selector}').value = ''"))
        .await
        .context("Failed to clear input")?;

    for ch in text.chars() {
        element
            .type_str(ch.to_string())
            .await
            .context("Failed to type into input")?;
        tokio::time::sleep(KEYSTROKE_DELAY).await;
    }

    Ok(())
}

/// Click an element through `querySelector(..).click()` instead of a
/// simulated pointer click. An overlay element can intercept pointer events
/// and silently swallow the click; the script click cannot be intercepted.
pub async fn js_click(page: &Page, selector: &str) -> Result<()> {
    page.evaluate(format!("document.querySelector('{selector}').click()"))
        .await
        .with_context(|| format!("Failed to click {selector}"))?;
    Ok(())
}

/// Wait for the page to settle after a submit or navigation.
pub async fn settle(page: &Page) -> Result<()> {
    // The navigation may already have completed by the time we get here, in
    // which case the wait times out harmlessly.
    let _ = tokio::time::timeout(SETTLE_NAVIGATION_TIMEOUT, page.wait_for_navigation()).await;
    tokio::time::sleep(Duration::from_millis(500)).await;
    Ok(())
}

/// Current page URL, empty string if the target has none yet.
pub async fn current_url(page: &Page) -> Result<String> {
    let url = page.url().await.context("Failed to read page URL")?;
    Ok(url.unwrap_or_default())
}

/// Trimmed inner text of the first element matching `selector`, or `None`
/// if the element is absent or empty.
pub async fn extract_text(page: &Page, selector: &str) -> Option<String> {
    let element = page.find_element(selector).await.ok()?;
    match element.inner_text().await {
        Ok(Some(text)) => {
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        Ok(None) => None,
        Err(err) => {
            tracing::warn!(selector, error = %err, "Text extraction failed");
            None
        }
    }
}

/// Full visible text of the page body.
pub async fn body_text(page: &Page) -> Result<String> {
    let value = page
        .evaluate("document.body.innerText")
        .await
        .context("Failed to read body text")?;
    Ok(value.into_value::<String>().unwrap_or_default())
}
