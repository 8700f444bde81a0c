//! JPY amount parsing from scraped text.

use std::sync::OnceLock;

use regex::Regex;

fn amount_regex() -> &'static Regex {
    static AMOUNT: OnceLock<Regex> = OnceLock::new();
    AMOUNT.get_or_init(|| Regex::new(r"-?\d+").expect("valid regex"))
}

/// Parse a currency string like `¥1,234,567` or `-¥12,345` into yen.
///
/// The site mixes the amount with currency marks and labels
/// (`資産総額：4703541円` and the like), so this strips `¥`, `円`, commas and
/// whitespace and takes the first signed integer. Unparseable input parses
/// as 0 with a warning; a garbled cell must not fail a whole scrape.
pub fn parse_currency(text: &str) -> i64 {
    let cleaned: String = text
        .chars()
        .filter(|c| !matches!(c, '¥' | '円' | ',') && !c.is_whitespace())
        .collect();

    match amount_regex().find(&cleaned) {
        Some(found) => found.as_str().parse().unwrap_or_else(|_| {
            tracing::warn!(text, "Currency parse failed");
            0
        }),
        None => {
            if !cleaned.is_empty() && cleaned != "-" {
                tracing::warn!(text, "Currency parse failed");
            }
            0
        }
    }
}
