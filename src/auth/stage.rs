//! Pure URL-shape classification for the login state machine.
//!
//! Which login stage is active is decided entirely by substrings of the
//! current page URL; the target site's URL scheme is the actual protocol the
//! state machine speaks. Keeping the classification pure makes it testable
//! without a browser.

/// URL substring marking the emailed one-time-passcode stage.
pub const OTP_MARKER: &str = "email_otp";

/// URL substring marking the account disambiguation stage.
pub const ACCOUNT_SELECTOR_MARKER: &str = "account_selector";

/// Domain of the target application.
pub const APP_DOMAIN: &str = "moneyforward.com";

/// Domain of the identity provider. Any URL here means we are still mid-login
/// (or were bounced back out of the session).
pub const IDP_DOMAIN: &str = "id.moneyforward.com";

/// Page text shown when a submitted passcode was wrong.
pub const INCORRECT_CODE_MARKER: &str = "誤っています";

/// Conditional login stage indicated by a URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoginStage {
    /// The risk-based one-time-passcode challenge.
    OtpChallenge,
    /// The account disambiguation page.
    AccountSelector,
    /// On the application domain; the session is live.
    Authenticated,
    /// Still somewhere on the identity provider (credentials pages,
    /// interstitials, errors).
    IdentityProvider,
}

/// Classify a URL into the login stage it represents.
pub fn classify(url: &str) -> LoginStage {
    if url.contains(OTP_MARKER) {
        LoginStage::OtpChallenge
    } else if url.contains(ACCOUNT_SELECTOR_MARKER) {
        LoginStage::AccountSelector
    } else if is_authenticated(url) {
        LoginStage::Authenticated
    } else {
        LoginStage::IdentityProvider
    }
}

/// A session counts as authenticated when the URL sits on the application
/// domain and not on the identity provider. No cookie or token inspection.
pub fn is_authenticated(url: &str) -> bool {
    url.contains(APP_DOMAIN) && !url.contains(IDP_DOMAIN)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn portfolio_url_is_authenticated() {
        assert!(is_authenticated("https://moneyforward.com/bs/portfolio"));
        assert_eq!(
            classify("https://moneyforward.com/bs/portfolio"),
            LoginStage::Authenticated
        );
    }

    #[test]
    fn idp_urls_are_not_authenticated() {
        assert!(!is_authenticated("https://id.moneyforward.com/sign_in"));
        assert!(!is_authenticated(
            "https://id.moneyforward.com/sign_in/password"
        ));
        assert_eq!(
            classify("https://id.moneyforward.com/sign_in"),
            LoginStage::IdentityProvider
        );
    }

    #[test]
    fn unrelated_urls_are_not_authenticated() {
        assert!(!is_authenticated("about:blank"));
        assert!(!is_authenticated("https://example.com"));
    }

    #[test]
    fn otp_marker_wins_over_domain() {
        assert_eq!(
            classify("https://id.moneyforward.com/email_otp"),
            LoginStage::OtpChallenge
        );
    }

    #[test]
    fn account_selector_marker_is_detected() {
        assert_eq!(
            classify("https://id.moneyforward.com/account_selector?from=sign_in"),
            LoginStage::AccountSelector
        );
    }
}
