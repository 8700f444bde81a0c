pub mod auth;
pub mod browser;
pub mod cache;
pub mod clock;
pub mod config;
pub mod fx;
pub mod scrape;
pub mod selectors;
pub mod tools;
