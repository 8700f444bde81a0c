//! Browser engine ownership and page-level DOM helpers.

mod dom;
mod lifecycle;

pub use dom::{
    body_text, current_url, extract_text, js_click, settle, type_slowly, wait_for_selector,
};
pub use lifecycle::{BrowserHandle, BrowserSettings};
