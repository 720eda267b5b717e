//! Remote APIs the relay calls: Slack Web API (permalink lookup, modal open) and Notion (page create).
//!
//! Each operation goes through [`RetryingClient`] under its own label and propagates
//! [`DeliveryError`] untouched; callers decide how to degrade.

mod notion;
mod slack;

use std::sync::Arc;

use crate::config::RelayConfig;
use crate::retry::{DeliveryError, RetryingClient};
use crate::transport::HttpTransport;

pub use notion::{page_payload, ERROR_PREVIEW_LIMIT, NOTION_VERSION, RECORD_STATUS};
pub use slack::{modal_view, TASK_NAME_ACTION_ID, TASK_NAME_BLOCK_ID, TASK_NAME_CALLBACK_ID};

pub const LABEL_PERMALINK: &str = "slack.chat.getPermalink";
pub const LABEL_VIEWS_OPEN: &str = "slack.views.open";
pub const LABEL_CREATE_PAGE: &str = "notion.pages.create";

#[derive(Debug, thiserror::Error)]
pub enum RemoteError {
    /// Call went through but the expected field was missing or the body was not JSON.
    #[error("lookup failed: {0}")]
    Lookup(String),
    #[error(transparent)]
    Delivery(#[from] DeliveryError),
    #[error("encoding request payload: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Credentials, base URLs and the retrying client shared by all remote operations.
#[derive(Clone)]
pub struct RemoteGateway {
    client: RetryingClient,
    slack_api_base: String,
    slack_bot_token: Option<String>,
    notion_api_base: String,
    notion_token: Option<String>,
    notion_database_id: String,
}

impl RemoteGateway {
    pub fn new(config: &RelayConfig, transport: Arc<dyn HttpTransport>) -> Self {
        Self {
            client: RetryingClient::new(transport, config.retry.policy()),
            slack_api_base: config.slack_api_base(),
            slack_bot_token: config.slack_bot_token(),
            notion_api_base: config.notion_api_base(),
            notion_token: config.notion_token(),
            notion_database_id: config.notion_database_id().unwrap_or_default(),
        }
    }
}

/// At most `limit` bytes of `body`, cut back to a char boundary.
pub fn body_preview(body: &str, limit: usize) -> &str {
    if body.len() <= limit {
        return body;
    }
    let mut end = limit;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preview_is_bounded_and_char_safe() {
        assert_eq!(body_preview("short", 1500), "short");
        let long = "x".repeat(2000);
        assert_eq!(body_preview(&long, 1500).len(), 1500);
        // 'é' is two bytes; a cut at an odd offset must back off.
        let accented = "é".repeat(1000);
        let p = body_preview(&accented, 1501);
        assert_eq!(p.len(), 1500);
        assert!(p.chars().all(|c| c == 'é'));
    }
}
