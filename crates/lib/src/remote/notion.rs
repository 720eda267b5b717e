//! Notion pages API: create a task page in the configured database.

use serde_json::{json, Value};

use super::{body_preview, RemoteError, RemoteGateway, LABEL_CREATE_PAGE};
use crate::context::RequestContext;
use crate::transport::{HttpRequest, HttpResponse};

pub const NOTION_VERSION: &str = "2022-06-28";
/// Status every new task page starts in.
pub const RECORD_STATUS: &str = "Incoming";
/// Longest error body logged when Notion rejects a page.
pub const ERROR_PREVIEW_LIMIT: usize = 1500;

/// Page-creation body: title, source link, fixed status, and the message text as a paragraph.
pub fn page_payload(database_id: &str, task_name: &str, permalink: &str, message_text: &str) -> Value {
    json!({
        "parent": { "database_id": database_id },
        "properties": {
            "Task Name": {
                "title": [{ "text": { "content": task_name } }]
            },
            "Source": {
                "url": permalink
            },
            "Status": {
                "status": { "name": RECORD_STATUS }
            }
        },
        "children": [
            {
                "object": "block",
                "type": "paragraph",
                "paragraph": {
                    "rich_text": [{ "type": "text", "text": { "content": message_text } }]
                }
            }
        ]
    })
}

impl RemoteGateway {
    /// POST /pages. Non-2xx responses are returned, not raised; their body preview is logged.
    pub async fn create_record(
        &self,
        ctx: &RequestContext,
        task_name: &str,
        permalink: &str,
        message_text: &str,
    ) -> Result<HttpResponse, RemoteError> {
        let payload = page_payload(&self.notion_database_id, task_name, permalink, message_text);
        let request = HttpRequest::post_json(format!("{}/pages", self.notion_api_base), payload)
            .bearer(self.notion_token.clone())
            .header("Notion-Version", NOTION_VERSION);
        let delivered = self.client.send(ctx, LABEL_CREATE_PAGE, &request).await?;
        let res = delivered.value;

        if res.is_success() {
            ctx.log_event(LABEL_CREATE_PAGE, Some(&res.status.to_string()), None);
        } else {
            ctx.warn_event(
                LABEL_CREATE_PAGE,
                Some(&res.status.to_string()),
                Some(body_preview(&res.body, ERROR_PREVIEW_LIMIT)),
            );
        }
        Ok(res)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::test_support::ScriptedTransport;
    use std::sync::Arc;

    fn gateway(transport: Arc<ScriptedTransport>) -> RemoteGateway {
        let mut config = RelayConfig::default();
        config.notion.token = Some("secret_abc".to_string());
        config.notion.database_id = Some("db-123".to_string());
        config.retry.max_retries = 2;
        config.retry.base_delay_ms = 0;
        config.retry.jitter_ms = 0;
        RemoteGateway::new(&config, transport)
    }

    #[tokio::test]
    async fn builds_page_request() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/pages", vec![Ok(HttpResponse::new(200, r#"{"object":"page"}"#))]);
        let res = gateway(transport.clone())
            .create_record(&RequestContext::with_id("n"), "Ship it", "https://x", "hi")
            .await
            .expect("created");
        assert!(res.is_success());

        let sent = transport.requests_to("/pages");
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].url, "https://api.notion.com/v1/pages");
        assert_eq!(sent[0].bearer_token.as_deref(), Some("secret_abc"));
        assert!(sent[0]
            .headers
            .contains(&("Notion-Version".to_string(), NOTION_VERSION.to_string())));
        let body = sent[0].json.clone().expect("json");
        assert_eq!(body["parent"]["database_id"], "db-123");
        assert_eq!(body["properties"]["Task Name"]["title"][0]["text"]["content"], "Ship it");
        assert_eq!(body["properties"]["Source"]["url"], "https://x");
        assert_eq!(body["properties"]["Status"]["status"]["name"], "Incoming");
        assert_eq!(
            body["children"][0]["paragraph"]["rich_text"][0]["text"]["content"],
            "hi"
        );
    }

    #[tokio::test]
    async fn rejection_is_returned_not_raised() {
        let transport = Arc::new(ScriptedTransport::new());
        let long_error = format!(r#"{{"message":"{}"}}"#, "y".repeat(5000));
        transport.respond("/pages", vec![Ok(HttpResponse::new(400, long_error))]);
        let res = gateway(transport.clone())
            .create_record(&RequestContext::with_id("n"), "t", "https://x", "")
            .await
            .expect("4xx is a response");
        assert_eq!(res.status, 400);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_delivery_error() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond("/pages", vec![Ok(HttpResponse::new(502, "bad gateway"))]);
        let err = gateway(transport.clone())
            .create_record(&RequestContext::with_id("n"), "t", "https://x", "")
            .await
            .expect_err("delivery");
        assert!(matches!(err, RemoteError::Delivery(ref d) if d.attempt_count() == 3));
    }
}
