//! Slack Web API: chat.getPermalink and views.open.

use serde_json::{json, Value};

use super::{RemoteError, RemoteGateway, LABEL_PERMALINK, LABEL_VIEWS_OPEN};
use crate::context::RequestContext;
use crate::interaction::CorrelationMetadata;
use crate::transport::{HttpRequest, HttpResponse};

pub const TASK_NAME_CALLBACK_ID: &str = "task_name_modal";
pub const TASK_NAME_BLOCK_ID: &str = "task_name_block";
pub const TASK_NAME_ACTION_ID: &str = "task_name_input";

/// Modal asking for a task name. `private_metadata` is carried back verbatim on submit.
pub fn modal_view(private_metadata: &str) -> Value {
    json!({
        "type": "modal",
        "callback_id": TASK_NAME_CALLBACK_ID,
        "title": { "type": "plain_text", "text": "Add to Notion" },
        "submit": { "type": "plain_text", "text": "Save" },
        "close": { "type": "plain_text", "text": "Cancel" },
        "private_metadata": private_metadata,
        "blocks": [
            {
                "type": "input",
                "block_id": TASK_NAME_BLOCK_ID,
                "label": { "type": "plain_text", "text": "Task Name" },
                "element": {
                    "type": "plain_text_input",
                    "action_id": TASK_NAME_ACTION_ID,
                    "placeholder": { "type": "plain_text", "text": "What do you need to do?" }
                }
            }
        ]
    })
}

impl RemoteGateway {
    /// GET chat.getPermalink: stable URL for the message.
    pub async fn fetch_permalink(
        &self,
        ctx: &RequestContext,
        channel_id: &str,
        message_ts: &str,
    ) -> Result<String, RemoteError> {
        let request = HttpRequest::get(format!("{}/chat.getPermalink", self.slack_api_base))
            .query("channel", channel_id)
            .query("message_ts", message_ts)
            .bearer(self.slack_bot_token.clone());
        let delivered = self.client.send(ctx, LABEL_PERMALINK, &request).await?;
        let res = delivered.value;
        ctx.log_event(LABEL_PERMALINK, Some(&res.status.to_string()), None);

        let body: Value = serde_json::from_str(&res.body)
            .map_err(|e| RemoteError::Lookup(format!("permalink response is not JSON: {}", e)))?;
        match body.get("permalink").and_then(Value::as_str) {
            Some(link) => Ok(link.to_string()),
            None => {
                let slack_error = body.get("error").and_then(Value::as_str).unwrap_or("none");
                Err(RemoteError::Lookup(format!(
                    "no permalink in response (status {}, error {})",
                    res.status, slack_error
                )))
            }
        }
    }

    /// POST views.open: show the task-name modal with correlation metadata embedded.
    pub async fn open_interactive_form(
        &self,
        ctx: &RequestContext,
        trigger_id: &str,
        message_ts: &str,
        channel_id: &str,
        message_text: &str,
        permalink: &str,
    ) -> Result<HttpResponse, RemoteError> {
        let metadata = CorrelationMetadata::new(permalink, message_text).encode()?;
        let payload = json!({
            "trigger_id": trigger_id,
            "view": modal_view(&metadata),
        });
        let request = HttpRequest::post_json(format!("{}/views.open", self.slack_api_base), payload)
            .bearer(self.slack_bot_token.clone());
        let delivered = self.client.send(ctx, LABEL_VIEWS_OPEN, &request).await?;
        let res = delivered.value;

        let ok = match res.json().and_then(|v| v.get("ok").and_then(Value::as_bool)) {
            Some(b) => b.to_string(),
            None => "null".to_string(),
        };
        ctx.log_event(
            LABEL_VIEWS_OPEN,
            Some(&res.status.to_string()),
            Some(&format!("ok={} channel={} ts={}", ok, channel_id, message_ts)),
        );
        Ok(res)
    }
}
