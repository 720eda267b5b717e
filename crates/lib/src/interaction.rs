//! Slack interaction callbacks: decoding and the two-phase flow.
//!
//! A message shortcut (`message_action`) opens the task-name modal; submitting it
//! (`view_submission`) creates the Notion page. The only state between the phases is
//! [`CorrelationMetadata`], which Slack carries in the modal's `private_metadata`.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

use crate::context::RequestContext;
use crate::remote::{RemoteGateway, TASK_NAME_ACTION_ID, TASK_NAME_BLOCK_ID, TASK_NAME_CALLBACK_ID};

/// Page title used when the submitted task name is blank.
pub const DEFAULT_TASK_NAME: &str = "Untitled task";
/// Inline error shown on the task-name field when the page could not be created.
pub const SAVE_FAILED_MESSAGE: &str = "Couldn't save to Notion. Please try again.";

/// Why an inbound request was rejected with 400.
#[derive(Debug, thiserror::Error)]
pub enum MalformedRequest {
    #[error("form body is not valid urlencoded data")]
    InvalidForm,
    #[error("missing payload parameter")]
    MissingPayload,
    #[error("payload is not valid JSON: {0}")]
    InvalidJson(String),
    #[error("payload has no string `type`")]
    MissingType,
    #[error("{kind} payload is missing required fields: {detail}")]
    InvalidShape { kind: &'static str, detail: String },
    #[error("private metadata could not be decoded: {0}")]
    InvalidMetadata(String),
}

/// Correlation state written into the modal when it opens and read back on submit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationMetadata {
    pub permalink: String,
    pub message_text: String,
}

impl CorrelationMetadata {
    pub fn new(permalink: impl Into<String>, message_text: impl Into<String>) -> Self {
        Self {
            permalink: permalink.into(),
            message_text: message_text.into(),
        }
    }

    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn decode(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Channel {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub ts: String,
    #[serde(default)]
    pub text: Option<String>,
}

/// Message shortcut invoked on a message.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageAction {
    pub trigger_id: String,
    pub channel: Channel,
    pub message: Message,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct InputValue {
    #[serde(default)]
    pub value: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ViewState {
    /// block_id → action_id → value.
    #[serde(default)]
    pub values: HashMap<String, HashMap<String, InputValue>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct View {
    #[serde(default)]
    pub callback_id: String,
    #[serde(default)]
    pub private_metadata: String,
    #[serde(default)]
    pub state: ViewState,
}

/// Modal submitted.
#[derive(Debug, Clone, Deserialize)]
pub struct ViewSubmission {
    pub view: View,
}

impl ViewSubmission {
    fn input_value(&self, block_id: &str, action_id: &str) -> Option<&str> {
        self.view
            .state
            .values
            .get(block_id)
            .and_then(|actions| actions.get(action_id))
            .and_then(|input| input.value.as_deref())
    }
}

/// An inbound callback, decoded once at the boundary.
#[derive(Debug, Clone)]
pub enum InboundCallback {
    MessageAction(MessageAction),
    ViewSubmission(ViewSubmission),
    /// Any other interaction type (block_actions, shortcut, view_closed, ...).
    Unsupported { kind: String },
}

impl InboundCallback {
    pub fn kind(&self) -> &str {
        match self {
            InboundCallback::MessageAction(_) => "message_action",
            InboundCallback::ViewSubmission(_) => "view_submission",
            InboundCallback::Unsupported { kind } => kind,
        }
    }

    /// Decode the JSON `payload` parameter.
    pub fn from_json(raw: &str) -> Result<Self, MalformedRequest> {
        let value: Value =
            serde_json::from_str(raw).map_err(|e| MalformedRequest::InvalidJson(e.to_string()))?;
        let kind = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or(MalformedRequest::MissingType)?
            .to_string();
        match kind.as_str() {
            "message_action" => serde_json::from_value(value)
                .map(InboundCallback::MessageAction)
                .map_err(|e| MalformedRequest::InvalidShape {
                    kind: "message_action",
                    detail: e.to_string(),
                }),
            "view_submission" => serde_json::from_value(value)
                .map(InboundCallback::ViewSubmission)
                .map_err(|e| MalformedRequest::InvalidShape {
                    kind: "view_submission",
                    detail: e.to_string(),
                }),
            _ => Ok(InboundCallback::Unsupported { kind }),
        }
    }

    /// Decode a urlencoded request body carrying a `payload` field.
    pub fn from_form_body(body: &[u8]) -> Result<Self, MalformedRequest> {
        #[derive(Deserialize)]
        struct ActionForm {
            payload: Option<String>,
        }
        let form: ActionForm =
            serde_urlencoded::from_bytes(body).map_err(|_| MalformedRequest::InvalidForm)?;
        let payload = form.payload.ok_or(MalformedRequest::MissingPayload)?;
        Self::from_json(&payload)
    }
}

/// What to send back to Slack with a 200.
#[derive(Debug, Clone, PartialEq)]
pub enum InteractionReply {
    /// Empty body (acknowledgment).
    Empty,
    /// JSON body, e.g. a `response_action`.
    Json(Value),
}

impl InteractionReply {
    pub fn clear() -> Self {
        InteractionReply::Json(json!({ "response_action": "clear" }))
    }

    /// Re-display the modal with `message` attached to the task-name field.
    pub fn field_error(message: &str) -> Self {
        InteractionReply::Json(json!({
            "response_action": "errors",
            "errors": { TASK_NAME_BLOCK_ID: message }
        }))
    }
}

/// Routes decoded callbacks to the remote operations.
#[derive(Clone)]
pub struct InteractionRouter {
    remote: RemoteGateway,
}

impl InteractionRouter {
    pub fn new(remote: RemoteGateway) -> Self {
        Self { remote }
    }

    pub async fn route(
        &self,
        ctx: &RequestContext,
        callback: InboundCallback,
    ) -> Result<InteractionReply, MalformedRequest> {
        match callback {
            InboundCallback::MessageAction(action) => Ok(self.message_action(ctx, action).await),
            InboundCallback::ViewSubmission(submission) => {
                if submission.view.callback_id != TASK_NAME_CALLBACK_ID {
                    ctx.log_event(
                        "view_submission.ignored",
                        None,
                        Some(&format!("callback_id={}", submission.view.callback_id)),
                    );
                    return Ok(InteractionReply::Empty);
                }
                self.view_submission(ctx, submission).await
            }
            InboundCallback::Unsupported { kind } => {
                ctx.log_event("interaction.ignored", None, Some(&format!("type={}", kind)));
                Ok(InteractionReply::Empty)
            }
        }
    }

    /// Look up the permalink, then open the modal. Remote failures are logged and acknowledged
    /// with an empty 200 so Slack does not show a generic error.
    async fn message_action(&self, ctx: &RequestContext, action: MessageAction) -> InteractionReply {
        let channel_id = action.channel.id;
        let message_ts = action.message.ts;
        let message_text = action.message.text.unwrap_or_default();
        ctx.log_event(
            "message_action.received",
            None,
            Some(&format!("channel={} ts={}", channel_id, message_ts)),
        );

        let permalink = match self.remote.fetch_permalink(ctx, &channel_id, &message_ts).await {
            Ok(link) => link,
            Err(e) => {
                ctx.error_event("message_action.failed", Some("permalink"), Some(&e.to_string()));
                return InteractionReply::Empty;
            }
        };
        if let Err(e) = self
            .remote
            .open_interactive_form(
                ctx,
                &action.trigger_id,
                &message_ts,
                &channel_id,
                &message_text,
                &permalink,
            )
            .await
        {
            ctx.error_event("message_action.failed", Some("views_open"), Some(&e.to_string()));
        }
        InteractionReply::Empty
    }

    async fn view_submission(
        &self,
        ctx: &RequestContext,
        submission: ViewSubmission,
    ) -> Result<InteractionReply, MalformedRequest> {
        let metadata = CorrelationMetadata::decode(&submission.view.private_metadata)
            .map_err(|e| MalformedRequest::InvalidMetadata(e.to_string()))?;
        let submitted = submission
            .input_value(TASK_NAME_BLOCK_ID, TASK_NAME_ACTION_ID)
            .map(str::trim)
            .unwrap_or_default();
        ctx.log_event(
            "view_submission.received",
            None,
            Some(&format!("task_name_present={}", !submitted.is_empty())),
        );
        let task_name = if submitted.is_empty() {
            DEFAULT_TASK_NAME
        } else {
            submitted
        };

        match self
            .remote
            .create_record(ctx, task_name, &metadata.permalink, &metadata.message_text)
            .await
        {
            Ok(res) if res.is_success() => Ok(InteractionReply::clear()),
            Ok(res) => {
                ctx.warn_event(
                    "view_submission.failed",
                    Some(&res.status.to_string()),
                    Some("record rejected"),
                );
                Ok(InteractionReply::field_error(SAVE_FAILED_MESSAGE))
            }
            Err(e) => {
                ctx.error_event("view_submission.failed", Some("delivery"), Some(&e.to_string()));
                Ok(InteractionReply::field_error(SAVE_FAILED_MESSAGE))
            }
        }
    }
}
