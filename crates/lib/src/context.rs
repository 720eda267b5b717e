//! Per-request id and structured event logging.

use rand::Rng;

/// Labels every log line produced while handling one inbound request.
#[derive(Debug, Clone)]
pub struct RequestContext {
    id: String,
}

impl RequestContext {
    /// New context with a time-based id plus a short random suffix (e.g. `18b2f0c1a3e-4f2a`).
    /// Only used to correlate log lines, so collisions are tolerable.
    pub fn new() -> Self {
        let millis = chrono::Utc::now().timestamp_millis().max(0) as u64;
        let suffix: u16 = rand::thread_rng().gen();
        Self {
            id: format!("{:x}-{:04x}", millis, suffix),
        }
    }

    /// Context with a fixed id (tests, replays).
    pub fn with_id(id: impl Into<String>) -> Self {
        Self { id: id.into() }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn log_event(&self, event: &str, status: Option<&str>, detail: Option<&str>) {
        self.emit(log::Level::Info, event, status, detail);
    }

    pub fn warn_event(&self, event: &str, status: Option<&str>, detail: Option<&str>) {
        self.emit(log::Level::Warn, event, status, detail);
    }

    pub fn error_event(&self, event: &str, status: Option<&str>, detail: Option<&str>) {
        self.emit(log::Level::Error, event, status, detail);
    }

    fn emit(&self, level: log::Level, event: &str, status: Option<&str>, detail: Option<&str>) {
        log::log!(level, "{}", format_event(&self.id, event, status, detail));
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

fn format_event(id: &str, event: &str, status: Option<&str>, detail: Option<&str>) -> String {
    let mut line = format!("request_id={} event={}", id, event);
    if let Some(s) = status {
        line.push_str(" status=");
        line.push_str(s);
    }
    if let Some(d) = detail {
        line.push_str(" detail=");
        line.push_str(d);
    }
    line
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_have_time_prefix_and_suffix() {
        let ctx = RequestContext::new();
        let (prefix, suffix) = ctx.id().split_once('-').expect("dash");
        assert!(u64::from_str_radix(prefix, 16).is_ok());
        assert_eq!(suffix.len(), 4);
    }

    #[test]
    fn event_line_skips_absent_fields() {
        assert_eq!(
            format_event("abc", "slack.verify", None, None),
            "request_id=abc event=slack.verify"
        );
        assert_eq!(
            format_event("abc", "notion.pages.create", Some("201"), Some("ok")),
            "request_id=abc event=notion.pages.create status=201 detail=ok"
        );
    }
}
