//! Slack request signing: HMAC-SHA256 over `v0:{timestamp}:{raw body}` with the app's signing secret.
//!
//! The body must be the exact bytes received on the wire; re-encoding parsed form fields
//! produces a different digest.

use axum::http::HeaderMap;
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::context::RequestContext;

type HmacSha256 = Hmac<Sha256>;

pub const TIMESTAMP_HEADER: &str = "X-Slack-Request-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Slack-Signature";

/// Requests whose timestamp is further than this from local time (either direction) are rejected.
pub const MAX_SKEW_SECS: i64 = 300;

const VERSION_PREFIX: &str = "v0=";
const DIGEST_HEX_LEN: usize = 64;

/// Why a request failed verification. Every variant maps to 403.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum AuthFailure {
    #[error("missing signature headers")]
    MissingHeaders,
    #[error("signing secret is not set")]
    SecretUnset,
    #[error("request timestamp outside the replay window")]
    StaleTimestamp,
    #[error("signature mismatch")]
    Mismatch,
}

impl AuthFailure {
    pub fn reason(self) -> &'static str {
        match self {
            AuthFailure::MissingHeaders => "missing_headers",
            AuthFailure::SecretUnset => "secret_unset",
            AuthFailure::StaleTimestamp => "stale_timestamp",
            AuthFailure::Mismatch => "mismatch",
        }
    }
}

/// Everything needed to check one request.
#[derive(Debug, Clone, Copy)]
pub struct SignatureContext<'a> {
    /// Timestamp header as sent (unix seconds).
    pub timestamp: Option<&'a str>,
    pub provided_signature: Option<&'a str>,
    pub raw_body: &'a [u8],
    pub shared_secret: &'a str,
}

impl<'a> SignatureContext<'a> {
    /// Pull the timestamp and signature headers; non-UTF-8 values count as absent.
    pub fn from_headers(headers: &'a HeaderMap, raw_body: &'a [u8], shared_secret: &'a str) -> Self {
        Self {
            timestamp: headers.get(TIMESTAMP_HEADER).and_then(|v| v.to_str().ok()),
            provided_signature: headers.get(SIGNATURE_HEADER).and_then(|v| v.to_str().ok()),
            raw_body,
            shared_secret,
        }
    }
}

/// Checks signature and freshness of inbound Slack requests.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureVerifier {
    /// When true, header values and signature prefixes are logged.
    pub debug: bool,
}

impl SignatureVerifier {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }

    /// Verify against the current wall clock.
    pub fn verify(&self, req: &RequestContext, ctx: &SignatureContext<'_>) -> Result<(), AuthFailure> {
        self.verify_at(req, ctx, chrono::Utc::now().timestamp())
    }

    /// Verify with an explicit `now` (unix seconds).
    pub fn verify_at(
        &self,
        req: &RequestContext,
        ctx: &SignatureContext<'_>,
        now: i64,
    ) -> Result<(), AuthFailure> {
        let result = self.check(req, ctx, now);
        if let Err(failure) = result {
            match failure {
                AuthFailure::SecretUnset => {
                    req.error_event("slack.verify", Some("rejected"), Some(failure.reason()))
                }
                _ => req.warn_event("slack.verify", Some("rejected"), Some(failure.reason())),
            }
        }
        result
    }

    fn check(&self, req: &RequestContext, ctx: &SignatureContext<'_>, now: i64) -> Result<(), AuthFailure> {
        if self.debug {
            log::info!(
                "request_id={} slack headers: timestamp={:?} signature={:?}",
                req.id(),
                ctx.timestamp,
                ctx.provided_signature
            );
        }

        let (Some(timestamp), Some(provided)) = (ctx.timestamp, ctx.provided_signature) else {
            return Err(AuthFailure::MissingHeaders);
        };

        let secret = ctx.shared_secret;
        if secret.trim().is_empty() {
            return Err(AuthFailure::SecretUnset);
        }

        let ts: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| AuthFailure::StaleTimestamp)?;
        if now.abs_diff(ts) > MAX_SKEW_SECS as u64 {
            return Err(AuthFailure::StaleTimestamp);
        }

        if self.debug {
            log::info!("request_id={} slack body length={}", req.id(), ctx.raw_body.len());
        }

        let provided_digest = provided
            .strip_prefix(VERSION_PREFIX)
            .filter(|h| is_lowercase_digest(h))
            .and_then(|h| hex::decode(h).ok());
        let matches = match provided_digest {
            Some(digest) => basestring_mac(secret, timestamp, ctx.raw_body)
                .is_some_and(|mac| mac.verify_slice(&digest).is_ok()),
            None => false,
        };
        if !matches {
            if self.debug {
                let computed = sign(secret, timestamp, ctx.raw_body);
                log::warn!(
                    "request_id={} slack signature verification failed: computed={}... received={}...",
                    req.id(),
                    prefix(&computed, 14),
                    prefix(provided, 14)
                );
            }
            return Err(AuthFailure::Mismatch);
        }
        Ok(())
    }
}

fn basestring_mac(secret: &str, timestamp: &str, body: &[u8]) -> Option<HmacSha256> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).ok()?;
    mac.update(b"v0:");
    mac.update(timestamp.as_bytes());
    mac.update(b":");
    mac.update(body);
    Some(mac)
}

/// Compute the `v0=<hex>` signature Slack would send for this timestamp and body.
pub fn sign(secret: &str, timestamp: &str, body: &[u8]) -> String {
    let digest = basestring_mac(secret, timestamp, body)
        .map(|mac| hex::encode(mac.finalize().into_bytes()))
        .unwrap_or_default();
    format!("{}{}", VERSION_PREFIX, digest)
}

/// Slack sends exactly 64 lowercase hex characters; any other spelling is a different signature.
fn is_lowercase_digest(h: &str) -> bool {
    h.len() == DIGEST_HEX_LEN && h.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

fn prefix(s: &str, n: usize) -> &str {
    match s.char_indices().nth(n) {
        Some((i, _)) => &s[..i],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SECRET: &str = "8f742231b10e8888abcd99yyyzzz85a5";
    const NOW: i64 = 1_531_420_618;

    fn ctx<'a>(ts: &'a str, sig: &'a str, body: &'a [u8], secret: &'a str) -> SignatureContext<'a> {
        SignatureContext {
            timestamp: Some(ts),
            provided_signature: Some(sig),
            raw_body: body,
            shared_secret: secret,
        }
    }

    fn verify(c: &SignatureContext<'_>, now: i64) -> Result<(), AuthFailure> {
        SignatureVerifier::default().verify_at(&RequestContext::with_id("t"), c, now)
    }

    #[test]
    fn matches_slack_documented_example() {
        let body = b"token=xyzz0WbapA4vBCDEFasx0q6G&team_id=T1DC2JH3J&team_domain=testteamnow&channel_id=G8PSS9T3V&channel_name=foobar&user_id=U2CERLKJA&user_name=roadrunner&command=%2Fwebhook-collect&text=&response_url=https%3A%2F%2Fhooks.slack.com%2Fcommands%2FT1DC2JH3J%2F397700885554%2F96rGlfmibIGlgcZRskXaIFfN&trigger_id=398738663015.47445629121.803a0bc887a14d10d2c447fce8b6703c";
        let expected = "v0=a2114d57b48eac39b9ad189dd8316235a7b4a8d21a10bd27519666489c69b503";
        assert_eq!(sign(SECRET, "1531420618", body), expected);
        assert_eq!(verify(&ctx("1531420618", expected, body, SECRET), NOW), Ok(()));
    }

    #[test]
    fn accepts_within_window_both_directions() {
        let body = b"payload=%7B%7D";
        for offset in [-300i64, -1, 0, 1, 300] {
            let ts = (NOW + offset).to_string();
            let sig = sign(SECRET, &ts, body);
            assert_eq!(verify(&ctx(&ts, &sig, body, SECRET), NOW), Ok(()), "offset {}", offset);
        }
    }

    #[test]
    fn rejects_outside_window_even_when_signed() {
        let body = b"payload=%7B%7D";
        for offset in [-301i64, 301, -86_400, 86_400] {
            let ts = (NOW + offset).to_string();
            let sig = sign(SECRET, &ts, body);
            assert_eq!(
                verify(&ctx(&ts, &sig, body, SECRET), NOW),
                Err(AuthFailure::StaleTimestamp)
            );
        }
    }

    #[test]
    fn any_single_byte_change_is_rejected() {
        let ts = NOW.to_string();
        let body = b"payload=%7B%22type%22%3A%22message_action%22%7D";
        let good = sign(SECRET, &ts, body);
        let bytes = good.as_bytes();
        for i in 0..bytes.len() {
            let mut tampered = bytes.to_vec();
            tampered[i] = if tampered[i] == b'0' { b'1' } else { b'0' };
            let tampered = String::from_utf8(tampered).expect("ascii");
            assert_eq!(
                verify(&ctx(&ts, &tampered, body, SECRET), NOW),
                Err(AuthFailure::Mismatch),
                "byte {}",
                i
            );
        }
    }

    #[test]
    fn case_change_in_digest_is_rejected() {
        let ts = NOW.to_string();
        let body = b"payload=%7B%22type%22%3A%22message_action%22%7D";
        let good = sign(SECRET, &ts, body);
        let mut changed = 0;
        for (i, c) in good.char_indices().skip(VERSION_PREFIX.len()) {
            if !c.is_ascii_lowercase() {
                continue;
            }
            let mut tampered = good.clone();
            tampered.replace_range(i..i + 1, &c.to_ascii_uppercase().to_string());
            assert_eq!(
                verify(&ctx(&ts, &tampered, body, SECRET), NOW),
                Err(AuthFailure::Mismatch),
                "char {}",
                i
            );
            changed += 1;
        }
        assert!(changed > 0);
        assert_eq!(
            verify(&ctx(&ts, &good.to_ascii_uppercase(), body, SECRET), NOW),
            Err(AuthFailure::Mismatch)
        );
    }

    #[test]
    fn secret_is_used_verbatim_as_key() {
        let ts = NOW.to_string();
        let body = b"payload=%7B%7D";
        let padded = format!(" {} ", SECRET);
        let sig = sign(&padded, &ts, body);
        assert_eq!(verify(&ctx(&ts, &sig, body, &padded), NOW), Ok(()));
        assert_eq!(
            verify(&ctx(&ts, &sig, body, SECRET), NOW),
            Err(AuthFailure::Mismatch)
        );
    }

    #[test]
    fn truncated_or_padded_digest_is_rejected() {
        let ts = NOW.to_string();
        let body = b"payload=%7B%7D";
        let good = sign(SECRET, &ts, body);
        let padded = format!("{}00", good);
        let v1 = good.replacen("v0=", "v1=", 1);
        for sig in [&good[..good.len() - 2], padded.as_str(), v1.as_str(), "v0="] {
            assert_eq!(
                verify(&ctx(&ts, sig, body, SECRET), NOW),
                Err(AuthFailure::Mismatch),
                "{}",
                sig
            );
        }
    }

    #[test]
    fn body_must_be_exact_wire_bytes() {
        let ts = NOW.to_string();
        let sig = sign(SECRET, &ts, b"payload=%7B%7D");
        assert_eq!(
            verify(&ctx(&ts, &sig, b"payload={}", SECRET), NOW),
            Err(AuthFailure::Mismatch)
        );
    }

    #[test]
    fn empty_secret_fails_even_with_valid_signature() {
        let ts = NOW.to_string();
        let body = b"x";
        let sig = sign("", &ts, body);
        assert_eq!(verify(&ctx(&ts, &sig, body, ""), NOW), Err(AuthFailure::SecretUnset));
        assert_eq!(verify(&ctx(&ts, &sig, body, "  "), NOW), Err(AuthFailure::SecretUnset));
    }

    #[test]
    fn missing_headers_fail() {
        let body = b"x";
        let mut c = ctx("1", "v0=00", body, SECRET);
        c.timestamp = None;
        assert_eq!(verify(&c, NOW), Err(AuthFailure::MissingHeaders));
        let mut c = ctx("1", "v0=00", body, SECRET);
        c.provided_signature = None;
        assert_eq!(verify(&c, NOW), Err(AuthFailure::MissingHeaders));
    }

    #[test]
    fn non_numeric_timestamp_is_stale() {
        assert_eq!(
            verify(&ctx("yesterday", "v0=00", b"x", SECRET), NOW),
            Err(AuthFailure::StaleTimestamp)
        );
    }

    #[test]
    fn unprefixed_or_non_hex_signature_is_mismatch() {
        let ts = NOW.to_string();
        let sig = sign(SECRET, &ts, b"x");
        let bare = sig.trim_start_matches("v0=").to_string();
        assert_eq!(verify(&ctx(&ts, &bare, b"x", SECRET), NOW), Err(AuthFailure::Mismatch));
        assert_eq!(verify(&ctx(&ts, "v0=zz", b"x", SECRET), NOW), Err(AuthFailure::Mismatch));
    }

    #[test]
    fn reads_headers_from_map() {
        let mut headers = HeaderMap::new();
        headers.insert(TIMESTAMP_HEADER, "123".parse().expect("header"));
        headers.insert(SIGNATURE_HEADER, "v0=ab".parse().expect("header"));
        let c = SignatureContext::from_headers(&headers, b"", SECRET);
        assert_eq!(c.timestamp, Some("123"));
        assert_eq!(c.provided_signature, Some("v0=ab"));
    }
}
