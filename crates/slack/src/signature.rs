use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-slack-signature";
pub const TIMESTAMP_HEADER: &str = "x-slack-request-timestamp";
pub const RETRY_REASON_HEADER: &str = "x-slack-retry-reason";
pub const RETRY_NUM_HEADER: &str = "x-slack-retry-num";

/// Requests older than this are rejected even when correctly signed.
pub const MAX_REQUEST_AGE_SECS: i64 = 60 * 5;

const VERSION_PREFIX: &str = "v0=";

/// Checks a Slack `v0` request signature.
///
/// The signed base string is `v0:{timestamp}:{body}`. Comparison is constant
/// time; malformed, truncated or oversized signatures are rejected without
/// panicking.
pub fn verify_signature(
    timestamp: Option<&str>,
    signature: Option<&str>,
    body: &[u8],
    signing_secret: &str,
    now: DateTime<Utc>,
) -> bool {
    let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
        return false;
    };
    let Ok(timestamp) = timestamp.trim().parse::<i64>() else {
        return false;
    };
    match now.timestamp().checked_sub(timestamp) {
        Some(age) if age <= MAX_REQUEST_AGE_SECS => {}
        _ => return false,
    }
    let Some(provided) = signature.strip_prefix(VERSION_PREFIX) else {
        return false;
    };
    let Ok(provided) = hex::decode(provided) else {
        return false;
    };

    let Ok(mut mac) = HmacSha256::new_from_slice(signing_secret.as_bytes()) else {
        return false;
    };
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    mac.verify_slice(&provided).is_ok()
}

/// Produces the header value Slack would send for `body` at `timestamp`.
pub fn sign(timestamp: i64, body: &[u8], signing_secret: &str) -> Option<String> {
    let mut mac = HmacSha256::new_from_slice(signing_secret.as_bytes()).ok()?;
    mac.update(format!("v0:{timestamp}:").as_bytes());
    mac.update(body);
    Some(format!("{VERSION_PREFIX}{}", hex::encode(mac.finalize().into_bytes())))
}
