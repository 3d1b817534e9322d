//! Signed HTTP delivery
//!
//! The body is the signal's JSON. Each request carries a unix timestamp and
//! an HMAC-SHA256 signature over `"{timestamp}.{body}"`, so receivers can
//! authenticate the sender and reject replays.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use serde::{Deserialize, Serialize};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::debug;

use super::http::{check_header, HttpAdapter, HttpOptions};
use super::{parse_options, to_options, Delivery, DispatchAdapter, WEBHOOK};
use crate::{DispatchError, Options, Result, Signal};

type HmacSha256 = Hmac<Sha256>;

fn default_signature_header() -> String {
    "x-marshal-signature".to_string()
}

fn default_timestamp_header() -> String {
    "x-marshal-timestamp".to_string()
}

fn default_event_type_header() -> String {
    "x-marshal-event".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct WebhookOptions {
    #[serde(flatten)]
    pub http: HttpOptions,
    pub secret: String,
    #[serde(default = "default_signature_header")]
    pub signature_header: String,
    #[serde(default = "default_timestamp_header")]
    pub timestamp_header: String,
    #[serde(default = "default_event_type_header")]
    pub event_type_header: String,
    /// Signal type to the event name announced to the receiver
    #[serde(default)]
    pub event_type_map: BTreeMap<String, String>,
}

impl WebhookOptions {
    pub fn event_type<'a>(&'a self, signal: &'a Signal) -> &'a str {
        self.event_type_map
            .get(&signal.signal_type)
            .map(String::as_str)
            .unwrap_or(signal.signal_type.as_str())
    }
}

/// `sha256=<hex>` signature of `"{timestamp}.{body}"`
pub fn sign(secret: &str, timestamp: i64, body: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| DispatchError::invalid(WEBHOOK, format!("secret: {}", e)))?;
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(body.as_bytes());
    Ok(format!("sha256={}", hex::encode(mac.finalize().into_bytes())))
}

/// Http delivery plus signature headers. Retries go through the inner
/// adapter directly, so a webhook is metered by its own breaker only.
#[derive(Debug, Clone, Default)]
pub struct WebhookAdapter {
    http: HttpAdapter,
}

impl WebhookAdapter {
    pub fn new(http: HttpAdapter) -> Self {
        Self { http }
    }
}

#[async_trait]
impl DispatchAdapter for WebhookAdapter {
    fn adapter_type(&self) -> &str {
        WEBHOOK
    }

    fn validate_opts(&self, options: &Options) -> Result<Options> {
        let mut typed: WebhookOptions = parse_options(WEBHOOK, options)?;
        if typed.secret.is_empty() {
            return Err(DispatchError::invalid(WEBHOOK, "secret: must not be empty"));
        }
        for name in [
            &typed.signature_header,
            &typed.timestamp_header,
            &typed.event_type_header,
        ] {
            check_header(WEBHOOK, name, None)?;
        }
        for event in typed.event_type_map.values() {
            check_header(WEBHOOK, &typed.event_type_header, Some(event))?;
        }
        typed.http = self.http.resolve(WEBHOOK, typed.http)?;
        to_options(WEBHOOK, &typed)
    }

    async fn deliver(&self, signal: &Signal, options: &Options) -> Result<Delivery> {
        let opts: WebhookOptions = parse_options(WEBHOOK, options)?;
        let body = signal.to_json()?;
        let timestamp = chrono::Utc::now().timestamp();
        let signature = sign(&opts.secret, timestamp, &body)?;
        let event_type = opts.event_type(signal).to_string();

        debug!("◆ WEBHOOK {} EVENT {}", opts.http.url, event_type);

        let headers = vec![
            (opts.signature_header.clone(), signature),
            (opts.timestamp_header.clone(), timestamp.to_string()),
            (opts.event_type_header.clone(), event_type),
        ];
        self.http.send_with_retry(&opts.http, body, &headers).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn options(value: serde_json::Value) -> Options {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_sign_covers_secret_and_timestamp() {
        let signature = sign("key", 1_700_000_000, "{}").unwrap();
        assert!(signature.starts_with("sha256="));
        assert_eq!(signature.len(), "sha256=".len() + 64);
        assert_eq!(signature, sign("key", 1_700_000_000, "{}").unwrap());
        assert_ne!(signature, sign("other", 1_700_000_000, "{}").unwrap());
        assert_ne!(signature, sign("key", 1_700_000_001, "{}").unwrap());
    }

    #[test]
    fn test_sign_known_answer() {
        let body = r#"{"type":"order.created"}"#;
        assert_eq!(
            sign("whsec_test", 1_700_000_000, body).unwrap(),
            "sha256=fe321b5f1fdbe13da84d44f2ab83c05590d08405cb1286b2792f1e4dd5323006"
        );
    }

    #[test]
    fn test_validate_rejects_bad_header_names() {
        let adapter = WebhookAdapter::default();
        for field in ["signature_header", "timestamp_header", "event_type_header"] {
            let err = adapter
                .validate_opts(&options(json!({
                    "url": "https://x.io",
                    "secret": "s",
                    field: "no spaces allowed"
                })))
                .unwrap_err();
            assert!(err.is_validation(), "{} accepted", field);
        }

        let err = adapter
            .validate_opts(&options(json!({
                "url": "https://x.io",
                "secret": "s",
                "event_type_map": {"order.created": "Order\nCreated"}
            })))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_requires_secret() {
        let adapter = WebhookAdapter::default();
        let err = adapter
            .validate_opts(&options(json!({"url": "https://x.io"})))
            .unwrap_err();
        assert!(err.to_string().contains("secret"));

        let err = adapter
            .validate_opts(&options(json!({"url": "https://x.io", "secret": ""})))
            .unwrap_err();
        assert!(err.is_validation());
    }

    #[test]
    fn test_validate_fills_header_defaults() {
        let validated = WebhookAdapter::default()
            .validate_opts(&options(json!({"url": "https://x.io", "secret": "s"})))
            .unwrap();

        assert_eq!(validated["signature_header"], json!("x-marshal-signature"));
        assert_eq!(validated["timestamp_header"], json!("x-marshal-timestamp"));
        assert_eq!(validated["event_type_header"], json!("x-marshal-event"));
        assert_eq!(validated["timeout"], json!(5_000));
        assert_eq!(validated["url"], json!("https://x.io"));
    }

    #[test]
    fn test_event_type_mapping() {
        let opts: WebhookOptions = serde_json::from_value(json!({
            "url": "https://x.io",
            "secret": "s",
            "event_type_map": {"order.created": "OrderCreated"}
        }))
        .unwrap();

        assert_eq!(
            opts.event_type(&Signal::new("order.created", "/s")),
            "OrderCreated"
        );
        assert_eq!(
            opts.event_type(&Signal::new("order.deleted", "/s")),
            "order.deleted"
        );
    }
}
