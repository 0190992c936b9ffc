use axum::http::HeaderMap;
use base64::{engine::general_purpose::STANDARD, Engine};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::info;

use crate::db::UserStore;
use crate::error::ApiError;
use crate::models::User;

type HmacSha256 = Hmac<Sha256>;

/// Deliveries older or newer than this are refused.
const TIMESTAMP_TOLERANCE_SECS: i64 = 5 * 60;

const SECRET_PREFIX: &str = "whsec_";

#[derive(Error, Debug, PartialEq, Eq)]
pub enum VerifyError {
    #[error("missing header '{0}'")]
    MissingHeader(&'static str),

    #[error("invalid timestamp header")]
    InvalidTimestamp,

    #[error("timestamp outside the accepted window")]
    TimestampOutOfTolerance,

    #[error("no matching signature found")]
    NoMatchingSignature,

    #[error("webhook secret is not valid base64")]
    InvalidSecret,
}

/// Checks Svix-style signed deliveries: HMAC-SHA256 over
/// `"{id}.{timestamp}.{body}"`, base64 encoded, listed as `v1,<sig>` entries
/// in the signature header.
#[derive(Clone)]
pub struct WebhookVerifier {
    key: Vec<u8>,
}

impl WebhookVerifier {
    /// Accepts the secret with or without its `whsec_` prefix.
    pub fn new(secret: &str) -> Result<Self, VerifyError> {
        let encoded = secret.trim();
        let encoded = encoded.strip_prefix(SECRET_PREFIX).unwrap_or(encoded);
        let key = STANDARD.decode(encoded).map_err(|_| VerifyError::InvalidSecret)?;
        Ok(Self { key })
    }

    pub fn verify(&self, headers: &HeaderMap, body: &[u8]) -> Result<(), VerifyError> {
        self.verify_at(headers, body, chrono::Utc::now().timestamp())
    }

    pub fn verify_at(&self, headers: &HeaderMap, body: &[u8], now: i64) -> Result<(), VerifyError> {
        let msg_id = header(headers, "svix-id", "webhook-id")?;
        let timestamp = header(headers, "svix-timestamp", "webhook-timestamp")?;
        let signatures = header(headers, "svix-signature", "webhook-signature")?;

        let sent_at: i64 = timestamp
            .trim()
            .parse()
            .map_err(|_| VerifyError::InvalidTimestamp)?;
        if now.abs_diff(sent_at) > TIMESTAMP_TOLERANCE_SECS.unsigned_abs() {
            return Err(VerifyError::TimestampOutOfTolerance);
        }

        let mac = self.mac(msg_id, timestamp, body);
        for entry in signatures.split_whitespace() {
            let Some((version, encoded)) = entry.split_once(',') else {
                continue;
            };
            if version != "v1" {
                continue;
            }
            let Ok(candidate) = STANDARD.decode(encoded) else {
                continue;
            };
            if mac.clone().verify_slice(&candidate).is_ok() {
                return Ok(());
            }
        }

        Err(VerifyError::NoMatchingSignature)
    }

    /// Produces the `v1,<sig>` entry a sender would attach for this message.
    pub fn sign(&self, msg_id: &str, timestamp: i64, body: &[u8]) -> String {
        let mac = self.mac(msg_id, &timestamp.to_string(), body);
        format!("v1,{}", STANDARD.encode(mac.finalize().into_bytes()))
    }

    fn mac(&self, msg_id: &str, timestamp: &str, body: &[u8]) -> HmacSha256 {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC can take key of any size");
        mac.update(msg_id.as_bytes());
        mac.update(b".");
        mac.update(timestamp.as_bytes());
        mac.update(b".");
        mac.update(body);
        mac
    }
}

fn header<'a>(headers: &'a HeaderMap, name: &'static str, alias: &'static str) -> Result<&'a str, VerifyError> {
    headers
        .get(name)
        .or_else(|| headers.get(alias))
        .and_then(|v| v.to_str().ok())
        .ok_or(VerifyError::MissingHeader(name))
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct UserPayload {
    pub id: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct DeletedPayload {
    pub id: String,
}

/// The provider events this service understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookEvent {
    UserCreated(UserPayload),
    UserUpdated(UserPayload),
    UserDeleted(DeletedPayload),
    Unknown(String),
}

#[derive(Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    event_type: String,
    #[serde(default)]
    data: serde_json::Value,
}

impl WebhookEvent {
    pub fn parse(body: &[u8]) -> Result<Self, serde_json::Error> {
        let envelope: Envelope = serde_json::from_slice(body)?;
        let event = match envelope.event_type.as_str() {
            "user.created" => WebhookEvent::UserCreated(serde_json::from_value(envelope.data)?),
            "user.updated" => WebhookEvent::UserUpdated(serde_json::from_value(envelope.data)?),
            "user.deleted" => WebhookEvent::UserDeleted(serde_json::from_value(envelope.data)?),
            _ => WebhookEvent::Unknown(envelope.event_type),
        };
        Ok(event)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookOutcome {
    Upserted(User),
    Deleted { external_id: String, existed: bool },
    Ignored(String),
}

/// Verifies a delivery and applies it to the store.
///
/// Nothing touches the store unless the signature checks out.
pub async fn handle_delivery(
    verifier: &WebhookVerifier,
    store: &dyn UserStore,
    headers: &HeaderMap,
    body: &[u8],
) -> Result<WebhookOutcome, ApiError> {
    verifier.verify(headers, body)?;
    let event = WebhookEvent::parse(body)
        .map_err(|e| ApiError::Validation(format!("malformed webhook payload: {}", e)))?;
    apply_event(store, event).await
}

pub async fn apply_event(store: &dyn UserStore, event: WebhookEvent) -> Result<WebhookOutcome, ApiError> {
    match event {
        WebhookEvent::UserCreated(payload) | WebhookEvent::UserUpdated(payload) => {
            let user = store.upsert(&payload.id, payload.username.as_deref()).await?;
            info!(external_id = %user.external_id, "user created or updated");
            Ok(WebhookOutcome::Upserted(user))
        }
        WebhookEvent::UserDeleted(payload) => {
            let existed = store.delete(&payload.id).await?;
            info!(external_id = %payload.id, existed, "user deleted");
            Ok(WebhookOutcome::Deleted {
                external_id: payload.id,
                existed,
            })
        }
        WebhookEvent::Unknown(event_type) => {
            info!(event_type = %event_type, "unhandled webhook event type");
            Ok(WebhookOutcome::Ignored(event_type))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryUserStore;
    use axum::http::HeaderValue;

    // Secret from the provider's docs, base64 of a random key.
    const SECRET: &str = "whsec_MfKQ9r8GKYqrTwjUPD8ILPZIo2LaLaSw";
    const NOW: i64 = 1_700_000_000;

    fn signed_headers(verifier: &WebhookVerifier, id: &str, ts: i64, body: &[u8]) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("svix-id", HeaderValue::from_str(id).unwrap());
        headers.insert("svix-timestamp", HeaderValue::from_str(&ts.to_string()).unwrap());
        headers.insert(
            "svix-signature",
            HeaderValue::from_str(&verifier.sign(id, ts, body)).unwrap(),
        );
        headers
    }

    #[test]
    fn accepts_valid_signature() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let body = br#"{"type":"user.created","data":{"id":"user_1"}}"#;
        let headers = signed_headers(&verifier, "msg_1", NOW, body);
        assert_eq!(verifier.verify_at(&headers, body, NOW + 10), Ok(()));
    }

    #[test]
    fn secret_prefix_is_optional() {
        let with = WebhookVerifier::new(SECRET).unwrap();
        let without = WebhookVerifier::new(SECRET.trim_start_matches("whsec_")).unwrap();
        assert_eq!(with.sign("m", NOW, b"x"), without.sign("m", NOW, b"x"));
    }

    #[test]
    fn rejects_tampered_body() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let headers = signed_headers(&verifier, "msg_1", NOW, b"original");
        assert_eq!(
            verifier.verify_at(&headers, b"tampered", NOW),
            Err(VerifyError::NoMatchingSignature)
        );
    }

    #[test]
    fn rejects_signature_from_other_secret() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let other = WebhookVerifier::new("whsec_c2VjcmV0LWtleS1udW1iZXItdHdv").unwrap();
        let headers = signed_headers(&other, "msg_1", NOW, b"body");
        assert_eq!(
            verifier.verify_at(&headers, b"body", NOW),
            Err(VerifyError::NoMatchingSignature)
        );
    }

    #[test]
    fn any_listed_signature_may_match() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let mut headers = signed_headers(&verifier, "msg_1", NOW, b"body");
        let good = headers.get("svix-signature").unwrap().to_str().unwrap().to_string();
        let combined = format!("v1,bm90LWl0 v2,ignored {}", good);
        headers.insert("svix-signature", HeaderValue::from_str(&combined).unwrap());
        assert_eq!(verifier.verify_at(&headers, b"body", NOW), Ok(()));
    }

    #[test]
    fn rejects_stale_timestamp() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let headers = signed_headers(&verifier, "msg_1", NOW, b"body");
        assert_eq!(
            verifier.verify_at(&headers, b"body", NOW + TIMESTAMP_TOLERANCE_SECS + 1),
            Err(VerifyError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn extreme_timestamps_are_out_of_tolerance() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        for ts in [i64::MIN, i64::MAX] {
            let headers = signed_headers(&verifier, "msg_1", ts, b"body");
            assert_eq!(
                verifier.verify_at(&headers, b"body", NOW),
                Err(VerifyError::TimestampOutOfTolerance)
            );
        }
        let headers = signed_headers(&verifier, "msg_1", NOW, b"body");
        assert_eq!(
            verifier.verify_at(&headers, b"body", i64::MIN),
            Err(VerifyError::TimestampOutOfTolerance)
        );
    }

    #[test]
    fn rejects_missing_headers() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        assert_eq!(
            verifier.verify_at(&HeaderMap::new(), b"body", NOW),
            Err(VerifyError::MissingHeader("svix-id"))
        );
    }

    #[test]
    fn unbranded_headers_are_accepted() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let mut headers = HeaderMap::new();
        headers.insert("webhook-id", HeaderValue::from_static("msg_2"));
        headers.insert("webhook-timestamp", HeaderValue::from_str(&NOW.to_string()).unwrap());
        headers.insert(
            "webhook-signature",
            HeaderValue::from_str(&verifier.sign("msg_2", NOW, b"body")).unwrap(),
        );
        assert_eq!(verifier.verify_at(&headers, b"body", NOW), Ok(()));
    }

    #[test]
    fn invalid_secret_is_reported() {
        assert!(matches!(
            WebhookVerifier::new("whsec_***"),
            Err(VerifyError::InvalidSecret)
        ));
    }

    #[test]
    fn parses_known_and_unknown_events() {
        let created = WebhookEvent::parse(br#"{"type":"user.created","data":{"id":"u1","username":"neo"}}"#).unwrap();
        assert_eq!(
            created,
            WebhookEvent::UserCreated(UserPayload {
                id: "u1".into(),
                username: Some("neo".into())
            })
        );

        let deleted = WebhookEvent::parse(br#"{"type":"user.deleted","data":{"id":"u1","deleted":true}}"#).unwrap();
        assert_eq!(deleted, WebhookEvent::UserDeleted(DeletedPayload { id: "u1".into() }));

        let other = WebhookEvent::parse(br#"{"type":"session.created","data":{"id":"s1"}}"#).unwrap();
        assert_eq!(other, WebhookEvent::Unknown("session.created".into()));
    }

    #[tokio::test]
    async fn invalid_signature_never_touches_store() {
        let verifier = WebhookVerifier::new(SECRET).unwrap();
        let store = MemoryUserStore::new();
        let body = br#"{"type":"user.created","data":{"id":"user_1"}}"#;

        let mut headers = signed_headers(&verifier, "msg_1", chrono::Utc::now().timestamp(), body);
        headers.insert("svix-signature", HeaderValue::from_static("v1,AAAA"));

        let result = handle_delivery(&verifier, &store, &headers, body).await;
        assert!(matches!(result, Err(ApiError::Verification(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn created_then_deleted() {
        let store = MemoryUserStore::new();

        let outcome = apply_event(
            &store,
            WebhookEvent::UserCreated(UserPayload {
                id: "user_1".into(),
                username: None,
            }),
        )
        .await
        .unwrap();
        assert_eq!(outcome, WebhookOutcome::Upserted(User::new("user_1", None)));

        let outcome = apply_event(&store, WebhookEvent::UserDeleted(DeletedPayload { id: "user_1".into() }))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            WebhookOutcome::Deleted {
                external_id: "user_1".into(),
                existed: true
            }
        );
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn unknown_event_is_a_no_op() {
        let store = MemoryUserStore::new();
        let outcome = apply_event(&store, WebhookEvent::Unknown("email.created".into()))
            .await
            .unwrap();
        assert_eq!(outcome, WebhookOutcome::Ignored("email.created".into()));
        assert!(store.is_empty());
    }
}
