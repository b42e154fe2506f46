//! Payment webhook plumbing: signature checks and translation of provider
//! events into profile updates. Nothing here touches the network.

use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;
use tracing::{debug, warn};
use uuid::Uuid;

use linkshelf_db::{Database, SubscriptionPatch};
use linkshelf_types::models::{SubscriptionStatus, Tier};

type HmacSha256 = Hmac<Sha256>;

/// Maximum age of a signed timestamp, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum SignatureError {
    #[error("malformed signature header")]
    Malformed,
    #[error("timestamp outside tolerance")]
    Expired,
    #[error("signature mismatch")]
    Mismatch,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum EventError {
    #[error("event payload is missing '{0}'")]
    Missing(&'static str),
    #[error("invalid value for '{0}'")]
    Invalid(&'static str),
}

/// Checks a `t=...,v1=...` header against `"{t}.{body}"`. Any of several
/// `v1` entries may match.
pub fn verify_signature(
    secret: &str,
    header: &str,
    body: &[u8],
    now: i64,
) -> Result<(), SignatureError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", v)) => timestamp = v.parse::<i64>().ok(),
            Some(("v1", v)) => signatures.push(v),
            _ => {}
        }
    }
    let timestamp = timestamp.ok_or(SignatureError::Malformed)?;
    if signatures.is_empty() {
        return Err(SignatureError::Malformed);
    }
    if (now - timestamp).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(SignatureError::Expired);
    }

    for sig in signatures {
        let Ok(expected) = hex::decode(sig) else {
            continue;
        };
        let mut mac =
            HmacSha256::new_from_slice(secret.as_bytes()).map_err(|_| SignatureError::Malformed)?;
        mac.update(timestamp.to_string().as_bytes());
        mac.update(b".");
        mac.update(body);
        if mac.verify_slice(&expected).is_ok() {
            return Ok(());
        }
    }
    Err(SignatureError::Mismatch)
}

/// What a verified event asks us to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WebhookAction {
    CheckoutCompleted {
        user_id: Uuid,
        plan_type: String,
        customer_id: Option<String>,
        subscription_id: Option<String>,
    },
    SubscriptionUpdated {
        customer_id: String,
        status: SubscriptionStatus,
        period_end: Option<DateTime<Utc>>,
    },
    SubscriptionDeleted {
        customer_id: String,
    },
    PaymentSucceeded {
        customer_id: String,
    },
    PaymentFailed {
        customer_id: String,
    },
    Ignored(String),
}

pub fn map_subscription_status(raw: &str) -> SubscriptionStatus {
    match raw {
        "active" | "trialing" => SubscriptionStatus::Active,
        "past_due" | "unpaid" => SubscriptionStatus::PastDue,
        "canceled" | "incomplete_expired" => SubscriptionStatus::Canceled,
        _ => SubscriptionStatus::Inactive,
    }
}

pub fn parse_event(event: &Value) -> Result<WebhookAction, EventError> {
    let kind = event
        .get("type")
        .and_then(Value::as_str)
        .ok_or(EventError::Missing("type"))?;
    let object = event
        .pointer("/data/object")
        .ok_or(EventError::Missing("data.object"))?;

    let action = match kind {
        "checkout.session.completed" => {
            let user_id = object
                .pointer("/metadata/userId")
                .and_then(Value::as_str)
                .ok_or(EventError::Missing("metadata.userId"))?;
            let user_id = Uuid::parse_str(user_id).map_err(|_| EventError::Invalid("metadata.userId"))?;
            let plan_type = object
                .pointer("/metadata/planType")
                .and_then(Value::as_str)
                .unwrap_or("monthly")
                .to_string();
            WebhookAction::CheckoutCompleted {
                user_id,
                plan_type,
                customer_id: str_field(object, "customer"),
                subscription_id: str_field(object, "subscription"),
            }
        }
        "customer.subscription.updated" => WebhookAction::SubscriptionUpdated {
            customer_id: customer(object)?,
            status: map_subscription_status(
                object.get("status").and_then(Value::as_str).unwrap_or_default(),
            ),
            period_end: object
                .get("current_period_end")
                .and_then(Value::as_i64)
                .and_then(|t| DateTime::from_timestamp(t, 0)),
        },
        "customer.subscription.deleted" => WebhookAction::SubscriptionDeleted {
            customer_id: customer(object)?,
        },
        "invoice.payment_succeeded" => WebhookAction::PaymentSucceeded {
            customer_id: customer(object)?,
        },
        "invoice.payment_failed" => WebhookAction::PaymentFailed {
            customer_id: customer(object)?,
        },
        other => WebhookAction::Ignored(other.to_string()),
    };
    Ok(action)
}

/// Writes the action to the store. Unknown customers are logged and skipped.
pub fn apply(db: &Database, action: &WebhookAction) -> anyhow::Result<()> {
    let (profile_id, patch) = match action {
        WebhookAction::CheckoutCompleted {
            user_id,
            plan_type,
            customer_id,
            subscription_id,
        } => {
            let patch = SubscriptionPatch {
                tier: Some(Tier::Premium),
                status: Some(SubscriptionStatus::Active),
                stripe_customer_id: customer_id.clone(),
                stripe_subscription_id: subscription_id.clone().map(Some),
                subscription_end: None,
            };
            if db.update_subscription(user_id, &patch)?.is_none() {
                warn!("Checkout completed for unknown profile {}", user_id);
                return Ok(());
            }
            db.insert_subscription_history(user_id, plan_type, subscription_id.as_deref())?;
            return Ok(());
        }
        WebhookAction::SubscriptionUpdated {
            customer_id,
            status,
            period_end,
        } => (
            customer_id,
            SubscriptionPatch {
                status: Some(*status),
                subscription_end: Some(*period_end),
                ..Default::default()
            },
        ),
        WebhookAction::SubscriptionDeleted { customer_id } => (
            customer_id,
            SubscriptionPatch {
                tier: Some(Tier::Free),
                status: Some(SubscriptionStatus::Canceled),
                stripe_subscription_id: Some(None),
                ..Default::default()
            },
        ),
        WebhookAction::PaymentSucceeded { customer_id } => (
            customer_id,
            SubscriptionPatch {
                tier: Some(Tier::Premium),
                status: Some(SubscriptionStatus::Active),
                ..Default::default()
            },
        ),
        WebhookAction::PaymentFailed { customer_id } => (
            customer_id,
            SubscriptionPatch {
                status: Some(SubscriptionStatus::PastDue),
                ..Default::default()
            },
        ),
        WebhookAction::Ignored(kind) => {
            debug!("Ignoring webhook event {}", kind);
            return Ok(());
        }
    };

    let Some(profile) = db.get_profile_by_customer_id(profile_id)? else {
        warn!("Webhook for unknown customer {}", profile_id);
        return Ok(());
    };
    db.update_subscription(&profile.id, &patch)?;
    Ok(())
}

fn str_field(object: &Value, key: &str) -> Option<String> {
    object.get(key).and_then(Value::as_str).map(str::to_string)
}

fn customer(object: &Value) -> Result<String, EventError> {
    str_field(object, "customer").ok_or(EventError::Missing("customer"))
}

#[cfg(test)]
pub(crate) fn sign(secret: &str, timestamp: i64, body: &[u8]) -> String {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(format!("{}.", timestamp).as_bytes());
    mac.update(body);
    format!("t={},v1={}", timestamp, hex::encode(mac.finalize().into_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const SECRET: &str = "whsec_test";

    #[test]
    fn accepts_valid_signature() {
        let body = br#"{"type":"invoice.payment_failed"}"#;
        let header = sign(SECRET, 1_700_000_000, body);
        assert_eq!(verify_signature(SECRET, &header, body, 1_700_000_010), Ok(()));
    }

    #[test]
    fn rejects_tampered_body() {
        let header = sign(SECRET, 1_700_000_000, b"original");
        assert_eq!(
            verify_signature(SECRET, &header, b"tampered", 1_700_000_000),
            Err(SignatureError::Mismatch)
        );
    }

    #[test]
    fn rejects_stale_timestamp() {
        let header = sign(SECRET, 1_700_000_000, b"{}");
        assert_eq!(
            verify_signature(SECRET, &header, b"{}", 1_700_000_000 + SIGNATURE_TOLERANCE_SECS + 1),
            Err(SignatureError::Expired)
        );
    }

    #[test]
    fn rejects_malformed_header() {
        assert_eq!(
            verify_signature(SECRET, "garbage", b"{}", 0),
            Err(SignatureError::Malformed)
        );
        assert_eq!(
            verify_signature(SECRET, "t=5", b"{}", 5),
            Err(SignatureError::Malformed)
        );
    }

    #[test]
    fn any_matching_v1_is_enough() {
        let good = sign(SECRET, 100, b"x");
        let v1 = good.split("v1=").nth(1).unwrap();
        let header = format!("t=100,v1=deadbeef,v1={}", v1);
        assert!(verify_signature(SECRET, &header, b"x", 100).is_ok());
    }

    #[test]
    fn status_mapping() {
        assert_eq!(map_subscription_status("trialing"), SubscriptionStatus::Active);
        assert_eq!(map_subscription_status("unpaid"), SubscriptionStatus::PastDue);
        assert_eq!(map_subscription_status("incomplete_expired"), SubscriptionStatus::Canceled);
        assert_eq!(map_subscription_status("incomplete"), SubscriptionStatus::Inactive);
    }

    #[test]
    fn parses_checkout_completed() {
        let user_id = Uuid::new_v4();
        let event = json!({
            "type": "checkout.session.completed",
            "data": { "object": {
                "customer": "cus_1",
                "subscription": "sub_1",
                "metadata": { "userId": user_id.to_string(), "planType": "yearly" }
            }}
        });
        assert_eq!(
            parse_event(&event).unwrap(),
            WebhookAction::CheckoutCompleted {
                user_id,
                plan_type: "yearly".into(),
                customer_id: Some("cus_1".into()),
                subscription_id: Some("sub_1".into()),
            }
        );
    }

    #[test]
    fn checkout_without_user_is_an_error() {
        let event = json!({
            "type": "checkout.session.completed",
            "data": { "object": { "metadata": {} } }
        });
        assert_eq!(parse_event(&event), Err(EventError::Missing("metadata.userId")));
    }

    #[test]
    fn parses_subscription_updated_period_end() {
        let event = json!({
            "type": "customer.subscription.updated",
            "data": { "object": {
                "customer": "cus_1",
                "status": "past_due",
                "current_period_end": 1_700_000_000
            }}
        });
        match parse_event(&event).unwrap() {
            WebhookAction::SubscriptionUpdated { status, period_end, .. } => {
                assert_eq!(status, SubscriptionStatus::PastDue);
                assert_eq!(period_end.unwrap().timestamp(), 1_700_000_000);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_events_are_ignored() {
        let event = json!({ "type": "charge.refunded", "data": { "object": {} } });
        assert_eq!(
            parse_event(&event).unwrap(),
            WebhookAction::Ignored("charge.refunded".into())
        );
    }

    #[test]
    fn apply_lifecycle() {
        let db = Database::open_in_memory().unwrap();
        let auth_id = Uuid::new_v4();
        db.create_user(&auth_id, "a@example.com", "hash").unwrap();
        let profile = db
            .insert_profile(&Uuid::new_v4(), &auth_id, "a@example.com", None)
            .unwrap();

        apply(
            &db,
            &WebhookAction::CheckoutCompleted {
                user_id: profile.id,
                plan_type: "monthly".into(),
                customer_id: Some("cus_9".into()),
                subscription_id: Some("sub_9".into()),
            },
        )
        .unwrap();
        let p = db.get_profile_by_id(&profile.id).unwrap().unwrap();
        assert_eq!(p.subscription_tier, Tier::Premium);
        assert_eq!(p.subscription_status, SubscriptionStatus::Active);
        assert_eq!(p.stripe_customer_id.as_deref(), Some("cus_9"));
        let history = db.list_subscription_history(&profile.id).unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].plan_type, "monthly");

        apply(&db, &WebhookAction::PaymentFailed { customer_id: "cus_9".into() }).unwrap();
        let p = db.get_profile_by_id(&profile.id).unwrap().unwrap();
        assert_eq!(p.subscription_status, SubscriptionStatus::PastDue);

        apply(&db, &WebhookAction::SubscriptionDeleted { customer_id: "cus_9".into() }).unwrap();
        let p = db.get_profile_by_id(&profile.id).unwrap().unwrap();
        assert_eq!(p.subscription_tier, Tier::Free);
        assert_eq!(p.subscription_status, SubscriptionStatus::Canceled);
        assert!(p.stripe_subscription_id.is_none());

        // Unknown customers are not an error.
        apply(&db, &WebhookAction::PaymentSucceeded { customer_id: "cus_x".into() }).unwrap();
    }
}
