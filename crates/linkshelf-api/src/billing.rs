use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::HeaderMap,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{info, warn};

use linkshelf_types::api::{
    CheckoutRequest, CheckoutResponse, Claims, PlanType, PortalResponse, SubscriptionSnapshot,
    WebhookAck,
};
use linkshelf_types::models::UserProfile;
use linkshelf_types::policy::Entitlement;

use crate::error::ApiError;
use crate::middleware::caller_profile;
use crate::state::{AppState, run_db};
use crate::webhook;

const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Deserialize)]
struct SessionObject {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProviderError {
    error: ProviderErrorBody,
}

#[derive(Debug, Deserialize)]
struct ProviderErrorBody {
    message: String,
}

pub async fn create_checkout_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<CheckoutRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let billing = &state.billing;

    let price = match req.plan_type {
        PlanType::Monthly => billing.price_monthly.as_deref(),
        PlanType::Yearly => billing.price_yearly.as_deref(),
    }
    .ok_or_else(|| ApiError::Payment("Price is not configured".into()))?;

    let user_id = profile.id.to_string();
    let success_url = format!(
        "{}/dashboard?checkout=success&session_id={{CHECKOUT_SESSION_ID}}",
        billing.public_url
    );
    let cancel_url = format!("{}/pricing?checkout=canceled", billing.public_url);
    let mut form: Vec<(&str, &str)> = vec![
        ("mode", "subscription"),
        ("line_items[0][price]", price),
        ("line_items[0][quantity]", "1"),
        ("success_url", success_url.as_str()),
        ("cancel_url", cancel_url.as_str()),
        ("client_reference_id", user_id.as_str()),
        ("metadata[userId]", user_id.as_str()),
        ("metadata[planType]", req.plan_type.as_str()),
        ("subscription_data[metadata][userId]", user_id.as_str()),
    ];
    match profile.stripe_customer_id.as_deref() {
        Some(customer) => form.push(("customer", customer)),
        None => form.push(("customer_email", profile.email.as_str())),
    }

    let session = stripe_post(&state, "/v1/checkout/sessions", &form).await?;
    let url = session
        .url
        .ok_or_else(|| ApiError::Payment("Checkout session has no URL".into()))?;

    info!("Checkout session {} for {}", session.id, profile.id);
    Ok(Json(CheckoutResponse {
        session_id: session.id,
        url,
    }))
}

pub async fn create_portal_session(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    let customer = profile
        .stripe_customer_id
        .as_deref()
        .ok_or(ApiError::NotFound("Billing customer"))?;

    let return_url = format!("{}/dashboard", state.billing.public_url);
    let form = [("customer", customer), ("return_url", return_url.as_str())];
    let session = stripe_post(&state, "/v1/billing_portal/sessions", &form).await?;
    let url = session
        .url
        .ok_or_else(|| ApiError::Payment("Portal session has no URL".into()))?;

    Ok(Json(PortalResponse { url }))
}

/// Signature is checked before anything is parsed. Failures after that
/// point answer 500 and are not retried here.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<impl IntoResponse, ApiError> {
    let secret = state
        .billing
        .webhook_secret
        .clone()
        .ok_or_else(|| ApiError::Payment("Webhook secret is not configured".into()))?;
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::BadSignature)?;

    webhook::verify_signature(&secret, signature, &body, chrono::Utc::now().timestamp())
        .map_err(|e| {
            warn!("Rejected webhook: {}", e);
            ApiError::BadSignature
        })?;

    let event: serde_json::Value = serde_json::from_slice(&body)
        .map_err(|e| ApiError::Payment(format!("Unreadable webhook payload: {}", e)))?;
    let action = webhook::parse_event(&event).map_err(|e| ApiError::Payment(e.to_string()))?;

    info!("Webhook {:?}", action);
    run_db(&state, move |db| webhook::apply(db, &action)).await?;

    Ok(Json(WebhookAck { received: true }))
}

pub async fn verify_subscription(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let profile = caller_profile(&state, &claims).await?;
    Ok(Json(snapshot(&profile)))
}

pub fn snapshot(profile: &UserProfile) -> SubscriptionSnapshot {
    SubscriptionSnapshot {
        is_premium: Entitlement::from(profile).is_premium_active(),
        tier: profile.subscription_tier,
        status: profile.subscription_status,
        subscription_end: profile.subscription_end,
    }
}

async fn stripe_post(
    state: &AppState,
    path: &str,
    form: &[(&str, &str)],
) -> Result<SessionObject, ApiError> {
    let key = state
        .billing
        .secret_key
        .as_deref()
        .ok_or_else(|| ApiError::Payment("Payment provider is not configured".into()))?;

    let resp = state
        .http
        .post(format!("{}{}", state.billing.api_base, path))
        .bearer_auth(key)
        .form(form)
        .send()
        .await
        .map_err(|e| ApiError::Payment(e.to_string()))?;

    if !resp.status().is_success() {
        let status = resp.status();
        let message = match resp.json::<ProviderError>().await {
            Ok(err) => err.error.message,
            Err(_) => format!("Payment provider answered {}", status),
        };
        return Err(ApiError::Payment(message));
    }

    resp.json::<SessionObject>()
        .await
        .map_err(|e| ApiError::Payment(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use linkshelf_types::models::{SubscriptionStatus, Tier};
    use uuid::Uuid;

    fn profile(tier: Tier, status: SubscriptionStatus) -> UserProfile {
        UserProfile {
            id: Uuid::new_v4(),
            auth_id: Uuid::new_v4(),
            email: "a@example.com".into(),
            username: None,
            display_name: None,
            bio: None,
            avatar_url: None,
            social_links: vec![],
            subscription_tier: tier,
            subscription_status: status,
            stripe_customer_id: None,
            stripe_subscription_id: None,
            subscription_end: None,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn past_due_premium_is_not_premium() {
        let s = snapshot(&profile(Tier::Premium, SubscriptionStatus::PastDue));
        assert!(!s.is_premium);
        assert_eq!(s.tier, Tier::Premium);
    }

    #[test]
    fn active_premium_is_premium() {
        assert!(snapshot(&profile(Tier::Premium, SubscriptionStatus::Active)).is_premium);
        assert!(!snapshot(&profile(Tier::Free, SubscriptionStatus::Active)).is_premium);
    }
}
