pub mod auth;
pub mod billing;
pub mod bookmarks;
pub mod categories;
pub mod error;
pub mod inbox;
pub mod middleware;
pub mod profile;
pub mod reactions;
pub mod realtime;
pub mod shared;
pub mod state;
pub mod webhook;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{delete, get, patch, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

pub use error::ApiError;
pub use state::{AppState, AppStateInner, BillingConfig};

/// Full HTTP surface. Public routes need no token; everything else goes
/// through [`middleware::require_auth`].
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/recover", post(auth::recover))
        .route("/auth/password", post(auth::reset_password))
        .route("/users/{username}", get(profile::public_profile))
        .route("/shared/{token}", get(shared::get_shared))
        .route("/api/stripe/webhook", post(billing::webhook))
        .route("/realtime", get(realtime::ws_upgrade));

    let protected_routes = Router::new()
        .route(
            "/profile",
            get(profile::get_profile)
                .post(profile::create_profile)
                .patch(profile::update_profile)
                .delete(profile::delete_account),
        )
        .route("/rpc/generate_username", post(profile::generate_username))
        .route(
            "/categories",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/categories/{id}",
            patch(categories::update_category).delete(categories::delete_category),
        )
        .route(
            "/categories/{id}/bookmarks",
            delete(categories::delete_category_bookmarks),
        )
        .route(
            "/bookmarks",
            get(bookmarks::list_bookmarks).post(bookmarks::create_bookmark),
        )
        .route(
            "/bookmarks/{id}",
            patch(bookmarks::update_bookmark).delete(bookmarks::delete_bookmark),
        )
        .route("/inbox", get(inbox::list_inbox).post(inbox::share_category))
        .route("/inbox/unread_count", get(inbox::unread_count))
        .route("/inbox/read_all", post(inbox::mark_all_read))
        .route("/inbox/{id}/read", post(inbox::mark_read))
        .route("/inbox/{id}", delete(inbox::delete_message))
        .route(
            "/reactions/{kind}/{target_id}",
            get(reactions::list_reactions).post(reactions::toggle_reaction),
        )
        .route(
            "/api/stripe/create-checkout-session",
            post(billing::create_checkout_session),
        )
        .route(
            "/api/stripe/create-portal-session",
            post(billing::create_portal_session),
        )
        .route("/api/subscription/verify", get(billing::verify_subscription))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
