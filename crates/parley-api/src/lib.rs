pub mod auth;
pub mod error;
pub mod messages;
pub mod pages;
pub mod session;
pub mod state;

use axum::{
    Router, middleware,
    response::Redirect,
    routing::{get, post},
};
use tower_sessions::Session;

use crate::error::ChatError;
use crate::state::AppState;

/// All routes behind the session layer. Posting and deleting require a
/// logged-in session before their bodies or paths are parsed.
pub fn router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route("/send", post(messages::send_message))
        .route("/delete/{message_id}", post(messages::delete_message))
        .route_layer(middleware::from_fn(session::require_identity));

    let public_routes = Router::new()
        .route("/", get(messages::index))
        .route("/get_messages", get(messages::get_messages))
        .route("/signup", get(auth::signup_page).post(auth::signup))
        .route("/login", get(auth::login_page).post(auth::login))
        .route("/logout", get(auth::logout));

    Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(unknown_route)
        .layer(session::session_layer())
        .with_state(state)
}

async fn unknown_route(session: Session) -> Result<Redirect, ChatError> {
    if session::current_identity(&session).await?.is_some() {
        Ok(Redirect::to("/"))
    } else {
        Ok(Redirect::to("/signup"))
    }
}
