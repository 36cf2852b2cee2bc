use std::sync::{Arc, Mutex};

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString,
};
use axum::{
    Form,
    extract::State,
    response::{Html, IntoResponse, Redirect, Response},
};
use parley_db::Storage;
use parley_types::api::{LoginForm, SignupForm};
use parley_types::models::{SessionIdentity, User};
use rand_core::OsRng;
use tower_sessions::Session;
use tracing::{info, warn};

use crate::error::{ChatError, ValidationError};
use crate::session;
use crate::state::{AppState, run_blocking};

/// Signup, credential checks and session identity.
pub struct AuthService {
    storage: Arc<dyn Storage>,
    // Serializes load-modify-save on the user collection.
    write_lock: Mutex<()>,
}

impl AuthService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    /// Register a new account. Email and username must both be unused.
    pub fn sign_up(&self, email: &str, username: &str, password: &str) -> Result<User, ChatError> {
        let email = required("email", email.trim())?;
        let username = required("username", username.trim())?;
        let password = required("password", password)?;
        let password_hash = hash_password(password)?;

        let _guard = self
            .write_lock
            .lock()
            .map_err(|_| ChatError::Internal("user write lock poisoned".into()))?;

        let mut users = self.storage.load_users()?;
        if users.iter().any(|u| u.email == email) {
            return Err(ChatError::Conflict("Email is already registered.".into()));
        }
        if users.iter().any(|u| u.username == username) {
            return Err(ChatError::Conflict("Username is already taken.".into()));
        }

        let user = User {
            email: email.to_string(),
            username: username.to_string(),
            password_hash,
        };
        users.push(user.clone());
        self.storage.save_users(&users)?;

        info!("User '{}' signed up", user.username);
        Ok(user)
    }

    /// Check credentials; `identifier` may be the email or the username.
    pub fn log_in(&self, identifier: &str, password: &str) -> Result<SessionIdentity, ChatError> {
        let identifier = required("username_or_email", identifier.trim())?;
        let password = required("password", password)?;

        let user = self
            .storage
            .load_users()?
            .into_iter()
            .find(|u| u.is_identified_by(identifier))
            .ok_or(ChatError::InvalidCredentials)?;

        verify_password(password, &user.password_hash)?;

        Ok(SessionIdentity {
            username: user.username,
        })
    }

    /// Bind a verified identity to the session under a fresh session id.
    pub async fn start_session(
        &self,
        session: &Session,
        identity: &SessionIdentity,
    ) -> Result<(), ChatError> {
        session::establish(session, identity).await?;
        info!("User '{}' logged in", identity.username);
        Ok(())
    }

    pub async fn log_out(&self, session: &Session) -> Result<(), ChatError> {
        if let Some(username) = session::clear_identity(session).await? {
            info!("User '{}' logged out", username);
        }
        Ok(())
    }
}

fn required<'a>(field: &'static str, value: &'a str) -> Result<&'a str, ValidationError> {
    if value.is_empty() {
        Err(ValidationError::MissingField(field))
    } else {
        Ok(value)
    }
}

fn hash_password(password: &str) -> Result<String, ChatError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ChatError::Internal(format!("password hashing failed: {e}")))
}

fn verify_password(password: &str, stored: &str) -> Result<(), ChatError> {
    let parsed = PasswordHash::new(stored).map_err(|e| {
        warn!("Unreadable password hash on record: {}", e);
        ChatError::InvalidCredentials
    })?;

    Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .map_err(|_| ChatError::InvalidCredentials)
}

// -- Handlers --

pub async fn signup_page(State(state): State<AppState>) -> Result<Html<String>, ChatError> {
    state.pages.signup()
}

pub async fn signup(
    State(state): State<AppState>,
    Form(form): Form<SignupForm>,
) -> Result<Redirect, ChatError> {
    let svc = state.clone();
    run_blocking(move || svc.auth.sign_up(&form.email, &form.username, &form.password)).await?;

    Ok(Redirect::to("/login"))
}

pub async fn login_page(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, ChatError> {
    if session::current_identity(&session).await?.is_some() {
        return Ok(Redirect::to("/").into_response());
    }
    Ok(state.pages.login()?.into_response())
}

pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Form(form): Form<LoginForm>,
) -> Result<Redirect, ChatError> {
    let svc = state.clone();
    let identifier = form.username_or_email.clone();
    let identity = run_blocking(move || svc.auth.log_in(&form.username_or_email, &form.password))
        .await
        .inspect_err(|e| {
            if matches!(e, ChatError::InvalidCredentials) {
                warn!("Failed login for '{}'", identifier);
            }
        })?;

    state.auth.start_session(&session, &identity).await?;
    Ok(Redirect::to("/"))
}

pub async fn logout(
    State(state): State<AppState>,
    session: Session,
) -> Result<Redirect, ChatError> {
    state.auth.log_out(&session).await?;
    Ok(Redirect::to("/"))
}
