use std::sync::{Arc, Mutex};

use axum::{
    Extension, Form, Json,
    extract::{Path, State, rejection::FormRejection},
    response::{IntoResponse, Redirect, Response},
};
use chrono::{Local, SubsecRound};
use parley_db::Storage;
use parley_types::api::{MessagesResponse, SendMessageForm};
use parley_types::models::{Message, SessionIdentity};
use tower_sessions::Session;
use tracing::{debug, info};

use crate::error::{ChatError, ValidationError};
use crate::session;
use crate::state::{AppState, run_blocking};

/// Posting, listing and soft-deleting messages in the shared room.
///
/// Nothing is cached: every call reloads the collection from storage.
pub struct MessageService {
    storage: Arc<dyn Storage>,
    // Serializes id assignment and the snapshot overwrite that follows it.
    write_lock: Mutex<()>,
}

impl MessageService {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self {
            storage,
            write_lock: Mutex::new(()),
        }
    }

    pub fn list_messages(&self) -> Result<Vec<Message>, ChatError> {
        Ok(self.storage.load_messages()?)
    }

    /// Escape and append a message; returns the updated collection.
    pub fn send_message(
        &self,
        identity: &SessionIdentity,
        raw: &str,
    ) -> Result<Vec<Message>, ChatError> {
        let content = escape_html(raw);
        if content.is_empty() {
            return Err(ValidationError::EmptyContent.into());
        }

        let _guard = self.lock()?;
        let mut messages = self.storage.load_messages()?;
        let message = Message {
            id: next_message_id(&messages),
            sender: identity.username.clone(),
            content,
            created_at: Local::now().naive_local().trunc_subsecs(0),
            deleted: false,
        };
        debug!("Message {} from '{}'", message.id, message.sender);
        messages.push(message);
        self.storage.save_messages(&messages)?;

        Ok(messages)
    }

    /// Soft-delete a message owned by `identity`.
    ///
    /// Missing and foreign messages both yield `NotFoundOrForbidden`. Deleting
    /// an already-deleted message of one's own succeeds without rewriting.
    pub fn delete_message(
        &self,
        identity: &SessionIdentity,
        id: u64,
    ) -> Result<Vec<Message>, ChatError> {
        let _guard = self.lock()?;
        let mut messages = self.storage.load_messages()?;

        let was_deleted = {
            let target = messages
                .iter_mut()
                .find(|m| m.id == id && m.is_owned_by(&identity.username))
                .ok_or(ChatError::NotFoundOrForbidden)?;
            std::mem::replace(&mut target.deleted, true)
        };

        if !was_deleted {
            self.storage.save_messages(&messages)?;
            info!("Message {} deleted by '{}'", id, identity.username);
        }

        Ok(messages)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, ()>, ChatError> {
        self.write_lock
            .lock()
            .map_err(|_| ChatError::Internal("message write lock poisoned".into()))
    }
}

/// `count + 1`, falling back to one past the highest id if that is already
/// taken (collections edited outside this process).
fn next_message_id(messages: &[Message]) -> u64 {
    let candidate = messages.len() as u64 + 1;
    if messages.iter().any(|m| m.id == candidate) {
        messages.iter().map(|m| m.id).max().unwrap_or(0) + 1
    } else {
        candidate
    }
}

/// Escape the characters that carry meaning in HTML markup.
pub fn escape_html(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&#34;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

// -- Handlers --

pub async fn index(
    State(state): State<AppState>,
    session: Session,
) -> Result<Response, ChatError> {
    let Some(identity) = session::current_identity(&session).await? else {
        return Ok(Redirect::to("/login").into_response());
    };

    let svc = state.clone();
    let messages = run_blocking(move || svc.messages.list_messages()).await?;
    Ok(state.pages.index(&identity.username, &messages)?.into_response())
}

pub async fn get_messages(
    State(state): State<AppState>,
) -> Result<Json<MessagesResponse>, ChatError> {
    let svc = state.clone();
    let messages = run_blocking(move || svc.messages.list_messages()).await?;
    Ok(Json(MessagesResponse { messages }))
}

/// A missing or unreadable form body counts as an empty message.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    form: Result<Form<SendMessageForm>, FormRejection>,
) -> Result<Json<MessagesResponse>, ChatError> {
    let raw = form.map(|Form(f)| f.message).unwrap_or_default();

    let svc = state.clone();
    let messages = run_blocking(move || svc.messages.send_message(&identity, &raw)).await?;
    Ok(Json(MessagesResponse { messages }))
}

/// Ids that are not numbers cannot name a message, so they get the same
/// not-found answer as any other unknown id.
pub async fn delete_message(
    State(state): State<AppState>,
    Extension(identity): Extension<SessionIdentity>,
    session: Session,
    Path(raw_id): Path<String>,
) -> Result<Json<MessagesResponse>, ChatError> {
    let message_id: u64 = raw_id.parse().map_err(|_| ChatError::NotFoundOrForbidden)?;

    let svc = state.clone();
    let messages =
        run_blocking(move || svc.messages.delete_message(&identity, message_id)).await?;

    session::record_deletion(&session, message_id).await?;
    Ok(Json(MessagesResponse { messages }))
}
