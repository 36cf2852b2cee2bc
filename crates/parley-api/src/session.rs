use axum::{extract::Request, middleware::Next, response::Response};
use parley_types::models::SessionIdentity;
use time::Duration;
use tower_sessions::cookie::SameSite;
use tower_sessions::{Expiry, MemoryStore, Session, SessionManagerLayer};

use crate::error::ChatError;

pub const SESSION_COOKIE: &str = "parley_session";

/// Sessions idle for longer than this are dropped.
pub const SESSION_IDLE_TIMEOUT: Duration = Duration::hours(24);

const USER_KEY: &str = "user";
const DELETED_MESSAGES_KEY: &str = "deleted_messages";

/// Cookie-keyed server-side sessions held in memory.
pub fn session_layer() -> SessionManagerLayer<MemoryStore> {
    SessionManagerLayer::new(MemoryStore::default())
        .with_name(SESSION_COOKIE)
        .with_http_only(true)
        .with_same_site(SameSite::Lax)
        .with_secure(false)
        .with_path("/")
        .with_expiry(Expiry::OnInactivity(SESSION_IDLE_TIMEOUT))
}

/// The identity bound to this session, if anyone is logged in.
pub async fn current_identity(session: &Session) -> Result<Option<SessionIdentity>, ChatError> {
    let username: Option<String> = session.get(USER_KEY).await?;
    Ok(username.map(|username| SessionIdentity { username }))
}

/// Bind a verified identity to the session under a fresh id.
pub async fn establish(session: &Session, identity: &SessionIdentity) -> Result<(), ChatError> {
    session.cycle_id().await?;
    session.insert(USER_KEY, &identity.username).await?;
    Ok(())
}

/// Clear the identity; returns the username that was logged in.
pub async fn clear_identity(session: &Session) -> Result<Option<String>, ChatError> {
    Ok(session.remove(USER_KEY).await?)
}

/// Remember a message deleted through this session. Bookkeeping only.
pub async fn record_deletion(session: &Session, message_id: u64) -> Result<(), ChatError> {
    let mut deleted: Vec<u64> = session.get(DELETED_MESSAGES_KEY).await?.unwrap_or_default();
    deleted.push(message_id);
    session.insert(DELETED_MESSAGES_KEY, deleted).await?;
    Ok(())
}

pub async fn deleted_messages(session: &Session) -> Result<Vec<u64>, ChatError> {
    Ok(session.get(DELETED_MESSAGES_KEY).await?.unwrap_or_default())
}

/// Reject anonymous requests before any body or path parsing, and hand the
/// identity to the handler as an extension.
pub async fn require_identity(
    session: Session,
    mut req: Request,
    next: Next,
) -> Result<Response, ChatError> {
    let identity = current_identity(&session)
        .await?
        .ok_or(ChatError::Unauthenticated)?;

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn fresh_session() -> Session {
        Session::new(None, Arc::new(MemoryStore::default()), None)
    }

    fn alice() -> SessionIdentity {
        SessionIdentity {
            username: "alice".into(),
        }
    }

    #[tokio::test]
    async fn establish_and_clear_identity() {
        let session = fresh_session();
        assert_eq!(current_identity(&session).await.unwrap(), None);

        establish(&session, &alice()).await.unwrap();
        assert_eq!(current_identity(&session).await.unwrap(), Some(alice()));

        assert_eq!(clear_identity(&session).await.unwrap().as_deref(), Some("alice"));
        assert_eq!(clear_identity(&session).await.unwrap(), None);
        assert_eq!(current_identity(&session).await.unwrap(), None);
    }

    #[tokio::test]
    async fn deletions_accumulate_across_logins() {
        let session = fresh_session();
        establish(&session, &alice()).await.unwrap();
        record_deletion(&session, 3).await.unwrap();
        record_deletion(&session, 5).await.unwrap();

        establish(&session, &alice()).await.unwrap();
        assert_eq!(deleted_messages(&session).await.unwrap(), vec![3, 5]);
    }
}
