use std::sync::Arc;

use parley_db::Storage;
use tracing::error;

use crate::auth::AuthService;
use crate::error::ChatError;
use crate::messages::MessageService;
use crate::pages::Pages;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub auth: AuthService,
    pub messages: MessageService,
    pub pages: Pages,
}

impl AppStateInner {
    /// Wire both services to the same backend.
    pub fn new(storage: Arc<dyn Storage>) -> Result<AppState, minijinja::Error> {
        Ok(Arc::new(Self {
            auth: AuthService::new(storage.clone()),
            messages: MessageService::new(storage),
            pages: Pages::new()?,
        }))
    }
}

/// Run a synchronous service call (storage I/O, password hashing) off the
/// async runtime.
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ChatError>
where
    F: FnOnce() -> Result<T, ChatError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ChatError::Internal("background task failed".into())
    })?
}
