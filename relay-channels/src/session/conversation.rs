//! Single owner of the session state.
//!
//! Every operation that reads and then writes the session, including a whole
//! assistant invocation, runs while holding one async mutex. Concurrent
//! events therefore apply in some serial order and a write can never be lost
//! to a stale read. Each committed change is persisted on the blocking pool
//! before it becomes visible, and published on a watch channel so status
//! queries never wait behind a running invocation.

use super::state::{SessionRef, SessionState};
use super::store::SessionStore;
use crate::invoker::{AssistantInvoker, InvocationError, InvocationRequest};
use crate::scope::{ScopeError, ScopeResolver};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Mutex, MutexGuard};

/// The conversation with the assistant.
pub struct Conversation {
    store: SessionStore,
    invoker: Arc<dyn AssistantInvoker>,
    state: Mutex<SessionState>,
    snapshot: watch::Sender<SessionState>,
}

impl Conversation {
    /// Load the persisted state and take ownership of it.
    pub fn open(store: SessionStore, invoker: Arc<dyn AssistantInvoker>) -> Self {
        let state = store.load();
        tracing::info!(
            file = %store.path().display(),
            scope = %state.scope.display(),
            session = %state.session,
            "Session state loaded"
        );
        let (snapshot, _) = watch::channel(state.clone());
        Self {
            store,
            invoker,
            state: Mutex::new(state),
            snapshot,
        }
    }

    /// Latest committed state. Does not wait for in-flight operations.
    pub fn snapshot(&self) -> SessionState {
        self.snapshot.borrow().clone()
    }

    /// Persist `next`, then make it the current state.
    ///
    /// The save runs on the blocking pool; the guard stays held until it lands.
    async fn commit(&self, guard: &mut MutexGuard<'_, SessionState>, next: SessionState) -> relay_common::Result<()> {
        let store = self.store.clone();
        let record = next.clone();
        tokio::task::spawn_blocking(move || store.save(&record))
            .await
            .map_err(|e| relay_common::Error::Io(std::io::Error::other(e)))??;
        **guard = next.clone();
        self.snapshot.send_replace(next);
        Ok(())
    }

    /// Send a prompt to the assistant.
    ///
    /// A stale session is recovered once by retrying as a fresh
    /// conversation. After a successful fresh call the state records
    /// [`SessionRef::ContinueMostRecent`] so the next prompt continues it.
    pub async fn ask(&self, prompt: &str, attachment: Option<&Path>) -> Result<String, InvocationError> {
        let mut guard = self.state.lock().await;

        let request = InvocationRequest {
            prompt: prompt.to_string(),
            attachment: attachment.map(Path::to_path_buf),
            scope: guard.scope.clone(),
            session: guard.session.clone(),
        };

        let (outcome, fresh) = match self.invoker.invoke(&request).await {
            Err(InvocationError::SessionInvalid(reason)) => {
                tracing::warn!(
                    session = %request.session,
                    reason = %reason,
                    "Session could not be continued, starting a fresh conversation"
                );
                let retry = InvocationRequest {
                    session: SessionRef::None,
                    ..request
                };
                (self.invoker.invoke(&retry).await, true)
            }
            other => (other, request.session.is_fresh()),
        };

        if outcome.is_ok() && fresh {
            let next = SessionState {
                scope: guard.scope.clone(),
                session: SessionRef::ContinueMostRecent,
            };
            if let Err(e) = self.commit(&mut guard, next).await {
                tracing::error!(error = %e, "Failed to record continuation marker");
            }
        }

        outcome
    }

    /// Forget the current conversation; the next prompt starts fresh.
    pub async fn clear(&self) -> relay_common::Result<SessionState> {
        let mut guard = self.state.lock().await;
        let next = SessionState {
            scope: guard.scope.clone(),
            session: SessionRef::None,
        };
        self.commit(&mut guard, next.clone()).await?;
        tracing::info!("Session cleared");
        Ok(next)
    }

    /// Resume a specific conversation, or the most recent one when `token` is `None`.
    pub async fn resume(&self, token: Option<String>) -> relay_common::Result<SessionState> {
        let mut guard = self.state.lock().await;
        let session = match token {
            Some(t) if !t.trim().is_empty() => SessionRef::Explicit(t.trim().to_string()),
            _ => SessionRef::ContinueMostRecent,
        };
        let next = SessionState {
            scope: guard.scope.clone(),
            session,
        };
        self.commit(&mut guard, next.clone()).await?;
        tracing::info!(session = %next.session, "Session resumed");
        Ok(next)
    }

    /// Change the scope and start a fresh conversation there.
    ///
    /// `arg` is resolved against the current scope while the lock is held.
    /// On failure the stored state is unchanged.
    pub async fn set_scope(&self, resolver: &ScopeResolver, arg: &str) -> Result<PathBuf, ScopeError> {
        let mut guard = self.state.lock().await;
        let scope = resolver.resolve(arg, &guard.scope)?;
        let next = SessionState {
            scope: scope.clone(),
            session: SessionRef::None,
        };
        self.commit(&mut guard, next).await?;
        tracing::info!(scope = %scope.display(), "Scope changed");
        Ok(scope)
    }
}
