// Terminal-view transitions on unrecoverable failure

use std::sync::Arc;

use tokio::sync::watch;

use super::store::TokenStore;

/// Views the session layer can drive the client to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum View {
    /// Signed-in UI
    Dashboard,
    /// Unauthenticated entry view
    Login,
    /// Authenticated but not permitted
    AccessDenied,
}

/// Drives the client to a terminal view when a call cannot be recovered.
///
/// Transitions are compare-before-send inside the watch channel's own
/// lock, so any number of concurrently failing calls produce one storage
/// clear and one transition, never a redirect loop.
pub struct SessionFailureHandler {
    store: Arc<TokenStore>,
    view: watch::Sender<View>,
}

impl SessionFailureHandler {
    pub fn new(store: Arc<TokenStore>, initial: View) -> SessionFailureHandler {
        let (view, _) = watch::channel(initial);
        SessionFailureHandler { store, view }
    }

    /// Current view
    pub fn current(&self) -> View {
        *self.view.borrow()
    }

    /// Observe view transitions; the UI's hook
    pub fn subscribe(&self) -> watch::Receiver<View> {
        self.view.subscribe()
    }

    /// Unrecoverable authentication failure: tear the session down and
    /// land on the login view. A no-op when already there.
    pub async fn on_unauthenticated(&self) {
        if !self.transition(View::Login) {
            return;
        }
        tracing::warn!("session reset, returning to login");
        if let Err(e) = self.store.clear().await {
            tracing::error!("failed to clear session storage: {e:#}");
        }
    }

    /// Authenticated but not permitted: show the access-denied view and
    /// keep the session. A no-op when already there.
    pub fn on_forbidden(&self) {
        if self.transition(View::AccessDenied) {
            tracing::warn!("permission denied, showing access-denied view");
        }
    }

    /// A login completed; show the signed-in UI
    pub fn signed_in(&self) {
        self.transition(View::Dashboard);
    }

    /// A local logout completed; back to the entry view
    pub fn signed_out(&self) {
        self.transition(View::Login);
    }

    fn transition(&self, target: View) -> bool {
        self.view.send_if_modified(|view| {
            if *view == target {
                false
            } else {
                *view = target;
                true
            }
        })
    }
}
