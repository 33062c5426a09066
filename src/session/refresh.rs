// Single-flight credential renewal

use std::sync::Arc;
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use crate::error::RefreshError;

use super::service::AuthService;
use super::store::TokenStore;

type Ticket = Shared<BoxFuture<'static, Result<String, RefreshError>>>;

/// At-most-one in-flight renewal of the access credential.
///
/// The pending renewal future is the ticket. The first rejected call
/// creates it and stores it in the slot before the wire call is ever
/// polled, so every concurrently rejected call finds it and attaches
/// instead of issuing its own renewal. All waiters see the episode's one
/// outcome; the number of wire calls is independent of the number of
/// callers.
pub struct RefreshCoordinator {
    store: Arc<TokenStore>,
    service: Arc<AuthService>,
    timeout: Duration,
    ticket: Mutex<Option<Ticket>>,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        service: Arc<AuthService>,
        timeout: Duration,
    ) -> RefreshCoordinator {
        RefreshCoordinator {
            store,
            service,
            timeout,
            ticket: Mutex::new(None),
        }
    }

    /// Renew the access credential, or attach to a renewal already in
    /// flight. On success the store already holds the new credential.
    pub async fn renewed_access(&self) -> Result<String, RefreshError> {
        let ticket = {
            let mut slot = self.ticket.lock().await;
            match slot.as_ref() {
                Some(ticket) => {
                    tracing::debug!("attaching to in-flight renewal");
                    ticket.clone()
                }
                None => {
                    // Stored before the first poll: a concurrent arrival
                    // must find the ticket here, not start a second call.
                    let ticket = renew(self.store.clone(), self.service.clone(), self.timeout)
                        .boxed()
                        .shared();
                    *slot = Some(ticket.clone());
                    ticket
                }
            }
        };

        let result = ticket.clone().await;

        // Only this episode's ticket may be cleared; a waiter resuming
        // late must not destroy a newer episode's ticket.
        let mut slot = self.ticket.lock().await;
        if slot.as_ref().is_some_and(|current| current.ptr_eq(&ticket)) {
            *slot = None;
        }
        result
    }
}

async fn renew(
    store: Arc<TokenStore>,
    service: Arc<AuthService>,
    deadline: Duration,
) -> Result<String, RefreshError> {
    let refresh = store
        .get()
        .await
        .map(|pair| pair.refresh)
        .ok_or(RefreshError::MissingRefresh)?;

    let access = match tokio::time::timeout(deadline, service.renew(&refresh)).await {
        Ok(result) => result?,
        Err(_) => {
            tracing::warn!("renewal timed out after {deadline:?}");
            return Err(RefreshError::TimedOut(deadline));
        }
    };

    // Republish before resolving, so every waiter redispatches against a
    // store that already holds the new credential.
    store
        .set_access(&access)
        .await
        .map_err(|e| RefreshError::Storage(e.to_string()))?;
    tracing::info!("access credential renewed");
    Ok(access)
}
