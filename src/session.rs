//! Session context with an explicit lifecycle.
//!
//! Consumers `subscribe` to phase changes and the owner calls `dispose` when
//! the context goes away. The role is resolved once per sign-in and carried
//! in the phase until the next change.

use std::sync::Arc;
use tokio::sync::watch;

use crate::auth::{resolve_role, AuthUser};
use crate::identity_client::IdentityUser;
use crate::store::Store;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Initial session and role not resolved yet.
    Loading,
    SignedOut,
    SignedIn(AuthUser),
}

pub struct SessionContext {
    store: Arc<dyn Store>,
    tx: watch::Sender<SessionPhase>,
}

impl SessionContext {
    pub fn new(store: Arc<dyn Store>) -> Self {
        let (tx, _rx) = watch::channel(SessionPhase::Loading);
        Self { store, tx }
    }

    pub fn phase(&self) -> SessionPhase {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<SessionPhase> {
        self.tx.subscribe()
    }

    /// Applies a session change from the identity provider.
    pub async fn on_session_change(&self, user: Option<IdentityUser>) {
        let phase = match user {
            Some(user) => {
                let role = resolve_role(self.store.as_ref(), user.id).await;
                tracing::debug!("Session started for {} as {}", user.id, role);
                SessionPhase::SignedIn(AuthUser::from_identity(user, role))
            }
            None => SessionPhase::SignedOut,
        };
        self.tx.send_replace(phase);
    }

    /// Tears the context down; subscribers observe `SignedOut` and then a closed channel.
    pub fn dispose(self) {
        self.tx.send_replace(SessionPhase::SignedOut);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::guards::{require_admin, GuardDecision};
    use crate::memory_store::MemoryStore;
    use crate::models::Role;
    use uuid::Uuid;

    fn identity(id: Uuid) -> IdentityUser {
        IdentityUser {
            id,
            email: Some("admin@example.com".to_string()),
        }
    }

    #[tokio::test]
    async fn test_session_lifecycle() {
        let store = Arc::new(MemoryStore::new());
        let admin = Uuid::new_v4();
        store.grant_role(admin, Role::Admin);

        let ctx = SessionContext::new(store.clone());
        let mut rx = ctx.subscribe();
        assert_eq!(require_admin(&ctx.phase()), GuardDecision::Loading);

        ctx.on_session_change(Some(identity(admin))).await;
        rx.changed().await.unwrap();
        assert_eq!(require_admin(&rx.borrow_and_update()), GuardDecision::Render);

        ctx.on_session_change(None).await;
        assert_eq!(require_admin(&ctx.phase()), GuardDecision::RedirectToLogin);

        ctx.dispose();
        assert!(rx.changed().await.is_ok());
        assert!(rx.changed().await.is_err());
    }

    #[tokio::test]
    async fn test_role_lookup_failure_demotes_admin_for_session() {
        let store = Arc::new(MemoryStore::new());
        let admin = Uuid::new_v4();
        store.grant_role(admin, Role::Admin);
        store.set_role_lookup_failure(true);

        let ctx = SessionContext::new(store.clone());
        ctx.on_session_change(Some(identity(admin))).await;
        assert_eq!(require_admin(&ctx.phase()), GuardDecision::AccessDenied);

        // Recovery of the store does not change the already-resolved session.
        store.set_role_lookup_failure(false);
        assert_eq!(require_admin(&ctx.phase()), GuardDecision::AccessDenied);
    }
}
