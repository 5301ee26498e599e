//! Route guard decisions.
//!
//! Both guards read only the session phase. `require_auth` yields
//! loading, render or redirect-to-login; `require_admin` adds access-denied
//! for signed-in users whose role is not `Admin`.

use serde::Serialize;

use crate::models::Role;
use crate::session::SessionPhase;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum GuardDecision {
    Loading,
    Render,
    RedirectToLogin,
    AccessDenied,
}

pub fn require_auth(phase: &SessionPhase) -> GuardDecision {
    match phase {
        SessionPhase::Loading => GuardDecision::Loading,
        SessionPhase::SignedOut => GuardDecision::RedirectToLogin,
        SessionPhase::SignedIn(_) => GuardDecision::Render,
    }
}

pub fn require_admin(phase: &SessionPhase) -> GuardDecision {
    match phase {
        SessionPhase::Loading => GuardDecision::Loading,
        SessionPhase::SignedOut => GuardDecision::RedirectToLogin,
        SessionPhase::SignedIn(user) if user.role == Role::Admin => GuardDecision::Render,
        SessionPhase::SignedIn(_) => GuardDecision::AccessDenied,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AuthUser;
    use uuid::Uuid;

    fn signed_in(role: Role) -> SessionPhase {
        SessionPhase::SignedIn(AuthUser {
            id: Uuid::new_v4(),
            email: Some("user@example.com".to_string()),
            role,
        })
    }

    #[test]
    fn test_require_auth() {
        assert_eq!(require_auth(&SessionPhase::Loading), GuardDecision::Loading);
        assert_eq!(
            require_auth(&SessionPhase::SignedOut),
            GuardDecision::RedirectToLogin
        );
        assert_eq!(require_auth(&signed_in(Role::Customer)), GuardDecision::Render);
    }

    #[test]
    fn test_require_admin() {
        assert_eq!(require_admin(&SessionPhase::Loading), GuardDecision::Loading);
        assert_eq!(
            require_admin(&SessionPhase::SignedOut),
            GuardDecision::RedirectToLogin
        );
        assert_eq!(
            require_admin(&signed_in(Role::Employee)),
            GuardDecision::AccessDenied
        );
        assert_eq!(
            require_admin(&signed_in(Role::Customer)),
            GuardDecision::AccessDenied
        );
        assert_eq!(require_admin(&signed_in(Role::Admin)), GuardDecision::Render);
    }
}
