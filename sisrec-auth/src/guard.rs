//! Access Guard
//!
//! Route-level decisions computed from a session snapshot. Both guards are
//! pure: no I/O, no network, the same snapshot always yields the same outcome.

use crate::auth::{AccountStatus, Role};
use crate::messages;
use crate::session::SessionSnapshot;
use serde::{Deserialize, Serialize};
use sisrec_core::RoutesConfig;

/// Deep link the user asked for before being sent to login
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingDestination {
    pub path: String,
}

impl PendingDestination {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }

    /// Only same-origin absolute paths are honored as redirect targets.
    /// Browsers read `\` as `/`, so `/\host` is as off-site as `//host`.
    fn is_local(&self) -> bool {
        self.path.starts_with('/') && !self.path.starts_with("//") && !self.path.contains('\\')
    }
}

/// Per-route access requirements
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteRequirements {
    /// Empty means any authenticated role
    pub required_roles: Vec<Role>,
    pub allowed_statuses: Vec<AccountStatus>,
}

impl Default for RouteRequirements {
    fn default() -> Self {
        Self {
            required_roles: Vec::new(),
            allowed_statuses: vec![AccountStatus::Active],
        }
    }
}

impl RouteRequirements {
    pub fn roles(roles: impl IntoIterator<Item = Role>) -> Self {
        Self {
            required_roles: roles.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn with_allowed_statuses(mut self, statuses: impl IntoIterator<Item = AccountStatus>) -> Self {
        self.allowed_statuses = statuses.into_iter().collect();
        self
    }
}

/// Context handed to the redirect destination
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RedirectState {
    /// Plain navigation, nothing to show
    None,
    LoginRequired {
        from: PendingDestination,
        message: String,
    },
    AccountSuspended {
        status: AccountStatus,
        reason: String,
    },
    Unauthorized {
        required_roles: Vec<Role>,
        user_role: Role,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Redirect {
    pub to: String,
    pub state: RedirectState,
}

/// What the router should do with the current route
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum GuardOutcome {
    /// Session not settled yet; show a placeholder
    Loading,
    Render,
    Redirect(Redirect),
}

impl GuardOutcome {
    pub fn redirect_target(&self) -> Option<&str> {
        match self {
            GuardOutcome::Redirect(redirect) => Some(&redirect.to),
            _ => None,
        }
    }
}

/// Guard evaluation over the configured route table
#[derive(Debug, Clone, Default)]
pub struct AccessGuard {
    routes: RoutesConfig,
}

impl AccessGuard {
    pub fn new(routes: RoutesConfig) -> Self {
        Self { routes }
    }

    pub fn routes(&self) -> &RoutesConfig {
        &self.routes
    }

    /// Default landing page for a role
    pub fn landing_for(&self, role: Role) -> &str {
        match role {
            Role::Visitor => &self.routes.visitor_landing,
            _ => &self.routes.dashboard,
        }
    }

    /// Guard for pages only logged-out users should see (login, sign-up)
    pub fn public_only(
        &self,
        snapshot: &SessionSnapshot,
        pending: Option<&PendingDestination>,
    ) -> GuardOutcome {
        if snapshot.is_loading() {
            return GuardOutcome::Loading;
        }

        let Some(identity) = snapshot.identity() else {
            return GuardOutcome::Render;
        };

        let to = pending
            .filter(|p| p.is_local() && p.path != self.routes.login)
            .map(|p| p.path.clone())
            .unwrap_or_else(|| self.landing_for(identity.role).to_string());

        GuardOutcome::Redirect(Redirect {
            to,
            state: RedirectState::None,
        })
    }

    /// Guard for protected pages; checks run loading, authentication, status, role
    pub fn require_auth(
        &self,
        snapshot: &SessionSnapshot,
        location: &str,
        requirements: &RouteRequirements,
    ) -> GuardOutcome {
        if snapshot.is_loading() {
            return GuardOutcome::Loading;
        }

        let Some(identity) = snapshot.identity() else {
            return GuardOutcome::Redirect(Redirect {
                to: self.routes.login.clone(),
                state: RedirectState::LoginRequired {
                    from: PendingDestination::new(location),
                    message: messages::LOGIN_REQUIRED.to_string(),
                },
            });
        };

        if !requirements.allowed_statuses.contains(&identity.status) {
            return GuardOutcome::Redirect(Redirect {
                to: self.routes.account_suspended.clone(),
                state: RedirectState::AccountSuspended {
                    status: identity.status,
                    reason: identity.status.reason().to_string(),
                },
            });
        }

        if !requirements.required_roles.is_empty()
            && !requirements.required_roles.contains(&identity.role)
        {
            return GuardOutcome::Redirect(Redirect {
                to: self.routes.unauthorized.clone(),
                state: RedirectState::Unauthorized {
                    required_roles: requirements.required_roles.clone(),
                    user_role: identity.role,
                },
            });
        }

        GuardOutcome::Render
    }
}
