//! Token claim extraction
//!
//! The client never verifies signatures. It reads the payload segment to learn
//! the expiry and the identity claims, nothing more; expiry is checked here
//! against the injected [`Clock`] rather than by the JWT codec.

use crate::auth::{AccountStatus, Identity, Role};
use crate::{AuthError, AuthResult};
use chrono::{DateTime, Utc};
use jsonwebtoken::{DecodingKey, Validation};
use serde_json::{Map, Value};
use sisrec_core::AuthConfig;
use tracing::{debug, warn};

/// Source of "now" for expiry checks
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Claims the access core cares about
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenClaims {
    /// `sub`, the account email
    pub subject: Option<String>,
    /// `exp`, seconds since epoch
    pub expires_at: i64,
    /// `nome`
    pub name: Option<String>,
    /// `statusConta`, still in wire form
    pub status: Option<String>,
    /// Raw role claim values in token order
    pub roles: Vec<String>,
}

impl TokenClaims {
    /// Expired when `exp <= now`; a token expiring this very second is already dead
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now.timestamp()
    }
}

/// Claim decoder configured with the backend's claim layout
#[derive(Debug, Clone)]
pub struct TokenDecoder {
    role_claim: String,
    role_prefix: String,
    validation: Validation,
}

impl Default for TokenDecoder {
    fn default() -> Self {
        Self::new(&AuthConfig::default())
    }
}

impl TokenDecoder {
    pub fn new(config: &AuthConfig) -> Self {
        // Structure only: no signature, no registered-claim checks
        let mut validation = Validation::default();
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.validate_aud = false;
        validation.required_spec_claims.clear();

        Self {
            role_claim: config.role_claim.clone(),
            role_prefix: config.role_prefix.clone(),
            validation,
        }
    }

    /// Decode the payload segment of a `header.payload.signature` token
    pub fn decode(&self, token: &str) -> AuthResult<TokenClaims> {
        // Padding is tolerated on the wire, the codec expects it stripped
        let segments: Vec<&str> = token
            .trim()
            .split('.')
            .map(|segment| segment.trim_end_matches('='))
            .collect();
        if segments.len() != 3 {
            return Err(AuthError::decode(format!(
                "expected 3 segments, found {}",
                segments.len()
            )));
        }

        let claims = jsonwebtoken::decode::<Map<String, Value>>(
            &segments.join("."),
            &DecodingKey::from_secret(&[]),
            &self.validation,
        )
        .map_err(|e| AuthError::decode(format!("unreadable token: {}", e)))?
        .claims;

        let expires_at = match claims.get("exp") {
            Some(Value::Number(n)) => n
                .as_i64()
                .or_else(|| n.as_f64().map(|f| f.floor() as i64))
                .ok_or_else(|| AuthError::decode("exp is not representable"))?,
            Some(_) => return Err(AuthError::decode("exp is not a number")),
            None => return Err(AuthError::decode("missing exp claim")),
        };

        let roles = match claims.get(&self.role_claim) {
            Some(Value::Array(values)) => values
                .iter()
                .filter_map(|v| v.as_str().map(str::to_string))
                .collect(),
            Some(Value::String(single)) => vec![single.clone()],
            _ => Vec::new(),
        };

        Ok(TokenClaims {
            subject: string_claim(&claims, "sub"),
            expires_at,
            name: string_claim(&claims, "nome"),
            status: string_claim(&claims, "statusConta"),
            roles,
        })
    }

    /// Decode and reject tokens that are already expired at `now`
    pub fn decode_fresh(&self, token: &str, now: DateTime<Utc>) -> AuthResult<TokenClaims> {
        let claims = self.decode(token)?;
        if claims.is_expired_at(now) {
            return Err(AuthError::Expired {
                expires_at: claims.expires_at,
            });
        }
        Ok(claims)
    }

    /// First role claim value that names a known role
    pub fn role_of(&self, claims: &TokenClaims) -> Option<Role> {
        let role = claims
            .roles
            .iter()
            .find_map(|raw| Role::from_claim(raw, &self.role_prefix));
        if role.is_none() && !claims.roles.is_empty() {
            debug!("No recognized role among claims {:?}", claims.roles);
        }
        role
    }

    /// Build an identity from claims alone
    pub fn identity_from_claims(&self, claims: &TokenClaims) -> AuthResult<Identity> {
        let email = claims
            .subject
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or(AuthError::MissingIdentity)?;
        let role = self.role_of(claims).ok_or(AuthError::MissingIdentity)?;

        let name = claims
            .name
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(email);

        let status = match claims.status.as_deref() {
            Some(raw) => raw.parse::<AccountStatus>().unwrap_or_else(|e| {
                warn!("{}; assuming active account", e);
                AccountStatus::Active
            }),
            None => AccountStatus::Active,
        };

        Ok(Identity::new(name, email, role).with_status(status))
    }

    /// Align an identity snapshot with the role the token carries
    pub fn reconcile(&self, mut identity: Identity, claims: &TokenClaims) -> Identity {
        if let Some(role) = self.role_of(claims) {
            if role != identity.role {
                debug!(
                    "Identity role {} replaced by token role {}",
                    identity.role, role
                );
                identity.role = role;
            }
        }
        identity
    }
}

fn string_claim(claims: &Map<String, Value>, key: &str) -> Option<String> {
    claims.get(key).and_then(Value::as_str).map(str::to_string)
}
