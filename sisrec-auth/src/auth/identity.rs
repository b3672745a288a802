//! User Identity
//!
//! Roles, account statuses and the authenticated principal as the page layer
//! sees it.

use serde::{Deserialize, Serialize};

/// Role enumeration, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Department administrator
    #[serde(rename = "ADMIN")]
    Administrator,
    /// Department staff member hosting visits
    #[serde(rename = "SERVIDOR")]
    StaffMember,
    /// Front-desk receptionist
    #[serde(rename = "RECEPCIONISTA")]
    Receptionist,
    /// External visitor
    #[serde(rename = "VISITANTE")]
    Visitor,
}

impl Role {
    pub const ALL: [Role; 4] = [
        Role::Administrator,
        Role::StaffMember,
        Role::Receptionist,
        Role::Visitor,
    ];

    /// Name used on the wire and in token claims (without prefix)
    pub fn wire_name(&self) -> &'static str {
        match self {
            Role::Administrator => "ADMIN",
            Role::StaffMember => "SERVIDOR",
            Role::Receptionist => "RECEPCIONISTA",
            Role::Visitor => "VISITANTE",
        }
    }

    /// Normalize one raw role claim value, stripping the backend prefix
    pub fn from_claim(raw: &str, prefix: &str) -> Option<Role> {
        let trimmed = raw.trim();
        let bare = match trimmed.get(..prefix.len()) {
            Some(head) if !prefix.is_empty() && head.eq_ignore_ascii_case(prefix) => {
                &trimmed[prefix.len()..]
            }
            _ => trimmed,
        };
        bare.parse().ok()
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Administrator => write!(f, "administrator"),
            Role::StaffMember => write!(f, "staff-member"),
            Role::Receptionist => write!(f, "receptionist"),
            Role::Visitor => write!(f, "visitor"),
        }
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "admin" | "administrator" => Ok(Role::Administrator),
            "servidor" | "staff-member" | "staff" => Ok(Role::StaffMember),
            "recepcionista" | "receptionist" => Ok(Role::Receptionist),
            "visitante" | "visitor" => Ok(Role::Visitor),
            _ => Err(format!("Unknown role: {}", s)),
        }
    }
}

/// Account status enumeration, closed set
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AccountStatus {
    #[serde(rename = "ATIVA", alias = "ATIVO")]
    Active,
    #[serde(rename = "INATIVA", alias = "INATIVO")]
    Inactive,
    #[serde(rename = "PENDENTE", alias = "PENDENTE_VALIDACAO")]
    PendingValidation,
    #[serde(rename = "BLOQUEADA", alias = "BLOQUEADO")]
    Blocked,
}

impl AccountStatus {
    pub const ALL: [AccountStatus; 4] = [
        AccountStatus::Active,
        AccountStatus::Inactive,
        AccountStatus::PendingValidation,
        AccountStatus::Blocked,
    ];

    /// Canonical wire name
    pub fn wire_name(&self) -> &'static str {
        match self {
            AccountStatus::Active => "ATIVA",
            AccountStatus::Inactive => "INATIVA",
            AccountStatus::PendingValidation => "PENDENTE",
            AccountStatus::Blocked => "BLOQUEADA",
        }
    }

    /// Human-readable reason shown on the account-suspended page
    pub fn reason(&self) -> &'static str {
        match self {
            AccountStatus::Active => "Conta ativa",
            AccountStatus::Inactive => "Sua conta está inativa. Procure o administrador.",
            AccountStatus::PendingValidation => "Sua conta aguarda validação.",
            AccountStatus::Blocked => "Sua conta foi bloqueada.",
        }
    }
}

impl std::fmt::Display for AccountStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccountStatus::Active => write!(f, "active"),
            AccountStatus::Inactive => write!(f, "inactive"),
            AccountStatus::PendingValidation => write!(f, "pending-validation"),
            AccountStatus::Blocked => write!(f, "blocked"),
        }
    }
}

impl std::str::FromStr for AccountStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ativa" | "ativo" | "active" => Ok(AccountStatus::Active),
            "inativa" | "inativo" | "inactive" => Ok(AccountStatus::Inactive),
            "pendente" | "pendente_validacao" | "pending-validation" | "pending" => {
                Ok(AccountStatus::PendingValidation)
            }
            "bloqueada" | "bloqueado" | "blocked" => Ok(AccountStatus::Blocked),
            _ => Err(format!("Unknown account status: {}", s)),
        }
    }
}

/// The authenticated principal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Display name
    #[serde(rename = "nome")]
    pub name: String,
    pub email: String,
    /// Single source of truth for every permission check
    #[serde(rename = "papel")]
    pub role: Role,
    #[serde(rename = "statusConta")]
    pub status: AccountStatus,
    #[serde(rename = "fotoUrl", default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Identity {
    pub fn new(name: impl Into<String>, email: impl Into<String>, role: Role) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            role,
            status: AccountStatus::Active,
            avatar_url: None,
        }
    }

    pub fn with_status(mut self, status: AccountStatus) -> Self {
        self.status = status;
        self
    }

    pub fn with_avatar(mut self, avatar_url: impl Into<String>) -> Self {
        self.avatar_url = Some(avatar_url.into());
        self
    }

    pub fn is_active(&self) -> bool {
        self.status == AccountStatus::Active
    }

    /// Get user display string
    pub fn display_string(&self) -> String {
        format!("{} <{}> ({}, {})", self.name, self.email, self.role, self.status)
    }
}
