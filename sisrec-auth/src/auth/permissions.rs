//! Permission System
//!
//! Static role → capability table. Every predicate is a closed-form function
//! of the current role (and, for capabilities flagged below, of the account
//! status). There is no implicit administrator bypass: a role holds a
//! capability only when the table lists it.

use super::identity::{AccountStatus, Identity, Role};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Named capabilities gating UI actions and routes
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    ViewDashboard,
    ViewPeople,
    ManagePeople,
    ManageStaff,
    ImportStaffData,
    ViewOrganizationalUnits,
    ManageOrganizationalUnits,
    ScheduleVisits,
    ViewOwnVisits,
    ViewAllVisits,
    ApproveVisits,
    CancelVisits,
    ControlReception,
    RegisterWalkIn,
    ViewNotifications,
    ManageNotifications,
    SendBulkNotifications,
    ManageUsers,
    ViewReports,
    ManageSettings,
}

use super::identity::Role::{
    Administrator as ADM, Receptionist as REC, StaffMember as STF, Visitor as VIS,
};

/// Capability, roles granted, requires an active account
pub const CAPABILITY_TABLE: &[(Capability, &[Role], bool)] = &[
    (Capability::ViewDashboard, &[ADM, STF, REC], false),
    (Capability::ViewPeople, &[ADM, STF, REC], false),
    (Capability::ManagePeople, &[ADM, REC], false),
    (Capability::ManageStaff, &[ADM], false),
    (Capability::ImportStaffData, &[ADM], false),
    (Capability::ViewOrganizationalUnits, &[ADM, STF, REC], false),
    (Capability::ManageOrganizationalUnits, &[ADM], false),
    (Capability::ScheduleVisits, &[ADM, STF, REC, VIS], true),
    (Capability::ViewOwnVisits, &[ADM, STF, REC, VIS], false),
    (Capability::ViewAllVisits, &[ADM, REC], false),
    (Capability::ApproveVisits, &[ADM, STF], true),
    (Capability::CancelVisits, &[ADM, STF, REC, VIS], false),
    (Capability::ControlReception, &[ADM, REC], true),
    (Capability::RegisterWalkIn, &[REC], true),
    (Capability::ViewNotifications, &[ADM, STF, REC, VIS], false),
    (Capability::ManageNotifications, &[ADM], false),
    (Capability::SendBulkNotifications, &[ADM], true),
    (Capability::ManageUsers, &[ADM], false),
    (Capability::ViewReports, &[ADM, STF], false),
    (Capability::ManageSettings, &[ADM], false),
];

impl Capability {
    pub const ALL: [Capability; 20] = [
        Capability::ViewDashboard,
        Capability::ViewPeople,
        Capability::ManagePeople,
        Capability::ManageStaff,
        Capability::ImportStaffData,
        Capability::ViewOrganizationalUnits,
        Capability::ManageOrganizationalUnits,
        Capability::ScheduleVisits,
        Capability::ViewOwnVisits,
        Capability::ViewAllVisits,
        Capability::ApproveVisits,
        Capability::CancelVisits,
        Capability::ControlReception,
        Capability::RegisterWalkIn,
        Capability::ViewNotifications,
        Capability::ManageNotifications,
        Capability::SendBulkNotifications,
        Capability::ManageUsers,
        Capability::ViewReports,
        Capability::ManageSettings,
    ];

    fn entry(&self) -> Option<&'static (Capability, &'static [Role], bool)> {
        CAPABILITY_TABLE.iter().find(|(capability, _, _)| capability == self)
    }

    /// Roles the table grants this capability to
    pub fn granted_roles(&self) -> &'static [Role] {
        self.entry().map(|(_, roles, _)| *roles).unwrap_or(&[])
    }

    /// Whether the capability is withheld from non-active accounts
    pub fn requires_active_account(&self) -> bool {
        self.entry().map(|(_, _, active)| *active).unwrap_or(false)
    }

    /// Table lookup; the only place a capability is granted
    pub fn is_granted(&self, role: Role, status: Option<AccountStatus>) -> bool {
        match self.entry() {
            Some((_, roles, requires_active)) => {
                roles.contains(&role)
                    && (!requires_active || status == Some(AccountStatus::Active))
            }
            None => false,
        }
    }
}

impl std::fmt::Display for Capability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Capability::ViewDashboard => "view_dashboard",
            Capability::ViewPeople => "view_people",
            Capability::ManagePeople => "manage_people",
            Capability::ManageStaff => "manage_staff",
            Capability::ImportStaffData => "import_staff_data",
            Capability::ViewOrganizationalUnits => "view_organizational_units",
            Capability::ManageOrganizationalUnits => "manage_organizational_units",
            Capability::ScheduleVisits => "schedule_visits",
            Capability::ViewOwnVisits => "view_own_visits",
            Capability::ViewAllVisits => "view_all_visits",
            Capability::ApproveVisits => "approve_visits",
            Capability::CancelVisits => "cancel_visits",
            Capability::ControlReception => "control_reception",
            Capability::RegisterWalkIn => "register_walk_in",
            Capability::ViewNotifications => "view_notifications",
            Capability::ManageNotifications => "manage_notifications",
            Capability::SendBulkNotifications => "send_bulk_notifications",
            Capability::ManageUsers => "manage_users",
            Capability::ViewReports => "view_reports",
            Capability::ManageSettings => "manage_settings",
        };
        write!(f, "{}", name)
    }
}

impl std::str::FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase().replace('-', "_");
        Capability::ALL
            .into_iter()
            .find(|capability| capability.to_string() == wanted)
            .ok_or_else(|| format!("Unknown capability: {}", s))
    }
}

/// Predicate set derived from the current role; holds no state of its own
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PermissionSet {
    role: Option<Role>,
    status: Option<AccountStatus>,
}

impl PermissionSet {
    /// Predicates for a role when the account status is unknown
    pub fn for_role(role: Option<Role>) -> Self {
        Self { role, status: None }
    }

    /// Predicates for the current identity (None when logged out)
    pub fn for_identity(identity: Option<&Identity>) -> Self {
        Self {
            role: identity.map(|i| i.role),
            status: identity.map(|i| i.status),
        }
    }

    pub fn role(&self) -> Option<Role> {
        self.role
    }

    pub fn can(&self, capability: Capability) -> bool {
        match self.role {
            Some(role) => capability.is_granted(role, self.status),
            None => false,
        }
    }

    pub fn can_all(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().all(|c| self.can(*c))
    }

    pub fn can_any(&self, capabilities: &[Capability]) -> bool {
        capabilities.iter().any(|c| self.can(*c))
    }

    /// Every capability currently granted
    pub fn granted(&self) -> BTreeSet<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|c| self.can(*c))
            .collect()
    }

    pub fn can_manage_people(&self) -> bool {
        self.can(Capability::ManagePeople)
    }

    pub fn can_schedule_visits(&self) -> bool {
        self.can(Capability::ScheduleVisits)
    }

    pub fn can_approve_visits(&self) -> bool {
        self.can(Capability::ApproveVisits)
    }

    pub fn can_control_reception(&self) -> bool {
        self.can(Capability::ControlReception)
    }

    pub fn can_import_staff_data(&self) -> bool {
        self.can(Capability::ImportStaffData)
    }

    pub fn can_manage_notifications(&self) -> bool {
        self.can(Capability::ManageNotifications)
    }

    pub fn can_send_bulk_notifications(&self) -> bool {
        self.can(Capability::SendBulkNotifications)
    }
}
