//! Core vocabulary shared by the lifecycle engine, the stores and the HTTP layer.
//!
//! Statuses travel as typed values everywhere; the string forms exist only for
//! persistence and JSON.

use std::fmt;
use std::str::FromStr;

use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::CoreError;

pub mod payload;

pub use payload::{CompletionInput, Measurement, PartLine, ServiceReport, TechnicalReport};

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub enum $name {
            $(#[serde(rename = $text)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $name {
            type Err = CoreError;

            fn from_str(value: &str) -> Result<Self, Self::Err> {
                match value {
                    $($text => Ok($name::$variant),)+
                    other => Err(CoreError::storage(format!(
                        concat!("unknown ", stringify!($name), " value {}"),
                        other
                    ))),
                }
            }
        }
    };
}

string_enum!(Role {
    Admin => "admin",
    Manager => "manager",
    User => "user",
});

string_enum!(
    /// The three fixed workflow kinds.
    WorkflowKind {
        Calibration => "calibration",
        Rental => "rental",
        Maintenance => "maintenance",
    }
);

string_enum!(RequestStatus {
    Pending => "PENDING",
    Approved => "APPROVED",
    InProgress => "IN_PROGRESS",
    Completed => "COMPLETED",
    Rejected => "REJECTED",
    Cancelled => "CANCELLED",
});

string_enum!(ItemStatus {
    Available => "AVAILABLE",
    InCalibration => "IN_CALIBRATION",
    Rented => "RENTED",
    Maintenance => "MAINTENANCE",
    Damaged => "DAMAGED",
});

string_enum!(DocumentType {
    Certificate => "CAL-PBI",
    ServiceReport => "CSR-PBI",
    TechnicalReport => "TCR-PBI",
});

string_enum!(ReminderKind {
    CalibrationExpiry => "calibration_expiry",
    RentalReturn => "rental_return",
});

string_enum!(ReminderStatus {
    Pending => "PENDING",
    Dismissed => "DISMISSED",
    Cancelled => "CANCELLED",
});

string_enum!(NotificationSource {
    Transition => "transition",
    Reminder => "reminder",
    Broadcast => "broadcast",
});

impl RequestStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Rejected | RequestStatus::Cancelled
        )
    }
}

impl WorkflowKind {
    /// Roles allowed to drive requests of this kind on behalf of others.
    pub fn authorizing_roles(&self) -> &'static [Role] {
        match self {
            WorkflowKind::Calibration | WorkflowKind::Rental => &[Role::Admin],
            WorkflowKind::Maintenance => &[Role::Admin, Role::Manager],
        }
    }

    pub fn is_authorizer(&self, role: Role) -> bool {
        self.authorizing_roles().contains(&role)
    }
}

/// Structured replacement for `"calibration_PENDING"` style codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct WorkflowState {
    pub kind: WorkflowKind,
    pub status: RequestStatus,
}

impl WorkflowState {
    pub fn new(kind: WorkflowKind, status: RequestStatus) -> Self {
        Self { kind, status }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.status)
    }
}

/// Identity supplied by the authentication collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Actor {
    pub id: Uuid,
    pub role: Role,
}

impl Actor {
    pub fn new(id: Uuid, role: Role) -> Self {
        Self { id, role }
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    #[serde(skip)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Item {
    pub serial_number: String,
    pub name: String,
    pub status: ItemStatus,
    pub last_verified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// One engagement of an item by an actor. Kind-specific columns are optional
/// and only populated for the kind that uses them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ServiceRequest {
    pub id: Uuid,
    pub kind: WorkflowKind,
    pub status: RequestStatus,
    pub owner_id: Uuid,
    pub item_serial: String,
    pub notes: Option<String>,
    pub start_date: Option<NaiveDate>,
    pub due_date: Option<NaiveDate>,
    pub calibration_date: Option<NaiveDate>,
    pub valid_until: Option<NaiveDate>,
    pub return_date: Option<NaiveDateTime>,
    pub document_number: Option<String>,
    pub version: i32,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl ServiceRequest {
    pub fn state(&self) -> WorkflowState {
        WorkflowState::new(self.kind, self.status)
    }

    pub fn is_open(&self) -> bool {
        !self.status.is_terminal()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusLogEntry {
    pub id: Uuid,
    pub kind: WorkflowKind,
    pub request_id: Uuid,
    pub status: RequestStatus,
    pub actor_id: Uuid,
    pub notes: Option<String>,
    pub created_at: NaiveDateTime,
}

/// Interval during which a request held an item; `ended_at` is `None` while open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemHistory {
    pub id: Uuid,
    pub item_serial: String,
    pub kind: WorkflowKind,
    pub request_id: Uuid,
    pub started_at: NaiveDateTime,
    pub ended_at: Option<NaiveDateTime>,
    pub opening_note: Option<String>,
    pub closing_note: Option<String>,
}

impl ItemHistory {
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IssuedDocument {
    pub id: Uuid,
    pub request_id: Uuid,
    pub doc_type: DocumentType,
    pub number: String,
    pub content: Value,
    pub issued_at: NaiveDateTime,
    pub regenerated_at: Option<NaiveDateTime>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reminder {
    pub id: Uuid,
    pub kind: ReminderKind,
    pub owner_id: Uuid,
    pub related_request_id: Uuid,
    pub item_serial: String,
    pub due_date: NaiveDate,
    pub fire_date: NaiveDate,
    pub title: String,
    pub message: String,
    pub status: ReminderStatus,
    pub email_sent: bool,
    pub notified_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub recipient_id: Uuid,
    pub title: String,
    pub message: String,
    pub source: NotificationSource,
    pub request_id: Option<Uuid>,
    pub reminder_id: Option<Uuid>,
    pub is_read: bool,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub actor_id: Uuid,
    pub action: String,
    pub entity: String,
    pub entity_id: String,
    pub details: Value,
    pub created_at: NaiveDateTime,
}
