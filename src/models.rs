use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// ============ Roles & Identity ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "administrator")]
    Admin,
    #[serde(alias = "medico")]
    Clinician,
    #[serde(alias = "consulta")]
    Viewer,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Clinician => "clinician",
            Self::Viewer => "viewer",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who made the request, as established by the auth guard.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Identity {
    pub username: String,
    pub role: Role,
}

// ============ Patient Models ============

#[derive(Debug, Clone, PartialEq, FromRow, Serialize)]
pub struct Patient {
    pub id: i64,
    pub name: String,
    pub age: i64,
    pub diabetes: bool,
    pub smoking: bool,
    pub tumor: bool,
    pub volume: f64,
    pub procedure: String,
    pub date: String,
}

/// Body of `POST /save`. Every field is required; only types are checked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewPatient {
    pub name: String,
    pub age: i64,
    pub diabetes: bool,
    pub smoking: bool,
    pub tumor: bool,
    pub volume: f64,
    pub procedure: String,
    pub date: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============ Audit Log Models ============

#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub username: String,
    pub endpoint: String,
    pub timestamp: String,
}
