// Read-only views of facts owned by the tutoring/enrollment service.
use serde::{Deserialize, Serialize};

use super::auth::Role;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "tema", default)]
    pub title: String,
    #[serde(alias = "materia", default)]
    pub subject_name: String,
    #[serde(alias = "tutor")]
    pub tutor_id: String,
    #[serde(alias = "tutorNombre", default)]
    pub tutor_name: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EnrollmentStatus {
    #[serde(alias = "Pendiente", alias = "pending", alias = "PENDIENTE")]
    Pending,
    #[serde(alias = "Aceptada", alias = "accepted", alias = "ACEPTADA")]
    Accepted,
    #[serde(alias = "Rechazada", alias = "rejected", alias = "RECHAZADA")]
    Rejected,
    #[serde(alias = "Cancelada", alias = "cancelled", alias = "CANCELADA")]
    Cancelled,
}

/// A student's request to join a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Enrollment {
    #[serde(alias = "tutoria")]
    pub session_id: String,
    #[serde(alias = "estudiante")]
    pub student_id: String,
    #[serde(alias = "estudianteNombre", default)]
    pub student_name: String,
    #[serde(alias = "estado")]
    pub status: EnrollmentStatus,
}

impl Enrollment {
    pub fn is_accepted(&self) -> bool {
        self.status == EnrollmentStatus::Accepted
    }
}

/// Someone a message can be addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Participant {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(alias = "nombre")]
    pub name: String,
    #[serde(alias = "rol")]
    pub role: Role,
}

impl Participant {
    pub fn new(id: impl Into<String>, name: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            role,
        }
    }
}
