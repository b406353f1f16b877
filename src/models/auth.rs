use serde::{Deserialize, Serialize};
use std::fmt;

/// Platform role carried in the identity token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "Tutor", alias = "TUTOR")]
    Tutor,
    #[serde(alias = "Student", alias = "estudiante", alias = "Estudiante", alias = "ESTUDIANTE")]
    Student,
    #[serde(alias = "Admin", alias = "ADMIN", alias = "administrador")]
    Admin,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Tutor => "tutor",
            Role::Student => "student",
            Role::Admin => "admin",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "tutor" => Some(Role::Tutor),
            "student" | "estudiante" => Some(Role::Student),
            "admin" | "administrador" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Claims issued by the identity service. Only the fields this service reads
/// are declared; everything else in the token is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String, // user id
    #[serde(default, alias = "nombre")]
    pub name: Option<String>,
    #[serde(alias = "rol")]
    pub role: Role,
    pub exp: usize,
    #[serde(default)]
    pub iat: usize,
}

/// Verified caller identity attached to a connection or HTTP request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub role: Role,
}

impl Identity {
    pub fn new(user_id: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            user_id: user_id.into(),
            display_name: display_name.into(),
            role,
        }
    }
}

impl From<Claims> for Identity {
    fn from(claims: Claims) -> Self {
        let display_name = claims
            .name
            .filter(|name| !name.trim().is_empty())
            .unwrap_or_else(|| claims.sub.clone());
        Identity {
            user_id: claims.sub,
            display_name,
            role: claims.role,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_role_accepts_platform_spellings() {
        let role: Role = serde_json::from_str("\"estudiante\"").unwrap();
        assert_eq!(role, Role::Student);
        let role: Role = serde_json::from_str("\"Tutor\"").unwrap();
        assert_eq!(role, Role::Tutor);
        assert_eq!(Role::parse(" ADMIN "), Some(Role::Admin));
        assert_eq!(Role::parse("guest"), None);
    }

    #[test]
    fn test_identity_falls_back_to_subject_for_missing_name() {
        let claims = Claims {
            sub: "u-1".to_string(),
            name: Some("  ".to_string()),
            role: Role::Tutor,
            exp: 0,
            iat: 0,
        };
        let identity = Identity::from(claims);
        assert_eq!(identity.display_name, "u-1");
        assert_eq!(identity.role, Role::Tutor);
    }
}
