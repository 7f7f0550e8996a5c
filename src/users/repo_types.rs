use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::oauth::ExternalProfile;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Teacher,
    Student,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Teacher => "teacher",
            Role::Student => "student",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "teacher" => Ok(Role::Teacher),
            "student" => Ok(Role::Student),
            other => Err(format!("unknown role '{other}'")),
        }
    }
}

/// User record as stored and as returned to clients.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: String,
    pub tests_created: i32,
    pub tests_completed: i32,
    pub average_score: f64,
    #[serde(with = "time::serde::rfc3339")]
    pub joined_at: OffsetDateTime,
    pub role: Role,
    /// Argon2 hash; `None` for accounts created through OAuth.
    #[serde(skip)]
    pub password_hash: Option<String>,
}

impl User {
    fn blank(name: String, email: String, role: Role) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            email,
            profile_picture: String::new(),
            bio: String::new(),
            tests_created: 0,
            tests_completed: 0,
            average_score: 0.0,
            joined_at: OffsetDateTime::now_utc(),
            role,
            password_hash: None,
        }
    }

    /// New account from the signup form.
    pub fn local(name: String, email: String, role: Role, password_hash: String) -> Self {
        Self {
            password_hash: Some(password_hash),
            ..Self::blank(name, email, role)
        }
    }

    /// New account from a first OAuth login. Always a student.
    pub fn from_profile(profile: &ExternalProfile) -> Self {
        Self {
            profile_picture: profile.picture.clone().unwrap_or_default(),
            ..Self::blank(profile.name.clone(), profile.email.clone(), Role::Student)
        }
    }
}

/// Row shape of the `users` table.
#[derive(Debug, FromRow)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    pub profile_picture: String,
    pub bio: String,
    pub tests_created: i32,
    pub tests_completed: i32,
    pub average_score: f64,
    pub joined_at: OffsetDateTime,
    pub role: String,
    pub password_hash: Option<String>,
}

impl TryFrom<UserRow> for User {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self, Self::Error> {
        let role = r
            .role
            .parse::<Role>()
            .map_err(|e| anyhow::anyhow!("user {}: {e}", r.id))?;
        Ok(Self {
            id: r.id,
            name: r.name,
            email: r.email,
            profile_picture: r.profile_picture,
            bio: r.bio,
            tests_created: r.tests_created,
            tests_completed: r.tests_completed,
            average_score: r.average_score,
            joined_at: r.joined_at,
            role,
            password_hash: r.password_hash,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_parses_case_insensitively() {
        assert_eq!("Teacher".parse::<Role>().unwrap(), Role::Teacher);
        assert_eq!(" student ".parse::<Role>().unwrap(), Role::Student);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn serialized_user_hides_password_and_uses_camel_case() {
        let user = User::local(
            "Ada Lovelace".into(),
            "ada@example.com".into(),
            Role::Student,
            "$argon2id$v=19$secret".into(),
        );
        let json = serde_json::to_value(&user).unwrap();
        assert_eq!(json["email"], "ada@example.com");
        assert_eq!(json["role"], "student");
        assert_eq!(json["testsCreated"], 0);
        assert_eq!(json["averageScore"], 0.0);
        assert!(json.get("passwordHash").is_none());
        assert!(!json.to_string().contains("argon2"));
    }

    #[test]
    fn profile_user_defaults_to_student_without_password() {
        let profile = ExternalProfile {
            id: "1234".into(),
            name: "Grace Hopper".into(),
            email: "grace@example.com".into(),
            picture: Some("https://img.example.com/g.png".into()),
        };
        let user = User::from_profile(&profile);
        assert_eq!(user.role, Role::Student);
        assert!(user.password_hash.is_none());
        assert_eq!(user.profile_picture, "https://img.example.com/g.png");
    }

    #[test]
    fn row_with_unknown_role_is_rejected() {
        let row = UserRow {
            id: Uuid::new_v4(),
            name: "x".into(),
            email: "x@example.com".into(),
            profile_picture: String::new(),
            bio: String::new(),
            tests_created: 0,
            tests_completed: 0,
            average_score: 0.0,
            joined_at: OffsetDateTime::now_utc(),
            role: "janitor".into(),
            password_hash: None,
        };
        assert!(User::try_from(row).is_err());
    }
}
