//! Records exchanged with the backend

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// User role
///
/// Roles are assigned by the backend. Any value this client does not know
/// about reads as [`UserRole::Student`], the least privileged dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase", from = "String")]
pub enum UserRole {
    /// Books sessions
    #[default]
    Student,
    /// Gives sessions
    Teacher,
    /// Oversees the platform
    Admin,
}

impl UserRole {
    /// Wire name of the role
    pub fn as_str(&self) -> &'static str {
        match self {
            UserRole::Student => "student",
            UserRole::Teacher => "teacher",
            UserRole::Admin => "admin",
        }
    }

    /// Parse a role, mapping unknown values to `Student`
    pub fn parse_lossy(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "teacher" => UserRole::Teacher,
            "admin" => UserRole::Admin,
            _ => UserRole::Student,
        }
    }

    /// Whether the role may be picked on the sign-up form
    pub fn is_self_assignable(&self) -> bool {
        !matches!(self, UserRole::Admin)
    }
}

impl From<String> for UserRole {
    fn from(value: String) -> Self {
        UserRole::parse_lossy(&value)
    }
}

impl From<&str> for UserRole {
    fn from(value: &str) -> Self {
        UserRole::parse_lossy(value)
    }
}

impl fmt::Display for UserRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authenticated principal issued by the identity provider
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// Opaque user id, shared with [`UserProfile::id`]
    pub id: String,
    /// Email address the identity signed in with
    pub email: String,
}

impl Identity {
    /// Create an identity
    pub fn new(id: impl Into<String>, email: impl Into<String>) -> Self {
        Self { id: id.into(), email: email.into() }
    }
}

/// Application-level user record (`user_profiles` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    /// Same id as the identity
    pub id: String,
    /// Display name
    pub full_name: String,
    /// Contact email
    pub email: String,
    /// Phone number
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phone: Option<String>,
    /// Avatar image URL
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
    /// Role deciding which dashboard is shown
    pub role: UserRole,
    /// Whether the account is enabled
    #[serde(default = "default_active")]
    pub is_active: bool,
    /// Creation time
    pub created_at: DateTime<Utc>,
    /// Last update time
    pub updated_at: DateTime<Utc>,
}

fn default_active() -> bool {
    true
}

/// Insert payload for a fresh `user_profiles` row
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewUserProfile {
    /// Identity id
    pub id: String,
    /// Display name
    pub full_name: String,
    /// Contact email
    pub email: String,
    /// Chosen role
    pub role: UserRole,
    /// New accounts start enabled
    pub is_active: bool,
}

/// Teacher details (`teacher_profiles` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TeacherProfile {
    /// Same id as the user profile
    pub id: String,
    /// Free-form biography
    #[serde(default)]
    pub bio: Option<String>,
    /// Teaching experience
    #[serde(default)]
    pub years_of_experience: u32,
    /// Price per hour
    #[serde(default)]
    pub hourly_rate: f64,
    /// Degree or certificate
    #[serde(default)]
    pub qualification: Option<String>,
    /// Verified by an admin
    #[serde(default)]
    pub is_verified: bool,
    /// Sessions given
    #[serde(default)]
    pub total_sessions: u32,
    /// Mean review rating
    #[serde(default)]
    pub average_rating: f64,
    /// Lifetime earnings
    #[serde(default)]
    pub total_earnings: f64,
    /// Accepting bookings
    #[serde(default)]
    pub is_available: bool,
}

/// Student details (`student_profiles` row)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StudentProfile {
    /// Same id as the user profile
    pub id: String,
    /// School grade
    #[serde(default)]
    pub grade_level: Option<String>,
    /// Sessions taken
    #[serde(default)]
    pub total_sessions: u32,
    /// Lifetime spend
    #[serde(default)]
    pub total_spent: f64,
}

/// Role-specific record of a user
#[derive(Debug, Clone, PartialEq)]
pub enum RoleRecord {
    /// Row of `teacher_profiles`
    Teacher(TeacherProfile),
    /// Row of `student_profiles`
    Student(StudentProfile),
}

impl RoleRecord {
    /// Id shared with the user profile
    pub fn id(&self) -> &str {
        match self {
            RoleRecord::Teacher(t) => &t.id,
            RoleRecord::Student(s) => &s.id,
        }
    }
}

/// Minimal insert payload for the role-specific row created at sign-up
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoleRecordInsert {
    /// Same id as the user profile
    pub id: String,
}

/// Table holding the role-specific record for `role`, if any
pub fn role_table(role: UserRole) -> Option<&'static str> {
    match role {
        UserRole::Student => Some("student_profiles"),
        UserRole::Teacher => Some("teacher_profiles"),
        UserRole::Admin => None,
    }
}
