//! Form validation for sign-in and sign-up
//!
//! [`Credential`] and [`Registration`] can only be obtained by validating
//! raw form input, so the gateway never sees an unchecked value and a
//! rejected form never reaches the network.

use backend_client::UserRole;
use std::fmt;
use thiserror::Error;

/// Minimum password length accepted at sign-up
pub const MIN_PASSWORD_LEN: usize = 6;

/// Form field names used in validation messages
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    /// Full name
    FullName,
    /// Email address
    Email,
    /// Password
    Password,
    /// Password confirmation
    ConfirmPassword,
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Field::FullName => "Full name",
            Field::Email => "Email",
            Field::Password => "Password",
            Field::ConfirmPassword => "Password confirmation",
        })
    }
}

/// Local validation failure, detected before any network call
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is blank
    #[error("Please fill in all fields ({0} is empty)")]
    EmptyField(Field),

    /// Password and confirmation differ
    #[error("Password and confirmation do not match")]
    PasswordMismatch,

    /// Password under the minimum length
    #[error("Password must be at least {min} characters")]
    PasswordTooShort {
        /// Required length
        min: usize,
    },
}

/// Email and password for sign-in
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    email: String,
    secret: String,
}

impl Credential {
    /// Validate sign-in input
    ///
    /// The email is trimmed. A password of only whitespace counts as empty,
    /// but a real password is kept exactly as typed.
    pub fn new(email: &str, secret: &str) -> Result<Self, ValidationError> {
        let email = email.trim();
        if email.is_empty() {
            return Err(ValidationError::EmptyField(Field::Email));
        }
        if secret.trim().is_empty() {
            return Err(ValidationError::EmptyField(Field::Password));
        }
        Ok(Self { email: email.to_string(), secret: secret.to_string() })
    }

    /// Trimmed email
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Password
    pub fn secret(&self) -> &str {
        &self.secret
    }
}

// Keep the password out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential").field("email", &self.email).finish_non_exhaustive()
    }
}

/// Raw sign-up form input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationForm {
    /// Full name
    pub full_name: String,
    /// Email
    pub email: String,
    /// Password
    pub password: String,
    /// Password again
    pub confirm_password: String,
    /// Selected role
    pub role: UserRole,
}

impl RegistrationForm {
    /// Check the form
    ///
    /// Order: blank fields, then mismatch, then length. A role that cannot
    /// be self-assigned falls back to student.
    pub fn validate(&self) -> Result<Registration, ValidationError> {
        let full_name = self.full_name.trim();
        let email = self.email.trim();

        let required = [
            (Field::FullName, full_name),
            (Field::Email, email),
            (Field::Password, self.password.trim()),
            (Field::ConfirmPassword, self.confirm_password.trim()),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.is_empty()) {
            return Err(ValidationError::EmptyField(*field));
        }

        if self.password != self.confirm_password {
            return Err(ValidationError::PasswordMismatch);
        }

        if self.password.chars().count() < MIN_PASSWORD_LEN {
            return Err(ValidationError::PasswordTooShort { min: MIN_PASSWORD_LEN });
        }

        let role = if self.role.is_self_assignable() { self.role } else { UserRole::Student };

        Ok(Registration {
            full_name: full_name.to_string(),
            email: email.to_string(),
            password: self.password.clone(),
            role,
        })
    }
}

/// Validated sign-up data
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    full_name: String,
    email: String,
    password: String,
    role: UserRole,
}

impl Registration {
    /// Trimmed full name
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    /// Trimmed email
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Password
    pub fn password(&self) -> &str {
        &self.password
    }

    /// Role the new account is tagged with
    pub fn role(&self) -> UserRole {
        self.role
    }
}

impl fmt::Debug for Registration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registration")
            .field("full_name", &self.full_name)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}
