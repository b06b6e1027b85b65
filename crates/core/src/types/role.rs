//! Identity roles.

use serde::{Deserialize, Serialize};

/// Role of an identity within its store.
///
/// Self-service registration always produces [`Role::Employee`]; admins are
/// created through the operator CLI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "postgres", derive(sqlx::Type))]
#[cfg_attr(
    feature = "postgres",
    sqlx(type_name = "user_role", rename_all = "snake_case")
)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Store administrator.
    Admin,
    /// Regular staff member.
    #[default]
    Employee,
}

impl Role {
    /// Wire/database name of the role.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Employee => "employee",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(Self::Admin),
            "employee" => Ok(Self::Employee),
            _ => Err(format!("invalid role: {s}")),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_unprivileged() {
        assert_eq!(Role::default(), Role::Employee);
    }

    #[test]
    fn test_round_trips_through_str() {
        for role in [Role::Admin, Role::Employee] {
            assert_eq!(role.to_string().parse::<Role>().unwrap(), role);
        }
        assert!("super_admin".parse::<Role>().is_err());
    }
}
