// models/src/medical/role.rs
use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::errors::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Admin,
    Chw,
    Clinician,
    Mother,
    Guest,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Admin => "admin",
            Role::Chw => "chw",
            Role::Clinician => "clinician",
            Role::Mother => "mother",
            Role::Guest => "guest",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "admin" => Ok(Role::Admin),
            "chw" => Ok(Role::Chw),
            "clinician" => Ok(Role::Clinician),
            "mother" => Ok(Role::Mother),
            "guest" => Ok(Role::Guest),
            other => Err(ValidationError::InvalidIdentifier(other.to_string())),
        }
    }
}
