// models/src/identifiers.rs

use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::errors::{ValidationError, ValidationResult};

/// Declares an opaque, UUID-backed identifier for one entity kind so that a
/// visit id can never be passed where a mother id is expected.
macro_rules! uuid_identifier {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            /// Generates a fresh random identifier.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(value: Uuid) -> Self {
                Self(value)
            }
        }

        impl FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> ValidationResult<Self> {
                Uuid::parse_str(s)
                    .map(Self)
                    .map_err(|_| ValidationError::InvalidIdentifier(s.to_string()))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_identifier!(
    /// Identity of a platform user (CHW, clinician, admin, mother account).
    UserId
);
uuid_identifier!(MotherId);
uuid_identifier!(FacilityId);
uuid_identifier!(TerritoryId);
uuid_identifier!(VisitId);
uuid_identifier!(
    /// Identity of a single recorded set of vital signs.
    MetricId
);
