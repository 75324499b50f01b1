// src/models/mod.rs
// DOCUMENTATION: Models module organization
// PURPOSE: Re-export model components

/// Declares a closed set of values stored as TEXT and exchanged as snake_case strings
macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $value:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
        pub enum $name {
            $(#[serde(rename = $value)] $variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $value),+
                }
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = crate::errors::CrmError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($value => Ok($name::$variant),)+
                    other => Err(crate::errors::CrmError::InvalidInput(format!(
                        "unknown {} '{}'",
                        stringify!($name),
                        other
                    ))),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = crate::errors::CrmError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }
    };
}

pub mod autofill;
pub mod campaign;
pub mod common;
pub mod compliance;
pub mod interaction;
pub mod mandate;
pub mod notification;
pub mod organisation;
pub mod person;
pub mod webhook;

pub use autofill::*;
pub use campaign::*;
pub use common::*;
pub use compliance::*;
pub use interaction::*;
pub use mandate::*;
pub use notification::*;
pub use organisation::*;
pub use person::*;
pub use webhook::*;
