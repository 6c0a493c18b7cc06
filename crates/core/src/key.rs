//! Strongly-typed UUID keys for entities.

use thiserror::Error;

/// Error parsing a textual key.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid key: {0}")]
pub struct KeyParseError(pub String);

/// Generate a strongly-typed UUID key newtype.
///
/// The generated type derives `Debug`, `Copy`, `Clone`, `PartialEq`, `Eq`,
/// `Hash`, and transparent serde, and provides `new()` (UUIDv7,
/// time-ordered), `from_uuid`, `as_uuid`, `Display`, `From`/`Into<Uuid>`,
/// and `FromStr` returning [`KeyParseError`].
///
/// The expanding crate must depend on `uuid` and `serde` (with the `derive`
/// feature).
///
/// ```ignore
/// groundwork_core::uuid_key! {
///     /// Identifier of a customer.
///     pub struct CustomerId
/// }
/// ```
///
/// Prefer passing keys explicitly in tests for determinism.
#[macro_export]
macro_rules! uuid_key {
    ($(#[$meta:meta])* $vis:vis struct $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Copy, Clone, PartialEq, Eq, Hash,
            ::serde::Serialize, ::serde::Deserialize,
        )]
        #[serde(transparent)]
        $vis struct $name(::uuid::Uuid);

        impl $name {
            /// Create a new key.
            ///
            /// Uses UUIDv7 (time-ordered).
            $vis fn new() -> Self {
                Self(::uuid::Uuid::now_v7())
            }

            $vis fn from_uuid(uuid: ::uuid::Uuid) -> Self {
                Self(uuid)
            }

            $vis fn as_uuid(&self) -> &::uuid::Uuid {
                &self.0
            }
        }

        impl ::core::fmt::Display for $name {
            fn fmt(&self, f: &mut ::core::fmt::Formatter<'_>) -> ::core::fmt::Result {
                ::core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl ::core::convert::From<::uuid::Uuid> for $name {
            fn from(value: ::uuid::Uuid) -> Self {
                Self(value)
            }
        }

        impl ::core::convert::From<$name> for ::uuid::Uuid {
            fn from(value: $name) -> Self {
                value.0
            }
        }

        impl ::core::str::FromStr for $name {
            type Err = $crate::key::KeyParseError;

            fn from_str(s: &str) -> ::core::result::Result<Self, Self::Err> {
                let uuid = <::uuid::Uuid as ::core::str::FromStr>::from_str(s).map_err(|e| {
                    $crate::key::KeyParseError(::std::format!("{}: {}", stringify!($name), e))
                })?;
                Ok(Self(uuid))
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use std::str::FromStr;

    use uuid::Uuid;

    crate::uuid_key! {
        /// Identifier of a customer (test fixture).
        pub struct CustomerId
    }

    #[test]
    fn round_trips_through_uuid() {
        let uuid = Uuid::now_v7();
        let id = CustomerId::from_uuid(uuid);

        assert_eq!(id.as_uuid(), &uuid);
        assert_eq!(Uuid::from(id), uuid);
        assert_eq!(CustomerId::from(uuid), id);
    }

    #[test]
    fn parses_from_string() {
        let id = CustomerId::new();
        let parsed = CustomerId::from_str(&id.to_string()).unwrap();

        assert_eq!(parsed, id);
    }

    #[test]
    fn rejects_malformed_text() {
        let err = CustomerId::from_str("not-a-uuid").unwrap_err();

        assert!(err.to_string().contains("CustomerId"));
    }

    #[test]
    fn serde_is_transparent() {
        let id = CustomerId::new();
        let json = serde_json::to_string(&id).unwrap();

        assert_eq!(json, format!("\"{id}\""));
        assert_eq!(serde_json::from_str::<CustomerId>(&json).unwrap(), id);
    }
}
