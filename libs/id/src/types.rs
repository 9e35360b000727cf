//! Typed ID definitions for the actor runtime.

use std::borrow::Borrow;
use std::fmt;
use std::str::FromStr;

use uuid::Uuid;

use crate::{define_id, IdError};

// =============================================================================
// Runtime-minted IDs
// =============================================================================

define_id!(IncarnationId, "inc");
define_id!(SystemId, "sys");

// =============================================================================
// Actor ID
// =============================================================================

/// Name of an actor, unique within one actor system.
///
/// Any non-empty string without control characters or surrounding
/// whitespace is accepted. The id survives restarts, unlike the
/// executor's [`IncarnationId`].
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ActorId(String);

impl ActorId {
    /// Validates and wraps an actor name.
    pub fn new(id: impl Into<String>) -> Result<Self, IdError> {
        let id = id.into();
        Self::validate(&id)?;
        Ok(Self(id))
    }

    fn validate(id: &str) -> Result<(), IdError> {
        if id.is_empty() {
            return Err(IdError::Empty);
        }
        if id.trim() != id {
            return Err(IdError::InvalidFormat {
                message: format!("actor id '{id}' has surrounding whitespace"),
            });
        }
        if id.chars().any(char::is_control) {
            return Err(IdError::InvalidFormat {
                message: "actor id contains control characters".to_string(),
            });
        }
        Ok(())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The actor's address: the lower-cased id in angle brackets.
    #[must_use]
    pub fn address(&self) -> String {
        format!("<{}>", self.0.to_lowercase())
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for ActorId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<&str> for ActorId {
    type Error = IdError;

    fn try_from(s: &str) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl TryFrom<String> for ActorId {
    type Error = IdError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::new(s)
    }
}

impl AsRef<str> for ActorId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Borrow<str> for ActorId {
    fn borrow(&self) -> &str {
        &self.0
    }
}

impl serde::Serialize for ActorId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> serde::Deserialize<'de> for ActorId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::new(s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Request ID
// =============================================================================

/// Correlates an ask with the reply slot waiting for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RequestId(Uuid);

impl RequestId {
    /// Generates a random (v4) request id.
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Parses the hyphenated UUID form.
    pub fn parse(s: &str) -> Result<Self, IdError> {
        if s.is_empty() {
            return Err(IdError::Empty);
        }
        Uuid::parse_str(s)
            .map(Self)
            .map_err(|e| IdError::InvalidUuid(e.to_string()))
    }
}

impl Default for RequestId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.hyphenated().fmt(f)
    }
}

impl FromStr for RequestId {
    type Err = IdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl serde::Serialize for RequestId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for RequestId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::parse(&s).map_err(serde::de::Error::custom)
    }
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_incarnation_id_roundtrip() {
        let id = IncarnationId::new();
        let parsed: IncarnationId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!(id.to_string().starts_with("inc_"));
    }

    #[test]
    fn test_incarnation_id_invalid_prefix() {
        let result: Result<IncarnationId, _> = "sys_01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert!(matches!(
            result.unwrap_err(),
            IdError::InvalidPrefix { expected: "inc", .. }
        ));
    }

    #[test]
    fn test_incarnation_id_missing_separator() {
        let result: Result<IncarnationId, _> = "inc01HV4Z2WQXKJNM8GPQY6VBKC3D".parse();
        assert_eq!(result.unwrap_err(), IdError::MissingSeparator);
    }

    #[test]
    fn test_incarnation_id_invalid_ulid() {
        let result: Result<IncarnationId, _> = "inc_invalid".parse();
        assert!(matches!(result.unwrap_err(), IdError::InvalidUlid(_)));
    }

    #[test]
    fn test_incarnations_are_time_ordered() {
        let first = IncarnationId::new();
        std::thread::sleep(std::time::Duration::from_millis(2));
        let second = IncarnationId::new();
        assert!(first < second);
        assert!(first.minted_at_ms() <= second.minted_at_ms());
    }

    #[test]
    fn test_actor_id_address_is_lowercased() {
        let id = ActorId::new("Counter-Actor").unwrap();
        assert_eq!(id.address(), "<counter-actor>");
        assert_eq!(id.as_str(), "Counter-Actor");
    }

    #[test]
    fn test_actor_id_rejects_empty() {
        assert_eq!(ActorId::new("").unwrap_err(), IdError::Empty);
        assert!(ActorId::new("").unwrap_err().is_empty());
    }

    #[test]
    fn test_actor_id_rejects_padding_and_control_chars() {
        assert!(matches!(
            ActorId::new(" counter").unwrap_err(),
            IdError::InvalidFormat { .. }
        ));
        assert!(matches!(
            ActorId::new("count\ner").unwrap_err(),
            IdError::InvalidFormat { .. }
        ));
    }

    #[test]
    fn test_actor_id_json_roundtrip() {
        let id = ActorId::new("worker-7").unwrap();
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"worker-7\"");
        let parsed: ActorId = serde_json::from_str(&json).unwrap();
        assert_eq!(id, parsed);
        assert!(serde_json::from_str::<ActorId>("\"\"").is_err());
    }

    #[test]
    fn test_actor_id_borrows_as_str() {
        let mut map = std::collections::HashMap::new();
        map.insert(ActorId::new("a").unwrap(), 1);
        assert_eq!(map.get("a"), Some(&1));
    }

    #[test]
    fn test_request_ids_are_unique() {
        let ids: std::collections::HashSet<_> = (0..1000).map(|_| RequestId::new()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn test_request_id_parse_errors() {
        assert_eq!(RequestId::parse("").unwrap_err(), IdError::Empty);
        assert!(matches!(
            RequestId::parse("not-a-uuid").unwrap_err(),
            IdError::InvalidUuid(_)
        ));
    }

    #[test]
    fn test_id_prefixes_unique() {
        assert_ne!(IncarnationId::PREFIX, SystemId::PREFIX);
    }

    proptest! {
        #[test]
        fn prop_actor_id_accepts_printable_names(name in "[a-zA-Z0-9][a-zA-Z0-9 _./-]{0,30}[a-zA-Z0-9]") {
            let id = ActorId::new(name.clone()).unwrap();
            prop_assert_eq!(id.as_str(), name.as_str());
            prop_assert_eq!(id.address(), format!("<{}>", name.to_lowercase()));
        }

        #[test]
        fn prop_request_id_display_parses_back(bytes in any::<[u8; 16]>()) {
            let id = RequestId(uuid::Builder::from_random_bytes(bytes).into_uuid());
            prop_assert_eq!(RequestId::parse(&id.to_string()).unwrap(), id);
        }
    }
}
