//! # Identity Newtypes
//!
//! [`Principal`] is the opaque identity on whose behalf an escrow operation
//! is invoked. The runtime supplies a verified principal with every call;
//! this crate only guarantees it is a well-formed, non-empty token.
//!
//! [`EscrowId`] addresses one escrow instance inside a host. It is UUID-based
//! and always valid by construction.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ValidationError;

// ---------------------------------------------------------------------------
// Principal (validated at construction)
// ---------------------------------------------------------------------------

/// An identity that can act as seller or buyer.
///
/// # Validation
///
/// - Must be non-empty.
/// - Must not contain whitespace or control characters.
///
/// Deserialization goes through the same validation, so a scenario file
/// cannot smuggle in an empty principal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Principal(String);

impl Principal {
    /// Create a principal from a string, validating format.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::EmptyPrincipal`] for an empty string and
    /// [`ValidationError::MalformedPrincipal`] if it contains whitespace or
    /// control characters.
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let s = value.into();
        if s.is_empty() {
            return Err(ValidationError::EmptyPrincipal);
        }
        if s.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(ValidationError::MalformedPrincipal(s));
        }
        Ok(Self(s))
    }

    /// Access the identifier string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Principal {
    type Error = ValidationError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Principal> for String {
    fn from(p: Principal) -> Self {
        p.0
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// EscrowId (always valid by construction)
// ---------------------------------------------------------------------------

/// A unique identifier for an escrow instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EscrowId(Uuid);

impl EscrowId {
    /// Create a new random escrow identifier.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EscrowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EscrowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "escrow:{}", self.0)
    }
}
