//! Opaque identifiers used for peers, containers, channels, and messages.
//!
//! An `Id` is a comparable, string-like token. In practice it is a UUID, but
//! the wire format only ever sees it as length-prefixed UTF-8 bytes (same
//! shape as `String`), so the type itself stays opaque.

use bytes::Bytes;
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Id(Bytes);

impl Id {
    #[must_use]
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    #[must_use]
    pub fn as_bytes(&self) -> &Bytes {
        &self.0
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        std::str::from_utf8(&self.0).unwrap_or("<invalid-utf8>")
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for Id {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl From<String> for Id {
    fn from(s: String) -> Self {
        Self(Bytes::from(s.into_bytes()))
    }
}

/// Injected at construction so no process-wide ID generator singleton is
/// needed; the broker `ID`, client registry, and container registry each
/// hold their own `Arc<dyn IdGenerator>`.
pub trait IdGenerator: Send + Sync {
    fn generate(&self) -> Id;
}

/// Default generator: random UUIDv4, rendered in hyphenated form.
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl IdGenerator for UuidGenerator {
    fn generate(&self) -> Id {
        Id::from(uuid::Uuid::new_v4().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generator_produces_unique_ids() {
        let gen = UuidGenerator;
        let a = gen.generate();
        let b = gen.generate();
        assert_ne!(a, b);
    }

    #[test]
    fn id_round_trips_through_str() {
        let id = Id::from("P1");
        assert_eq!(id.as_str(), "P1");
        assert_eq!(id.as_bytes().as_ref(), b"P1");
    }
}
