use std::borrow::Cow;

use serde::{Deserialize, Serialize};

/// Capability identifier.
///
/// Capabilities are modeled as opaque strings (e.g. "payments.charge").
/// A special wildcard capability `"*"` can be used by policy layers to
/// indicate "allow all" without hardcoding domain capabilities into tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub fn new(name: impl Into<Cow<'static, str>>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_wildcard(&self) -> bool {
        self.as_str() == "*"
    }
}

impl core::fmt::Display for Capability {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Capabilities recognized by the payment proxy.
pub mod payments {
    use super::Capability;

    pub const CHARGE: Capability = Capability(std::borrow::Cow::Borrowed("payments.charge"));
    pub const READ: Capability = Capability(std::borrow::Cow::Borrowed("payments.read"));
}

/// Capabilities recognized by the print queue.
pub mod queue {
    use super::Capability;

    pub const ENQUEUE: Capability = Capability(std::borrow::Cow::Borrowed("queue.enqueue"));
    pub const WORK: Capability = Capability(std::borrow::Cow::Borrowed("queue.work"));
    pub const READ: Capability = Capability(std::borrow::Cow::Borrowed("queue.read"));
}
