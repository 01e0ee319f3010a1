use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What happens when an action is dispatched while an earlier call of the
/// same action is still in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// Fail the new call with a conflict error.
    Reject,
    /// Resolve the new call as a no-op.
    Ignore,
    /// Hold only the most recent call; run it once the slot frees up.
    KeepLast,
    /// Queue every call and run them in dispatch order.
    #[default]
    KeepAll,
    /// Calls with distinct instance ids run independently.
    ///
    /// Calls sharing an instance id are not checked against each other: the
    /// newer one takes over the slot while the older keeps running.
    Parallel,
    /// Hand back the in-flight call when the arguments are equal; otherwise
    /// fall back to another policy (keep-all unless configured).
    Reuse,
}

impl ConflictPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Reject => "reject",
            Self::Ignore => "ignore",
            Self::KeepLast => "keep_last",
            Self::KeepAll => "keep_all",
            Self::Parallel => "parallel",
            Self::Reuse => "reuse",
        }
    }

    /// Policies that can stand in when reuse finds no matching call.
    pub(crate) fn as_fallback(self) -> Self {
        match self {
            Self::Reuse | Self::Parallel => Self::KeepAll,
            other => other,
        }
    }
}

impl fmt::Display for ConflictPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ConflictPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "reject" => Ok(Self::Reject),
            "ignore" => Ok(Self::Ignore),
            "keep_last" => Ok(Self::KeepLast),
            "keep_all" => Ok(Self::KeepAll),
            "parallel" => Ok(Self::Parallel),
            "reuse" => Ok(Self::Reuse),
            other => Err(format!("unknown conflict policy: {other}")),
        }
    }
}
