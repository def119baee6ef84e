use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// How a spawned unit of work is executed.
///
/// The policy chosen for a root call is used for every spawn in its call tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Policy {
    /// Runs on the spawning thread before `spawn` returns.
    Immediate,
    /// Runs on whichever thread first observes the handle; never if nobody does.
    Deferred,
    /// Handed to the worker pool; the spawner continues until it observes the handle.
    Async,
    /// Async while the admission counter has capacity, Deferred otherwise.
    #[serde(rename = "optional")]
    AsyncOrDeferred,
}

impl Policy {
    /// All policies, in harness reporting order.
    pub const ALL: [Policy; 4] = [
        Policy::Immediate,
        Policy::Deferred,
        Policy::AsyncOrDeferred,
        Policy::Async,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Policy::Immediate => "immediate",
            Policy::Deferred => "deferred",
            Policy::Async => "async",
            Policy::AsyncOrDeferred => "optional",
        }
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Policy {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "immediate" | "sync" => Ok(Policy::Immediate),
            "deferred" => Ok(Policy::Deferred),
            "async" => Ok(Policy::Async),
            "optional" | "async_or_deferred" => Ok(Policy::AsyncOrDeferred),
            other => Err(EngineError::InvalidInput(format!("unknown launch policy '{}'", other))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn names_round_trip_through_from_str() {
        for policy in Policy::ALL {
            assert_eq!(policy.name().parse::<Policy>().unwrap(), policy);
        }
    }

    #[test]
    fn parse_is_case_insensitive() {
        assert_eq!(" Async ".parse::<Policy>().unwrap(), Policy::Async);
        assert_eq!("OPTIONAL".parse::<Policy>().unwrap(), Policy::AsyncOrDeferred);
    }

    #[test]
    fn unknown_policy_is_rejected() {
        assert!(matches!("eager".parse::<Policy>(), Err(EngineError::InvalidInput(_))));
    }

    #[test]
    fn serde_uses_harness_names() {
        let json = serde_json::to_string(&Policy::AsyncOrDeferred).unwrap();
        assert_eq!(json, "\"optional\"");
        let back: Policy = serde_json::from_str("\"deferred\"").unwrap();
        assert_eq!(back, Policy::Deferred);
    }
}
