//! Strongly-typed ID wrappers for domain concepts.
//!
//! These newtypes keep session, run, thread, message and call identifiers
//! from being mixed up at compile time.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! define_id_type {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Wrap an identifier that was minted elsewhere.
            pub fn from_external(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn into_string(self) -> String {
                self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

define_id_type!(
    /// Remote sandbox session identifier (sent as `identifier` on every request).
    SessionId
);
define_id_type!(
    /// Agent run identifier.
    RunId
);
define_id_type!(
    /// Run step identifier.
    StepId
);
define_id_type!(
    /// Conversation thread identifier (owned by the conversation store).
    ThreadId
);
define_id_type!(
    /// Assistant or tool message identifier.
    MessageId
);
define_id_type!(
    /// Correlation id linking a sandbox call record to its result record.
    CallId
);

fn prefixed_uuid(prefix: &str) -> String {
    format!("{}_{}", prefix, Uuid::new_v4().simple())
}

impl SessionId {
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl RunId {
    pub fn new(millis: u64, counter: u64) -> Self {
        Self(format!("run_{}_{}", millis, counter))
    }
}

impl StepId {
    pub fn generate() -> Self {
        Self(prefixed_uuid("step"))
    }
}

impl MessageId {
    pub fn generate() -> Self {
        Self(prefixed_uuid("msg"))
    }
}
