use crate::RC;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};

static NEXT_NUM_VAR: AtomicU64 = AtomicU64::new(1);
static NEXT_MEM_VAR: AtomicU64 = AtomicU64::new(1);

macro_rules! variable {
    ($(#[$doc:meta])* $name:ident, $counter:ident, $prefix:expr) => {
        $(#[$doc])*
        #[derive(Clone, Deserialize, Serialize)]
        pub struct $name {
            stamp: u64,
            name: RC<str>,
        }

        impl $name {
            /// Allocate a new variable, distinct from every variable allocated
            /// before it.
            pub fn fresh<S: AsRef<str>>(name: S) -> $name {
                $name {
                    stamp: $counter.fetch_add(1, AtomicOrdering::Relaxed),
                    name: RC::from(name.as_ref()),
                }
            }

            /// Allocate a new, anonymous variable.
            pub fn anonymous() -> $name {
                $name::fresh("")
            }

            /// The unique identity of this variable. Variables are ordered by
            /// stamp, which is their allocation order.
            pub fn stamp(&self) -> u64 {
                self.stamp
            }

            pub fn name(&self) -> &str {
                &self.name
            }
        }

        impl PartialEq for $name {
            fn eq(&self, other: &$name) -> bool {
                self.stamp == other.stamp
            }
        }

        impl Eq for $name {}

        impl Hash for $name {
            fn hash<H: Hasher>(&self, state: &mut H) {
                self.stamp.hash(state)
            }
        }

        impl Ord for $name {
            fn cmp(&self, other: &$name) -> Ordering {
                self.stamp.cmp(&other.stamp)
            }
        }

        impl PartialOrd for $name {
            fn partial_cmp(&self, other: &$name) -> Option<Ordering> {
                Some(self.cmp(other))
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                if self.name.is_empty() {
                    write!(f, "{}{}", $prefix, self.stamp)
                } else {
                    write!(f, "{}", self.name)
                }
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
                write!(f, "{}#{}", self, self.stamp)
            }
        }
    };
}

variable!(
    /// An abstract scalar value: a register, a temporary or a memory field.
    ///
    /// Two `NumVar`s are equal only if they come from the same call to
    /// `fresh`. The name is for display only.
    NumVar,
    NEXT_NUM_VAR,
    "t"
);

variable!(
    /// An abstract memory region: a segment, a stack frame or a heap object.
    MemVar,
    NEXT_MEM_VAR,
    "r"
);
