//! # Channel Addressing
//!
//! Destination queue addressing for envelopes. A channel is either the
//! null sentinel (unaddressed until an external router assigns one) or a
//! named queue. Monitoring dispatchers are bound to one channel and only
//! execute envelopes addressed to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Address of a destination queue.
///
/// Ordering and equality are structural: `Null` sorts before every named
/// channel, named channels compare by name (case-sensitive). Channels are
/// immutable once constructed.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Channel {
    /// Unaddressed sentinel; an external router must resolve it before
    /// the first send.
    Null,
    /// A named destination queue.
    Named {
        /// Case-sensitive queue name.
        name: String,
    },
}

/// How two channels are compared when checking dispatcher affinity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ChannelMatchStrategy {
    /// Variant and name must both match.
    #[default]
    NameAndType,
    /// Only the names are compared; two null channels also match.
    NameOnly,
}

impl Channel {
    /// Create a named channel.
    pub fn named(name: impl Into<String>) -> Self {
        Self::Named { name: name.into() }
    }

    /// The channel name, if this is a named channel.
    pub fn name(&self) -> Option<&str> {
        match self {
            Self::Null => None,
            Self::Named { name } => Some(name),
        }
    }

    /// Whether this channel still needs routing before it can be sent to.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Compare against another channel under the given match strategy.
    pub fn matches(&self, other: &Channel, strategy: ChannelMatchStrategy) -> bool {
        match strategy {
            ChannelMatchStrategy::NameAndType => self == other,
            ChannelMatchStrategy::NameOnly => match (self.name(), other.name()) {
                (Some(a), Some(b)) => a == b,
                (None, None) => true,
                _ => false,
            },
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "<null channel>"),
            Self::Named { name } => write!(f, "{name}"),
        }
    }
}
