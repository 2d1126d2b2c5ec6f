//! # Envelopes and Type Metadata
//!
//! An envelope is one serialized message plus its destination channel and
//! the type metadata needed to resolve a handler and a deserializer
//! without first deserializing the payload.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::channel::Channel;
use crate::dispatch::handler::BusMessage;

/// Namespace/name/full-name triple identifying a message type.
///
/// Built from `std::any::type_name` for registered Rust types: the module
/// path becomes the namespace and the last path segment the short name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TypeDescription {
    /// Module path of the type.
    pub namespace: String,
    /// Short type name.
    pub name: String,
    /// Fully-qualified type name.
    pub full_name: String,
}

/// How two type descriptions are compared during handler resolution and
/// share matching.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum TypeMatchStrategy {
    /// Namespace and short name must match.
    #[default]
    NamespaceAndName,
    /// The fully-qualified names must match.
    FullName,
}

impl TypeDescription {
    /// Describe a concrete Rust type.
    pub fn of<T: 'static>() -> Self {
        let full_name = std::any::type_name::<T>().to_string();
        let (namespace, name) = match full_name.rsplit_once("::") {
            Some((namespace, name)) => (namespace.to_string(), name.to_string()),
            None => (String::new(), full_name.clone()),
        };
        Self {
            namespace,
            name,
            full_name,
        }
    }

    /// All three fields populated; dispatch fails fast otherwise.
    pub fn is_complete(&self) -> bool {
        !self.namespace.is_empty() && !self.name.is_empty() && !self.full_name.is_empty()
    }

    /// Compare against another description under the given strategy.
    pub fn matches(&self, other: &TypeDescription, strategy: TypeMatchStrategy) -> bool {
        match strategy {
            TypeMatchStrategy::NamespaceAndName => {
                self.namespace == other.namespace && self.name == other.name
            }
            TypeMatchStrategy::FullName => self.full_name == other.full_name,
        }
    }
}

impl fmt::Display for TypeDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.full_name)
    }
}

/// One serialized message addressed to a channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    /// Unique id within the owning parcel.
    pub id: String,
    /// Diagnostic description of the message.
    pub description: String,
    /// Destination channel.
    pub address: Channel,
    /// Opaque serialized payload.
    pub serialized_payload: String,
    /// Type metadata for handler and deserializer resolution.
    pub payload_type: TypeDescription,
}

impl Envelope {
    /// Wrap a message into an envelope addressed to `address`.
    pub fn for_message<M>(message: &M, address: &Channel) -> Result<Self, serde_json::Error>
    where
        M: BusMessage + Serialize,
    {
        Ok(Self {
            id: Uuid::new_v4().to_string(),
            description: message.description(),
            address: address.clone(),
            serialized_payload: serde_json::to_string(message)?,
            payload_type: TypeDescription::of::<M>(),
        })
    }

    /// The same envelope carrying a replacement payload; used to record
    /// the delivered message state after handler execution.
    pub fn with_payload(&self, serialized_payload: String) -> Self {
        Self {
            serialized_payload,
            ..self.clone()
        }
    }

    /// Whether this envelope carries the given payload type.
    pub fn carries(&self, payload_type: &TypeDescription, strategy: TypeMatchStrategy) -> bool {
        self.payload_type.matches(payload_type, strategy)
    }
}

/// Identity of one delivery attempt; the correlation key for every call
/// into the tracking collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TrackingCode {
    /// The parcel being delivered.
    pub parcel_id: Uuid,
    /// The envelope within the parcel.
    pub envelope_id: String,
}

impl TrackingCode {
    /// Build a tracking code for one envelope of a parcel.
    pub fn new(parcel_id: Uuid, envelope_id: impl Into<String>) -> Self {
        Self {
            parcel_id,
            envelope_id: envelope_id.into(),
        }
    }
}

impl fmt::Display for TrackingCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.parcel_id, self.envelope_id)
    }
}
