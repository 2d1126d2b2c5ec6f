//! # Shared Interface States
//!
//! Handlers in a parcel never hold references to each other; they
//! communicate forward through declared capability snapshots. After a
//! handler runs, every capability it implements is captured into a
//! transport-safe [`SharedInterfaceState`] and appended to the parcel;
//! before the next handler runs, each accumulated state whose capability
//! the message implements is applied onto the deserialized message.
//!
//! Capability discovery is an explicit registry populated at registration
//! time (no runtime type introspection): a [`ShareRegistry`] maps each
//! concrete type to the reader and writer functions of the capabilities it
//! declares through [`Shares`].

pub mod manager;
pub mod registry;

pub use manager::ShareManager;
pub use registry::{ShareRegistration, ShareRegistry};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::TypeDescription;

/// Type-erased object the share machinery reads from and writes onto.
pub type AnyShareable = dyn std::any::Any + Send + Sync;

/// One property of a capability snapshot, serialized independently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedProperty {
    /// Property name on the capability.
    pub name: String,
    /// JSON-serialized property value.
    pub serialized_value: String,
}

/// A named-capability snapshot captured from one object.
///
/// Owned by the parcel; appended after each successful delivery, never
/// mutated in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharedInterfaceState {
    /// The concrete type the snapshot came from.
    pub source_type: TypeDescription,
    /// The capability the snapshot satisfies.
    pub interface_type: TypeDescription,
    /// Property values, in declaration order.
    pub properties: Vec<SharedProperty>,
}

/// Failure while capturing or applying a capability snapshot.
#[derive(Debug, Error)]
pub enum ShareError {
    #[error("unable to serialize snapshot for capability {interface}: {source}")]
    SnapshotSerialization {
        interface: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("unable to deserialize snapshot for capability {interface}: {source}")]
    SnapshotDeserialization {
        interface: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("registered source for capability {interface} does not match the object's type")]
    SourceTypeMismatch { interface: String },

    #[error("registered target for capability {interface} does not match the object's type")]
    TargetTypeMismatch { interface: String },
}

/// A capability whose property values propagate forward across a parcel's
/// sequence.
///
/// The snapshot is an ordinary serde struct; each field becomes one
/// [`SharedProperty`] so the transport never depends on the concrete
/// types at either end.
pub trait SharedCapability: 'static {
    /// Typed property bag exchanged through serialized snapshots.
    type Snapshot: Serialize + DeserializeOwned + Send;

    /// Identity used to match snapshots between sources and targets.
    fn interface_type() -> TypeDescription
    where
        Self: Sized,
    {
        TypeDescription::of::<Self>()
    }
}

/// Implemented by a concrete message or handler type for each capability
/// it declares. Registered into a [`ShareRegistry`] at startup.
pub trait Shares<C: SharedCapability> {
    /// Read the capability's current property values.
    fn capture(&self) -> C::Snapshot;

    /// Overwrite the capability's property values from a snapshot.
    fn apply(&mut self, snapshot: C::Snapshot);
}

/// Serialize a snapshot field-by-field into shared properties.
pub(crate) fn snapshot_to_properties<C: SharedCapability>(
    snapshot: &C::Snapshot,
) -> Result<Vec<SharedProperty>, ShareError> {
    let interface = C::interface_type();
    let value =
        serde_json::to_value(snapshot).map_err(|source| ShareError::SnapshotSerialization {
            interface: interface.full_name.clone(),
            source,
        })?;
    match value {
        serde_json::Value::Object(map) => Ok(map
            .into_iter()
            .map(|(name, value)| SharedProperty {
                name,
                serialized_value: value.to_string(),
            })
            .collect()),
        other => Ok(vec![SharedProperty {
            name: "value".to_string(),
            serialized_value: other.to_string(),
        }]),
    }
}

/// Rebuild a snapshot from shared properties. Later duplicates of a
/// property name win.
pub(crate) fn properties_to_snapshot<C: SharedCapability>(
    properties: &[SharedProperty],
) -> Result<C::Snapshot, ShareError> {
    let interface = C::interface_type();
    let deserialization = |source| ShareError::SnapshotDeserialization {
        interface: interface.full_name.clone(),
        source,
    };

    if let [only] = properties {
        if only.name == "value" {
            if let Ok(snapshot) = serde_json::from_str(&only.serialized_value) {
                return Ok(snapshot);
            }
        }
    }

    let mut map = serde_json::Map::new();
    for property in properties {
        let value = serde_json::from_str(&property.serialized_value).map_err(deserialization)?;
        map.insert(property.name.clone(), value);
    }
    serde_json::from_value(serde_json::Value::Object(map)).map_err(deserialization)
}
