//! # Share Manager
//!
//! Captures capability snapshots from handlers after they run and applies
//! accumulated snapshots onto messages before the next handler runs.

use std::sync::Arc;
use tracing::debug;

use super::{AnyShareable, ShareError, ShareRegistry, SharedInterfaceState};
use crate::model::TypeMatchStrategy;

/// Snapshot capture and application over the capability registry.
#[derive(Debug)]
pub struct ShareManager {
    registry: Arc<ShareRegistry>,
    type_match_strategy: TypeMatchStrategy,
}

impl ShareManager {
    pub fn new(registry: Arc<ShareRegistry>) -> Self {
        Self {
            registry,
            type_match_strategy: TypeMatchStrategy::default(),
        }
    }

    /// Override how capability identities are compared.
    pub fn with_type_match_strategy(mut self, strategy: TypeMatchStrategy) -> Self {
        self.type_match_strategy = strategy;
        self
    }

    /// Capture one [`SharedInterfaceState`] per capability the source's
    /// concrete type declares. An unregistered type yields an empty list.
    pub fn get_shared_interface_states(
        &self,
        source: &AnyShareable,
    ) -> Result<Vec<SharedInterfaceState>, ShareError> {
        let registrations = self.registry.registrations_for(source.type_id());
        let mut states = Vec::with_capacity(registrations.len());
        for registration in registrations {
            states.push(SharedInterfaceState {
                source_type: registration.source_type.clone(),
                interface_type: registration.interface_type.clone(),
                properties: registration.read(source)?,
            });
        }
        Ok(states)
    }

    /// Apply a snapshot onto the target if the target's type declares a
    /// matching capability. Returns whether it applied; a target without
    /// the capability is a no-op, not an error.
    pub fn apply_shared_interface_state(
        &self,
        state: &SharedInterfaceState,
        target: &mut AnyShareable,
    ) -> Result<bool, ShareError> {
        let registration = self
            .registry
            .registrations_for((*target).type_id())
            .into_iter()
            .find(|registration| {
                registration
                    .interface_type
                    .matches(&state.interface_type, self.type_match_strategy)
            });

        match registration {
            Some(registration) => {
                registration.write(target, &state.properties)?;
                debug!(
                    interface = %state.interface_type,
                    source = %state.source_type,
                    "applied shared interface state"
                );
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Capture from `source` and apply onto `target` without a transport
    /// round-trip; used for same-process wiring and tests.
    pub fn apply_shared_properties(
        &self,
        source: &AnyShareable,
        target: &mut AnyShareable,
    ) -> Result<(), ShareError> {
        for state in self.get_shared_interface_states(source)? {
            self.apply_shared_interface_state(&state, target)?;
        }
        Ok(())
    }
}
