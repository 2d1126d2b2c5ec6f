//! # Handler Registry
//!
//! The handler factory: maps message type metadata to the deserializer,
//! serializer, and handler constructor for that type, plus optional
//! stateful-resume hooks. Populated at startup through explicit
//! registration; resolution happens per envelope without deserializing
//! the payload first.

use dashmap::DashMap;
use std::sync::Arc;

use super::handler::{
    DynMessageHandler, HandlerAdapter, MessageHandler, StatefulMessageHandler,
};
use crate::error::DispatchError;
use crate::model::{TypeDescription, TypeMatchStrategy};
use crate::shares::{
    properties_to_snapshot, snapshot_to_properties, AnyShareable, ShareError, SharedCapability,
    SharedInterfaceState,
};

type DeserializeFn =
    Box<dyn Fn(&str) -> Result<Box<AnyShareable>, serde_json::Error> + Send + Sync>;
type SerializeFn = Box<dyn Fn(&AnyShareable) -> Result<String, DispatchError> + Send + Sync>;
type BuildFn = Box<dyn Fn() -> Box<dyn DynMessageHandler> + Send + Sync>;

type CreateStateFn = Box<dyn Fn(&AnyShareable) -> Result<SharedInterfaceState, ShareError> + Send + Sync>;
type ValidateStateFn = Box<dyn Fn(&AnyShareable, &SharedInterfaceState) -> bool + Send + Sync>;
type SeedStateFn =
    Box<dyn Fn(&mut AnyShareable, &SharedInterfaceState) -> Result<(), ShareError> + Send + Sync>;

/// Stateful-resume hooks generated for handlers that declare resumable
/// state.
pub struct StateHooks {
    pub(crate) create: CreateStateFn,
    pub(crate) validate: ValidateStateFn,
    pub(crate) seed: SeedStateFn,
}

/// Everything the dispatcher needs to execute one message type.
pub struct HandlerRegistration {
    /// The message type this registration serves.
    pub message_type: TypeDescription,
    /// The concrete handler type; keys stateful-resume snapshots.
    pub handler_type: TypeDescription,
    pub(crate) deserialize: DeserializeFn,
    pub(crate) serialize: SerializeFn,
    pub(crate) build: BuildFn,
    pub(crate) state_hooks: Option<StateHooks>,
}

impl std::fmt::Debug for HandlerRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistration")
            .field("message_type", &self.message_type.full_name)
            .field("handler_type", &self.handler_type.full_name)
            .field("stateful", &self.state_hooks.is_some())
            .finish()
    }
}

/// Marker capability identifying a handler's resumable state snapshot.
#[allow(dead_code)]
struct HandlerState<S: 'static>(std::marker::PhantomData<S>);

impl<S> SharedCapability for HandlerState<S>
where
    S: serde::Serialize + serde::de::DeserializeOwned + Send + 'static,
{
    type Snapshot = S;

    fn interface_type() -> TypeDescription {
        TypeDescription::of::<S>()
    }
}

/// Thread-safe registry of handler registrations keyed by message type.
#[derive(Default)]
pub struct HandlerRegistry {
    by_full_name: DashMap<String, Arc<HandlerRegistration>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler factory for its message type.
    pub fn register<H, F>(&self, factory: F)
    where
        H: MessageHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        self.insert::<H, F>(factory, None);
    }

    /// Register a stateful handler factory; resume hooks are generated
    /// from the handler's state declaration.
    pub fn register_stateful<H, F>(&self, factory: F)
    where
        H: StatefulMessageHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let handler_type = TypeDescription::of::<H>();
        let state_type = TypeDescription::of::<H::State>();

        let create_type = handler_type.clone();
        let hooks = StateHooks {
            create: Box::new(move |handler: &AnyShareable| {
                let handler = handler.downcast_ref::<H>().ok_or_else(|| {
                    ShareError::SourceTypeMismatch {
                        interface: create_type.full_name.clone(),
                    }
                })?;
                Ok(SharedInterfaceState {
                    source_type: TypeDescription::of::<H>(),
                    interface_type: TypeDescription::of::<H::State>(),
                    properties: snapshot_to_properties::<HandlerState<H::State>>(
                        &handler.create_state(),
                    )?,
                })
            }),
            validate: Box::new(|handler: &AnyShareable, state: &SharedInterfaceState| {
                let Some(handler) = handler.downcast_ref::<H>() else {
                    return false;
                };
                match properties_to_snapshot::<HandlerState<H::State>>(&state.properties) {
                    Ok(snapshot) => handler.is_state_valid(&snapshot),
                    Err(_) => false,
                }
            }),
            seed: Box::new(move |handler: &mut AnyShareable, state: &SharedInterfaceState| {
                let handler = handler.downcast_mut::<H>().ok_or_else(|| {
                    ShareError::TargetTypeMismatch {
                        interface: state_type.full_name.clone(),
                    }
                })?;
                handler.seed_state(properties_to_snapshot::<HandlerState<H::State>>(
                    &state.properties,
                )?);
                Ok(())
            }),
        };

        self.insert::<H, F>(factory, Some(hooks));
    }

    fn insert<H, F>(&self, factory: F, state_hooks: Option<StateHooks>)
    where
        H: MessageHandler,
        F: Fn() -> H + Send + Sync + 'static,
    {
        let message_type = TypeDescription::of::<H::Message>();
        let expected = message_type.full_name.clone();
        let registration = HandlerRegistration {
            message_type: message_type.clone(),
            handler_type: TypeDescription::of::<H>(),
            deserialize: Box::new(|raw: &str| {
                let message: H::Message = serde_json::from_str(raw)?;
                Ok(Box::new(message) as Box<AnyShareable>)
            }),
            serialize: Box::new(move |message: &AnyShareable| {
                let message = message.downcast_ref::<H::Message>().ok_or_else(|| {
                    DispatchError::PayloadTypeMismatch {
                        expected: expected.clone(),
                    }
                })?;
                Ok(serde_json::to_string(message)?)
            }),
            build: Box::new(move || Box::new(HandlerAdapter(factory())) as Box<dyn DynMessageHandler>),
            state_hooks,
        };

        self.by_full_name
            .insert(message_type.full_name, Arc::new(registration));
    }

    /// Resolve the registration for a message type, or `None` when no
    /// handler is registered for it.
    pub fn resolve(
        &self,
        message_type: &TypeDescription,
        strategy: TypeMatchStrategy,
    ) -> Option<Arc<HandlerRegistration>> {
        if let Some(registration) = self.by_full_name.get(&message_type.full_name) {
            return Some(registration.value().clone());
        }
        self.by_full_name.iter().find_map(|entry| {
            entry
                .message_type
                .matches(message_type, strategy)
                .then(|| entry.value().clone())
        })
    }

    /// Number of registered message types.
    pub fn len(&self) -> usize {
        self.by_full_name.len()
    }

    /// Whether nothing has been registered yet.
    pub fn is_empty(&self) -> bool {
        self.by_full_name.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("registered", &self.by_full_name.len())
            .finish()
    }
}
