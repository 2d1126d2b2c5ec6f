//! # Share Registry
//!
//! Explicit capability registry populated at startup. Each registration
//! binds one concrete type to one capability through type-erased reader
//! and writer functions, replacing runtime interface discovery while
//! preserving the "no direct references between handlers" property.

use parking_lot::RwLock;
use std::any::TypeId;
use std::collections::HashMap;
use std::sync::Arc;

use super::{
    properties_to_snapshot, snapshot_to_properties, AnyShareable, ShareError, SharedCapability,
    SharedProperty, Shares,
};
use crate::model::TypeDescription;

type ReaderFn = Box<dyn Fn(&AnyShareable) -> Result<Vec<SharedProperty>, ShareError> + Send + Sync>;
type WriterFn =
    Box<dyn Fn(&mut AnyShareable, &[SharedProperty]) -> Result<(), ShareError> + Send + Sync>;

/// One (concrete type, capability) binding.
pub struct ShareRegistration {
    /// The concrete type the binding belongs to.
    pub source_type: TypeDescription,
    /// The capability it declares.
    pub interface_type: TypeDescription,
    reader: ReaderFn,
    writer: WriterFn,
}

impl ShareRegistration {
    /// Capture the capability's properties from a type-erased object.
    pub fn read(&self, source: &AnyShareable) -> Result<Vec<SharedProperty>, ShareError> {
        (self.reader)(source)
    }

    /// Apply properties onto a type-erased object.
    pub fn write(
        &self,
        target: &mut AnyShareable,
        properties: &[SharedProperty],
    ) -> Result<(), ShareError> {
        (self.writer)(target, properties)
    }
}

impl std::fmt::Debug for ShareRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShareRegistration")
            .field("source_type", &self.source_type.full_name)
            .field("interface_type", &self.interface_type.full_name)
            .finish()
    }
}

/// Registry of capability bindings keyed by concrete type.
#[derive(Default)]
pub struct ShareRegistry {
    by_source: RwLock<HashMap<TypeId, Vec<Arc<ShareRegistration>>>>,
}

impl ShareRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register that `T` declares capability `C`. Registering the same
    /// pair twice appends a duplicate binding; callers register once at
    /// startup.
    pub fn register<T, C>(&self)
    where
        T: Shares<C> + Send + Sync + 'static,
        C: SharedCapability,
    {
        let registration = ShareRegistration {
            source_type: TypeDescription::of::<T>(),
            interface_type: C::interface_type(),
            reader: Box::new(|source: &AnyShareable| {
                let source =
                    source
                        .downcast_ref::<T>()
                        .ok_or_else(|| ShareError::SourceTypeMismatch {
                            interface: C::interface_type().full_name,
                        })?;
                snapshot_to_properties::<C>(&<T as Shares<C>>::capture(source))
            }),
            writer: Box::new(|target: &mut AnyShareable, properties: &[SharedProperty]| {
                let target =
                    target
                        .downcast_mut::<T>()
                        .ok_or_else(|| ShareError::TargetTypeMismatch {
                            interface: C::interface_type().full_name,
                        })?;
                <T as Shares<C>>::apply(target, properties_to_snapshot::<C>(properties)?);
                Ok(())
            }),
        };

        self.by_source
            .write()
            .entry(TypeId::of::<T>())
            .or_default()
            .push(Arc::new(registration));
    }

    /// Every capability binding declared by the given concrete type.
    pub fn registrations_for(&self, source: TypeId) -> Vec<Arc<ShareRegistration>> {
        self.by_source
            .read()
            .get(&source)
            .cloned()
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for ShareRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let count: usize = self.by_source.read().values().map(Vec::len).sum();
        f.debug_struct("ShareRegistry")
            .field("registrations", &count)
            .finish()
    }
}
