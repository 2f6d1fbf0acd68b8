//! Opaque types handed across the C boundary

use propsys_core::engine::EngineServices;
use propsys_core::{CoreConfig, PortContext, RecordValue, TypeRegistry};

/// Everything one host needs: services, registered types and settings
///
/// Created by `propsys_context_create`, released by `propsys_context_destroy`.
pub struct PropsysContext {
    pub(crate) services: EngineServices,
    pub(crate) registry: TypeRegistry,
    pub(crate) config: CoreConfig,
}

impl PropsysContext {
    pub(crate) fn new(config: CoreConfig) -> Self {
        Self {
            services: EngineServices::new(),
            registry: TypeRegistry::new(),
            config,
        }
    }

    pub(crate) fn port(&self) -> PortContext<'_> {
        PortContext::new(&self.services)
    }
}

/// One record instance
///
/// Must be destroyed before the context it was created from, since object
/// and name fields are resolved through that context.
pub struct PropsysRecord {
    pub(crate) value: RecordValue,
}
