use crate::{MethodType, Service, ServiceError, is_exported};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::Arc;

/// Concurrent map from service name to [`Service`].
///
/// Registration and lookup can happen from any task at any time; a lookup
/// sees a service either fully registered or not at all.
#[derive(Debug, Default)]
pub struct ServiceRegistry {
    services: DashMap<String, Arc<Service>>,
}

impl ServiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publishes a service under its name.
    ///
    /// Fails if the name is not exported or is already taken. The first
    /// registration under a name always wins.
    pub fn register(&self, service: impl Into<Service>) -> Result<(), ServiceError> {
        let service: Service = service.into();
        let name = service.name().to_string();

        if !is_exported(&name) {
            return Err(ServiceError::InvalidServiceName(name));
        }

        match self.services.entry(name.clone()) {
            Entry::Occupied(_) => Err(ServiceError::DuplicateService(name)),
            Entry::Vacant(slot) => {
                for mtype in service.methods() {
                    tracing::info!("rpc server: register {}.{}", name, mtype.name());
                }
                slot.insert(Arc::new(service));
                Ok(())
            }
        }
    }

    /// Resolves a `"Service.Method"` name.
    ///
    /// The split happens at the last `.`, so the service part may itself
    /// contain dots.
    pub fn find_service(
        &self,
        service_method: &str,
    ) -> Result<(Arc<Service>, Arc<MethodType>), ServiceError> {
        let (service_name, method_name) = service_method
            .rsplit_once('.')
            .ok_or_else(|| ServiceError::IllFormed(service_method.to_string()))?;

        let service = self
            .services
            .get(service_name)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| ServiceError::ServiceNotFound(service_name.to_string()))?;

        let mtype = service
            .method(method_name)
            .ok_or_else(|| ServiceError::MethodNotFound(method_name.to_string()))?;

        Ok((service, mtype))
    }

    pub fn len(&self) -> usize {
        self.services.len()
    }

    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }
}
