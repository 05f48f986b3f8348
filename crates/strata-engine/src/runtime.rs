//! Runtime: the injected bundle of process-wide registries
//!
//! Nothing in the engine is a global. Loaders, types and reflectors reach
//! configuration, the capability registry, the native library registry,
//! the type definer and the access policy through the [`Runtime`] they were
//! built with.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use strata_sdk::{AccessPolicy, AllowAll, NativeHost};

use crate::config::RuntimeConfig;
use crate::loader::{ImageDefiner, LoaderType, ParallelCapabilityRegistry, TypeDefiner};
use crate::native::{DylibHost, NativeLibraryRegistry};
use crate::reflect::Reflector;
use crate::types::TypeHandle;

/// Process-wide state shared by every loader of one runtime
pub struct Runtime {
    config: RuntimeConfig,
    capabilities: ParallelCapabilityRegistry,
    natives: NativeLibraryRegistry,
    definer: Arc<dyn TypeDefiner>,
    policy: Arc<dyn AccessPolicy>,
    shut_down: AtomicBool,
}

impl Runtime {
    /// Start building a runtime
    pub fn builder() -> RuntimeBuilder {
        RuntimeBuilder::new()
    }

    /// Configuration
    pub fn config(&self) -> &RuntimeConfig {
        &self.config
    }

    /// Parallel-capability registry
    pub fn capabilities(&self) -> &ParallelCapabilityRegistry {
        &self.capabilities
    }

    /// Base loader type; always parallel-capable
    pub fn base_loader_type(&self) -> &Arc<LoaderType> {
        self.capabilities.base_type()
    }

    /// Native library registry
    pub fn natives(&self) -> &NativeLibraryRegistry {
        &self.natives
    }

    /// Type-definition primitive
    pub fn definer(&self) -> &Arc<dyn TypeDefiner> {
        &self.definer
    }

    /// Access policy consulted by reflection
    pub fn policy(&self) -> &Arc<dyn AccessPolicy> {
        &self.policy
    }

    /// Reflection facade acting on behalf of `accessor` (`None` for host code)
    pub fn reflector(&self, accessor: Option<&TypeHandle>) -> Reflector {
        Reflector::new(
            Arc::clone(&self.policy),
            accessor.map(|t| t.name().to_string()),
        )
    }

    /// Unload every native library. Later calls do nothing.
    pub fn shutdown(&self) {
        if self.shut_down.swap(true, Ordering::AcqRel) {
            return;
        }
        let unloaded = self.natives.unload_everything();
        tracing::info!(unloaded, "runtime shut down");
    }

    /// Whether [`shutdown`](Self::shutdown) ran
    pub fn is_shut_down(&self) -> bool {
        self.shut_down.load(Ordering::Acquire)
    }
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("config", &self.config)
            .field("capable_loader_types", &self.capabilities.len())
            .field("natives", &self.natives)
            .finish()
    }
}

/// Builder for [`Runtime`]
#[derive(Default)]
pub struct RuntimeBuilder {
    config: Option<RuntimeConfig>,
    native_host: Option<Arc<dyn NativeHost>>,
    definer: Option<Arc<dyn TypeDefiner>>,
    policy: Option<Arc<dyn AccessPolicy>>,
}

impl RuntimeBuilder {
    /// Builder with every collaborator defaulted
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `config` instead of [`RuntimeConfig::default`]
    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Native host; defaults to [`DylibHost`]
    pub fn native_host(mut self, host: Arc<dyn NativeHost>) -> Self {
        self.native_host = Some(host);
        self
    }

    /// Type definer; defaults to [`ImageDefiner`]
    pub fn definer(mut self, definer: Arc<dyn TypeDefiner>) -> Self {
        self.definer = Some(definer);
        self
    }

    /// Access policy; defaults to [`AllowAll`]
    pub fn policy(mut self, policy: Arc<dyn AccessPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    /// Create the runtime
    pub fn build(self) -> Arc<Runtime> {
        let config = self.config.unwrap_or_default();
        let host = self
            .native_host
            .unwrap_or_else(|| Arc::new(DylibHost::new()));
        let definer = self
            .definer
            .unwrap_or_else(|| Arc::new(ImageDefiner::new(config.verify_checksums)));
        let policy = self.policy.unwrap_or_else(|| Arc::new(AllowAll));

        Arc::new(Runtime {
            natives: NativeLibraryRegistry::new(host, config.native.clone()),
            capabilities: ParallelCapabilityRegistry::new(),
            config,
            definer,
            policy,
            shut_down: AtomicBool::new(false),
        })
    }
}
