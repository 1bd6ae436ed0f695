//! Maps job type tags to their [`crate::handler::JobHandler`] implementation.

use std::collections::HashMap;
use std::sync::Arc;

use svcchan_types::jobs::JobType;

use crate::handler::JobHandler;

/// The set of handlers a running [`crate::queue::Queue`] dispatches to.
/// Built once at daemon startup and never mutated afterward.
#[derive(Default, Clone)]
pub struct HandlerRegistry {
    handlers: HashMap<&'static str, Arc<dyn JobHandler>>,
}

impl HandlerRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `job_type`. Overwrites any prior registration
    /// for the same tag.
    pub fn register(&mut self, job_type: JobType, handler: Arc<dyn JobHandler>) {
        self.handlers.insert(job_type.as_str(), handler);
    }

    /// Looks up the handler for a job type tag, if one is registered.
    pub fn get(&self, job_type: &str) -> Option<Arc<dyn JobHandler>> {
        self.handlers.get(job_type).cloned()
    }
}
