//! Shared service state.

use std::sync::Arc;
use std::time::Instant;

use crate::kernel::ContextKernel;
use crate::store::GraphStore;

/// State shared by every handler.
pub struct ServiceState<S: GraphStore + 'static> {
    /// The kernel all operations run through.
    pub kernel: Arc<ContextKernel<S>>,
    started_at: Instant,
}

impl<S: GraphStore + 'static> ServiceState<S> {
    /// Wrap a kernel for serving.
    pub fn new(kernel: ContextKernel<S>) -> Self {
        Self {
            kernel: Arc::new(kernel),
            started_at: Instant::now(),
        }
    }

    /// Seconds since the state was created.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().as_secs()
    }
}

impl<S: GraphStore + 'static> Clone for ServiceState<S> {
    fn clone(&self) -> Self {
        Self {
            kernel: Arc::clone(&self.kernel),
            started_at: self.started_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::collab::{GenerationParams, ModelClient, ModelError, StaticSettings};
    use crate::config::KernelConfig;
    use crate::store::InMemoryGraphStore;
    use crate::types::Message;

    struct NoModel;

    #[async_trait::async_trait]
    impl ModelClient for NoModel {
        async fn generate_non_streaming(
            &self,
            _messages: &[Message],
            _model: &str,
            _params: &GenerationParams,
        ) -> Result<String, ModelError> {
            Err(ModelError::Unavailable { message: "offline".into() })
        }
    }

    #[test]
    fn test_clones_share_kernel() {
        let kernel = ContextKernel::new(
            Arc::new(InMemoryGraphStore::new()),
            Arc::new(StaticSettings::new()),
            Arc::new(NoModel),
            KernelConfig::default(),
        );
        let state = ServiceState::new(kernel);
        let copy = state.clone();
        assert!(Arc::ptr_eq(&state.kernel, &copy.kernel));
        assert_eq!(copy.uptime_secs(), state.uptime_secs());
    }
}
