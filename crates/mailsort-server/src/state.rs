//! Shared handler state

use mailsort_classifiers::Classifier;
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

use crate::config::ServerConfig;

/// State cloned into every request handler
#[derive(Clone)]
pub struct AppState {
    pub classifier: Arc<dyn Classifier>,
    pub config: Arc<ServerConfig>,
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    pub fn new(classifier: Arc<dyn Classifier>, config: ServerConfig) -> Self {
        Self {
            classifier,
            config: Arc::new(config),
            metrics: None,
        }
    }

    /// Serve `/metrics` from this recorder handle
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
