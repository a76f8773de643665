//! The `common` bundle — passed explicitly to every component
//! constructor so nothing in the engine reaches for a process-wide
//! singleton.

use std::any::Any;
use std::sync::Arc;

use crate::config::Options;

/// Shared handles every component constructor accepts.
///
/// `metrics`/`telemetry` are opaque trait-object slots: the core never
/// downcasts them, it only holds and forwards the handle so a host
/// library can attach a real implementation without this crate
/// depending on one.
#[derive(Clone)]
pub struct Common {
    pub options: Options,
    pub logger: tracing::Span,
    pub metrics: Option<Arc<dyn Any + Send + Sync>>,
    pub telemetry: Option<Arc<dyn Any + Send + Sync>>,
}

impl Common {
    pub fn new(options: Options) -> Self {
        Self {
            options,
            logger: tracing::Span::current(),
            metrics: None,
            telemetry: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn Any + Send + Sync>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn with_telemetry(mut self, telemetry: Arc<dyn Any + Send + Sync>) -> Self {
        self.telemetry = Some(telemetry);
        self
    }
}
