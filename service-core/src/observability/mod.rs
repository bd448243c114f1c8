pub mod logging;
pub mod metrics;
pub mod trace_context;

pub use logging::{TelemetrySettings, init_tracing};
pub use self::metrics::{get_metrics, init_metrics};
pub use trace_context::{TracedClientExt, TracedRequest, inject_trace_context};
