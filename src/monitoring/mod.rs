/*!
 * Monitoring
 * Structured logging setup for the registry and its tools
 */

mod tracer;

pub use tracer::{init_tracing, span_operation, OperationSpan, ENV_TRACE_JSON};
