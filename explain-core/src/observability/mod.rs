pub mod logging;
pub mod trace_context;

pub use logging::init_tracing;
pub use trace_context::{
    current_traceparent, trace_headers, TraceHeadersExt, REQUEST_ID_HEADER, TRACEPARENT_HEADER,
    TRACESTATE_HEADER,
};
