//! W3C Trace Context propagation for calls to the explain backend.
//!
//! Outgoing requests carry `traceparent`/`tracestate` for the current span
//! and an `x-request-id` so backend logs can be joined with client logs.
//!
//! See: https://www.w3.org/TR/trace-context/

use opentelemetry::trace::TraceContextExt;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::RequestBuilder;
use tracing::Span;
use tracing_opentelemetry::OpenTelemetrySpanExt;

pub const TRACEPARENT_HEADER: &str = "traceparent";
pub const TRACESTATE_HEADER: &str = "tracestate";
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// `traceparent` value for the current span, if it has a valid context.
///
/// Spans only carry one when the OTLP layer is installed.
pub fn current_traceparent() -> Option<String> {
    let context = Span::current().context();
    let span = context.span();
    let span_context = span.span_context();

    span_context.is_valid().then(|| {
        format!(
            "00-{}-{}-{:02x}",
            span_context.trace_id(),
            span_context.span_id(),
            span_context.trace_flags().to_u8()
        )
    })
}

/// Headers identifying this request: trace context when available, and
/// `request_id` always.
pub fn trace_headers(request_id: &str) -> HeaderMap {
    let mut headers = HeaderMap::new();

    if let Some(value) = current_traceparent().and_then(|v| HeaderValue::from_str(&v).ok()) {
        headers.insert(TRACEPARENT_HEADER, value);

        let context = Span::current().context();
        let tracestate = context.span().span_context().trace_state().header();
        if let Ok(value) = HeaderValue::from_str(&tracestate) {
            if !tracestate.is_empty() {
                headers.insert(TRACESTATE_HEADER, value);
            }
        }
    }

    if let Ok(value) = HeaderValue::from_str(request_id) {
        headers.insert(REQUEST_ID_HEADER, value);
    }

    headers
}

/// Attach trace headers to an outgoing reqwest request.
pub trait TraceHeadersExt {
    /// Attach trace context and a fresh v4 request id.
    fn with_trace_headers(self) -> Self;

    fn with_request_id(self, request_id: &str) -> Self;
}

impl TraceHeadersExt for RequestBuilder {
    fn with_trace_headers(self) -> Self {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.with_request_id(&request_id)
    }

    fn with_request_id(self, request_id: &str) -> Self {
        self.headers(trace_headers(request_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn no_traceparent_without_otel_span() {
        assert!(current_traceparent().is_none());

        let headers = trace_headers("abc-123");
        assert!(headers.get(TRACEPARENT_HEADER).is_none());
        assert!(headers.get(TRACESTATE_HEADER).is_none());
    }

    #[test]
    fn request_id_is_always_set() {
        let headers = trace_headers("abc-123");
        assert_eq!(
            headers.get(REQUEST_ID_HEADER).and_then(|v| v.to_str().ok()),
            Some("abc-123")
        );
    }

    #[test]
    fn request_builder_gets_headers() {
        let request = reqwest::Client::new()
            .post("http://localhost/api/search")
            .with_request_id("req-7")
            .build()
            .unwrap();

        assert_eq!(
            request
                .headers()
                .get(REQUEST_ID_HEADER)
                .and_then(|v| v.to_str().ok()),
            Some("req-7")
        );
    }
}
