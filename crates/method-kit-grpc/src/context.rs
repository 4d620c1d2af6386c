//! Request objects handed to handlers.

use std::fmt;
use std::ops::Deref;
use std::sync::Arc;

use tonic::metadata::MetadataMap;

use crate::logger::RequestLogger;
use crate::metadata::HeaderKey;

/// Identity and services of one in-flight request.
///
/// Built by the wrapper before auth runs and never changed afterwards.
/// `E` is the method's extension record (data-store handles and similar),
/// cloned into every request.
#[derive(Clone)]
pub struct RequestContext<E = ()> {
    logger: RequestLogger,
    metadata: MetadataMap,
    request_id: String,
    message_id: Arc<str>,
    extensions: E,
}

impl<E> RequestContext<E> {
    pub(crate) fn new(
        logger: RequestLogger,
        metadata: MetadataMap,
        request_id: String,
        message_id: Arc<str>,
        extensions: E,
    ) -> Self {
        Self {
            logger,
            metadata,
            request_id,
            message_id,
            extensions,
        }
    }

    pub fn logger(&self) -> &RequestLogger {
        &self.logger
    }

    /// Metadata sent by the caller.
    pub fn metadata(&self) -> &MetadataMap {
        &self.metadata
    }

    /// First ASCII value of a caller metadata key.
    pub fn header(&self, key: HeaderKey) -> Option<&str> {
        self.metadata
            .get(key.as_str())
            .and_then(|v| v.to_str().ok())
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn extensions(&self) -> &E {
        &self.extensions
    }
}

impl<E: fmt::Debug> fmt::Debug for RequestContext<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("request_id", &self.request_id)
            .field("message_id", &self.message_id)
            .field("metadata", &self.metadata)
            .field("extensions", &self.extensions)
            .finish_non_exhaustive()
    }
}

/// Request passed to unary handlers: the decoded params plus the context.
#[derive(Debug)]
pub struct MethodRequest<Req, E = ()> {
    pub params: Req,
    context: RequestContext<E>,
}

impl<Req, E> MethodRequest<Req, E> {
    pub(crate) fn new(params: Req, context: RequestContext<E>) -> Self {
        Self { params, context }
    }

    pub fn context(&self) -> &RequestContext<E> {
        &self.context
    }

    pub fn into_parts(self) -> (Req, RequestContext<E>) {
        (self.params, self.context)
    }
}

impl<Req, E> Deref for MethodRequest<Req, E> {
    type Target = RequestContext<E>;

    fn deref(&self) -> &Self::Target {
        &self.context
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::headers;
    use crate::test_support::RecordingLogger;

    fn context(metadata: MetadataMap) -> RequestContext<&'static str> {
        RequestContext::new(
            Arc::new(RecordingLogger::new()),
            metadata,
            "req-1".to_string(),
            Arc::from("[Orders:Get]"),
            "store",
        )
    }

    #[test]
    fn exposes_identity_and_extensions() {
        let ctx = context(MetadataMap::new());

        assert_eq!(ctx.request_id(), "req-1");
        assert_eq!(ctx.message_id(), "[Orders:Get]");
        assert_eq!(*ctx.extensions(), "store");
    }

    #[test]
    fn reads_caller_headers() {
        let mut metadata = MetadataMap::new();
        metadata.insert("authorization", "Bearer token".parse().unwrap());
        metadata.insert("x-tenant-id", "acme".parse().unwrap());

        let ctx = context(metadata);

        assert_eq!(ctx.header(headers::AUTHORIZATION), Some("Bearer token"));
        assert_eq!(ctx.header(headers::TENANT_ID), Some("acme"));
        assert_eq!(ctx.header(headers::REQUEST_ID), None);
    }

    #[test]
    fn method_request_derefs_to_context() {
        let request = MethodRequest::new(7_u32, context(MetadataMap::new()));

        assert_eq!(request.params, 7);
        assert_eq!(request.request_id(), "req-1");

        let (params, ctx) = request.into_parts();
        assert_eq!(params, 7);
        assert_eq!(ctx.message_id(), "[Orders:Get]");
    }

    #[test]
    fn debug_skips_the_logger() {
        let rendered = format!("{:?}", context(MetadataMap::new()));
        assert!(rendered.contains("req-1"));
        assert!(!rendered.contains("logger"));
    }
}
