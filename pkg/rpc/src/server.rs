use std::cell::Cell;
use std::rc::Rc;

use crate::half_stream::HalfStream;
use crate::metadata::Metadata;
use crate::method::MethodType;
use crate::rpc_state::ResponseSink;
use crate::server_transport::{ServerTransportSurface, TransportError};
use crate::status::Status;

/// A handler receives an `RpcContext` and is responsible for calling
/// `ctx.finish(status)` when the call is done — synchronously, for
/// unary/server-streaming handlers that produce their whole response
/// before returning, or from within a `requests.recv` continuation, for
/// client-stream/bidi handlers that finish only once the client half-
/// closes (§6).
pub type Handler = Rc<dyn Fn(RpcContext)>;

/// What a handler is handed: the requests half-stream, a responses sink
/// that flushes headers on first send (§2, §5), the header/trailer
/// surface appropriate to this call's shape, and the call's cancellation
/// flag.
#[derive(Clone)]
pub struct RpcContext {
    pub requests: HalfStream,
    pub responses: ResponseSink,
    transport: Rc<dyn ServerTransportSurface>,
    finisher: Rc<dyn Fn(Status)>,
    cancelled: Rc<Cell<bool>>,
}

impl RpcContext {
    pub(crate) fn new(
        requests: HalfStream,
        responses: ResponseSink,
        transport: Rc<dyn ServerTransportSurface>,
        finisher: Rc<dyn Fn(Status)>,
        cancelled: Rc<Cell<bool>>,
    ) -> Self {
        RpcContext {
            requests,
            responses,
            transport,
            finisher,
            cancelled,
        }
    }

    pub fn method(&self) -> &str {
        self.transport.method()
    }

    pub fn set_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.transport.set_header(md)
    }

    pub fn send_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.transport.send_header(md)
    }

    pub fn set_trailer(&self, md: &Metadata) -> Result<(), TransportError> {
        self.transport.set_trailer(md)
    }

    /// Finishes the call with `status`. Idempotent at the `RPCState` layer;
    /// calling it twice from a confused handler does not double-deliver.
    pub fn finish(&self, status: Status) {
        (self.finisher)(status);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.get()
    }
}

/// A service's method table plus its registered handlers. Lookup mirrors
/// `method::ServiceDescriptor`'s linear scan (§4.7): unary methods first,
/// then streaming methods, in registration order. Modeled on the
/// `ServiceBuilder` registration shape (`add_unary_handler`, etc.) seen in
/// the grpcio-style server builder, adapted to the ordered-scan descriptor
/// this core mandates instead of a hash table.
#[derive(Default, Clone)]
pub struct Server {
    unary: Vec<(String, Handler)>,
    client_streaming: Vec<(String, Handler)>,
    server_streaming: Vec<(String, Handler)>,
    bidi_streaming: Vec<(String, Handler)>,
}

impl Server {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_unary(&mut self, name: impl Into<String>, handler: Handler) -> &mut Self {
        self.unary.push((name.into(), handler));
        self
    }

    pub fn register_client_streaming(
        &mut self,
        name: impl Into<String>,
        handler: Handler,
    ) -> &mut Self {
        self.client_streaming.push((name.into(), handler));
        self
    }

    pub fn register_server_streaming(
        &mut self,
        name: impl Into<String>,
        handler: Handler,
    ) -> &mut Self {
        self.server_streaming.push((name.into(), handler));
        self
    }

    pub fn register_bidi_streaming(
        &mut self,
        name: impl Into<String>,
        handler: Handler,
    ) -> &mut Self {
        self.bidi_streaming.push((name.into(), handler));
        self
    }

    /// Linear scan over unary methods, then each streaming category in
    /// registration order, per §4.7.
    pub fn find(&self, method: &str) -> Option<(MethodType, Handler)> {
        for (name, handler) in &self.unary {
            if name == method {
                return Some((MethodType::Unary, handler.clone()));
            }
        }
        for (name, handler) in &self.client_streaming {
            if name == method {
                return Some((MethodType::ClientStreaming, handler.clone()));
            }
        }
        for (name, handler) in &self.server_streaming {
            if name == method {
                return Some((MethodType::ServerStreaming, handler.clone()));
            }
        }
        for (name, handler) in &self.bidi_streaming {
            if name == method {
                return Some((MethodType::BidiStreaming, handler.clone()));
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::StatusCode;

    #[test]
    fn find_returns_registered_method_type() {
        let mut server = Server::new();
        server.register_unary(
            "/test.Service/Echo",
            Rc::new(|ctx: RpcContext| ctx.finish(Status::ok())),
        );
        server.register_server_streaming(
            "/test.Service/Count",
            Rc::new(|ctx: RpcContext| ctx.finish(Status::ok())),
        );
        let (t, _) = server.find("/test.Service/Echo").unwrap();
        assert_eq!(t, MethodType::Unary);
        let (t, _) = server.find("/test.Service/Count").unwrap();
        assert_eq!(t, MethodType::ServerStreaming);
        assert!(server.find("/test.Service/Nope").is_none());
    }

    #[test]
    fn unregistered_method_type_not_matched_elsewhere() {
        let mut server = Server::new();
        server.register_unary("/a", Rc::new(|ctx: RpcContext| ctx.finish(Status::ok())));
        assert!(server.find("/b").is_none());
        let _ = StatusCode::Ok;
    }
}
