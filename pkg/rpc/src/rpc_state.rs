use std::cell::RefCell;
use std::rc::Rc;

use crate::half_stream::HalfStream;
use crate::metadata::Metadata;
use crate::server_transport::{ServerTransportSurface, TransportError};
use crate::status::{Status, StatusCode};

type HeaderWaiter = Box<dyn FnOnce(Option<Metadata>, Option<Status>)>;

struct Inner {
    response_headers: Metadata,
    response_trailers: Metadata,
    headers_sent: bool,
    header_waiter: Option<HeaderWaiter>,
}

/// The per-call object: pairs the two half-streams with header/trailer
/// bookkeeping for one RPC. See spec §4.2 for the state machine this
/// implements.
#[derive(Clone)]
pub struct RPCState {
    method: Rc<str>,
    inner: Rc<RefCell<Inner>>,
    pub requests: HalfStream,
    pub responses: HalfStream,
}

impl RPCState {
    pub fn new(method: impl Into<String>) -> Self {
        RPCState {
            method: Rc::from(method.into()),
            inner: Rc::new(RefCell::new(Inner {
                response_headers: Metadata::new(),
                response_trailers: Metadata::new(),
                headers_sent: false,
                header_waiter: None,
            })),
            requests: HalfStream::new(),
            responses: HalfStream::new(),
        }
    }

    /// Fully-qualified method name, immutable for the life of the call.
    pub fn method(&self) -> &str {
        &self.method
    }

    /// Merges `md` into the accumulated response headers. Fails with
    /// `INTERNAL` if headers have already been sent.
    pub fn set_headers(&self, md: &Metadata) -> Result<(), Status> {
        let mut inner = self.inner.borrow_mut();
        if inner.headers_sent {
            return Err(Status::new(
                StatusCode::Internal,
                "headers already sent",
            ));
        }
        inner.response_headers.merge(md);
        Ok(())
    }

    /// Flushes headers: idempotent. Resolves a pending header waiter with
    /// the accumulated headers.
    pub fn send_headers(&self) {
        let (waiter, headers) = {
            let mut inner = self.inner.borrow_mut();
            if inner.headers_sent {
                return;
            }
            inner.headers_sent = true;
            (inner.header_waiter.take(), inner.response_headers.clone())
        };
        if let Some(waiter) = waiter {
            waiter(Some(headers), None);
        }
    }

    /// Merges `md` into the accumulated response trailers. Always
    /// succeeds; trailers flush atomically with `finish_with_trailers`.
    pub fn set_trailers(&self, md: &Metadata) {
        self.inner.borrow_mut().response_trailers.merge(md);
    }

    /// Registers a one-shot callback to be resolved the moment headers are
    /// sent (whether via `send_headers` or implicitly by
    /// `finish_with_trailers`). If headers are already sent, fires
    /// synchronously with the current headers.
    pub fn wait_for_headers(&self, cb: impl FnOnce(Option<Metadata>, Option<Status>) + 'static) {
        let headers = {
            let mut inner = self.inner.borrow_mut();
            if inner.headers_sent {
                Some(inner.response_headers.clone())
            } else {
                inner.header_waiter = Some(Box::new(cb));
                None
            }
        };
        if let Some(headers) = headers {
            cb(Some(headers), None);
        }
    }

    /// Finishes the call. If headers were never sent, sends them now (with
    /// `err` if present, or the accumulated headers on success), resolving
    /// any header waiter, then closes the responses stream with `err`.
    /// Idempotent: the headers-sent guard prevents a second header
    /// resolution, and `HalfStream::close` is independently idempotent.
    pub fn finish_with_trailers(&self, err: Option<Status>) {
        let (waiter, headers_result) = {
            let mut inner = self.inner.borrow_mut();
            if inner.headers_sent {
                (None, None)
            } else {
                inner.headers_sent = true;
                let waiter = inner.header_waiter.take();
                let result = match &err {
                    Some(e) => (None, Some(e.clone())),
                    None => (Some(inner.response_headers.clone()), None),
                };
                (waiter, Some(result))
            }
        };
        if let Some(waiter) = waiter {
            let (headers, werr) = headers_result.unwrap();
            waiter(headers, werr);
        }
        self.responses.close(err);
    }

    pub fn response_trailers(&self) -> Metadata {
        self.inner.borrow().response_trailers.clone()
    }

    pub fn response_headers(&self) -> Metadata {
        self.inner.borrow().response_headers.clone()
    }

    pub fn headers_sent(&self) -> bool {
        self.inner.borrow().headers_sent
    }

    /// Delivers `message` on the responses half-stream, flushing headers
    /// first if they haven't been sent yet. This is the implicit half of
    /// §2's "headers are flushed at most once (explicitly or implicitly on
    /// first response / on completion)" — a handler that never calls
    /// `send_headers`/`sendHeader` explicitly still gets headers observed
    /// by the client no later than its first response, matching §5's
    /// "headers precede all responses."
    pub fn send_response(&self, message: crate::message::Message) {
        self.send_headers();
        self.responses.send(message);
    }

    /// A handler-facing view onto this state's responses direction that
    /// goes through `send_response` rather than the raw half-stream, so
    /// every response send implicitly flushes headers first.
    pub fn response_sink(&self) -> ResponseSink {
        ResponseSink {
            state: self.clone(),
        }
    }
}

/// The responses half of an `RPCContext`: forwards to `RPCState::send_response`
/// so a streaming handler that writes responses without ever calling
/// `send_header` still gets headers flushed at the first send, not stalled
/// until `finish_with_trailers` (§2, §5).
#[derive(Clone)]
pub struct ResponseSink {
    state: RPCState,
}

impl ResponseSink {
    pub fn send(&self, message: crate::message::Message) {
        self.state.send_response(message);
    }
}

/// `RPCState` itself stands in for the "live server stream" a
/// `StreamServerTransportSurface` would otherwise delegate to: for
/// streaming calls there is no separate accumulator (§4.5), so the
/// handler's header/trailer surface forwards directly here.
///
/// `send_header` is idempotent-infallible (per `send_headers`, §4.2), and
/// `set_trailer` never fails pre-finish — per the Open Question resolution
/// in `SPEC_FULL.md` §4, this streaming surface gets no trailer-phase
/// check to mirror the unary accumulator's.
impl ServerTransportSurface for RPCState {
    fn method(&self) -> &str {
        self.method()
    }

    fn set_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.set_headers(md)
            .map_err(|_| TransportError::HeadersAlreadySent)
    }

    fn send_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.set_headers(md).ok();
        self.send_headers();
        Ok(())
    }

    fn set_trailer(&self, md: &Metadata) -> Result<(), TransportError> {
        self.set_trailers(md);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell as StdRefCell;
    use std::rc::Rc as StdRc;

    #[test]
    fn set_headers_after_send_fails_internal() {
        let st = RPCState::new("/test.Service/Echo");
        st.send_headers();
        let err = st.set_headers(&Metadata::new()).unwrap_err();
        assert_eq!(err.code(), StatusCode::Internal);
    }

    #[test]
    fn send_headers_is_idempotent() {
        let st = RPCState::new("/test.Service/Echo");
        let mut md = Metadata::new();
        md.add("h", "v1");
        st.set_headers(&md).unwrap();
        st.send_headers();
        st.send_headers();
        assert!(st.headers_sent());
        assert_eq!(st.response_headers().get("h"), Some(&["v1".to_string()][..]));
    }

    #[test]
    fn finish_ok_with_header_waiter_delivers_headers() {
        let st = RPCState::new("/test.Service/Echo");
        let mut md = Metadata::new();
        md.add("h", "v1");
        st.set_headers(&md).unwrap();
        let got = StdRc::new(StdRefCell::new(None));
        let g = got.clone();
        st.wait_for_headers(move |h, e| *g.borrow_mut() = Some((h, e)));
        st.finish_with_trailers(None);
        let (h, e) = got.borrow_mut().take().unwrap();
        assert!(e.is_none());
        assert_eq!(h.unwrap().get("h"), Some(&["v1".to_string()][..]));
    }

    #[test]
    fn finish_err_with_header_waiter_delivers_err_and_closes_responses() {
        let st = RPCState::new("/test.Service/Echo");
        let got = StdRc::new(StdRefCell::new(None));
        let g = got.clone();
        st.wait_for_headers(move |h, e| *g.borrow_mut() = Some((h, e)));
        st.finish_with_trailers(Some(Status::internal("boom")));
        let (h, e) = got.borrow_mut().take().unwrap();
        assert!(h.is_none());
        assert_eq!(e.unwrap().message(), "boom");
        assert!(st.responses.is_closed());
    }

    #[test]
    fn finish_closes_responses_exactly_once() {
        let st = RPCState::new("/test.Service/Echo");
        st.finish_with_trailers(Some(Status::canceled("first")));
        st.finish_with_trailers(Some(Status::internal("second")));
        assert_eq!(st.responses.err().unwrap().message(), "first");
    }

    #[test]
    fn send_response_flushes_headers_implicitly_on_first_send() {
        let st = RPCState::new("/test.Service/Count");
        let mut md = Metadata::new();
        md.add("h", "v1");
        st.set_headers(&md).unwrap();

        let got = StdRc::new(StdRefCell::new(None));
        let g = got.clone();
        st.wait_for_headers(move |h, e| *g.borrow_mut() = Some((h, e)));
        assert!(got.borrow().is_none(), "headers must not flush before the first response");

        st.response_sink().send(crate::message::Message::new(1u32));

        let (h, e) = got.borrow_mut().take().unwrap();
        assert!(e.is_none());
        assert_eq!(h.unwrap().get("h"), Some(&["v1".to_string()][..]));
        assert!(st.headers_sent());
    }

    #[test]
    fn send_response_is_a_noop_header_flush_once_already_sent() {
        let st = RPCState::new("/test.Service/Count");
        st.send_headers();
        st.response_sink().send(crate::message::Message::new(2u32));
        assert!(st.headers_sent());
        match st.responses.try_recv() {
            crate::half_stream::TryRecv::Message(m) => {
                assert_eq!(m.downcast::<u32>().unwrap(), 2);
            }
            _ => panic!("expected the sent response to be buffered"),
        }
    }

    #[test]
    fn set_trailers_merges_accumulate() {
        let st = RPCState::new("/test.Service/Echo");
        let mut md1 = Metadata::new();
        md1.add("status-detail", "ok");
        st.set_trailers(&md1);
        let mut md2 = Metadata::new();
        md2.add("status-detail", "also-ok");
        st.set_trailers(&md2);
        assert_eq!(
            st.response_trailers().get("status-detail"),
            Some(&["ok".to_string(), "also-ok".to_string()][..])
        );
    }
}
