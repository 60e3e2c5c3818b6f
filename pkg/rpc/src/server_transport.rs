use std::fmt;
use std::sync::Mutex;

use crate::metadata::Metadata;

/// A protocol fault returned by the server-transport adapter: recoverable
/// at the handler, unlike the fatal programmer-error faults in
/// `half_stream`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportError {
    HeadersAlreadySent,
    TrailersAlreadySent,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TransportError::HeadersAlreadySent => f.write_str("headers already sent"),
            TransportError::TrailersAlreadySent => f.write_str("trailers already sent"),
        }
    }
}

impl std::error::Error for TransportError {}

struct UnaryInner {
    headers: Metadata,
    trailers: Metadata,
    headers_sent: bool,
    finished: bool,
}

/// The handler-facing accumulator for unary calls (§4.5). Internally
/// serialized by a mutex because a handler may legitimately touch it from
/// a thread it spawned itself, outside the event loop — this is the one
/// place in the core where that is true (§5).
pub struct UnaryServerTransportSurface {
    method: String,
    inner: Mutex<UnaryInner>,
}

impl UnaryServerTransportSurface {
    pub fn new(method: impl Into<String>) -> Self {
        UnaryServerTransportSurface {
            method: method.into(),
            inner: Mutex::new(UnaryInner {
                headers: Metadata::new(),
                trailers: Metadata::new(),
                headers_sent: false,
                finished: false,
            }),
        }
    }

    pub fn method(&self) -> &str {
        &self.method
    }

    pub fn set_header(&self, md: &Metadata) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.headers_sent || inner.finished {
            return Err(TransportError::HeadersAlreadySent);
        }
        inner.headers.merge(md);
        Ok(())
    }

    pub fn send_header(&self, md: &Metadata) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.headers_sent || inner.finished {
            return Err(TransportError::HeadersAlreadySent);
        }
        inner.headers.merge(md);
        inner.headers_sent = true;
        Ok(())
    }

    pub fn set_trailer(&self, md: &Metadata) -> Result<(), TransportError> {
        let mut inner = self.inner.lock().unwrap();
        if inner.finished {
            return Err(TransportError::TrailersAlreadySent);
        }
        inner.trailers.merge(md);
        Ok(())
    }

    /// Marks the call finished: subsequent `set_trailer` calls fail.
    pub fn finish(&self) {
        self.inner.lock().unwrap().finished = true;
    }

    pub fn headers(&self) -> Metadata {
        self.inner.lock().unwrap().headers.clone()
    }

    pub fn trailers(&self) -> Metadata {
        self.inner.lock().unwrap().trailers.clone()
    }
}

/// The conceptual interface both server-transport variants share.
pub trait ServerTransportSurface {
    fn method(&self) -> &str;
    fn set_header(&self, md: &Metadata) -> Result<(), TransportError>;
    fn send_header(&self, md: &Metadata) -> Result<(), TransportError>;
    fn set_trailer(&self, md: &Metadata) -> Result<(), TransportError>;
}

impl ServerTransportSurface for UnaryServerTransportSurface {
    fn method(&self) -> &str {
        self.method()
    }
    fn set_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.set_header(md)
    }
    fn send_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.send_header(md)
    }
    fn set_trailer(&self, md: &Metadata) -> Result<(), TransportError> {
        self.set_trailer(md)
    }
}

/// The live server-stream collaborator that `StreamServerTransportSurface`
/// forwards to. `set_trailer_checked`'s default forwards to the infallible
/// `set_trailer`; a stream that actually offers an error-returning trailer
/// setter overrides it, per the capability probe in spec §4.5.
pub trait LiveServerStream {
    fn method(&self) -> &str;
    fn set_header(&self, md: &Metadata);
    fn send_header(&self, md: &Metadata);
    fn set_trailer(&self, md: &Metadata);

    fn set_trailer_checked(&self, md: &Metadata) -> Result<(), TransportError> {
        self.set_trailer(md);
        Ok(())
    }
}

/// A thin delegate over a live server stream; holds no state of its own
/// (§4.5).
pub struct StreamServerTransportSurface<S> {
    stream: S,
}

impl<S: LiveServerStream> StreamServerTransportSurface<S> {
    pub fn new(stream: S) -> Self {
        StreamServerTransportSurface { stream }
    }
}

impl<S: LiveServerStream> ServerTransportSurface for StreamServerTransportSurface<S> {
    fn method(&self) -> &str {
        self.stream.method()
    }
    fn set_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.stream.set_header(md);
        Ok(())
    }
    fn send_header(&self, md: &Metadata) -> Result<(), TransportError> {
        self.stream.send_header(md);
        Ok(())
    }
    fn set_trailer(&self, md: &Metadata) -> Result<(), TransportError> {
        self.stream.set_trailer_checked(md)
    }
}
