use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

use crate::message::Message;
use crate::status::Status;

type Waiter = Box<dyn FnOnce(Option<Message>, Option<Status>)>;

struct Inner {
    buffer: VecDeque<Message>,
    waiter: Option<Waiter>,
    closed: bool,
    err: Option<Status>,
}

/// One direction of an RPC: a FIFO buffer with an optional single
/// outstanding receiver callback, and a monotonic closed/err pair.
///
/// Deliberately `Rc<RefCell<_>>`, not `Arc<Mutex<_>>` — per spec §5, the
/// core is single-threaded by construction and this is not the one
/// surface (`server_transport::UnaryServerTransportSurface`) that is
/// exempted from that rule.
#[derive(Clone)]
pub struct HalfStream {
    inner: Rc<RefCell<Inner>>,
}

/// Rust's type system already rules out a literal null `Message` (§4.1's
/// "nil-message rejection" is enforced structurally here, not at runtime),
/// so `send` takes a `Message` by value rather than `Option<Message>`.
impl HalfStream {
    pub fn new() -> Self {
        HalfStream {
            inner: Rc::new(RefCell::new(Inner {
                buffer: VecDeque::new(),
                waiter: None,
                closed: false,
                err: None,
            })),
        }
    }

    /// Enqueues `message`, or hands it straight to a pending waiter.
    /// Idempotent end-of-stream signal once closed: the message is simply
    /// dropped and the call still returns normally.
    pub fn send(&self, message: Message) {
        let waiter = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            if inner.waiter.is_some() {
                inner.waiter.take()
            } else {
                inner.buffer.push_back(message);
                return;
            }
        };
        if let Some(waiter) = waiter {
            waiter(Some(message), None);
        }
    }

    /// Registers `cb` as the sole waiter, or fires it synchronously if a
    /// message or closure is already observable.
    ///
    /// Fatal (panics) if a waiter is already pending: two concurrent
    /// `recv` calls on one half-stream is a protocol violation (§4.1).
    pub fn recv(&self, cb: impl FnOnce(Option<Message>, Option<Status>) + 'static) {
        let mut inner = self.inner.borrow_mut();
        if inner.waiter.is_some() {
            log::error!("protocol violation: HalfStream::recv called with a waiter already pending");
            panic!("HalfStream::recv called with a waiter already pending");
        }
        if let Some(message) = inner.buffer.pop_front() {
            drop(inner);
            cb(Some(message), None);
        } else if inner.closed {
            let err = inner.err.clone();
            drop(inner);
            cb(None, err);
        } else {
            inner.waiter = Some(Box::new(cb));
        }
    }

    /// Marks the stream closed. First call wins: `err` is recorded only
    /// once. If a waiter is pending, it fires immediately with
    /// `(None, err)`. Already-buffered messages are untouched and remain
    /// observable via later `recv` calls (drain-before-close).
    pub fn close(&self, err: Option<Status>) {
        let waiter = {
            let mut inner = self.inner.borrow_mut();
            if inner.closed {
                return;
            }
            inner.closed = true;
            inner.err = err;
            inner.waiter.take()
        };
        if let Some(waiter) = waiter {
            let err = self.inner.borrow().err.clone();
            waiter(None, err);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    pub fn err(&self) -> Option<Status> {
        self.inner.borrow().err.clone()
    }

    /// A non-installing peek: pops a buffered message, reports terminal
    /// closure, or reports that neither is available yet. Unlike `recv`,
    /// this never touches the waiter slot and never panics — it's the
    /// glue layer's way of draining a stream that it knows is driven
    /// synchronously (e.g. a handler that runs to completion before the
    /// caller starts consuming), without pretending to be a second
    /// concurrent receiver.
    pub fn try_recv(&self) -> TryRecv {
        let mut inner = self.inner.borrow_mut();
        if let Some(message) = inner.buffer.pop_front() {
            TryRecv::Message(message)
        } else if inner.closed {
            TryRecv::Closed(inner.err.clone())
        } else {
            TryRecv::Empty
        }
    }

    /// Convenience over `try_recv` for callers that only care about a
    /// buffered message, not the distinction between "closed" and "empty".
    pub fn try_recv_message(&self) -> Option<Message> {
        match self.try_recv() {
            TryRecv::Message(m) => Some(m),
            _ => None,
        }
    }
}

pub enum TryRecv {
    Message(Message),
    Closed(Option<Status>),
    Empty,
}

impl Default for HalfStream {
    fn default() -> Self {
        Self::new()
    }
}
