use std::cell::Cell;
use std::rc::Rc;

use crate::call_options::{apply_credentials, CallOptions};
use crate::event_loop::{CancellationToken, EventLoop};
use crate::half_stream::TryRecv;
use crate::message::Message;
use crate::method::MethodType;
use crate::metadata::Metadata;
use crate::rpc_state::RPCState;
use crate::server::{RpcContext, Server};
use crate::server_transport::{ServerTransportSurface, UnaryServerTransportSurface};
use crate::status::{translate_context_error, ContextError, Status, StatusCode};

/// Drains whatever is currently buffered on the responses half-stream,
/// feeding `consumer`. Returns `true` once the terminal close has been
/// observed and delivered.
fn drain_responses(rpc_state: &RPCState, consumer: &mut dyn FnMut(Option<Message>, Option<Status>)) -> bool {
    loop {
        match rpc_state.responses.try_recv() {
            TryRecv::Message(m) => consumer(Some(m), None),
            TryRecv::Closed(err) => {
                consumer(None, err);
                return true;
            }
            TryRecv::Empty => return false,
        }
    }
}

/// The client-side entry point: dispatches a call to whatever `Server` the
/// channel was built against, in-process, with no wire format in between
/// (§2's data-flow paragraph, §6).
pub struct Channel {
    server: Rc<Server>,
    secure: bool,
    event_loop: EventLoop,
}

impl Channel {
    pub fn new(server: Rc<Server>, secure: bool) -> Self {
        Channel {
            server,
            secure,
            event_loop: EventLoop::new(),
        }
    }

    /// Invokes `method`. `producer` is called repeatedly to obtain the next
    /// outgoing request (`(message, end_of_stream)`); `consumer` is called
    /// for each response and, exactly once, at completion with the
    /// terminal status (§6). Returns only once the response stream has
    /// been fully consumed and the caller's sinks populated.
    pub fn call(
        &self,
        cancel: Option<Rc<dyn CancellationToken>>,
        method: &str,
        initial_metadata: Metadata,
        options: CallOptions,
        mut producer: impl FnMut() -> (Option<Message>, bool),
        mut consumer: impl FnMut(Option<Message>, Option<Status>),
    ) {
        log::debug!("dispatching call to {}", method);
        let mut outgoing = initial_metadata;
        if let Err(status) = apply_credentials(&options, method, self.secure, &mut outgoing) {
            log::warn!("call to {} rejected by credentials: {}", method, status);
            consumer(None, Some(status));
            return;
        }

        let (method_type, handler) = match self.server.find(method) {
            Some(found) => found,
            None => {
                log::warn!("unknown method: {}", method);
                consumer(
                    None,
                    Some(Status::new(
                        StatusCode::Unimplemented,
                        format!("unknown method: {}", method),
                    )),
                );
                return;
            }
        };

        let rpc_state = RPCState::new(method);
        let cancelled = Rc::new(Cell::new(false));
        if let Some(token) = cancel.as_ref() {
            let cancelled_flag = cancelled.clone();
            let rpc_state_for_cancel = rpc_state.clone();
            let context_error = token.context_error();
            let method_for_cancel = method.to_string();
            let event_loop_for_cancel = self.event_loop.clone();
            token.on_cancelled(Box::new(move || {
                // Crossing into the core from outside the loop: submit a
                // task rather than mutating `rpc_state`/the half-streams
                // here directly (§4.3). The token may fire mid-producer, so
                // this only takes effect once the dispatch loop reaches its
                // next scheduling boundary and drains the event loop.
                event_loop_for_cancel.submit(move || {
                    cancelled_flag.set(true);
                    let message = match context_error {
                        ContextError::Canceled => "call canceled",
                        ContextError::DeadlineExceeded => "deadline exceeded",
                    };
                    log::debug!("{} on call to {}", message, method_for_cancel);
                    let status = translate_context_error(context_error, message);
                    rpc_state_for_cancel.requests.close(Some(status.clone()));
                    rpc_state_for_cancel.finish_with_trailers(Some(status));
                });
            }));
            if token.is_cancelled() {
                cancelled.set(true);
            }
        }

        let (transport, finisher): (Rc<dyn ServerTransportSurface>, Rc<dyn Fn(Status)>) =
            if method_type == MethodType::Unary {
                let unary = Rc::new(UnaryServerTransportSurface::new(method));
                let finisher: Rc<dyn Fn(Status)> = {
                    let unary = unary.clone();
                    let rpc_state = rpc_state.clone();
                    Rc::new(move |status: Status| {
                        unary.finish();
                        let headers = unary.headers();
                        if !headers.is_empty() {
                            let _ = rpc_state.set_headers(&headers);
                        }
                        rpc_state.send_headers();
                        let trailers = unary.trailers();
                        if !trailers.is_empty() {
                            rpc_state.set_trailers(&trailers);
                        }
                        let err = if status.is_ok() { None } else { Some(status) };
                        rpc_state.finish_with_trailers(err);
                    })
                };
                (unary as Rc<dyn ServerTransportSurface>, finisher)
            } else {
                let finisher: Rc<dyn Fn(Status)> = {
                    let rpc_state = rpc_state.clone();
                    Rc::new(move |status: Status| {
                        let err = if status.is_ok() { None } else { Some(status) };
                        rpc_state.finish_with_trailers(err);
                    })
                };
                (
                    Rc::new(rpc_state.clone()) as Rc<dyn ServerTransportSurface>,
                    finisher,
                )
            };

        let ctx = RpcContext::new(
            rpc_state.requests.clone(),
            rpc_state.response_sink(),
            transport,
            finisher,
            cancelled.clone(),
        );

        if method_type.is_streaming_request() {
            // Client-stream / bidi: the handler registers its own
            // continuation (typically a chain of `requests.recv` calls)
            // before any request is sent, then each `producer`/`send`
            // round trip resumes it synchronously (§9's "synchronous-
            // where-possible delivery"). Draining after every round trip
            // gives genuinely interleaved consumption, matching the bidi
            // scenario in §8 ("each send is followed by recv yielding the
            // same value") rather than a batch at the very end.
            handler(ctx);
            let mut finished = false;
            loop {
                if cancelled.get() {
                    break;
                }
                let (msg, eos) = producer();
                // Scheduling boundary: a cancellation/deadline fired by
                // `producer` only submitted a task (see above); run it now,
                // before touching the half-streams for this round trip.
                self.event_loop.run_once();
                if cancelled.get() {
                    break;
                }
                if let Some(m) = msg {
                    rpc_state.requests.send(m);
                }
                if drain_responses(&rpc_state, &mut consumer) {
                    finished = true;
                }
                if eos {
                    rpc_state.requests.close(None);
                    break;
                }
                if finished {
                    break;
                }
            }
            if !finished {
                drain_responses(&rpc_state, &mut consumer);
            }
        } else {
            // Unary / server-stream: a singleton request, sent in full
            // before the handler runs.
            let (msg, _eos) = producer();
            self.event_loop.run_once();
            if let Some(m) = msg {
                rpc_state.requests.send(m);
            }
            rpc_state.requests.close(None);
            handler(ctx);
            self.event_loop.run_once();
            drain_responses(&rpc_state, &mut consumer);
        }

        options.populate_sinks(
            &rpc_state.response_headers(),
            &rpc_state.response_trailers(),
            None,
        );
    }

    /// Exposes the channel's `EventLoop` so tests can prove it's actually
    /// drained as part of dispatch, not just wired in name only.
    #[cfg(test)]
    fn event_loop_for_test(&self) -> EventLoop {
        self.event_loop.clone()
    }
}
