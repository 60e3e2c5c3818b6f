//! In-process RPC transport core: callback-driven half-streams, per-call
//! state, call-option binding, and the server-transport surface, with no
//! wire format, network I/O, or code generation involved.
//!
//! See `status`, `metadata`, and `half_stream` for the foundational types;
//! `rpc_state` for the object that ties two half-streams into one call;
//! `call_options` for client-side option binding and credentials;
//! `server_transport` and `method` for the handler-facing surface and
//! dispatch table; `channel` and `server` for the glue that ties it all
//! together into something an application can call and register against.

pub mod call_options;
pub mod channel;
pub mod event_loop;
pub mod half_stream;
pub mod message;
pub mod method;
pub mod metadata;
pub mod rpc_state;
pub mod server;
pub mod server_transport;
pub mod status;

pub use call_options::{CallOption, CallOptions, PerRpcCredentials};
pub use channel::Channel;
pub use event_loop::{CancellationToken, EventLoop};
pub use half_stream::HalfStream;
pub use message::Message;
pub use method::{MethodDescriptor, MethodType, ServiceDescriptor};
pub use metadata::Metadata;
pub use rpc_state::{ResponseSink, RPCState};
pub use server::{RpcContext, Server};
pub use server_transport::{
    LiveServerStream, ServerTransportSurface, StreamServerTransportSurface, TransportError,
    UnaryServerTransportSurface,
};
pub use status::{Status, StatusCode};
