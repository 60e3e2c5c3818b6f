// Shared, low level utilities used across the workspace: primarily the
// `errors` prelude that every other crate pulls in for fallible plumbing
// that isn't itself an RPC status (parsing, option binding, I/O at the
// embedding layer).

pub extern crate failure;

pub use failure::Fail;

/// Common error handling prelude.
///
/// Everything in the workspace that isn't specifically an RPC `Status`
/// (see `rpc::status`) uses this `Result` alias, matching the rest of the
/// surrounding codebase.
pub mod errors {
    pub use failure::err_msg;
    pub use failure::format_err;
    pub use failure::Error;

    pub type Result<T> = std::result::Result<T, Error>;
}
