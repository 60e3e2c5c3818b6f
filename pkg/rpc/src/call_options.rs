use std::cell::RefCell;
use std::rc::Rc;

use common::errors::Error;

use crate::metadata::Metadata;
use crate::status::{unauthenticated_wrapping, Status};

pub type HeaderSink = Rc<RefCell<Metadata>>;
pub type TrailerSink = Rc<RefCell<Metadata>>;
pub type PeerSink = Rc<RefCell<Option<String>>>;

/// A provider of per-RPC credentials: metadata attached to a specific call
/// rather than the whole channel, plus a flag requiring transport security.
pub trait PerRpcCredentials {
    fn requires_transport_security(&self) -> bool;

    /// Returns metadata to attach to the outgoing call, keyed to `method`.
    fn get_metadata(&self, method: &str) -> Result<Metadata, Error>;
}

/// One item in a caller-supplied option list (§4.4). A closed tagged-variant
/// set per spec §9's design note ("use a sum type, not inheritance");
/// unrecognized kinds simply don't exist in this enum and are therefore
/// ignored at the call site by construction, satisfying forward-compat
/// without a catch-all arm.
pub enum CallOption {
    HeaderSink(HeaderSink),
    TrailerSink(TrailerSink),
    PeerSink(PeerSink),
    PerRpcCredentials(Rc<dyn PerRpcCredentials>),
    MaxRecvBytes(usize),
    MaxSendBytes(usize),
}

/// The bound result of a single traversal over a caller's option list.
#[derive(Default, Clone)]
pub struct CallOptions {
    header_sinks: Vec<HeaderSink>,
    trailer_sinks: Vec<TrailerSink>,
    peer_sinks: Vec<PeerSink>,
    creds: Option<Rc<dyn PerRpcCredentials>>,
    max_recv: Option<usize>,
    max_send: Option<usize>,
}

impl CallOptions {
    pub fn bind(options: impl IntoIterator<Item = CallOption>) -> Self {
        let mut bound = CallOptions::default();
        for option in options {
            match option {
                CallOption::HeaderSink(sink) => bound.header_sinks.push(sink),
                CallOption::TrailerSink(sink) => bound.trailer_sinks.push(sink),
                CallOption::PeerSink(sink) => bound.peer_sinks.push(sink),
                // Last-wins: a caller may legally pass credentials more than
                // once; only the final one takes effect (§4.4).
                CallOption::PerRpcCredentials(creds) => bound.creds = Some(creds),
                CallOption::MaxRecvBytes(n) => bound.max_recv = Some(n),
                CallOption::MaxSendBytes(n) => bound.max_send = Some(n),
            }
        }
        bound
    }

    pub fn max_recv(&self) -> Option<usize> {
        self.max_recv
    }

    pub fn max_send(&self) -> Option<usize> {
        self.max_send
    }

    pub fn creds(&self) -> Option<&Rc<dyn PerRpcCredentials>> {
        self.creds.as_ref()
    }

    /// Writes the final headers/trailers/peer into every referenced sink,
    /// supporting multiple observers per call (§4.4).
    pub fn populate_sinks(&self, headers: &Metadata, trailers: &Metadata, peer: Option<&str>) {
        for sink in &self.header_sinks {
            sink.borrow_mut().merge(headers);
        }
        for sink in &self.trailer_sinks {
            sink.borrow_mut().merge(trailers);
        }
        for sink in &self.peer_sinks {
            *sink.borrow_mut() = peer.map(|p| p.to_string());
        }
    }
}

/// Applies per-RPC credentials to `outgoing`, per the client-side policy
/// in spec §4.4. On success, `outgoing` may have been merged with the
/// provider's metadata; on failure, `outgoing` is left untouched and the
/// call must abort before dispatch without reaching the server.
pub fn apply_credentials(
    options: &CallOptions,
    method: &str,
    transport_is_secure: bool,
    outgoing: &mut Metadata,
) -> Result<(), Status> {
    let creds = match options.creds() {
        Some(creds) => creds,
        None => return Ok(()),
    };

    if creds.requires_transport_security() && !transport_is_secure {
        return Err(Status::unauthenticated(
            "per-RPC credentials require transport security but the channel is insecure",
        ));
    }

    let provided = creds
        .get_metadata(method)
        .map_err(|e| unauthenticated_wrapping(&e))?;

    if !provided.is_empty() {
        outgoing.merge(&provided);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;
    impl PerRpcCredentials for AlwaysFails {
        fn requires_transport_security(&self) -> bool {
            false
        }
        fn get_metadata(&self, _method: &str) -> Result<Metadata, Error> {
            Err(common::errors::err_msg("provider exploded"))
        }
    }

    struct RequiresSecure;
    impl PerRpcCredentials for RequiresSecure {
        fn requires_transport_security(&self) -> bool {
            true
        }
        fn get_metadata(&self, _method: &str) -> Result<Metadata, Error> {
            Ok(Metadata::new())
        }
    }

    struct Yields(&'static str, &'static str);
    impl PerRpcCredentials for Yields {
        fn requires_transport_security(&self) -> bool {
            false
        }
        fn get_metadata(&self, _method: &str) -> Result<Metadata, Error> {
            let mut md = Metadata::new();
            md.add(self.0, self.1);
            Ok(md)
        }
    }

    #[test]
    fn binding_preserves_sink_list_ordering() {
        let a: HeaderSink = Rc::new(RefCell::new(Metadata::new()));
        let b: HeaderSink = Rc::new(RefCell::new(Metadata::new()));
        let opts = CallOptions::bind(vec![
            CallOption::HeaderSink(a.clone()),
            CallOption::HeaderSink(b.clone()),
        ]);
        assert_eq!(opts.header_sinks.len(), 2);
        assert!(Rc::ptr_eq(&opts.header_sinks[0], &a));
        assert!(Rc::ptr_eq(&opts.header_sinks[1], &b));
    }

    #[test]
    fn requires_transport_security_over_insecure_channel_is_unauthenticated() {
        let opts = CallOptions::bind(vec![CallOption::PerRpcCredentials(Rc::new(RequiresSecure))]);
        let mut outgoing = Metadata::new();
        let err = apply_credentials(&opts, "/test.Service/Echo", false, &mut outgoing).unwrap_err();
        assert_eq!(err.code(), crate::status::StatusCode::Unauthenticated);
    }

    #[test]
    fn provider_error_wrapped_as_unauthenticated() {
        let opts = CallOptions::bind(vec![CallOption::PerRpcCredentials(Rc::new(AlwaysFails))]);
        let mut outgoing = Metadata::new();
        let err = apply_credentials(&opts, "/test.Service/Echo", true, &mut outgoing).unwrap_err();
        assert_eq!(err.code(), crate::status::StatusCode::Unauthenticated);
    }

    #[test]
    fn empty_metadata_leaves_outgoing_context_unchanged() {
        struct EmptyYield;
        impl PerRpcCredentials for EmptyYield {
            fn requires_transport_security(&self) -> bool {
                false
            }
            fn get_metadata(&self, _method: &str) -> Result<Metadata, Error> {
                Ok(Metadata::new())
            }
        }
        let opts = CallOptions::bind(vec![CallOption::PerRpcCredentials(Rc::new(EmptyYield))]);
        let mut outgoing = Metadata::new();
        outgoing.add("existing", "v");
        apply_credentials(&opts, "/test.Service/Echo", true, &mut outgoing).unwrap();
        assert_eq!(outgoing.len(), 1);
    }

    #[test]
    fn successful_provider_merges_into_outgoing() {
        let opts = CallOptions::bind(vec![CallOption::PerRpcCredentials(Rc::new(Yields(
            "auth", "token-123",
        )))]);
        let mut outgoing = Metadata::new();
        apply_credentials(&opts, "/test.Service/Echo", true, &mut outgoing).unwrap();
        assert_eq!(outgoing.get("auth"), Some(&["token-123".to_string()][..]));
    }

    #[test]
    fn populate_sinks_writes_every_referenced_sink() {
        let s1: HeaderSink = Rc::new(RefCell::new(Metadata::new()));
        let s2: HeaderSink = Rc::new(RefCell::new(Metadata::new()));
        let opts = CallOptions::bind(vec![
            CallOption::HeaderSink(s1.clone()),
            CallOption::HeaderSink(s2.clone()),
        ]);
        let mut headers = Metadata::new();
        headers.add("h", "v");
        opts.populate_sinks(&headers, &Metadata::new(), None);
        assert_eq!(s1.borrow().get("h"), Some(&["v".to_string()][..]));
        assert_eq!(s2.borrow().get("h"), Some(&["v".to_string()][..]));
    }
}
