/// The four call shapes determined by whether each direction is singleton
/// or stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodType {
    Unary,
    ClientStreaming,
    ServerStreaming,
    BidiStreaming,
}

impl MethodType {
    /// Unary and server-streaming methods have a singleton request; the
    /// streaming variants do not.
    pub fn is_streaming_request(&self) -> bool {
        matches!(self, MethodType::ClientStreaming | MethodType::BidiStreaming)
    }

    pub fn is_streaming_response(&self) -> bool {
        matches!(self, MethodType::ServerStreaming | MethodType::BidiStreaming)
    }
}

#[derive(Debug, Clone)]
pub struct MethodDescriptor {
    pub name: String,
    pub method_type: MethodType,
}

impl MethodDescriptor {
    pub fn new(name: impl Into<String>, method_type: MethodType) -> Self {
        MethodDescriptor {
            name: name.into(),
            method_type,
        }
    }
}

/// A service's method table: a pair of ordered lists, one for unary
/// methods and one for all three streaming shapes. Lookup is a linear
/// scan (§4.7) — service descriptors are small and fixed, so a hash table
/// buys nothing but an extra dependency and allocation.
#[derive(Debug, Clone, Default)]
pub struct ServiceDescriptor {
    pub unary_methods: Vec<MethodDescriptor>,
    pub streaming_methods: Vec<MethodDescriptor>,
}

impl ServiceDescriptor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_unary(&mut self, name: impl Into<String>) -> &mut Self {
        self.unary_methods
            .push(MethodDescriptor::new(name, MethodType::Unary));
        self
    }

    pub fn add_client_streaming(&mut self, name: impl Into<String>) -> &mut Self {
        self.streaming_methods
            .push(MethodDescriptor::new(name, MethodType::ClientStreaming));
        self
    }

    pub fn add_server_streaming(&mut self, name: impl Into<String>) -> &mut Self {
        self.streaming_methods
            .push(MethodDescriptor::new(name, MethodType::ServerStreaming));
        self
    }

    pub fn add_bidi_streaming(&mut self, name: impl Into<String>) -> &mut Self {
        self.streaming_methods
            .push(MethodDescriptor::new(name, MethodType::BidiStreaming));
        self
    }

    /// Finds the entry whose name equals `method`, scanning unary methods
    /// then streaming methods, in declaration order.
    pub fn find(&self, method: &str) -> Option<&MethodDescriptor> {
        for m in &self.unary_methods {
            if m.name == method {
                return Some(m);
            }
        }
        for m in &self.streaming_methods {
            if m.name == method {
                return Some(m);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_unary_and_streaming_entries_by_name() {
        let mut sd = ServiceDescriptor::new();
        sd.add_unary("/test.Service/Echo");
        sd.add_server_streaming("/test.Service/Count");
        assert_eq!(
            sd.find("/test.Service/Echo").unwrap().method_type,
            MethodType::Unary
        );
        assert_eq!(
            sd.find("/test.Service/Count").unwrap().method_type,
            MethodType::ServerStreaming
        );
    }

    #[test]
    fn missing_method_returns_none() {
        let sd = ServiceDescriptor::new();
        assert!(sd.find("/test.Service/Nope").is_none());
    }
}
