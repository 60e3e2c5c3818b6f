use std::any::Any;
use std::fmt;

/// An opaque value flowing through a half-stream.
///
/// The core never inspects message contents: method dispatch is resolved
/// by name at runtime (§4.7), so the concrete request/response types are
/// known only to the handler and the generated stub, not to this crate.
/// `Message` exists purely so half-streams have something concrete to
/// buffer and hand back.
pub struct Message(Box<dyn Any + Send>);

impl Message {
    pub fn new<T: Any + Send>(value: T) -> Self {
        Message(Box::new(value))
    }

    pub fn downcast<T: Any + Send>(self) -> Result<T, Message> {
        match self.0.downcast::<T>() {
            Ok(boxed) => Ok(*boxed),
            Err(boxed) => Err(Message(boxed)),
        }
    }

    pub fn downcast_ref<T: Any + Send>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }
}

impl fmt::Debug for Message {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("Message(..)")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_downcast() {
        let m = Message::new(42u32);
        assert_eq!(m.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn wrong_type_downcast_returns_message_back() {
        let m = Message::new(42u32);
        let m = m.downcast::<String>().unwrap_err();
        assert_eq!(m.downcast::<u32>().unwrap(), 42);
    }

    #[test]
    fn downcast_ref_does_not_consume() {
        let m = Message::new("hello".to_string());
        assert_eq!(m.downcast_ref::<String>().unwrap(), "hello");
    }
}
