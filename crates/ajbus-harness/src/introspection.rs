//! A static [`ajbus_core::external::Introspection`] registry, standing in
//! for the object/interface registration table the spec places out of
//! scope (§1): entries are registered directly by the test rather than
//! built from an introspection XML document.

use ajbus_core::external::{Introspection, MessageInit, MsgId};
use ajbus_core::BusError;
use ajbus_wire::{HeaderFields, MsgType};

/// One registered logical message: the id it's keyed by, the message type
/// it's valid for, and the header-field metadata [`Introspection::init_message`]
/// returns for it.
#[derive(Debug, Clone)]
struct Entry {
    msg_id: MsgId,
    msg_type: MsgType,
    init: MessageInit,
}

/// An [`Introspection`] registry built from a fixed table of entries,
/// registered up front rather than discovered from a router.
#[derive(Debug, Default, Clone)]
pub struct StaticIntrospection {
    entries: Vec<Entry>,
}

impl StaticIntrospection {
    /// Builds an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a message, builder-style.
    #[must_use]
    pub fn with_message(mut self, msg_id: MsgId, msg_type: MsgType, init: MessageInit) -> Self {
        self.entries.push(Entry { msg_id, msg_type, init });
        self
    }
}

impl Introspection for StaticIntrospection {
    fn init_message(&self, msg_id: MsgId, msg_type: MsgType) -> Result<MessageInit, BusError> {
        self.entries
            .iter()
            .find(|e| e.msg_id == msg_id && e.msg_type == msg_type)
            .map(|e| e.init.clone())
            .ok_or(BusError::Null)
    }

    fn identify(&self, header_fields: &HeaderFields) -> Result<MsgId, BusError> {
        self.entries
            .iter()
            .find(|e| {
                e.init.object_path.as_str() == header_fields.object_path.as_deref().unwrap_or_default()
                    && e.init.interface.as_str() == header_fields.interface.as_deref().unwrap_or_default()
                    && e.init.member.as_str() == header_fields.member.as_deref().unwrap_or_default()
            })
            .map(|e| e.msg_id)
            .ok_or(BusError::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_init() -> MessageInit {
        MessageInit {
            object_path: "/sample".into(),
            interface: "org.example.Sample".into(),
            member: "Ping".into(),
            signature: "s".into(),
            secure: false,
        }
    }

    #[test]
    fn init_message_returns_registered_metadata() {
        let reg = StaticIntrospection::new().with_message(MsgId::new(1), MsgType::MethodCall, sample_init());
        let init = reg.init_message(MsgId::new(1), MsgType::MethodCall).expect("registered");
        assert_eq!(init.member, "Ping");
    }

    #[test]
    fn init_message_rejects_wrong_msg_type() {
        let reg = StaticIntrospection::new().with_message(MsgId::new(1), MsgType::MethodCall, sample_init());
        assert_eq!(reg.init_message(MsgId::new(1), MsgType::Signal), Err(BusError::Null));
    }

    #[test]
    fn identify_reverse_looks_up_by_triple() {
        let reg = StaticIntrospection::new().with_message(MsgId::new(7), MsgType::MethodCall, sample_init());
        let fields = HeaderFields::default()
            .with_object_path("/sample")
            .with_interface("org.example.Sample")
            .with_member("Ping");
        assert_eq!(reg.identify(&fields), Ok(MsgId::new(7)));
    }

    #[test]
    fn identify_fails_for_unregistered_triple() {
        let reg = StaticIntrospection::new().with_message(MsgId::new(7), MsgType::MethodCall, sample_init());
        let fields = HeaderFields::default().with_object_path("/other");
        assert_eq!(reg.identify(&fields), Err(BusError::Null));
    }
}
