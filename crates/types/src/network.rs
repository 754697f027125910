//! Network message marker trait.

/// A message that travels between peers under a fixed topic.
pub trait NetworkMessage {
    /// Topic string identifying the message type on the wire.
    fn message_type_id() -> &'static str;
}
