//! Multiplexing up to three co-registered volumes into one colour image.

pub mod channel;
pub mod compositor;

pub use channel::{Channel, ChannelAssignment};
pub use compositor::{compose, normalize_unit, Composite, LumaWeights};
