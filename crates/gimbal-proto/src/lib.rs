pub mod inbound;

pub use inbound::{decode, DecodeError, InboundCommand, SetMode, SetPhoneGyro};
