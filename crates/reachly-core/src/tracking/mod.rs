//! Outbound tracking: token codec and HTML instrumentation

pub mod instrument;
pub mod token;

pub use instrument::LinkInstrumenter;
pub use token::{TokenCodec, TokenPayload};
