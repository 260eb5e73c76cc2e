pub mod exchange;
pub mod frame;

pub use exchange::{ExchangeError, Gateway};

/// Media type of every encrypted exchange body
pub const CONTENT_TYPE: &str = "application/x-koubachi-aes-encrypted";
