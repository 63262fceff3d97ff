pub mod amf0;
pub mod errors;

pub use amf0::Value;
