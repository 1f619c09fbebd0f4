//! Remote implementations of the service traits.

pub mod http;

pub use http::{HttpAccountService, ENS_DOMAIN};
