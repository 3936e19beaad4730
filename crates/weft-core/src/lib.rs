mod error;
mod retry;

pub use error::WeftError;
pub use retry::{retry, RetryConfig};
