//! Call and outcome types shared by the resilience components.

mod call;
mod response;

pub use call::{Call, CallSpec, Dependency, RetryMethod};
pub use response::{RateLimitHeaders, RetryableResponse, StatusOnly};
