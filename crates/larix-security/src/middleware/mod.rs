//! Security middleware

pub mod cors;
pub mod csrf;
pub mod throttle;

pub use cors::CorsMiddleware;
pub use csrf::{tokens_match, CsrfMiddleware};
pub use throttle::{ThrottleMiddleware, ThrottleStatus};
