mod core;

pub use self::core::{CoreError, CoreResult};
