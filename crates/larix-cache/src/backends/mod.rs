//! Cache backend implementations

pub mod database;
pub mod file;
pub mod memory;
pub mod null;

#[cfg(feature = "redis-backend")]
pub mod redis;

pub use database::DatabaseBackend;
pub use file::FileBackend;
pub use memory::MemoryBackend;
pub use null::NullBackend;

#[cfg(feature = "redis-backend")]
pub use self::redis::{RedisBackend, RedisConfig};
