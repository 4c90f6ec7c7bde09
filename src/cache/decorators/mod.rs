//! Cache decorators. Each wraps a delegate and layers one concern;
//! eviction decorators own their bookkeeping and evict through the
//! delegate so outer serialization and locking stay intact.

mod blocking;
mod fifo;
mod logging;
mod lru;
mod scheduled;
mod serialized;
mod soft;
mod synchronized;
mod weak;

pub use blocking::BlockingCache;
pub use fifo::FifoCache;
pub use logging::LoggingCache;
pub use lru::LruCache;
pub use scheduled::ScheduledCache;
pub use serialized::SerializedCache;
pub use soft::SoftCache;
pub use synchronized::SynchronizedCache;
pub use weak::WeakCache;
