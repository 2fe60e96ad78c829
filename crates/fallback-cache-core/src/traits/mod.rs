//! Core traits for cache operations

mod backend;
mod observer;
mod serializer;
mod tracing_observer;

pub use backend::CacheBackend;
pub use observer::{FailoverEventKind, FailoverObserver, NoopObserver};
pub use serializer::{JsonSerializer, Serializer};
pub use tracing_observer::TracingObserver;

#[cfg(feature = "metrics")]
pub use observer::MetricsObserver;

#[cfg(feature = "msgpack")]
pub use serializer::MsgPackSerializer;

#[cfg(feature = "bincode")]
pub use serializer::BincodeSerializer;
