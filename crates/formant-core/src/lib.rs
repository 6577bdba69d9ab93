#![forbid(unsafe_code)]

//! Core model primitives: the dynamic [`Value`] type, object lifecycle with
//! cascading destruction, the load/refresh protocol, and the persistence
//! provider contract.

pub mod error;
pub mod lifecycle;
pub mod load;
pub mod persist;
pub mod value;

pub use error::CoreError;
pub use lifecycle::{Destroy, Lifecycle};
pub use load::{LoadSpec, LoadSupport, Loadable, load_all_async};
pub use persist::{FileBackend, MemoryBackend, PersistenceBackend, PersistenceProvider};
pub use value::Value;
