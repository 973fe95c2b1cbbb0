//! Control-plane store.
//!
//! [`Store`] is the object-safe, untyped interface a backend implements;
//! [`StoreExt`] layers typed access over any store.

mod error;
mod event;
mod memory;
mod traits;

pub use error::{Result, StoreError};
pub use event::Event;
pub use memory::MemoryStore;
pub use traits::{RawObject, Store, StoreExt};
