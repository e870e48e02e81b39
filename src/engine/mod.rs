pub mod memstore;
pub mod persistence;
pub mod state;
pub mod writer;

pub use memstore::MemStore;
pub use persistence::FileStore;
pub use state::{ChangeEvent, StateManager};
pub use writer::{RetryPolicy, WriteQueue};
