//! Queue module: retry policy and the two task store backends.

mod memory;
mod retry;
mod sqlite;

pub use memory::InMemoryTaskStore;
pub use retry::RetryPolicy;
pub use sqlite::SqliteTaskStore;
