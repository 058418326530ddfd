// # Store Implementations
//
// In-memory implementations of every store trait, plus JSON-file binding and
// credential stores for deployments that must survive restarts.

pub mod file;
pub mod memory;

pub use file::{FileBindingStore, FileCredentialStore};
pub use memory::{MemoryBindingStore, MemoryCredentialStore, MemoryMetricsStore};
