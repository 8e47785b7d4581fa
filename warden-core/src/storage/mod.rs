//! Storage backends shipped with the core crate
//!
//! Networked and durable backends live in their own crates
//! (`warden-storage-redis`, `warden-storage-sqlite`).

pub mod disk;
pub mod memory;

pub use disk::DiskFileStorage;
pub use memory::{
    InMemoryAccountRepository, InMemoryCounterStore, InMemoryFileStorage, InMemoryRepositories,
};
