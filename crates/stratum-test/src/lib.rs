#![doc = include_str!("../README.md")]

mod repository;
mod storage;

pub use repository::MemoryRepository;
pub use storage::SimpleSessionStorage;
