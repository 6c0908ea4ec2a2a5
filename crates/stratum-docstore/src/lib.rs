#![doc = include_str!("../README.md")]

mod repository;
mod store;

pub use repository::DocRepository;
pub use store::{DocumentSession, DocumentStore};
