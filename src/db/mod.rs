mod repository;
mod schema;

pub use repository::{CategoryBatch, Repository};
