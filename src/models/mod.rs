pub mod connections;
pub mod schema;
pub mod summary;
