pub mod compare;
pub mod db;
pub mod errors;
pub mod models;
pub mod report;
pub mod session;
pub mod verify;

pub use errors::DbError;
pub use models::connections::DbEngine;
pub use session::{run_comparison, CompareOptions, CompareSession};
