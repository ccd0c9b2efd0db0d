pub mod loader;
pub mod query;
