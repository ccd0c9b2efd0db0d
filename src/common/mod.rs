pub mod database;
pub mod helpers;
pub mod row_set;
