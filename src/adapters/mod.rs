pub mod database;
pub mod request;
