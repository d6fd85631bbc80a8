pub mod admin;
pub mod auth;
pub mod file;
pub mod resource;
