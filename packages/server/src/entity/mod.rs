pub mod blob_chunk;
pub mod blob_file;
pub mod bookmark;
pub mod resource;
pub mod resource_like;
pub mod role;
pub mod role_permission;
pub mod user;
