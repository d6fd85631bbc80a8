pub mod catalog;
pub mod filename;
pub mod hash;
pub mod jwt;
