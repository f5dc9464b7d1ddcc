pub mod auth;
pub mod flash;
pub mod image;
pub mod user;
