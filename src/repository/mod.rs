pub mod sessions;
pub mod sqlite;
pub mod users;
