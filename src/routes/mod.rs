pub mod admin;
pub mod auth;
pub mod files;
pub mod health;
pub mod share;
pub mod users;
