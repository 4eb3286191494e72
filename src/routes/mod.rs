//! HTTP route handlers outside the auth module.

pub mod health;
pub mod users;
