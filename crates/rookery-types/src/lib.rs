pub mod api;
pub mod models;
pub mod permission;
pub mod post;
