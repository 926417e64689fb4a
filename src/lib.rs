pub mod app;
pub mod auth;
pub mod config;
pub mod error;
pub mod mail;
pub mod query;
pub mod render;
pub mod resource;
pub mod response;
pub mod routes;
pub mod state;
pub mod store;
