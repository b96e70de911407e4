//! API module - REST handlers

pub mod client;
pub mod dto;
pub mod rest;

pub use rest::create_rest_router;
