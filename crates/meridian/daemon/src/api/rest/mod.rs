//! REST API: routes, handlers, shared state and the access gate

pub mod auth;
pub mod extract;
pub mod handlers;
pub mod router;
pub mod state;
