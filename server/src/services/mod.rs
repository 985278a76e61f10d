//! Domain services used by the websocket routes.
//!
//! ARCHITECTURE
//! ============
//! Service modules own business logic and persistence concerns so the
//! websocket handler can stay focused on frame translation and broadcast.

pub mod element;
pub mod page;
pub mod persistence;
