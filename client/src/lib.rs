//! Client half of the storyboard sync protocol.
//!
//! A [`session::PageSession`] wraps the scene engine with the optimistic
//! mutation protocol: gestures apply to the local model first and come back
//! as frames for the transport to send, while inbound relay frames merge
//! through the engine's idempotent remote path. The session owns no socket —
//! hosts (the terminal CLI, a future GUI shell) move frames in and out.
//!
//! Outbound persistence is fire-and-forget: a failed or hung send is logged
//! by the host and the optimistic local state stands until the next page
//! reload re-fetches the authoritative list.

pub mod emit;
pub mod parse;
pub mod session;
