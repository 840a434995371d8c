//! # scape-rl-core
//!
//! Core types for the scape-rl bridge protocol:
//! - Error taxonomy and `Result` alias
//! - Action and action-space types
//! - State snapshot parsing (`STATE` line)
//! - Frame header parsing and frame payloads

pub mod action;
pub mod error;
pub mod frame;
pub mod state;

pub use action::{Action, ActionSpace, CursorButton};
pub use error::{Result, ScapeRLError};
pub use frame::{Frame, FrameHeader};
pub use state::StateSnapshot;
