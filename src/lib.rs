//! Infinite Story: a self-rewriting narrative engine.
//!
//! Keeps story content in a mutable graph of nodes, records every player
//! action and visited node, detects paradoxes (repeating actions,
//! repeating node visits, contradicting actions, impossible item use) and
//! resolves them by rewriting past nodes and synthesising new ones.

pub mod core;
pub mod schema;

pub use crate::core::engine::{Response, ResponseKind, StoryLoop, StoryLoopBuilder};
pub use crate::core::persist::{StateManager, StorySnapshot};
