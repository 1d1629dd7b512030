//! # Conversation Management
//!
//! Multi-session chat state and the request flow that threads one user
//! utterance through history, reply generation and optional synthesis.

pub mod history;
pub mod turn;

pub use history::{ConversationTurn, Role, SessionStore};
pub use turn::{TurnOrchestrator, TurnOutcome};
