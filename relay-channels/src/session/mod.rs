//! Session state, its durable store, and the conversation that owns both.

mod conversation;
mod state;
mod store;

pub use conversation::Conversation;
pub use state::{SessionRef, SessionState};
pub use store::SessionStore;
