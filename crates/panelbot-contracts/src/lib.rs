pub mod chat;
pub mod dialogue;
pub mod events;
pub mod fortune;
