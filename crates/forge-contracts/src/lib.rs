//! Data model, session state machine and session artifacts shared by the
//! card forge engine and CLI.

pub mod character;
pub mod chat;
pub mod events;
pub mod models;
pub mod session;
pub mod summary;
