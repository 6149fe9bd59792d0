//! Knowledge-base backend for the Praetorian Smart-Coat site chatbot.
//!
//! Documents are chunked and embedded into a SQLite-backed chunk store;
//! chat sessions retrieve the nearest chunks at question time and hand
//! them, with citations, to an external generation model.

pub mod chat;
pub mod chunk;
pub mod core;
pub mod embed;
pub mod index;
pub mod llm;
pub mod retrieve;
pub mod server;
pub mod state;
pub mod store;
pub mod vector;
