//! Conversation relay engine
//!
//! This module contains the request pipeline between the HTTP layer and the
//! inference API.

pub(crate) mod chat;

pub use chat::{ChatEngine, GenerationRequest, GenerationResponse};
