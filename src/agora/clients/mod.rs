//! Concrete [`ClientWrapper`](crate::client_wrapper::ClientWrapper) implementations.
//!
//! Every backend here speaks the OpenAI chat-completion protocol; they differ only in base
//! URL and model names.

pub mod common;
pub mod http_pool;

pub mod deepseek;
pub mod openai_compatible;
