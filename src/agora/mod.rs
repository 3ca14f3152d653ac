// src/agora/mod.rs

pub mod agent;
pub mod bootstrap;
pub mod client_wrapper;
pub mod clients;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod event;
pub mod frame;
pub mod llm_adapter;
pub mod persistence;
pub mod relay;
pub mod selector;
pub mod service;
pub mod streaming;
pub mod transcript;
