pub mod commerce;
pub mod config;
mod config_env;
pub mod context;
pub mod conversation;
pub mod language;
pub mod llm;
pub mod models;
pub mod normalizer;
pub mod orchestrator;
pub mod repos;
pub mod speech;
pub mod transcription;
