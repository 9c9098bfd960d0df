//! Core library for pagewright: an agent that turns a natural-language
//! request plus optional PDF documents into a single HTML document,
//! using an LLM provider and tools served over MCP.

pub mod agent;
pub mod assembler;
pub mod config;
pub mod document;
pub mod errors;
pub mod mcp;
pub mod models;
pub mod providers;
pub mod registry;
pub mod submit;

pub use agent::{Agent, AgentConfig, AgentOutcome};
pub use config::Config;
pub use errors::{Failure, FailureKind, SubmitError};
pub use submit::submit;
