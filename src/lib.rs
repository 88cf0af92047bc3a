pub mod backend;
pub mod catalog;
pub mod compare;
pub mod config;
pub mod enhancer;
pub mod error;
pub mod execution;
pub mod exemplars;
pub mod insights;
pub mod llm;
pub mod synthesizer;
