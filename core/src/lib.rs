pub mod bootstrap;
pub mod config;
pub mod error;
pub mod gemini;
pub mod generation;
pub mod index;
pub mod interaction_log;
pub mod messages;
pub mod pipeline;
pub mod policy;
pub mod retrieval;
pub mod safety;

pub use pipeline::{AnswerPipeline, PipelineMetadata, PipelineResult, Terminal};
