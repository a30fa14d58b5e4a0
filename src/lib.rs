pub mod core {
    pub mod record;
    pub mod signal;
    pub mod patterns;
    pub mod tokenizer;
    pub mod classifier;
    pub mod assembler;
    pub mod layout;
    pub mod writer;
}

pub mod utils {
    pub mod document_processor;
    pub mod mmap_reader;
}

pub mod config;
pub mod docx_parser;
pub mod error;
pub mod pipeline;
pub mod worker;
pub mod worker_server;

pub use crate::config::AppConfig;
pub use crate::core::layout::{DocumentTree, Node};
pub use crate::error::PipelineError;
pub use crate::pipeline::Orchestrator;
