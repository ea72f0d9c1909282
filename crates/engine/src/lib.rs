//! docmind engine
//!
//! The orchestration core of the query pipeline:
//! - Query memory (semantic answer cache) with admission control
//! - Answer synthesis with a citation contract
//! - Evaluation and feedback recording
//! - The end-to-end query orchestrator

pub mod admission;
pub mod eval;
pub mod memory;
pub mod orchestrator;
pub mod synthesis;
pub mod types;

pub use admission::{AdmissionOutcome, AdmissionRegistry};
pub use eval::{
    ChunkQualityReport, EvaluationRecorder, EvalStore, InMemoryEvalStore, RelevanceJudge,
    RetrievalSummary,
};
pub use memory::{query_fingerprint, InMemoryMemoryStore, MemoryStore, QueryMemory};
pub use orchestrator::{EngineOptions, EngineParts, QueryEngine};
pub use synthesis::Synthesizer;
pub use types::{ChunkView, QueryRequest, QueryResponse};
