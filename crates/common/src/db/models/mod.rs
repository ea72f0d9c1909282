//! SeaORM entity models
//!
//! Database entities for docmind

mod chunk;
mod chunk_eval;
mod community;
mod feedback;
mod graph_edge;
mod graph_entity;
mod memory;
mod retrieval_eval;

pub use chunk::{
    Entity as ChunkEntity,
    Model as Chunk,
    ActiveModel as ChunkActiveModel,
    Column as ChunkColumn,
};

pub use memory::{
    Entity as MemoryEntity,
    Model as MemoryEntry,
    ActiveModel as MemoryActiveModel,
    Column as MemoryColumn,
};

pub use feedback::{
    merge_feedback,
    Entity as FeedbackEntity,
    Model as Feedback,
    ActiveModel as FeedbackActiveModel,
    Column as FeedbackColumn,
    FeedbackFields,
    FeedbackPatch,
};

pub use retrieval_eval::{
    Entity as RetrievalEvalEntity,
    Model as RetrievalEvaluation,
    ActiveModel as RetrievalEvalActiveModel,
    Column as RetrievalEvalColumn,
};

pub use chunk_eval::{
    Entity as ChunkEvalEntity,
    Model as ChunkEvaluation,
    ActiveModel as ChunkEvalActiveModel,
    Column as ChunkEvalColumn,
};

pub use graph_entity::{
    Entity as GraphEntityEntity,
    Model as GraphEntity,
    ActiveModel as GraphEntityActiveModel,
    Column as GraphEntityColumn,
};

pub use graph_edge::{
    Entity as GraphEdgeEntity,
    Model as GraphEdge,
    ActiveModel as GraphEdgeActiveModel,
    Column as GraphEdgeColumn,
};

pub use community::{
    Entity as CommunityEntity,
    Model as CommunitySummary,
    ActiveModel as CommunityActiveModel,
    Column as CommunityColumn,
};
