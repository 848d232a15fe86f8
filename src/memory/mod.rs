//! 记忆层：对话记录、短期缓冲、会话步骤图谱（内存 / SQLite）、向量记忆（内存 / Mem0）、情景记忆引擎

pub mod buffer;
pub mod conversation;
pub mod episodic;
pub mod graph;
pub mod mem0;
pub mod sqlite_graph;
pub mod tokenizer;
pub mod vector;

pub use buffer::{ShortTermBuffer, PREVIOUS_CONTEXT_PREFIX};
pub use conversation::{Message, Role, Transcript};
pub use episodic::{Consolidation, EpisodicConfig, EpisodicMemory};
pub use graph::{
    ChainNode, GraphStats, InMemoryGraphStore, NodeKey, SessionGraphStore, StatsScope, StepRecord,
    SummaryRecord,
};
pub use mem0::Mem0HttpStore;
pub use sqlite_graph::SqliteGraphStore;
pub use vector::{InMemoryVectorStore, MemoryFragment, SearchResponse, VectorMemoryStore};
