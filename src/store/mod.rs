//! Node persistence: the store boundary and its backends

pub mod memory;
pub mod neo4j;
pub mod traits;

pub use memory::MemoryNodeStore;
pub use neo4j::Neo4jNodeStore;
pub use traits::{
    next_version, CommitOutcome, NodeKind, NodeStore, NodeWrite, VersionConflict, WriteBatch,
};
