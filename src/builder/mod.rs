//! Builder surface: graph definition wire types, the REST wrapper, and the
//! caller-owned editing store.

mod api;
mod store;
pub mod types;


pub use api::{ApiError, BuilderApi};
pub use store::GraphStore;
pub use types::{
    ExecutionResult, GraphDefinition, GraphEdgeDef, GraphList, GraphNodeDef, NodeResult,
    NodeType, NodeTypeInfo, Position, ValidationResult,
};
