//! fluxion-tools: Operation Catalog and built-in operations
//!
//! Provides the catalog the agent dispatches model invocations through, the
//! operation trait with sync and async closure adapters, and the built-in
//! article operations.

pub mod args;
pub mod builtin;
pub mod registry;
pub mod tool;

// Re-export main types
pub use builtin::register_article_tools;
pub use registry::{InvocationResult, OperationCatalog};
pub use tool::{
    Arguments, AsyncFnOperation, BoxedOperation, FnOperation, Operation, OperationDefinition,
    ParamType, Parameter,
};
