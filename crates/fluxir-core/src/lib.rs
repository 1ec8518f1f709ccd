/*! Core IR types, builders, and dataflow analyses for FluxIR.
 *
 * Program analysis needs a representation where every fact has a precise
 * attachment point. This crate provides a small SSA-style IR together with a
 * worklist fixed-point engine that stores facts on per-instruction
 * control-flow edges, plus liveness, reaching-definitions, and may-point-to
 * instantiations of that engine.
 */

pub mod analysis;
pub mod block;
pub mod builder;
pub mod function;
pub mod instructions;
pub mod values;

pub use analysis::engine::{Analysis, DataFlowEngine, Direction, Edge, EdgeFacts, Lattice};
pub use analysis::index::InstructionIndex;
pub use analysis::liveness::{LivenessAnalysis, LivenessFact};
pub use analysis::may_point_to::{MayPointToAnalysis, MayPointToFact};
pub use analysis::reaching::{ReachingAnalysis, ReachingFact};
pub use block::{BasicBlock, BlockId};
pub use builder::{BlockBuilder, FunctionBuilder};
pub use function::{Function, FunctionBody, Parameter};
pub use instructions::Instruction;
pub use values::{Constant, ParamId, TempId, Value};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum IrError {
    #[error("malformed function: {0}")]
    MalformedFunction(String),
    #[error("unknown block: {0}")]
    UnknownBlock(BlockId),
    #[error("builder error: {0}")]
    BuilderError(String),
    #[error("analysis error: {0}")]
    AnalysisError(String),
}

pub type Result<T> = std::result::Result<T, IrError>;
