/*! Unified interface for FluxIR dataflow analysis.
 *
 * Single import for everything you need: parsing textual IR, building
 * functions programmatically, and running the edge-indexed fixed-point
 * analyses over them.
 */

pub use fluxir_core as core;
pub use fluxir_parser as parser;

pub use fluxir_core::{
    block::{BasicBlock, BlockId},
    builder::{BlockBuilder, FunctionBuilder},
    function::{Function, FunctionBody, Parameter},
    instructions::Instruction,
    values::{Constant, ParamId, TempId, Value},
    Analysis, DataFlowEngine, Direction, Edge, EdgeFacts, InstructionIndex, Lattice,
    LivenessAnalysis, LivenessFact, MayPointToAnalysis, MayPointToFact, ReachingAnalysis,
    ReachingFact,
};

pub use fluxir_parser::{parse, parse_file, ParseError};
