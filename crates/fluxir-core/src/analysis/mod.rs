/*! Dataflow analyses over per-instruction control-flow edges.
 *
 * Merge points can carry a different fact on every incoming path, so the
 * engine attaches facts to edges rather than to instructions or blocks. The
 * indexer flattens a function into numbered program points, the engine drives
 * them to a fixed point, and the concrete analyses supply the lattice and
 * transfer function.
 */

pub mod engine;
pub mod index;
pub mod liveness;
pub mod may_point_to;
pub mod reaching;

pub use engine::{Analysis, DataFlowEngine, Direction, Edge, EdgeFacts, Lattice};
pub use index::InstructionIndex;
pub use liveness::{LivenessAnalysis, LivenessFact};
pub use may_point_to::{MayPointToAnalysis, MayPointToFact};
pub use reaching::{ReachingAnalysis, ReachingFact};
