use crate::analysis::engine::{Analysis, Direction, Edge, EdgeFacts, Lattice};
use crate::analysis::index::InstructionIndex;
use crate::function::FunctionBody;
use crate::instructions::Instruction;
use std::collections::BTreeSet;

/// Set of program points whose results may still be used along some path.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct LivenessFact {
    live: BTreeSet<usize>,
}

impl LivenessFact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, point: usize) -> bool {
        self.live.contains(&point)
    }

    pub fn insert(&mut self, point: usize) {
        self.live.insert(point);
    }

    pub fn remove(&mut self, point: usize) {
        self.live.remove(&point);
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.live.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

impl Lattice for LivenessFact {
    fn join(&self, other: &Self) -> Self {
        Self {
            live: self.live.union(&other.live).copied().collect(),
        }
    }
}

impl std::fmt::Display for LivenessFact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, point) in self.live.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { "" } else { ", " }, point)?;
        }
        write!(f, "}}")
    }
}

/// Backward may-analysis: which values may still be needed.
///
/// Defining instructions kill their own point and gen every locally-defined
/// operand. A phi run kills the whole run, then adds each incoming value
/// only on the outgoing edge matching that value's predecessor terminator;
/// different predecessors therefore observe different live sets at the same
/// merge, which is what edge-indexed storage exists for.
pub struct LivenessAnalysis;

impl Analysis for LivenessAnalysis {
    type Fact = LivenessFact;

    const DIRECTION: Direction = Direction::Backward;
    const NAME: &'static str = "liveness";

    fn transfer(
        &self,
        body: &FunctionBody,
        index: &InstructionIndex,
        point: usize,
        incoming: &[Edge],
        outgoing: &[Edge],
        facts: &EdgeFacts<Self::Fact>,
    ) -> Vec<Self::Fact> {
        let mut combined = facts.join_all(incoming);
        let Some(inst) = index.instruction(body, point) else {
            return outgoing.iter().map(|_| combined.clone()).collect();
        };

        if inst.is_phi() {
            let run = index.phi_run_from(body, point);
            for &phi in &run {
                combined.remove(phi);
            }
            let mut produced: Vec<LivenessFact> =
                outgoing.iter().map(|_| combined.clone()).collect();

            for &phi in &run {
                let Some(Instruction::Phi {
                    incoming: pairs, ..
                }) = index.instruction(body, phi)
                else {
                    continue;
                };
                for (pred_block, value) in pairs {
                    let Some(value_point) = index.index_of_value(value) else {
                        continue;
                    };
                    let Some(pred_terminator) = index.terminator_index(*pred_block) else {
                        continue;
                    };
                    for (slot, edge) in outgoing.iter().enumerate() {
                        if edge.target() == pred_terminator {
                            produced[slot].insert(value_point);
                        }
                    }
                }
            }
            produced
        } else if inst.is_definition() {
            combined.remove(point);
            for operand in inst.operands() {
                if let Some(def) = index.index_of_value(operand) {
                    combined.insert(def);
                }
            }
            outgoing.iter().map(|_| combined.clone()).collect()
        } else {
            for operand in inst.operands() {
                if let Some(def) = index.index_of_value(operand) {
                    combined.insert(def);
                }
            }
            outgoing.iter().map(|_| combined.clone()).collect()
        }
    }
}
