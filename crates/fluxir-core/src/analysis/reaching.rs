use crate::analysis::engine::{Analysis, Direction, Edge, EdgeFacts, Lattice};
use crate::analysis::index::InstructionIndex;
use crate::function::FunctionBody;
use std::collections::BTreeSet;

/// Set of defining program points that may reach a point without an
/// intervening redefinition. Definitions here are identity-based, so there
/// is no kill: the set only grows along forward paths.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ReachingFact {
    defs: BTreeSet<usize>,
}

impl ReachingFact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, point: usize) -> bool {
        self.defs.contains(&point)
    }

    pub fn insert(&mut self, point: usize) {
        self.defs.insert(point);
    }

    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.defs.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.defs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.defs.is_empty()
    }
}

impl Lattice for ReachingFact {
    fn join(&self, other: &Self) -> Self {
        Self {
            defs: self.defs.union(&other.defs).copied().collect(),
        }
    }
}

impl std::fmt::Display for ReachingFact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{{")?;
        for (i, point) in self.defs.iter().enumerate() {
            write!(f, "{}{}", if i == 0 { "" } else { ", " }, point)?;
        }
        write!(f, "}}")
    }
}

/// Forward may-analysis: a defining instruction (including each phi of a
/// run) adds its own point to the joined incoming set; everything else
/// passes through. Broadcast is identical on every outgoing edge.
pub struct ReachingAnalysis;

impl Analysis for ReachingAnalysis {
    type Fact = ReachingFact;

    const DIRECTION: Direction = Direction::Forward;
    const NAME: &'static str = "reaching";

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
        if let Some(inst) = index.instruction(body, point) {
            if inst.is_phi() {
                for phi in index.phi_run_from(body, point) {
                    combined.insert(phi);
                }
            } else if inst.is_definition() {
                combined.insert(point);
            }
        }
        outgoing.iter().map(|_| combined.clone()).collect()
    }
}
