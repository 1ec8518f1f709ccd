use crate::analysis::index::InstructionIndex;
use crate::function::{Function, FunctionBody};
use crate::{IrError, Result};
use std::collections::{HashMap, VecDeque};
use std::io::Write;

/// Orientation of fact propagation. A backward analysis sees the graph with
/// predecessors and successors exchanged, so one transfer-function contract
/// serves both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Forward,
    Backward,
}

/// A fact attachment point, oriented in the analysis direction:
/// `Flow(a, b)` carries the fact flowing from point `a` into point `b`,
/// and `Boundary(p)` is the conceptual entry (forward) or exit (backward)
/// edge into `p`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Edge {
    Boundary(usize),
    Flow(usize, usize),
}

impl Edge {
    pub fn target(&self) -> usize {
        match self {
            Edge::Boundary(to) | Edge::Flow(_, to) => *to,
        }
    }

    pub fn source(&self) -> Option<usize> {
        match self {
            Edge::Boundary(_) => None,
            Edge::Flow(from, _) => Some(*from),
        }
    }
}

/// Lattice element. `join` must be commutative, associative, and idempotent;
/// equality is structural. Values are always cloned on hand-off, never
/// shared mutably between edges.
pub trait Lattice: Clone + PartialEq + std::fmt::Display {
    fn join(&self, other: &Self) -> Self;
}

/// Edge-indexed fact storage. Owned by the engine; transfer functions get
/// read access only. Entries are created at initialization and never
/// deleted, and each entry grows monotonically over a run.
#[derive(Debug, Clone)]
pub struct EdgeFacts<F: Lattice> {
    facts: HashMap<Edge, F>,
    bottom: F,
}

impl<F: Lattice> EdgeFacts<F> {
    fn new(bottom: F) -> Self {
        Self {
            facts: HashMap::new(),
            bottom,
        }
    }

    /// Fact currently believed at `edge`. Initialization covers every edge
    /// before the worklist runs; an unknown edge reads as bottom.
    pub fn get(&self, edge: Edge) -> &F {
        self.facts.get(&edge).unwrap_or(&self.bottom)
    }

    /// Join of the facts on `edges`, starting from bottom. This is the
    /// combined incoming state every transfer function begins with.
    pub fn join_all(&self, edges: &[Edge]) -> F {
        let mut combined = self.bottom.clone();
        for &edge in edges {
            combined = combined.join(self.get(edge));
        }
        combined
    }

    fn insert(&mut self, edge: Edge, fact: F) {
        self.facts.insert(edge, fact);
    }
}

/// A concrete analysis: the lattice, the direction, and the per-instruction
/// transfer function.
pub trait Analysis {
    type Fact: Lattice;

    const DIRECTION: Direction;
    const NAME: &'static str;

    /// Produce the outgoing fact for every edge in `outgoing`, in order,
    /// from the facts on `incoming`. Edges are already oriented in the
    /// analysis direction. Implementations must be monotone; the engine
    /// does not detect violations (a non-monotone transfer function can
    /// loop forever, which is a caller contract violation).
    fn transfer(
        &self,
        body: &FunctionBody,
        index: &InstructionIndex,
        point: usize,
        incoming: &[Edge],
        outgoing: &[Edge],
        facts: &EdgeFacts<Self::Fact>,
    ) -> Vec<Self::Fact>;
}

/// Worklist fixed-point solver over per-instruction edges.
///
/// Termination relies on lattice finiteness and transfer monotonicity: each
/// edge fact can only grow, and the number of distinct facts per edge is
/// bounded by the instruction count.
pub struct DataFlowEngine<A: Analysis> {
    analysis: A,
    initial_state: A::Fact,
    facts: EdgeFacts<A::Fact>,
    incoming: Vec<Vec<Edge>>,
    outgoing: Vec<Vec<Edge>>,
    points: usize,
}

impl<A: Analysis> DataFlowEngine<A> {
    /// `bottom` seeds every edge; `initial_state` seeds the conceptual
    /// boundary edge(s) and represents facts true before any instruction
    /// executes. Both are owned by the engine from here on.
    pub fn new(analysis: A, bottom: A::Fact, initial_state: A::Fact) -> Self {
        Self {
            analysis,
            initial_state,
            facts: EdgeFacts::new(bottom),
            incoming: Vec::new(),
            outgoing: Vec::new(),
            points: 0,
        }
    }

    /// Drive `function` to a fixed point. Builds the instruction index,
    /// orients edges per the analysis direction, seeds the boundary, and
    /// runs the worklist until no outgoing fact changes.
    pub fn run(&mut self, function: &Function) -> Result<InstructionIndex> {
        let index = InstructionIndex::build(&function.body)?;
        let points = index.len();
        self.points = points;

        let mut incoming: Vec<Vec<Edge>> = Vec::with_capacity(points);
        let mut outgoing: Vec<Vec<Edge>> = Vec::with_capacity(points);

        for point in 0..points {
            let (sources, targets) = match A::DIRECTION {
                Direction::Forward => (index.predecessors(point), index.successors(point)),
                Direction::Backward => (index.successors(point), index.predecessors(point)),
            };
            let mut inc: Vec<Edge> = sources.iter().map(|&s| Edge::Flow(s, point)).collect();
            if sources.is_empty() {
                inc.push(Edge::Boundary(point));
            }
            let out: Vec<Edge> = targets.iter().map(|&t| Edge::Flow(point, t)).collect();
            incoming.push(inc);
            outgoing.push(out);
        }

        self.facts = EdgeFacts::new(self.facts.bottom.clone());
        for edges in incoming.iter().chain(outgoing.iter()) {
            for &edge in edges {
                let seed = match edge {
                    Edge::Boundary(_) => self.initial_state.clone(),
                    Edge::Flow(..) => self.facts.bottom.clone(),
                };
                self.facts.insert(edge, seed);
            }
        }

        let mut worklist: VecDeque<usize> = match A::DIRECTION {
            Direction::Forward => (0..points).collect(),
            Direction::Backward => (0..points).rev().collect(),
        };
        let mut queued = vec![true; points];

        while let Some(point) = worklist.pop_front() {
            queued[point] = false;

            let produced = self.analysis.transfer(
                &function.body,
                &index,
                point,
                &incoming[point],
                &outgoing[point],
                &self.facts,
            );
            if produced.len() != outgoing[point].len() {
                return Err(IrError::AnalysisError(format!(
                    "{}: transfer produced {} facts for {} outgoing edges at point {}",
                    A::NAME,
                    produced.len(),
                    outgoing[point].len(),
                    point
                )));
            }

            for (&edge, fact) in outgoing[point].iter().zip(produced) {
                if self.facts.get(edge) != &fact {
                    self.facts.insert(edge, fact);
                    let target = edge.target();
                    if !queued[target] {
                        queued[target] = true;
                        worklist.push_back(target);
                    }
                }
            }
        }

        self.incoming = incoming;
        self.outgoing = outgoing;
        Ok(index)
    }

    /// Converged fact at `point`: the join of its incoming-edge facts, i.e.
    /// the state immediately before the instruction in analysis order.
    pub fn fact_at(&self, point: usize) -> A::Fact {
        self.incoming
            .get(point)
            .map(|edges| self.facts.join_all(edges))
            .unwrap_or_else(|| self.facts.bottom.clone())
    }

    /// Converged fact on one specific edge.
    pub fn edge_fact(&self, edge: Edge) -> &A::Fact {
        self.facts.get(edge)
    }

    pub fn incoming_edges(&self, point: usize) -> &[Edge] {
        self.incoming.get(point).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn outgoing_edges(&self, point: usize) -> &[Edge] {
        self.outgoing.get(point).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points == 0
    }

    /// One line per instruction in index order: `point: fact`. The fact
    /// rendering is analysis-specific but deterministic, so the report is
    /// parseable line by line.
    pub fn write_report<W: Write>(&self, writer: &mut W) -> std::io::Result<()> {
        for point in 0..self.points {
            writeln!(writer, "{}: {}", point, self.fact_at(point))?;
        }
        Ok(())
    }

    pub fn report(&self) -> String {
        let mut buffer = Vec::new();
        // writing to a Vec cannot fail
        let _ = self.write_report(&mut buffer);
        String::from_utf8_lossy(&buffer).into_owned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;

    /// Reachability from the boundary: bottom = false, initial = true,
    /// transfer broadcasts the joined incoming fact. Small enough to make
    /// the engine mechanics visible on their own.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    struct Reached(bool);

    impl std::fmt::Display for Reached {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "{}", self.0)
        }
    }

    impl Lattice for Reached {
        fn join(&self, other: &Self) -> Self {
            Reached(self.0 || other.0)
        }
    }

    struct ReachableAnalysis;

    impl Analysis for ReachableAnalysis {
        type Fact = Reached;
        const DIRECTION: Direction = Direction::Forward;
        const NAME: &'static str = "reachable";

        fn transfer(
            &self,
            _body: &FunctionBody,
            _index: &InstructionIndex,
            _point: usize,
            incoming: &[Edge],
            outgoing: &[Edge],
            facts: &EdgeFacts<Self::Fact>,
        ) -> Vec<Self::Fact> {
            let combined = facts.join_all(incoming);
            outgoing.iter().map(|_| combined).collect()
        }
    }

    fn looping_function() -> crate::function::Function {
        let mut builder = FunctionBuilder::new("looping");
        let n = builder.param("n");
        let header = builder.create_block("header");
        let body_block = builder.create_block("body");
        let exit = builder.create_block("exit");

        let mut entry = builder.entry_block();
        entry.jump(header);

        let mut hdr = builder.block(header).unwrap();
        let zero = hdr.constant_int(0);
        let more = hdr.gt(n.clone(), zero);
        hdr.branch(more, body_block, exit);

        let mut bdy = builder.block(body_block).unwrap();
        let one = bdy.constant_int(1);
        bdy.sub(n, one);
        bdy.jump(header);

        let mut ext = builder.block(exit).unwrap();
        ext.return_void();

        builder.build().unwrap()
    }

    #[test]
    fn worklist_terminates_on_a_loop() {
        let function = looping_function();
        let mut engine = DataFlowEngine::new(ReachableAnalysis, Reached(false), Reached(true));
        let index = engine.run(&function).unwrap();

        // every point is reachable from the entry, including the loop body
        for point in 0..index.len() {
            assert_eq!(engine.fact_at(point), Reached(true), "point {}", point);
        }
    }

    #[test]
    fn boundary_edge_carries_initial_state() {
        let function = looping_function();
        let mut engine = DataFlowEngine::new(ReachableAnalysis, Reached(false), Reached(true));
        engine.run(&function).unwrap();

        assert_eq!(engine.incoming_edges(0), &[Edge::Boundary(0)]);
        assert_eq!(*engine.edge_fact(Edge::Boundary(0)), Reached(true));
    }

    #[test]
    fn report_is_one_line_per_point() {
        let function = looping_function();
        let mut engine = DataFlowEngine::new(ReachableAnalysis, Reached(false), Reached(true));
        let index = engine.run(&function).unwrap();

        let report = engine.report();
        assert_eq!(report.lines().count(), index.len());
        assert!(report.starts_with("0: true"));
    }

    #[test]
    fn edge_orientation_swaps_for_backward() {
        struct BackwardReachable;

        impl Analysis for BackwardReachable {
            type Fact = Reached;
            const DIRECTION: Direction = Direction::Backward;
            const NAME: &'static str = "backward-reachable";

            fn transfer(
                &self,
                _body: &FunctionBody,
                _index: &InstructionIndex,
                _point: usize,
                incoming: &[Edge],
                outgoing: &[Edge],
                facts: &EdgeFacts<Self::Fact>,
            ) -> Vec<Self::Fact> {
                let combined = facts.join_all(incoming);
                outgoing.iter().map(|_| combined).collect()
            }
        }

        let function = looping_function();
        let mut engine = DataFlowEngine::new(BackwardReachable, Reached(false), Reached(true));
        let index = engine.run(&function).unwrap();

        // the return instruction is the backward boundary
        let last = index.len() - 1;
        assert!(engine
            .incoming_edges(last)
            .contains(&Edge::Boundary(last)));
        // everything reaches the exit
        for point in 0..index.len() {
            assert_eq!(engine.fact_at(point), Reached(true), "point {}", point);
        }
    }
}
