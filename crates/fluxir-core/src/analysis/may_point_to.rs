use crate::analysis::engine::{Analysis, Direction, Edge, EdgeFacts, Lattice};
use crate::analysis::index::InstructionIndex;
use crate::function::FunctionBody;
use crate::instructions::Instruction;
use std::collections::{BTreeMap, BTreeSet};

/// Two-level may-point-to state.
///
/// `registers` maps a pointer-producing program point to the abstract
/// memory locations it may reference; `memory` maps a location to the
/// locations that may have been stored into it. Each allocation site
/// stands for one abstract location, named by its own point.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct MayPointToFact {
    registers: BTreeMap<usize, BTreeSet<usize>>,
    memory: BTreeMap<usize, BTreeSet<usize>>,
}

impl MayPointToFact {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, point: usize) -> Option<&BTreeSet<usize>> {
        self.registers.get(&point)
    }

    pub fn memory(&self, location: usize) -> Option<&BTreeSet<usize>> {
        self.memory.get(&location)
    }

    pub fn insert_register(&mut self, pointer: usize, location: usize) {
        self.registers.entry(pointer).or_default().insert(location);
    }

    pub fn insert_memory(&mut self, location: usize, stored: usize) {
        self.memory.entry(location).or_default().insert(stored);
    }

    pub fn is_empty(&self) -> bool {
        self.registers.is_empty() && self.memory.is_empty()
    }
}

impl Lattice for MayPointToFact {
    fn join(&self, other: &Self) -> Self {
        let mut joined = self.clone();
        for (&pointer, locations) in &other.registers {
            joined
                .registers
                .entry(pointer)
                .or_default()
                .extend(locations.iter().copied());
        }
        for (&location, stored) in &other.memory {
            joined
                .memory
                .entry(location)
                .or_default()
                .extend(stored.iter().copied());
        }
        joined
    }
}

impl std::fmt::Display for MayPointToFact {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (pointer, locations) in &self.registers {
            write!(f, "R{}->(", pointer)?;
            for location in locations {
                write!(f, "M{}/", location)?;
            }
            write!(f, ")|")?;
        }
        for (location, stored) in &self.memory {
            write!(f, "M{}->(", location)?;
            for value in stored {
                write!(f, "M{}/", value)?;
            }
            write!(f, ")|")?;
        }
        Ok(())
    }
}

/// Forward may-alias analysis over allocation sites.
///
/// Stores are weak updates: the cross product of the value's and the
/// address's points-to sets is recorded without removing prior
/// possibilities. Loads are the two-hop inverse, reading through the
/// address operand's points-to set and then the location map.
pub struct MayPointToAnalysis;

impl MayPointToAnalysis {
    fn copy_points_to(
        fact: &mut MayPointToFact,
        index: &InstructionIndex,
        source: &crate::values::Value,
        destination: usize,
    ) {
        let Some(source_point) = index.index_of_value(source) else {
            return;
        };
        let Some(locations) = fact.register(source_point).cloned() else {
            return;
        };
        for location in locations {
            fact.insert_register(destination, location);
        }
    }
}

impl Analysis for MayPointToAnalysis {
    type Fact = MayPointToFact;

    const DIRECTION: Direction = Direction::Forward;
    const NAME: &'static str = "may-point-to";

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

        match inst {
            Instruction::Alloca { .. } => {
                combined.insert_register(point, point);
            }
            Instruction::Cast { value, .. } => {
                Self::copy_points_to(&mut combined, index, value, point);
            }
            Instruction::GetElementPtr { base, .. } => {
                Self::copy_points_to(&mut combined, index, base, point);
            }
            Instruction::Load { address, .. } => {
                if let Some(address_point) = index.index_of_value(address) {
                    if let Some(locations) = combined.register(address_point).cloned() {
                        for location in locations {
                            if let Some(stored) = combined.memory(location).cloned() {
                                for value in stored {
                                    combined.insert_register(point, value);
                                }
                            }
                        }
                    }
                }
            }
            Instruction::Store { value, address } => {
                let value_point = index.index_of_value(value);
                let address_point = index.index_of_value(address);
                if let (Some(value_point), Some(address_point)) = (value_point, address_point) {
                    let value_set = combined.register(value_point).cloned();
                    let address_set = combined.register(address_point).cloned();
                    if let (Some(value_set), Some(address_set)) = (value_set, address_set) {
                        for stored in &value_set {
                            for location in &address_set {
                                combined.insert_memory(*location, *stored);
                            }
                        }
                    }
                }
            }
            Instruction::Select {
                then_val, else_val, ..
            } => {
                Self::copy_points_to(&mut combined, index, then_val, point);
                Self::copy_points_to(&mut combined, index, else_val, point);
            }
            Instruction::Phi { .. } => {
                for phi in index.phi_run_from(body, point) {
                    let Some(Instruction::Phi {
                        incoming: pairs, ..
                    }) = index.instruction(body, phi)
                    else {
                        continue;
                    };
                    for (_, value) in pairs {
                        Self::copy_points_to(&mut combined, index, value, phi);
                    }
                }
            }
            _ => {}
        }

        outgoing.iter().map(|_| combined.clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::engine::DataFlowEngine;
    use crate::builder::FunctionBuilder;
    use crate::function::Function;
    use pretty_assertions::assert_eq;

    fn run(function: &Function) -> DataFlowEngine<MayPointToAnalysis> {
        let mut engine = DataFlowEngine::new(
            MayPointToAnalysis,
            MayPointToFact::new(),
            MayPointToFact::new(),
        );
        engine.run(function).unwrap();
        engine
    }

    fn locations(points: &[usize]) -> BTreeSet<usize> {
        points.iter().copied().collect()
    }

    #[test]
    fn join_laws_hold() {
        let mut a = MayPointToFact::new();
        a.insert_register(0, 0);
        a.insert_memory(0, 1);
        let mut b = MayPointToFact::new();
        b.insert_register(0, 2);
        b.insert_register(3, 3);
        let mut c = MayPointToFact::new();
        c.insert_memory(5, 6);

        assert_eq!(a.join(&a), a);
        assert_eq!(a.join(&b), b.join(&a));
        assert_eq!(a.join(&b).join(&c), a.join(&b.join(&c)));
    }

    #[test]
    fn allocation_store_load_round_trip() {
        // 0: t0 = alloca          (the cell)
        // 1: t1 = alloca          (the stored pointer)
        // 2: store t1, t0
        // 3: t2 = load t0
        // 4: ret
        let mut builder = FunctionBuilder::new("round_trip");
        let mut entry = builder.entry_block();
        let cell = entry.alloca();
        let value = entry.alloca();
        entry.store(value, cell.clone());
        entry.load(cell);
        entry.return_void();
        let function = builder.build().unwrap();

        let engine = run(&function);
        let after_load = engine.fact_at(4);

        assert_eq!(after_load.register(0), Some(&locations(&[0])));
        assert_eq!(after_load.register(1), Some(&locations(&[1])));
        // the store recorded M0 -> M1
        assert_eq!(after_load.memory(0), Some(&locations(&[1])));
        // the load read it back through two hops
        assert_eq!(after_load.register(3), Some(&locations(&[1])));
    }

    #[test]
    fn gep_and_cast_preserve_points_to() {
        // 0: t0 = alloca
        // 1: t1 = getelementptr t0, 0
        // 2: t2 = cast t1
        // 3: ret
        let mut builder = FunctionBuilder::new("derived");
        let mut entry = builder.entry_block();
        let base = entry.alloca();
        let zero = entry.constant_int(0);
        let element = entry.getelementptr(base, vec![zero]);
        entry.cast(element);
        entry.return_void();
        let function = builder.build().unwrap();

        let engine = run(&function);
        let at_ret = engine.fact_at(3);

        assert_eq!(at_ret.register(1), Some(&locations(&[0])));
        assert_eq!(at_ret.register(2), Some(&locations(&[0])));
    }

    #[test]
    fn select_unions_both_candidates() {
        // 0: t0 = alloca
        // 1: t1 = alloca
        // 2: t2 = select p0, t0, t1
        // 3: ret
        let mut builder = FunctionBuilder::new("either");
        let c = builder.param("c");
        let mut entry = builder.entry_block();
        let a = entry.alloca();
        let b = entry.alloca();
        entry.select(c, a, b);
        entry.return_void();
        let function = builder.build().unwrap();

        let engine = run(&function);
        assert_eq!(engine.fact_at(3).register(2), Some(&locations(&[0, 1])));
    }

    #[test]
    fn phi_unions_incoming_pointers() {
        // 0: t0 = alloca        (entry)
        // 1: t1 = alloca
        // 2: br c, left, right
        // 3: jmp merge          (left)
        // 4: jmp merge          (right)
        // 5: t2 = phi [left, t0], [right, t1]
        // 6: ret
        let mut builder = FunctionBuilder::new("merge_pointers");
        let c = builder.param("c");
        let left = builder.create_block("left");
        let right = builder.create_block("right");
        let merge_block = builder.create_block("merge");

        let mut entry = builder.entry_block();
        let a = entry.alloca();
        let b = entry.alloca();
        entry.branch(c, left, right);

        builder.block(left).unwrap().jump(merge_block);
        builder.block(right).unwrap().jump(merge_block);

        let mut merge = builder.block(merge_block).unwrap();
        merge.phi(vec![(left, a), (right, b)]);
        merge.return_void();
        let function = builder.build().unwrap();

        let engine = run(&function);
        assert_eq!(engine.fact_at(6).register(5), Some(&locations(&[0, 1])));
    }

    #[test]
    fn weak_update_never_removes_possibilities() {
        // two stores into the same cell accumulate both pointees
        // 0: t0 = alloca
        // 1: t1 = alloca
        // 2: t2 = alloca
        // 3: store t1, t0
        // 4: store t2, t0
        // 5: ret
        let mut builder = FunctionBuilder::new("weak");
        let mut entry = builder.entry_block();
        let cell = entry.alloca();
        let first = entry.alloca();
        let second = entry.alloca();
        entry.store(first, cell.clone());
        entry.store(second, cell);
        entry.return_void();
        let function = builder.build().unwrap();

        let engine = run(&function);
        assert_eq!(engine.fact_at(5).memory(0), Some(&locations(&[1, 2])));
    }

    #[test]
    fn report_format_is_stable() {
        let mut fact = MayPointToFact::new();
        fact.insert_register(3, 0);
        fact.insert_register(3, 1);
        fact.insert_memory(0, 1);

        assert_eq!(fact.to_string(), "R3->(M0/M1/)|M0->(M1/)|");
    }
}
