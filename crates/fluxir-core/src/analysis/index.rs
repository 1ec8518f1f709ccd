use crate::block::BlockId;
use crate::function::FunctionBody;
use crate::instructions::Instruction;
use crate::values::{TempId, Value};
use crate::{IrError, Result};
use std::collections::HashMap;

/// Flattens a function into sequentially numbered program points and exposes
/// control-flow edges at instruction granularity.
///
/// Points are numbered by one deterministic traversal: blocks in insertion
/// order, instructions in block order. Within a block each instruction flows
/// to the next; a terminator flows to the first instruction of every
/// successor block. The index is built once per analysis run and is
/// immutable afterwards.
#[derive(Debug, Clone)]
pub struct InstructionIndex {
    locations: Vec<(BlockId, usize)>,
    block_range: HashMap<BlockId, (usize, usize)>,
    temp_index: HashMap<TempId, usize>,
    successors: Vec<Vec<usize>>,
    predecessors: Vec<Vec<usize>>,
}

impl InstructionIndex {
    pub fn build(body: &FunctionBody) -> Result<Self> {
        let mut locations = Vec::with_capacity(body.instruction_count());
        let mut block_range = HashMap::new();
        let mut temp_index = HashMap::new();

        for (&block_id, block) in &body.blocks {
            if !block.is_terminated() {
                return Err(IrError::MalformedFunction(format!(
                    "block '{}' has no terminator",
                    block.label
                )));
            }
            let start = locations.len();
            for (offset, inst) in block.instructions.iter().enumerate() {
                let point = locations.len();
                locations.push((block_id, offset));
                if let Some(temp) = inst.result().and_then(Value::as_temp) {
                    temp_index.insert(temp, point);
                }
            }
            block_range.insert(block_id, (start, block.instructions.len()));
        }

        if locations.is_empty() {
            return Err(IrError::MalformedFunction(
                "function has no instructions".to_string(),
            ));
        }

        let mut successors = vec![Vec::new(); locations.len()];
        let mut predecessors = vec![Vec::new(); locations.len()];

        for (&block_id, block) in &body.blocks {
            let (start, len) = block_range[&block_id];
            for offset in 0..len.saturating_sub(1) {
                successors[start + offset].push(start + offset + 1);
            }
            let terminator = start + len - 1;
            for succ_block in block.successors() {
                let (succ_start, _) = *block_range
                    .get(&succ_block)
                    .ok_or(IrError::UnknownBlock(succ_block))?;
                successors[terminator].push(succ_start);
            }
        }

        for (point, succs) in successors.iter().enumerate() {
            for &succ in succs {
                predecessors[succ].push(point);
            }
        }

        Ok(Self {
            locations,
            block_range,
            temp_index,
            successors,
            predecessors,
        })
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }

    pub fn location(&self, point: usize) -> Option<(BlockId, usize)> {
        self.locations.get(point).copied()
    }

    pub fn instruction<'a>(
        &self,
        body: &'a FunctionBody,
        point: usize,
    ) -> Option<&'a Instruction> {
        let (block_id, offset) = self.location(point)?;
        body.get_block(block_id)?.instructions.get(offset)
    }

    /// The program point defining `value`, if it is tracked here. Operands
    /// that do not resolve (parameters, constants, foreign references) are
    /// treated by every analysis as "not locally defined".
    pub fn index_of_value(&self, value: &Value) -> Option<usize> {
        value
            .as_temp()
            .and_then(|temp| self.temp_index.get(&temp).copied())
    }

    pub fn successors(&self, point: usize) -> &[usize] {
        self.successors
            .get(point)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn predecessors(&self, point: usize) -> &[usize] {
        self.predecessors
            .get(point)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    pub fn first_index(&self, block: BlockId) -> Option<usize> {
        self.block_range.get(&block).map(|&(start, _)| start)
    }

    /// Index of a block's terminator, the source of every edge into its
    /// successor blocks.
    pub fn terminator_index(&self, block: BlockId) -> Option<usize> {
        self.block_range
            .get(&block)
            .map(|&(start, len)| start + len - 1)
    }

    /// Consecutive phi points starting at `point`, within one block. Empty
    /// when `point` is not a phi.
    pub fn phi_run_from(&self, body: &FunctionBody, point: usize) -> Vec<usize> {
        let mut run = Vec::new();
        let Some((block, _)) = self.location(point) else {
            return run;
        };
        let mut current = point;
        while let Some(inst) = self.instruction(body, current) {
            if !inst.is_phi() || self.location(current).map(|(b, _)| b) != Some(block) {
                break;
            }
            run.push(current);
            current += 1;
        }
        run
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::FunctionBuilder;
    use pretty_assertions::assert_eq;

    fn diamond() -> crate::function::Function {
        // entry: br c, then, else / then: t jmp merge / else: e jmp merge
        // merge: phi; ret
        let mut builder = FunctionBuilder::new("diamond");
        let c = builder.param("c");
        let a = builder.param("a");
        let then_block = builder.create_block("then");
        let else_block = builder.create_block("else");
        let merge_block = builder.create_block("merge");

        let mut entry = builder.entry_block();
        entry.branch(c, then_block, else_block);

        let (t, e) = {
            let mut then = builder.block(then_block).unwrap();
            let one = then.constant_int(1);
            let t = then.add(a.clone(), one);
            then.jump(merge_block);

            let mut els = builder.block(else_block).unwrap();
            let two = els.constant_int(2);
            let e = els.add(a, two);
            els.jump(merge_block);
            (t, e)
        };

        let mut merge = builder.block(merge_block).unwrap();
        let m = merge.phi(vec![(then_block, t), (else_block, e)]);
        merge.return_value(m);

        builder.build().unwrap()
    }

    #[test]
    fn numbering_follows_program_order() {
        let function = diamond();
        let index = InstructionIndex::build(&function.body).unwrap();

        // br | add, jmp | add, jmp | phi, ret
        assert_eq!(index.len(), 7);
        assert_eq!(index.location(0), Some((BlockId(0), 0)));
        assert_eq!(index.location(6), Some((BlockId(3), 1)));
    }

    #[test]
    fn branch_fans_out_and_merge_fans_in() {
        let function = diamond();
        let index = InstructionIndex::build(&function.body).unwrap();

        assert_eq!(index.successors(0), &[1, 3]);
        // both jmps land on the phi
        assert_eq!(index.predecessors(5), &[2, 4]);
        // fall-through inside a block
        assert_eq!(index.successors(1), &[2]);
    }

    #[test]
    fn temps_resolve_to_their_defining_point() {
        let function = diamond();
        let index = InstructionIndex::build(&function.body).unwrap();

        let phi = index.instruction(&function.body, 5).unwrap();
        let result = phi.result().cloned().unwrap();
        assert_eq!(index.index_of_value(&result), Some(5));

        // parameters are not locally defined
        let param = crate::values::Value::Param(crate::values::ParamId(0));
        assert_eq!(index.index_of_value(&param), None);
    }

    #[test]
    fn phi_run_stops_at_first_non_phi() {
        let function = diamond();
        let index = InstructionIndex::build(&function.body).unwrap();

        assert_eq!(index.phi_run_from(&function.body, 5), vec![5]);
        assert!(index.phi_run_from(&function.body, 6).is_empty());
    }

    #[test]
    fn unterminated_block_is_an_error() {
        // built by hand so the builder's own validation cannot reject it first
        let mut body = crate::function::FunctionBody::new();
        let temp = body.new_temp();
        let a = crate::values::Value::Param(crate::values::ParamId(0));
        if let Some(block) = body.get_block_mut(body.entry_block()) {
            block.add_instruction(Instruction::Add {
                result: crate::values::Value::Temp(temp),
                left: a.clone(),
                right: a,
            });
        }
        assert!(InstructionIndex::build(&body).is_err());
    }
}
