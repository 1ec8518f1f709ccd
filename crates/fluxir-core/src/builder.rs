use crate::block::BlockId;
use crate::function::{Function, FunctionBody, Parameter};
use crate::instructions::Instruction;
use crate::values::{Constant, ParamId, Value};
use crate::{IrError, Result};

/// Fluent construction of a single function. Blocks are created up front,
/// then filled through [`BlockBuilder`] handles; `build` checks that every
/// block ends in a terminator.
pub struct FunctionBuilder {
    function: Function,
    next_param_id: u32,
}

impl FunctionBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            function: Function::new(name),
            next_param_id: 0,
        }
    }

    pub fn param(&mut self, name: impl Into<String>) -> Value {
        let id = ParamId(self.next_param_id);
        self.next_param_id += 1;
        self.function.params.push(Parameter::new(id, name));
        Value::Param(id)
    }

    pub fn create_block(&mut self, label: impl Into<String>) -> BlockId {
        self.function.body.create_block(label)
    }

    pub fn entry_block(&mut self) -> BlockBuilder<'_> {
        let entry = self.function.body.entry_block();
        BlockBuilder {
            body: &mut self.function.body,
            block: entry,
        }
    }

    pub fn block(&mut self, id: BlockId) -> Result<BlockBuilder<'_>> {
        if self.function.body.get_block(id).is_none() {
            return Err(IrError::UnknownBlock(id));
        }
        Ok(BlockBuilder {
            body: &mut self.function.body,
            block: id,
        })
    }

    pub fn build(self) -> Result<Function> {
        for block in self.function.body.blocks.values() {
            if !block.is_terminated() {
                return Err(IrError::MalformedFunction(format!(
                    "block '{}' in function '{}' has no terminator",
                    block.label, self.function.name
                )));
            }
            for succ in block.successors() {
                if self.function.body.get_block(succ).is_none() {
                    return Err(IrError::UnknownBlock(succ));
                }
            }
        }
        Ok(self.function)
    }
}

pub struct BlockBuilder<'a> {
    body: &'a mut FunctionBody,
    block: BlockId,
}

impl<'a> BlockBuilder<'a> {
    fn push(&mut self, inst: Instruction) {
        if let Some(block) = self.body.get_block_mut(self.block) {
            block.add_instruction(inst);
        }
    }

    fn push_binary(
        &mut self,
        left: Value,
        right: Value,
        make: impl FnOnce(Value, Value, Value) -> Instruction,
    ) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(make(result.clone(), left, right));
        result
    }

    pub fn constant_int(&self, value: i64) -> Value {
        Value::Constant(Constant::Int(value))
    }

    pub fn constant_bool(&self, value: bool) -> Value {
        Value::Constant(Constant::Bool(value))
    }

    pub fn add(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Add {
            result,
            left,
            right,
        })
    }

    pub fn sub(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Sub {
            result,
            left,
            right,
        })
    }

    pub fn mul(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Mul {
            result,
            left,
            right,
        })
    }

    pub fn div(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Div {
            result,
            left,
            right,
        })
    }

    pub fn rem(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Rem {
            result,
            left,
            right,
        })
    }

    pub fn and(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::And {
            result,
            left,
            right,
        })
    }

    pub fn or(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Or {
            result,
            left,
            right,
        })
    }

    pub fn xor(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Xor {
            result,
            left,
            right,
        })
    }

    pub fn shl(&mut self, value: Value, shift: Value) -> Value {
        self.push_binary(value, shift, |result, value, shift| Instruction::Shl {
            result,
            value,
            shift,
        })
    }

    pub fn shr(&mut self, value: Value, shift: Value) -> Value {
        self.push_binary(value, shift, |result, value, shift| Instruction::Shr {
            result,
            value,
            shift,
        })
    }

    pub fn not(&mut self, operand: Value) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Not {
            result: result.clone(),
            operand,
        });
        result
    }

    pub fn eq(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Eq {
            result,
            left,
            right,
        })
    }

    pub fn ne(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Ne {
            result,
            left,
            right,
        })
    }

    pub fn lt(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Lt {
            result,
            left,
            right,
        })
    }

    pub fn gt(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Gt {
            result,
            left,
            right,
        })
    }

    pub fn le(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Le {
            result,
            left,
            right,
        })
    }

    pub fn ge(&mut self, left: Value, right: Value) -> Value {
        self.push_binary(left, right, |result, left, right| Instruction::Ge {
            result,
            left,
            right,
        })
    }

    pub fn select(&mut self, condition: Value, then_val: Value, else_val: Value) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Select {
            result: result.clone(),
            condition,
            then_val,
            else_val,
        });
        result
    }

    pub fn alloca(&mut self) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Alloca {
            result: result.clone(),
        });
        result
    }

    pub fn load(&mut self, address: Value) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Load {
            result: result.clone(),
            address,
        });
        result
    }

    pub fn store(&mut self, value: Value, address: Value) {
        self.push(Instruction::Store { value, address });
    }

    pub fn getelementptr(&mut self, base: Value, indices: Vec<Value>) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::GetElementPtr {
            result: result.clone(),
            base,
            indices,
        });
        result
    }

    pub fn cast(&mut self, value: Value) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Cast {
            result: result.clone(),
            value,
        });
        result
    }

    pub fn call(&mut self, callee: impl Into<String>, args: Vec<Value>) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Call {
            result: Some(result.clone()),
            callee: callee.into(),
            args,
        });
        result
    }

    pub fn call_void(&mut self, callee: impl Into<String>, args: Vec<Value>) {
        self.push(Instruction::Call {
            result: None,
            callee: callee.into(),
            args,
        });
    }

    pub fn phi(&mut self, incoming: Vec<(BlockId, Value)>) -> Value {
        let result = Value::Temp(self.body.new_temp());
        self.push(Instruction::Phi {
            result: result.clone(),
            incoming,
        });
        result
    }

    pub fn jump(&mut self, target: BlockId) {
        self.push(Instruction::Jump { target });
    }

    pub fn branch(&mut self, condition: Value, then_block: BlockId, else_block: BlockId) {
        self.push(Instruction::Branch {
            condition,
            then_block,
            else_block,
        });
    }

    pub fn return_value(&mut self, value: Value) {
        self.push(Instruction::Return { value: Some(value) });
    }

    pub fn return_void(&mut self) {
        self.push(Instruction::Return { value: None });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn straight_line_function_builds() {
        let mut builder = FunctionBuilder::new("sum");
        let a = builder.param("a");
        let b = builder.param("b");

        let mut entry = builder.entry_block();
        let total = entry.add(a, b);
        entry.return_value(total);

        let function = builder.build().unwrap();
        assert_eq!(function.name, "sum");
        assert_eq!(function.body.instruction_count(), 2);
    }

    #[test]
    fn unterminated_block_is_rejected() {
        let mut builder = FunctionBuilder::new("broken");
        let a = builder.param("a");

        let mut entry = builder.entry_block();
        entry.add(a.clone(), a);

        assert!(matches!(
            builder.build(),
            Err(IrError::MalformedFunction(_))
        ));
    }

    #[test]
    fn branch_to_missing_block_is_rejected() {
        let mut builder = FunctionBuilder::new("dangling");
        let mut entry = builder.entry_block();
        entry.jump(BlockId(99));

        assert!(matches!(builder.build(), Err(IrError::UnknownBlock(_))));
    }
}
