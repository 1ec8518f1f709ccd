use crate::block::BlockId;
use crate::values::Value;
use serde::{Deserialize, Serialize};

/// Closed instruction set. Adding an operation class means adding a variant
/// here and a match arm in each analysis, never subclassing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Instruction {
    Add {
        result: Value,
        left: Value,
        right: Value,
    },
    Sub {
        result: Value,
        left: Value,
        right: Value,
    },
    Mul {
        result: Value,
        left: Value,
        right: Value,
    },
    Div {
        result: Value,
        left: Value,
        right: Value,
    },
    Rem {
        result: Value,
        left: Value,
        right: Value,
    },

    And {
        result: Value,
        left: Value,
        right: Value,
    },
    Or {
        result: Value,
        left: Value,
        right: Value,
    },
    Xor {
        result: Value,
        left: Value,
        right: Value,
    },
    Shl {
        result: Value,
        value: Value,
        shift: Value,
    },
    Shr {
        result: Value,
        value: Value,
        shift: Value,
    },
    Not {
        result: Value,
        operand: Value,
    },

    Eq {
        result: Value,
        left: Value,
        right: Value,
    },
    Ne {
        result: Value,
        left: Value,
        right: Value,
    },
    Lt {
        result: Value,
        left: Value,
        right: Value,
    },
    Gt {
        result: Value,
        left: Value,
        right: Value,
    },
    Le {
        result: Value,
        left: Value,
        right: Value,
    },
    Ge {
        result: Value,
        left: Value,
        right: Value,
    },

    Select {
        result: Value,
        condition: Value,
        then_val: Value,
        else_val: Value,
    },

    Alloca {
        result: Value,
    },
    Load {
        result: Value,
        address: Value,
    },
    Store {
        value: Value,
        address: Value,
    },
    GetElementPtr {
        result: Value,
        base: Value,
        indices: Vec<Value>,
    },
    Cast {
        result: Value,
        value: Value,
    },

    Call {
        result: Option<Value>,
        callee: String,
        args: Vec<Value>,
    },

    Phi {
        result: Value,
        incoming: Vec<(BlockId, Value)>,
    },

    Jump {
        target: BlockId,
    },
    Branch {
        condition: Value,
        then_block: BlockId,
        else_block: BlockId,
    },
    Return {
        value: Option<Value>,
    },
}

impl Instruction {
    pub fn result(&self) -> Option<&Value> {
        match self {
            Instruction::Add { result, .. }
            | Instruction::Sub { result, .. }
            | Instruction::Mul { result, .. }
            | Instruction::Div { result, .. }
            | Instruction::Rem { result, .. }
            | Instruction::And { result, .. }
            | Instruction::Or { result, .. }
            | Instruction::Xor { result, .. }
            | Instruction::Shl { result, .. }
            | Instruction::Shr { result, .. }
            | Instruction::Not { result, .. }
            | Instruction::Eq { result, .. }
            | Instruction::Ne { result, .. }
            | Instruction::Lt { result, .. }
            | Instruction::Gt { result, .. }
            | Instruction::Le { result, .. }
            | Instruction::Ge { result, .. }
            | Instruction::Select { result, .. }
            | Instruction::Alloca { result, .. }
            | Instruction::Load { result, .. }
            | Instruction::GetElementPtr { result, .. }
            | Instruction::Cast { result, .. }
            | Instruction::Phi { result, .. } => Some(result),
            Instruction::Call { result, .. } => result.as_ref(),
            _ => None,
        }
    }

    /// Every value operand, in operand order. Terminator operands count:
    /// a branch condition or returned value is a use like any other.
    pub fn operands(&self) -> Vec<&Value> {
        match self {
            Instruction::Add { left, right, .. }
            | Instruction::Sub { left, right, .. }
            | Instruction::Mul { left, right, .. }
            | Instruction::Div { left, right, .. }
            | Instruction::Rem { left, right, .. }
            | Instruction::And { left, right, .. }
            | Instruction::Or { left, right, .. }
            | Instruction::Xor { left, right, .. }
            | Instruction::Eq { left, right, .. }
            | Instruction::Ne { left, right, .. }
            | Instruction::Lt { left, right, .. }
            | Instruction::Gt { left, right, .. }
            | Instruction::Le { left, right, .. }
            | Instruction::Ge { left, right, .. } => vec![left, right],
            Instruction::Shl { value, shift, .. } | Instruction::Shr { value, shift, .. } => {
                vec![value, shift]
            }
            Instruction::Not { operand, .. } => vec![operand],
            Instruction::Select {
                condition,
                then_val,
                else_val,
                ..
            } => vec![condition, then_val, else_val],
            Instruction::Alloca { .. } => Vec::new(),
            Instruction::Load { address, .. } => vec![address],
            Instruction::Store { value, address } => vec![value, address],
            Instruction::GetElementPtr { base, indices, .. } => {
                let mut ops = vec![base];
                ops.extend(indices.iter());
                ops
            }
            Instruction::Cast { value, .. } => vec![value],
            Instruction::Call { args, .. } => args.iter().collect(),
            Instruction::Phi { incoming, .. } => incoming.iter().map(|(_, v)| v).collect(),
            Instruction::Jump { .. } => Vec::new(),
            Instruction::Branch { condition, .. } => vec![condition],
            Instruction::Return { value } => value.iter().collect(),
        }
    }

    /// The def/kill-relevant class shared by liveness and reaching
    /// definitions. Phi is handled separately by both; calls and
    /// terminators pass through.
    pub fn is_definition(&self) -> bool {
        matches!(
            self,
            Instruction::Add { .. }
                | Instruction::Sub { .. }
                | Instruction::Mul { .. }
                | Instruction::Div { .. }
                | Instruction::Rem { .. }
                | Instruction::And { .. }
                | Instruction::Or { .. }
                | Instruction::Xor { .. }
                | Instruction::Shl { .. }
                | Instruction::Shr { .. }
                | Instruction::Not { .. }
                | Instruction::Eq { .. }
                | Instruction::Ne { .. }
                | Instruction::Lt { .. }
                | Instruction::Gt { .. }
                | Instruction::Le { .. }
                | Instruction::Ge { .. }
                | Instruction::Select { .. }
                | Instruction::Alloca { .. }
                | Instruction::Load { .. }
                | Instruction::GetElementPtr { .. }
                | Instruction::Cast { .. }
        )
    }

    pub fn is_phi(&self) -> bool {
        matches!(self, Instruction::Phi { .. })
    }

    pub fn is_terminator(&self) -> bool {
        matches!(
            self,
            Instruction::Jump { .. } | Instruction::Branch { .. } | Instruction::Return { .. }
        )
    }

    /// Successor blocks of a terminator; empty for everything else.
    pub fn successors(&self) -> Vec<BlockId> {
        match self {
            Instruction::Jump { target } => vec![*target],
            Instruction::Branch {
                then_block,
                else_block,
                ..
            } => vec![*then_block, *else_block],
            _ => Vec::new(),
        }
    }

    pub fn opcode(&self) -> &'static str {
        match self {
            Instruction::Add { .. } => "add",
            Instruction::Sub { .. } => "sub",
            Instruction::Mul { .. } => "mul",
            Instruction::Div { .. } => "div",
            Instruction::Rem { .. } => "rem",
            Instruction::And { .. } => "and",
            Instruction::Or { .. } => "or",
            Instruction::Xor { .. } => "xor",
            Instruction::Shl { .. } => "shl",
            Instruction::Shr { .. } => "shr",
            Instruction::Not { .. } => "not",
            Instruction::Eq { .. } => "eq",
            Instruction::Ne { .. } => "ne",
            Instruction::Lt { .. } => "lt",
            Instruction::Gt { .. } => "gt",
            Instruction::Le { .. } => "le",
            Instruction::Ge { .. } => "ge",
            Instruction::Select { .. } => "select",
            Instruction::Alloca { .. } => "alloca",
            Instruction::Load { .. } => "load",
            Instruction::Store { .. } => "store",
            Instruction::GetElementPtr { .. } => "getelementptr",
            Instruction::Cast { .. } => "cast",
            Instruction::Call { .. } => "call",
            Instruction::Phi { .. } => "phi",
            Instruction::Jump { .. } => "jmp",
            Instruction::Branch { .. } => "br",
            Instruction::Return { .. } => "ret",
        }
    }
}

impl std::fmt::Display for Instruction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Instruction::Select {
                result,
                condition,
                then_val,
                else_val,
            } => write!(f, "{} = select {}, {}, {}", result, condition, then_val, else_val),
            Instruction::Alloca { result } => write!(f, "{} = alloca", result),
            Instruction::Store { value, address } => write!(f, "store {}, {}", value, address),
            Instruction::Call {
                result,
                callee,
                args,
            } => {
                if let Some(result) = result {
                    write!(f, "{} = ", result)?;
                }
                write!(f, "call @{}", callee)?;
                for (i, arg) in args.iter().enumerate() {
                    write!(f, "{}{}", if i == 0 { " " } else { ", " }, arg)?;
                }
                Ok(())
            }
            Instruction::Phi { result, incoming } => {
                write!(f, "{} = phi", result)?;
                for (i, (block, value)) in incoming.iter().enumerate() {
                    write!(
                        f,
                        "{}[{}, {}]",
                        if i == 0 { " " } else { ", " },
                        block,
                        value
                    )?;
                }
                Ok(())
            }
            Instruction::Jump { target } => write!(f, "jmp {}", target),
            Instruction::Branch {
                condition,
                then_block,
                else_block,
            } => write!(f, "br {}, {}, {}", condition, then_block, else_block),
            Instruction::Return { value: Some(value) } => write!(f, "ret {}", value),
            Instruction::Return { value: None } => write!(f, "ret"),
            other => {
                if let Some(result) = other.result() {
                    write!(f, "{} = ", result)?;
                }
                write!(f, "{}", other.opcode())?;
                for (i, op) in other.operands().iter().enumerate() {
                    write!(f, "{}{}", if i == 0 { " " } else { ", " }, op)?;
                }
                Ok(())
            }
        }
    }
}
