/*! Parse textual FluxIR into core functions.
 *
 * Keeping analyses runnable from text files makes fixtures and command-line
 * use cheap. This crate turns `.flx` source into `fluxir_core::Function`
 * values, resolving labels and temporaries (including forward references
 * from loop phis) before the analyses ever see them.
 */

use fluxir_core::{
    BlockId, Constant, Function, Instruction, ParamId, Parameter, Value,
};
use pest::iterators::{Pair, Pairs};
use pest::Parser;
use pest_derive::Parser;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

#[derive(Parser)]
#[grammar = "grammar.pest"]
pub struct FluxirParser;

#[derive(Error, Debug)]
pub enum ParseError {
    #[error("syntax error:\n{0}")]
    Syntax(Box<pest::error::Error<Rule>>),
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("in @{function}: unknown label '{label}'")]
    UnknownLabel { function: String, label: String },
    #[error("in @{function}: duplicate label '{label}'")]
    DuplicateLabel { function: String, label: String },
    #[error("in @{function}: unknown value '%{name}'")]
    UnknownValue { function: String, name: String },
    #[error("in @{function}: duplicate definition of '%{name}'")]
    DuplicateDefinition { function: String, name: String },
    #[error("in @{function}: integer literal '{text}' is out of range")]
    IntegerOutOfRange { function: String, text: String },
    #[error("in @{function}: block '{label}' does not end with a terminator")]
    MissingTerminator { function: String, label: String },
    #[error("malformed parse tree near {0}")]
    Malformed(&'static str),
}

pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Parse a whole program. Functions are returned in source order.
pub fn parse(input: &str) -> ParseResult<Vec<Function>> {
    let mut pairs = FluxirParser::parse(Rule::program, input)
        .map_err(|e| ParseError::Syntax(Box::new(e)))?;
    let program = match pairs.next() {
        Some(pair) => pair,
        None => return Ok(Vec::new()),
    };

    let mut functions = Vec::new();
    for pair in program.into_inner() {
        if pair.as_rule() == Rule::function {
            functions.push(lower_function(pair)?);
        }
    }
    Ok(functions)
}

pub fn parse_file<P: AsRef<Path>>(path: P) -> ParseResult<Vec<Function>> {
    let path = path.as_ref();
    let input = std::fs::read_to_string(path).map_err(|source| ParseError::Io {
        path: path.display().to_string(),
        source,
    })?;
    parse(&input)
}

/// Quick syntax check without lowering.
pub fn check(input: &str) -> bool {
    FluxirParser::parse(Rule::program, input).is_ok()
}

struct Lowering<'a> {
    function: Function,
    labels: HashMap<&'a str, BlockId>,
    values: HashMap<&'a str, Value>,
}

fn lower_function(pair: Pair<'_, Rule>) -> ParseResult<Function> {
    let mut inner = pair.into_inner();
    let name = next_pair(&mut inner, "function name")?
        .as_str()
        .trim_start_matches('@')
        .to_string();

    let mut lowering = Lowering {
        function: Function::new(&name),
        labels: HashMap::new(),
        values: HashMap::new(),
    };

    let mut blocks = Vec::new();
    for pair in inner {
        match pair.as_rule() {
            Rule::param_list => lowering.declare_params(pair)?,
            Rule::block => blocks.push(pair),
            _ => {}
        }
    }

    // Labels and temporaries are declared before any instruction is
    // lowered, so phis may reference values defined further down.
    lowering.declare_blocks(&blocks)?;
    lowering.declare_temps(&blocks)?;
    for block in blocks {
        lowering.lower_block(block)?;
    }

    for block in lowering.function.body.blocks.values() {
        if !block.is_terminated() {
            return Err(ParseError::MissingTerminator {
                function: lowering.function.name.clone(),
                label: block.label.clone(),
            });
        }
    }
    Ok(lowering.function)
}

impl<'a> Lowering<'a> {
    fn declare_params(&mut self, pair: Pair<'a, Rule>) -> ParseResult<()> {
        for (i, temp) in pair.into_inner().enumerate() {
            let name = temp.as_str().trim_start_matches('%');
            let id = ParamId(i as u32);
            if self.values.insert(name, Value::Param(id)).is_some() {
                return Err(self.duplicate(name));
            }
            self.function.params.push(Parameter::new(id, name));
        }
        Ok(())
    }

    fn declare_blocks(&mut self, blocks: &[Pair<'a, Rule>]) -> ParseResult<()> {
        for (i, block) in blocks.iter().enumerate() {
            let label = match block.clone().into_inner().next() {
                Some(pair) => pair.as_str(),
                None => return Err(ParseError::Malformed("block label")),
            };
            let id = if i == 0 {
                let entry = self.function.body.entry_block();
                if let Some(entry_block) = self.function.body.get_block_mut(entry) {
                    entry_block.label = label.to_string();
                }
                entry
            } else {
                self.function.body.create_block(label)
            };
            if self.labels.insert(label, id).is_some() {
                return Err(ParseError::DuplicateLabel {
                    function: self.function.name.clone(),
                    label: label.to_string(),
                });
            }
        }
        Ok(())
    }

    /// Allocate a temporary for every assignment, in program order, so
    /// that uses textually before their definition still resolve.
    fn declare_temps(&mut self, blocks: &[Pair<'a, Rule>]) -> ParseResult<()> {
        for block in blocks {
            for inst in block.clone().into_inner() {
                if inst.as_rule() != Rule::instruction {
                    continue;
                }
                let Some(kind) = inst.into_inner().next() else {
                    continue;
                };
                if kind.as_rule() != Rule::assign {
                    continue;
                }
                let name = match kind.into_inner().next() {
                    Some(temp) => temp.as_str().trim_start_matches('%'),
                    None => return Err(ParseError::Malformed("assignment")),
                };
                let temp = self.function.body.new_temp();
                if self.values.insert(name, Value::Temp(temp)).is_some() {
                    return Err(self.duplicate(name));
                }
            }
        }
        Ok(())
    }

    fn lower_block(&mut self, pair: Pair<'a, Rule>) -> ParseResult<()> {
        let mut inner = pair.into_inner();
        let label = next_pair(&mut inner, "block label")?.as_str();
        let id = self.lookup_label(label)?;

        for inst in inner {
            let kind = match inst.into_inner().next() {
                Some(pair) => pair,
                None => continue,
            };
            let lowered = match kind.as_rule() {
                Rule::assign => self.lower_assign(kind)?,
                Rule::store => {
                    let mut parts = kind.into_inner();
                    let value = self.resolve(next_pair(&mut parts, "store value")?)?;
                    let address = self.resolve(next_pair(&mut parts, "store address")?)?;
                    Instruction::Store { value, address }
                }
                Rule::call_stmt => {
                    let call = next_pair(&mut kind.into_inner(), "call")?;
                    self.lower_call(call, None)?
                }
                Rule::branch => {
                    let mut parts = kind.into_inner();
                    let condition = self.resolve(next_pair(&mut parts, "branch condition")?)?;
                    let then_block =
                        self.lookup_label(next_pair(&mut parts, "branch target")?.as_str())?;
                    let else_block =
                        self.lookup_label(next_pair(&mut parts, "branch target")?.as_str())?;
                    Instruction::Branch {
                        condition,
                        then_block,
                        else_block,
                    }
                }
                Rule::jump => {
                    let target =
                        self.lookup_label(next_pair(&mut kind.into_inner(), "jump target")?.as_str())?;
                    Instruction::Jump { target }
                }
                Rule::ret => {
                    let value = kind
                        .into_inner()
                        .next()
                        .map(|operand| self.resolve(operand))
                        .transpose()?;
                    Instruction::Return { value }
                }
                _ => return Err(ParseError::Malformed("instruction")),
            };
            if let Some(block) = self.function.body.get_block_mut(id) {
                block.add_instruction(lowered);
            }
        }
        Ok(())
    }

    fn lower_assign(&mut self, pair: Pair<'a, Rule>) -> ParseResult<Instruction> {
        let mut inner = pair.into_inner();
        let name = next_pair(&mut inner, "assignment target")?
            .as_str()
            .trim_start_matches('%');
        let result = match self.values.get(name) {
            Some(value) => value.clone(),
            None => return Err(ParseError::Malformed("assignment target")),
        };

        let rhs = next_pair(&mut inner, "assignment rhs")?;
        let kind = next_pair(&mut rhs.into_inner(), "assignment rhs")?;
        match kind.as_rule() {
            Rule::binary_rhs => {
                let mut parts = kind.into_inner();
                let op = next_pair(&mut parts, "operator")?.as_str().to_string();
                let left = self.resolve(next_pair(&mut parts, "operand")?)?;
                let right = self.resolve(next_pair(&mut parts, "operand")?)?;
                Ok(binary_instruction(&op, result, left, right))
            }
            Rule::not_rhs => {
                let operand = self.resolve(next_pair(&mut kind.into_inner(), "operand")?)?;
                Ok(Instruction::Not { result, operand })
            }
            Rule::select_rhs => {
                let mut parts = kind.into_inner();
                let condition = self.resolve(next_pair(&mut parts, "operand")?)?;
                let then_val = self.resolve(next_pair(&mut parts, "operand")?)?;
                let else_val = self.resolve(next_pair(&mut parts, "operand")?)?;
                Ok(Instruction::Select {
                    result,
                    condition,
                    then_val,
                    else_val,
                })
            }
            Rule::alloca_rhs => Ok(Instruction::Alloca { result }),
            Rule::load_rhs => {
                let address = self.resolve(next_pair(&mut kind.into_inner(), "operand")?)?;
                Ok(Instruction::Load { result, address })
            }
            Rule::gep_rhs => {
                let mut parts = kind.into_inner();
                let base = self.resolve(next_pair(&mut parts, "operand")?)?;
                let indices = parts
                    .map(|operand| self.resolve(operand))
                    .collect::<ParseResult<Vec<_>>>()?;
                Ok(Instruction::GetElementPtr {
                    result,
                    base,
                    indices,
                })
            }
            Rule::cast_rhs => {
                let value = self.resolve(next_pair(&mut kind.into_inner(), "operand")?)?;
                Ok(Instruction::Cast { result, value })
            }
            Rule::call_rhs => self.lower_call(kind, Some(result)),
            Rule::phi_rhs => {
                let mut incoming = Vec::new();
                for arm in kind.into_inner() {
                    let mut parts = arm.into_inner();
                    let label = next_pair(&mut parts, "phi label")?.as_str();
                    let block = self.lookup_label(label)?;
                    let value = self.resolve(next_pair(&mut parts, "phi value")?)?;
                    incoming.push((block, value));
                }
                Ok(Instruction::Phi { result, incoming })
            }
            _ => Err(ParseError::Malformed("assignment rhs")),
        }
    }

    fn lower_call(
        &mut self,
        pair: Pair<'a, Rule>,
        result: Option<Value>,
    ) -> ParseResult<Instruction> {
        let mut inner = pair.into_inner();
        let callee = next_pair(&mut inner, "callee")?
            .as_str()
            .trim_start_matches('@')
            .to_string();
        let args = match inner.next() {
            Some(list) => list
                .into_inner()
                .map(|operand| self.resolve(operand))
                .collect::<ParseResult<Vec<_>>>()?,
            None => Vec::new(),
        };
        Ok(Instruction::Call {
            result,
            callee,
            args,
        })
    }

    fn resolve(&self, pair: Pair<'a, Rule>) -> ParseResult<Value> {
        let inner = match pair.into_inner().next() {
            Some(pair) => pair,
            None => return Err(ParseError::Malformed("operand")),
        };
        match inner.as_rule() {
            Rule::temp => {
                let name = inner.as_str().trim_start_matches('%');
                self.values
                    .get(name)
                    .cloned()
                    .ok_or_else(|| ParseError::UnknownValue {
                        function: self.function.name.clone(),
                        name: name.to_string(),
                    })
            }
            Rule::constant => match inner.as_str() {
                "true" => Ok(Value::Constant(Constant::Bool(true))),
                "false" => Ok(Value::Constant(Constant::Bool(false))),
                text => text
                    .parse::<i64>()
                    .map(|v| Value::Constant(Constant::Int(v)))
                    .map_err(|_| ParseError::IntegerOutOfRange {
                        function: self.function.name.clone(),
                        text: text.to_string(),
                    }),
            },
            _ => Err(ParseError::Malformed("operand")),
        }
    }

    fn lookup_label(&self, label: &str) -> ParseResult<BlockId> {
        self.labels
            .get(label)
            .copied()
            .ok_or_else(|| ParseError::UnknownLabel {
                function: self.function.name.clone(),
                label: label.to_string(),
            })
    }

    fn duplicate(&self, name: &str) -> ParseError {
        ParseError::DuplicateDefinition {
            function: self.function.name.clone(),
            name: name.to_string(),
        }
    }
}

fn binary_instruction(op: &str, result: Value, left: Value, right: Value) -> Instruction {
    match op {
        "add" => Instruction::Add { result, left, right },
        "sub" => Instruction::Sub { result, left, right },
        "mul" => Instruction::Mul { result, left, right },
        "div" => Instruction::Div { result, left, right },
        "rem" => Instruction::Rem { result, left, right },
        "and" => Instruction::And { result, left, right },
        "or" => Instruction::Or { result, left, right },
        "xor" => Instruction::Xor { result, left, right },
        "shl" => Instruction::Shl {
            result,
            value: left,
            shift: right,
        },
        "shr" => Instruction::Shr {
            result,
            value: left,
            shift: right,
        },
        "eq" => Instruction::Eq { result, left, right },
        "ne" => Instruction::Ne { result, left, right },
        "lt" => Instruction::Lt { result, left, right },
        "gt" => Instruction::Gt { result, left, right },
        "le" => Instruction::Le { result, left, right },
        _ => Instruction::Ge { result, left, right },
    }
}

fn next_pair<'a>(pairs: &mut Pairs<'a, Rule>, what: &'static str) -> ParseResult<Pair<'a, Rule>> {
    pairs.next().ok_or(ParseError::Malformed(what))
}
