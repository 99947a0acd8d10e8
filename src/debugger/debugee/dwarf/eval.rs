use crate::debugger::debugee::dwarf::unit::{DieVariant, Unit};
use crate::debugger::debugee::dwarf::EndianArcSlice;
use crate::debugger::error::Error;
use crate::debugger::error::Error::{EvalOptionRequired, EvalUnsupportedRequire};
use crate::debugger::register::{DwarfRegisterMap, Register, RegisterMap};
use gimli::{EvaluationResult, Expression, Location, Piece, Value, ValueType};
use nix::unistd::Pid;

/// The evaluated place of a value inside the tracee.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueLocation {
    /// Value lives in tracee memory at this (already relocated) address.
    Address(usize),
    /// Value lives in a register, identified by its DWARF number.
    Register(gimli::Register),
    /// Value is synthesized by the expression itself.
    Value(u64),
    /// Location descriptions outside of the supported subset.
    Unsupported,
}

/// DWARF expression evaluator bound to one compilation unit and one stopped
/// tracee.
pub struct ExpressionEvaluator<'a> {
    unit: &'a Unit,
    pid: Pid,
    mapping_offset: usize,
}

impl<'a> ExpressionEvaluator<'a> {
    pub fn new(unit: &'a Unit, pid: Pid, mapping_offset: usize) -> Self {
        Self {
            unit,
            pid,
            mapping_offset,
        }
    }

    /// Run the gimli evaluation state machine, resolving requirements from
    /// the stopped tracee.
    ///
    /// `frame_base` must be provided for expressions that reference it
    /// (`DW_OP_fbreg`).
    pub fn evaluate(
        &self,
        expr: Expression<EndianArcSlice>,
        frame_base: Option<u64>,
    ) -> Result<CompletedResult, Error> {
        let mut eval = expr.evaluation(self.unit.encoding());

        let mut result = eval.evaluate()?;
        while result != EvaluationResult::Complete {
            match result {
                EvaluationResult::RequiresRegister {
                    register,
                    base_type: _base_type,
                } => {
                    let registers = DwarfRegisterMap::from(RegisterMap::current(self.pid)?);
                    let value = Value::Generic(registers.value(register)?);
                    result = eval.resume_with_register(value)?;
                }
                EvaluationResult::RequiresFrameBase => {
                    result = eval
                        .resume_with_frame_base(frame_base.ok_or(EvalOptionRequired("frame_base"))?)?;
                }
                EvaluationResult::RequiresRelocatedAddress(addr) => {
                    result = eval.resume_with_relocated_address(addr + self.mapping_offset as u64)?;
                }
                EvaluationResult::RequiresCallFrameCfa => {
                    // standard x86-64 prologue: CFA is the caller rsp, which
                    // sits two slots above the saved frame pointer
                    let rbp = RegisterMap::current(self.pid)?.value(Register::Rbp);
                    result = eval.resume_with_call_frame_cfa(rbp + 16)?;
                }
                EvaluationResult::RequiresBaseType(offset) => {
                    let base_type = self
                        .unit
                        .find_entry(offset)
                        .and_then(|entry| {
                            if let DieVariant::BaseType(die) = &entry.die {
                                return ValueType::from_encoding(die.encoding?, die.byte_size?);
                            }
                            None
                        })
                        .unwrap_or(ValueType::Generic);
                    result = eval.resume_with_base_type(base_type)?;
                }
                _ => {
                    return Err(EvalUnsupportedRequire(format!("{result:?}")));
                }
            };
        }

        Ok(CompletedResult {
            pieces: eval.result(),
        })
    }
}

pub struct CompletedResult {
    pieces: Vec<Piece<EndianArcSlice>>,
}

impl CompletedResult {
    /// Reduce the evaluation result to a single value location. Composite
    /// (multi-piece) results are outside of the supported subset.
    pub fn into_location(self) -> ValueLocation {
        if self.pieces.len() != 1 {
            return ValueLocation::Unsupported;
        }

        match &self.pieces[0].location {
            Location::Address { address } => ValueLocation::Address(*address as usize),
            Location::Register { register } => ValueLocation::Register(*register),
            Location::Value { value } => match value {
                Value::Generic(v) | Value::U64(v) => ValueLocation::Value(*v),
                Value::I64(v) => ValueLocation::Value(*v as u64),
                Value::U32(v) => ValueLocation::Value(*v as u64),
                Value::I32(v) => ValueLocation::Value(*v as u64),
                _ => ValueLocation::Unsupported,
            },
            _ => ValueLocation::Unsupported,
        }
    }
}
