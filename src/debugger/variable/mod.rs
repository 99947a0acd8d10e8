pub mod render;

use crate::debugger::debugee::dwarf::eval::{ExpressionEvaluator, ValueLocation};
use crate::debugger::debugee::dwarf::r#type::TypeDeclaration;
use crate::debugger::debugee::dwarf::VariableRef;
use crate::debugger::error::Error;
use crate::debugger::register::Register;
use crate::debugger::variable::render::{
    format_addr, format_bits, format_bytes, format_hex, ValueFilter,
};
use crate::debugger::Debugger;
use crate::weak_error;
use bytes::Bytes;
use gimli::{
    DW_ATE_address, DW_ATE_boolean, DW_ATE_float, DW_ATE_signed, DW_ATE_signed_char,
    DW_ATE_unsigned, DW_ATE_unsigned_char,
};
use std::str::FromStr;

/// Interpretation class of a value, derived from the canonical type.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueClass {
    Signed,
    Unsigned,
    /// The plain C `char`, printed as a character when printable.
    PlainChar,
    SignedChar,
    UnsignedChar,
    Bool,
    Float,
    Pointer,
    /// Untyped 64-bit payload: registers, raw memory, aggregates.
    Raw,
    /// The location of the value is outside of the supported subset.
    Unsupported,
}

impl ValueClass {
    fn is_signed(self) -> bool {
        matches!(self, ValueClass::Signed | ValueClass::SignedChar)
    }
}

/// A value read from a tracee location in a chosen type.
#[derive(Debug, Clone)]
pub struct TypedValue {
    /// Raw little-endian bytes, `byte_size` long (scalars are at most 8).
    pub bytes: Bytes,
    pub class: ValueClass,
    /// Declaration site of the source variable, if any: (file, line).
    pub decl: Option<(String, u64)>,
}

impl TypedValue {
    fn raw(bytes: impl Into<Bytes>) -> Self {
        TypedValue {
            bytes: bytes.into(),
            class: ValueClass::Raw,
            decl: None,
        }
    }

    fn unsupported() -> Self {
        TypedValue {
            bytes: Bytes::new(),
            class: ValueClass::Unsupported,
            decl: None,
        }
    }

    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    /// Value zero-extended to 64 bit.
    pub fn as_u64(&self) -> u64 {
        let mut buf = [0u8; 8];
        let len = self.bytes.len().min(8);
        buf[..len].copy_from_slice(&self.bytes[..len]);
        u64::from_le_bytes(buf)
    }

    /// Value sign-extended to 64 bit according to its byte size.
    pub fn as_i64(&self) -> i64 {
        let len = self.bytes.len().min(8);
        if len == 0 || len == 8 {
            return self.as_u64() as i64;
        }
        let unsigned = self.as_u64();
        let shift = 64 - (len as u32) * 8;
        ((unsigned << shift) as i64) >> shift
    }

    /// Render the value with an optional display filter. Without a filter a
    /// sensible default per type class is chosen.
    pub fn render(&self, filter: Option<ValueFilter>) -> String {
        if self.class == ValueClass::Unsupported {
            return "<unsupported location>".to_string();
        }

        match filter {
            None => self.render_default(),
            Some(ValueFilter::Hex) => format_hex(self.as_u64()),
            Some(ValueFilter::Bits) => format_bits(self.as_u64()),
            Some(ValueFilter::Addr) => format_addr(self.as_u64()),
            Some(ValueFilter::Bytes) => format_bytes(self.as_u64()),
            Some(ValueFilter::Dec) => {
                if self.class.is_signed() {
                    self.as_i64().to_string()
                } else {
                    self.as_u64().to_string()
                }
            }
        }
    }

    fn render_default(&self) -> String {
        match self.class {
            ValueClass::Signed => self.as_i64().to_string(),
            ValueClass::Unsigned => format_hex(self.as_u64()),
            ValueClass::PlainChar => {
                let byte = self.as_u64() as u8;
                if byte.is_ascii_graphic() || byte == b' ' {
                    format!("'{}'", byte as char)
                } else {
                    (byte as i8).to_string()
                }
            }
            ValueClass::SignedChar => (self.as_u64() as u8 as i8).to_string(),
            ValueClass::UnsignedChar => (self.as_u64() as u8).to_string(),
            ValueClass::Bool => (self.as_u64() != 0).to_string(),
            ValueClass::Float => match self.bytes.len() {
                4 => f32::from_le_bytes(self.bytes[..4].try_into().expect("len checked"))
                    .to_string(),
                _ => f64::from_le_bytes(
                    self.as_u64().to_le_bytes(),
                )
                .to_string(),
            },
            ValueClass::Pointer => format_hex(self.as_u64()),
            ValueClass::Raw => format_bytes(self.as_u64()),
            ValueClass::Unsupported => "<unsupported location>".to_string(),
        }
    }

    /// Render like the user wrote the value: hex literals echo as hex,
    /// character literals as characters, everything else per type default.
    pub fn render_as_literal(&self, literal: &str) -> String {
        if self.class == ValueClass::Unsupported {
            return "<unsupported location>".to_string();
        }
        if literal.starts_with("0x") || literal.starts_with("-0x") {
            format_hex(self.as_u64())
        } else if literal.starts_with('\'') {
            self.render_default()
        } else if self.class == ValueClass::Raw {
            self.as_u64().to_string()
        } else {
            self.render(Some(ValueFilter::Dec))
        }
    }
}

/// Parse a user literal according to the canonical type class. The result is
/// the two's complement bit pattern truncated to `byte_size`.
pub fn parse_literal(text: &str, class: ValueClass, byte_size: usize) -> Result<u64, Error> {
    let value = match class {
        ValueClass::Float | ValueClass::Unsupported => return Err(Error::InvalidSetValue),
        ValueClass::PlainChar | ValueClass::SignedChar | ValueClass::UnsignedChar => {
            if let Some(ch) = parse_char_literal(text) {
                ch as u64
            } else {
                parse_int_literal(text)?
            }
        }
        _ => parse_int_literal(text)?,
    };

    let bits = byte_size.min(8) as u32 * 8;
    if bits == 0 || bits == 64 {
        return Ok(value);
    }
    Ok(value & ((1u64 << bits) - 1))
}

fn parse_char_literal(text: &str) -> Option<u8> {
    let inner = text.strip_prefix('\'')?.strip_suffix('\'')?;
    let mut chars = inner.chars();
    let ch = chars.next()?;
    if chars.next().is_some() || !ch.is_ascii() {
        return None;
    }
    Some(ch as u8)
}

fn parse_int_literal(text: &str) -> Result<u64, Error> {
    let (negative, digits) = match text.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, text),
    };

    let magnitude = if let Some(hex) = digits.strip_prefix("0x") {
        u64::from_str_radix(hex, 16)
    } else {
        u64::from_str(digits)
    }
    .map_err(|_| Error::InvalidSetValue)?;

    if negative {
        Ok((magnitude as i64).wrapping_neg() as u64)
    } else {
        Ok(magnitude)
    }
}

/// Derive the interpretation class from the canonical type declaration.
fn classify(decl: &TypeDeclaration) -> ValueClass {
    match decl {
        TypeDeclaration::Scalar { name, encoding, .. } => match *encoding {
            Some(DW_ATE_signed) => ValueClass::Signed,
            Some(DW_ATE_unsigned) => ValueClass::Unsigned,
            Some(DW_ATE_boolean) => ValueClass::Bool,
            Some(DW_ATE_float) => ValueClass::Float,
            Some(DW_ATE_address) => ValueClass::Pointer,
            Some(DW_ATE_signed_char) | Some(DW_ATE_unsigned_char) => {
                if name.as_deref() == Some("char") {
                    ValueClass::PlainChar
                } else if *encoding == Some(DW_ATE_signed_char) {
                    ValueClass::SignedChar
                } else {
                    ValueClass::UnsignedChar
                }
            }
            _ => ValueClass::Unsigned,
        },
        TypeDeclaration::Pointer { .. } => ValueClass::Pointer,
        TypeDeclaration::Structure { .. }
        | TypeDeclaration::Union { .. }
        | TypeDeclaration::Array { .. } => ValueClass::Raw,
        TypeDeclaration::Modified { .. } | TypeDeclaration::Unknown => ValueClass::Raw,
    }
}

impl Debugger {
    /// Typed read of a source variable visible at the current pc.
    pub fn read_variable(&self, name: &str) -> Result<TypedValue, Error> {
        let location = self.debugee.location()?;
        let debug_info = &self.debugee.debug_info;
        let var = debug_info
            .find_variable(location.global_pc, name)
            .ok_or_else(|| Error::VariableNotFound(name.to_string()))?;

        let (class, byte_size) = self.variable_class(&var);
        let decl = var.decl_place();

        let value_location = self.variable_location(&var)?;
        let mut value = self.read_location(value_location, byte_size)?;
        value.class = if value.class == ValueClass::Unsupported {
            ValueClass::Unsupported
        } else {
            class
        };
        value.decl = decl;
        Ok(value)
    }

    /// Typed write of a source variable, returns the value read back from the
    /// location afterwards.
    pub fn write_variable(&self, name: &str, literal: &str) -> Result<TypedValue, Error> {
        let location = self.debugee.location()?;
        let debug_info = &self.debugee.debug_info;
        let var = debug_info
            .find_variable(location.global_pc, name)
            .ok_or_else(|| Error::VariableNotFound(name.to_string()))?;

        let (class, byte_size) = self.variable_class(&var);
        let decl = var.decl_place();
        let new_value = parse_literal(literal, class, byte_size)?;

        let value_location = self.variable_location(&var)?;
        self.write_location(value_location, new_value, byte_size)?;

        let mut value = self.read_location(value_location, byte_size)?;
        if value.class != ValueClass::Unsupported {
            value.class = class;
        }
        value.decl = decl;
        Ok(value)
    }

    /// Read a register by name, the value is an untyped 8 byte payload.
    pub fn read_register(&self, name: &str) -> Result<TypedValue, Error> {
        let register = Register::from_str(name)
            .map_err(|_| Error::RegisterNameNotFound(name.to_string()))?;
        let value = self.debugee.tracee().registers()?.value(register);
        Ok(TypedValue::raw(value.to_le_bytes().to_vec()))
    }

    /// Write a register by name, returns the value read back.
    pub fn write_register(&self, name: &str, literal: &str) -> Result<TypedValue, Error> {
        let register = Register::from_str(name)
            .map_err(|_| Error::RegisterNameNotFound(name.to_string()))?;
        let new_value = parse_literal(literal, ValueClass::Raw, 8)?;

        let mut registers = self.debugee.tracee().registers()?;
        registers.update(register, new_value);
        self.debugee.tracee().set_registers(registers)?;

        let value = self.debugee.tracee().registers()?.value(register);
        Ok(TypedValue::raw(value.to_le_bytes().to_vec()))
    }

    /// Read 8 bytes of tracee memory.
    pub fn read_memory_value(&self, addr: usize) -> Result<TypedValue, Error> {
        let bytes = self.debugee.tracee().read_memory(addr, 8)?;
        Ok(TypedValue::raw(bytes))
    }

    /// Write 8 bytes of tracee memory, returns the value read back.
    pub fn write_memory_value(&self, addr: usize, literal: &str) -> Result<TypedValue, Error> {
        let new_value = parse_literal(literal, ValueClass::Raw, 8)?;
        self.debugee
            .tracee()
            .write_memory(addr, &new_value.to_le_bytes())?;
        let bytes = self.debugee.tracee().read_memory(addr, 8)?;
        Ok(TypedValue::raw(bytes))
    }

    fn variable_class(&self, var: &VariableRef) -> (ValueClass, usize) {
        let Some(complex_type) = var.r#type() else {
            return (ValueClass::Raw, 8);
        };
        let (_, canonical) = complex_type.canonical(complex_type.root);
        let class = classify(canonical);
        let byte_size = complex_type
            .byte_size(complex_type.root)
            .unwrap_or(8)
            .min(8) as usize;
        (class, byte_size.max(1))
    }

    fn variable_location(&self, var: &VariableRef) -> Result<ValueLocation, Error> {
        let Some(attr) = var.location_attr() else {
            return Ok(ValueLocation::Unsupported);
        };
        let Some(expr) = attr.exprloc_value() else {
            return Ok(ValueLocation::Unsupported);
        };

        let location = self.debugee.location()?;
        let pid = self.debugee.pid();
        let mapping_offset = self.debugee.mapping_offset();

        let frame_base = self
            .debugee
            .debug_info
            .find_function_by_pc(location.global_pc)
            .and_then(|func| weak_error!(func.frame_base(pid, mapping_offset)));

        let evaluator = ExpressionEvaluator::new(var.unit(), pid, mapping_offset);
        Ok(evaluator.evaluate(expr, frame_base)?.into_location())
    }

    fn read_location(
        &self,
        location: ValueLocation,
        byte_size: usize,
    ) -> Result<TypedValue, Error> {
        match location {
            ValueLocation::Address(addr) => {
                let bytes = self.debugee.tracee().read_memory(addr, byte_size)?;
                Ok(TypedValue::raw(bytes))
            }
            ValueLocation::Register(register) => {
                let register = Register::from_dwarf_number(register)?;
                let value = self.debugee.tracee().registers()?.value(register);
                Ok(TypedValue::raw(value.to_le_bytes()[..byte_size].to_vec()))
            }
            ValueLocation::Value(value) => {
                Ok(TypedValue::raw(value.to_le_bytes()[..byte_size].to_vec()))
            }
            ValueLocation::Unsupported => Ok(TypedValue::unsupported()),
        }
    }

    fn write_location(
        &self,
        location: ValueLocation,
        value: u64,
        byte_size: usize,
    ) -> Result<(), Error> {
        match location {
            ValueLocation::Address(addr) => self
                .debugee
                .tracee()
                .write_memory(addr, &value.to_le_bytes()[..byte_size]),
            ValueLocation::Register(register) => {
                let register = Register::from_dwarf_number(register)?;
                let mut registers = self.debugee.tracee().registers()?;
                let mut bytes = registers.value(register).to_le_bytes();
                bytes[..byte_size].copy_from_slice(&value.to_le_bytes()[..byte_size]);
                registers.update(register, u64::from_le_bytes(bytes));
                self.debugee.tracee().set_registers(registers)
            }
            ValueLocation::Value(_) | ValueLocation::Unsupported => {
                Err(Error::UnsupportedLocation)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn typed(bytes: Vec<u8>, class: ValueClass) -> TypedValue {
        TypedValue {
            bytes: bytes.into(),
            class,
            decl: None,
        }
    }

    #[test]
    fn default_display_per_class() {
        assert_eq!(typed(vec![1, 0, 0, 0], ValueClass::Signed).render(None), "1");
        assert_eq!(
            typed(vec![0x9c, 0xff, 0xff, 0xff], ValueClass::Signed).render(None),
            "-100"
        );
        assert_eq!(typed(vec![3, 0, 0, 0], ValueClass::Unsigned).render(None), "0x3");
        assert_eq!(typed(vec![b'a'], ValueClass::PlainChar).render(None), "'a'");
        assert_eq!(typed(vec![7], ValueClass::PlainChar).render(None), "7");
        assert_eq!(typed(vec![98], ValueClass::SignedChar).render(None), "98");
        assert_eq!(typed(vec![0xff], ValueClass::UnsignedChar).render(None), "255");
        assert_eq!(typed(vec![0xff], ValueClass::SignedChar).render(None), "-1");
        assert_eq!(typed(vec![1], ValueClass::Bool).render(None), "true");
        assert_eq!(
            typed(vec![0x4f, 0x11, 0x40, 0, 0, 0, 0, 0], ValueClass::Raw).render(None),
            "00 00 00 00 00 40 11 4f"
        );
    }

    #[test]
    fn filters_override_default_display() {
        let value = typed(vec![103, 0, 0, 0], ValueClass::Signed);
        assert_eq!(value.render(Some(ValueFilter::Hex)), "0x67");
        assert_eq!(value.render(Some(ValueFilter::Dec)), "103");
        assert_eq!(value.render(Some(ValueFilter::Addr)), "0x0000000000000067");
        assert_eq!(
            value.render(Some(ValueFilter::Bytes)),
            "00 00 00 00 00 00 00 67"
        );
        assert_eq!(
            value.render(Some(ValueFilter::Bits)),
            "00000000 00000000 00000000 00000000 00000000 00000000 00000000 01100111"
        );
    }

    #[test]
    fn dec_filter_respects_signedness() {
        let unsigned = typed(vec![0, 0, 0, 0, 0, 0, 0, 0x80], ValueClass::Unsigned);
        assert_eq!(
            unsigned.render(Some(ValueFilter::Dec)),
            "9223372036854775808"
        );
        let signed = typed(vec![0xff, 0xff, 0xff, 0xff], ValueClass::Signed);
        assert_eq!(signed.render(Some(ValueFilter::Dec)), "-1");
    }

    #[test]
    fn display_round_trips_through_parse() {
        // dec and hex displays of a canonical integer parse back to the
        // same bit pattern
        for raw in [0u64, 1, 103, 0xdead_beef, u32::MAX as u64] {
            let value = typed(raw.to_le_bytes()[..4].to_vec(), ValueClass::Unsigned);
            let dec = value.render(Some(ValueFilter::Dec));
            let hex = value.render(Some(ValueFilter::Hex));
            assert_eq!(parse_literal(&dec, ValueClass::Unsigned, 4).unwrap(), value.as_u64());
            assert_eq!(parse_literal(&hex, ValueClass::Unsigned, 4).unwrap(), value.as_u64());
        }

        let value = typed((-103i32).to_le_bytes().to_vec(), ValueClass::Signed);
        let dec = value.render(Some(ValueFilter::Dec));
        assert_eq!(
            parse_literal(&dec, ValueClass::Signed, 4).unwrap(),
            value.as_u64()
        );
    }

    #[test]
    fn literal_parsing() {
        assert_eq!(parse_literal("103", ValueClass::Signed, 4).unwrap(), 103);
        assert_eq!(
            parse_literal("-1", ValueClass::Signed, 4).unwrap(),
            0xffff_ffff
        );
        assert_eq!(
            parse_literal("0xdeadbeef", ValueClass::Raw, 8).unwrap(),
            0xdead_beef
        );
        assert_eq!(parse_literal("'a'", ValueClass::PlainChar, 1).unwrap(), 97);
        assert_eq!(parse_literal("0x41", ValueClass::SignedChar, 1).unwrap(), 0x41);
        assert_eq!(parse_literal("0x1ff", ValueClass::UnsignedChar, 1).unwrap(), 0xff);
        assert!(parse_literal("blahblah", ValueClass::Signed, 4).is_err());
        assert!(parse_literal("12x3", ValueClass::Unsigned, 4).is_err());
        assert!(parse_literal("''", ValueClass::PlainChar, 1).is_err());
        assert!(parse_literal("1.5", ValueClass::Float, 8).is_err());
    }

    #[test]
    fn literal_echo_keeps_the_radix() {
        let value = typed(vec![0xef, 0xbe, 0xad, 0xde, 0, 0, 0, 0], ValueClass::Raw);
        assert_eq!(value.render_as_literal("0xdeadbeef"), "0xdeadbeef");
        let value = typed(123u64.to_le_bytes().to_vec(), ValueClass::Raw);
        assert_eq!(value.render_as_literal("123"), "123");
        let value = typed(vec![103, 0, 0, 0], ValueClass::Signed);
        assert_eq!(value.render_as_literal("103"), "103");
    }
}
