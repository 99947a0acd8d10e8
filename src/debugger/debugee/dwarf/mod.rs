pub mod eval;
mod loader;
mod symbol;
pub mod r#type;
pub mod unit;

mod parser;

use crate::debugger::address::GlobalAddress;
use crate::debugger::debugee::dwarf::eval::{ExpressionEvaluator, ValueLocation};
use crate::debugger::debugee::dwarf::parser::DwarfUnitParser;
use crate::debugger::debugee::dwarf::r#type::ComplexType;
use crate::debugger::debugee::dwarf::unit::{
    DieRef, DieVariant, FunctionDie, Node, ParameterDie, PlaceDescriptor, Unit, VariableDie,
};
use crate::debugger::error::Error;
use crate::debugger::register::{DwarfRegisterMap, RegisterMap};
use fallible_iterator::FallibleIterator;
use gimli::{Attribute, Dwarf, Range, RunTimeEndian};
use memmap2::Mmap;
use nix::unistd::Pid;
use object::{Object, ObjectKind};
use std::fs;
use std::path::{Path, PathBuf};

pub use symbol::{Symbol, SymbolTab};

pub type EndianArcSlice = gimli::EndianArcSlice<gimli::RunTimeEndian>;

/// DWARF-derived model of the debugged executable: line tables, functions,
/// scopes, variables and types, plus the ELF symbol fallback.
pub struct DebugInformation {
    file: PathBuf,
    #[allow(unused)]
    inner: Dwarf<EndianArcSlice>,
    units: Vec<Unit>,
    symbol_table: Option<SymbolTab>,
    relocatable: bool,
}

/// Reference to a parsed DIE together with its unit context.
pub struct ContextualDieRef<'a, T> {
    pub unit: &'a Unit,
    pub entry_idx: usize,
    pub die: &'a T,
}

impl<T> Clone for ContextualDieRef<'_, T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for ContextualDieRef<'_, T> {}

impl<'a, T> ContextualDieRef<'a, T> {
    pub fn node(&self) -> &'a Node {
        &self.unit.entry(self.entry_idx).node
    }
}

impl<'a> ContextualDieRef<'a, FunctionDie> {
    pub fn name(&self) -> Option<&'a str> {
        self.die.base_attributes.name.as_deref()
    }

    pub fn ranges(&self) -> &'a [Range] {
        &self.die.base_attributes.ranges
    }

    pub fn low_pc(&self) -> Option<u64> {
        self.ranges().iter().map(|r| r.begin).min()
    }

    pub fn high_pc(&self) -> Option<u64> {
        self.ranges().iter().map(|r| r.end).max()
    }

    /// The first statement place after the function prologue. Functions
    /// compiled without an explicit `prologue_end` marker fall back to the
    /// first row past the entry address.
    pub fn prolog_end_place(&self) -> Result<PlaceDescriptor<'a>, Error> {
        let low_pc = self
            .low_pc()
            .ok_or(Error::NoDebugInformation("function ranges"))?;
        let entry_place = self
            .unit
            .find_place_by_pc(GlobalAddress::from(low_pc))
            .ok_or(Error::PlaceNotFound(GlobalAddress::from(low_pc)))?;

        let mut place = entry_place.clone();
        loop {
            if place.prolog_end {
                return Ok(place);
            }
            let Some(next) = place.next() else {
                break;
            };
            if !next.address.in_ranges(self.ranges()) {
                break;
            }
            place = next;
        }

        // no explicit prologue end, take the first row past the entry
        let mut place = entry_place.clone();
        while u64::from(place.address) == low_pc {
            match place.next() {
                Some(next) if next.address.in_ranges(self.ranges()) => place = next,
                _ => return Ok(entry_place),
            }
        }
        Ok(place)
    }

    /// Prologue address range of the function.
    pub fn prolog(&self) -> Result<Range, Error> {
        let low_pc = self
            .low_pc()
            .ok_or(Error::NoDebugInformation("function ranges"))?;
        let prolog_end = self.prolog_end_place()?;
        Ok(Range {
            begin: low_pc,
            end: prolog_end.address.into(),
        })
    }

    /// Declaration source line of the function.
    pub fn decl_line(&self) -> Option<u64> {
        self.die.decl_file_line.map(|(_, line)| line)
    }

    /// Evaluate the frame base location of this function for the stopped
    /// tracee.
    pub fn frame_base(&self, pid: Pid, mapping_offset: usize) -> Result<u64, Error> {
        let location = self.frame_base_location(pid, mapping_offset)?;
        match location {
            ValueLocation::Address(addr) => Ok(addr as u64),
            ValueLocation::Register(register) => {
                let registers = DwarfRegisterMap::from(RegisterMap::current(pid)?);
                registers.value(register)
            }
            ValueLocation::Value(value) => Ok(value),
            ValueLocation::Unsupported => Err(Error::NoFrameBase),
        }
    }

    pub fn frame_base_location(
        &self,
        pid: Pid,
        mapping_offset: usize,
    ) -> Result<ValueLocation, Error> {
        let attr = self.die.fb_addr.as_ref().ok_or(Error::NoFrameBase)?;
        let expr = attr.exprloc_value().ok_or(Error::NoFrameBase)?;
        let evaluator = ExpressionEvaluator::new(self.unit, pid, mapping_offset);
        Ok(evaluator.evaluate(expr, None)?.into_location())
    }

    /// True when the function is compiled without a saved frame pointer
    /// (its frame base is the stack pointer).
    pub fn omits_frame_pointer(&self, pid: Pid, mapping_offset: usize) -> bool {
        matches!(
            self.frame_base_location(pid, mapping_offset),
            Ok(ValueLocation::Register(register)) if register == gimli::X86_64::RSP
        )
    }
}

/// A source variable or a formal parameter, found by name at some pc.
pub enum VariableRef<'a> {
    Variable(ContextualDieRef<'a, VariableDie>),
    Parameter(ContextualDieRef<'a, ParameterDie>),
}

impl<'a> VariableRef<'a> {
    pub fn unit(&self) -> &'a Unit {
        match self {
            VariableRef::Variable(v) => v.unit,
            VariableRef::Parameter(p) => p.unit,
        }
    }

    pub fn type_ref(&self) -> Option<DieRef> {
        match self {
            VariableRef::Variable(v) => v.die.type_ref,
            VariableRef::Parameter(p) => p.die.type_ref,
        }
    }

    pub fn location_attr(&self) -> Option<&'a Attribute<EndianArcSlice>> {
        match self {
            VariableRef::Variable(v) => v.die.location.as_ref(),
            VariableRef::Parameter(p) => p.die.location.as_ref(),
        }
    }

    fn decl_file_line(&self) -> Option<(u64, u64)> {
        match self {
            VariableRef::Variable(v) => v.die.decl_file_line,
            VariableRef::Parameter(p) => p.die.decl_file_line,
        }
    }

    /// Declaration place for display: (file relative to the compilation
    /// directory, line).
    pub fn decl_place(&self) -> Option<(String, u64)> {
        let (file_idx, line) = self.decl_file_line()?;
        let unit = self.unit();
        let file = unit.files().get(file_idx as usize)?;
        Some((unit.display_file(file), line))
    }

    /// Build the type graph of this variable.
    pub fn r#type(&self) -> Option<ComplexType> {
        Some(ComplexType::parse(self.unit(), self.type_ref()?))
    }
}

impl DebugInformation {
    /// Load and parse debug information of an executable.
    pub fn new(path: &Path) -> Result<Self, Error> {
        let file = fs::File::open(path)?;
        let mmap = unsafe { Mmap::map(&file)? };
        let object_file = object::File::parse(&*mmap)?;
        let endian = if object_file.is_little_endian() {
            RunTimeEndian::Little
        } else {
            RunTimeEndian::Big
        };

        let dwarf = loader::load(&object_file, endian)?;
        let symbol_table = SymbolTab::new(&object_file);
        let relocatable = matches!(object_file.kind(), ObjectKind::Dynamic);

        let parser = DwarfUnitParser::new(&dwarf);
        let mut units = vec![];
        let mut headers_it = dwarf.units();
        while let Some(header) = headers_it.next()? {
            let unit = dwarf.unit(header)?;
            units.push(parser.parse(unit, units.len())?);
        }

        Ok(Self {
            file: path.to_path_buf(),
            inner: dwarf,
            units,
            symbol_table,
            relocatable,
        })
    }

    /// Return path to the executable file.
    pub fn pathname(&self) -> &Path {
        self.file.as_path()
    }

    /// True for position independent executables, their DWARF addresses need
    /// the load-time bias.
    pub fn is_relocatable(&self) -> bool {
        self.relocatable
    }

    pub fn unit(&self, idx: usize) -> &Unit {
        &self.units[idx]
    }

    /// Searches for a unit by occurrence of a PC in its ranges.
    fn find_unit_by_pc(&self, pc: GlobalAddress) -> Option<&Unit> {
        self.units.iter().find(|&unit| {
            match unit
                .ranges()
                .binary_search_by_key(&(pc.into()), |r| r.begin)
            {
                Ok(_) => true,
                Err(pos) => unit.ranges()[..pos]
                    .iter()
                    .rev()
                    .any(|range| pc.in_range(range)),
            }
        })
    }

    /// Returns the best matched place by program counter.
    pub fn find_place_from_pc(&self, pc: GlobalAddress) -> Option<PlaceDescriptor> {
        self.find_unit_by_pc(pc)?.find_place_by_pc(pc)
    }

    /// Returns the place with line address equal to the program counter.
    pub fn find_exact_place_from_pc(&self, pc: GlobalAddress) -> Option<PlaceDescriptor> {
        self.find_unit_by_pc(pc)?.find_exact_place_by_pc(pc)
    }

    /// Return the function containing the given pc.
    pub fn find_function_by_pc(
        &self,
        pc: GlobalAddress,
    ) -> Option<ContextualDieRef<'_, FunctionDie>> {
        let unit = self.find_unit_by_pc(pc)?;
        let pc_u64 = u64::from(pc);
        let die_ranges = unit.die_ranges();
        let find_pos = match die_ranges.binary_search_by_key(&pc_u64, |dr| dr.range.begin) {
            Ok(pos) => {
                let mut idx = pos + 1;
                while idx < die_ranges.len() && die_ranges[idx].range.begin == pc_u64 {
                    idx += 1;
                }
                idx
            }
            Err(pos) => pos,
        };

        die_ranges[..find_pos].iter().rev().find_map(|dr| {
            let entry = unit.entry(dr.die_idx);
            if let DieVariant::Function(ref func) = entry.die {
                if dr.range.begin <= pc_u64 && pc_u64 < dr.range.end {
                    return Some(ContextualDieRef {
                        unit,
                        entry_idx: dr.die_idx,
                        die: func,
                    });
                }
            };
            None
        })
    }

    /// Return a function by its name, exact match only.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::AmbiguousFunction`] if several functions carry the
    /// needle name (static functions of distinct units may collide).
    pub fn find_function_by_name(
        &self,
        needle: &str,
    ) -> Result<Option<ContextualDieRef<'_, FunctionDie>>, Error> {
        let mut found = None;
        for unit in &self.units {
            for (idx, entry) in unit.entries().iter().enumerate() {
                if let DieVariant::Function(func) = &entry.die {
                    if func.base_attributes.name.as_deref() == Some(needle)
                        && !func.base_attributes.ranges.is_empty()
                    {
                        if found.is_some() {
                            return Err(Error::AmbiguousFunction(needle.to_string()));
                        }
                        found = Some(ContextualDieRef {
                            unit,
                            entry_idx: idx,
                            die: func,
                        });
                    }
                }
            }
        }
        Ok(found)
    }

    /// Find the best statement place for a breakpoint at `(file, line)`.
    /// Empty lines fall through to the next statement (see
    /// [`Unit::find_stmt_line`]); the earliest line, then the earliest
    /// address wins across units.
    pub fn find_stmt_place(&self, file: &str, line: u64) -> Option<PlaceDescriptor> {
        self.units
            .iter()
            .filter_map(|unit| unit.find_stmt_line(file, line))
            .min_by_key(|place| (place.line_number, place.address))
    }

    /// Resolve a variable visible at `pc` by name. The innermost scope that
    /// declares the name wins; parameters count as the function root scope;
    /// file-scope variables are the last resort.
    pub fn find_variable(&self, pc: GlobalAddress, name: &str) -> Option<VariableRef<'_>> {
        if let Some(func) = self.find_function_by_pc(pc) {
            let unit = func.unit;
            let mut best: Option<(usize, VariableRef)> = None;

            let mut stack = vec![func.entry_idx];
            while let Some(idx) = stack.pop() {
                let entry = unit.entry(idx);
                stack.extend(entry.node.children.iter().copied());

                match &entry.die {
                    DieVariant::Variable(die)
                        if die.base_attributes.name.as_deref() == Some(name) =>
                    {
                        if !variable_in_scope(unit, die, pc) {
                            continue;
                        }
                        let depth = scope_depth(unit, idx);
                        if best.as_ref().map(|(d, _)| depth >= *d).unwrap_or(true) {
                            best = Some((
                                depth,
                                VariableRef::Variable(ContextualDieRef {
                                    unit,
                                    entry_idx: idx,
                                    die,
                                }),
                            ));
                        }
                    }
                    DieVariant::Parameter(die)
                        if die.base_attributes.name.as_deref() == Some(name) =>
                    {
                        if best.is_none() {
                            best = Some((
                                0,
                                VariableRef::Parameter(ContextualDieRef {
                                    unit,
                                    entry_idx: idx,
                                    die,
                                }),
                            ));
                        }
                    }
                    _ => {}
                }
            }

            if let Some((_, var)) = best {
                return Some(var);
            }
        }

        // file-scope variables
        for unit in &self.units {
            for &idx in unit.locate_var_dies(name).unwrap_or_default() {
                let entry = unit.entry(idx);
                if let DieVariant::Variable(die) = &entry.die {
                    if !has_function_ancestor(unit, idx) {
                        return Some(VariableRef::Variable(ContextualDieRef {
                            unit,
                            entry_idx: idx,
                            die,
                        }));
                    }
                }
            }
        }

        None
    }

    /// ELF symbol covering an address, the symbolization fallback for PCs
    /// without DWARF functions.
    pub fn find_symbol_by_addr(&self, addr: GlobalAddress) -> Option<&Symbol> {
        self.symbol_table.as_ref()?.find_by_addr(addr)
    }
}

fn variable_in_scope(unit: &Unit, die: &VariableDie, pc: GlobalAddress) -> bool {
    match die.lexical_block_idx {
        None => true,
        Some(block_idx) => {
            let DieVariant::LexicalBlock(block) = &unit.entry(block_idx).die else {
                return false;
            };
            // lexical blocks without range info don't constrain visibility
            block.base_attributes.ranges.is_empty() || pc.in_ranges(&block.base_attributes.ranges)
        }
    }
}

fn scope_depth(unit: &Unit, mut idx: usize) -> usize {
    let mut depth = 0;
    while let Some(parent) = unit.entry(idx).node.parent {
        match unit.entry(parent).die {
            DieVariant::LexicalBlock(_) => depth += 1,
            DieVariant::Function(_) => break,
            _ => {}
        }
        idx = parent;
    }
    depth
}

fn has_function_ancestor(unit: &Unit, mut idx: usize) -> bool {
    while let Some(parent) = unit.entry(idx).node.parent {
        if matches!(unit.entry(parent).die, DieVariant::Function(_)) {
            return true;
        }
        idx = parent;
    }
    false
}
