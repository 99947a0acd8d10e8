use crate::debugger::address::GlobalAddress;
use crate::debugger::debugee::dwarf::EndianArcSlice;
use gimli::{Attribute, AttributeValue, DebugInfoOffset, DwAte, Encoding, Range, UnitOffset};
use std::collections::HashMap;
use std::fmt::{Debug, Formatter};
use std::path::{Path, PathBuf};

pub(super) const IS_STMT: u8 = 1 << 1;
pub(super) const PROLOG_END: u8 = 1 << 2;
pub(super) const EPILOG_BEGIN: u8 = 1 << 3;
pub(super) const END_SEQUENCE: u8 = 1 << 4;

/// A row in the line number program's resulting matrix.
#[derive(PartialEq, Debug, Clone)]
pub(super) struct LineRow {
    pub(super) address: u64,
    pub(super) file_index: u64,
    pub(super) line: u64,
    pub(super) column: u64,
    pub(super) flags: u8,
}

impl LineRow {
    #[inline(always)]
    pub fn is_stmt(&self) -> bool {
        self.flags & IS_STMT == IS_STMT
    }

    #[inline(always)]
    pub fn prolog_end(&self) -> bool {
        self.flags & PROLOG_END == PROLOG_END
    }

    #[inline(always)]
    pub fn epilog_begin(&self) -> bool {
        self.flags & EPILOG_BEGIN == EPILOG_BEGIN
    }

    #[inline(always)]
    pub fn end_sequence(&self) -> bool {
        self.flags & END_SEQUENCE == END_SEQUENCE
    }
}

/// An address range of a debug information entry, together with a reference
/// to the entry itself (as an index in the unit entries list).
#[derive(Debug, Clone)]
pub struct DieRange {
    pub range: Range,
    pub die_idx: usize,
}

/// A place in the program text identified by file, line and column.
#[derive(Clone)]
pub struct PlaceDescriptor<'a> {
    pub file: &'a Path,
    pub address: GlobalAddress,
    pub line_number: u64,
    pub column_number: u64,
    pub pos_in_unit: usize,
    pub is_stmt: bool,
    pub prolog_end: bool,
    pub end_sequence: bool,
    unit: &'a Unit,
}

/// Like a [`PlaceDescriptor`] but without the reference into the unit.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaceDescriptorOwned {
    pub file: PathBuf,
    /// File path relative to the compilation directory, for display.
    pub file_display: String,
    pub address: GlobalAddress,
    pub line_number: u64,
    pub column_number: u64,
    pub pos_in_unit: usize,
    pub is_stmt: bool,
    pub prolog_end: bool,
}

impl<'a> From<(&'a Unit, usize, &LineRow)> for PlaceDescriptor<'a> {
    fn from((unit, pos_in_unit, line_row): (&'a Unit, usize, &LineRow)) -> Self {
        PlaceDescriptor {
            file: unit
                .files
                .get(line_row.file_index as usize)
                .expect("file should exists"),
            address: line_row.address.into(),
            line_number: line_row.line,
            column_number: line_row.column,
            pos_in_unit,
            is_stmt: line_row.is_stmt(),
            prolog_end: line_row.prolog_end(),
            end_sequence: line_row.end_sequence(),
            unit,
        }
    }
}

impl Debug for PlaceDescriptor<'_> {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_fmt(format_args!(
            "file: {:?}, line: {}, addr: {}, is_stmt: {}, prolog_end: {}",
            self.file, self.line_number, self.address, self.is_stmt, self.prolog_end
        ))
    }
}

impl<'a> PlaceDescriptor<'a> {
    pub fn next(&self) -> Option<PlaceDescriptor<'a>> {
        self.unit.find_place_by_idx(self.pos_in_unit + 1)
    }

    pub fn line_eq(&self, other: &PlaceDescriptor) -> bool {
        self.file == other.file && self.line_number == other.line_number
    }

    /// File path relative to the compilation directory.
    pub fn file_display(&self) -> String {
        self.unit.display_file(self.file)
    }

    pub fn to_owned(&self) -> PlaceDescriptorOwned {
        PlaceDescriptorOwned {
            file: self.file.to_path_buf(),
            file_display: self.file_display(),
            address: self.address,
            line_number: self.line_number,
            column_number: self.column_number,
            pos_in_unit: self.pos_in_unit,
            is_stmt: self.is_stmt,
            prolog_end: self.prolog_end,
        }
    }
}

impl PartialEq for PlaceDescriptor<'_> {
    fn eq(&self, other: &Self) -> bool {
        self.file == other.file
            && self.address == other.address
            && self.line_number == other.line_number
            && self.pos_in_unit == other.pos_in_unit
    }
}

#[derive(Debug, PartialEq, Clone)]
pub struct DieAttributes {
    pub name: Option<String>,
    pub ranges: Box<[Range]>,
}

#[derive(Debug, Clone)]
pub struct FunctionDie {
    pub base_attributes: DieAttributes,
    pub decl_file_line: Option<(u64, u64)>,
    pub fb_addr: Option<Attribute<EndianArcSlice>>,
}

#[derive(Debug, Clone)]
pub struct LexicalBlockDie {
    pub base_attributes: DieAttributes,
}

#[derive(Debug, Clone)]
pub struct VariableDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
    pub location: Option<Attribute<EndianArcSlice>>,
    pub decl_file_line: Option<(u64, u64)>,
    /// Innermost lexical block that owns this variable, `None` for variables
    /// in the function root scope or globals.
    pub lexical_block_idx: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct ParameterDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
    pub location: Option<Attribute<EndianArcSlice>>,
    pub decl_file_line: Option<(u64, u64)>,
}

#[derive(Debug, Clone)]
pub struct BaseTypeDie {
    pub base_attributes: DieAttributes,
    pub encoding: Option<DwAte>,
    pub byte_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct StructTypeDie {
    pub base_attributes: DieAttributes,
    pub byte_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct UnionTypeDie {
    pub base_attributes: DieAttributes,
    pub byte_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TypeMemberDie {
    pub base_attributes: DieAttributes,
    pub location: Option<Attribute<EndianArcSlice>>,
    pub type_ref: Option<DieRef>,
}

#[derive(Debug, Clone)]
pub struct ArrayDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
    pub byte_size: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct ArraySubrangeDie {
    pub base_attributes: DieAttributes,
    pub lower_bound: Option<Attribute<EndianArcSlice>>,
    pub upper_bound: Option<Attribute<EndianArcSlice>>,
    pub count: Option<Attribute<EndianArcSlice>>,
}

#[derive(Debug, Clone)]
pub struct PointerTypeDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
}

#[derive(Debug, Clone)]
pub struct TypeDefDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
}

#[derive(Debug, Clone)]
pub struct ConstTypeDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
}

#[derive(Debug, Clone)]
pub struct VolatileTypeDie {
    pub base_attributes: DieAttributes,
    pub type_ref: Option<DieRef>,
}

#[derive(Debug, Clone)]
pub enum DieVariant {
    Function(FunctionDie),
    LexicalBlock(LexicalBlockDie),
    Variable(VariableDie),
    Parameter(ParameterDie),
    BaseType(BaseTypeDie),
    StructType(StructTypeDie),
    UnionType(UnionTypeDie),
    TypeMember(TypeMemberDie),
    ArrayType(ArrayDie),
    ArraySubrange(ArraySubrangeDie),
    PointerType(PointerTypeDie),
    TypeDef(TypeDefDie),
    ConstType(ConstTypeDie),
    VolatileType(VolatileTypeDie),
    Default(DieAttributes),
}

#[derive(Debug, Clone)]
pub struct Node {
    pub parent: Option<usize>,
    pub children: Vec<usize>,
}

impl Node {
    pub const fn new_leaf(parent: Option<usize>) -> Node {
        Self {
            parent,
            children: vec![],
        }
    }
}

#[derive(Debug, Clone)]
pub struct Entry {
    pub die: DieVariant,
    pub node: Node,
}

impl Entry {
    pub(super) fn new(die: DieVariant, parent_idx: Option<usize>) -> Self {
        Self {
            die,
            node: Node::new_leaf(parent_idx),
        }
    }
}

/// Reference to a DIE, either unit-local or global to the whole `.debug_info`.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub enum DieRef {
    Unit(UnitOffset),
    Global(DebugInfoOffset),
}

impl DieRef {
    pub(super) fn from_attr(attr: Attribute<EndianArcSlice>) -> Option<DieRef> {
        match attr.value() {
            AttributeValue::DebugInfoRef(offset) => Some(DieRef::Global(offset)),
            AttributeValue::UnitRef(offset) => Some(DieRef::Unit(offset)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub(super) struct UnitProperties {
    pub(super) encoding: Encoding,
    pub(super) offset: Option<DebugInfoOffset>,
    pub(super) low_pc: u64,
}

/// Eagerly parsed DWARF compilation unit.
#[derive(Debug)]
pub struct Unit {
    pub(super) idx: usize,
    pub(super) name: Option<String>,
    pub(super) properties: UnitProperties,
    pub(super) comp_dir: Option<PathBuf>,
    pub(super) files: Vec<PathBuf>,
    /// List of program lines, ordered by address.
    pub(super) lines: Vec<LineRow>,
    pub(super) ranges: Vec<Range>,
    pub(super) entries: Vec<Entry>,
    /// DIE ranges ordered by `range.begin`.
    pub(super) die_ranges: Vec<DieRange>,
    /// Index for variable DIE positions: variable name -> positions in `entries`.
    pub(super) variable_index: HashMap<String, Vec<usize>>,
    /// Index for DIE offsets: offset in unit -> position in `entries`.
    pub(super) die_offsets_index: HashMap<UnitOffset, usize>,
}

impl Unit {
    /// Return unit index in the unit registry.
    pub fn idx(&self) -> usize {
        self.idx
    }

    pub fn encoding(&self) -> Encoding {
        self.properties.encoding
    }

    pub fn low_pc(&self) -> u64 {
        self.properties.low_pc
    }

    pub fn offset(&self) -> Option<DebugInfoOffset> {
        self.properties.offset
    }

    pub fn ranges(&self) -> &[Range] {
        &self.ranges
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    /// Return a file path relative to the compilation directory (full path if
    /// the file lives outside of it).
    pub fn display_file(&self, file: &Path) -> String {
        let stripped = self
            .comp_dir
            .as_ref()
            .and_then(|dir| file.strip_prefix(dir).ok())
            .unwrap_or(file);
        stripped.to_string_lossy().to_string()
    }

    /// Return [`PlaceDescriptor`] by index in the unit line vector.
    pub(super) fn find_place_by_idx(&self, line_pos: usize) -> Option<PlaceDescriptor> {
        let line = self.lines.get(line_pos)?;
        Some((self, line_pos, line).into())
    }

    /// Return the nearest [`PlaceDescriptor`] for the given program counter,
    /// `None` if the pc falls into a gap between line sequences.
    pub fn find_place_by_pc(&self, pc: GlobalAddress) -> Option<PlaceDescriptor> {
        let pc = u64::from(pc);
        let pos = match self.lines.binary_search_by_key(&pc, |line| line.address) {
            Ok(p) => p,
            Err(0) => return None,
            Err(p) => p - 1,
        };

        if self.lines[pos].end_sequence() {
            return None;
        }
        self.find_place_by_idx(pos)
    }

    /// Return the place with line address equal to the given program counter.
    pub fn find_exact_place_by_pc(&self, pc: GlobalAddress) -> Option<PlaceDescriptor> {
        let pc = u64::from(pc);
        match self.lines.binary_search_by_key(&pc, |line| line.address) {
            Ok(p) => self.find_place_by_idx(p),
            Err(_) => None,
        }
    }

    /// Return the best statement place for a breakpoint at `(file, line)`.
    ///
    /// If the line itself has no statement row (an empty line or a closing
    /// brace) the lookup falls through to the next statement row of the same
    /// file; among rows with equal lines the earliest address wins.
    pub fn find_stmt_line(&self, file: &str, line: u64) -> Option<PlaceDescriptor> {
        let mut best: Option<(u64, u64, usize)> = None;

        for (pos, row) in self.lines.iter().enumerate() {
            if !row.is_stmt() || row.end_sequence() || row.line < line {
                continue;
            }
            let row_file = self.files.get(row.file_index as usize)?;
            if !path_matches(row_file, file) {
                continue;
            }
            let candidate = (row.line, row.address, pos);
            if best.map(|b| candidate < b).unwrap_or(true) {
                best = Some(candidate);
            }
        }

        self.find_place_by_idx(best?.2)
    }

    pub fn entry(&self, idx: usize) -> &Entry {
        &self.entries[idx]
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn die_ranges(&self) -> &[DieRange] {
        &self.die_ranges
    }

    /// Return a debug entry by its offset in the unit, `None` if it doesn't exist.
    pub fn find_entry(&self, offset: UnitOffset) -> Option<&Entry> {
        let die_idx = self.die_offsets_index.get(&offset)?;
        Some(self.entry(*die_idx))
    }

    pub(super) fn locate_var_dies(&self, name: &str) -> Option<&[usize]> {
        self.variable_index.get(name).map(|v| v.as_slice())
    }
}

/// Two paths refer to the same file iff their basenames match and, when the
/// query carries directories, those form a suffix of the candidate path.
pub fn path_matches(candidate: &Path, query: &str) -> bool {
    let query = Path::new(query);
    if query.components().count() <= 1 {
        return candidate.file_name() == query.file_name();
    }
    candidate.ends_with(query)
}
