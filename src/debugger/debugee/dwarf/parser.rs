use crate::debugger::debugee::dwarf::unit::{
    ArrayDie, ArraySubrangeDie, BaseTypeDie, ConstTypeDie, DieAttributes, DieRange, DieRef,
    DieVariant, Entry, FunctionDie, LexicalBlockDie, LineRow, ParameterDie, PointerTypeDie,
    StructTypeDie, TypeDefDie, TypeMemberDie, UnionTypeDie, Unit, UnitProperties, VariableDie,
    VolatileTypeDie, END_SEQUENCE, EPILOG_BEGIN, IS_STMT, PROLOG_END,
};
use crate::debugger::debugee::dwarf::EndianArcSlice;
use crate::debugger::error::Error;
use fallible_iterator::FallibleIterator;
use gimli::{
    AttributeValue, DebuggingInformationEntry, DwAt, Range, Reader, Unit as DwarfUnit, DW_AT_byte_size,
    DW_AT_count, DW_AT_data_member_location, DW_AT_decl_file, DW_AT_decl_line, DW_AT_encoding,
    DW_AT_frame_base, DW_AT_location, DW_AT_lower_bound, DW_AT_name, DW_AT_type, DW_AT_upper_bound,
};
use std::collections::HashMap;
use std::num::NonZeroU64;
use std::path::PathBuf;

pub struct DwarfUnitParser<'a> {
    dwarf: &'a gimli::Dwarf<EndianArcSlice>,
}

impl<'a> DwarfUnitParser<'a> {
    pub fn new(dwarf: &'a gimli::Dwarf<EndianArcSlice>) -> Self {
        Self { dwarf }
    }

    fn attr_to_string(
        &self,
        unit: &DwarfUnit<EndianArcSlice>,
        die: &DebuggingInformationEntry<EndianArcSlice>,
        attr: DwAt,
    ) -> gimli::Result<Option<String>> {
        die.attr(attr)?
            .and_then(|attr| self.dwarf.attr_string(unit, attr.value()).ok())
            .map(|l| l.to_string_lossy().map(|s| s.to_string()))
            .transpose()
    }

    pub fn parse(&self, unit: DwarfUnit<EndianArcSlice>, idx: usize) -> Result<Unit, Error> {
        let name = unit
            .name
            .as_ref()
            .and_then(|n| n.to_string_lossy().ok().map(|s| s.to_string()));
        let comp_dir = unit
            .comp_dir
            .as_ref()
            .and_then(|d| d.to_string_lossy().ok().map(|s| PathBuf::from(s.as_ref())));

        let mut parsed_unit = Unit {
            idx,
            name,
            properties: UnitProperties {
                encoding: unit.encoding(),
                offset: unit.header.offset().as_debug_info_offset(),
                low_pc: unit.low_pc,
            },
            comp_dir,
            files: vec![],
            lines: vec![],
            ranges: vec![],
            entries: vec![],
            die_ranges: vec![],
            variable_index: HashMap::new(),
            die_offsets_index: HashMap::new(),
        };

        let unit = &unit;

        if let Some(ref lp) = unit.line_program {
            let mut rows = lp.clone().rows();
            parsed_unit.lines = parse_lines(&mut rows)?;
            parsed_unit.files = parse_files(self.dwarf, unit, &rows)?;
        }
        parsed_unit.lines.sort_unstable_by_key(|x| x.address);

        parsed_unit.ranges = self.dwarf.unit_ranges(unit)?.collect::<Vec<_>>()?;
        parsed_unit.ranges.sort_unstable_by_key(|r| r.begin);

        let mut cursor = unit.entries();
        while let Some((delta_depth, die)) = cursor.next_dfs()? {
            let current_idx = parsed_unit.entries.len();
            let prev_index = if parsed_unit.entries.is_empty() {
                None
            } else {
                Some(parsed_unit.entries.len() - 1)
            };

            let parent_idx = match delta_depth {
                // if 1 then the previous die is a parent
                1 => prev_index,
                // if 0 then the previous die is a sibling
                0 => parsed_unit.entries.last().and_then(|e| e.node.parent),
                // if < 0 then the parent of the previous die is a sibling
                mut x if x < 0 => {
                    let mut parent = parsed_unit.entries.last().expect("entry must exist");
                    while x != 0 {
                        parent = &parsed_unit.entries[parent.node.parent.expect("parent must exist")];
                        x += 1;
                    }
                    parent.node.parent
                }
                _ => unreachable!(),
            };

            if let Some(parent_idx) = parent_idx {
                parsed_unit.entries[parent_idx]
                    .node
                    .children
                    .push(current_idx)
            }

            let name = self.attr_to_string(unit, die, DW_AT_name)?;
            let ranges: Box<[Range]> = self
                .dwarf
                .die_ranges(unit, die)?
                .collect::<Vec<Range>>()?
                .into();

            ranges.iter().for_each(|r| {
                parsed_unit.die_ranges.push(DieRange {
                    range: *r,
                    die_idx: current_idx,
                })
            });

            let decl_file_line = {
                let mb_file = die.attr(DW_AT_decl_file)?.and_then(|attr| attr.udata_value());
                let mb_line = die.attr(DW_AT_decl_line)?.and_then(|attr| attr.udata_value());
                mb_file.and_then(|file_idx| Some((file_idx, mb_line?)))
            };

            let base_attrs = DieAttributes { name, ranges };

            let parsed_die = match die.tag() {
                gimli::DW_TAG_subprogram => DieVariant::Function(FunctionDie {
                    base_attributes: base_attrs,
                    decl_file_line,
                    fb_addr: die.attr(DW_AT_frame_base)?,
                }),
                gimli::DW_TAG_formal_parameter => DieVariant::Parameter(ParameterDie {
                    base_attributes: base_attrs,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                    location: die.attr(DW_AT_location)?,
                    decl_file_line,
                }),
                gimli::DW_TAG_variable => {
                    let mut lexical_block_idx = None;
                    let mut mb_parent_idx = parent_idx;
                    while let Some(parent_idx) = mb_parent_idx {
                        match parsed_unit.entries[parent_idx].die {
                            DieVariant::LexicalBlock(_) => {
                                lexical_block_idx = Some(parent_idx);
                                break;
                            }
                            DieVariant::Function(_) => break,
                            _ => {}
                        }
                        mb_parent_idx = parsed_unit.entries[parent_idx].node.parent;
                    }

                    let die = VariableDie {
                        base_attributes: base_attrs,
                        type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                        location: die.attr(DW_AT_location)?,
                        decl_file_line,
                        lexical_block_idx,
                    };

                    if let Some(ref name) = die.base_attributes.name {
                        parsed_unit
                            .variable_index
                            .entry(name.to_string())
                            .or_default()
                            .push(current_idx);
                    }

                    DieVariant::Variable(die)
                }
                gimli::DW_TAG_base_type => {
                    let encoding = die.attr(DW_AT_encoding)?.and_then(|attr| {
                        if let AttributeValue::Encoding(enc) = attr.value() {
                            Some(enc)
                        } else {
                            None
                        }
                    });

                    DieVariant::BaseType(BaseTypeDie {
                        base_attributes: base_attrs,
                        encoding,
                        byte_size: die.attr(DW_AT_byte_size)?.and_then(|val| val.udata_value()),
                    })
                }
                gimli::DW_TAG_structure_type => DieVariant::StructType(StructTypeDie {
                    base_attributes: base_attrs,
                    byte_size: die.attr(DW_AT_byte_size)?.and_then(|val| val.udata_value()),
                }),
                gimli::DW_TAG_union_type => DieVariant::UnionType(UnionTypeDie {
                    base_attributes: base_attrs,
                    byte_size: die.attr(DW_AT_byte_size)?.and_then(|val| val.udata_value()),
                }),
                gimli::DW_TAG_member => DieVariant::TypeMember(TypeMemberDie {
                    base_attributes: base_attrs,
                    location: die.attr(DW_AT_data_member_location)?,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                }),
                gimli::DW_TAG_lexical_block => DieVariant::LexicalBlock(LexicalBlockDie {
                    base_attributes: base_attrs,
                }),
                gimli::DW_TAG_array_type => DieVariant::ArrayType(ArrayDie {
                    base_attributes: base_attrs,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                    byte_size: die.attr(DW_AT_byte_size)?.and_then(|val| val.udata_value()),
                }),
                gimli::DW_TAG_subrange_type => DieVariant::ArraySubrange(ArraySubrangeDie {
                    base_attributes: base_attrs,
                    lower_bound: die.attr(DW_AT_lower_bound)?,
                    upper_bound: die.attr(DW_AT_upper_bound)?,
                    count: die.attr(DW_AT_count)?,
                }),
                gimli::DW_TAG_pointer_type => DieVariant::PointerType(PointerTypeDie {
                    base_attributes: base_attrs,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                }),
                gimli::DW_TAG_typedef => DieVariant::TypeDef(TypeDefDie {
                    base_attributes: base_attrs,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                }),
                gimli::DW_TAG_const_type => DieVariant::ConstType(ConstTypeDie {
                    base_attributes: base_attrs,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                }),
                gimli::DW_TAG_volatile_type => DieVariant::VolatileType(VolatileTypeDie {
                    base_attributes: base_attrs,
                    type_ref: die.attr(DW_AT_type)?.and_then(DieRef::from_attr),
                }),
                _ => DieVariant::Default(base_attrs),
            };

            parsed_unit.entries.push(Entry::new(parsed_die, parent_idx));

            parsed_unit
                .die_offsets_index
                .insert(die.offset(), current_idx);
        }
        parsed_unit
            .die_ranges
            .sort_unstable_by_key(|dr| dr.range.begin);

        Ok(parsed_unit)
    }
}

fn parse_lines<R, Offset>(
    rows: &mut gimli::LineRows<R, gimli::IncompleteLineProgram<R, Offset>, Offset>,
) -> gimli::Result<Vec<LineRow>>
where
    R: Reader<Offset = Offset>,
    Offset: gimli::ReaderOffset,
{
    let mut lines = vec![];
    while let Some((_, line_row)) = rows.next_row()? {
        let column = match line_row.column() {
            gimli::ColumnType::LeftEdge => 0,
            gimli::ColumnType::Column(x) => x.get(),
        };

        let mut flags = 0_u8;
        if line_row.is_stmt() {
            flags |= IS_STMT;
        }
        if line_row.prologue_end() {
            flags |= PROLOG_END;
        }
        if line_row.epilogue_begin() {
            flags |= EPILOG_BEGIN;
        }
        if line_row.end_sequence() {
            flags |= END_SEQUENCE;
        }

        lines.push(LineRow {
            address: line_row.address(),
            file_index: line_row.file_index(),
            line: line_row.line().map(NonZeroU64::get).unwrap_or(0),
            column,
            flags,
        })
    }
    Ok(lines)
}

fn parse_files<R, Offset>(
    dwarf: &gimli::Dwarf<R>,
    unit: &gimli::Unit<R>,
    rows: &gimli::LineRows<R, gimli::IncompleteLineProgram<R, Offset>, Offset>,
) -> gimli::Result<Vec<PathBuf>>
where
    R: Reader<Offset = Offset>,
    Offset: gimli::ReaderOffset,
{
    let mut files = vec![];
    let header = rows.header();
    match header.file(0) {
        Some(file) => files.push(render_file_path(unit, file, header, dwarf)?),
        None => files.push(PathBuf::from("")),
    }
    let mut index = 1;
    while let Some(file) = header.file(index) {
        files.push(render_file_path(unit, file, header, dwarf)?);
        index += 1;
    }

    Ok(files)
}

fn render_file_path<R: Reader>(
    dw_unit: &gimli::Unit<R>,
    file: &gimli::FileEntry<R, R::Offset>,
    header: &gimli::LineProgramHeader<R, R::Offset>,
    sections: &gimli::Dwarf<R>,
) -> Result<PathBuf, gimli::Error> {
    let mut path = if let Some(ref comp_dir) = dw_unit.comp_dir {
        PathBuf::from(comp_dir.to_string_lossy()?.as_ref())
    } else {
        PathBuf::new()
    };

    if file.directory_index() != 0 {
        if let Some(directory) = file.directory(header) {
            path.push(
                sections
                    .attr_string(dw_unit, directory)?
                    .to_string_lossy()?
                    .as_ref(),
            );
        }
    }

    path.push(
        sections
            .attr_string(dw_unit, file.path_name())?
            .to_string_lossy()?
            .as_ref(),
    );

    Ok(path)
}
