use crate::debugger::debugee::dwarf::EndianArcSlice;
use crate::debugger::error::Error;
use gimli::{Dwarf, RunTimeEndian, SectionId};
use object::{File, Object, ObjectSection};
use std::borrow::Cow;
use std::sync::Arc;

/// Load the DWARF sections of an object file into reference counted slices.
/// Sections missing from the file read as empty.
pub fn load(file: &File, endian: RunTimeEndian) -> Result<Dwarf<EndianArcSlice>, Error> {
    Dwarf::load(|id: SectionId| -> Result<EndianArcSlice, Error> {
        let data = file
            .section_by_name(id.name())
            .and_then(|section| section.uncompressed_data().ok())
            .unwrap_or(Cow::Borrowed(&[]));
        Ok(gimli::EndianArcSlice::new(Arc::from(&*data), endian))
    })
}
