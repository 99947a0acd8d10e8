use crate::debugger::address::GlobalAddress;
use object::{Object, ObjectSymbol, SymbolKind};

/// Single ELF symbol.
#[derive(Debug, Clone)]
pub struct Symbol {
    pub name: String,
    pub addr: u64,
    pub size: u64,
}

/// ELF symbol table, used as a symbolization fallback for program counters
/// without DWARF coverage (`_start` and other assembly entry paths).
#[derive(Debug, Clone, Default)]
pub struct SymbolTab {
    /// Text symbols ordered by address.
    text: Vec<Symbol>,
}

impl SymbolTab {
    pub fn new(object_file: &object::File) -> Option<Self> {
        let mut text: Vec<Symbol> = object_file
            .symbols()
            .filter(|symbol| symbol.kind() == SymbolKind::Text)
            .filter_map(|symbol| {
                Some(Symbol {
                    name: symbol.name().ok()?.to_string(),
                    addr: symbol.address(),
                    size: symbol.size(),
                })
            })
            .filter(|symbol| !symbol.name.is_empty())
            .collect();

        if text.is_empty() {
            return None;
        }
        text.sort_unstable_by_key(|symbol| symbol.addr);
        Some(SymbolTab { text })
    }

    /// Find the text symbol covering an address.
    pub fn find_by_addr(&self, addr: GlobalAddress) -> Option<&Symbol> {
        let addr = u64::from(addr);
        let pos = match self.text.binary_search_by_key(&addr, |symbol| symbol.addr) {
            Ok(pos) => pos,
            Err(0) => return None,
            Err(pos) => pos - 1,
        };

        let symbol = &self.text[pos];
        // a zero sized symbol covers everything up to the next one
        if symbol.size != 0 && addr >= symbol.addr + symbol.size {
            return None;
        }
        Some(symbol)
    }
}
