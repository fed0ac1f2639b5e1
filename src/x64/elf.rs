// ElfWriter packs compiled multi-entry bodies into one relocatable x86-64 ELF object through
// the object crate's write API. Every body is appended to .text at the configured alignment;
// each entry gets a global function symbol at its stub, sized to cover the stub itself, and,
// when enabled, a local symbol names the whole body so disassemblers and debuggers can
// attribute the shared blocks. Entry names are unique per module, so the global symbols of
// one module never collide.

//! ELF object emission for compiled bodies.

use log::debug;
use object::write::{Object, StandardSection, Symbol, SymbolSection};
use object::{Architecture, BinaryFormat, Endianness, SymbolFlags, SymbolKind, SymbolScope};
use thiserror::Error;

use super::backend::{CompiledBody, X64Options};

#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("failed to write object file: {0}")]
    Write(#[from] object::write::Error),
}

/// Collects compiled bodies into one ELF relocatable object.
pub struct ElfWriter {
    object: Object<'static>,
    options: X64Options,
    symbols: usize,
}

impl ElfWriter {
    pub fn new(options: X64Options) -> Self {
        Self {
            object: Object::new(BinaryFormat::Elf, Architecture::X86_64, Endianness::Little),
            options,
            symbols: 0,
        }
    }

    /// Append `body` to `.text` and define its symbols.
    pub fn add_body(&mut self, body: &CompiledBody) {
        let text = self.object.section_id(StandardSection::Text);
        let base = self
            .object
            .append_section_data(text, &body.code, self.options.function_alignment.max(1));

        if self.options.emit_body_symbols {
            self.object.add_symbol(Symbol {
                name: body.name.as_bytes().to_vec(),
                value: base,
                size: body.code.len() as u64,
                kind: SymbolKind::Text,
                scope: SymbolScope::Compilation,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
            self.symbols += 1;
        }

        for entry in &body.entries {
            self.object.add_symbol(Symbol {
                name: entry.name.as_bytes().to_vec(),
                value: base + entry.offset,
                size: entry.stub_size,
                kind: SymbolKind::Text,
                scope: SymbolScope::Dynamic,
                weak: false,
                section: SymbolSection::Section(text),
                flags: SymbolFlags::None,
            });
            self.symbols += 1;
        }
        debug!(
            "added body {} at .text+{:#x} with {} entry symbols",
            body.name,
            base,
            body.entries.len()
        );
    }

    pub fn symbol_count(&self) -> usize {
        self.symbols
    }

    pub fn finish(self) -> Result<Vec<u8>, ObjectError> {
        Ok(self.object.write()?)
    }
}
