// This module provides arena-based session management for lowering, using the bumpalo
// crate. A CompilationSession borrows a Bump arena for the duration of one lowering run and
// hands out arena-backed copies of per-run data (interned symbol names, block layouts,
// frame offsets) so backends can keep plain references instead of threading owned buffers
// through every helper. It also accumulates SessionStats: how many bodies and entry symbols
// were emitted, how large the shared code and the per-entry stubs were, how many
// instructions of each kind were lowered, and how many merge copies and edge blocks were
// needed to resolve merge nodes. Interior mutability through RefCell keeps the session
// usable behind a shared reference while a backend walks the body.

//! Arena-based lowering session.

use bumpalo::Bump;
use hashbrown::HashMap;
use std::cell::RefCell;
use std::fmt;

/// Arena and statistics shared by one lowering run.
pub struct CompilationSession<'arena> {
    arena: &'arena Bump,
    stats: RefCell<SessionStats>,
    interned_strings: RefCell<HashMap<&'arena str, &'arena str>>,
}

impl<'arena> CompilationSession<'arena> {
    pub fn new(arena: &'arena Bump) -> Self {
        Self {
            arena,
            stats: RefCell::new(SessionStats::default()),
            interned_strings: RefCell::new(HashMap::new()),
        }
    }

    pub fn arena(&self) -> &'arena Bump {
        self.arena
    }

    /// Intern a string in the arena; equal strings share one allocation.
    pub fn intern_str(&self, s: &str) -> &'arena str {
        let mut strings = self.interned_strings.borrow_mut();
        if let Some(&interned) = strings.get(s) {
            return interned;
        }
        let interned: &'arena str = self.arena.alloc_str(s);
        strings.insert(interned, interned);
        interned
    }

    /// Record a lowered body and the size of its shared code.
    pub fn record_body_lowered(&self, name: &str, code_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.bodies_lowered += 1;
        stats.total_code_size += code_size;
        if stats.largest_body_size < code_size {
            stats.largest_body_size = code_size;
            stats.largest_body_name = name.to_string();
        }
    }

    /// Record one entry symbol and the size of its private stub.
    pub fn record_entry_emitted(&self, stub_size: usize) {
        let mut stats = self.stats.borrow_mut();
        stats.entries_emitted += 1;
        stats.stub_bytes += stub_size;
    }

    pub fn record_instruction_lowered(&self, opcode: &str) {
        let mut stats = self.stats.borrow_mut();
        stats.instructions_lowered += 1;
        *stats
            .instruction_counts
            .entry(opcode.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_merge_copy(&self) {
        self.stats.borrow_mut().merge_copies += 1;
    }

    pub fn record_edge_block(&self) {
        self.stats.borrow_mut().edge_blocks += 1;
    }

    pub fn stats(&self) -> SessionStats {
        self.stats.borrow().clone()
    }
}

/// Lowering statistics.
#[derive(Debug, Default, Clone)]
pub struct SessionStats {
    pub bodies_lowered: usize,
    pub entries_emitted: usize,
    /// Bytes of shared code, stubs included.
    pub total_code_size: usize,
    pub stub_bytes: usize,
    pub instructions_lowered: usize,
    pub instruction_counts: HashMap<String, usize>,
    pub largest_body_size: usize,
    pub largest_body_name: String,
    /// Copies into merge homes on predecessor edges.
    pub merge_copies: usize,
    /// Critical edges that needed their own copy block.
    pub edge_blocks: usize,
}

impl fmt::Display for SessionStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Lowering Session Statistics:")?;
        writeln!(f, "  Bodies lowered: {}", self.bodies_lowered)?;
        writeln!(f, "  Entry symbols: {}", self.entries_emitted)?;
        writeln!(f, "  Instructions lowered: {}", self.instructions_lowered)?;
        writeln!(f, "  Total code size: {} bytes", self.total_code_size)?;
        writeln!(f, "  Entry stub bytes: {}", self.stub_bytes)?;
        writeln!(f, "  Merge copies: {}", self.merge_copies)?;
        writeln!(f, "  Edge blocks: {}", self.edge_blocks)?;

        if !self.largest_body_name.is_empty() {
            writeln!(
                f,
                "  Largest body: {} ({} bytes)",
                self.largest_body_name, self.largest_body_size
            )?;
        }

        if !self.instruction_counts.is_empty() {
            writeln!(f, "  Instruction breakdown:")?;
            let mut sorted: Vec<_> = self.instruction_counts.iter().collect();
            sorted.sort_by(|a, b| b.1.cmp(a.1).then_with(|| a.0.cmp(b.0)));
            for (opcode, count) in sorted.into_iter().take(10) {
                writeln!(f, "    {}: {}", opcode, count)?;
            }
        }
        Ok(())
    }
}
