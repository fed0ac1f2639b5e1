// This module derives the control-flow facts every later phase relies on from a single
// MultiEntryBody: successor lists read off block terminators, deduplicated predecessor lists,
// the set of registered entries that can reach each block, and a per-block Region tag that
// says whether the block is private to one entry (its exclusive prologue), common to every
// entry (the shared part of the graph), reached by some but not all entries, or not reached
// at all. It also computes one reverse post-order over all entry blocks, walking the entries
// in registration order with the same iterative (block, processed) depth-first stack the
// single-entry analyzer uses, so block layout is deterministic for the backends. Nothing here
// is cached in the blocks themselves; the analysis is recomputed whenever it is needed.

//! Control-flow analysis over a multi-entry body.

use super::body::{Block, BodyId};
use super::entry::EntryId;
use super::module::Module;

/// Which entries reach a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    /// Reached by no registered entry.
    Unreachable,
    /// Reached by exactly one entry.
    Exclusive(EntryId),
    /// Reached by every entry of a body with two or more entries.
    Shared,
    /// Reached by more than one but not all entries.
    Partial,
}

impl Region {
    pub fn is_reachable(self) -> bool {
        !matches!(self, Region::Unreachable)
    }
}

/// Edges, reachability and layout order of one body.
#[derive(Debug, Clone)]
pub struct ControlFlow {
    body: BodyId,
    entries: Vec<(EntryId, Block)>,
    succs: Vec<Vec<Block>>,
    preds: Vec<Vec<Block>>,
    reaching: Vec<Vec<EntryId>>,
    regions: Vec<Region>,
    rpo: Vec<Block>,
}

impl ControlFlow {
    /// Analyze `body`. An unknown body yields an empty analysis.
    pub fn compute(module: &Module, body: BodyId) -> Self {
        let Some(owner) = module.body(body) else {
            return Self {
                body,
                entries: Vec::new(),
                succs: Vec::new(),
                preds: Vec::new(),
                reaching: Vec::new(),
                regions: Vec::new(),
                rpo: Vec::new(),
            };
        };
        let count = owner.block_count();

        // entries bound outside this body are reported by the verifier, not followed
        let entries: Vec<(EntryId, Block)> = owner
            .entries()
            .iter()
            .filter_map(|&id| {
                let block = module.entry(id)?.binding()?;
                (block.body == body && block.index() < count).then_some((id, block))
            })
            .collect();

        let succs: Vec<Vec<Block>> = owner
            .blocks()
            .iter()
            .map(|block| {
                block
                    .successors()
                    .into_iter()
                    .filter(|succ| succ.body == body && succ.index() < count)
                    .collect()
            })
            .collect();

        let mut preds: Vec<Vec<Block>> = vec![Vec::new(); count];
        for (index, targets) in succs.iter().enumerate() {
            let pred = Block {
                body,
                index: index as u32,
            };
            for succ in targets {
                let list = &mut preds[succ.index()];
                if !list.contains(&pred) {
                    list.push(pred);
                }
            }
        }

        let mut reaching: Vec<Vec<EntryId>> = vec![Vec::new(); count];
        for &(entry, start) in &entries {
            let mut seen = vec![false; count];
            let mut work = vec![start];
            seen[start.index()] = true;
            while let Some(block) = work.pop() {
                reaching[block.index()].push(entry);
                for &succ in &succs[block.index()] {
                    if !seen[succ.index()] {
                        seen[succ.index()] = true;
                        work.push(succ);
                    }
                }
            }
        }

        let regions = reaching
            .iter()
            .map(|reached| match reached.as_slice() {
                [] => Region::Unreachable,
                [only] => Region::Exclusive(*only),
                _ if reached.len() == entries.len() => Region::Shared,
                _ => Region::Partial,
            })
            .collect();

        // -------- build RPO order ---------
        // entries are pushed last-first so the first registered entry is walked first
        let mut post = Vec::with_capacity(count);
        let mut visited = vec![false; count];
        let mut stack: Vec<(Block, bool)> =
            entries.iter().rev().map(|&(_, block)| (block, false)).collect();
        while let Some((block, processed)) = stack.pop() {
            if processed {
                post.push(block);
                continue;
            }
            if visited[block.index()] {
                continue;
            }
            visited[block.index()] = true;
            stack.push((block, true));
            for &succ in succs[block.index()].iter().rev() {
                if !visited[succ.index()] {
                    stack.push((succ, false));
                }
            }
        }
        post.reverse();

        Self {
            body,
            entries,
            succs,
            preds,
            reaching,
            regions,
            rpo: post,
        }
    }

    pub fn body(&self) -> BodyId {
        self.body
    }

    pub fn block_count(&self) -> usize {
        self.succs.len()
    }

    /// Entries bound inside this body with their entry blocks, in registration order.
    pub fn entries(&self) -> &[(EntryId, Block)] {
        &self.entries
    }

    pub fn succs(&self, block: Block) -> &[Block] {
        self.succs.get(block.index()).map(Vec::as_slice).unwrap_or_default()
    }

    /// Distinct predecessors, ordered by block index.
    pub fn preds(&self, block: Block) -> &[Block] {
        self.preds.get(block.index()).map(Vec::as_slice).unwrap_or_default()
    }

    /// Entries reaching `block`, in registration order.
    pub fn reaching(&self, block: Block) -> &[EntryId] {
        self.reaching.get(block.index()).map(Vec::as_slice).unwrap_or_default()
    }

    pub fn region(&self, block: Block) -> Region {
        self.regions
            .get(block.index())
            .copied()
            .unwrap_or(Region::Unreachable)
    }

    /// Reachable blocks in reverse post-order across all entries.
    pub fn rpo(&self) -> &[Block] {
        &self.rpo
    }

    /// Whether entry `entry` is the one entry that owns `block`.
    pub fn is_exclusive_to(&self, block: Block, entry: EntryId) -> bool {
        self.region(block) == Region::Exclusive(entry)
    }

    /// Whether all entries reach at least one common block.
    pub fn converges(&self) -> bool {
        self.entries.len() < 2 || self.regions.contains(&Region::Shared)
    }

    /// Iterate over every block of the body with its region.
    pub fn blocks(&self) -> impl Iterator<Item = (Block, Region)> + '_ {
        self.regions.iter().enumerate().map(move |(index, &region)| {
            (
                Block {
                    body: self.body,
                    index: index as u32,
                },
                region,
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::builder::Cursor;

    /// Two entries with a diamond under the first, converging on `tail`.
    fn two_entry_graph() -> (Module, BodyId, [Block; 4], [EntryId; 2]) {
        let mut module = Module::new("m");
        let body = module.create_body("add");
        let entry1 = module.add_block(body, "entry1").unwrap();
        let side = module.add_block(body, "side").unwrap();
        let entry2 = module.add_block(body, "entry2").unwrap();
        let tail = module.add_block(body, "tail").unwrap();
        let i32_ty = module.i32();
        let i1_ty = module.i1();
        let e1 = module.create_entry("add1", &[i32_ty, i32_ty], i32_ty);
        let e2 = module.create_entry("add2", &[i32_ty], i32_ty);
        module.register_entry(body, e1, entry1).unwrap();
        module.register_entry(body, e2, entry2).unwrap();

        let cond = module.const_int(i1_ty, 1);
        let zero = module.const_int(i32_ty, 0);
        Cursor::at(entry1).cond_br(&mut module, cond, side, tail).unwrap();
        Cursor::at(side).br(&mut module, tail).unwrap();
        Cursor::at(entry2).br(&mut module, tail).unwrap();
        Cursor::at(tail).ret(&mut module, Some(zero)).unwrap();
        (module, body, [entry1, side, entry2, tail], [e1, e2])
    }

    #[test]
    fn test_edges_and_regions() {
        let (module, body, [entry1, side, entry2, tail], [e1, e2]) = two_entry_graph();
        let cfg = ControlFlow::compute(&module, body);

        assert_eq!(cfg.succs(entry1), &[side, tail]);
        assert_eq!(cfg.preds(tail), &[entry1, side, entry2]);
        assert!(cfg.preds(entry1).is_empty());

        assert_eq!(cfg.region(entry1), Region::Exclusive(e1));
        assert_eq!(cfg.region(side), Region::Exclusive(e1));
        assert_eq!(cfg.region(entry2), Region::Exclusive(e2));
        assert_eq!(cfg.region(tail), Region::Shared);
        assert_eq!(cfg.reaching(tail), &[e1, e2]);
        assert!(cfg.converges());
    }

    #[test]
    fn test_rpo_places_blocks_before_successors() {
        let (module, body, [entry1, side, entry2, tail], _) = two_entry_graph();
        let cfg = ControlFlow::compute(&module, body);
        let rpo = cfg.rpo();

        assert_eq!(rpo.len(), 4);
        let pos = |block: Block| rpo.iter().position(|&b| b == block).unwrap();
        assert!(pos(entry1) < pos(side));
        assert!(pos(side) < pos(tail));
        assert!(pos(entry2) < pos(tail));
    }

    #[test]
    fn test_unregistered_blocks_are_unreachable() {
        let mut module = Module::new("m");
        let body = module.create_body("f");
        let start = module.add_block(body, "start").unwrap();
        let dead = module.add_block(body, "dead").unwrap();
        let void = module.void_type();
        let entry = module.create_entry("f", &[], void);
        module.register_entry(body, entry, start).unwrap();
        Cursor::at(start).ret(&mut module, None).unwrap();
        Cursor::at(dead).br(&mut module, start).unwrap();

        let cfg = ControlFlow::compute(&module, body);
        assert_eq!(cfg.region(dead), Region::Unreachable);
        assert_eq!(cfg.region(start), Region::Exclusive(entry));
        // an edge from a dead block still counts as a predecessor
        assert_eq!(cfg.preds(start), &[dead]);
        assert_eq!(cfg.rpo(), &[start]);
    }

    #[test]
    fn test_duplicate_edges_give_one_predecessor() {
        let mut module = Module::new("m");
        let body = module.create_body("f");
        let start = module.add_block(body, "start").unwrap();
        let next = module.add_block(body, "next").unwrap();
        let i1_ty = module.i1();
        let cond = module.const_int(i1_ty, 0);
        Cursor::at(start).cond_br(&mut module, cond, next, next).unwrap();

        let cfg = ControlFlow::compute(&module, body);
        assert_eq!(cfg.succs(start), &[next, next]);
        assert_eq!(cfg.preds(next), &[start]);
    }

    #[test]
    fn test_partial_and_non_converging_regions() {
        let mut module = Module::new("m");
        let body = module.create_body("f");
        let a = module.add_block(body, "a").unwrap();
        let b = module.add_block(body, "b").unwrap();
        let c = module.add_block(body, "c").unwrap();
        let ab = module.add_block(body, "ab").unwrap();
        let void = module.void_type();
        let ea = module.create_entry("ea", &[], void);
        let eb = module.create_entry("eb", &[], void);
        let ec = module.create_entry("ec", &[], void);
        module.register_entry(body, ea, a).unwrap();
        module.register_entry(body, eb, b).unwrap();
        module.register_entry(body, ec, c).unwrap();
        Cursor::at(a).br(&mut module, ab).unwrap();
        Cursor::at(b).br(&mut module, ab).unwrap();
        Cursor::at(c).ret(&mut module, None).unwrap();
        Cursor::at(ab).ret(&mut module, None).unwrap();

        let cfg = ControlFlow::compute(&module, body);
        assert_eq!(cfg.region(ab), Region::Partial);
        assert!(!cfg.converges());
    }
}
