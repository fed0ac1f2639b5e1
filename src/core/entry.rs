//! Entry points: named external signatures bound to one block of a body.
//!
//! An entry is created unregistered with its own parameter list. Its
//! argument values exist from creation on, but they are only meaningful in
//! the part of the graph that is reached from the entry's block and from no
//! other entry; the verifier enforces that.

use log::debug;

use super::body::{Block, BodyId};
use super::error::{ConstructionError, ConstructionResult};
use super::module::Module;
use super::types::Type;
use super::value::{Value, ValueKind};

/// Handle to an entry point of a module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId(pub(crate) u32);

impl EntryId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Named, independently typed way into a shared body.
#[derive(Debug, Clone)]
pub struct EntryPoint {
    pub(crate) name: String,
    pub(crate) params: Vec<Type>,
    pub(crate) ret: Type,
    pub(crate) signature: Type,
    pub(crate) args: Vec<Value>,
    pub(crate) binding: Option<Block>,
}

impl EntryPoint {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Type] {
        &self.params
    }

    pub fn ret(&self) -> Type {
        self.ret
    }

    /// Interned function type of this entry.
    pub fn signature(&self) -> Type {
        self.signature
    }

    /// Argument values, one per parameter.
    pub fn args(&self) -> &[Value] {
        &self.args
    }

    /// The block execution starts at, once registered.
    pub fn binding(&self) -> Option<Block> {
        self.binding
    }

    pub fn is_registered(&self) -> bool {
        self.binding.is_some()
    }
}

impl Module {
    /// Declare a new, unregistered entry.
    pub fn create_entry(&mut self, name: &str, params: &[Type], ret: Type) -> EntryId {
        let id = EntryId(self.entries.len() as u32);
        let signature = self.func_type(params, ret);
        let args = params
            .iter()
            .enumerate()
            .map(|(index, &ty)| {
                self.push_value(
                    ty,
                    ValueKind::Arg {
                        entry: id,
                        index: index as u32,
                    },
                )
            })
            .collect();
        self.entries.push(EntryPoint {
            name: name.to_string(),
            params: params.to_vec(),
            ret,
            signature,
            args,
            binding: None,
        });
        id
    }

    pub fn entry(&self, id: EntryId) -> Option<&EntryPoint> {
        self.entries.get(id.index())
    }

    pub fn entry_name(&self, id: EntryId) -> &str {
        self.entries
            .get(id.index())
            .map_or("<invalid entry>", |entry| entry.name.as_str())
    }

    /// Look up a registered entry by its external name.
    pub fn find_entry(&self, name: &str) -> Option<EntryId> {
        self.registered.get(name).copied()
    }

    /// Bind `entry` to `block` inside `body`.
    ///
    /// `body` is the body the caller expects the entry to join; a block of
    /// any other body is rejected with [`ConstructionError::ForeignBlock`].
    pub fn register_entry(
        &mut self,
        body: BodyId,
        entry: EntryId,
        block: Block,
    ) -> ConstructionResult<()> {
        let Some(point) = self.entries.get(entry.index()) else {
            return Err(ConstructionError::UnknownEntry(entry.0));
        };
        if point.binding.is_some() {
            return Err(ConstructionError::AlreadyRegistered {
                entry: point.name.clone(),
            });
        }
        let name = point.name.clone();

        self.open_body_mut(body)?;
        if block.body != body {
            return Err(ConstructionError::ForeignBlock {
                block: self.block_name(block).to_string(),
                owner: self.body_name(block.body).to_string(),
                expected: self.body_name(body).to_string(),
            });
        }
        if self.block(block).is_none() {
            return Err(ConstructionError::UnknownBlock {
                body: self.body_name(body).to_string(),
                index: block.index,
            });
        }
        if self.registered.contains_key(&name) {
            return Err(ConstructionError::DuplicateName {
                name,
                module: self.name().to_string(),
            });
        }

        self.entries[entry.index()].binding = Some(block);
        self.bodies[body.index()].entries.push(entry);
        debug!(
            "registered entry {} at {}:{}",
            name,
            self.body_name(body),
            self.block_name(block)
        );
        self.registered.insert(name, entry);
        Ok(())
    }

    /// The value of the `index`-th declared parameter of `entry`.
    pub fn argument(&self, entry: EntryId, index: usize) -> ConstructionResult<Value> {
        let point = self
            .entries
            .get(entry.index())
            .ok_or(ConstructionError::UnknownEntry(entry.0))?;
        point
            .args
            .get(index)
            .copied()
            .ok_or_else(|| ConstructionError::ArityError {
                entry: point.name.clone(),
                index,
                arity: point.args.len(),
            })
    }
}
