//! Interned scalar and signature types.
//!
//! Types are owned by the [`TypeInterner`] of a module and handed out as
//! small `Copy` handles. Two structurally equal types always intern to the
//! same handle, so type equality is handle equality.

use hashbrown::HashMap;
use std::fmt;

/// Interned type handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Type(u32);

impl Type {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Structure of an interned type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum TypeKind {
    /// Fixed-width integer, 1 to 64 bits.
    Int(u32),
    /// Address of a body slot.
    Ptr,
    Void,
    /// Entry signature.
    Func { params: Vec<Type>, ret: Type },
}

/// Owner of all types of a module.
#[derive(Debug, Default)]
pub struct TypeInterner {
    kinds: Vec<TypeKind>,
    map: HashMap<TypeKind, Type>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the existing handle for equal kinds.
    pub fn intern(&mut self, kind: TypeKind) -> Type {
        if let Some(&ty) = self.map.get(&kind) {
            return ty;
        }
        let ty = Type(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.map.insert(kind, ty);
        ty
    }

    pub fn kind(&self, ty: Type) -> &TypeKind {
        &self.kinds[ty.index()]
    }

    /// Integer width, `None` for non-integer types.
    pub fn int_bits(&self, ty: Type) -> Option<u32> {
        match self.kind(ty) {
            TypeKind::Int(bits) => Some(*bits),
            _ => None,
        }
    }

    pub fn is_int(&self, ty: Type) -> bool {
        self.int_bits(ty).is_some()
    }

    pub fn is_ptr(&self, ty: Type) -> bool {
        matches!(self.kind(ty), TypeKind::Ptr)
    }

    pub fn is_void(&self, ty: Type) -> bool {
        matches!(self.kind(ty), TypeKind::Void)
    }

    /// Printable form of a type.
    pub fn display(&self, ty: Type) -> TypeDisplay<'_> {
        TypeDisplay { types: self, ty }
    }

    pub fn len(&self) -> usize {
        self.kinds.len()
    }

    pub fn is_empty(&self) -> bool {
        self.kinds.is_empty()
    }
}

pub struct TypeDisplay<'a> {
    types: &'a TypeInterner,
    ty: Type,
}

impl fmt::Display for TypeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.types.kind(self.ty) {
            TypeKind::Int(bits) => write!(f, "i{bits}"),
            TypeKind::Ptr => write!(f, "ptr"),
            TypeKind::Void => write!(f, "void"),
            TypeKind::Func { params, ret } => {
                write!(f, "fn(")?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", self.types.display(*param))?;
                }
                write!(f, ") -> {}", self.types.display(*ret))
            }
        }
    }
}
