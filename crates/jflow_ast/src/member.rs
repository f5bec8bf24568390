//! Resolved references to fields and invocables.
use bitflags::bitflags;

use crate::types::Type;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MemberFlags: u8 {
        const STATIC = 1 << 0;
        /// The last parameter is a variable-arity array.
        const VARARGS = 1 << 1;
        /// The invocable never returns normally, e.g. `System.exit`.
        const TERMINATES_EXECUTION = 1 << 2;
    }
}

/// A method or constructor after overload resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: Type,
    pub name: Box<str>,
    pub params: Vec<Type>,
    pub return_type: Type,
    /// Declared checked exceptions.
    pub thrown: Vec<Type>,
    pub flags: MemberFlags,
}

impl MethodRef {
    pub fn new(owner: Type, name: &str, params: Vec<Type>, return_type: Type) -> Self {
        Self {
            owner,
            name: name.into(),
            params,
            return_type,
            thrown: Vec::new(),
            flags: MemberFlags::empty(),
        }
    }

    /// A constructor of `owner`.
    pub fn constructor(owner: Type, params: Vec<Type>) -> Self {
        Self::new(owner, "<init>", params, Type::Void)
    }

    #[must_use]
    pub fn with_thrown(mut self, thrown: impl IntoIterator<Item = Type>) -> Self {
        self.thrown.extend(thrown);
        self
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }

    pub fn is_varargs(&self) -> bool {
        self.flags.contains(MemberFlags::VARARGS)
    }

    pub fn terminates_execution(&self) -> bool {
        self.flags.contains(MemberFlags::TERMINATES_EXECUTION)
    }

    pub fn is_constructor(&self) -> bool {
        &*self.name == "<init>"
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: Type,
    pub name: Box<str>,
    pub ty: Type,
    pub flags: MemberFlags,
}

impl FieldRef {
    pub fn new(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            owner,
            name: name.into(),
            ty,
            flags: MemberFlags::empty(),
        }
    }

    #[must_use]
    pub fn with_flags(mut self, flags: MemberFlags) -> Self {
        self.flags |= flags;
        self
    }

    pub fn is_static(&self) -> bool {
        self.flags.contains(MemberFlags::STATIC)
    }
}
