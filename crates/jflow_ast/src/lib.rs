//! Elaborated, typed syntax trees for a Java-like language.
//!
//! The trees in this crate are what a front end hands to control-flow
//! construction: every name is resolved, every expression carries its static
//! type, and method references are already overload-resolved.
pub use builder::AstBuilder;
pub use class_table::{ClassDef, ClassTable};
pub use member::{FieldRef, MemberFlags, MethodRef};
pub use tree::*;
pub use types::{DeclaredType, PrimitiveKind, Type, TypeQuery, TypeVariable, WellKnownType};

mod builder;
mod class_table;
mod member;
mod tree;
mod types;
