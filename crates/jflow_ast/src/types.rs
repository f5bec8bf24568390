//! Static types, as assigned to trees by the elaborator, and the type-query
//! services that control-flow construction relies on.
use std::fmt;

use crate::member::MethodRef;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum PrimitiveKind {
    Boolean,
    Byte,
    Short,
    Char,
    Int,
    Long,
    Float,
    Double,
}

impl PrimitiveKind {
    pub const fn is_numeric(self) -> bool {
        !matches!(self, Self::Boolean)
    }

    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            Self::Byte | Self::Short | Self::Char | Self::Int | Self::Long
        )
    }

    /// Returns `true` if an identity or widening primitive conversion takes
    /// `self` to `target`.
    pub const fn widens_to(self, target: Self) -> bool {
        use PrimitiveKind::{Boolean, Byte, Char, Double, Float, Int, Long, Short};

        match (self, target) {
            (Boolean, Boolean)
            | (Byte, Byte | Short | Int | Long | Float | Double)
            | (Short, Short | Int | Long | Float | Double)
            | (Char, Char | Int | Long | Float | Double)
            | (Int, Int | Long | Float | Double)
            | (Long, Long | Float | Double)
            | (Float, Float | Double)
            | (Double, Double) => true,
            _ => false,
        }
    }

    /// Binary numeric promotion: the common type two numeric operands are
    /// widened to before an arithmetic or comparison operator applies.
    pub const fn promote(self, other: Self) -> Self {
        match (self, other) {
            (Self::Double, _) | (_, Self::Double) => Self::Double,
            (Self::Float, _) | (_, Self::Float) => Self::Float,
            (Self::Long, _) | (_, Self::Long) => Self::Long,
            _ => Self::Int,
        }
    }

    /// Unary numeric promotion.
    pub const fn promote_unary(self) -> Self {
        match self {
            Self::Byte | Self::Short | Self::Char => Self::Int,
            _ => self,
        }
    }

    /// Fully qualified name of the class that boxes this primitive.
    pub const fn boxed_class(self) -> &'static str {
        match self {
            Self::Boolean => "java.lang.Boolean",
            Self::Byte => "java.lang.Byte",
            Self::Short => "java.lang.Short",
            Self::Char => "java.lang.Character",
            Self::Int => "java.lang.Integer",
            Self::Long => "java.lang.Long",
            Self::Float => "java.lang.Float",
            Self::Double => "java.lang.Double",
        }
    }

    pub fn from_boxed_class(name: &str) -> Option<Self> {
        Some(match name {
            "java.lang.Boolean" => Self::Boolean,
            "java.lang.Byte" => Self::Byte,
            "java.lang.Short" => Self::Short,
            "java.lang.Character" => Self::Char,
            "java.lang.Integer" => Self::Int,
            "java.lang.Long" => Self::Long,
            "java.lang.Float" => Self::Float,
            "java.lang.Double" => Self::Double,
            _ => return None,
        })
    }

    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Boolean => "boolean",
            Self::Byte => "byte",
            Self::Short => "short",
            Self::Char => "char",
            Self::Int => "int",
            Self::Long => "long",
            Self::Float => "float",
            Self::Double => "double",
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// A class or interface type, possibly parameterized.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclaredType {
    /// Fully qualified name, e.g. `java.lang.String`.
    pub name: Box<str>,
    pub args: Vec<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TypeVariable {
    pub name: Box<str>,
    pub upper_bound: Box<Type>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, is_macro::Is)]
pub enum Type {
    Primitive(PrimitiveKind),
    Void,
    /// The type of the `null` literal.
    Null,
    Declared(DeclaredType),
    Array(Box<Type>),
    Variable(TypeVariable),
    /// The type of a multi-catch parameter, `A | B`.
    Union(Vec<Type>),
}

impl Type {
    pub const BOOLEAN: Type = Type::Primitive(PrimitiveKind::Boolean);
    pub const BYTE: Type = Type::Primitive(PrimitiveKind::Byte);
    pub const SHORT: Type = Type::Primitive(PrimitiveKind::Short);
    pub const CHAR: Type = Type::Primitive(PrimitiveKind::Char);
    pub const INT: Type = Type::Primitive(PrimitiveKind::Int);
    pub const LONG: Type = Type::Primitive(PrimitiveKind::Long);
    pub const FLOAT: Type = Type::Primitive(PrimitiveKind::Float);
    pub const DOUBLE: Type = Type::Primitive(PrimitiveKind::Double);

    pub fn class_type(name: &str) -> Self {
        Self::Declared(DeclaredType {
            name: name.into(),
            args: Vec::new(),
        })
    }

    pub fn generic(name: &str, args: impl IntoIterator<Item = Type>) -> Self {
        Self::Declared(DeclaredType {
            name: name.into(),
            args: args.into_iter().collect(),
        })
    }

    pub fn array_of(element: Type) -> Self {
        Self::Array(Box::new(element))
    }

    pub fn type_variable(name: &str, upper_bound: Type) -> Self {
        Self::Variable(TypeVariable {
            name: name.into(),
            upper_bound: Box::new(upper_bound),
        })
    }

    pub fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Self::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.primitive_kind().is_some_and(PrimitiveKind::is_numeric)
    }

    pub fn is_integral(&self) -> bool {
        self.primitive_kind().is_some_and(PrimitiveKind::is_integral)
    }

    pub fn is_reference(&self) -> bool {
        matches!(
            self,
            Self::Null | Self::Declared(_) | Self::Array(_) | Self::Variable(_) | Self::Union(_)
        )
    }

    /// The name of a declared type, or `None` for every other kind.
    pub fn class_name(&self) -> Option<&str> {
        match self {
            Self::Declared(declared) => Some(&declared.name),
            _ => None,
        }
    }

    pub fn element_type(&self) -> Option<&Type> {
        match self {
            Self::Array(element) => Some(element),
            _ => None,
        }
    }

    /// Follows type-variable bounds until a non-variable type is reached.
    pub fn upper_bound(&self) -> &Type {
        let mut ty = self;
        while let Self::Variable(var) = ty {
            ty = &var.upper_bound;
        }
        ty
    }

    /// Replaces the type variables named in `params` with the matching entry
    /// of `args`. A raw use (no `args`) replaces them with their bounds.
    #[must_use]
    pub fn substitute(&self, params: &[Box<str>], args: &[Type]) -> Type {
        match self {
            Self::Variable(var) => match params.iter().position(|param| *param == var.name) {
                Some(index) => args
                    .get(index)
                    .cloned()
                    .unwrap_or_else(|| var.upper_bound.as_ref().clone()),
                None => self.clone(),
            },
            Self::Declared(declared) => Self::Declared(DeclaredType {
                name: declared.name.clone(),
                args: declared
                    .args
                    .iter()
                    .map(|arg| arg.substitute(params, args))
                    .collect(),
            }),
            Self::Array(element) => Self::array_of(element.substitute(params, args)),
            Self::Union(alternatives) => Self::Union(
                alternatives
                    .iter()
                    .map(|alt| alt.substitute(params, args))
                    .collect(),
            ),
            Self::Primitive(_) | Self::Void | Self::Null => self.clone(),
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primitive(kind) => write!(f, "{kind}"),
            Self::Void => f.write_str("void"),
            Self::Null => f.write_str("null"),
            Self::Declared(declared) => {
                f.write_str(&declared.name)?;
                if let Some((first, rest)) = declared.args.split_first() {
                    write!(f, "<{first}")?;
                    for arg in rest {
                        write!(f, ", {arg}")?;
                    }
                    f.write_str(">")?;
                }
                Ok(())
            }
            Self::Array(element) => write!(f, "{element}[]"),
            Self::Variable(var) => f.write_str(&var.name),
            Self::Union(alternatives) => {
                for (index, alt) in alternatives.iter().enumerate() {
                    if index > 0 {
                        f.write_str(" | ")?;
                    }
                    write!(f, "{alt}")?;
                }
                Ok(())
            }
        }
    }
}

/// Library types the builder needs by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WellKnownType {
    Object,
    String,
    Throwable,
    NullPointerException,
    Iterable,
    Iterator,
}

impl WellKnownType {
    pub const fn qualified_name(self) -> &'static str {
        match self {
            Self::Object => "java.lang.Object",
            Self::String => "java.lang.String",
            Self::Throwable => "java.lang.Throwable",
            Self::NullPointerException => "java.lang.NullPointerException",
            Self::Iterable => "java.lang.Iterable",
            Self::Iterator => "java.util.Iterator",
        }
    }
}

/// Read-only type services supplied by the front end.
///
/// Implementations must be safe to share between independent builder
/// invocations; none of the queries mutate state.
pub trait TypeQuery {
    /// Returns `true` if `sub` is a subtype of `sup`. Primitive types are
    /// related by widening, as in `byte <: short <: int`.
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool;

    /// Resolves a member named `name` taking `arity` arguments on `receiver`,
    /// with the receiver's type arguments substituted into its signature.
    fn lookup_method(&self, receiver: &Type, name: &str, arity: usize) -> Option<MethodRef>;

    fn is_same_type(&self, left: &Type, right: &Type) -> bool {
        left == right
    }

    fn erasure(&self, ty: &Type) -> Type {
        match ty {
            Type::Declared(declared) => Type::class_type(&declared.name),
            Type::Array(element) => Type::array_of(self.erasure(element)),
            Type::Variable(var) => self.erasure(&var.upper_bound),
            _ => ty.clone(),
        }
    }

    fn boxed_type(&self, kind: PrimitiveKind) -> Type {
        Type::class_type(kind.boxed_class())
    }

    /// The primitive a boxed type unboxes to, or `None` if `ty` is not a
    /// boxed primitive.
    fn unboxed_type(&self, ty: &Type) -> Option<PrimitiveKind> {
        match ty {
            Type::Declared(declared) if declared.args.is_empty() => {
                PrimitiveKind::from_boxed_class(&declared.name)
            }
            _ => None,
        }
    }

    fn well_known(&self, which: WellKnownType) -> Type {
        Type::class_type(which.qualified_name())
    }

    fn is_boxed_primitive(&self, ty: &Type) -> bool {
        self.unboxed_type(ty).is_some()
    }

    fn is_string(&self, ty: &Type) -> bool {
        ty.class_name() == Some(WellKnownType::String.qualified_name())
    }

    /// Whether `ty` is `boolean` or `java.lang.Boolean`.
    fn is_boolean(&self, ty: &Type) -> bool {
        ty.primitive_kind()
            .or_else(|| self.unboxed_type(ty))
            .is_some_and(|kind| kind == PrimitiveKind::Boolean)
    }

    /// Assignability as used for method invocation: subtyping, optionally
    /// preceded by boxing or unboxing.
    fn is_assignable(&self, from: &Type, to: &Type) -> bool {
        if self.is_subtype(from, to) {
            return true;
        }
        if let Some(kind) = from.primitive_kind() {
            return self.is_subtype(&self.boxed_type(kind), to);
        }
        if let (Some(unboxed), Some(target)) = (self.unboxed_type(from), to.primitive_kind()) {
            return unboxed.widens_to(target);
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test_case(PrimitiveKind::Byte, PrimitiveKind::Int, true)]
    #[test_case(PrimitiveKind::Char, PrimitiveKind::Short, false)]
    #[test_case(PrimitiveKind::Short, PrimitiveKind::Char, false)]
    #[test_case(PrimitiveKind::Long, PrimitiveKind::Float, true)]
    #[test_case(PrimitiveKind::Double, PrimitiveKind::Float, false)]
    #[test_case(PrimitiveKind::Boolean, PrimitiveKind::Int, false)]
    fn widening(from: PrimitiveKind, to: PrimitiveKind, expected: bool) {
        assert_eq!(from.widens_to(to), expected);
    }

    #[test_case(PrimitiveKind::Byte, PrimitiveKind::Short, PrimitiveKind::Int)]
    #[test_case(PrimitiveKind::Int, PrimitiveKind::Long, PrimitiveKind::Long)]
    #[test_case(PrimitiveKind::Float, PrimitiveKind::Long, PrimitiveKind::Float)]
    #[test_case(PrimitiveKind::Char, PrimitiveKind::Double, PrimitiveKind::Double)]
    fn binary_promotion(left: PrimitiveKind, right: PrimitiveKind, expected: PrimitiveKind) {
        assert_eq!(left.promote(right), expected);
        assert_eq!(right.promote(left), expected);
    }

    #[test]
    fn substitute_replaces_parameters() {
        let iterator = Type::generic(
            "java.util.Iterator",
            [Type::type_variable("T", Type::class_type("java.lang.Object"))],
        );
        let params: Vec<Box<str>> = vec!["T".into()];
        let substituted = iterator.substitute(&params, &[Type::class_type("java.lang.String")]);
        assert_eq!(
            substituted.to_string(),
            "java.util.Iterator<java.lang.String>"
        );

        let raw = iterator.substitute(&params, &[]);
        assert_eq!(raw.to_string(), "java.util.Iterator<java.lang.Object>");
    }
}
