//! Computation nodes: the individual evaluation steps stored in blocks.
use std::fmt;

use jflow_ast::{Ast, BinaryOp, FieldRef, Literal, LocalId, MethodRef, TreeId, Type, UnaryOp};
use la_arena::Idx;

use crate::cfg::graph::ControlFlowGraph;

pub type NodeId = Idx<Node>;
pub type SyntheticId = Idx<SyntheticLocal>;

#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub kind: NodeKind,
    /// The tree this node evaluates. Conversion nodes share the tree of their
    /// operand; nodes introduced by desugaring have none.
    pub tree: Option<TreeId>,
    pub ty: Type,
    /// Set for nodes that denote an assignment target rather than a value.
    pub lvalue: bool,
}

/// A local introduced by the builder, e.g. the iterator of an enhanced `for`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SyntheticLocal {
    pub name: Box<str>,
    pub ty: Type,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variable {
    Declared(LocalId),
    Synthetic(SyntheticId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConversionKind {
    Widening,
    Narrowing,
    Boxing,
    Unboxing,
    String,
}

impl ConversionKind {
    const fn name(self) -> &'static str {
        match self {
            Self::Widening => "WideningConversion",
            Self::Narrowing => "NarrowingConversion",
            Self::Boxing => "Boxing",
            Self::Unboxing => "Unboxing",
            Self::String => "StringConversion",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeKind {
    Literal(Literal),
    LocalVariable(Variable),
    FieldAccess {
        receiver: NodeId,
        field: FieldRef,
    },
    MethodAccess {
        receiver: NodeId,
        method: MethodRef,
    },
    MethodInvocation {
        target: NodeId,
        args: Vec<NodeId>,
    },
    ObjectCreation {
        enclosing: Option<NodeId>,
        class: NodeId,
        constructor: MethodRef,
        args: Vec<NodeId>,
    },
    ArrayCreation {
        dimensions: Vec<NodeId>,
        initializers: Vec<NodeId>,
    },
    ArrayAccess {
        array: NodeId,
        index: NodeId,
    },
    This {
        /// `true` for the receiver of an unqualified member access.
        implicit: bool,
    },
    ClassName {
        qualifier: Option<NodeId>,
    },
    PackageName {
        name: Box<str>,
        qualifier: Option<NodeId>,
    },
    Assignment {
        target: NodeId,
        value: NodeId,
    },
    CompoundAssignment {
        op: BinaryOp,
        target: NodeId,
        value: NodeId,
    },
    /// Every binary operator except `&&` and `||`.
    Binary {
        op: BinaryOp,
        lhs: NodeId,
        rhs: NodeId,
    },
    Unary {
        op: UnaryOp,
        operand: NodeId,
    },
    /// The value of `&&` or `||`. An operand lowered purely as a branch has
    /// no value node.
    ShortCircuit {
        op: BinaryOp,
        lhs: Option<NodeId>,
        rhs: Option<NodeId>,
    },
    Ternary {
        condition: Option<NodeId>,
        then_value: NodeId,
        else_value: NodeId,
    },
    Conversion {
        kind: ConversionKind,
        operand: NodeId,
    },
    TypeCast {
        operand: NodeId,
    },
    InstanceOf {
        operand: NodeId,
        tested: Type,
    },
    VariableDeclaration(Variable),
    Return {
        value: NodeId,
    },
    Throw {
        exception: NodeId,
    },
    /// The test of one `case` label against the switch selector.
    Case {
        selector: NodeId,
        test: NodeId,
    },
    Assert {
        condition: NodeId,
        detail: Option<NodeId>,
    },
    Marker(Box<str>),
    /// A primitive, array or parameterized type in expression position.
    TypeExpr,
}

impl NodeKind {
    /// The node kind's name, as shown by the DOT renderer.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "Literal",
            Self::LocalVariable(_) => "LocalVariable",
            Self::FieldAccess { .. } => "FieldAccess",
            Self::MethodAccess { .. } => "MethodAccess",
            Self::MethodInvocation { .. } => "MethodInvocation",
            Self::ObjectCreation { .. } => "ObjectCreation",
            Self::ArrayCreation { .. } => "ArrayCreation",
            Self::ArrayAccess { .. } => "ArrayAccess",
            Self::This { implicit: true } => "ImplicitThisLiteral",
            Self::This { implicit: false } => "ExplicitThisLiteral",
            Self::ClassName { .. } => "ClassName",
            Self::PackageName { .. } => "PackageName",
            Self::Assignment { .. } => "Assignment",
            Self::CompoundAssignment { .. } => "CompoundAssignment",
            Self::Binary { .. } => "Binary",
            Self::Unary { .. } => "Unary",
            Self::ShortCircuit { .. } => "ShortCircuit",
            Self::Ternary { .. } => "TernaryExpression",
            Self::Conversion { kind, .. } => kind.name(),
            Self::TypeCast { .. } => "TypeCast",
            Self::InstanceOf { .. } => "InstanceOf",
            Self::VariableDeclaration(_) => "VariableDeclaration",
            Self::Return { .. } => "Return",
            Self::Throw { .. } => "Throw",
            Self::Case { .. } => "Case",
            Self::Assert { .. } => "Assert",
            Self::Marker(_) => "Marker",
            Self::TypeExpr => "TypeExpression",
        }
    }

    /// Nodes this node reads, in evaluation order.
    pub fn operands(&self) -> Vec<NodeId> {
        match self {
            Self::FieldAccess { receiver, .. } | Self::MethodAccess { receiver, .. } => {
                vec![*receiver]
            }
            Self::MethodInvocation { target, args } => {
                std::iter::once(*target).chain(args.iter().copied()).collect()
            }
            Self::ObjectCreation {
                enclosing,
                class,
                args,
                ..
            } => enclosing
                .iter()
                .copied()
                .chain(std::iter::once(*class))
                .chain(args.iter().copied())
                .collect(),
            Self::ArrayCreation {
                dimensions,
                initializers,
            } => dimensions.iter().chain(initializers).copied().collect(),
            Self::ArrayAccess { array, index } => vec![*array, *index],
            Self::ClassName { qualifier } | Self::PackageName { qualifier, .. } => {
                qualifier.iter().copied().collect()
            }
            Self::Assignment { target, value } | Self::CompoundAssignment { target, value, .. } => {
                vec![*target, *value]
            }
            Self::Binary { lhs, rhs, .. } => vec![*lhs, *rhs],
            Self::ShortCircuit { lhs, rhs, .. } => lhs.iter().chain(rhs).copied().collect(),
            Self::Ternary {
                condition,
                then_value,
                else_value,
            } => condition
                .iter()
                .copied()
                .chain([*then_value, *else_value])
                .collect(),
            Self::Unary { operand, .. }
            | Self::Conversion { operand, .. }
            | Self::TypeCast { operand }
            | Self::InstanceOf { operand, .. } => vec![*operand],
            Self::Return { value } => vec![*value],
            Self::Throw { exception } => vec![*exception],
            Self::Case { selector, test } => vec![*selector, *test],
            Self::Assert { condition, detail } => {
                std::iter::once(*condition).chain(*detail).collect()
            }
            Self::Literal(_)
            | Self::LocalVariable(_)
            | Self::This { .. }
            | Self::VariableDeclaration(_)
            | Self::Marker(_)
            | Self::TypeExpr => Vec::new(),
        }
    }
}

/// Renders a node as source-like text, resolving local names through the
/// tree it was built from.
pub struct NodeDisplay<'a> {
    cfg: &'a ControlFlowGraph,
    ast: &'a Ast,
    node: NodeId,
}

impl<'a> NodeDisplay<'a> {
    pub fn new(cfg: &'a ControlFlowGraph, ast: &'a Ast, node: NodeId) -> Self {
        Self { cfg, ast, node }
    }

    /// The name of the node's kind, e.g. `MethodInvocation`.
    pub fn kind_name(&self) -> &'static str {
        self.cfg.node(self.node).kind.name()
    }

    fn with(&self, node: NodeId) -> NodeDisplay<'a> {
        NodeDisplay::new(self.cfg, self.ast, node)
    }

    fn variable_name(&self, variable: Variable) -> &'a str {
        match variable {
            Variable::Declared(local) => &self.ast.local(local).name,
            Variable::Synthetic(synthetic) => &self.cfg.synthetic_local(synthetic).name,
        }
    }

    fn write_list(&self, f: &mut fmt::Formatter<'_>, nodes: &[NodeId]) -> fmt::Result {
        for (index, node) in nodes.iter().enumerate() {
            if index > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{}", self.with(*node))?;
        }
        Ok(())
    }
}

impl fmt::Display for NodeDisplay<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let node = self.cfg.node(self.node);
        match &node.kind {
            NodeKind::Literal(literal) => write!(f, "{literal}"),
            NodeKind::LocalVariable(variable) => f.write_str(self.variable_name(*variable)),
            NodeKind::FieldAccess { receiver, field } => {
                write!(f, "{}.{}", self.with(*receiver), field.name)
            }
            NodeKind::MethodAccess { receiver, method } => {
                write!(f, "{}.{}", self.with(*receiver), method.name)
            }
            NodeKind::MethodInvocation { target, args } => {
                write!(f, "{}(", self.with(*target))?;
                self.write_list(f, args)?;
                f.write_str(")")
            }
            NodeKind::ObjectCreation {
                enclosing,
                class,
                args,
                ..
            } => {
                if let Some(enclosing) = enclosing {
                    write!(f, "{}.", self.with(*enclosing))?;
                }
                write!(f, "new {}(", self.with(*class))?;
                self.write_list(f, args)?;
                f.write_str(")")
            }
            NodeKind::ArrayCreation {
                dimensions,
                initializers,
            } => {
                write!(f, "new {}(", node.ty)?;
                self.write_list(f, dimensions)?;
                f.write_str(")[")?;
                self.write_list(f, initializers)?;
                f.write_str("]")
            }
            NodeKind::ArrayAccess { array, index } => {
                write!(f, "{}[{}]", self.with(*array), self.with(*index))
            }
            NodeKind::This { .. } => f.write_str("this"),
            NodeKind::ClassName { .. } | NodeKind::TypeExpr => write!(f, "{}", node.ty),
            NodeKind::PackageName { name, .. } => f.write_str(name),
            NodeKind::Assignment { target, value } => {
                write!(f, "{} = {}", self.with(*target), self.with(*value))
            }
            NodeKind::CompoundAssignment { op, target, value } => {
                write!(f, "({} {op}= {})", self.with(*target), self.with(*value))
            }
            NodeKind::Binary { op, lhs, rhs } => {
                write!(f, "({} {op} {})", self.with(*lhs), self.with(*rhs))
            }
            NodeKind::Unary { op, operand } => {
                if op.is_postfix() {
                    write!(f, "({}{op})", self.with(*operand))
                } else {
                    write!(f, "({op}{})", self.with(*operand))
                }
            }
            NodeKind::ShortCircuit { op, lhs, rhs } => {
                let show = |side: &Option<NodeId>| {
                    side.map_or_else(|| "<branch>".to_string(), |node| self.with(node).to_string())
                };
                write!(f, "({} {op} {})", show(lhs), show(rhs))
            }
            NodeKind::Ternary {
                condition,
                then_value,
                else_value,
            } => {
                match condition {
                    Some(condition) => write!(f, "({}", self.with(*condition))?,
                    None => f.write_str("(<branch>")?,
                }
                write!(
                    f,
                    " ? {} : {})",
                    self.with(*then_value),
                    self.with(*else_value)
                )
            }
            NodeKind::Conversion { kind, operand } => {
                write!(f, "{}({}, {})", kind.name(), self.with(*operand), node.ty)
            }
            NodeKind::TypeCast { operand } => write!(f, "({}) {}", node.ty, self.with(*operand)),
            NodeKind::InstanceOf { operand, tested } => {
                write!(f, "({} instanceof {tested})", self.with(*operand))
            }
            NodeKind::VariableDeclaration(variable) => {
                let ty = match variable {
                    Variable::Declared(local) => &self.ast.local(*local).ty,
                    Variable::Synthetic(synthetic) => &self.cfg.synthetic_local(*synthetic).ty,
                };
                write!(f, "{ty} {}", self.variable_name(*variable))
            }
            NodeKind::Return { value } => write!(f, "return {}", self.with(*value)),
            NodeKind::Throw { exception } => write!(f, "throw {}", self.with(*exception)),
            NodeKind::Case { selector, test } => {
                write!(f, "case {} == {}", self.with(*selector), self.with(*test))
            }
            NodeKind::Assert { condition, detail } => {
                write!(f, "assert {}", self.with(*condition))?;
                if let Some(detail) = detail {
                    write!(f, " : {}", self.with(*detail))?;
                }
                Ok(())
            }
            NodeKind::Marker(message) => write!(f, "marker ({message})"),
        }
    }
}
