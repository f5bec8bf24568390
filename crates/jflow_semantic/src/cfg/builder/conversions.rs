//! Implicit conversions inserted around operands.
//!
//! Every conversion is an explicit node in the sequence and takes over the
//! tree of the value it converts.
use jflow_ast::{PrimitiveKind, Type};

use crate::cfg::builder::linearize::Linearizer;
use crate::cfg::node::{ConversionKind, NodeId, NodeKind};

impl Linearizer<'_> {
    fn ty(&self, node: NodeId) -> &Type {
        &self.nodes[node].ty
    }

    fn convert(&mut self, kind: ConversionKind, operand: NodeId, ty: Type) -> NodeId {
        self.extend_conversion(NodeKind::Conversion { kind, operand }, operand, ty)
    }

    /// The primitive `ty` denotes directly or after unboxing.
    pub(super) fn primitive_of(&self, ty: &Type) -> Option<PrimitiveKind> {
        ty.primitive_kind().or_else(|| self.types.unboxed_type(ty))
    }

    pub(super) fn box_node(&mut self, node: NodeId) -> NodeId {
        match self.ty(node).primitive_kind() {
            Some(kind) => {
                let boxed = self.types.boxed_type(kind);
                self.convert(ConversionKind::Boxing, node, boxed)
            }
            None => node,
        }
    }

    pub(super) fn unbox(&mut self, node: NodeId) -> NodeId {
        match self.types.unboxed_type(self.ty(node)) {
            Some(kind) => self.convert(ConversionKind::Unboxing, node, Type::Primitive(kind)),
            None => node,
        }
    }

    pub(super) fn string_conversion(&mut self, node: NodeId, string: &Type) -> NodeId {
        if self.types.is_string(self.ty(node)) {
            node
        } else {
            self.convert(ConversionKind::String, node, string.clone())
        }
    }

    /// Unboxes the operand and widens `byte`, `short` and `char` to `int`.
    pub(super) fn unary_numeric_promotion(&mut self, node: NodeId) -> NodeId {
        let node = self.unbox(node);
        match self.ty(node).primitive_kind() {
            Some(PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Char) => {
                self.convert(ConversionKind::Widening, node, Type::INT)
            }
            _ => node,
        }
    }

    /// Unboxes the operand and widens it to the type of the whole
    /// expression.
    pub(super) fn binary_numeric_promotion(&mut self, node: NodeId, ty: &Type) -> NodeId {
        let node = self.unbox(node);
        if self.types.is_same_type(self.ty(node), ty) {
            node
        } else {
            self.convert(ConversionKind::Widening, node, ty.clone())
        }
    }

    pub(super) fn widen(&mut self, node: NodeId, ty: &Type) -> NodeId {
        let from = self.ty(node);
        if self.types.is_subtype(from, ty) && !self.types.is_same_type(from, ty) {
            self.convert(ConversionKind::Widening, node, ty.clone())
        } else {
            node
        }
    }

    pub(super) fn narrow(&mut self, node: NodeId, ty: &Type) -> NodeId {
        let from = self.ty(node);
        if self.types.is_subtype(ty, from) && !self.types.is_same_type(ty, from) {
            self.convert(ConversionKind::Narrowing, node, ty.clone())
        } else {
            node
        }
    }

    /// Narrows to `ty`, boxing afterwards if `ty` is a boxed primitive.
    pub(super) fn narrow_and_box(&mut self, node: NodeId, ty: &Type) -> NodeId {
        match self.types.unboxed_type(ty) {
            Some(kind) => {
                let node = self.narrow(node, &Type::Primitive(kind));
                self.box_node(node)
            }
            None => self.narrow(node, ty),
        }
    }

    /// Converts a value for assignment to a variable of type `ty`.
    pub(super) fn assign_convert(&mut self, node: NodeId, ty: &Type) -> NodeId {
        self.common_convert(node, ty, true)
    }

    /// Converts an argument for a formal parameter of type `ty`.
    pub(super) fn invocation_convert(&mut self, node: NodeId, ty: &Type) -> NodeId {
        self.common_convert(node, ty, false)
    }

    /// Assignment and invocation conversion differ only in that assignment
    /// narrows constants to `byte`, `short` and `char`.
    fn common_convert(&mut self, mut node: NodeId, ty: &Type, allow_narrowing: bool) -> NodeId {
        let from = self.ty(node).clone();
        if self.types.is_same_type(&from, ty) {
            return node;
        }

        let left_boxed = self.types.unboxed_type(ty);
        let right_boxed = self.types.unboxed_type(&from);
        let is_subtype = self.types.is_subtype(&from, ty);
        // A constant may be narrowed to `byte`, `short` or `char`, boxed
        // afterwards if the target is their box.
        let narrows_constant = allow_narrowing
            && matches!(
                left_boxed.or_else(|| ty.primitive_kind()),
                Some(PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Char)
            )
            && matches!(self.nodes[node].kind, NodeKind::Literal(_));

        if from.is_numeric() && ty.is_numeric() && is_subtype {
            node = self.widen(node, ty);
        } else if from.is_reference() && ty.is_reference() && is_subtype {
            // Widening reference conversions are not represented.
        } else if from.is_primitive() && left_boxed.is_some() {
            node = if narrows_constant {
                self.narrow_and_box(node, ty)
            } else {
                self.box_node(node)
            };
        } else if right_boxed.is_some() && ty.is_primitive() {
            node = self.unbox(node);
            node = self.widen(node, ty);
        } else if narrows_constant {
            node = self.narrow_and_box(node, ty);
        }

        node
    }

    /// Converts an operand of a conditional expression to the type of the
    /// whole expression.
    pub(super) fn conditional_expr_promotion(&mut self, node: NodeId, ty: &Type) -> NodeId {
        let from = self.ty(node).clone();
        if self.types.is_same_type(&from, ty) {
            return node;
        }

        if from.is_primitive() && self.types.is_boxed_primitive(ty) {
            return self.box_node(node);
        }

        let is_boxed = self.types.is_boxed_primitive(&from);
        let Some(kind) = self.primitive_of(&from).filter(|kind| kind.is_numeric()) else {
            return node;
        };

        let target = ty.primitive_kind();
        if kind == PrimitiveKind::Byte && target == Some(PrimitiveKind::Short) {
            let node = if is_boxed { self.unbox(node) } else { node };
            return self.widen(node, ty);
        }

        if matches!(
            target,
            Some(PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Char)
        ) {
            if is_boxed {
                return self.unbox(node);
            } else if kind == PrimitiveKind::Int {
                return self.narrow(node, ty);
            }
        }

        self.binary_numeric_promotion(node, ty)
    }
}

#[cfg(test)]
mod tests {
    use jflow_ast::{AstBuilder, ClassTable, Literal, Type};
    use test_case::test_case;

    use crate::cfg::node::{ConversionKind, NodeKind};
    use crate::{build_cfg, CfgSettings};

    fn integer() -> Type {
        Type::class_type("java.lang.Integer")
    }

    /// The conversion, if any, applied to the initializer of
    /// `<declared> x = <init>`.
    fn conversion_of(declared: Type, init_ty: Type, literal: bool) -> Option<ConversionKind> {
        let mut builder = AstBuilder::new();
        let init = if literal {
            builder.int(3)
        } else {
            let source = builder.local("source", init_ty);
            builder.local_ref(source)
        };
        let x = builder.local("x", declared);
        let decl = builder.var_decl(x, Some(init));
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let settings = CfgSettings {
            simplify: false,
            ..CfgSettings::default()
        };
        let cfg = build_cfg(&ast, &table, decl, &settings).unwrap();

        let value = cfg.node_for_tree(init).unwrap();
        match &cfg.node(value).kind {
            NodeKind::Conversion { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    #[test_case(Type::LONG, Type::INT, false, Some(ConversionKind::Widening); "int to long")]
    #[test_case(integer(), Type::INT, false, Some(ConversionKind::Boxing); "int to Integer")]
    #[test_case(Type::INT, integer(), false, Some(ConversionKind::Unboxing); "Integer to int")]
    #[test_case(Type::BYTE, Type::INT, true, Some(ConversionKind::Narrowing); "constant to byte")]
    #[test_case(Type::BYTE, Type::INT, false, None; "variable to byte")]
    #[test_case(integer(), Type::INT, true, Some(ConversionKind::Boxing); "constant to Integer")]
    #[test_case(Type::INT, Type::INT, false, None; "identity")]
    fn assignment_conversion(
        declared: Type,
        init_ty: Type,
        literal: bool,
        expected: Option<ConversionKind>,
    ) {
        assert_eq!(conversion_of(declared, init_ty, literal), expected);
    }

    #[test]
    fn boxed_narrowing_boxes_after_narrowing() {
        let mut builder = AstBuilder::new();
        let three = builder.int(3);
        let s = builder.local("s", Type::class_type("java.lang.Short"));
        let decl = builder.var_decl(s, Some(three));
        let ast = builder.finish();

        let table = ClassTable::with_java_lang();
        let cfg = build_cfg(&ast, &table, decl, &CfgSettings::default()).unwrap();

        let boxed = cfg.node_for_tree(three).unwrap();
        assert_eq!(cfg.node(boxed).ty, Type::class_type("java.lang.Short"));
        let NodeKind::Conversion {
            kind: ConversionKind::Boxing,
            operand,
        } = cfg.node(boxed).kind
        else {
            panic!("expected boxing, got {:?}", cfg.node(boxed).kind);
        };
        let NodeKind::Conversion {
            kind: ConversionKind::Narrowing,
            operand,
        } = cfg.node(operand).kind
        else {
            panic!("expected narrowing");
        };
        assert_eq!(cfg.node(operand).kind, NodeKind::Literal(Literal::Int(3)));
        assert_eq!(cfg.node(operand).ty, Type::INT);
    }
}
