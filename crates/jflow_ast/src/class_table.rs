//! A small, explicit class hierarchy implementing [`TypeQuery`].
//!
//! Front ends with a real symbol table implement [`TypeQuery`] directly; the
//! table here covers callers that only need a handful of classes, and is what
//! the control-flow tests are written against.
use rustc_hash::FxHashMap;

use crate::member::MethodRef;
use crate::types::{DeclaredType, PrimitiveKind, Type, TypeQuery, WellKnownType};

const OBJECT: &str = WellKnownType::Object.qualified_name();

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassDef {
    pub name: Box<str>,
    pub type_params: Vec<Box<str>>,
    /// Direct superclass and superinterfaces, written in terms of
    /// `type_params`.
    pub supertypes: Vec<Type>,
    pub methods: Vec<MethodRef>,
}

impl ClassDef {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            supertypes: Vec::new(),
            methods: Vec::new(),
        }
    }

    #[must_use]
    pub fn type_param(mut self, name: &str) -> Self {
        self.type_params.push(name.into());
        self
    }

    #[must_use]
    pub fn extends(mut self, supertype: Type) -> Self {
        self.supertypes.push(supertype);
        self
    }

    /// Adds an instance method whose owner is this class.
    #[must_use]
    pub fn method(mut self, name: &str, params: Vec<Type>, return_type: Type) -> Self {
        let owner = self.this_type();
        self.methods
            .push(MethodRef::new(owner, name, params, return_type));
        self
    }

    /// The class applied to its own type parameters.
    pub fn this_type(&self) -> Type {
        Type::generic(
            &self.name,
            self.type_params
                .iter()
                .map(|param| Type::type_variable(param, Type::class_type(OBJECT))),
        )
    }

    fn type_var(&self, name: &str) -> Type {
        debug_assert!(self.type_params.iter().any(|param| &**param == name));
        Type::type_variable(name, Type::class_type(OBJECT))
    }
}

#[derive(Debug, Default, Clone)]
pub struct ClassTable {
    classes: FxHashMap<Box<str>, ClassDef>,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// A table preloaded with the parts of `java.lang` and `java.util` that
    /// control-flow construction refers to.
    pub fn with_java_lang() -> Self {
        let mut table = Self::new();
        let object = || Type::class_type(OBJECT);
        let exception = || Type::class_type("java.lang.Exception");
        let runtime = || Type::class_type("java.lang.RuntimeException");

        table.add_class(ClassDef::new(OBJECT));
        for name in [
            "java.lang.String",
            "java.lang.Throwable",
            "java.lang.Number",
            "java.lang.Boolean",
            "java.lang.Character",
        ] {
            table.add_class(ClassDef::new(name).extends(object()));
        }
        for kind in [
            PrimitiveKind::Byte,
            PrimitiveKind::Short,
            PrimitiveKind::Int,
            PrimitiveKind::Long,
            PrimitiveKind::Float,
            PrimitiveKind::Double,
        ] {
            table.add_class(
                ClassDef::new(kind.boxed_class()).extends(Type::class_type("java.lang.Number")),
            );
        }

        table.add_class(
            ClassDef::new("java.lang.Exception").extends(Type::class_type("java.lang.Throwable")),
        );
        table.add_class(
            ClassDef::new("java.lang.Error").extends(Type::class_type("java.lang.Throwable")),
        );
        table.add_class(ClassDef::new("java.lang.RuntimeException").extends(exception()));
        table.add_class(ClassDef::new("java.io.IOException").extends(exception()));
        for name in [
            "java.lang.NullPointerException",
            "java.lang.ArithmeticException",
            "java.lang.ClassCastException",
            "java.lang.IllegalArgumentException",
            "java.lang.IllegalStateException",
            "java.lang.ArrayIndexOutOfBoundsException",
        ] {
            table.add_class(ClassDef::new(name).extends(runtime()));
        }

        let iterator = ClassDef::new("java.util.Iterator").type_param("E");
        let element = iterator.type_var("E");
        table.add_class(
            iterator
                .extends(object())
                .method("hasNext", vec![], Type::BOOLEAN)
                .method("next", vec![], element),
        );

        let iterable = ClassDef::new("java.lang.Iterable").type_param("T");
        let element = iterable.type_var("T");
        table.add_class(iterable.extends(object()).method(
            "iterator",
            vec![],
            Type::generic("java.util.Iterator", [element]),
        ));

        for (name, supertype) in [
            ("java.util.Collection", "java.lang.Iterable"),
            ("java.util.List", "java.util.Collection"),
            ("java.util.ArrayList", "java.util.List"),
        ] {
            let class = ClassDef::new(name).type_param("E");
            let element = class.type_var("E");
            table.add_class(class.extends(Type::generic(supertype, [element])));
        }

        table
    }

    pub fn add_class(&mut self, class: ClassDef) -> &mut Self {
        self.classes.insert(class.name.clone(), class);
        self
    }

    pub fn class(&self, name: &str) -> Option<&ClassDef> {
        self.classes.get(name)
    }

    /// Direct supertypes of `declared` with its type arguments substituted.
    fn direct_supertypes(&self, declared: &DeclaredType) -> Vec<Type> {
        let Some(class) = self.class(&declared.name) else {
            return Vec::new();
        };
        let mut supertypes: Vec<Type> = class
            .supertypes
            .iter()
            .map(|supertype| supertype.substitute(&class.type_params, &declared.args))
            .collect();
        if supertypes.is_empty() && &*declared.name != OBJECT {
            supertypes.push(Type::class_type(OBJECT));
        }
        supertypes
    }

    fn is_subclass(&self, sub: &DeclaredType, sup: &DeclaredType) -> bool {
        if sub.name == sup.name {
            return sup.args.is_empty() || sub.args.is_empty() || sub.args == sup.args;
        }
        self.direct_supertypes(sub)
            .iter()
            .any(|supertype| match supertype {
                Type::Declared(declared) => self.is_subclass(declared, sup),
                _ => false,
            })
    }

    fn find_method(&self, declared: &DeclaredType, name: &str, arity: usize) -> Option<MethodRef> {
        if let Some(class) = self.class(&declared.name) {
            let found = class
                .methods
                .iter()
                .find(|method| &*method.name == name && method.params.len() == arity);
            if let Some(method) = found {
                let substitute = |ty: &Type| ty.substitute(&class.type_params, &declared.args);
                return Some(MethodRef {
                    owner: Type::Declared(declared.clone()),
                    name: method.name.clone(),
                    params: method.params.iter().map(substitute).collect(),
                    return_type: substitute(&method.return_type),
                    thrown: method.thrown.iter().map(substitute).collect(),
                    flags: method.flags,
                });
            }
        }
        self.direct_supertypes(declared)
            .iter()
            .find_map(|supertype| match supertype {
                Type::Declared(parent) => self.find_method(parent, name, arity),
                _ => None,
            })
    }
}

impl TypeQuery for ClassTable {
    fn is_subtype(&self, sub: &Type, sup: &Type) -> bool {
        match (sub, sup) {
            (Type::Primitive(from), Type::Primitive(to)) => from.widens_to(*to),
            (Type::Union(alternatives), _) => alternatives
                .iter()
                .all(|alternative| self.is_subtype(alternative, sup)),
            (_, Type::Union(alternatives)) => alternatives
                .iter()
                .any(|alternative| self.is_subtype(sub, alternative)),
            (Type::Variable(var), _) => sub == sup || self.is_subtype(&var.upper_bound, sup),
            (Type::Null, _) => sup.is_reference(),
            (_, Type::Declared(declared)) if sub.is_reference() && &*declared.name == OBJECT => {
                true
            }
            (Type::Declared(from), Type::Declared(to)) => self.is_subclass(from, to),
            (Type::Array(from), Type::Array(to)) => {
                from == to || (from.is_reference() && self.is_subtype(from, to))
            }
            _ => sub == sup,
        }
    }

    fn lookup_method(&self, receiver: &Type, name: &str, arity: usize) -> Option<MethodRef> {
        match receiver.upper_bound() {
            Type::Declared(declared) => self.find_method(declared, name, arity),
            _ => None,
        }
    }
}
