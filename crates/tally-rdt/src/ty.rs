//! Type descriptors attached to RDT nodes.

use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    String,
    Number,
    Boolean,
}

impl Primitive {
    pub fn from_name(name: &str) -> Option<Primitive> {
        match name {
            "string" => Some(Primitive::String),
            "number" => Some(Primitive::Number),
            "boolean" => Some(Primitive::Boolean),
            _ => None,
        }
    }
}

/// The inferred or declared type of a node.
///
/// `Named` refers to a table definition by name and is expanded lazily by
/// the type engine. `Binding` is the type of a `let`: the bound value and
/// the type of the expression it scopes over.
#[derive(Debug, Clone, PartialEq)]
pub enum TypeDef {
    Primitive(Primitive),
    Named(String),
    Context(String),
    Function {
        params: Vec<(String, TypeDef)>,
        returns: Box<TypeDef>,
    },
    Object(BTreeMap<String, TypeDef>),
    Array(Box<TypeDef>),
    Binding {
        value: Box<TypeDef>,
        next: Box<TypeDef>,
    },
    Unknown,
    /// Nodes that have no value, such as the root or a member name.
    None,
}

impl TypeDef {
    pub fn number() -> TypeDef {
        TypeDef::Primitive(Primitive::Number)
    }

    pub fn boolean() -> TypeDef {
        TypeDef::Primitive(Primitive::Boolean)
    }

    pub fn string() -> TypeDef {
        TypeDef::Primitive(Primitive::String)
    }

    pub fn array(elem: TypeDef) -> TypeDef {
        TypeDef::Array(Box::new(elem))
    }

    pub fn function(params: Vec<(String, TypeDef)>, returns: TypeDef) -> TypeDef {
        TypeDef::Function {
            params,
            returns: Box::new(returns),
        }
    }

    /// `number`, `Transaction`, `string[]`...
    pub fn from_annotation(base: &str, array: bool) -> TypeDef {
        let elem = match Primitive::from_name(base) {
            Some(p) => TypeDef::Primitive(p),
            None => TypeDef::Named(base.to_string()),
        };
        if array {
            TypeDef::array(elem)
        } else {
            elem
        }
    }

    pub fn is_primitive(&self, p: Primitive) -> bool {
        matches!(self, TypeDef::Primitive(q) if *q == p)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, TypeDef::Unknown)
    }

    /// True when no `Unknown` appears anywhere inside.
    pub fn is_complete(&self) -> bool {
        match self {
            TypeDef::Unknown => false,
            TypeDef::Primitive(_) | TypeDef::Named(_) | TypeDef::Context(_) | TypeDef::None => {
                true
            }
            TypeDef::Function { params, returns } => {
                params.iter().all(|(_, t)| t.is_complete()) && returns.is_complete()
            }
            TypeDef::Object(fields) => fields.values().all(TypeDef::is_complete),
            TypeDef::Array(elem) => elem.is_complete(),
            TypeDef::Binding { value, next } => value.is_complete() && next.is_complete(),
        }
    }

    /// The type a node contributes as an expression: a binding yields the
    /// type of the expression it scopes over.
    pub fn effective(&self) -> &TypeDef {
        match self {
            TypeDef::Binding { next, .. } => next.effective(),
            other => other,
        }
    }

    /// The type a reference to this binding site sees.
    pub fn bound_value(&self) -> &TypeDef {
        match self {
            TypeDef::Binding { value, .. } => value.effective(),
            other => other,
        }
    }

    /// Every table name mentioned inside.
    pub fn named_tables(&self) -> Vec<&str> {
        let mut out = Vec::new();
        self.collect_named(&mut out);
        out
    }

    fn collect_named<'a>(&'a self, out: &mut Vec<&'a str>) {
        match self {
            TypeDef::Named(name) => out.push(name),
            TypeDef::Function { params, returns } => {
                for (_, t) in params {
                    t.collect_named(out);
                }
                returns.collect_named(out);
            }
            TypeDef::Object(fields) => fields.values().for_each(|t| t.collect_named(out)),
            TypeDef::Array(elem) => elem.collect_named(out),
            TypeDef::Binding { value, next } => {
                value.collect_named(out);
                next.collect_named(out);
            }
            TypeDef::Primitive(_) | TypeDef::Context(_) | TypeDef::Unknown | TypeDef::None => {}
        }
    }
}

impl fmt::Display for TypeDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeDef::Primitive(Primitive::String) => write!(f, "string"),
            TypeDef::Primitive(Primitive::Number) => write!(f, "number"),
            TypeDef::Primitive(Primitive::Boolean) => write!(f, "boolean"),
            TypeDef::Named(name) => write!(f, "{}", name),
            TypeDef::Context(name) => write!(f, "${}", name),
            TypeDef::Function { params, returns } => {
                write!(f, "(")?;
                for (i, (name, ty)) in params.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}: {}", name, ty)?;
                }
                write!(f, ") -> {}", returns)
            }
            TypeDef::Object(fields) => {
                write!(f, "{{")?;
                for (i, (name, ty)) in fields.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, " {}: {}", name, ty)?;
                }
                if fields.is_empty() {
                    write!(f, "}}")
                } else {
                    write!(f, " }}")
                }
            }
            TypeDef::Array(elem) => write!(f, "{}[]", elem),
            TypeDef::Binding { value, next } => write!(f, "let {} in {}", value, next),
            TypeDef::Unknown => write!(f, "?"),
            TypeDef::None => write!(f, "none"),
        }
    }
}
