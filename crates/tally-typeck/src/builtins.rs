//! Members available on array types.
//!
//! ```text
//! T[].filter  : ((row: T) -> boolean) -> T[]
//! T[].include : ((row: T) -> boolean) -> boolean
//! T[].reduce  : ((acc: A, row: T) -> A, A) -> A
//! ```
//!
//! `reduce` is generic in its accumulator; callers supply `A` from the
//! reducer's annotation or the initial value.

use tally_rdt::TypeDef;

pub const ARRAY_MEMBERS: &[&str] = &["filter", "include", "reduce"];

#[derive(Debug, Clone, PartialEq)]
pub enum ArrayMember {
    Known(TypeDef),
    /// `reduce` before its accumulator type is known.
    Pending,
    Missing,
}

fn predicate(elem: &TypeDef) -> TypeDef {
    TypeDef::function(vec![("row".into(), elem.clone())], TypeDef::boolean())
}

pub fn array_member(elem: &TypeDef, member: &str, accumulator: Option<TypeDef>) -> ArrayMember {
    match member {
        "filter" => ArrayMember::Known(TypeDef::function(
            vec![("predicate".into(), predicate(elem))],
            TypeDef::array(elem.clone()),
        )),
        "include" => ArrayMember::Known(TypeDef::function(
            vec![("predicate".into(), predicate(elem))],
            TypeDef::boolean(),
        )),
        "reduce" => match accumulator {
            Some(acc) => {
                let reducer = TypeDef::function(
                    vec![("acc".into(), acc.clone()), ("row".into(), elem.clone())],
                    acc.clone(),
                );
                ArrayMember::Known(TypeDef::function(
                    vec![("reducer".into(), reducer), ("initial".into(), acc.clone())],
                    acc,
                ))
            }
            None => ArrayMember::Pending,
        },
        _ => ArrayMember::Missing,
    }
}
