//! Semantic type tags, literal values and identifiers shared by the parser
//! and the type analyzer.

use crate::interner::InternedStr;
use crate::span::SourceSpan;

/// The semantic type tag attached to identifiers, inferred expressions and
/// function return slots. `Unknown` means "no annotation was present";
/// `Any` means "explicitly untyped" — the two must never be conflated,
/// since only the latter participates in fixation as a deliberate escape
/// hatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Type {
    #[default]
    Unknown,
    Any,
    Nil,
    Bool,
    Num,
    Str,
    Table,
    Array,
    Func,
    Object(u32),
}

impl Type {
    pub fn from_name(name: &str) -> Option<Type> {
        Some(match name {
            "any" => Type::Any,
            "nil" => Type::Nil,
            "bool" => Type::Bool,
            "num" => Type::Num,
            "str" => Type::Str,
            "table" => Type::Table,
            "array" => Type::Array,
            "func" => Type::Func,
            _ => return None,
        })
    }

    pub fn is_concrete(self) -> bool {
        !matches!(self, Type::Unknown | Type::Any)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LiteralValue {
    Nil,
    Bool(bool),
    Num(f64),
    Str(InternedStr),
}

/// `{symbol, span, is_blank, type, has_close, has_const}`.
/// `symbol` is `None` exactly when `is_blank` (the source used `_`).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Identifier {
    pub symbol: Option<InternedStr>,
    pub span: SourceSpan,
    pub is_blank: bool,
    pub ty: Type,
    pub has_close: bool,
    pub has_const: bool,
}

impl Identifier {
    pub fn named(symbol: InternedStr, span: SourceSpan) -> Self {
        Self { symbol: Some(symbol), span, is_blank: false, ty: Type::Unknown, has_close: false, has_const: false }
    }

    pub fn blank(span: SourceSpan) -> Self {
        Self { symbol: None, span, is_blank: true, ty: Type::Unknown, has_close: false, has_const: false }
    }
}

/// A use-site reference to a name; resolution to a declaration happens in
/// the type analyzer, not during parsing.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NameRef {
    pub symbol: InternedStr,
    pub span: SourceSpan,
}
