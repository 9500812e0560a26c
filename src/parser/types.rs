//! Parsing of type annotations: a bare type name after `:`,
//! or a parenthesized return-type list `:<t1, t2, …, t8[, ...]>`.

use crate::ast::expr::{FunctionReturnTypes, MAX_RETURN_SLOTS};
use crate::ast::types::Type;
use crate::diagnostics::ParserErrorCode;
use crate::parser::ParserContext;
use crate::token::TokenKind;
use std::collections::HashMap;

/// Assigns small integer ids to `Object` class names seen in type
/// annotations. Downstream bytecode emission (out of scope here) may use a
/// different numbering; what matters to this core is that two occurrences
/// of the same class name compare equal and that `Host::class_id_to_name` can render a diagnostic.
#[derive(Debug, Default)]
pub struct ClassRegistry {
    ids: HashMap<String, u32>,
}

impl ClassRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id_for(&mut self, name: &str) -> u32 {
        if let Some(id) = self.ids.get(name) {
            return *id;
        }
        let id = self.ids.len() as u32;
        self.ids.insert(name.to_string(), id);
        id
    }
}

/// Parses a single type name (caller has already consumed the leading `:`).
pub fn parse_type_name(ctx: &mut ParserContext) -> Type {
    let tok = ctx.current();
    if tok.kind != TokenKind::Identifier {
        ctx.error_at(ParserErrorCode::ExpectedTypeName, "expected a type name");
        return Type::Unknown;
    }
    let sym = tok.interned().expect("Identifier token always carries a symbol");
    let name = ctx.interner.resolve(sym).to_string();
    ctx.advance();
    match Type::from_name(&name) {
        Some(ty) => ty,
        None => Type::Object(ctx.classes.id_for(&name)),
    }
}

/// Parses the return-type annotation after the parameter list:
/// `:type` or `:<t1, t2, …[, ...]>`. Caller has already consumed the `:`.
/// Requesting a 9th explicit type forces slot 7 to `Any` and silently
/// skips the rest.
pub fn parse_return_types(ctx: &mut ParserContext) -> FunctionReturnTypes {
    let mut returns = FunctionReturnTypes { is_explicit: true, ..Default::default() };
    if ctx.match_kind(TokenKind::LessThan).is_some() {
        loop {
            if ctx.match_kind(TokenKind::Dots).is_some() {
                returns.is_variadic = true;
                break;
            }
            let ty = parse_type_name(ctx);
            let _ = returns.push(ty);
            if returns.count as usize == MAX_RETURN_SLOTS && !ctx.check(TokenKind::GreaterThan) {
                // stay in sync with any further names the overflow rule drops
            }
            if ctx.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
        ctx.expect(TokenKind::GreaterThan, ParserErrorCode::ExpectedToken);
    } else {
        let ty = parse_type_name(ctx);
        returns.push(ty);
    }
    returns
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn class_registry_is_stable_per_name() {
        let mut classes = ClassRegistry::new();
        let a = classes.id_for("Widget");
        let b = classes.id_for("Widget");
        let c = classes.id_for("Other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
