//! Precedence-climbing expression parser.
//!
//! Binding powers below reproduce a specific relative ordering and
//! associativity (see DESIGN.md for the derivation); their absolute
//! values are an implementation detail.

use crate::ast::expr::{
    AssignOp, BinOp, CallExpr, CallTarget, ChooseCase, ChooseExpr, ChoosePattern, ChoosePatternKind,
    ExprKind, ExprNode, Parameter, PipeExpr, RangeExpr, ResultFilterExpr, TableExpr, TableField,
    TableFieldKind, UnOp, UpdateOp,
};
use crate::ast::types::{Identifier, LiteralValue, NameRef, Type};
use crate::diagnostics::ParserErrorCode;
use crate::parser::desugar;
use crate::parser::types::parse_type_name;
use crate::parser::ParserContext;
use crate::span::SourceSpan;
use crate::token::{Token, TokenKind, TokenPayload};

/// Parses a full expression: ternary at the top, pipe below it, then the
/// binary-operator climb, then unary/suffix/primary.
pub fn parse_expression(ctx: &mut ParserContext) -> Option<ExprNode> {
    parse_ternary(ctx)
}

fn parse_ternary(ctx: &mut ParserContext) -> Option<ExprNode> {
    let cond = parse_pipe(ctx)?;
    if ctx.match_kind(TokenKind::Question).is_some() {
        let if_true = parse_ternary(ctx)?;
        ctx.expect(TokenKind::Colon, ParserErrorCode::ExpectedToken)?;
        let if_false = parse_ternary(ctx)?;
        let span = cond.span.to(if_false.span);
        return Some(ExprNode::new(
            span,
            ExprKind::Ternary { condition: cond.boxed(), if_true: if_true.boxed(), if_false: if_false.boxed() },
        ));
    }
    Some(cond)
}

/// `a |> b() |> c()` parses left-associatively:
/// each `|>` is folded into the running `lhs` before moving to the next.
fn parse_pipe(ctx: &mut ParserContext) -> Option<ExprNode> {
    let mut lhs = parse_binary(ctx, 0)?;
    while ctx.check(TokenKind::PipeOp) {
        ctx.advance();
        let limit = match (ctx.current().kind, ctx.current().payload) {
            (TokenKind::Number, TokenPayload::Number(n)) => {
                ctx.advance();
                n as u32
            }
            _ => 0,
        };
        let rhs = parse_binary(ctx, 0)?;
        let span = lhs.span.to(rhs.span);
        lhs = desugar_pipe(ctx, lhs, rhs, limit, span);
    }
    Some(lhs)
}

/// `lhs |> f` desugars to `lhs:each(f)` when
/// `lhs` is a range or an existing `:each(...)` call and `f` looks like a
/// function value. Otherwise produces a `PipeExpr`.
fn desugar_pipe(ctx: &mut ParserContext, lhs: ExprNode, rhs: ExprNode, limit: u32, span: SourceSpan) -> ExprNode {
    let lhs_is_each_chain = matches!(&lhs.kind, ExprKind::Range(_))
        || matches!(&lhs.kind, ExprKind::Call(CallExpr { target: CallTarget::Method(_, name), .. })
            if ctx.interner.resolve(name.symbol.expect("method identifiers always carry a symbol")) == "each");
    let rhs_is_function_value = matches!(
        &rhs.kind,
        ExprKind::Identifier(_) | ExprKind::Member { .. } | ExprKind::Index { .. } | ExprKind::Function(_)
    );
    if lhs_is_each_chain && rhs_is_function_value {
        return desugar::call_method(ctx, lhs, "each", vec![rhs], span);
    }
    ExprNode::new(span, ExprKind::Pipe(PipeExpr { lhs: lhs.boxed(), rhs: rhs.boxed(), limit }))
}

#[derive(Clone, Copy)]
enum OpKind {
    Bin(BinOp),
    In,
}

fn binding_power(kind: TokenKind) -> Option<(OpKind, u32, u32)> {
    use TokenKind::*;
    Some(match kind {
        OrToken => (OpKind::Bin(BinOp::LogicalOr), 10, 11),
        Presence => (OpKind::Bin(BinOp::IfEmpty), 10, 11),
        AndToken => (OpKind::Bin(BinOp::LogicalAnd), 20, 21),
        EqualEqual | IsToken => (OpKind::Bin(BinOp::Equal), 30, 31),
        NotEqual => (OpKind::Bin(BinOp::NotEqual), 30, 31),
        LessThan => (OpKind::Bin(BinOp::LessThan), 30, 31),
        LessEqual => (OpKind::Bin(BinOp::LessEqual), 30, 31),
        GreaterThan => (OpKind::Bin(BinOp::GreaterThan), 30, 31),
        GreaterEqual => (OpKind::Bin(BinOp::GreaterEqual), 30, 31),
        InToken => (OpKind::In, 30, 31),
        Pipe => (OpKind::Bin(BinOp::BitOr), 40, 41),
        Tilde => (OpKind::Bin(BinOp::BitXor), 50, 51),
        Ampersand => (OpKind::Bin(BinOp::BitAnd), 60, 61),
        ShiftLeft => (OpKind::Bin(BinOp::ShiftLeft), 70, 71),
        ShiftRight => (OpKind::Bin(BinOp::ShiftRight), 70, 71),
        Plus => (OpKind::Bin(BinOp::Add), 80, 81),
        Minus => (OpKind::Bin(BinOp::Sub), 80, 81),
        Cat => (OpKind::Bin(BinOp::Concat), 80, 80), // right-assoc: r_bp == l_bp
        Star => (OpKind::Bin(BinOp::Mul), 90, 91),
        Slash => (OpKind::Bin(BinOp::Div), 90, 91),
        Percent => (OpKind::Bin(BinOp::Mod), 90, 91),
        Caret => (OpKind::Bin(BinOp::Power), 100, 100), // right-assoc
        _ => return None,
    })
}

/// Precedence the operand of a unary operator is parsed at: high enough to
/// exclude `*`/`/`/`%` (so `-2*3` is `(-2)*3`) but low enough to admit `^`
/// (so `-2^2` is `-(2^2)`).
const UNARY_BP: u32 = 95;

fn parse_binary(ctx: &mut ParserContext, min_bp: u32) -> Option<ExprNode> {
    let mut lhs = parse_unary(ctx)?;
    loop {
        if ctx.check(TokenKind::Presence) && presence_is_postfix(ctx) {
            let tok = ctx.advance(); // '??'
            let span = lhs.span.to(tok.span);
            lhs = ExprNode::new(span, ExprKind::Presence { value: lhs.boxed() });
            break;
        }
        let Some((op, l_bp, r_bp)) = binding_power(ctx.current().kind) else { break };
        if l_bp < min_bp {
            break;
        }
        ctx.advance();
        let rhs = parse_binary(ctx, r_bp)?;
        let span = lhs.span.to(rhs.span);
        lhs = match op {
            OpKind::Bin(bin_op) => ExprNode::new(span, ExprKind::Binary { op: bin_op, left: lhs.boxed(), right: rhs.boxed() }),
            OpKind::In => desugar::in_desugar(ctx, lhs, rhs, span),
        };
    }
    Some(lhs)
}

/// Distinguishes the postfix presence operator (`expr ?? return|break|continue`,
/// the conditional-shorthand form) from the binary if-empty operator
/// (`a ?? b`) via a single-token lookahead: `??` is postfix only when
/// immediately followed by one of the three shorthand actions.
fn presence_is_postfix(ctx: &ParserContext) -> bool {
    matches!(ctx.peek(1).kind, TokenKind::ReturnToken | TokenKind::BreakToken | TokenKind::ContinueToken)
}

fn parse_unary(ctx: &mut ParserContext) -> Option<ExprNode> {
    let tok = ctx.current();
    let op = match tok.kind {
        TokenKind::NotToken => Some(UnOp::Not),
        TokenKind::Minus => Some(UnOp::Negate),
        TokenKind::Hash => Some(UnOp::Length),
        TokenKind::Tilde => Some(UnOp::BitNot),
        _ => None,
    };
    if let Some(op) = op {
        ctx.advance();
        let operand = parse_binary(ctx, UNARY_BP)?;
        let span = tok.span.to(operand.span);
        return Some(ExprNode::new(span, ExprKind::Unary { op, operand: operand.boxed() }));
    }
    if ctx.check(TokenKind::PlusPlus) {
        ctx.advance();
        let operand = parse_binary(ctx, UNARY_BP)?;
        let span = tok.span.to(operand.span);
        return Some(ExprNode::new(span, ExprKind::Update { op: UpdateOp::Increment, prefix: true, operand: operand.boxed() }));
    }
    parse_suffix_chain(ctx)
}

/// Parses a primary expression followed by any number of suffixes: member
/// access, safe navigation, indexing, calls, and postfix `++`/`??`
///.
fn parse_suffix_chain(ctx: &mut ParserContext) -> Option<ExprNode> {
    let mut expr = parse_primary(ctx)?;
    loop {
        expr = match ctx.current().kind {
            TokenKind::Dot => {
                ctx.advance();
                let name = parse_field_name(ctx)?;
                let span = expr.span.to(name.span);
                ExprNode::new(span, ExprKind::Member { table: expr.boxed(), name })
            }
            TokenKind::SafeField => {
                ctx.advance();
                let name = parse_field_name(ctx)?;
                let span = expr.span.to(name.span);
                ExprNode::new(span, ExprKind::SafeMember { table: expr.boxed(), name })
            }
            TokenKind::LeftBracket => {
                ctx.advance();
                let index = parse_expression(ctx)?;
                let close = ctx.expect(TokenKind::RightBracket, ParserErrorCode::UnclosedBracket)?;
                let span = expr.span.to(close.span);
                ExprNode::new(span, ExprKind::Index { table: expr.boxed(), index: index.boxed() })
            }
            TokenKind::SafeIndex => {
                ctx.advance();
                let index = parse_expression(ctx)?;
                let close = ctx.expect(TokenKind::RightBracket, ParserErrorCode::UnclosedBracket)?;
                let span = expr.span.to(close.span);
                ExprNode::new(span, ExprKind::SafeIndex { table: expr.boxed(), index: index.boxed() })
            }
            TokenKind::Colon => {
                ctx.advance();
                let name = parse_field_name(ctx)?;
                let (arguments, end_span) = parse_call_arguments(ctx)?;
                let span = expr.span.to(end_span);
                ExprNode::new(span, ExprKind::Call(CallExpr {
                    target: CallTarget::Method(expr.boxed(), name),
                    arguments,
                    forwards_multret: false,
                    result_type: None,
                    object_class_id: None,
                }))
            }
            TokenKind::SafeMethod => {
                ctx.advance();
                let name = parse_field_name(ctx)?;
                let (arguments, end_span) = parse_call_arguments(ctx)?;
                let span = expr.span.to(end_span);
                ExprNode::new(span, ExprKind::Call(CallExpr {
                    target: CallTarget::SafeMethod(expr.boxed(), name),
                    arguments,
                    forwards_multret: false,
                    result_type: None,
                    object_class_id: None,
                }))
            }
            TokenKind::LeftParen | TokenKind::String | TokenKind::LeftBrace => {
                let (arguments, end_span) = parse_call_arguments(ctx)?;
                let span = expr.span.to(end_span);
                ExprNode::new(span, ExprKind::Call(CallExpr {
                    target: CallTarget::Direct(expr.boxed()),
                    arguments,
                    forwards_multret: false,
                    result_type: None,
                    object_class_id: None,
                }))
            }
            TokenKind::PlusPlus => {
                let tok = ctx.advance();
                let span = expr.span.to(tok.span);
                ExprNode::new(span, ExprKind::Update { op: UpdateOp::Increment, prefix: false, operand: expr.boxed() })
            }
            _ => break,
        };
    }
    Some(expr)
}

fn parse_field_name(ctx: &mut ParserContext) -> Option<Identifier> {
    let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
    let sym = tok.interned().expect("Identifier token always carries a symbol");
    Some(Identifier::named(sym, tok.span))
}

/// Call argument lists come in three shapes: parenthesized, a single bare
/// string, or a single bare table.
fn parse_call_arguments(ctx: &mut ParserContext) -> Option<(Vec<ExprNode>, SourceSpan)> {
    match ctx.current().kind {
        TokenKind::LeftParen => {
            ctx.advance();
            let mut args = Vec::new();
            if !ctx.check(TokenKind::RightParen) {
                loop {
                    args.push(parse_expression(ctx)?);
                    if ctx.match_kind(TokenKind::Comma).is_none() {
                        break;
                    }
                }
            }
            let close = ctx.expect(TokenKind::RightParen, ParserErrorCode::UnclosedGroup)?;
            Some((args, close.span))
        }
        TokenKind::String => {
            let tok = ctx.advance();
            let sym = tok.interned().expect("String token always carries a symbol");
            Some((vec![ExprNode::new(tok.span, ExprKind::Literal(LiteralValue::Str(sym)))], tok.span))
        }
        TokenKind::LeftBrace => {
            let table = parse_table(ctx)?;
            let span = table.span;
            Some((vec![table], span))
        }
        _ => {
            ctx.error_at(ParserErrorCode::ExpectedExpression, "expected call arguments");
            None
        }
    }
}

fn parse_primary(ctx: &mut ParserContext) -> Option<ExprNode> {
    let tok = ctx.current();
    match tok.kind {
        TokenKind::LeftBracket => parse_result_filter(ctx),
        TokenKind::Number => {
            ctx.advance();
            let TokenPayload::Number(n) = tok.payload else { unreachable!() };
            Some(ExprNode::new(tok.span, ExprKind::Literal(LiteralValue::Num(n))))
        }
        TokenKind::String => {
            ctx.advance();
            let sym = tok.interned().expect("String token always carries a symbol");
            Some(ExprNode::new(tok.span, ExprKind::Literal(LiteralValue::Str(sym))))
        }
        TokenKind::TrueToken => {
            ctx.advance();
            Some(ExprNode::new(tok.span, ExprKind::Literal(LiteralValue::Bool(true))))
        }
        TokenKind::FalseToken => {
            ctx.advance();
            Some(ExprNode::new(tok.span, ExprKind::Literal(LiteralValue::Bool(false))))
        }
        TokenKind::Nil => {
            ctx.advance();
            Some(ExprNode::new(tok.span, ExprKind::Literal(LiteralValue::Nil)))
        }
        TokenKind::Dots => {
            ctx.advance();
            Some(ExprNode::new(tok.span, ExprKind::VarArg))
        }
        TokenKind::Choose => parse_choose(ctx),
        TokenKind::LessThan => parse_deferred_expr(ctx),
        TokenKind::ThunkToken => parse_thunk_primary(ctx),
        TokenKind::Function => parse_function_expr(ctx),
        TokenKind::Identifier if ctx.interner.resolve(tok.interned().unwrap()) == "array" && ctx.peek(1).kind == TokenKind::LessThan => {
            parse_typed_array(ctx)
        }
        TokenKind::Identifier => {
            ctx.advance();
            let sym = tok.interned().expect("Identifier token always carries a symbol");
            Some(ExprNode::new(tok.span, ExprKind::Identifier(NameRef { symbol: sym, span: tok.span })))
        }
        TokenKind::LeftParen => parse_parenthesized_or_arrow(ctx),
        TokenKind::LeftBrace => parse_table(ctx),
        _ => {
            ctx.error_at(ParserErrorCode::ExpectedExpression, format!("unexpected token {:?} in expression position", tok.kind));
            None
        }
    }
}

/// `(...)` is either a parenthesized expression, an empty-tuple error, or an
/// arrow-function parameter list. We look past the matching
/// `)` for `=>` to disambiguate without backtracking the whole expression.
fn parse_parenthesized_or_arrow(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.current().span;
    if looks_like_arrow_params(ctx) {
        return parse_arrow_function(ctx);
    }
    ctx.advance(); // '('
    if ctx.check(TokenKind::RightParen) {
        ctx.error_at(ParserErrorCode::ExpectedExpression, "empty parentheses are not a valid expression");
        return None;
    }
    let inner = parse_expression(ctx)?;
    let close = ctx.expect(TokenKind::RightParen, ParserErrorCode::UnclosedGroup)?;
    let _ = start;
    Some(ExprNode::new(inner.span.to(close.span), inner.kind))
}

/// Scans ahead from the current `(` for `) =>`, requiring every parameter in
/// between to be a bare identifier.
fn looks_like_arrow_params(ctx: &ParserContext) -> bool {
    debug_assert!(ctx.check(TokenKind::LeftParen));
    let mut depth = 0i32;
    let mut n = 0usize;
    loop {
        let tok = ctx.peek(n);
        match tok.kind {
            TokenKind::LeftParen => depth += 1,
            TokenKind::RightParen => {
                depth -= 1;
                if depth == 0 {
                    return ctx.peek(n + 1).kind == TokenKind::Arrow;
                }
            }
            TokenKind::Identifier | TokenKind::Comma => {}
            TokenKind::EndOfFile => return false,
            _ if depth == 1 => return false,
            _ => {}
        }
        n += 1;
        if n > 64 {
            return false;
        }
    }
}

fn parse_arrow_function(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.current().span;
    ctx.advance(); // '('
    let mut parameters = Vec::new();
    if !ctx.check(TokenKind::RightParen) {
        loop {
            let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
            let sym = tok.interned().expect("Identifier token always carries a symbol");
            parameters.push(Parameter { name: Identifier::named(sym, tok.span), ty: Type::Unknown, is_self: false });
            if ctx.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    ctx.expect(TokenKind::RightParen, ParserErrorCode::UnclosedGroup)?;
    ctx.expect(TokenKind::Arrow, ParserErrorCode::ExpectedToken)?;
    let return_type = if ctx.check(TokenKind::Identifier) && ctx.peek(1).kind == TokenKind::Colon {
        let ty = parse_type_name_inline(ctx);
        ctx.expect(TokenKind::Colon, ParserErrorCode::ExpectedToken)?;
        Some(ty)
    } else {
        None
    };
    if ctx.check(TokenKind::DoToken) {
        ctx.advance();
        let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
        let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
        let payload = desugar::arrow_function(parameters, body, return_type);
        return Some(ExprNode::new(start.to(end.span), ExprKind::Function(payload)));
    }
    let body_expr = parse_expression(ctx)?;
    let span = start.to(body_expr.span);
    let payload = desugar::arrow_function_from_expr(parameters, body_expr, return_type, span);
    Some(ExprNode::new(span, ExprKind::Function(payload)))
}

/// Reads a bare type name for the `=> T:` arrow annotation without
/// consuming the `:` that the caller still needs to check for ambiguity.
fn parse_type_name_inline(ctx: &mut ParserContext) -> Type {
    let tok = ctx.current();
    let sym = tok.interned().expect("Identifier token always carries a symbol");
    let name = ctx.interner.resolve(sym).to_string();
    ctx.advance();
    Type::from_name(&name).unwrap_or_else(|| Type::Object(ctx.classes.id_for(&name)))
}

fn parse_thunk_primary(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.advance().span; // 'thunk'
    ctx.expect(TokenKind::LeftParen, ParserErrorCode::ExpectedToken)?;
    ctx.expect(TokenKind::RightParen, ParserErrorCode::ExpectedToken)?;
    let return_type = if ctx.match_kind(TokenKind::Colon).is_some() { parse_type_name(ctx) } else { Type::Unknown };
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    let span = start.to(end.span);
    let payload = crate::ast::expr::FunctionExprPayload {
        parameters: vec![],
        is_vararg: false,
        is_thunk: true,
        thunk_return_type: return_type,
        return_types: Default::default(),
        body,
        annotations: vec![],
    };
    // An anonymous parameterless thunk used as a primary is auto-invoked
    // so the surrounding expression observes its return value.
    let thunk_expr = ExprNode::new(span, ExprKind::Function(payload));
    Some(desugar::call_direct(thunk_expr, vec![], span))
}

fn parse_function_expr(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.advance().span; // 'function'
    let (parameters, is_vararg) = crate::parser::statements::parse_parameter_list(ctx)?;
    let return_types = if ctx.match_kind(TokenKind::Colon).is_some() {
        crate::parser::types::parse_return_types(ctx)
    } else {
        Default::default()
    };
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    let span = start.to(end.span);
    Some(ExprNode::new(
        span,
        ExprKind::Function(crate::ast::expr::FunctionExprPayload {
            parameters,
            is_vararg,
            is_thunk: false,
            thunk_return_type: Type::Unknown,
            return_types,
            body,
            annotations: vec![],
        }),
    ))
}

/// `array<T[,size]>` / `array<T,size>{...}`. The
/// identifier `array` and the following `<` have already been peeked by the
/// caller; we re-consume both here.
fn parse_typed_array(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.advance().span; // 'array'
    ctx.expect(TokenKind::LessThan, ParserErrorCode::ExpectedToken)?;
    let type_tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedTypeName)?;
    let type_name = ctx.interner.resolve(type_tok.interned().unwrap()).to_string();
    let size = if ctx.match_kind(TokenKind::Comma).is_some() { Some(parse_expression(ctx)?) } else { None };
    let close = ctx.expect(TokenKind::GreaterThan, ParserErrorCode::ExpectedToken)?;
    let mut end_span = close.span;
    let initializers = if ctx.check(TokenKind::LeftBrace) {
        ctx.advance();
        let mut items = Vec::new();
        if !ctx.check(TokenKind::RightBrace) {
            loop {
                items.push(parse_expression(ctx)?);
                if ctx.match_kind(TokenKind::Comma).is_none() {
                    break;
                }
            }
        }
        let brace = ctx.expect(TokenKind::RightBrace, ParserErrorCode::UnclosedBrace)?;
        end_span = brace.span;
        Some(items)
    } else {
        None
    };
    let span = start.to(end_span);
    Some(desugar::typed_array_literal(ctx, desugar::ArrayTypeSpec { type_name, size, initializers }, span))
}

/// Deferred expression: `<{ e }>` or, with an explicit return type,
/// `<type{ e }>`. The closing `}>` is two primitive tokens (`RightBrace`
/// then `GreaterThan`), not a dedicated spelling — see the token-kind
/// design note. Desugars to an immediately invoked, parameterless thunk.
fn parse_deferred_expr(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.advance().span; // '<'
    let return_type = if ctx.check(TokenKind::LeftBrace) {
        Type::Unknown
    } else {
        parse_type_name(ctx)
    };
    ctx.expect(TokenKind::LeftBrace, ParserErrorCode::ExpectedToken)?;
    let body_expr = parse_expression(ctx)?;
    ctx.expect(TokenKind::RightBrace, ParserErrorCode::UnclosedBrace)?;
    let end = ctx.expect(TokenKind::GreaterThan, ParserErrorCode::ExpectedToken)?;
    let span = start.to(end.span);
    Some(desugar::deferred_thunk(body_expr, return_type, span))
}

/// `{...}` is a table literal, `{a..b}`/`{a...b}` a range; disambiguated by
/// scanning for `..`/`...` at brace depth zero before the first top-level
/// comma/field separator.
fn parse_table(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.current().span;
    if let Some(range) = try_parse_brace_range(ctx, start)? {
        return Some(range);
    }
    ctx.advance(); // '{'
    let mut fields = Vec::new();
    let mut has_array_part = false;
    while !ctx.check(TokenKind::RightBrace) {
        let field_span = ctx.current().span;
        if ctx.check(TokenKind::LeftBracket) {
            ctx.advance();
            let key = parse_expression(ctx)?;
            ctx.expect(TokenKind::RightBracket, ParserErrorCode::UnclosedBracket)?;
            ctx.expect(TokenKind::Equals, ParserErrorCode::ExpectedToken)?;
            let value = parse_expression(ctx)?;
            fields.push(TableField { kind: TableFieldKind::Computed, key: Some(key), name: None, value, span: field_span });
        } else if ctx.check(TokenKind::Identifier) && ctx.peek(1).kind == TokenKind::Colon {
            let name_tok = ctx.advance();
            let sym = name_tok.interned().unwrap();
            ctx.advance(); // ':'
            let value = parse_expression(ctx)?;
            fields.push(TableField {
                kind: TableFieldKind::Record,
                key: None,
                name: Some(Identifier::named(sym, name_tok.span)),
                value,
                span: field_span,
            });
        } else {
            let value = parse_expression(ctx)?;
            has_array_part = true;
            fields.push(TableField { kind: TableFieldKind::Array, key: None, name: None, value, span: field_span });
        }
        if ctx.match_kind(TokenKind::Comma).is_none() && ctx.match_kind(TokenKind::Semicolon).is_none() {
            break;
        }
    }
    let close = ctx.expect(TokenKind::RightBrace, ParserErrorCode::UnclosedBrace)?;
    Some(ExprNode::new(start.to(close.span), ExprKind::Table(TableExpr { fields, has_array_part })))
}

/// Returns `Some(Some(range))` if `{` opens a range literal, `Some(None)` if
/// it is an ordinary table (caller should fall through), or `None` on a
/// parse error. `{1..3}` / `{1...3}` are
/// ranges, `{'s' .. f(), 1}` is a table because a top-level comma appears
/// before any brace-depth-zero `..`/`...`.
fn try_parse_brace_range(ctx: &mut ParserContext, start: SourceSpan) -> Option<Option<ExprNode>> {
    let mut depth = 0i32;
    let mut n = 1usize; // skip the opening '{'
    loop {
        let tok = ctx.peek(n);
        match tok.kind {
            TokenKind::LeftBrace | TokenKind::LeftParen | TokenKind::LeftBracket => depth += 1,
            TokenKind::RightParen | TokenKind::RightBracket => depth -= 1,
            TokenKind::RightBrace if depth == 0 => return Some(None),
            TokenKind::RightBrace => depth -= 1,
            TokenKind::Comma | TokenKind::Semicolon if depth == 0 => return Some(None),
            TokenKind::Cat if depth == 0 => return Some(parse_range_literal(ctx, start, false).map(Some)),
            TokenKind::Dots if depth == 0 => return Some(parse_range_literal(ctx, start, true).map(Some)),
            TokenKind::EndOfFile => return Some(None),
            _ => {}
        }
        n += 1;
        if n > 4096 {
            return Some(None);
        }
    }
}

fn parse_range_literal(ctx: &mut ParserContext, start: SourceSpan, inclusive: bool) -> Option<ExprNode> {
    ctx.advance(); // '{'
    let from = parse_binary(ctx, 0)?;
    let sep = if inclusive { TokenKind::Dots } else { TokenKind::Cat };
    ctx.expect(sep, ParserErrorCode::BadRange)?;
    let to = parse_binary(ctx, 0)?;
    let close = ctx.expect(TokenKind::RightBrace, ParserErrorCode::UnclosedBrace)?;
    let _ = start;
    Some(ExprNode::new(from.span.to(close.span), ExprKind::Range(RangeExpr { start: from.boxed(), stop: to.boxed(), inclusive })))
}

/// `[pattern]expr`. The
/// pattern is a sequence of `_` (drop) and `*` (keep) up to 64 positions;
/// an all-keep, non-overflowing mask is optimized away entirely.
fn parse_result_filter(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.advance().span; // '['
    let mut mask: u64 = 0;
    let mut count: u8 = 0;
    let mut trailing_keep = false;
    while !ctx.check(TokenKind::RightBracket) {
        if ctx.match_kind(TokenKind::Star).is_some() {
            if count < 64 {
                mask |= 1 << count;
            }
            trailing_keep = true;
        } else if is_blank_identifier(ctx) {
            ctx.advance();
            trailing_keep = false;
        } else {
            ctx.error_at(ParserErrorCode::ExpectedExpression, "expected '_' or '*' in result filter pattern");
            return None;
        }
        count += 1;
        if count > 64 {
            ctx.error_at(ParserErrorCode::TooManyCounters, "result filter pattern exceeds 64 positions");
            return None;
        }
    }
    ctx.expect(TokenKind::RightBracket, ParserErrorCode::UnclosedBracket)?;
    let call = parse_suffix_chain(ctx)?;
    let span = start.to(call.span);
    let all_keep = count > 0 && mask == (1u64 << count) - 1;
    if all_keep && trailing_keep {
        return Some(call);
    }
    Some(ExprNode::new(
        span,
        ExprKind::ResultFilter(ResultFilterExpr { call: call.boxed(), keep_mask: mask, explicit_count: count, trailing_keep }),
    ))
}

fn is_blank_identifier(ctx: &ParserContext) -> bool {
    let tok = ctx.current();
    tok.kind == TokenKind::Identifier && tok.interned().map(|s| ctx.interner.resolve(s) == "_").unwrap_or(false)
}

/// `choose` expression. Grammar used here:
/// `choose e[, e...] { pattern[, pattern...] [when guard] -> result ... }`.
fn parse_choose(ctx: &mut ParserContext) -> Option<ExprNode> {
    let start = ctx.advance().span; // 'choose'
    let mut scrutinees = vec![parse_binary(ctx, 0)?];
    while ctx.match_kind(TokenKind::Comma).is_some() {
        scrutinees.push(parse_binary(ctx, 0)?);
    }
    let is_tuple = scrutinees.len() > 1;
    ctx.expect(TokenKind::LeftBrace, ParserErrorCode::ExpectedToken)?;
    let mut cases = Vec::new();
    while !ctx.check(TokenKind::RightBrace) {
        cases.push(parse_choose_case(ctx, is_tuple, scrutinees.len())?);
        ctx.match_kind(TokenKind::Comma);
        ctx.match_kind(TokenKind::Semicolon);
    }
    let end = ctx.expect(TokenKind::RightBrace, ParserErrorCode::UnclosedBrace)?;
    let span = start.to(end.span);
    let expr = if is_tuple {
        ChooseExpr { scrutinee: None, scrutinee_tuple: scrutinees, cases }
    } else {
        ChooseExpr { scrutinee: Some(scrutinees.remove(0).boxed()), scrutinee_tuple: vec![], cases }
    };
    Some(ExprNode::new(span, ExprKind::Choose(expr)))
}

fn parse_choose_case(ctx: &mut ParserContext, is_tuple: bool, arity: usize) -> Option<ChooseCase> {
    let mut tuple_patterns = Vec::new();
    let mut pattern = None;
    if is_tuple {
        for i in 0..arity {
            tuple_patterns.push(parse_choose_pattern(ctx)?);
            if i + 1 < arity {
                ctx.expect(TokenKind::Comma, ParserErrorCode::ExpectedToken)?;
            }
        }
    } else {
        pattern = Some(parse_choose_pattern(ctx)?);
    }
    let guard = if ctx.match_kind(TokenKind::When).is_some() { Some(parse_expression(ctx)?) } else { None };
    ctx.expect(TokenKind::CaseArrow, ParserErrorCode::ExpectedToken)?;
    let result = crate::ast::expr::ChooseResult::Expr(parse_expression(ctx)?.boxed());
    Some(ChooseCase { pattern, tuple_patterns, guard, result })
}

/// A leading relational operator (`<`, `<=`, `>`, `>=`) starts a
/// pattern rather than a dangling comparison only if a `->` or `when`
/// follows at bracket depth zero before the case's terminator. Peeks up to
/// 100 tokens before giving up.
fn looks_like_relational_pattern(ctx: &ParserContext) -> bool {
    let mut depth = 0i32;
    for n in 0..100 {
        match ctx.peek(n).kind {
            TokenKind::LeftParen | TokenKind::LeftBrace | TokenKind::LeftBracket => depth += 1,
            TokenKind::RightParen | TokenKind::RightBrace | TokenKind::RightBracket if depth == 0 => return false,
            TokenKind::RightParen | TokenKind::RightBrace | TokenKind::RightBracket => depth -= 1,
            TokenKind::CaseArrow | TokenKind::When if depth == 0 => return true,
            TokenKind::Comma | TokenKind::Semicolon if depth == 0 => return false,
            TokenKind::EndOfFile => return false,
            _ => {}
        }
    }
    false
}

fn parse_choose_pattern(ctx: &mut ParserContext) -> Option<ChoosePattern> {
    let start = ctx.current().span;
    if is_blank_identifier(ctx) {
        ctx.advance();
        return Some(ChoosePattern { kind: ChoosePatternKind::Wildcard, span: start });
    }
    let rel_op = match ctx.current().kind {
        TokenKind::LessThan => Some(BinOp::LessThan),
        TokenKind::LessEqual => Some(BinOp::LessEqual),
        TokenKind::GreaterThan => Some(BinOp::GreaterThan),
        TokenKind::GreaterEqual => Some(BinOp::GreaterEqual),
        TokenKind::EqualEqual => Some(BinOp::Equal),
        TokenKind::NotEqual => Some(BinOp::NotEqual),
        _ => None,
    };
    if let Some(op) = rel_op {
        if looks_like_relational_pattern(ctx) {
            ctx.advance();
            let value = parse_binary(ctx, UNARY_BP)?;
            let span = start.to(value.span);
            return Some(ChoosePattern { kind: ChoosePatternKind::Relational { op, value: value.boxed() }, span });
        }
    }
    if ctx.check(TokenKind::Identifier) && matches!(ctx.peek(1).kind, TokenKind::CaseArrow | TokenKind::When | TokenKind::Comma) {
        let tok = ctx.advance();
        let sym = tok.interned().unwrap();
        return Some(ChoosePattern { kind: ChoosePatternKind::Binding(Identifier::named(sym, tok.span)), span: start });
    }
    let expr = parse_binary(ctx, 0)?;
    let span = expr.span;
    let kind = match (&expr.kind, is_range_brace(ctx)) {
        (ExprKind::Literal(lit), _) => ChoosePatternKind::Literal(*lit),
        (ExprKind::Range(r), _) => ChoosePatternKind::Range(r.clone()),
        _ => ChoosePatternKind::Expression(expr.boxed()),
    };
    Some(ChoosePattern { kind, span })
}

fn is_range_brace(_ctx: &ParserContext) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;
    use crate::parser::test_support::Harness;

    fn expr_of(block: &crate::ast::BlockStmt) -> &ExprNode {
        match &block.statements[0].kind {
            crate::ast::StmtKind::Expression(e) => e,
            other => panic!("expected expression statement, got {other:?}"),
        }
    }

    #[test]
    fn power_is_right_associative() {
        let mut h = Harness::new();
        let block = h.parse("2 ^ 3 ^ 2");
        let ExprKind::Binary { op: BinOp::Power, right, .. } = &expr_of(&block).kind else { panic!() };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Power, .. }));
    }

    #[test]
    fn concat_is_right_associative() {
        let mut h = Harness::new();
        let block = h.parse(r#""a" .. "b" .. "c""#);
        let ExprKind::Binary { op: BinOp::Concat, right, .. } = &expr_of(&block).kind else { panic!() };
        assert!(matches!(right.kind, ExprKind::Binary { op: BinOp::Concat, .. }));
    }

    #[test]
    fn shift_binds_tighter_than_bitand() {
        let mut h = Harness::new();
        let block = h.parse("a << b & c");
        let ExprKind::Binary { op: BinOp::BitAnd, left, .. } = &expr_of(&block).kind else { panic!() };
        assert!(matches!(left.kind, ExprKind::Binary { op: BinOp::ShiftLeft, .. }));
    }

    #[test]
    fn ternary_binds_looser_than_comparison() {
        let mut h = Harness::new();
        let block = h.parse("x > 0 ? a : b");
        let ExprKind::Ternary { condition, .. } = &expr_of(&block).kind else { panic!() };
        assert!(matches!(condition.kind, ExprKind::Binary { op: BinOp::GreaterThan, .. }));
    }

    #[test]
    fn pipe_is_left_associative() {
        let mut h = Harness::new();
        let block = h.parse("a |> b() |> c()");
        let ExprKind::Pipe(outer) = &expr_of(&block).kind else { panic!() };
        assert!(matches!(outer.lhs.kind, ExprKind::Pipe(_)));
    }

    #[test]
    fn result_filter_all_keep_unwraps() {
        let mut h = Harness::new();
        let block = h.parse("[*]f()");
        assert!(matches!(expr_of(&block).kind, ExprKind::Call(_)));
    }

    #[test]
    fn result_filter_drop_first_wraps() {
        let mut h = Harness::new();
        let block = h.parse("[_*]f()");
        let ExprKind::ResultFilter(filter) = &expr_of(&block).kind else { panic!() };
        assert_eq!(filter.explicit_count, 2);
        assert!(filter.trailing_keep);
    }

    #[test]
    fn in_operator_desugars_to_contains() {
        let mut h = Harness::new();
        let block = h.parse("x in r");
        let ExprKind::Call(call) = &expr_of(&block).kind else { panic!() };
        let CallTarget::Method(_, name) = &call.target else { panic!() };
        assert_eq!(h.interner.resolve(name.symbol.unwrap()), "contains");
    }

    #[test]
    fn deferred_expr_desugars_to_invoked_thunk() {
        let mut h = Harness::new();
        let block = h.parse("<{ 1 + 2 }>");
        let ExprKind::Call(call) = &expr_of(&block).kind else { panic!() };
        let CallTarget::Direct(target) = &call.target else { panic!() };
        let ExprKind::Function(payload) = &target.kind else { panic!() };
        assert!(payload.is_thunk);
        assert!(matches!(payload.body.statements[0].kind, StmtKind::Return(_)));
    }

    #[test]
    fn typed_deferred_expr_carries_return_type() {
        let mut h = Harness::new();
        let block = h.parse("<num{ 1 }>");
        let ExprKind::Call(call) = &expr_of(&block).kind else { panic!() };
        let CallTarget::Direct(target) = &call.target else { panic!() };
        let ExprKind::Function(payload) = &target.kind else { panic!() };
        assert_eq!(payload.thunk_return_type, Type::Num);
    }

    /// Scenario C: `array<num, 5> { 1, 2 }` needs a resize (literal size 5
    /// exceeds the 2 initializers given), so it lowers to an IIFE whose body
    /// declares `_arr` via `array.of(...)`, calls `array.resize(_arr, 5)` and
    /// returns `_arr` — all through dot-call syntax, not `:`-method calls.
    #[test]
    fn typed_array_with_resize_uses_dot_calls() {
        let mut h = Harness::new();
        let block = h.parse("local a = array<num, 5> { 1, 2 }");
        let StmtKind::LocalDecl(decl) = &block.statements[0].kind else { panic!() };
        let ExprKind::Call(iife_call) = &decl.values[0].kind else { panic!() };
        let CallTarget::Direct(iife_target) = &iife_call.target else { panic!() };
        let ExprKind::Function(payload) = &iife_target.kind else { panic!() };
        assert_eq!(payload.body.statements.len(), 3);

        let StmtKind::LocalDecl(arr_decl) = &payload.body.statements[0].kind else { panic!() };
        let ExprKind::Call(of_call) = &arr_decl.values[0].kind else { panic!() };
        let CallTarget::Direct(of_target) = &of_call.target else { panic!() };
        let ExprKind::Member { name, .. } = &of_target.kind else { panic!() };
        assert_eq!(h.interner.resolve(name.symbol.unwrap()), "of");
        assert_eq!(of_call.arguments.len(), 3); // "num", 1, 2

        let StmtKind::Expression(resize_expr) = &payload.body.statements[1].kind else { panic!() };
        let ExprKind::Call(resize_call) = &resize_expr.kind else { panic!() };
        let CallTarget::Direct(resize_target) = &resize_call.target else { panic!() };
        let ExprKind::Member { name, .. } = &resize_target.kind else { panic!() };
        assert_eq!(h.interner.resolve(name.symbol.unwrap()), "resize");

        assert!(matches!(payload.body.statements[2].kind, StmtKind::Return(_)));
    }

    #[test]
    fn typed_array_without_resize_skips_iife() {
        let mut h = Harness::new();
        let block = h.parse("local a = array<num, 2> { 1, 2 }");
        let StmtKind::LocalDecl(decl) = &block.statements[0].kind else { panic!() };
        let ExprKind::Call(of_call) = &decl.values[0].kind else { panic!() };
        let CallTarget::Direct(of_target) = &of_call.target else { panic!() };
        let ExprKind::Member { name, .. } = &of_target.kind else { panic!() };
        assert_eq!(h.interner.resolve(name.symbol.unwrap()), "of");
    }
}
