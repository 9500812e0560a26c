//! Statement dispatch and the per-statement-kind parsers.

use crate::ast::expr::{AnnotationEntry, AssignOp, FunctionExprPayload, Parameter};
use crate::ast::stmt::{
    AssignmentStmt, CheckStmt, ConditionalShorthandStmt, DeferStmt, ExceptClause, FunctionNamePath, GenericForStmt,
    IfClause, IfStmt, LocalDeclStmt, LoopStmtPayload, LoopStyle, NumericForStmt, RaiseStmt, ReturnStmt, ShorthandAction,
    StmtKind, StmtNode, TryExceptStmt,
};
use crate::ast::types::{Identifier, LiteralValue, Type};
use crate::ast::ExprKind;
use crate::diagnostics::ParserErrorCode;
use crate::parser::expressions::parse_expression;
use crate::parser::types::parse_type_name;
use crate::parser::ParserContext;
use crate::span::SourceSpan;
use crate::token::TokenKind;

/// Single switch on the current token kind. The identifier
/// case carries one subtlety: an identifier
/// immediately followed by `<const>`/`<close>` (optionally with `:type` in
/// between) is an *implicit local declaration*; every other identifier
/// start falls through to an expression statement.
pub fn parse_statement(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.current().span;
    match ctx.current().kind {
        TokenKind::Semicolon => {
            ctx.advance();
            Some(StmtNode::new(start, StmtKind::Expression(crate::ast::ExprNode::new(start, ExprKind::Literal(LiteralValue::Nil)))))
        }
        TokenKind::Local => parse_local_or_global(ctx, false),
        TokenKind::Global => parse_local_or_global(ctx, true),
        TokenKind::Function => parse_function_stmt(ctx),
        TokenKind::If => parse_if_stmt(ctx),
        TokenKind::WhileToken => parse_while_stmt(ctx),
        TokenKind::Repeat => parse_repeat_stmt(ctx),
        TokenKind::For => parse_for_stmt(ctx),
        TokenKind::DoToken => parse_do_stmt(ctx),
        TokenKind::DeferToken => parse_defer_stmt(ctx),
        TokenKind::ReturnToken => parse_return_stmt(ctx),
        TokenKind::BreakToken => {
            ctx.advance();
            Some(StmtNode::new(start, StmtKind::Break))
        }
        TokenKind::ContinueToken => {
            ctx.advance();
            Some(StmtNode::new(start, StmtKind::Continue))
        }
        TokenKind::TryToken => parse_try_stmt(ctx),
        TokenKind::RaiseToken => parse_raise_stmt(ctx),
        TokenKind::CheckToken => parse_check_stmt(ctx),
        TokenKind::ImportToken => crate::parser::imports::parse_import_stmt(ctx),
        TokenKind::NamespaceToken => parse_namespace_stmt(ctx),
        TokenKind::CompileIf => parse_compile_if(ctx),
        TokenKind::Annotate => parse_annotated_stmt(ctx),
        TokenKind::Identifier if is_implicit_local_decl(ctx) => parse_implicit_local_decl(ctx),
        _ => parse_expr_or_assignment_or_shorthand(ctx),
    }
}

/// `@name[(args)] ... @name[(args)] function ... end`: one or more
/// annotations attached to the function declaration that follows them.
/// Attaching an annotation to anything else is a parse error — annotations
/// are function metadata, not a general statement prefix.
fn parse_annotated_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.current().span;
    let mut annotations = Vec::new();
    while ctx.check(TokenKind::Annotate) {
        ctx.advance();
        let name_tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
        let name = Identifier::named(name_tok.interned()?, name_tok.span);
        let arguments = if ctx.check(TokenKind::LeftParen) {
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
            ctx.expect(TokenKind::RightParen, ParserErrorCode::UnclosedGroup)?;
            args
        } else {
            Vec::new()
        };
        annotations.push(AnnotationEntry { name, arguments });
    }
    let mut stmt = parse_statement(ctx)?;
    match &mut stmt.kind {
        StmtKind::Function { function, .. } | StmtKind::LocalFunction { function, .. } => {
            function.annotations = annotations;
        }
        _ => {
            ctx.diagnostics.push_error(
                ParserErrorCode::UnexpectedToken,
                "annotations may only precede a function declaration",
                start,
            );
        }
    }
    stmt.span = start.to(stmt.span);
    Some(stmt)
}

fn assign_op_for(kind: TokenKind) -> Option<AssignOp> {
    match kind {
        TokenKind::Equals => Some(AssignOp::Plain),
        TokenKind::IfEmptyEquals => Some(AssignOp::IfEmpty),
        TokenKind::IfNilEquals => Some(AssignOp::IfNil),
        _ => None,
    }
}

fn parse_name_list(ctx: &mut ParserContext) -> Option<Vec<Identifier>> {
    let mut names = vec![parse_one_name(ctx)?];
    while ctx.match_kind(TokenKind::Comma).is_some() {
        names.push(parse_one_name(ctx)?);
    }
    Some(names)
}

fn parse_one_name(ctx: &mut ParserContext) -> Option<Identifier> {
    if is_blank_identifier(ctx) {
        let tok = ctx.advance();
        let mut id = Identifier::blank(tok.span);
        parse_attributes_and_type(ctx, &mut id);
        return Some(id);
    }
    let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
    let sym = tok.interned().expect("Identifier token always carries a symbol");
    let mut id = Identifier::named(sym, tok.span);
    parse_attributes_and_type(ctx, &mut id);
    Some(id)
}

fn is_blank_identifier(ctx: &ParserContext) -> bool {
    let tok = ctx.current();
    tok.kind == TokenKind::Identifier && tok.interned().map(|s| ctx.interner.resolve(s) == "_").unwrap_or(false)
}

/// Parses the `<const>`/`<close>` attribute (at most one, setting
/// `Identifier.has_close`/`has_const`) and an optional `:type` annotation
/// that may appear before or after it.
fn parse_attributes_and_type(ctx: &mut ParserContext, id: &mut Identifier) {
    loop {
        if ctx.check(TokenKind::LessThan) && matches!(ctx.peek(1).kind, TokenKind::Identifier) && ctx.peek(2).kind == TokenKind::GreaterThan {
            let attr_name = ctx.peek(1).interned().map(|s| ctx.interner.resolve(s).to_string());
            match attr_name.as_deref() {
                Some("const") => {
                    ctx.advance();
                    ctx.advance();
                    ctx.advance();
                    id.has_const = true;
                    continue;
                }
                Some("close") => {
                    ctx.advance();
                    ctx.advance();
                    ctx.advance();
                    id.has_close = true;
                    continue;
                }
                _ => {}
            }
        }
        if ctx.check(TokenKind::Colon) && id.ty == Type::Unknown {
            ctx.advance();
            id.ty = parse_type_name(ctx);
            continue;
        }
        break;
    }
}

/// `is_implicit_local_decl`: an identifier start where the
/// lexer's `<identifier` lookahead reveals `<const>`/`<close>` (optionally
/// with `:type` between the name and the attribute).
fn is_implicit_local_decl(ctx: &ParserContext) -> bool {
    let mut n = 1usize;
    if ctx.peek(n).kind == TokenKind::Colon {
        // skip ':' and a type name token
        n += 2;
    }
    ctx.peek(n).kind == TokenKind::LessThan
        && ctx.peek(n + 1).kind == TokenKind::Identifier
        && ctx.peek(n + 2).kind == TokenKind::GreaterThan
        && matches!(ctx.peek(n + 1).interned().map(|s| ctx.interner.resolve(s) == "const" || ctx.interner.resolve(s) == "close"), Some(true))
}

fn parse_implicit_local_decl(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.current().span;
    let name = parse_one_name(ctx)?;
    let op = assign_op_for(ctx.current().kind).unwrap_or(AssignOp::Plain);
    let values = if ctx.current().kind != TokenKind::Semicolon && assign_op_for(ctx.current().kind).is_some() {
        ctx.advance();
        parse_expr_list(ctx)?
    } else {
        Vec::new()
    };
    let end = values.last().map(|v| v.span).unwrap_or(name.span);
    Some(StmtNode::new(start.to(end), StmtKind::LocalDecl(LocalDeclStmt { op, names: vec![name], values })))
}

fn parse_expr_list(ctx: &mut ParserContext) -> Option<Vec<crate::ast::ExprNode>> {
    let mut exprs = vec![parse_expression(ctx)?];
    while ctx.match_kind(TokenKind::Comma).is_some() {
        exprs.push(parse_expression(ctx)?);
    }
    Some(exprs)
}

/// `local`/`global` declaration. Per invariant 3,
/// any trailing bare identifiers among `values` beyond `names.len()` would
/// be a parser bug; normalization here simply never produces more values
/// than names since the grammar requires an explicit name list up front.
fn parse_local_or_global(ctx: &mut ParserContext, is_global: bool) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'local'/'global'
    if ctx.check(TokenKind::Function) {
        return parse_local_function(ctx, start);
    }
    if ctx.check(TokenKind::ThunkToken) {
        return parse_local_thunk(ctx, start, is_global);
    }
    let names = parse_name_list(ctx)?;
    let op = assign_op_for(ctx.current().kind);
    let values = if let Some(op) = op {
        ctx.advance();
        parse_expr_list(ctx)?
    } else {
        Vec::new()
    };
    let op = op.unwrap_or(AssignOp::Plain);
    let end = values.last().map(|v| v.span).unwrap_or_else(|| names.last().unwrap().span);
    let decl = LocalDeclStmt { op, names, values };
    let kind = if is_global { StmtKind::GlobalDecl(decl) } else { StmtKind::LocalDecl(decl) };
    Some(StmtNode::new(start.to(end), kind))
}

fn parse_local_function(ctx: &mut ParserContext, start: SourceSpan) -> Option<StmtNode> {
    ctx.advance(); // 'function'
    let name_tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
    let sym = name_tok.interned().expect("Identifier token always carries a symbol");
    let name = Identifier::named(sym, name_tok.span);
    let (function, end) = parse_function_body(ctx, false)?;
    Some(StmtNode::new(start.to(end), StmtKind::LocalFunction { name, function }))
}

fn parse_local_thunk(ctx: &mut ParserContext, start: SourceSpan, _is_global: bool) -> Option<StmtNode> {
    ctx.advance(); // 'thunk'
    let name_tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
    let sym = name_tok.interned().expect("Identifier token always carries a symbol");
    let name = Identifier::named(sym, name_tok.span);
    ctx.expect(TokenKind::LeftParen, ParserErrorCode::ExpectedToken)?;
    ctx.expect(TokenKind::RightParen, ParserErrorCode::ExpectedToken)?;
    let thunk_return_type = if ctx.match_kind(TokenKind::Colon).is_some() { parse_type_name(ctx) } else { Type::Unknown };
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    let function = FunctionExprPayload {
        parameters: vec![],
        is_vararg: false,
        is_thunk: true,
        thunk_return_type,
        return_types: Default::default(),
        body,
        annotations: vec![],
    };
    Some(StmtNode::new(start.to(end.span), StmtKind::LocalFunction { name, function }))
}

/// `function a.b:c(...) ... end`.
fn parse_function_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'function'
    let first = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
    let mut segments = vec![Identifier::named(first.interned().unwrap(), first.span)];
    while ctx.match_kind(TokenKind::Dot).is_some() {
        let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
        segments.push(Identifier::named(tok.interned().unwrap(), tok.span));
    }
    let method = if ctx.match_kind(TokenKind::Colon).is_some() {
        let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
        Some(Identifier::named(tok.interned().unwrap(), tok.span))
    } else {
        None
    };
    let is_method = method.is_some();
    let (function, end) = parse_function_body(ctx, is_method)?;
    let name = FunctionNamePath { segments, method, is_explicit_global: false };
    Some(StmtNode::new(start.to(end), StmtKind::Function { name, function }))
}

/// Parses `(params) [:returns] body end`, returning the payload and the
/// span of the closing `end`. When `is_method` is set, a synthetic `self`
/// parameter (`is_self = true`) is prepended, matching how `function
/// a:b(...)` implicitly receives the receiver.
fn parse_function_body(ctx: &mut ParserContext, is_method: bool) -> Option<(FunctionExprPayload, SourceSpan)> {
    let (mut parameters, is_vararg) = parse_parameter_list(ctx)?;
    if is_method {
        let self_span = parameters.first().map(|p| p.name.span).unwrap_or(ctx.current().span);
        let self_sym = ctx.interner.intern("self");
        parameters.insert(0, Parameter { name: Identifier::named(self_sym, self_span), ty: Type::Unknown, is_self: true });
    }
    let return_types = if ctx.match_kind(TokenKind::Colon).is_some() {
        crate::parser::types::parse_return_types(ctx)
    } else {
        Default::default()
    };
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    Some((
        FunctionExprPayload {
            parameters,
            is_vararg,
            is_thunk: false,
            thunk_return_type: Type::Unknown,
            return_types,
            body,
            annotations: vec![],
        },
        end.span,
    ))
}

/// Parameter lists accept zero or more `name[:type]` and an optional
/// trailing `...`. A missing parameter type does not prevent
/// parsing; the type-safety tip is emitted by the analyzer, not here.
pub fn parse_parameter_list(ctx: &mut ParserContext) -> Option<(Vec<Parameter>, bool)> {
    ctx.expect(TokenKind::LeftParen, ParserErrorCode::ExpectedToken)?;
    let mut parameters = Vec::new();
    let mut is_vararg = false;
    if !ctx.check(TokenKind::RightParen) {
        loop {
            if ctx.match_kind(TokenKind::Dots).is_some() {
                is_vararg = true;
                break;
            }
            let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
            let sym = tok.interned().expect("Identifier token always carries a symbol");
            let ty = if ctx.match_kind(TokenKind::Colon).is_some() { parse_type_name(ctx) } else { Type::Unknown };
            parameters.push(Parameter { name: Identifier { ty, ..Identifier::named(sym, tok.span) }, ty, is_self: false });
            if ctx.match_kind(TokenKind::Comma).is_none() {
                break;
            }
        }
    }
    ctx.expect(TokenKind::RightParen, ParserErrorCode::ExpectedToken)?;
    Some((parameters, is_vararg))
}

fn parse_if_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'if'
    let mut clauses = Vec::new();
    let condition = parse_expression(ctx)?;
    ctx.expect(TokenKind::ThenToken, ParserErrorCode::ExpectedToken)?;
    let block = crate::parser::parse_block(ctx, &[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndToken]);
    clauses.push(IfClause { condition: Some(condition), block });
    while ctx.check(TokenKind::ElseIf) {
        ctx.advance();
        let condition = parse_expression(ctx)?;
        ctx.expect(TokenKind::ThenToken, ParserErrorCode::ExpectedToken)?;
        let block = crate::parser::parse_block(ctx, &[TokenKind::ElseIf, TokenKind::Else, TokenKind::EndToken]);
        clauses.push(IfClause { condition: Some(condition), block });
    }
    if ctx.check(TokenKind::Else) {
        ctx.advance();
        let block = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
        clauses.push(IfClause { condition: None, block });
    }
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    Some(StmtNode::new(start.to(end.span), StmtKind::If(IfStmt { clauses })))
}

fn parse_while_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'while'
    let condition = parse_expression(ctx)?;
    ctx.expect(TokenKind::DoToken, ParserErrorCode::ExpectedToken)?;
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    Some(StmtNode::new(start.to(end.span), StmtKind::Loop(LoopStmtPayload { style: LoopStyle::While, condition, body })))
}

fn parse_repeat_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'repeat'
    let body = crate::parser::parse_block(ctx, &[TokenKind::Until]);
    ctx.expect(TokenKind::Until, ParserErrorCode::BadRepeat)?;
    let condition = parse_expression(ctx)?;
    let end = condition.span;
    Some(StmtNode::new(start.to(end), StmtKind::Loop(LoopStmtPayload { style: LoopStyle::Repeat, condition, body })))
}

/// Dispatches between numeric-for, generic-for, and the anonymous
/// `for { range } do ... end` form, applying the range-lowering rules
/// that turn a brace-range into a numeric-for over the same bounds.
fn parse_for_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'for'
    if ctx.check(TokenKind::LeftBrace) {
        return parse_anonymous_for(ctx, start);
    }
    let names = parse_name_list(ctx)?;
    if names.len() == 1 && ctx.check(TokenKind::Equals) {
        ctx.advance();
        let from = parse_expression(ctx)?;
        ctx.expect(TokenKind::Comma, ParserErrorCode::ExpectedToken)?;
        let to = parse_expression(ctx)?;
        let step = if ctx.match_kind(TokenKind::Comma).is_some() { Some(parse_expression(ctx)?) } else { None };
        ctx.expect(TokenKind::DoToken, ParserErrorCode::ExpectedToken)?;
        let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
        let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
        return Some(StmtNode::new(
            start.to(end.span),
            StmtKind::NumericFor(NumericForStmt { control: names.into_iter().next().unwrap(), start: from, stop: to, step, body }),
        ));
    }
    ctx.expect(TokenKind::InToken, ParserErrorCode::ExpectedToken)?;
    let iterators = parse_expr_list(ctx)?;
    ctx.expect(TokenKind::DoToken, ParserErrorCode::ExpectedToken)?;
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    lower_generic_for(start.to(end.span), names, iterators, body)
}

/// If exactly one name and one iterator is a `RangeExpr` with numeric
/// literal bounds, lowers to a `NumericForStmt` with a computed step
///. Otherwise keeps the generic for, wrapping a bare range
/// iterator in a zero-argument call since it is an iterator factory.
fn lower_generic_for(span: SourceSpan, mut names: Vec<Identifier>, mut iterators: Vec<crate::ast::ExprNode>, body: crate::ast::BlockStmt) -> Option<StmtNode> {
    if names.len() == 1 && iterators.len() == 1 {
        if let ExprKind::Range(range) = &iterators[0].kind {
            if let (ExprKind::Literal(LiteralValue::Num(from)), ExprKind::Literal(LiteralValue::Num(to))) = (&range.start.kind, &range.stop.kind) {
                let (from, to) = (*from, *to);
                let step = if from <= to { 1.0 } else { -1.0 };
                let stop = if range.inclusive { to } else { to - step };
                let stop_expr = crate::ast::ExprNode::new(iterators[0].span, ExprKind::Literal(LiteralValue::Num(stop)));
                let start_expr = crate::ast::ExprNode::new(iterators[0].span, ExprKind::Literal(LiteralValue::Num(from)));
                let step_expr = crate::ast::ExprNode::new(iterators[0].span, ExprKind::Literal(LiteralValue::Num(step)));
                return Some(StmtNode::new(
                    span,
                    StmtKind::NumericFor(NumericForStmt { control: names.remove(0), start: start_expr, stop: stop_expr, step: Some(step_expr), body }),
                ));
            }
        }
        if matches!(iterators[0].kind, ExprKind::Range(_)) {
            let range_span = iterators[0].span;
            let range = iterators.remove(0);
            iterators.push(crate::parser::desugar::call_direct(range, vec![], range_span));
        }
    }
    Some(StmtNode::new(span, StmtKind::GenericFor(GenericForStmt { names, iterators, body })))
}

/// `for { a..b } do ... end`: the control variable is the blank identifier.
/// Non-trivial range operands are scanned for at brace depth zero before
/// the start is parsed at the concat/add precedence tier.
fn parse_anonymous_for(ctx: &mut ParserContext, start: SourceSpan) -> Option<StmtNode> {
    let brace_span = ctx.advance().span; // '{'
    let from = parse_expression(ctx)?;
    let inclusive = if ctx.match_kind(TokenKind::Dots).is_some() {
        true
    } else {
        ctx.expect(TokenKind::Cat, ParserErrorCode::BadRange)?;
        false
    };
    let to = parse_expression(ctx)?;
    ctx.expect(TokenKind::RightBrace, ParserErrorCode::UnclosedBrace)?;
    ctx.expect(TokenKind::DoToken, ParserErrorCode::ExpectedToken)?;
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    let control = Identifier::blank(brace_span);
    let iterators = vec![crate::ast::ExprNode::new(brace_span, ExprKind::Range(crate::ast::expr::RangeExpr { start: from.boxed(), stop: to.boxed(), inclusive }))];
    lower_generic_for(start.to(end.span), vec![control], iterators, body)
}

fn parse_do_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'do'
    let block = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    Some(StmtNode::new(start.to(end.span), StmtKind::Do(block)))
}

fn parse_defer_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'defer'
    let (parameters, is_vararg) = if ctx.check(TokenKind::LeftParen) { parse_parameter_list(ctx)? } else { (Vec::new(), false) };
    let body = crate::parser::parse_block(ctx, &[TokenKind::EndToken]);
    let end_tok = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    let arguments = if ctx.check(TokenKind::LeftParen) {
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
        ctx.expect(TokenKind::RightParen, ParserErrorCode::UnclosedGroup)?;
        args
    } else {
        Vec::new()
    };
    let callable = FunctionExprPayload {
        parameters,
        is_vararg,
        is_thunk: false,
        thunk_return_type: Type::Unknown,
        return_types: Default::default(),
        body,
        annotations: vec![],
    };
    Some(StmtNode::new(start.to(end_tok.span), StmtKind::Defer(DeferStmt { callable, arguments })))
}

fn parse_return_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'return'
    let mut end = start;
    let values = if matches!(ctx.current().kind, TokenKind::EndToken | TokenKind::ElseIf | TokenKind::Else | TokenKind::Until | TokenKind::ExceptToken | TokenKind::SuccessToken | TokenKind::Semicolon | TokenKind::EndOfFile) {
        Vec::new()
    } else {
        let values = parse_expr_list(ctx)?;
        end = values.last().map(|v| v.span).unwrap_or(start);
        values
    };
    let forwards_call = values.len() == 1 && matches!(values[0].kind, ExprKind::Call(_));
    Some(StmtNode::new(start.to(end), StmtKind::Return(ReturnStmt { values, forwards_call })))
}

/// `try[<trace>] ... [except [var] [when C,...] ...]* [success ...] end`
///. A catch-all `except` (no `when`) must be last; the
/// exception variable and filter codes are required to appear on the same
/// source line as their introducing keyword, enforced here by comparing
/// `span.line`.
fn parse_try_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'try'
    let mut enable_trace = false;
    if ctx.check(TokenKind::LessThan) && ctx.peek(1).kind == TokenKind::Identifier && ctx.peek(2).kind == TokenKind::GreaterThan {
        let name = ctx.peek(1).interned().map(|s| ctx.interner.resolve(s).to_string());
        if name.as_deref() == Some("trace") {
            ctx.advance();
            ctx.advance();
            ctx.advance();
            enable_trace = true;
        } else {
            ctx.error_at(ParserErrorCode::UnknownAttribute, format!("unknown try attribute '{}'", name.unwrap_or_default()));
        }
    }
    let try_block = crate::parser::parse_block(ctx, &[TokenKind::ExceptToken, TokenKind::SuccessToken, TokenKind::EndToken]);
    let mut except_clauses = Vec::new();
    let mut seen_catch_all = false;
    while ctx.check(TokenKind::ExceptToken) {
        let except_line = ctx.current().span.line;
        ctx.advance();
        if seen_catch_all {
            ctx.error_at(ParserErrorCode::UnexpectedToken, "a catch-all 'except' must be last");
        }
        let exception_var = if ctx.check(TokenKind::Identifier) && ctx.current().span.line == except_line && ctx.peek(1).kind != TokenKind::When {
            let tok = ctx.advance();
            Some(Identifier::named(tok.interned().unwrap(), tok.span))
        } else {
            None
        };
        let filter_codes = if ctx.check(TokenKind::When) {
            let when_line = ctx.current().span.line;
            ctx.advance();
            let mut codes = vec![parse_expression(ctx)?];
            while ctx.current().span.line == when_line && ctx.match_kind(TokenKind::Comma).is_some() {
                codes.push(parse_expression(ctx)?);
            }
            codes
        } else {
            seen_catch_all = true;
            Vec::new()
        };
        let block = crate::parser::parse_block(ctx, &[TokenKind::ExceptToken, TokenKind::SuccessToken, TokenKind::EndToken]);
        except_clauses.push(ExceptClause { exception_var, filter_codes, block });
    }
    let success_block = if ctx.check(TokenKind::SuccessToken) {
        ctx.advance();
        Some(crate::parser::parse_block(ctx, &[TokenKind::EndToken]))
    } else {
        None
    };
    let end = ctx.expect(TokenKind::EndToken, ParserErrorCode::ExpectedToken)?;
    Some(StmtNode::new(
        start.to(end.span),
        StmtKind::TryExcept(TryExceptStmt { try_block, except_clauses, success_block, enable_trace }),
    ))
}

fn parse_raise_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'raise'
    let error_code = parse_expression(ctx)?;
    let message = if ctx.match_kind(TokenKind::Comma).is_some() { Some(parse_expression(ctx)?) } else { None };
    let end = message.as_ref().map(|m| m.span).unwrap_or(error_code.span);
    Some(StmtNode::new(start.to(end), StmtKind::Raise(RaiseStmt { error_code, message })))
}

fn parse_check_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'check'
    let error_code = parse_expression(ctx)?;
    let end = error_code.span;
    Some(StmtNode::new(start.to(end), StmtKind::Check(CheckStmt { error_code })))
}

fn parse_namespace_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'namespace'
    if ctx.function_depth > 0 {
        ctx.error_at(ParserErrorCode::IllegalImportPosition, "'namespace' is only allowed at the top level of a chunk");
    }
    let tok = ctx.expect(TokenKind::String, ParserErrorCode::ExpectedExpression)?;
    let name = ctx.interner.resolve(tok.interned().unwrap()).to_string();
    ctx.registry.set_namespace(ctx.source, name.clone());
    Some(StmtNode::new(start.to(tok.span), StmtKind::Namespace { name, span: start.to(tok.span) }))
}

/// `@if (condition) ... @end`. Recognized conditions:
/// `imported = true|false`, `debug = true|false`, `platform = "name"`,
/// `exists = "path"`.
fn parse_compile_if(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // '@if'
    ctx.expect(TokenKind::LeftParen, ParserErrorCode::ExpectedToken)?;
    let key_tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
    let key = ctx.interner.resolve(key_tok.interned().unwrap()).to_string();
    ctx.expect(TokenKind::Equals, ParserErrorCode::ExpectedToken)?;
    let condition_true = evaluate_compile_condition(ctx, &key);
    ctx.expect(TokenKind::RightParen, ParserErrorCode::ExpectedToken)?;
    if condition_true {
        let block = crate::parser::parse_block(ctx, &[TokenKind::CompileEnd]);
        let end = ctx.expect(TokenKind::CompileEnd, ParserErrorCode::ExpectedToken)?;
        Some(StmtNode::new(start.to(end.span), StmtKind::CompileTimeBlock(block)))
    } else {
        skip_to_compile_end(ctx);
        let end = ctx.expect(TokenKind::CompileEnd, ParserErrorCode::ExpectedToken)?;
        Some(StmtNode::new(start.to(end.span), StmtKind::CompileTimeBlock(crate::ast::BlockStmt::default())))
    }
}

fn evaluate_compile_condition(ctx: &mut ParserContext, key: &str) -> bool {
    match key {
        "imported" => {
            let expected = parse_bool_literal(ctx);
            (ctx.source != crate::source::SourceIdx(0)) == expected
        }
        "debug" => {
            let expected = parse_bool_literal(ctx);
            (ctx.host.log_level() > 0) == expected
        }
        "platform" => {
            let tok = ctx.expect(TokenKind::String, ParserErrorCode::ExpectedExpression);
            let expected = tok.and_then(|t| t.interned()).map(|s| ctx.interner.resolve(s).to_string());
            expected.as_deref() == Some(ctx.host.platform())
        }
        "exists" => {
            let tok = ctx.expect(TokenKind::String, ParserErrorCode::ExpectedExpression);
            let path = tok.and_then(|t| t.interned()).map(|s| ctx.interner.resolve(s).to_string());
            path.map(|p| ctx.host.analyse_path(&p).is_ok()).unwrap_or(false)
        }
        _ => {
            ctx.error_at(ParserErrorCode::UnknownAttribute, format!("unknown compile-time condition '{key}'"));
            false
        }
    }
}

fn parse_bool_literal(ctx: &mut ParserContext) -> bool {
    match ctx.current().kind {
        TokenKind::TrueToken => {
            ctx.advance();
            true
        }
        TokenKind::FalseToken => {
            ctx.advance();
            false
        }
        _ => {
            ctx.error_at(ParserErrorCode::ExpectedExpression, "expected 'true' or 'false'");
            false
        }
    }
}

/// Advances until a balanced `@end`, tracking `@if`/`@end` nesting, bounded by the same recovery cap as panic-mode skipping.
fn skip_to_compile_end(ctx: &mut ParserContext) {
    let mut depth = 0i32;
    let mut skipped = 0usize;
    loop {
        match ctx.current().kind {
            TokenKind::CompileIf => depth += 1,
            TokenKind::CompileEnd if depth == 0 => return,
            TokenKind::CompileEnd => depth -= 1,
            TokenKind::EndOfFile => return,
            _ => {}
        }
        ctx.advance();
        skipped += 1;
        if skipped >= crate::parser::RECOVERY_SKIP_CAP {
            return;
        }
    }
}

/// Everything that is not recognized by an earlier case: plain expression
/// statements, assignments (including compound-assignment targets), and
/// the `expr ?? return|break|continue` shorthand.
fn parse_expr_or_assignment_or_shorthand(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.current().span;
    let first = parse_expression(ctx)?;

    if let ExprKind::Presence { value } = first.kind {
        return parse_conditional_shorthand(ctx, start, *value);
    }

    if matches!(
        ctx.current().kind,
        TokenKind::Equals
            | TokenKind::PlusEquals
            | TokenKind::MinusEquals
            | TokenKind::StarEquals
            | TokenKind::SlashEquals
            | TokenKind::PercentEquals
            | TokenKind::ConcatEquals
            | TokenKind::IfEmptyEquals
            | TokenKind::IfNilEquals
    ) {
        return parse_assignment_tail(ctx, start, first);
    }

    let end = first.span;
    Some(StmtNode::new(start.to(end), StmtKind::Expression(first)))
}

fn parse_assignment_tail(ctx: &mut ParserContext, start: SourceSpan, first_target: crate::ast::ExprNode) -> Option<StmtNode> {
    let mut targets = vec![first_target];
    while ctx.match_kind(TokenKind::Comma).is_some() {
        targets.push(parse_expression(ctx)?);
    }
    let op_tok = ctx.current().kind;
    let op = compound_assign_op(op_tok).unwrap_or(AssignOp::Plain);
    let is_compound = compound_binop(op_tok);
    ctx.advance();
    let values = parse_expr_list(ctx)?;
    let end = values.last().map(|v| v.span).unwrap_or(start);
    let values = if let Some(bin_op) = is_compound {
        // `x += e` desugars to `x = x + e` at the single-target level.
        targets
            .iter()
            .zip(values)
            .map(|(t, v)| {
                let span = t.span.to(v.span);
                crate::ast::ExprNode::new(span, ExprKind::Binary { op: bin_op, left: t.clone().boxed(), right: v.boxed() })
            })
            .collect()
    } else {
        values
    };
    Some(StmtNode::new(start.to(end), StmtKind::Assignment(AssignmentStmt { op, targets, values })))
}

fn compound_assign_op(kind: TokenKind) -> Option<AssignOp> {
    match kind {
        TokenKind::Equals => Some(AssignOp::Plain),
        TokenKind::IfEmptyEquals => Some(AssignOp::IfEmpty),
        TokenKind::IfNilEquals => Some(AssignOp::IfNil),
        TokenKind::PlusEquals | TokenKind::MinusEquals | TokenKind::StarEquals | TokenKind::SlashEquals | TokenKind::PercentEquals | TokenKind::ConcatEquals => Some(AssignOp::Plain),
        _ => None,
    }
}

fn compound_binop(kind: TokenKind) -> Option<crate::ast::expr::BinOp> {
    use crate::ast::expr::BinOp;
    match kind {
        TokenKind::PlusEquals => Some(BinOp::Add),
        TokenKind::MinusEquals => Some(BinOp::Sub),
        TokenKind::StarEquals => Some(BinOp::Mul),
        TokenKind::SlashEquals => Some(BinOp::Div),
        TokenKind::PercentEquals => Some(BinOp::Mod),
        TokenKind::ConcatEquals => Some(BinOp::Concat),
        _ => None,
    }
}

fn parse_conditional_shorthand(ctx: &mut ParserContext, start: SourceSpan, condition: crate::ast::ExprNode) -> Option<StmtNode> {
    let action = match ctx.current().kind {
        TokenKind::ReturnToken => {
            ctx.advance();
            let values = if matches!(ctx.current().kind, TokenKind::EndToken | TokenKind::Semicolon | TokenKind::EndOfFile) {
                Vec::new()
            } else {
                parse_expr_list(ctx)?
            };
            ShorthandAction::Return(values)
        }
        TokenKind::BreakToken => {
            ctx.advance();
            ShorthandAction::Break
        }
        TokenKind::ContinueToken => {
            ctx.advance();
            ShorthandAction::Continue
        }
        _ => {
            ctx.error_at(ParserErrorCode::ExpectedToken, "expected 'return', 'break' or 'continue' after '??'");
            return None;
        }
    };
    let end = ctx.previous().span;
    Some(StmtNode::new(start.to(end), StmtKind::ConditionalShorthand(ConditionalShorthandStmt { condition, action })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;
    use crate::parser::test_support::Harness;

    #[test]
    fn numeric_for_lowers_inclusive_range() {
        let mut h = Harness::new();
        let block = h.parse("for i in {1..5} do total += 1 end");
        let StmtKind::NumericFor(for_stmt) = &block.statements[0].kind else { panic!() };
        assert!(matches!(for_stmt.start.kind, ExprKind::Literal(LiteralValue::Num(n)) if n == 1.0));
        assert!(matches!(for_stmt.stop.kind, ExprKind::Literal(LiteralValue::Num(n)) if n == 4.0));
    }

    #[test]
    fn conditional_shorthand_builds_return() {
        let mut h = Harness::new();
        let block = h.parse("local v = maybe()\nv ?? return false");
        let StmtKind::ConditionalShorthand(shorthand) = &block.statements[1].kind else { panic!("got {:?}", block.statements[1].kind) };
        assert!(matches!(shorthand.action, ShorthandAction::Return(_)));
    }

    #[test]
    fn recursive_function_parses_without_annotation() {
        let mut h = Harness::new();
        let block = h.parse("function fact(n) if n <= 1 then return 1 end return n * fact(n-1) end");
        assert!(matches!(block.statements[0].kind, StmtKind::Function { .. }));
        assert!(h.diagnostics.entries().is_empty());
    }

    #[test]
    fn type_fixation_assignment_parses() {
        let mut h = Harness::new();
        let block = h.parse("local x = 1\nx = \"hi\"\nx = nil");
        assert_eq!(block.statements.len(), 3);
    }

    #[test]
    fn try_except_success_parses() {
        let mut h = Harness::new();
        let block = h.parse("try\n  risky()\nexcept e when 1, 2\n  handle(e)\nexcept\n  fallback()\nsuccess\n  ok()\nend");
        let StmtKind::TryExcept(stmt) = &block.statements[0].kind else { panic!() };
        assert_eq!(stmt.except_clauses.len(), 2);
        assert!(stmt.success_block.is_some());
    }

    #[test]
    fn implicit_local_decl_with_const() {
        let mut h = Harness::new();
        let block = h.parse("x <const> = 1");
        let StmtKind::LocalDecl(decl) = &block.statements[0].kind else { panic!() };
        assert!(decl.names[0].has_const);
    }

    #[test]
    fn annotation_attaches_to_following_function() {
        let mut h = Harness::new();
        let block = h.parse("@deprecated function old() end");
        let StmtKind::Function { function, .. } = &block.statements[0].kind else { panic!() };
        assert_eq!(function.annotations.len(), 1);
    }

    #[test]
    fn annotation_with_arguments_attaches_to_local_function() {
        let mut h = Harness::new();
        let block = h.parse("@host(\"x\") local function f() end");
        let StmtKind::LocalFunction { function, .. } = &block.statements[0].kind else { panic!() };
        assert_eq!(function.annotations.len(), 1);
        assert_eq!(function.annotations[0].arguments.len(), 1);
    }

    #[test]
    fn stacked_annotations_all_attach() {
        let mut h = Harness::new();
        let block = h.parse("@a @b function f() end");
        let StmtKind::Function { function, .. } = &block.statements[0].kind else { panic!() };
        assert_eq!(function.annotations.len(), 2);
    }

    #[test]
    fn annotation_on_non_function_is_an_error() {
        let mut h = Harness::new();
        h.parse("@deprecated local x = 1");
        assert!(h.diagnostics.has_errors());
    }
}
