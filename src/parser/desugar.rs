//! Desugarings performed by the AST builder: deferred
//! expressions, typed array literals, arrow functions and the `in` operator.
//! Each of these lowers directly to plain AST shapes at parse time rather
//! than needing a later pass, matching the "builder constructs payloads
//! directly" design note.

use crate::ast::expr::{
    AssignOp, CallExpr, CallTarget, ExprKind, ExprNode, FunctionExprPayload, FunctionReturnTypes, Parameter,
};
use crate::ast::stmt::{BlockStmt, LocalDeclStmt, ReturnStmt, StmtKind, StmtNode};
use crate::ast::types::{Identifier, LiteralValue, NameRef, Type};
use crate::parser::ParserContext;
use crate::span::SourceSpan;

pub fn synthetic_identifier(ctx: &mut ParserContext, name: &str, span: SourceSpan) -> Identifier {
    let sym = ctx.interner.intern(name);
    Identifier::named(sym, span)
}

fn synthetic_name_ref(ctx: &mut ParserContext, name: &str, span: SourceSpan) -> NameRef {
    let sym = ctx.interner.intern(name);
    NameRef { symbol: sym, span }
}

pub fn ident_expr(ctx: &mut ParserContext, name: &str, span: SourceSpan) -> ExprNode {
    ExprNode::new(span, ExprKind::Identifier(synthetic_name_ref(ctx, name, span)))
}

pub fn call_direct(target: ExprNode, arguments: Vec<ExprNode>, span: SourceSpan) -> ExprNode {
    ExprNode::new(
        span,
        ExprKind::Call(CallExpr {
            target: CallTarget::Direct(target.boxed()),
            arguments,
            forwards_multret: false,
            result_type: None,
            object_class_id: None,
        }),
    )
}

pub fn call_method(ctx: &mut ParserContext, receiver: ExprNode, method: &str, arguments: Vec<ExprNode>, span: SourceSpan) -> ExprNode {
    let method_id = synthetic_identifier(ctx, method, span);
    ExprNode::new(
        span,
        ExprKind::Call(CallExpr {
            target: CallTarget::Method(receiver.boxed(), method_id),
            arguments,
            forwards_multret: false,
            result_type: None,
            object_class_id: None,
        }),
    )
}

/// `table.name(args)` — a plain call through a dot-accessed member, as
/// opposed to [`call_method`]'s `:`-call (which implicitly passes `table` as
/// a receiver argument). `array.new`/`array.of`/`array.resize` are namespaced
/// functions, not methods on an `array` object, so they go through this.
pub fn call_dot(ctx: &mut ParserContext, table: ExprNode, name: &str, arguments: Vec<ExprNode>, span: SourceSpan) -> ExprNode {
    let name_id = synthetic_identifier(ctx, name, span);
    let member = ExprNode::new(span, ExprKind::Member { table: table.boxed(), name: name_id });
    call_direct(member, arguments, span)
}

/// Deferred `<{ e }>` / typed `<type{ e }>`: `(thunk():T return e end)()`.
pub fn deferred_thunk(body_expr: ExprNode, return_type: Type, span: SourceSpan) -> ExprNode {
    let ret_stmt = StmtNode::new(span, StmtKind::Return(ReturnStmt { values: vec![body_expr], forwards_call: false }));
    let body = BlockStmt { statements: vec![ret_stmt] };
    let payload = FunctionExprPayload {
        parameters: vec![],
        is_vararg: false,
        is_thunk: true,
        thunk_return_type: return_type,
        return_types: FunctionReturnTypes::default(),
        body,
        annotations: vec![],
    };
    let thunk_expr = ExprNode::new(span, ExprKind::Function(payload));
    call_direct(thunk_expr, vec![], span)
}

/// Arrow function `(p1,…) => expr`/`=> do … end`.
pub fn arrow_function(parameters: Vec<Parameter>, body: BlockStmt, return_type: Option<Type>) -> FunctionExprPayload {
    let mut return_types = FunctionReturnTypes::default();
    if let Some(ty) = return_type {
        return_types.is_explicit = true;
        return_types.push(ty);
    }
    FunctionExprPayload {
        parameters,
        is_vararg: false,
        is_thunk: false,
        thunk_return_type: Type::Unknown,
        return_types,
        body,
        annotations: vec![],
    }
}

pub fn arrow_function_from_expr(parameters: Vec<Parameter>, body_expr: ExprNode, return_type: Option<Type>, span: SourceSpan) -> FunctionExprPayload {
    let ret = StmtNode::new(span, StmtKind::Return(ReturnStmt { values: vec![body_expr], forwards_call: false }));
    arrow_function(parameters, BlockStmt { statements: vec![ret] }, return_type)
}

/// `x in r` desugars to `r:contains(x)`.
pub fn in_desugar(ctx: &mut ParserContext, value: ExprNode, range: ExprNode, span: SourceSpan) -> ExprNode {
    call_method(ctx, range, "contains", vec![value], span)
}

fn literal_num(n: f64, span: SourceSpan) -> ExprNode {
    ExprNode::new(span, ExprKind::Literal(LiteralValue::Num(n)))
}

/// The three shapes `array<T>`/`array<T,size>`[`{…}`] can take, gathered by
/// the caller before desugaring.
pub struct ArrayTypeSpec {
    pub type_name: String,
    pub size: Option<ExprNode>,
    pub initializers: Option<Vec<ExprNode>>,
}

/// Typed array literal. The IIFE-with-resize form
/// is only produced when genuinely needed: a non-literal size, or a literal
/// size that strictly exceeds the initializer count.
pub fn typed_array_literal(ctx: &mut ParserContext, spec: ArrayTypeSpec, span: SourceSpan) -> ExprNode {
    let type_str_expr = ExprNode::new(span, ExprKind::Literal(LiteralValue::Str(ctx.interner.intern(&spec.type_name))));

    let Some(initializers) = spec.initializers else {
        let size_expr = spec.size.unwrap_or_else(|| literal_num(0.0, span));
        let array_ident = ident_expr(ctx, "array", span);
        return call_dot(ctx, array_ident, "new", vec![size_expr, type_str_expr], span);
    };

    let literal_size = spec.size.as_ref().and_then(|e| match &e.kind {
        ExprKind::Literal(LiteralValue::Num(n)) => Some(*n),
        _ => None,
    });
    let needs_resize = match (&spec.size, literal_size) {
        (Some(_), None) => true,
        (Some(_), Some(n)) => (n as usize) > initializers.len(),
        (None, _) => false,
    };

    let mut of_args = vec![type_str_expr];
    of_args.extend(initializers);
    let array_ident = ident_expr(ctx, "array", span);
    let of_call = call_dot(ctx, array_ident, "of", of_args, span);

    if !needs_resize {
        return of_call;
    }

    let size_expr = spec.size.expect("needs_resize implies a size was given");
    let tmp = synthetic_identifier(ctx, "_arr", span);
    let decl = StmtNode::new(span, StmtKind::LocalDecl(LocalDeclStmt { op: AssignOp::Plain, names: vec![tmp], values: vec![of_call] }));
    let tmp_ref = ident_expr(ctx, "_arr", span);
    let array_ident2 = ident_expr(ctx, "array", span);
    let resize_call = call_dot(ctx, array_ident2, "resize", vec![tmp_ref.clone(), size_expr], span);
    let resize_stmt = StmtNode::new(span, StmtKind::Expression(resize_call));
    let return_stmt = StmtNode::new(span, StmtKind::Return(ReturnStmt { values: vec![tmp_ref], forwards_call: false }));
    let body = BlockStmt { statements: vec![decl, resize_stmt, return_stmt] };
    let payload = FunctionExprPayload {
        parameters: vec![],
        is_vararg: false,
        is_thunk: false,
        thunk_return_type: Type::Unknown,
        return_types: FunctionReturnTypes::default(),
        body,
        annotations: vec![],
    };
    let func_expr = ExprNode::new(span, ExprKind::Function(payload));
    call_direct(func_expr, vec![], span)
}
