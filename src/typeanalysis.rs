//! The post-parse type analyzer. A single pass over the parsed
//! block that never touches the AST — every finding is written straight
//! into the diagnostics sink via `Diagnostics::publish_type_diagnostic`/
//! `publish_tip`, mirroring how the parser's own recovery diagnostics are
//! reported through the same sink.

use crate::ast::expr::{AssignOp, BinOp, CallTarget, ExprKind, ExprNode, FunctionExprPayload, FunctionReturnTypes, UnOp};
use crate::ast::stmt::{BlockStmt, StmtKind, StmtNode};
use crate::ast::types::{Identifier, LiteralValue, Type};
use crate::diagnostics::{ParserErrorCode, Tip, TipCategory, TypeDiagnostic};
use crate::interner::InternedStr;
use crate::parser::ParserContext;
use crate::span::SourceSpan;
use std::collections::HashMap;

/// `infer_expression_type`'s return shape.
#[derive(Debug, Clone, Copy)]
pub struct InferredType {
    pub primary: Type,
    pub is_constant: bool,
    pub is_nullable: bool,
    pub is_fixed: bool,
    pub object_class_id: Option<u32>,
}

impl InferredType {
    fn concrete(ty: Type) -> Self {
        let object_class_id = match ty {
            Type::Object(id) => Some(id),
            _ => None,
        };
        Self { primary: ty, is_constant: false, is_nullable: false, is_fixed: false, object_class_id }
    }

    fn any() -> Self {
        Self::concrete(Type::Any)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum VarKind {
    Local,
    Parameter,
}

#[derive(Debug, Clone)]
struct VarInfo {
    ty: Type,
    is_fixed: bool,
    is_const: bool,
    span: SourceSpan,
    used: bool,
    kind: VarKind,
}

/// One frame per block/function/loop/if/do.
#[derive(Debug, Default)]
struct TypeCheckScope {
    locals: HashMap<InternedStr, VarInfo>,
}

#[derive(Debug)]
struct FunctionContext {
    function_name: Option<String>,
    expected_returns: FunctionReturnTypes,
    return_type_inferred: bool,
    /// Short names a direct call could use to recurse into this very
    /// function — the bare function name, or the method name for
    /// `function a:b(...)`.
    self_call_names: Vec<String>,
    saw_recursive_call: bool,
    saw_return_with_values: bool,
}

#[derive(Debug, Clone)]
struct GlobalInfo {
    ty: Type,
    is_fixed: bool,
    is_const: bool,
    span: SourceSpan,
    used: bool,
}

struct Analyzer<'p, 'a> {
    ctx: &'p mut ParserContext<'a>,
    scopes: Vec<TypeCheckScope>,
    functions: Vec<FunctionContext>,
    globals: HashMap<InternedStr, GlobalInfo>,
    loop_depth: u32,
}

/// `run_type_analysis(ctx, block)`: mutates only `ctx.diagnostics`.
pub fn run_type_analysis(ctx: &mut ParserContext, block: &BlockStmt) {
    let mut analyzer = Analyzer { ctx, scopes: vec![TypeCheckScope::default()], functions: Vec::new(), globals: HashMap::new(), loop_depth: 0 };
    analyzer.walk_block(block);
    analyzer.finish_scope();
    analyzer.finish_globals();
}

impl<'p, 'a> Analyzer<'p, 'a> {
    fn push_scope(&mut self) {
        self.scopes.push(TypeCheckScope::default());
    }

    fn pop_scope(&mut self) {
        self.finish_scope();
        self.scopes.pop();
    }

    /// Emits unused-local/parameter tips for the top scope before it is
    /// discarded.
    fn finish_scope(&mut self) {
        let Some(scope) = self.scopes.last() else { return };
        let names: Vec<(InternedStr, SourceSpan, VarKind)> =
            scope.locals.iter().filter(|(_, v)| !v.used).map(|(sym, v)| (*sym, v.span, v.kind)).collect();
        for (sym, span, kind) in names {
            let name = self.ctx.interner.resolve(sym).to_string();
            if name == "_" || name.starts_with('_') {
                continue;
            }
            let (message, priority) = match kind {
                VarKind::Local => (format!("unused local '{name}'"), 2),
                VarKind::Parameter => (format!("unused parameter '{name}'"), 3),
            };
            self.ctx.diagnostics.publish_tip(Tip { category: TipCategory::CodeQuality, priority, message, span });
        }
    }

    fn finish_globals(&mut self) {
        let unused: Vec<(InternedStr, SourceSpan)> = self.globals.iter().filter(|(_, g)| !g.used).map(|(s, g)| (*s, g.span)).collect();
        for (sym, span) in unused {
            let name = self.ctx.interner.resolve(sym).to_string();
            self.check_global_naming(&name, span);
            self.ctx.diagnostics.publish_tip(Tip {
                category: TipCategory::CodeQuality,
                priority: 2,
                message: format!("unused global '{name}'"),
                span,
            });
        }
    }

    /// Looks up a symbol innermost-scope-first, then parameters (already
    /// folded into the same scope stack), then globals.
    fn resolve(&mut self, sym: InternedStr) -> Option<InferredType> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(info) = scope.locals.get_mut(&sym) {
                info.used = true;
                return Some(InferredType { primary: info.ty, is_constant: false, is_nullable: false, is_fixed: info.is_fixed, object_class_id: object_class(info.ty) });
            }
        }
        if let Some(g) = self.globals.get_mut(&sym) {
            g.used = true;
            if self.loop_depth > 0 {
                let span = g.span;
                self.ctx.diagnostics.publish_tip(Tip {
                    category: TipCategory::Performance,
                    priority: 2,
                    message: "global accessed inside a loop; consider caching it in a local".into(),
                    span,
                });
            }
            return Some(InferredType { primary: g.ty, is_constant: false, is_nullable: false, is_fixed: g.is_fixed, object_class_id: object_class(g.ty) });
        }
        None
    }

    fn declare_local(&mut self, name: &Identifier, ty: Type, is_fixed: bool, is_const: bool) {
        let Some(sym) = name.symbol else { return };
        self.check_shadowing(sym, name.span);
        self.scopes.last_mut().unwrap().locals.insert(sym, VarInfo { ty, is_fixed, is_const, span: name.span, used: false, kind: VarKind::Local });
    }

    fn declare_parameter(&mut self, name: &Identifier) {
        let Some(sym) = name.symbol else { return };
        if name.ty == Type::Unknown {
            self.ctx.diagnostics.publish_tip(Tip {
                category: TipCategory::TypeSafety,
                priority: 1,
                message: format!("parameter '{}' has no type annotation", self.ctx.interner.resolve(sym)),
                span: name.span,
            });
        }
        self.scopes.last_mut().unwrap().locals.insert(sym, VarInfo { ty: name.ty, is_fixed: name.ty.is_concrete(), is_const: false, span: name.span, used: false, kind: VarKind::Parameter });
    }

    fn declare_global(&mut self, name: &Identifier, ty: Type, is_fixed: bool, is_const: bool) {
        let Some(sym) = name.symbol else { return };
        self.globals.insert(sym, GlobalInfo { ty, is_fixed, is_const, span: name.span, used: false });
    }

    fn check_shadowing(&mut self, sym: InternedStr, span: SourceSpan) {
        let shadows = self.scopes.iter().rev().skip(1).any(|s| s.locals.contains_key(&sym)) || self.globals.contains_key(&sym);
        if shadows {
            let name = self.ctx.interner.resolve(sym).to_string();
            self.ctx.diagnostics.publish_tip(Tip {
                category: TipCategory::BestPractice,
                priority: 2,
                message: format!("'{name}' shadows a variable from an outer scope"),
                span,
            });
        }
    }

    /// `gl[A-Z]…`, `mX…`, or `ALL_CAPS_WITH_UNDERSCORES`.
    fn check_global_naming(&mut self, name: &str, span: SourceSpan) {
        let looks_conventional = {
            let gl_prefixed = name.len() > 2 && name.starts_with("gl") && name.as_bytes()[2].is_ascii_uppercase();
            let m_prefixed = name.len() > 1 && name.starts_with('m') && name.as_bytes()[1].is_ascii_uppercase();
            let all_caps = name.chars().all(|c| c.is_ascii_uppercase() || c == '_' || c.is_ascii_digit()) && name.chars().any(|c| c.is_ascii_alphabetic());
            gl_prefixed || m_prefixed || all_caps
        };
        if !looks_conventional {
            self.ctx.diagnostics.publish_tip(Tip {
                category: TipCategory::Style,
                priority: 3,
                message: format!("global '{name}' does not follow the gl/m/ALL_CAPS naming convention"),
                span,
            });
        }
    }

    fn walk_block(&mut self, block: &BlockStmt) {
        for stmt in &block.statements {
            self.walk_stmt(stmt);
        }
    }

    fn walk_stmt(&mut self, stmt: &StmtNode) {
        match &stmt.kind {
            StmtKind::LocalDecl(decl) => self.walk_decl(decl, false),
            StmtKind::GlobalDecl(decl) => self.walk_decl(decl, true),
            StmtKind::LocalFunction { name, function } => {
                self.declare_local(name, Type::Func, true, false);
                self.walk_function(Some(self.ctx.interner.resolve(name.symbol.unwrap()).to_string()), function, &[]);
            }
            StmtKind::Function { name, function } => {
                let self_names = function_self_names(self.ctx, name);
                let display_name = self_names.last().cloned();
                self.walk_function(display_name, function, &self_names);
            }
            StmtKind::Assignment(assign) => self.walk_assignment(assign),
            StmtKind::If(if_stmt) => {
                for clause in &if_stmt.clauses {
                    if let Some(cond) = &clause.condition {
                        self.infer_expression_type(cond);
                    }
                    self.push_scope();
                    self.walk_block(&clause.block);
                    self.pop_scope();
                }
            }
            StmtKind::Loop(loop_stmt) => {
                self.infer_expression_type(&loop_stmt.condition);
                self.loop_depth += 1;
                self.push_scope();
                self.walk_block(&loop_stmt.body);
                self.pop_scope();
                self.loop_depth -= 1;
            }
            StmtKind::NumericFor(for_stmt) => {
                self.infer_expression_type(&for_stmt.start);
                self.infer_expression_type(&for_stmt.stop);
                if let Some(step) = &for_stmt.step {
                    self.infer_expression_type(step);
                }
                self.loop_depth += 1;
                self.push_scope();
                self.declare_local(&for_stmt.control, Type::Num, true, false);
                self.walk_block(&for_stmt.body);
                self.pop_scope();
                self.loop_depth -= 1;
            }
            StmtKind::GenericFor(for_stmt) => {
                for it in &for_stmt.iterators {
                    self.infer_expression_type(it);
                }
                self.loop_depth += 1;
                self.push_scope();
                for name in &for_stmt.names {
                    self.declare_local(name, Type::Unknown, false, false);
                }
                self.walk_block(&for_stmt.body);
                self.pop_scope();
                self.loop_depth -= 1;
            }
            StmtKind::Do(block) | StmtKind::CompileTimeBlock(block) => {
                self.push_scope();
                self.walk_block(block);
                self.pop_scope();
            }
            StmtKind::Defer(defer) => {
                self.push_scope();
                for p in &defer.callable.parameters {
                    self.declare_parameter(&p.name);
                }
                self.walk_block(&defer.callable.body);
                self.pop_scope();
                for arg in &defer.arguments {
                    self.infer_expression_type(arg);
                }
            }
            StmtKind::Return(ret) => self.walk_return(stmt.span, ret),
            StmtKind::TryExcept(try_stmt) => {
                self.push_scope();
                self.walk_block(&try_stmt.try_block);
                self.pop_scope();
                for clause in &try_stmt.except_clauses {
                    self.push_scope();
                    if let Some(var) = &clause.exception_var {
                        self.declare_local(var, Type::Num, false, false);
                    }
                    for code in &clause.filter_codes {
                        self.infer_expression_type(code);
                    }
                    self.walk_block(&clause.block);
                    self.pop_scope();
                }
                if let Some(success) = &try_stmt.success_block {
                    self.push_scope();
                    self.walk_block(success);
                    self.pop_scope();
                }
            }
            StmtKind::Raise(raise) => {
                self.infer_expression_type(&raise.error_code);
                if let Some(msg) = &raise.message {
                    self.infer_expression_type(msg);
                }
            }
            StmtKind::Check(check) => {
                self.infer_expression_type(&check.error_code);
            }
            StmtKind::Import(import) => {
                self.push_scope();
                self.walk_block(&import.inlined_body);
                self.pop_scope();
            }
            StmtKind::ConditionalShorthand(shorthand) => {
                self.infer_expression_type(&shorthand.condition);
                if let crate::ast::stmt::ShorthandAction::Return(values) = &shorthand.action {
                    self.walk_return(stmt.span, &crate::ast::stmt::ReturnStmt { values: values.clone(), forwards_call: false });
                }
            }
            StmtKind::Expression(expr) => {
                self.infer_expression_type(expr);
            }
            StmtKind::Namespace { .. } | StmtKind::Break | StmtKind::Continue | StmtKind::Error | StmtKind::Block(_) => {}
        }
    }

    fn walk_decl(&mut self, decl: &crate::ast::stmt::LocalDeclStmt, is_global: bool) {
        let inferred: Vec<InferredType> = decl.values.iter().map(|v| self.infer_expression_type(v)).collect();
        for (i, name) in decl.names.iter().enumerate() {
            let value = inferred.get(i).copied();
            let (ty, is_fixed) = match (name.ty, value) {
                (explicit, _) if explicit.is_concrete() => (explicit, true),
                (_, Some(v)) if v.primary.is_concrete() && v.primary != Type::Nil => (v.primary, true),
                _ => (Type::Nil, false),
            };
            if is_global {
                self.declare_global(name, ty, is_fixed, name.has_const);
            } else {
                self.declare_local(name, ty, is_fixed, name.has_const);
            }
        }
    }

    fn walk_assignment(&mut self, assign: &crate::ast::stmt::AssignmentStmt) {
        let inferred: Vec<InferredType> = assign.values.iter().map(|v| self.infer_expression_type(v)).collect();
        for (i, target) in assign.targets.iter().enumerate() {
            let ExprKind::Identifier(name_ref) = &target.kind else {
                // only plain identifier targets are type-checked; member/index
                // assignment targets are out of scope for fixation.
                continue;
            };
            let Some(actual) = inferred.get(i).copied() else { continue };
            self.check_assignment_target(name_ref.symbol, name_ref.span, actual, assign.op);
        }
    }

    fn check_assignment_target(&mut self, sym: InternedStr, span: SourceSpan, actual: InferredType, _op: AssignOp) {
        let is_const = self.var_is_const(sym);
        if is_const {
            self.ctx.diagnostics.publish_type_diagnostic(TypeDiagnostic {
                code: ParserErrorCode::AssignToConstant,
                message: format!("cannot assign to '{}': declared <const>", self.ctx.interner.resolve(sym)),
                span,
            });
            return;
        }
        let Some((primary, is_fixed)) = self.var_type(sym) else { return };
        if is_fixed && primary != Type::Any {
            let ok = actual.primary == Type::Nil || actual.primary == Type::Any || actual.primary == primary;
            if !ok {
                let code = if matches!(primary, Type::Object(_)) { ParserErrorCode::ObjectClassMismatch } else { ParserErrorCode::TypeMismatchAssignment };
                self.ctx.diagnostics.publish_type_diagnostic(TypeDiagnostic {
                    code,
                    message: format!("cannot assign {:?} to a value fixed to {:?}", actual.primary, primary),
                    span,
                });
            }
            return;
        }
        if actual.primary.is_concrete() && actual.primary != Type::Nil {
            self.set_var_type(sym, actual.primary, true);
        }
    }

    fn var_is_const(&self, sym: InternedStr) -> bool {
        for scope in self.scopes.iter().rev() {
            if let Some(info) = scope.locals.get(&sym) {
                return info.is_const;
            }
        }
        self.globals.get(&sym).map(|g| g.is_const).unwrap_or(false)
    }

    fn var_type(&self, sym: InternedStr) -> Option<(Type, bool)> {
        for scope in self.scopes.iter().rev() {
            if let Some(info) = scope.locals.get(&sym) {
                return Some((info.ty, info.is_fixed));
            }
        }
        self.globals.get(&sym).map(|g| (g.ty, g.is_fixed))
    }

    fn set_var_type(&mut self, sym: InternedStr, ty: Type, is_fixed: bool) {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(info) = scope.locals.get_mut(&sym) {
                info.ty = ty;
                info.is_fixed = is_fixed;
                return;
            }
        }
        if let Some(g) = self.globals.get_mut(&sym) {
            g.ty = ty;
            g.is_fixed = is_fixed;
        }
    }

    fn walk_return(&mut self, span: SourceSpan, ret: &crate::ast::stmt::ReturnStmt) {
        let inferred: Vec<InferredType> = ret.values.iter().map(|v| self.infer_expression_type(v)).collect();

        let has_concrete_value = inferred.iter().any(|v| v.primary.is_concrete() && v.primary != Type::Nil);
        if let Some(func) = self.functions.last_mut() {
            if !ret.values.is_empty() {
                func.saw_return_with_values = true;
            }
            if func.return_type_inferred && func.expected_returns.count == 0 && has_concrete_value {
                let mut expected = FunctionReturnTypes::default();
                for v in &inferred {
                    expected.push(v.primary);
                }
                func.expected_returns = expected;
            }
        }

        let Some(func) = self.functions.last() else { return };
        let expected = func.expected_returns;
        if !expected.is_variadic && expected.is_explicit && ret.values.len() > expected.count as usize {
            self.ctx.diagnostics.publish_type_diagnostic(TypeDiagnostic {
                code: ParserErrorCode::ReturnCountMismatch,
                message: format!("function returns {} value(s), expected at most {}", ret.values.len(), expected.count),
                span,
            });
        }
        for (i, actual) in inferred.iter().enumerate() {
            let Some(expected_ty) = expected.get(i) else { continue };
            if !expected_ty.is_concrete() {
                continue;
            }
            let ok = actual.primary == Type::Nil || actual.primary == Type::Any || actual.primary == expected_ty;
            if !ok {
                self.ctx.diagnostics.publish_type_diagnostic(TypeDiagnostic {
                    code: ParserErrorCode::ReturnTypeMismatch,
                    message: format!("return slot {i} is {:?}, expected {:?}", actual.primary, expected_ty),
                    span,
                });
            } else if func_return_type_inferred(self.functions.last()) {
                // a later concrete return upgrades a still-nil/any slot.
            }
        }
    }

    fn walk_function(&mut self, name: Option<String>, function: &FunctionExprPayload, self_call_names: &[String]) {
        if !function.return_types.is_explicit && !function.is_thunk {
            self.ctx.diagnostics.publish_tip(Tip {
                category: TipCategory::TypeSafety,
                priority: 1,
                message: "function has no explicit return type".into(),
                span: function.body.statements.first().map(|s| s.span).unwrap_or_default(),
            });
        }
        self.functions.push(FunctionContext {
            function_name: name,
            expected_returns: function.return_types,
            return_type_inferred: !function.return_types.is_explicit,
            self_call_names: self_call_names.to_vec(),
            saw_recursive_call: false,
            saw_return_with_values: false,
        });
        self.push_scope();
        for p in &function.parameters {
            if !p.is_self {
                self.declare_parameter(&p.name);
            } else {
                self.declare_parameter(&p.name);
            }
        }
        self.detect_recursion(&function.body);
        self.walk_block(&function.body);
        self.pop_scope();
        let func = self.functions.pop().unwrap();
        if func.saw_recursive_call && func.saw_return_with_values && !function.return_types.is_explicit {
            self.ctx.diagnostics.publish_type_diagnostic(TypeDiagnostic {
                code: ParserErrorCode::RecursiveFunctionNeedsType,
                message: format!("recursive function{} needs an explicit return-type annotation", func.function_name.map(|n| format!(" '{n}'")).unwrap_or_default()),
                span: function.body.statements.first().map(|s| s.span).unwrap_or_default(),
            });
        }
    }

    /// Scans the body (shallowly through nested blocks, not into nested
    /// function literals) for a direct call to one of `self_call_names`
    ///.
    fn detect_recursion(&mut self, body: &BlockStmt) {
        let names: Vec<String> = self.functions.last().map(|f| f.self_call_names.clone()).unwrap_or_default();
        if names.is_empty() {
            return;
        }
        let mut found = false;
        visit_calls(body, &mut |call| {
            if let CallTarget::Direct(target) = &call.target {
                if let ExprKind::Identifier(r) = &target.kind {
                    if names.iter().any(|n| n == self.ctx.interner.resolve(r.symbol)) {
                        found = true;
                    }
                }
            }
            if let CallTarget::Method(_, method) | CallTarget::SafeMethod(_, method) = &call.target {
                if let Some(sym) = method.symbol {
                    if names.iter().any(|n| n == self.ctx.interner.resolve(sym)) {
                        found = true;
                    }
                }
            }
        });
        if found {
            if let Some(func) = self.functions.last_mut() {
                func.saw_recursive_call = true;
            }
        }
    }

    fn infer_expression_type(&mut self, expr: &ExprNode) -> InferredType {
        match &expr.kind {
            ExprKind::Literal(lit) => self.infer_literal(lit),
            ExprKind::Identifier(name_ref) => {
                if let Some(found) = self.resolve(name_ref.symbol) {
                    found
                } else {
                    InferredType::any()
                }
            }
            ExprKind::VarArg => InferredType::any(),
            ExprKind::Unary { op, operand } => {
                let inner = self.infer_expression_type(operand);
                match op {
                    UnOp::Not => InferredType::concrete(Type::Bool),
                    UnOp::Negate | UnOp::Length | UnOp::BitNot => InferredType::concrete(Type::Num),
                }
                .also_constant(inner.is_constant)
            }
            ExprKind::Update { operand, .. } => {
                self.infer_expression_type(operand);
                InferredType::concrete(Type::Num)
            }
            ExprKind::Binary { op, left, right } => self.infer_binary(*op, left, right),
            ExprKind::Ternary { condition, if_true, if_false } => {
                self.infer_expression_type(condition);
                let t = self.infer_expression_type(if_true);
                let f = self.infer_expression_type(if_false);
                if t.primary.is_concrete() {
                    t
                } else {
                    f
                }
            }
            ExprKind::Presence { value } => self.infer_expression_type(value),
            ExprKind::Call(call) => self.infer_call(call),
            ExprKind::Member { table, .. } | ExprKind::SafeMember { table, .. } => {
                self.infer_expression_type(table);
                InferredType::any()
            }
            ExprKind::Index { table, index } | ExprKind::SafeIndex { table, index } => {
                self.infer_expression_type(table);
                self.infer_expression_type(index);
                InferredType::any()
            }
            ExprKind::Table(table) => {
                if self.loop_depth > 0 {
                    // performance tip deliberately omitted for table literals:
                    // only function expressions and `..` get the in-loop-allocation tip.
                }
                for field in &table.fields {
                    if let Some(key) = &field.key {
                        self.infer_expression_type(key);
                    }
                    self.infer_expression_type(&field.value);
                }
                InferredType::concrete(Type::Table)
            }
            ExprKind::Range(range) => {
                self.infer_expression_type(&range.start);
                self.infer_expression_type(&range.stop);
                InferredType::concrete(Type::Table)
            }
            ExprKind::Function(function) => {
                if self.loop_depth > 0 {
                    self.ctx.diagnostics.publish_tip(Tip {
                        category: TipCategory::Performance,
                        priority: 2,
                        message: "function expression created inside a loop".into(),
                        span: expr.span,
                    });
                }
                self.walk_function(None, function, &[]);
                InferredType::concrete(Type::Func)
            }
            ExprKind::Pipe(pipe) => {
                self.infer_expression_type(&pipe.lhs);
                self.infer_expression_type(&pipe.rhs);
                InferredType::any()
            }
            ExprKind::ResultFilter(filter) => {
                self.infer_expression_type(&filter.call);
                InferredType::any()
            }
            ExprKind::Choose(choose) => self.infer_choose(choose),
        }
    }

    fn infer_literal(&self, lit: &LiteralValue) -> InferredType {
        let mut inferred = match lit {
            LiteralValue::Nil => InferredType::concrete(Type::Nil),
            LiteralValue::Bool(_) => InferredType::concrete(Type::Bool),
            LiteralValue::Num(_) => InferredType::concrete(Type::Num),
            LiteralValue::Str(_) => InferredType::concrete(Type::Str),
        };
        inferred.is_constant = true;
        inferred.is_nullable = matches!(lit, LiteralValue::Nil);
        inferred
    }

    fn infer_binary(&mut self, op: BinOp, left: &ExprNode, right: &ExprNode) -> InferredType {
        if op == BinOp::Concat && self.loop_depth > 0 {
            self.ctx.diagnostics.publish_tip(Tip {
                category: TipCategory::Performance,
                priority: 2,
                message: "string concatenation inside a loop".into(),
                span: left.span.to(right.span),
            });
        }
        let l = self.infer_expression_type(left);
        let r = self.infer_expression_type(right);
        match op {
            BinOp::Equal
            | BinOp::NotEqual
            | BinOp::LessThan
            | BinOp::LessEqual
            | BinOp::GreaterThan
            | BinOp::GreaterEqual => InferredType::concrete(Type::Bool),
            BinOp::Add
            | BinOp::Sub
            | BinOp::Mul
            | BinOp::Div
            | BinOp::Mod
            | BinOp::Power
            | BinOp::BitAnd
            | BinOp::BitOr
            | BinOp::BitXor
            | BinOp::ShiftLeft
            | BinOp::ShiftRight => InferredType::concrete(Type::Num),
            BinOp::Concat => InferredType::concrete(Type::Str),
            BinOp::LogicalAnd => {
                if l.primary.is_concrete() && l.primary == r.primary {
                    InferredType::concrete(l.primary)
                } else if l.primary.is_concrete() {
                    l
                } else {
                    InferredType::any()
                }
            }
            BinOp::LogicalOr => {
                if l.primary.is_concrete() && l.primary == r.primary {
                    InferredType::concrete(l.primary)
                } else if r.primary.is_concrete() {
                    r
                } else {
                    InferredType::any()
                }
            }
            BinOp::IfEmpty => {
                if l.primary.is_concrete() {
                    l
                } else {
                    r
                }
            }
        }
    }

    fn infer_call(&mut self, call: &crate::ast::expr::CallExpr) -> InferredType {
        match &call.target {
            CallTarget::Direct(target) => {
                self.infer_expression_type(target);
            }
            CallTarget::Method(receiver, _) | CallTarget::SafeMethod(receiver, _) => {
                self.infer_expression_type(receiver);
            }
        }
        for arg in &call.arguments {
            self.infer_expression_type(arg);
        }
        if let Some(ty) = call.result_type {
            return InferredType::concrete(ty);
        }
        InferredType::any()
    }

    fn infer_choose(&mut self, choose: &crate::ast::expr::ChooseExpr) -> InferredType {
        if let Some(scrutinee) = &choose.scrutinee {
            self.infer_expression_type(scrutinee);
        }
        for s in &choose.scrutinee_tuple {
            self.infer_expression_type(s);
        }
        let mut agreed: Option<Type> = None;
        let mut first = true;
        for case in &choose.cases {
            if let Some(guard) = &case.guard {
                self.infer_expression_type(guard);
            }
            let ty = match &case.result {
                crate::ast::expr::ChooseResult::Expr(e) => self.infer_expression_type(e).primary,
                crate::ast::expr::ChooseResult::Stmt(s) => {
                    self.walk_stmt(s);
                    Type::Any
                }
            };
            if first {
                agreed = Some(ty);
                first = false;
            } else if agreed != Some(ty) {
                agreed = None;
            }
        }
        match agreed {
            Some(ty) if ty.is_concrete() => InferredType::concrete(ty),
            _ => InferredType::any(),
        }
    }
}

impl InferredType {
    fn also_constant(mut self, is_constant: bool) -> Self {
        self.is_constant = is_constant;
        self
    }
}

fn object_class(ty: Type) -> Option<u32> {
    match ty {
        Type::Object(id) => Some(id),
        _ => None,
    }
}

fn func_return_type_inferred(func: Option<&FunctionContext>) -> bool {
    func.map(|f| f.return_type_inferred).unwrap_or(false)
}

fn function_self_names(ctx: &mut ParserContext, name: &crate::ast::stmt::FunctionNamePath) -> Vec<String> {
    let mut names = Vec::new();
    if let Some(last) = name.segments.last() {
        if let Some(sym) = last.symbol {
            names.push(ctx.interner.resolve(sym).to_string());
        }
    }
    if let Some(method) = &name.method {
        if let Some(sym) = method.symbol {
            names.push(ctx.interner.resolve(sym).to_string());
        }
    }
    names
}

/// Walks every `CallExpr` reachable from `body` without descending into
/// nested function-literal bodies.
fn visit_calls(body: &BlockStmt, f: &mut impl FnMut(&crate::ast::expr::CallExpr)) {
    for stmt in &body.statements {
        visit_calls_in_stmt(stmt, f);
    }
}

fn visit_calls_in_stmt(stmt: &StmtNode, f: &mut impl FnMut(&crate::ast::expr::CallExpr)) {
    match &stmt.kind {
        StmtKind::LocalDecl(d) | StmtKind::GlobalDecl(d) => d.values.iter().for_each(|e| visit_calls_in_expr(e, f)),
        StmtKind::Assignment(a) => {
            a.targets.iter().for_each(|e| visit_calls_in_expr(e, f));
            a.values.iter().for_each(|e| visit_calls_in_expr(e, f));
        }
        StmtKind::If(s) => s.clauses.iter().for_each(|c| {
            if let Some(cond) = &c.condition {
                visit_calls_in_expr(cond, f);
            }
            visit_calls(&c.block, f);
        }),
        StmtKind::Loop(s) => {
            visit_calls_in_expr(&s.condition, f);
            visit_calls(&s.body, f);
        }
        StmtKind::NumericFor(s) => {
            visit_calls_in_expr(&s.start, f);
            visit_calls_in_expr(&s.stop, f);
            if let Some(step) = &s.step {
                visit_calls_in_expr(step, f);
            }
            visit_calls(&s.body, f);
        }
        StmtKind::GenericFor(s) => {
            s.iterators.iter().for_each(|e| visit_calls_in_expr(e, f));
            visit_calls(&s.body, f);
        }
        StmtKind::Do(b) | StmtKind::CompileTimeBlock(b) => visit_calls(b, f),
        StmtKind::Defer(s) => s.arguments.iter().for_each(|e| visit_calls_in_expr(e, f)),
        StmtKind::Return(s) => s.values.iter().for_each(|e| visit_calls_in_expr(e, f)),
        StmtKind::TryExcept(s) => {
            visit_calls(&s.try_block, f);
            s.except_clauses.iter().for_each(|c| visit_calls(&c.block, f));
            if let Some(success) = &s.success_block {
                visit_calls(success, f);
            }
        }
        StmtKind::Raise(s) => {
            visit_calls_in_expr(&s.error_code, f);
            if let Some(msg) = &s.message {
                visit_calls_in_expr(msg, f);
            }
        }
        StmtKind::Check(s) => visit_calls_in_expr(&s.error_code, f),
        StmtKind::Import(s) => visit_calls(&s.inlined_body, f),
        StmtKind::ConditionalShorthand(s) => {
            visit_calls_in_expr(&s.condition, f);
            if let crate::ast::stmt::ShorthandAction::Return(values) = &s.action {
                values.iter().for_each(|e| visit_calls_in_expr(e, f));
            }
        }
        StmtKind::Expression(e) => visit_calls_in_expr(e, f),
        StmtKind::LocalFunction { .. } | StmtKind::Function { .. } | StmtKind::Namespace { .. } | StmtKind::Break | StmtKind::Continue | StmtKind::Error | StmtKind::Block(_) => {}
    }
}

fn visit_calls_in_expr(expr: &ExprNode, f: &mut impl FnMut(&crate::ast::expr::CallExpr)) {
    match &expr.kind {
        ExprKind::Call(call) => {
            f(call);
            match &call.target {
                CallTarget::Direct(t) => visit_calls_in_expr(t, f),
                CallTarget::Method(r, _) | CallTarget::SafeMethod(r, _) => visit_calls_in_expr(r, f),
            }
            call.arguments.iter().for_each(|a| visit_calls_in_expr(a, f));
        }
        ExprKind::Unary { operand, .. } => visit_calls_in_expr(operand, f),
        ExprKind::Update { operand, .. } => visit_calls_in_expr(operand, f),
        ExprKind::Binary { left, right, .. } => {
            visit_calls_in_expr(left, f);
            visit_calls_in_expr(right, f);
        }
        ExprKind::Ternary { condition, if_true, if_false } => {
            visit_calls_in_expr(condition, f);
            visit_calls_in_expr(if_true, f);
            visit_calls_in_expr(if_false, f);
        }
        ExprKind::Presence { value } => visit_calls_in_expr(value, f),
        ExprKind::Member { table, .. } | ExprKind::SafeMember { table, .. } => visit_calls_in_expr(table, f),
        ExprKind::Index { table, index } | ExprKind::SafeIndex { table, index } => {
            visit_calls_in_expr(table, f);
            visit_calls_in_expr(index, f);
        }
        ExprKind::Table(table) => {
            for field in &table.fields {
                if let Some(key) = &field.key {
                    visit_calls_in_expr(key, f);
                }
                visit_calls_in_expr(&field.value, f);
            }
        }
        ExprKind::Range(range) => {
            visit_calls_in_expr(&range.start, f);
            visit_calls_in_expr(&range.stop, f);
        }
        ExprKind::Pipe(pipe) => {
            visit_calls_in_expr(&pipe.lhs, f);
            visit_calls_in_expr(&pipe.rhs, f);
        }
        ExprKind::ResultFilter(filter) => visit_calls_in_expr(&filter.call, f),
        ExprKind::Choose(choose) => {
            if let Some(s) = &choose.scrutinee {
                visit_calls_in_expr(s, f);
            }
            choose.scrutinee_tuple.iter().for_each(|s| visit_calls_in_expr(s, f));
            for case in &choose.cases {
                if let Some(guard) = &case.guard {
                    visit_calls_in_expr(guard, f);
                }
                if let crate::ast::expr::ChooseResult::Expr(e) = &case.result {
                    visit_calls_in_expr(e, f);
                }
            }
        }
        // A nested function literal's own calls are not this function's
        // recursion.
        ExprKind::Function(_) => {}
        ExprKind::Literal(_) | ExprKind::Identifier(_) | ExprKind::VarArg => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::Severity;
    use crate::parser::test_support::Harness;

    fn analyze(src: &str) -> (BlockStmt, Harness) {
        let mut h = Harness::new();
        let block = h.parse(src);
        (block, h)
    }

    #[test]
    fn first_wins_fixes_local_type() {
        let (block, mut h) = analyze("local x = 1\nx = \"no\"");
        let mut ctx = h.make_ctx();
        run_type_analysis(&mut ctx, &block);
        assert!(ctx.diagnostics.entries().iter().any(|d| d.code == ParserErrorCode::TypeMismatchAssignment));
    }

    #[test]
    fn const_reassignment_is_rejected() {
        let (block, mut h) = analyze("x <const> = 1\nx = 2");
        let mut ctx = h.make_ctx();
        run_type_analysis(&mut ctx, &block);
        assert!(ctx.diagnostics.entries().iter().any(|d| d.code == ParserErrorCode::AssignToConstant));
    }

    #[test]
    fn recursive_function_without_annotation_is_flagged() {
        let (block, mut h) = analyze("function fact(n) if n <= 1 then return 1 end return n * fact(n-1) end");
        let mut ctx = h.make_ctx();
        run_type_analysis(&mut ctx, &block);
        assert!(ctx.diagnostics.entries().iter().any(|d| d.code == ParserErrorCode::RecursiveFunctionNeedsType));
    }

    #[test]
    fn recursive_function_with_annotation_is_not_flagged() {
        let (block, mut h) = analyze("function fact(n):num if n <= 1 then return 1 end return n * fact(n-1) end");
        let mut ctx = h.make_ctx();
        run_type_analysis(&mut ctx, &block);
        assert!(!ctx.diagnostics.entries().iter().any(|d| d.code == ParserErrorCode::RecursiveFunctionNeedsType));
    }

    #[test]
    fn unused_local_produces_a_tip_not_an_error() {
        let (block, mut h) = analyze("local unused_thing = 1");
        let mut ctx = h.make_ctx();
        run_type_analysis(&mut ctx, &block);
        assert!(ctx.diagnostics.entries().iter().all(|d| d.severity != Severity::Error));
        assert!(ctx.diagnostics.tips().iter().any(|t| t.message.contains("unused_thing")));
    }

    #[test]
    fn global_access_inside_loop_suggests_caching() {
        let (block, mut h) = analyze("global total = 0\nwhile total < 10 do\n  total = total + 1\nend");
        let mut ctx = h.make_ctx();
        run_type_analysis(&mut ctx, &block);
        assert!(ctx.diagnostics.tips().iter().any(|t| t.message.contains("caching")));
    }
}
