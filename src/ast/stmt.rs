//! Statement AST nodes.

use crate::ast::expr::{AssignOp, ExprNode, FunctionExprPayload};
use crate::ast::types::Identifier;
use crate::source::SourceIdx;
use crate::span::SourceSpan;

#[derive(Debug, Clone, Default)]
pub struct BlockStmt {
    pub statements: Vec<StmtNode>,
}

#[derive(Debug, Clone)]
pub struct StmtNode {
    pub span: SourceSpan,
    pub kind: StmtKind,
}

impl StmtNode {
    pub fn new(span: SourceSpan, kind: StmtKind) -> Self {
        Self { span, kind }
    }
}

#[derive(Debug, Clone)]
pub struct LocalDeclStmt {
    pub op: AssignOp,
    pub names: Vec<Identifier>,
    pub values: Vec<ExprNode>,
}

#[derive(Debug, Clone)]
pub struct FunctionNamePath {
    pub segments: Vec<Identifier>,
    pub method: Option<Identifier>,
    pub is_explicit_global: bool,
}

#[derive(Debug, Clone)]
pub struct AssignmentStmt {
    pub op: AssignOp,
    pub targets: Vec<ExprNode>,
    pub values: Vec<ExprNode>,
}

#[derive(Debug, Clone)]
pub struct IfClause {
    pub condition: Option<ExprNode>,
    pub block: BlockStmt,
}

#[derive(Debug, Clone)]
pub struct IfStmt {
    pub clauses: Vec<IfClause>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopStyle {
    While,
    Repeat,
}

#[derive(Debug, Clone)]
pub struct LoopStmtPayload {
    pub style: LoopStyle,
    pub condition: ExprNode,
    pub body: BlockStmt,
}

#[derive(Debug, Clone)]
pub struct NumericForStmt {
    pub control: Identifier,
    pub start: ExprNode,
    pub stop: ExprNode,
    pub step: Option<ExprNode>,
    pub body: BlockStmt,
}

#[derive(Debug, Clone)]
pub struct GenericForStmt {
    pub names: Vec<Identifier>,
    pub iterators: Vec<ExprNode>,
    pub body: BlockStmt,
}

#[derive(Debug, Clone)]
pub struct DeferStmt {
    pub callable: FunctionExprPayload,
    pub arguments: Vec<ExprNode>,
}

#[derive(Debug, Clone)]
pub struct ReturnStmt {
    pub values: Vec<ExprNode>,
    pub forwards_call: bool,
}

#[derive(Debug, Clone)]
pub struct ExceptClause {
    pub exception_var: Option<Identifier>,
    pub filter_codes: Vec<ExprNode>,
    pub block: BlockStmt,
}

#[derive(Debug, Clone)]
pub struct TryExceptStmt {
    pub try_block: BlockStmt,
    pub except_clauses: Vec<ExceptClause>,
    pub success_block: Option<BlockStmt>,
    pub enable_trace: bool,
}

#[derive(Debug, Clone)]
pub struct RaiseStmt {
    pub error_code: ExprNode,
    pub message: Option<ExprNode>,
}

#[derive(Debug, Clone)]
pub struct CheckStmt {
    pub error_code: ExprNode,
}

#[derive(Debug, Clone)]
pub struct ImportStmt {
    pub lib_path: String,
    pub inlined_body: BlockStmt,
    pub namespace_name: Option<Identifier>,
    pub default_namespace: String,
    pub file_source_idx: SourceIdx,
}

#[derive(Debug, Clone)]
pub enum ShorthandAction {
    Return(Vec<ExprNode>),
    Break,
    Continue,
}

#[derive(Debug, Clone)]
pub struct ConditionalShorthandStmt {
    pub condition: ExprNode,
    pub action: ShorthandAction,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Block(BlockStmt),
    LocalDecl(LocalDeclStmt),
    GlobalDecl(LocalDeclStmt),
    LocalFunction { name: Identifier, function: FunctionExprPayload },
    Function { name: FunctionNamePath, function: FunctionExprPayload },
    Assignment(AssignmentStmt),
    If(IfStmt),
    Loop(LoopStmtPayload),
    NumericFor(NumericForStmt),
    GenericFor(GenericForStmt),
    Do(BlockStmt),
    Defer(DeferStmt),
    Return(ReturnStmt),
    TryExcept(TryExceptStmt),
    Raise(RaiseStmt),
    Check(CheckStmt),
    Import(ImportStmt),
    Namespace { name: String, span: SourceSpan },
    ConditionalShorthand(ConditionalShorthandStmt),
    Expression(ExprNode),
    Break,
    Continue,
    /// The `@if (...) ... @end` wrapper around a block whose condition
    /// evaluated to true at parse time — transparent to
    /// later passes, matching how `do ... end` is transparent.
    CompileTimeBlock(BlockStmt),
    /// A no-op placeholder left where a statement failed to parse in
    /// DIAGNOSE mode, keeping the block's statement vector free of gaps
    /// while still recording
    /// that recovery skipped forward from this point.
    Error,
}
