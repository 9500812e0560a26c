//! The parser context and the AST builder's top-level entry points.

pub mod desugar;
pub mod expressions;
pub mod imports;
pub mod statements;
pub mod types;

use crate::ast::{BlockStmt, StmtKind, StmtNode};
use crate::diagnostics::{Diagnostics, ParserErrorCode, Severity};
use crate::host::Host;
use crate::interner::Interner;
use crate::lexer::TokenStream;
use crate::parser::types::ClassRegistry;
use crate::source::{SourceIdx, SourceRegistry};
use crate::token::{Token, TokenKind};
use linked_hash_set::LinkedHashSet;

/// Configuration recognized by the parser context.
#[derive(Debug, Clone, Copy)]
pub struct ParserConfig {
    /// If false, use panic-mode (DIAGNOSE) recovery and continue past errors.
    pub abort_on_error: bool,
    /// Elevates type-analyzer findings from warning to error.
    pub type_errors_are_fatal: bool,
    /// Highest priority of tip that should be emitted, `0..=3`.
    pub tip_level: u8,
    /// Host-visible bitset; the type analyzer only reads `TRACE_TYPES`.
    pub jit_options: u32,
}

impl ParserConfig {
    pub const TRACE_TYPES: u32 = 1 << 0;

    pub fn traces_types(&self) -> bool {
        self.jit_options & Self::TRACE_TYPES != 0
    }
}

impl Default for ParserConfig {
    fn default() -> Self {
        Self { abort_on_error: false, type_errors_are_fatal: false, tip_level: 1, jit_options: 0 }
    }
}

/// Safety cap on panic-mode recovery and on the `@if`/`@end` nesting
/// tracker.
pub const RECOVERY_SKIP_CAP: usize = 1000;

/// The single mutable struct threaded through all parsing. The
/// source registry, interner and diagnostics sink are borrowed from the
/// owning `Compilation` so that nested contexts created for `import` can
/// reborrow the very same instances rather than cloning them.
pub struct ParserContext<'a> {
    pub tokens: TokenStream,
    pub source: SourceIdx,
    pub config: ParserConfig,
    pub function_depth: u32,
    pub diagnostics: &'a mut Diagnostics,
    pub registry: &'a mut SourceRegistry,
    pub interner: &'a mut Interner,
    pub host: &'a dyn Host,
    pub import_stack: &'a mut LinkedHashSet<String>,
    pub classes: &'a mut ClassRegistry,
}

impl<'a> ParserContext<'a> {
    pub fn new(
        tokens: TokenStream,
        source: SourceIdx,
        config: ParserConfig,
        diagnostics: &'a mut Diagnostics,
        registry: &'a mut SourceRegistry,
        interner: &'a mut Interner,
        host: &'a dyn Host,
        import_stack: &'a mut LinkedHashSet<String>,
        classes: &'a mut ClassRegistry,
    ) -> Self {
        Self { tokens, source, config, function_depth: 0, diagnostics, registry, interner, host, import_stack, classes }
    }

    pub fn current(&self) -> Token {
        self.tokens.current()
    }

    pub fn peek(&self, n: usize) -> Token {
        self.tokens.peek(n)
    }

    pub fn advance(&mut self) -> Token {
        self.tokens.advance()
    }

    pub fn previous(&self) -> Token {
        self.tokens.previous()
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.tokens.check(kind)
    }

    pub fn match_kind(&mut self, kind: TokenKind) -> Option<Token> {
        self.tokens.match_kind(kind)
    }

    /// `expect(kind, err_code)`: consumes and returns the
    /// current token if it matches, otherwise reports `err_code` at the
    /// current token's span and returns `None` without advancing — the
    /// caller decides how to recover.
    pub fn expect(&mut self, kind: TokenKind, err_code: ParserErrorCode) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            let tok = self.current();
            self.diagnostics.push_error(
                err_code,
                format!("expected {kind:?}, found {:?}", tok.kind),
                tok.span,
            );
            None
        }
    }

    pub fn error_at(&mut self, code: ParserErrorCode, message: impl Into<String>) {
        let span = self.current().span;
        self.diagnostics.push_error(code, message, span);
    }

    /// Reborrows the context's shared resources for a nested parse (used
    /// when inlining an import). The caller must not touch `self` again
    /// until the returned context is dropped.
    pub fn reborrow(
        &mut self,
        tokens: TokenStream,
        source: SourceIdx,
    ) -> ParserContext<'_> {
        ParserContext {
            tokens,
            source,
            config: self.config,
            function_depth: 0,
            diagnostics: &mut *self.diagnostics,
            registry: &mut *self.registry,
            interner: &mut *self.interner,
            host: self.host,
            import_stack: &mut *self.import_stack,
            classes: &mut *self.classes,
        }
    }
}

/// `parse_chunk(ctx) -> Result<BlockStmt, Vec<Diagnostic>>`:
/// parses a block terminated by EOF.
pub fn parse_chunk(ctx: &mut ParserContext) -> BlockStmt {
    let block = parse_block(ctx, &[]);
    if !ctx.check(TokenKind::EndOfFile) {
        ctx.error_at(ParserErrorCode::UnexpectedToken, "trailing tokens after chunk");
    }
    block
}

/// `parse_block(terminators)`: parses until EOF or any
/// terminator. In DIAGNOSE mode a failed statement drives
/// `skip_to_synchronisation_point`.
pub fn parse_block(ctx: &mut ParserContext, terminators: &[TokenKind]) -> BlockStmt {
    let mut block = BlockStmt::default();
    let mut terminating_seen = false;
    loop {
        if ctx.check(TokenKind::EndOfFile) || terminators.contains(&ctx.current().kind) {
            break;
        }
        let before = ctx.tokens.position();
        match statements::parse_statement(ctx) {
            Some(stmt) => {
                if terminating_seen {
                    emit_unreachable_tip(ctx, &stmt);
                }
                if is_terminating(&stmt.kind) {
                    terminating_seen = true;
                }
                block.statements.push(stmt);
            }
            None => {
                if ctx.config.abort_on_error {
                    break;
                }
                if ctx.tokens.position() == before {
                    // the failing production consumed nothing; force
                    // progress so recovery cannot spin forever.
                    ctx.advance();
                }
                skip_to_synchronisation_point(ctx, terminators);
                block.statements.push(StmtNode::new(ctx.current().span, StmtKind::Error));
            }
        }
    }
    block
}

fn is_terminating(kind: &StmtKind) -> bool {
    matches!(kind, StmtKind::Return(_) | StmtKind::Break | StmtKind::Continue)
}

fn emit_unreachable_tip(ctx: &mut ParserContext, stmt: &StmtNode) {
    use crate::diagnostics::{Tip, TipCategory};
    ctx.diagnostics.publish_tip(Tip {
        category: TipCategory::CodeQuality,
        priority: 2,
        message: "unreachable code".into(),
        span: stmt.span,
    });
}

/// Advances until either a statement-start token, a terminator, EOF, or the
/// per-block safety cap of `RECOVERY_SKIP_CAP` skips.
pub fn skip_to_synchronisation_point(ctx: &mut ParserContext, terminators: &[TokenKind]) {
    let start_span = ctx.current().span;
    let mut skipped = 0usize;
    while skipped < RECOVERY_SKIP_CAP {
        let kind = ctx.current().kind;
        if kind == TokenKind::EndOfFile || terminators.contains(&kind) || kind.is_statement_start() {
            break;
        }
        ctx.advance();
        skipped += 1;
    }
    if skipped > 0 {
        ctx.diagnostics.report(
            Severity::Info,
            ParserErrorCode::RecoverySkippedTokens,
            format!("recovered by skipping {skipped} token(s)"),
            start_span,
        );
    }
}

/// Test-only harness bundling the resources a `ParserContext` borrows, so
/// that module tests can parse a fragment of source without repeating the
/// wiring at every call site.
#[cfg(test)]
pub mod test_support {
    use super::*;
    use crate::host::NullHost;
    use crate::lexer::lex;

    pub struct Harness {
        pub diagnostics: Diagnostics,
        pub registry: SourceRegistry,
        pub interner: Interner,
        pub host: NullHost,
        pub import_stack: LinkedHashSet<String>,
        pub classes: ClassRegistry,
        last_source: Option<SourceIdx>,
    }

    impl Harness {
        pub fn new() -> Self {
            Self {
                diagnostics: Diagnostics::new(3, false),
                registry: SourceRegistry::new(),
                interner: Interner::new(),
                host: NullHost::default(),
                import_stack: LinkedHashSet::new(),
                classes: ClassRegistry::new(),
                last_source: None,
            }
        }

        /// Parses `src` as a whole chunk and returns the resulting block.
        pub fn parse(&mut self, src: &str) -> BlockStmt {
            let source = self.registry.register(src, "test.ds", None, 0);
            self.last_source = Some(source);
            let tokens = lex(src, source, &mut self.interner);
            let stream = TokenStream::new(tokens);
            let mut ctx = ParserContext::new(
                stream,
                source,
                ParserConfig::default(),
                &mut self.diagnostics,
                &mut self.registry,
                &mut self.interner,
                &self.host,
                &mut self.import_stack,
                &mut self.classes,
            );
            parse_chunk(&mut ctx)
        }

        /// Builds a bare `ParserContext` over the harness's resources without
        /// parsing anything new, for tests that only need to run the type
        /// analyzer over a block already produced by `parse`. Its token
        /// stream holds nothing but an end-of-file sentinel since the type
        /// analyzer never reads tokens.
        pub fn make_ctx(&mut self) -> ParserContext<'_> {
            let source = self
                .last_source
                .unwrap_or_else(|| self.registry.register("test.ds", "test.ds", None, 0));
            let stream = TokenStream::new(vec![Token::eof(crate::span::SourceSpan::new(0, 0, 1, 1, source))]);
            ParserContext::new(
                stream,
                source,
                ParserConfig::default(),
                &mut self.diagnostics,
                &mut self.registry,
                &mut self.interner,
                &self.host,
                &mut self.import_stack,
                &mut self.classes,
            )
        }
    }
}
