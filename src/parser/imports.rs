//! `import`/circular-import handling.
//!
//! An import is resolved to a host path, read through the `Host`, lexed and
//! parsed as a nested block using a reborrowed `ParserContext` over the very
//! same diagnostics/registry/interner, then inlined directly into the
//! importing chunk's statement list — there is no separate module/unit
//! representation downstream of this core.

use crate::ast::stmt::{ImportStmt, StmtKind, StmtNode};
use crate::ast::types::Identifier;
use crate::diagnostics::ParserErrorCode;
use crate::lexer::{lex, TokenStream};
use crate::parser::{parse_block, ParserContext};
use crate::token::TokenKind;

/// `import 'lib/path' [as name]`. Only legal at the top level
/// of a chunk (`function_depth == 0`); nested imports are flagged but still
/// parsed so DIAGNOSE mode can keep going.
pub fn parse_import_stmt(ctx: &mut ParserContext) -> Option<StmtNode> {
    let start = ctx.advance().span; // 'import'
    if ctx.function_depth > 0 {
        ctx.error_at(ParserErrorCode::IllegalImportPosition, "'import' is only allowed at the top level of a chunk");
    }
    let path_tok = ctx.expect(TokenKind::String, ParserErrorCode::ExpectedExpression)?;
    let lib_path = ctx.interner.resolve(path_tok.interned().unwrap()).to_string();

    let namespace_name = if ctx.match_kind(TokenKind::AsToken).is_some() {
        let tok = ctx.expect(TokenKind::Identifier, ParserErrorCode::ExpectedIdentifier)?;
        Some(Identifier::named(tok.interned().unwrap(), tok.span))
    } else {
        None
    };

    let end_span = namespace_name.as_ref().map(|n| n.span).unwrap_or(path_tok.span);
    let span = start.to(end_span);
    let default_namespace = default_namespace_for(&lib_path);

    let (inlined_body, file_source_idx) = inline_import(ctx, &lib_path, start.line);

    Some(StmtNode::new(
        span,
        StmtKind::Import(ImportStmt { lib_path, inlined_body, namespace_name, default_namespace, file_source_idx }),
    ))
}

/// The namespace a file is addressed under when no explicit `as` or
/// `namespace` statement overrides it: the file stem.
fn default_namespace_for(lib_path: &str) -> String {
    let file_name = lib_path.rsplit('/').next().unwrap_or(lib_path);
    file_name.split('.').next().unwrap_or(file_name).to_string()
}

/// Resolves, reads and recursively parses the imported file, reporting
/// `CircularImport`/`CannotOpenImport`/`CannotReadImport` on failure and wrapping any diagnostics the nested parse raised with the
/// "in imported file '<path>'" prefix. Returns an empty block on any
/// failure so the importing chunk still parses to completion.
fn inline_import(ctx: &mut ParserContext, lib_path: &str, import_line: u32) -> (crate::ast::BlockStmt, crate::source::SourceIdx) {
    let empty = (crate::ast::BlockStmt::default(), ctx.source);

    if ctx.import_stack.contains(lib_path) {
        ctx.error_at(ParserErrorCode::CircularImport, format!("circular import of '{lib_path}'"));
        return empty;
    }

    let Ok(resolved_path) = ctx.host.resolve_path(lib_path) else {
        ctx.error_at(ParserErrorCode::CannotOpenImport, format!("cannot open import '{lib_path}'"));
        return empty;
    };

    let Ok(opened) = ctx.host.open_file(&resolved_path) else {
        ctx.error_at(ParserErrorCode::CannotReadImport, format!("cannot read import '{lib_path}'"));
        return empty;
    };

    let child_source = ctx.registry.register(&resolved_path, lib_path, Some(ctx.source), import_line);
    let mut line_count = 1u32;
    for byte in opened.contents.bytes() {
        if byte == b'\n' {
            line_count += 1;
        }
    }
    ctx.registry.set_total_lines(child_source, line_count);

    ctx.import_stack.insert(lib_path.to_string());
    let diagnostics_before = ctx.diagnostics.entries().len();

    let tokens = lex(&opened.contents, child_source, ctx.interner);
    let stream = TokenStream::new(tokens);
    let mut child_ctx = ctx.reborrow(stream, child_source);
    let block = parse_block(&mut child_ctx, &[]);

    ctx.import_stack.pop_back();
    ctx.diagnostics.wrap_import_errors(lib_path, diagnostics_before);

    (block, child_source)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::StmtKind;
    use crate::diagnostics::Diagnostics;
    use crate::host::MapHost;
    use crate::interner::Interner;
    use crate::lexer::lex;
    use crate::parser::types::ClassRegistry;
    use crate::parser::{ParserConfig, ParserContext};
    use crate::source::SourceRegistry;
    use linked_hash_set::LinkedHashSet;

    fn parse_with_host(src: &str, host: &MapHost) -> (crate::ast::BlockStmt, Diagnostics) {
        let mut diagnostics = Diagnostics::new(0, false);
        let mut registry = SourceRegistry::new();
        let mut interner = Interner::new();
        let mut import_stack = LinkedHashSet::new();
        let mut classes = ClassRegistry::new();
        let source = registry.register("main.ds", "main.ds", None, 0);
        let tokens = lex(src, source, &mut interner);
        let stream = TokenStream::new(tokens);
        let mut ctx = ParserContext::new(
            stream,
            source,
            ParserConfig::default(),
            &mut diagnostics,
            &mut registry,
            &mut interner,
            host,
            &mut import_stack,
            &mut classes,
        );
        let block = crate::parser::parse_chunk(&mut ctx);
        (block, diagnostics)
    }

    #[test]
    fn import_inlines_child_statements() {
        let mut files = std::collections::HashMap::new();
        files.insert("lib/util.ds".to_string(), "local x = 1".to_string());
        let host = MapHost { files, platform: "generic".into(), debug: false };
        let (block, diagnostics) = parse_with_host("import 'lib/util.ds'", &host);
        assert!(diagnostics.entries().is_empty());
        let StmtKind::Import(import) = &block.statements[0].kind else { panic!() };
        assert_eq!(import.inlined_body.statements.len(), 1);
    }

    #[test]
    fn circular_import_is_reported() {
        let mut files = std::collections::HashMap::new();
        files.insert("lib/a.ds".to_string(), "import 'lib/a.ds'".to_string());
        let host = MapHost { files, platform: "generic".into(), debug: false };
        let (_block, diagnostics) = parse_with_host("import 'lib/a.ds'", &host);
        assert!(diagnostics.entries().iter().any(|d| d.code == ParserErrorCode::CircularImport));
    }

    #[test]
    fn missing_import_reports_cannot_open() {
        let host = MapHost::default();
        let (_block, diagnostics) = parse_with_host("import 'nowhere.ds'", &host);
        assert!(diagnostics.entries().iter().any(|d| d.code == ParserErrorCode::CannotOpenImport));
    }
}
