#![doc = include_str!("../README.md")]
// It would be nice to keep the front end free of unsafe code.
#![deny(unsafe_code)]

pub mod ast;
pub mod diagnostics;
pub mod host;
pub mod interner;
pub mod lexer;
pub mod parser;
pub mod source;
pub mod span;
pub mod token;
pub mod typeanalysis;

use ast::BlockStmt;
use diagnostics::Diagnostics;
use host::Host;
use interner::Interner;
use lexer::{lex, TokenStream};
use parser::types::ClassRegistry;
use parser::{parse_chunk, ParserConfig, ParserContext};
use source::{SourceIdx, SourceRegistry};
use typeanalysis::run_type_analysis;

/// Everything a caller needs to parse and analyze one or more Duskscript
/// source files sharing a single symbol table and diagnostics stream. A
/// `Compilation` owns the resources a `ParserContext` borrows, so repeated
/// calls to [`Compilation::compile`] accumulate diagnostics and source
/// registrations across files the way an `import` chain would.
pub struct Compilation {
    pub diagnostics: Diagnostics,
    pub registry: SourceRegistry,
    pub interner: Interner,
    pub classes: ClassRegistry,
    config: ParserConfig,
}

impl Compilation {
    pub fn new(config: ParserConfig) -> Self {
        Self {
            diagnostics: Diagnostics::new(config.tip_level, config.type_errors_are_fatal),
            registry: SourceRegistry::new(),
            interner: Interner::new(),
            classes: ClassRegistry::new(),
            config,
        }
    }

    /// Lexes, parses and type-checks `text` as a top-level chunk, registering
    /// it under `filename` in the source registry. Returns the parsed block
    /// regardless of whether errors were reported; callers inspect
    /// `self.diagnostics.has_errors()` to decide whether to proceed.
    pub fn compile(&mut self, filename: &str, text: &str, host: &dyn Host) -> (BlockStmt, SourceIdx) {
        let source = self.registry.register(filename, filename, None, 0);
        let tokens = lex(text, source, &mut self.interner);
        let stream = TokenStream::new(tokens);
        let mut import_stack = linked_hash_set::LinkedHashSet::new();
        let mut ctx = ParserContext::new(
            stream,
            source,
            self.config,
            &mut self.diagnostics,
            &mut self.registry,
            &mut self.interner,
            host,
            &mut import_stack,
            &mut self.classes,
        );
        let block = parse_chunk(&mut ctx);
        if !ctx.diagnostics.has_errors() {
            run_type_analysis(&mut ctx, &block);
        }
        (block, source)
    }
}
