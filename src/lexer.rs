//! The lexer and the token-stream adapter built on top of it.
//!
//! `lex` converts a whole source buffer into a `Vec<Token>` eagerly; a
//! lazily-fed token sequence is realized as a `TokenStream` wrapping that
//! vector with a cursor and a lookahead ring, rather than re-lexing on
//! demand — simpler, and the whole buffer already has to be resident for
//! span byte-offsets to make sense.

use crate::interner::Interner;
use crate::source::SourceIdx;
use crate::span::SourceSpan;
use crate::token::{Token, TokenKind, TokenPayload};

/// Per-lex-run state. Kept as a distinct struct even though the current
/// rule set needs only line/column tracking: it is
/// the natural extension point for any future rule that needs to remember
/// something across calls (e.g. nested string templates, should one ever be
/// added to the grammar).
#[derive(Default)]
struct LexState {
    line: u32,
    column: u32,
}

impl LexState {
    fn advance(&mut self, text: &str) {
        for c in text.chars() {
            if c == '\n' {
                self.line += 1;
                self.column = 1;
            } else {
                self.column += 1;
            }
        }
    }
}

fn lex_whitespace(text: &str) -> usize {
    text.chars().take_while(|c| c.is_whitespace()).map(|c| c.len_utf8()).sum()
}

/// Returns the length of a `//` or `/* */` comment (possibly nested), or 0
/// if `text` does not start with one. An unterminated block comment
/// consumes to the end of input rather than panicking; the caller is
/// responsible for flagging that with a diagnostic upstream if desired.
fn lex_comment(text: &str) -> usize {
    if let Some(rest) = text.strip_prefix("//") {
        return 2 + rest.find(['\n', '\r']).unwrap_or(rest.len());
    }
    if text.starts_with("/*") {
        let mut nested = 0usize;
        let mut offset = 2;
        while offset < text.len() {
            if text[offset..].starts_with("/*") {
                nested += 1;
                offset += 2;
            } else if text[offset..].starts_with("*/") {
                if nested == 0 {
                    return offset + 2;
                }
                nested -= 1;
                offset += 2;
            } else {
                offset += 1;
            }
        }
        return text.len();
    }
    0
}

fn lex_number(text: &str) -> usize {
    let mut len = 0;
    let mut had_period = false;
    let mut had_exp = false;
    loop {
        let Some(c) = text[len..].chars().next() else { break };
        if c.is_ascii_digit() {
            len += 1;
        } else if c == '.' && !had_period && !had_exp && text[len + 1..].starts_with(|d: char| d.is_ascii_digit()) {
            had_period = true;
            len += 1;
        } else if (c == 'e' || c == 'E') && len > 0 && !had_exp {
            let mut probe = len + 1;
            if text[probe..].starts_with(['+', '-']) {
                probe += 1;
            }
            if text[probe..].starts_with(|d: char| d.is_ascii_digit()) {
                had_exp = true;
                len = probe;
            } else {
                break;
            }
        } else {
            break;
        }
    }
    len
}

fn lex_identifier(text: &str) -> usize {
    let mut len = 0;
    for (i, c) in text.char_indices() {
        if i == 0 {
            if c.is_alphabetic() || c == '_' {
                len = c.len_utf8();
                continue;
            } else {
                break;
            }
        }
        if c.is_alphanumeric() || c == '_' {
            len += c.len_utf8();
        } else {
            break;
        }
    }
    len
}

/// Returns the length of a well-formed double-quoted string literal
/// including both quotes, and the unescaped text (used to build the
/// payload), or `None` if the string is unterminated.
fn lex_string(text: &str) -> Option<(usize, String)> {
    if !text.starts_with('"') {
        return None;
    }
    let bytes = text.as_bytes();
    let mut i = 1;
    let mut out = String::new();
    loop {
        if i >= bytes.len() {
            return None;
        }
        match bytes[i] {
            b'"' => return Some((i + 1, out)),
            b'\\' => {
                if i + 1 >= bytes.len() {
                    return None;
                }
                let escaped = match bytes[i + 1] {
                    b'n' => '\n',
                    b't' => '\t',
                    b'r' => '\r',
                    b'0' => '\0',
                    b'"' => '"',
                    b'\\' => '\\',
                    other => other as char,
                };
                out.push(escaped);
                i += 2;
            }
            _ => {
                let c = text[i..].chars().next().unwrap();
                out.push(c);
                i += c.len_utf8();
            }
        }
    }
}

fn keyword_kind(word: &str) -> Option<TokenKind> {
    use TokenKind::*;
    Some(match word {
        "local" => Local,
        "global" => Global,
        "function" => Function,
        "thunk" => ThunkToken,
        "if" => If,
        "then" => ThenToken,
        "else" => Else,
        "elseif" => ElseIf,
        "end" => EndToken,
        "while" => WhileToken,
        "repeat" => Repeat,
        "until" => Until,
        "for" => For,
        "in" => InToken,
        "do" => DoToken,
        "defer" => DeferToken,
        "return" => ReturnToken,
        "break" => BreakToken,
        "continue" => ContinueToken,
        "try" => TryToken,
        "except" => ExceptToken,
        "success" => SuccessToken,
        "when" => When,
        "raise" => RaiseToken,
        "check" => CheckToken,
        "choose" => Choose,
        "as" => AsToken,
        "not" => NotToken,
        "and" => AndToken,
        "or" => OrToken,
        "is" => IsToken,
        "true" => TrueToken,
        "false" => FalseToken,
        "nil" => Nil,
        "import" => ImportToken,
        "namespace" => NamespaceToken,
        _ => return None,
    })
}

/// Lexes an entire source buffer into a flat token vector, interning every
/// identifier and string payload into `interner`. `source` is the
/// registry index stamped into every emitted span.
pub fn lex(text: &str, source: SourceIdx, interner: &mut Interner) -> Vec<Token> {
    let mut tokens = Vec::with_capacity(text.len() / 4 + 16);
    let mut state = LexState { line: 1, column: 1 };
    let mut rest = text;
    let mut offset = 0u32;

    macro_rules! span_for {
        ($len:expr) => {{
            let len = $len as u32;
            SourceSpan::new(offset, len, state.line, state.column, source)
        }};
    }

    macro_rules! emit {
        ($len:expr, $kind:expr) => {
            emit!($len, $kind, TokenPayload::None, 0)
        };
        ($len:expr, $kind:expr, $payload:expr) => {
            emit!($len, $kind, $payload, 0)
        };
        ($len:expr, $kind:expr, $payload:expr, $raw:expr) => {{
            let len = $len;
            let span = span_for!(len);
            tokens.push(Token { kind: $kind, span, payload: $payload, raw: $raw });
            state.advance(&rest[..len]);
            rest = &rest[len..];
            offset += len as u32;
        }};
    }

    'outer: loop {
        if rest.is_empty() {
            break;
        }
        let ws = lex_whitespace(rest);
        if ws > 0 {
            state.advance(&rest[..ws]);
            rest = &rest[ws..];
            offset += ws as u32;
            continue;
        }
        let comment = lex_comment(rest);
        if comment > 0 {
            state.advance(&rest[..comment]);
            rest = &rest[comment..];
            offset += comment as u32;
            continue;
        }

        let c = rest.chars().next().unwrap();

        if c == '"' {
            match lex_string(rest) {
                Some((len, text)) => {
                    let sym = interner.intern(&text);
                    emit!(len, TokenKind::String, TokenPayload::String(sym));
                }
                None => {
                    let span = span_for!(rest.len());
                    tokens.push(Token { kind: TokenKind::Error, span, payload: TokenPayload::None, raw: 0 });
                    break 'outer;
                }
            }
            continue;
        }

        if c.is_ascii_digit() {
            let len = lex_number(rest);
            let value: f64 = rest[..len].parse().unwrap_or(f64::NAN);
            emit!(len, TokenKind::Number, TokenPayload::Number(value));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let len = lex_identifier(rest);
            let word = &rest[..len];
            if let Some(kind) = keyword_kind(word) {
                emit!(len, kind);
            } else {
                let sym = interner.intern(word);
                emit!(len, TokenKind::Identifier, TokenPayload::Identifier(sym));
            }
            continue;
        }

        // Operators and punctuation, longest match first.
        use TokenKind::*;
        let (len, kind, raw) = if rest.starts_with("...") {
            (3, Dots, 0)
        } else if rest.starts_with("..=") {
            (3, ConcatEquals, 0)
        } else if rest.starts_with("..") {
            (2, Cat, 0)
        } else if rest.starts_with("??=") {
            (3, IfEmptyEquals, 0)
        } else if rest.starts_with("??") {
            (2, Presence, 0)
        } else if rest.starts_with("?=") {
            (2, IfNilEquals, 0)
        } else if rest.starts_with("?.") {
            (2, SafeField, 0)
        } else if rest.starts_with("?[") {
            (2, SafeIndex, 0)
        } else if rest.starts_with("?:") {
            (2, SafeMethod, 0)
        } else if rest.starts_with('?') {
            (1, Question, 0)
        } else if rest.starts_with("==") {
            (2, EqualEqual, 0)
        } else if rest.starts_with("=>") {
            (2, Arrow, 0)
        } else if rest.starts_with('=') {
            (1, Equals, 0)
        } else if rest.starts_with("!=") {
            (2, NotEqual, 0)
        } else if rest.starts_with("<=") {
            (2, LessEqual, 0)
        } else if rest.starts_with("<<") {
            (2, ShiftLeft, 0)
        } else if rest.starts_with('<') {
            (1, LessThan, b'<')
        } else if rest.starts_with(">=") {
            (2, GreaterEqual, 0)
        } else if rest.starts_with(">>") {
            (2, ShiftRight, 0)
        } else if rest.starts_with('>') {
            (1, GreaterThan, b'>')
        } else if rest.starts_with("->") {
            (2, CaseArrow, 0)
        } else if rest.starts_with("-=") {
            (2, MinusEquals, 0)
        } else if rest.starts_with('-') {
            (1, Minus, 0)
        } else if rest.starts_with("++") {
            (2, PlusPlus, 0)
        } else if rest.starts_with("+=") {
            (2, PlusEquals, 0)
        } else if rest.starts_with('+') {
            (1, Plus, 0)
        } else if rest.starts_with("*=") {
            (2, StarEquals, 0)
        } else if rest.starts_with('*') {
            (1, Star, 0)
        } else if rest.starts_with("/=") {
            (2, SlashEquals, 0)
        } else if rest.starts_with('/') {
            (1, Slash, 0)
        } else if rest.starts_with("%=") {
            (2, PercentEquals, 0)
        } else if rest.starts_with('%') {
            (1, Percent, 0)
        } else if rest.starts_with("|>") {
            (2, PipeOp, 0)
        } else if rest.starts_with('|') {
            (1, Pipe, b'|')
        } else if rest.starts_with('&') {
            (1, Ampersand, b'&')
        } else if rest.starts_with('^') {
            (1, Caret, b'^')
        } else if rest.starts_with('~') {
            (1, Tilde, 0)
        } else if rest.starts_with('#') {
            (1, Hash, 0)
        } else if rest.starts_with('(') {
            (1, LeftParen, 0)
        } else if rest.starts_with(')') {
            (1, RightParen, 0)
        } else if rest.starts_with('{') {
            (1, LeftBrace, 0)
        } else if rest.starts_with('}') {
            (1, RightBrace, 0)
        } else if rest.starts_with('[') {
            (1, LeftBracket, 0)
        } else if rest.starts_with(']') {
            (1, RightBracket, 0)
        } else if rest.starts_with(',') {
            (1, Comma, 0)
        } else if rest.starts_with(';') {
            (1, Semicolon, 0)
        } else if rest.starts_with(':') {
            (1, Colon, 0)
        } else if rest.starts_with('.') {
            (1, Dot, 0)
        } else if rest.starts_with("@if") && !rest[3..].starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            (3, CompileIf, 0)
        } else if rest.starts_with("@end") && !rest[4..].starts_with(|c: char| c.is_alphanumeric() || c == '_') {
            (4, CompileEnd, 0)
        } else if rest.starts_with('@') {
            (1, Annotate, 0)
        } else {
            // Unknown byte: emit a single-codepoint Error token and keep
            // scanning so diagnose-mode parsing can still make progress.
            let len = c.len_utf8();
            emit!(len, TokenKind::Error, TokenPayload::None, 0);
            continue;
        };
        emit!(len, kind, TokenPayload::None, raw);
    }

    let eof_span = span_for!(0usize);
    tokens.push(Token::eof(eof_span));
    tokens
}

/// Adapter over a token vector exposing the parser-facing cursor API:
/// `current`, `peek(n)`, `advance`, `match_kind`, `check`,
/// `expect`. Internally this is a plain index into an eagerly-lexed
/// vector, which trivially satisfies a lookahead window of at least 64
/// tokens (the whole stream is available) without needing to
/// relex on overflow.
pub struct TokenStream {
    tokens: Vec<Token>,
    pos: usize,
}

impl TokenStream {
    pub fn new(tokens: Vec<Token>) -> Self {
        debug_assert!(tokens.last().map(|t| t.kind == TokenKind::EndOfFile).unwrap_or(false));
        Self { tokens, pos: 0 }
    }

    pub fn current(&self) -> Token {
        self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    /// Peeks `n` tokens ahead of the current position (`peek(0) == current()`).
    pub fn peek(&self, n: usize) -> Token {
        let idx = (self.pos + n).min(self.tokens.len() - 1);
        self.tokens[idx]
    }

    pub fn advance(&mut self) -> Token {
        let tok = self.current();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        tok
    }

    pub fn check(&self, kind: TokenKind) -> bool {
        self.current().kind == kind
    }

    /// Consumes and returns the current token if it matches `kind`.
    pub fn match_kind(&mut self, kind: TokenKind) -> Option<Token> {
        if self.check(kind) {
            Some(self.advance())
        } else {
            None
        }
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn seek(&mut self, pos: usize) {
        self.pos = pos.min(self.tokens.len() - 1);
    }

    pub fn is_at_end(&self) -> bool {
        self.check(TokenKind::EndOfFile)
    }

    /// The most recently consumed token. Used to close out a span after an
    /// `advance()`/`expect()` without re-snapshotting the start position.
    pub fn previous(&self) -> Token {
        self.tokens[self.pos.saturating_sub(1).min(self.tokens.len() - 1)]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::SourceIdx;

    fn lex_kinds(src: &str) -> Vec<TokenKind> {
        let mut interner = Interner::new();
        lex(src, SourceIdx(0), &mut interner).iter().map(|t| t.kind).collect()
    }

    #[test]
    fn numbers_and_operators() {
        use TokenKind::*;
        assert_eq!(lex_kinds("1 + 2.5"), vec![Number, Plus, Number, EndOfFile]);
    }

    #[test]
    fn compound_assign_and_concat() {
        use TokenKind::*;
        assert_eq!(lex_kinds("a ..= b"), vec![Identifier, ConcatEquals, Identifier, EndOfFile]);
        assert_eq!(lex_kinds("a .. b"), vec![Identifier, Cat, Identifier, EndOfFile]);
        assert_eq!(lex_kinds("..."), vec![Dots, EndOfFile]);
    }

    #[test]
    fn presence_family_longest_match() {
        use TokenKind::*;
        assert_eq!(lex_kinds("a ?? b"), vec![Identifier, Presence, Identifier, EndOfFile]);
        assert_eq!(lex_kinds("a ??= b"), vec![Identifier, IfEmptyEquals, Identifier, EndOfFile]);
        assert_eq!(lex_kinds("a ?= b"), vec![Identifier, IfNilEquals, Identifier, EndOfFile]);
        assert_eq!(lex_kinds("a?.b"), vec![Identifier, SafeField, Identifier, EndOfFile]);
        assert_eq!(lex_kinds("a?[0]"), vec![Identifier, SafeIndex, Number, RightBracket, EndOfFile]);
        assert_eq!(lex_kinds("a?:b()"), vec![Identifier, SafeMethod, Identifier, LeftParen, RightParen, EndOfFile]);
    }

    #[test]
    fn comments_and_whitespace_are_skipped() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("a // trailing\nb /* mid\nblock */ c"),
            vec![Identifier, Identifier, Identifier, EndOfFile]
        );
    }

    #[test]
    fn keywords_are_recognized() {
        use TokenKind::*;
        assert_eq!(lex_kinds("local x = nil"), vec![Local, Identifier, Equals, Nil, EndOfFile]);
    }

    #[test]
    fn string_with_escapes() {
        let mut interner = Interner::new();
        let tokens = lex(r#""a\nb""#, SourceIdx(0), &mut interner);
        assert_eq!(tokens[0].kind, TokenKind::String);
        if let TokenPayload::String(sym) = tokens[0].payload {
            assert_eq!(interner.resolve(sym), "a\nb");
        } else {
            panic!("expected string payload");
        }
    }

    #[test]
    fn compile_time_directives() {
        use TokenKind::*;
        assert_eq!(
            lex_kinds("@if (debug = true) @end"),
            vec![CompileIf, LeftParen, Identifier, Equals, TrueToken, RightParen, CompileEnd, EndOfFile]
        );
    }

    #[test]
    fn token_stream_lookahead_and_seek() {
        let mut interner = Interner::new();
        let tokens = lex("1 2 3", SourceIdx(0), &mut interner);
        let mut stream = TokenStream::new(tokens);
        assert_eq!(stream.peek(2).kind, TokenKind::Number);
        let checkpoint = stream.position();
        stream.advance();
        stream.advance();
        stream.seek(checkpoint);
        assert_eq!(stream.current().span.offset, 0);
    }
}
