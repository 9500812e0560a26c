// Token kinds and the token record itself.

use crate::interner::InternedStr;
use crate::span::SourceSpan;
use strum::{Display, EnumString};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum TokenKind {
    // Delimiters
    LeftParen,
    RightParen,
    LeftBrace,
    RightBrace,
    LeftBracket,
    RightBracket,
    Comma,
    Semicolon,
    Colon,
    Dot,

    // Assignment family
    Equals,
    PlusEquals,
    MinusEquals,
    StarEquals,
    SlashEquals,
    PercentEquals,
    ConcatEquals,
    IfEmptyEquals,
    IfNilEquals,

    // Arithmetic / bitwise / shift
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Caret,
    Ampersand,
    Pipe,
    Tilde,
    Hash,
    ShiftLeft,
    ShiftRight,

    // Comparisons
    EqualEqual,
    NotEqual,
    LessThan,
    LessEqual,
    GreaterThan,
    GreaterEqual,

    // Logical / misc operators
    Cat,      // ..
    Dots,     // ...
    Arrow,    // =>
    CaseArrow, // ->
    PipeOp,   // |>
    Question,
    Presence,    // ?? (postfix presence / binary if-empty, context dependent)
    SafeField,   // ?.
    SafeIndex,   // ?[
    SafeMethod,  // ?:
    PlusPlus,    // ++
    // Note: the ternary's middle separator (`cond ? a : b`) is realized as
    // an ordinary `Colon` token consumed in ternary context by the parser,
    // not a distinct spelling — `?:` is already `SafeMethod`.

    // Keywords
    Local,
    Global,
    Function,
    ThunkToken,
    If,
    ThenToken,
    Else,
    ElseIf,
    EndToken,
    WhileToken,
    Repeat,
    Until,
    For,
    InToken,
    DoToken,
    DeferToken,
    ReturnToken,
    BreakToken,
    ContinueToken,
    TryToken,
    ExceptToken,
    SuccessToken,
    When,
    RaiseToken,
    CheckToken,
    Choose,
    AsToken,
    NotToken,
    AndToken,
    OrToken,
    IsToken,
    TrueToken,
    FalseToken,
    Nil,
    ImportToken,
    NamespaceToken,

    // Literals
    Number,
    String,
    Identifier,

    // Special / context-sensitive
    Annotate,     // @
    CompileIf,    // @if
    CompileEnd,   // @end
    // `<{`, `<type{`, `array<T[,size]>`, `<const>` and `<close>` are not
    // emitted as dedicated token kinds: they are genuinely ambiguous with
    // ordinary `<`/`>` comparison chains at the character level, so the parser recognizes them
    // by peeking sequences of the primitive tokens below instead of the
    // lexer guessing intent from raw text.

    // Sentinels / recovery
    Error,
    EndOfFile,
}

impl TokenKind {
    pub fn is_statement_start(self) -> bool {
        matches!(
            self,
            TokenKind::Local
                | TokenKind::Global
                | TokenKind::Function
                | TokenKind::ThunkToken
                | TokenKind::If
                | TokenKind::WhileToken
                | TokenKind::Repeat
                | TokenKind::For
                | TokenKind::DoToken
                | TokenKind::DeferToken
                | TokenKind::ReturnToken
                | TokenKind::BreakToken
                | TokenKind::ContinueToken
                | TokenKind::TryToken
                | TokenKind::RaiseToken
                | TokenKind::CheckToken
                | TokenKind::ImportToken
                | TokenKind::NamespaceToken
                | TokenKind::CompileIf
                | TokenKind::Semicolon
                | TokenKind::Annotate
                | TokenKind::Identifier
        )
    }
}

/// Payload carried alongside a token's kind and span. Identifiers and
/// strings carry an `InternedStr`; legacy single-character tokens that are
/// reused across several operator spellings (`<`, `>`, `|`, `&`, `^`) also
/// carry the raw byte so the parser can disambiguate without re-scanning
/// the source text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenPayload {
    None,
    Number(f64),
    String(InternedStr),
    Identifier(InternedStr),
    ArrayTypeSize(i64),
}

impl Default for TokenPayload {
    fn default() -> Self {
        TokenPayload::None
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: SourceSpan,
    pub payload: TokenPayload,
    pub raw: u8,
}

impl Token {
    pub fn eof(span: SourceSpan) -> Self {
        Token { kind: TokenKind::EndOfFile, span, payload: TokenPayload::None, raw: 0 }
    }

    pub fn interned(&self) -> Option<InternedStr> {
        match self.payload {
            TokenPayload::Identifier(s) | TokenPayload::String(s) => Some(s),
            _ => None,
        }
    }
}
