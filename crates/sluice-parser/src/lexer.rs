//! Lexer for the sluice language.

use logos::Logos;

use crate::error::ParseError;
use crate::span::Span;
use crate::token::TokenKind;

/// A token with its source span.
#[derive(Debug, Clone)]
pub struct Token {
    /// The kind of token.
    pub kind: TokenKind,
    /// Where the token sits in the source.
    pub span: Span,
}

impl Token {
    /// Create a new token.
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Self { kind, span }
    }
}

/// Tokenize source code.
///
/// Unrecognized input does not stop lexing; every bad token is reported and
/// the remaining input is still tokenized.
pub fn lex(source: &str) -> (Vec<Token>, Vec<ParseError>) {
    let mut lexer = TokenKind::lexer(source);
    let mut tokens = Vec::new();
    let mut errors = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        let span = Span::new(span.start, span.end);
        match result {
            Ok(kind) => tokens.push(Token::new(kind, span)),
            Err(()) => errors.push(ParseError::InvalidToken { span }),
        }
    }

    (tokens, errors)
}
