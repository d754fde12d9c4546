//! Parser for the sluice language.

use crate::ast::*;
use crate::error::ParseError;
use crate::lexer::{lex, Token};
use crate::span::Span;
use crate::token::TokenKind;
use crate::value::Value;

/// Parse source code into a pipeline.
pub fn parse(source: &str) -> Result<Pipeline, Vec<ParseError>> {
    let (tokens, mut errors) = lex(source);
    let mut parser = Parser::new(tokens, source.len());
    let pipeline = parser.parse_top_level();
    errors.append(&mut parser.errors);
    if errors.is_empty() {
        Ok(pipeline)
    } else {
        errors.sort_by_key(|e| e.span().start);
        Err(errors)
    }
}

/// Parse a single expression.
pub fn parse_expr(source: &str) -> Result<Expr, Vec<ParseError>> {
    let (tokens, errors) = lex(source);
    if !errors.is_empty() {
        return Err(errors);
    }
    let mut parser = Parser::new(tokens, source.len());
    let expr = parser.parse_expr().map_err(|e| vec![e])?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(vec![ParseError::unexpected_token(
            token.span,
            "end of input",
            token.kind.to_string(),
        )]),
    }
}

/// The parser state.
struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    /// Open `(`, `[` and record braces. Newlines inside them are not
    /// statement separators.
    nesting: usize,
    /// Open `{ ... }` pipeline blocks.
    blocks: usize,
    errors: Vec<ParseError>,
    eof: Span,
}

impl Parser {
    fn new(tokens: Vec<Token>, len: usize) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            blocks: 0,
            errors: Vec::new(),
            eof: Span::new(len, len),
        }
    }

    fn parse_top_level(&mut self) -> Pipeline {
        let body = self.parse_body();
        let span = match (body.first(), body.last()) {
            (Some(first), Some(last)) => first.span().merge(last.span()),
            _ => Span::unknown(),
        };
        Pipeline::new(body, span)
    }

    fn parse_body(&mut self) -> Vec<Statement> {
        let mut body = Vec::new();
        loop {
            self.skip_separators();
            match self.peek_kind() {
                None => break,
                Some(TokenKind::RBrace) if self.blocks > 0 => break,
                _ => {}
            }
            match self.parse_statement() {
                Ok(stmt) => {
                    body.push(stmt);
                    if !self.at_statement_end() {
                        let err = self.unexpected("`|` or newline");
                        self.errors.push(err);
                        self.synchronize();
                    }
                }
                Err(e) => {
                    self.errors.push(e);
                    self.synchronize();
                }
            }
        }
        body
    }

    fn parse_statement(&mut self) -> Result<Statement, ParseError> {
        match self.peek_kind() {
            Some(TokenKind::Let) => self.parse_let().map(Statement::Let),
            Some(TokenKind::If) => self.parse_if().map(Statement::If),
            Some(TokenKind::Match) => self.parse_match().map(Statement::Match),
            Some(TokenKind::Type) => self.parse_type_decl().map(Statement::TypeDecl),
            Some(TokenKind::Ident(_)) if self.is_assignment() => {
                self.parse_assignment().map(Statement::Assignment)
            }
            Some(TokenKind::Ident(_)) => self.parse_invocation().map(Statement::Invocation),
            _ => Err(self.unexpected("statement")),
        }
    }

    fn parse_let(&mut self) -> Result<LetStmt, ParseError> {
        let let_kw = self.expect(TokenKind::Let)?.span;
        let name = match self.peek() {
            Some(Token {
                kind: TokenKind::DollarIdent(name),
                span,
            }) => Ident::new(name.clone(), *span),
            _ => return Err(self.unexpected("`$` variable")),
        };
        self.advance();
        self.expect(TokenKind::Assign)?;
        let expr = self.parse_expr()?;
        Ok(LetStmt {
            span: let_kw.merge(expr.span()),
            let_kw,
            name,
            expr,
        })
    }

    fn parse_if(&mut self) -> Result<IfStmt, ParseError> {
        let if_kw = self.expect(TokenKind::If)?.span;
        let condition = self.parse_expr()?;
        let then = self.parse_block()?;
        let mut span = if_kw.merge(then.span);

        // `else` may start on the next line.
        let save = self.pos;
        self.skip_newlines();
        let else_ = if self.check(TokenKind::Else) {
            let kw = self.advance().span;
            let pipe = if self.check(TokenKind::If) {
                let nested = self.parse_if()?;
                let nested_span = nested.span;
                Pipeline::new(vec![Statement::If(nested)], nested_span)
            } else {
                self.parse_block()?
            };
            span = span.merge(pipe.span);
            Some(ElseBranch { kw, pipe })
        } else {
            self.pos = save;
            None
        };

        Ok(IfStmt {
            if_kw,
            condition,
            then,
            else_,
            span,
        })
    }

    fn parse_match(&mut self) -> Result<MatchStmt, ParseError> {
        let start = self.expect(TokenKind::Match)?.span;
        let expr = self.parse_expr()?;
        self.expect(TokenKind::LBrace)?;
        let mut arms = Vec::new();
        loop {
            while self.check(TokenKind::Newline) || self.check(TokenKind::Comma) {
                self.advance();
            }
            if self.check(TokenKind::RBrace) || self.is_at_end() {
                break;
            }
            let pattern = self.parse_expr()?;
            self.expect(TokenKind::FatArrow)?;
            let pipe = self.parse_block()?;
            arms.push(MatchArm { pattern, pipe });
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(MatchStmt {
            expr,
            arms,
            span: start.merge(end),
        })
    }

    fn parse_type_decl(&mut self) -> Result<TypeDecl, ParseError> {
        let start = self.expect(TokenKind::Type)?.span;
        let name = self.parse_ident()?;
        self.expect(TokenKind::Assign)?;
        let ty = self.parse_ident()?;
        Ok(TypeDecl {
            span: start.merge(ty.span),
            name,
            ty,
        })
    }

    fn parse_assignment(&mut self) -> Result<Assignment, ParseError> {
        let first = self.parse_ident()?;
        let left = self.parse_field_path(first)?;
        self.expect(TokenKind::Assign)?;
        let right = self.parse_expr()?;
        Ok(Assignment {
            span: left.span.merge(right.span()),
            left,
            right,
        })
    }

    fn parse_invocation(&mut self) -> Result<Invocation, ParseError> {
        let op = self.parse_ident()?;
        let mut span = op.span;
        let mut args = Vec::new();
        if !self.at_statement_end() {
            loop {
                let arg = self.parse_argument()?;
                span = span.merge(arg.span());
                args.push(arg);
                if !self.check(TokenKind::Comma) {
                    break;
                }
                self.advance();
                self.skip_newlines();
            }
        }
        Ok(Invocation { op, args, span })
    }

    fn parse_argument(&mut self) -> Result<Argument, ParseError> {
        let named = matches!(
            (self.tokens.get(self.pos), self.tokens.get(self.pos + 1)),
            (
                Some(Token { kind: TokenKind::Ident(_), .. }),
                Some(Token { kind: TokenKind::Assign, .. })
            )
        );
        if named {
            let name = self.parse_ident()?;
            self.expect(TokenKind::Assign)?;
            let value = self.parse_expr()?;
            return Ok(Argument::Named(name, value));
        }
        self.parse_expr().map(Argument::Positional)
    }

    fn parse_block(&mut self) -> Result<Pipeline, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        let saved = std::mem::replace(&mut self.nesting, 0);
        self.blocks += 1;
        let body = self.parse_body();
        self.blocks -= 1;
        self.nesting = saved;
        let end = self.expect(TokenKind::RBrace)?.span;
        Ok(Pipeline::new(body, start.merge(end)))
    }

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            self.advance();
            let right = self.parse_and()?;
            left = Expr::binary(left, BinOp::Or, right);
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_equality()?;
        while self.check(TokenKind::And) {
            self.advance();
            let right = self.parse_equality()?;
            left = Expr::binary(left, BinOp::And, right);
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_comparison()?;
        while let Some(op) = self.match_token(&[TokenKind::Eq, TokenKind::Ne]) {
            let op = match op {
                TokenKind::Eq => BinOp::Eq,
                _ => BinOp::Ne,
            };
            let right = self.parse_comparison()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_comparison(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_term()?;
        while let Some(op) =
            self.match_token(&[TokenKind::Lt, TokenKind::Le, TokenKind::Gt, TokenKind::Ge])
        {
            let op = match op {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Le => BinOp::Le,
                TokenKind::Gt => BinOp::Gt,
                _ => BinOp::Ge,
            };
            let right = self.parse_term()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_factor()?;
        while let Some(op) = self.match_token(&[TokenKind::Plus, TokenKind::Minus]) {
            let op = match op {
                TokenKind::Plus => BinOp::Add,
                _ => BinOp::Sub,
            };
            let right = self.parse_factor()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_factor(&mut self) -> Result<Expr, ParseError> {
        let mut left = self.parse_unary()?;
        while let Some(op) =
            self.match_token(&[TokenKind::Star, TokenKind::Slash, TokenKind::Percent])
        {
            let op = match op {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                _ => BinOp::Mod,
            };
            let right = self.parse_unary()?;
            left = Expr::binary(left, op, right);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ParseError> {
        let op = match self.peek_kind() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Not) => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        let start = self.advance().span;
        let expr = self.parse_unary()?;
        let span = start.merge(expr.span());
        Ok(Expr::Unary(op, Box::new(expr), span))
    }

    fn parse_primary(&mut self) -> Result<Expr, ParseError> {
        let literal = match self.peek_kind() {
            Some(TokenKind::Int(n)) => Some(Value::Int(n)),
            Some(TokenKind::Float(n)) => Some(Value::Float(n)),
            Some(TokenKind::String(s)) => Some(Value::String(s)),
            Some(TokenKind::True) => Some(Value::Bool(true)),
            Some(TokenKind::False) => Some(Value::Bool(false)),
            Some(TokenKind::Null) => Some(Value::Null),
            _ => None,
        };
        if let Some(value) = literal {
            let span = self.advance().span;
            return Ok(Expr::Constant(value, span));
        }

        match self.peek_kind() {
            Some(TokenKind::DollarIdent(name)) => {
                let span = self.advance().span;
                Ok(Expr::Var(DollarVar {
                    name: Ident::new(name, span),
                    id: LetId::default(),
                }))
            }
            Some(TokenKind::Ident(_)) => {
                let ident = self.parse_ident()?;
                if self.check(TokenKind::LParen) {
                    self.advance();
                    self.nesting += 1;
                    let args = self.parse_comma_separated(TokenKind::RParen)?;
                    let end = self.expect(TokenKind::RParen)?.span;
                    self.nesting -= 1;
                    let span = ident.span.merge(end);
                    Ok(Expr::Call(ident, args, span))
                } else {
                    self.parse_field_path(ident).map(Expr::Field)
                }
            }
            Some(TokenKind::LParen) => {
                self.advance();
                self.nesting += 1;
                let expr = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                self.nesting -= 1;
                Ok(expr)
            }
            Some(TokenKind::LBracket) => {
                let start = self.advance().span;
                self.nesting += 1;
                let items = self.parse_comma_separated(TokenKind::RBracket)?;
                let end = self.expect(TokenKind::RBracket)?.span;
                self.nesting -= 1;
                Ok(Expr::List(items, start.merge(end)))
            }
            Some(TokenKind::LBrace) => self.parse_record(),
            _ => Err(self.unexpected("expression")),
        }
    }

    fn parse_record(&mut self) -> Result<Expr, ParseError> {
        let start = self.expect(TokenKind::LBrace)?.span;
        self.nesting += 1;
        let mut fields = Vec::new();
        while !self.check(TokenKind::RBrace) {
            let name = match self.peek() {
                Some(Token {
                    kind: TokenKind::String(s),
                    span,
                }) => {
                    let name = Ident::new(s.clone(), *span);
                    self.advance();
                    name
                }
                _ => self.parse_ident()?,
            };
            self.expect(TokenKind::Colon)?;
            let value = self.parse_expr()?;
            fields.push((name, value));
            if !self.check(TokenKind::RBrace) {
                self.expect(TokenKind::Comma)?;
            }
        }
        let end = self.expect(TokenKind::RBrace)?.span;
        self.nesting -= 1;
        Ok(Expr::Record(fields, start.merge(end)))
    }

    fn parse_comma_separated(&mut self, close: TokenKind) -> Result<Vec<Expr>, ParseError> {
        let mut items = Vec::new();
        while !self.check(close.clone()) {
            items.push(self.parse_expr()?);
            if !self.check(close.clone()) {
                self.expect(TokenKind::Comma)?;
            }
        }
        Ok(items)
    }

    fn parse_field_path(&mut self, first: Ident) -> Result<FieldPath, ParseError> {
        let mut span = first.span;
        let mut segments = vec![first];
        while self.check(TokenKind::Dot) {
            self.advance();
            let segment = self.parse_ident()?;
            span = span.merge(segment.span);
            segments.push(segment);
        }
        Ok(FieldPath { segments, span })
    }

    fn parse_ident(&mut self) -> Result<Ident, ParseError> {
        match self.peek() {
            Some(Token {
                kind: TokenKind::Ident(name),
                span,
            }) => {
                let ident = Ident::new(name.clone(), *span);
                self.advance();
                Ok(ident)
            }
            _ => Err(self.unexpected("identifier")),
        }
    }

    /// `name (. name)* =` at the current position, with `=` not part of `==`.
    fn is_assignment(&self) -> bool {
        let mut i = self.pos;
        loop {
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::Ident(_)) => i += 1,
                _ => return false,
            }
            match self.tokens.get(i).map(|t| &t.kind) {
                Some(TokenKind::Dot) => i += 1,
                Some(TokenKind::Assign) => return true,
                _ => return false,
            }
        }
    }

    // Helper methods

    /// Index of the next significant token.
    fn peek_index(&self) -> Option<usize> {
        let mut i = self.pos;
        while let Some(token) = self.tokens.get(i) {
            if self.nesting > 0 && token.kind == TokenKind::Newline {
                i += 1;
                continue;
            }
            return Some(i);
        }
        None
    }

    fn peek(&self) -> Option<&Token> {
        self.peek_index().map(|i| &self.tokens[i])
    }

    fn peek_kind(&self) -> Option<TokenKind> {
        self.peek().map(|t| t.kind.clone())
    }

    fn advance(&mut self) -> Token {
        let i = self.peek_index().unwrap_or(self.pos);
        let token = self.tokens[i].clone();
        self.pos = i + 1;
        token
    }

    fn is_at_end(&self) -> bool {
        self.peek().is_none()
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek()
            .map(|t| std::mem::discriminant(&t.kind) == std::mem::discriminant(&kind))
            .unwrap_or(false)
    }

    fn expect(&mut self, kind: TokenKind) -> Result<Token, ParseError> {
        if self.check(kind.clone()) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(format!("`{}`", kind)))
        }
    }

    fn match_token(&mut self, kinds: &[TokenKind]) -> Option<TokenKind> {
        for kind in kinds {
            if self.check(kind.clone()) {
                return Some(self.advance().kind);
            }
        }
        None
    }

    fn unexpected(&self, expected: impl Into<String>) -> ParseError {
        match self.peek() {
            Some(token) => ParseError::unexpected_token(token.span, expected, token.kind.to_string()),
            None => ParseError::unexpected_eof(self.eof, expected),
        }
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            None | Some(TokenKind::Pipe) | Some(TokenKind::Newline) | Some(TokenKind::RBrace)
        )
    }

    fn skip_newlines(&mut self) {
        while matches!(self.tokens.get(self.pos).map(|t| &t.kind), Some(TokenKind::Newline)) {
            self.pos += 1;
        }
    }

    fn skip_separators(&mut self) {
        while matches!(
            self.tokens.get(self.pos).map(|t| &t.kind),
            Some(TokenKind::Newline) | Some(TokenKind::Pipe)
        ) {
            self.pos += 1;
        }
    }

    /// Skip to the next statement boundary after an error.
    fn synchronize(&mut self) {
        self.nesting = 0;
        while let Some(token) = self.tokens.get(self.pos) {
            match token.kind {
                TokenKind::Pipe | TokenKind::Newline => return,
                TokenKind::RBrace if self.blocks > 0 => return,
                _ => self.pos += 1,
            }
        }
    }
}
