//! Parser for `OpenQASM` 3 snippets.

mod expression;
mod statement;

use crate::ast::Program;
use crate::error::{ParseError, ParseResult};
use crate::lexer::{tokenize, SpannedToken, Token};

/// Parse a QASM3 source string into an AST [`Program`].
pub fn parse(source: &str) -> ParseResult<Program> {
    let mut parser = Parser::new(source)?;
    parser.parse_program()
}

/// Parse a standalone classical expression, e.g. an if-then-else condition.
pub fn parse_expression(source: &str) -> ParseResult<crate::ast::Expression> {
    let mut parser = Parser::new(source)?;
    let expr = parser.parse_expression()?;
    if !parser.is_eof() {
        return Err(ParseError::Generic(format!(
            "trailing input after expression: '{source}'"
        )));
    }
    Ok(expr)
}

/// Parser state.
pub(super) struct Parser {
    pub(super) tokens: Vec<SpannedToken>,
    pub(super) pos: usize,
    /// Byte offsets of newlines, for error line numbers.
    newlines: Vec<usize>,
}

impl Parser {
    /// Create a new parser from source.
    fn new(source: &str) -> ParseResult<Self> {
        let token_results = tokenize(source);
        let mut tokens = Vec::new();

        for result in token_results {
            match result {
                Ok(t) => tokens.push(t),
                Err((span, msg)) => {
                    return Err(ParseError::LexerError {
                        position: span.start,
                        message: msg,
                    });
                }
            }
        }

        let newlines = source
            .char_indices()
            .filter_map(|(i, c)| (c == '\n').then_some(i))
            .collect();

        Ok(Self {
            tokens,
            pos: 0,
            newlines,
        })
    }

    /// 1-based line number of the current token.
    pub(super) fn line(&self) -> usize {
        let offset = self
            .tokens
            .get(self.pos.min(self.tokens.len().saturating_sub(1)))
            .map_or(0, |t| t.span.start);
        self.newlines.partition_point(|&nl| nl < offset) + 1
    }

    /// Check if we've reached the end.
    pub(super) fn is_eof(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    /// Peek at the current token.
    pub(super) fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    /// Advance and return the current token.
    pub(super) fn advance(&mut self) -> Option<Token> {
        if self.is_eof() {
            return None;
        }
        let token = self.tokens[self.pos].token.clone();
        self.pos += 1;
        Some(token)
    }

    /// Expect a specific token.
    #[allow(clippy::needless_pass_by_value)]
    pub(super) fn expect(&mut self, expected: Token) -> ParseResult<()> {
        let line = self.line();
        let found = self
            .advance()
            .ok_or_else(|| ParseError::UnexpectedEof(format!("expected {expected}")))?;

        if std::mem::discriminant(&found) != std::mem::discriminant(&expected) {
            return Err(ParseError::UnexpectedToken {
                line,
                expected: expected.to_string(),
                found: found.to_string(),
            });
        }
        Ok(())
    }

    /// Check if current token matches.
    pub(super) fn check(&self, token: &Token) -> bool {
        self.peek()
            .is_some_and(|t| std::mem::discriminant(t) == std::mem::discriminant(token))
    }

    /// Consume token if it matches.
    pub(super) fn consume(&mut self, token: &Token) -> bool {
        if self.check(token) {
            self.advance();
            true
        } else {
            false
        }
    }

    /// Parse an identifier.
    pub(super) fn parse_identifier(&mut self) -> ParseResult<String> {
        let line = self.line();
        match self.advance() {
            Some(Token::Identifier(name)) => Ok(name),
            Some(other) => Err(ParseError::UnexpectedToken {
                line,
                expected: "identifier".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("identifier".into())),
        }
    }

    /// Parse an integer literal.
    pub(super) fn parse_int_literal(&mut self) -> ParseResult<u64> {
        let line = self.line();
        match self.advance() {
            Some(Token::IntLiteral(v)) => Ok(v),
            Some(other) => Err(ParseError::UnexpectedToken {
                line,
                expected: "integer literal".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("integer literal".into())),
        }
    }

    /// Parse the whole program: optional version header, then statements.
    fn parse_program(&mut self) -> ParseResult<Program> {
        let version = if self.consume(&Token::OpenQasm) {
            let line = self.line();
            let version = match self.advance() {
                Some(Token::FloatLiteral(v)) => {
                    if v.fract() == 0.0 {
                        format!("{v:.1}")
                    } else {
                        format!("{v}")
                    }
                }
                Some(Token::IntLiteral(v)) => format!("{v}"),
                Some(other) => {
                    return Err(ParseError::UnexpectedToken {
                        line,
                        expected: "version number".into(),
                        found: other.to_string(),
                    });
                }
                None => return Err(ParseError::UnexpectedEof("version number".into())),
            };
            if !version.starts_with('3') {
                return Err(ParseError::InvalidVersion(version));
            }
            self.expect(Token::Semicolon)?;
            Some(version)
        } else {
            None
        };

        let mut statements = Vec::new();
        while !self.is_eof() {
            statements.push(self.parse_annotated_statement()?);
        }

        Ok(Program {
            version,
            statements,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::{ClassicalType, Expression, RegisterExpr, StatementKind};

    #[test]
    fn test_parse_version() {
        let program = parse("OPENQASM 3.1;\nqubit q;").unwrap();
        assert_eq!(program.version.as_deref(), Some("3.1"));
        assert_eq!(program.statements.len(), 1);
    }

    #[test]
    fn test_parse_snippet_without_version() {
        let program = parse("qubit[2] q;\nh q[0];").unwrap();
        assert!(program.version.is_none());
        assert_eq!(program.statements.len(), 2);
    }

    #[test]
    fn test_reject_qasm2() {
        assert!(matches!(
            parse("OPENQASM 2.0;"),
            Err(ParseError::InvalidVersion(_))
        ));
    }

    #[test]
    fn test_parse_annotated_declaration() {
        let program = parse("@leqo.input 0\nqubit[3] q;").unwrap();
        let stmt = &program.statements[0];
        assert_eq!(stmt.annotations[0].keyword, "leqo.input");
        assert_eq!(stmt.annotations[0].command.as_deref(), Some("0"));
        assert!(matches!(
            stmt.kind,
            StatementKind::QubitDecl { ref name, size: Some(3) } if name == "q"
        ));
    }

    #[test]
    fn test_parse_alias_concat() {
        let program = parse("let r = a[0:1] ++ b;").unwrap();
        match &program.statements[0].kind {
            StatementKind::Alias { name, value } => {
                assert_eq!(name, "r");
                assert!(matches!(value, RegisterExpr::Concat(_, _)));
            }
            other => panic!("expected alias, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_measure_initializer() {
        let program = parse("bit[3] c = measure q;").unwrap();
        match &program.statements[0].kind {
            StatementKind::ClassicalDecl { ty, init, .. } => {
                assert_eq!(*ty, ClassicalType::Bit { size: Some(3) });
                assert!(matches!(init, Some(Expression::Measure(_))));
            }
            other => panic!("expected classical declaration, got {other:?}"),
        }
    }

    #[test]
    fn test_parse_expression_entrypoint() {
        let expr = parse_expression("a == 1").unwrap();
        assert!(matches!(expr, Expression::BinOp { .. }));
    }

    #[test]
    fn test_dangling_annotation_rejected() {
        assert!(matches!(
            parse("@leqo.input 0"),
            Err(ParseError::DanglingAnnotation(_, _))
        ));
    }
}
