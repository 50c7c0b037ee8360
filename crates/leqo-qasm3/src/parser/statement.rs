//! Statement parsing for QASM3.

use super::Parser;
use crate::ast::{
    Annotation, ClassicalType, Expression, RegisterExpr, Statement, StatementKind,
};
use crate::error::{ParseError, ParseResult};
use crate::lexer::Token;

impl Parser {
    /// Parse a statement together with its leading annotation lines.
    pub(super) fn parse_annotated_statement(&mut self) -> ParseResult<Statement> {
        let mut annotations = Vec::new();
        while let Some(Token::AnnotationLine(_)) = self.peek() {
            let line = self.line();
            if let Some(Token::AnnotationLine((keyword, command))) = self.advance() {
                if self.is_eof() || self.check(&Token::RBrace) {
                    return Err(ParseError::DanglingAnnotation(keyword, line));
                }
                annotations.push(Annotation { keyword, command });
            }
        }

        let kind = self.parse_statement()?;
        Ok(Statement { annotations, kind })
    }

    /// Parse a statement.
    fn parse_statement(&mut self) -> ParseResult<StatementKind> {
        let token = self
            .peek()
            .cloned()
            .ok_or_else(|| ParseError::UnexpectedEof("statement".into()))?;

        match token {
            Token::Include => self.parse_include(),
            Token::Qubit => self.parse_qubit_decl(),
            Token::Bit | Token::Int | Token::Uint | Token::Float | Token::Bool => {
                self.parse_classical_decl()
            }
            Token::Const => self.parse_const_decl(),
            Token::Let => self.parse_alias(),
            Token::Gate => self.parse_gate_def(),
            Token::If => self.parse_if(),
            Token::Measure => self.parse_measure_arrow(),
            Token::Reset => self.parse_reset(),
            Token::Barrier => self.parse_barrier(),
            Token::Identifier(_) => self.parse_identifier_statement(),
            _ => Err(ParseError::UnexpectedToken {
                line: self.line(),
                expected: "statement".into(),
                found: token.to_string(),
            }),
        }
    }

    /// Parse include statement.
    fn parse_include(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Include)?;
        let line = self.line();
        let path = match self.advance() {
            Some(Token::StringLiteral(s)) => s,
            Some(other) => {
                return Err(ParseError::UnexpectedToken {
                    line,
                    expected: "string literal".into(),
                    found: other.to_string(),
                });
            }
            None => return Err(ParseError::UnexpectedEof("include path".into())),
        };
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::Include(path))
    }

    /// Parse qubit declaration.
    fn parse_qubit_decl(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Qubit)?;
        let size = self.parse_optional_width()?;
        let name = self.parse_identifier()?;
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::QubitDecl { name, size })
    }

    /// Parse an optional `[n]` width designator.
    fn parse_optional_width(&mut self) -> ParseResult<Option<u32>> {
        if self.consume(&Token::LBracket) {
            let size = self.parse_int_literal()?;
            self.expect(Token::RBracket)?;
            let size = u32::try_from(size)
                .map_err(|_| ParseError::Generic(format!("width {size} exceeds u32")))?;
            Ok(Some(size))
        } else {
            Ok(None)
        }
    }

    /// Parse the classical type at the cursor.
    fn parse_classical_type(&mut self) -> ParseResult<ClassicalType> {
        let line = self.line();
        match self.advance() {
            Some(Token::Bit) => Ok(ClassicalType::Bit {
                size: self.parse_optional_width()?,
            }),
            Some(Token::Int) => Ok(ClassicalType::Int {
                size: self.parse_optional_width()?,
            }),
            Some(Token::Uint) => Ok(ClassicalType::Uint {
                size: self.parse_optional_width()?,
            }),
            Some(Token::Float) => Ok(ClassicalType::Float {
                size: self.parse_optional_width()?,
            }),
            Some(Token::Bool) => Ok(ClassicalType::Bool),
            Some(other) => Err(ParseError::UnexpectedToken {
                line,
                expected: "classical type".into(),
                found: other.to_string(),
            }),
            None => Err(ParseError::UnexpectedEof("classical type".into())),
        }
    }

    /// Parse classical declaration with optional initializer.
    fn parse_classical_decl(&mut self) -> ParseResult<StatementKind> {
        let ty = self.parse_classical_type()?;
        let name = self.parse_identifier()?;

        let init = if self.consume(&Token::Eq) {
            Some(self.parse_initializer()?)
        } else {
            None
        };

        self.expect(Token::Semicolon)?;
        Ok(StatementKind::ClassicalDecl { ty, name, init })
    }

    /// Parse a constant declaration.
    fn parse_const_decl(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Const)?;
        let ty = self.parse_classical_type()?;
        let name = self.parse_identifier()?;
        self.expect(Token::Eq)?;
        let init = self.parse_expression()?;
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::ConstDecl { ty, name, init })
    }

    /// Parse an initializer expression, which may be a measurement.
    fn parse_initializer(&mut self) -> ParseResult<Expression> {
        if self.consume(&Token::Measure) {
            let qubits = self.parse_register_expr()?;
            return Ok(Expression::Measure(Box::new(qubits)));
        }
        self.parse_expression()
    }

    /// Parse alias statement: `let name = <register-expr>;`
    fn parse_alias(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Let)?;
        let name = self.parse_identifier()?;
        self.expect(Token::Eq)?;
        let value = self.parse_register_expr()?;
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::Alias { name, value })
    }

    /// Parse gate definition.
    fn parse_gate_def(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Gate)?;
        let name = self.parse_identifier()?;

        let params = if self.consume(&Token::LParen) {
            let p = self.parse_identifier_list()?;
            self.expect(Token::RParen)?;
            p
        } else {
            vec![]
        };

        let qubits = self.parse_identifier_list()?;

        self.expect(Token::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&Token::RBrace) {
            body.push(self.parse_annotated_statement()?);
        }
        self.expect(Token::RBrace)?;

        Ok(StatementKind::GateDef {
            name,
            params,
            qubits,
            body,
        })
    }

    /// Parse if statement.
    fn parse_if(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::If)?;
        self.expect(Token::LParen)?;
        let condition = self.parse_expression()?;
        self.expect(Token::RParen)?;

        let then_body = self.parse_block()?;
        let else_body = if self.consume(&Token::Else) {
            self.parse_block()?
        } else {
            vec![]
        };

        Ok(StatementKind::If {
            condition,
            then_body,
            else_body,
        })
    }

    /// Parse a braced statement block.
    fn parse_block(&mut self) -> ParseResult<Vec<Statement>> {
        self.expect(Token::LBrace)?;
        let mut stmts = Vec::new();
        while !self.check(&Token::RBrace) {
            stmts.push(self.parse_annotated_statement()?);
        }
        self.expect(Token::RBrace)?;
        Ok(stmts)
    }

    /// Parse arrow-form measurement: `measure q -> c;` or `measure q;`
    fn parse_measure_arrow(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Measure)?;
        let qubits = self.parse_register_expr()?;
        let target = if self.consume(&Token::Arrow) {
            Some(self.parse_register_expr()?)
        } else {
            None
        };
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::Measure { qubits, target })
    }

    /// Parse reset statement.
    fn parse_reset(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Reset)?;
        let qubits = self.parse_register_expr()?;
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::Reset { qubits })
    }

    /// Parse barrier statement.
    fn parse_barrier(&mut self) -> ParseResult<StatementKind> {
        self.expect(Token::Barrier)?;
        let qubits = if self.check(&Token::Semicolon) {
            vec![]
        } else {
            let mut operands = vec![self.parse_register_expr()?];
            while self.consume(&Token::Comma) {
                operands.push(self.parse_register_expr()?);
            }
            operands
        };
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::Barrier { qubits })
    }

    /// Parse statement starting with identifier (gate call or assignment).
    fn parse_identifier_statement(&mut self) -> ParseResult<StatementKind> {
        let name = self.parse_identifier()?;

        // `c = …;` or `c[0] = …;` is an assignment; everything else with a
        // bracket is a gate operand like `h q[0];`.
        if self.check(&Token::Eq) {
            return self.parse_assignment(name, None);
        }
        if self.check(&Token::LBracket) {
            let checkpoint = self.pos;
            self.advance();
            // Distinguish `c[0] = expr;` from operand indexing.
            if !self.check(&Token::LBrace) {
                let index = self.parse_expression()?;
                if self.consume(&Token::RBracket) && self.check(&Token::Eq) {
                    return self.parse_assignment(name, Some(index));
                }
            }
            self.pos = checkpoint;
        }

        self.parse_gate_call(name)
    }

    /// Parse assignment statement after `target` (and optional index).
    fn parse_assignment(
        &mut self,
        target: String,
        index: Option<Expression>,
    ) -> ParseResult<StatementKind> {
        self.expect(Token::Eq)?;
        let value = self.parse_initializer()?;
        self.expect(Token::Semicolon)?;
        Ok(StatementKind::Assignment {
            target,
            index,
            value,
        })
    }

    /// Parse gate call after the gate name.
    fn parse_gate_call(&mut self, name: String) -> ParseResult<StatementKind> {
        let params = if self.consume(&Token::LParen) {
            let p = self.parse_expression_list()?;
            self.expect(Token::RParen)?;
            p
        } else {
            vec![]
        };

        let mut qubits = vec![self.parse_register_expr()?];
        while self.consume(&Token::Comma) {
            qubits.push(self.parse_register_expr()?);
        }
        self.expect(Token::Semicolon)?;

        Ok(StatementKind::GateCall {
            name,
            params,
            qubits,
        })
    }

    /// Parse a register expression: concatenation of indexed primaries.
    pub(super) fn parse_register_expr(&mut self) -> ParseResult<RegisterExpr> {
        let mut expr = self.parse_register_primary()?;
        while self.consume(&Token::DoublePlus) {
            let rhs = self.parse_register_primary()?;
            expr = RegisterExpr::Concat(Box::new(expr), Box::new(rhs));
        }
        Ok(expr)
    }

    /// Parse a single register reference with optional index designator.
    fn parse_register_primary(&mut self) -> ParseResult<RegisterExpr> {
        let register = self.parse_identifier()?;

        if !self.consume(&Token::LBracket) {
            return Ok(RegisterExpr::Ident(register));
        }

        // Discrete set: `q[{0, 2}]`
        if self.consume(&Token::LBrace) {
            let mut indices = vec![self.parse_expression()?];
            while self.consume(&Token::Comma) {
                indices.push(self.parse_expression()?);
            }
            self.expect(Token::RBrace)?;
            self.expect(Token::RBracket)?;
            return Ok(RegisterExpr::Set { register, indices });
        }

        let first = self.parse_expression()?;

        // Range: `q[0:2]`
        if self.consume(&Token::Colon) {
            let end = self.parse_expression()?;
            self.expect(Token::RBracket)?;
            return Ok(RegisterExpr::Range {
                register,
                start: first,
                end,
            });
        }

        self.expect(Token::RBracket)?;
        Ok(RegisterExpr::Index {
            register,
            index: Box::new(first),
        })
    }

    /// Parse a comma-separated identifier list.
    fn parse_identifier_list(&mut self) -> ParseResult<Vec<String>> {
        let mut names = vec![self.parse_identifier()?];
        while self.consume(&Token::Comma) {
            names.push(self.parse_identifier()?);
        }
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_gate_call_with_params() {
        let program = parse("rx(pi / 2) q[0];").unwrap();
        match &program.statements[0].kind {
            StatementKind::GateCall {
                name,
                params,
                qubits,
            } => {
                assert_eq!(name, "rx");
                assert_eq!(params.len(), 1);
                assert_eq!(qubits.len(), 1);
            }
            other => panic!("expected gate call, got {other:?}"),
        }
    }

    #[test]
    fn test_two_qubit_gate_call() {
        let program = parse("cx q[0], p[1];").unwrap();
        match &program.statements[0].kind {
            StatementKind::GateCall { qubits, .. } => assert_eq!(qubits.len(), 2),
            other => panic!("expected gate call, got {other:?}"),
        }
    }

    #[test]
    fn test_indexed_assignment() {
        let program = parse("c[0] = 1;").unwrap();
        assert!(matches!(
            &program.statements[0].kind,
            StatementKind::Assignment { index: Some(_), .. }
        ));
    }

    #[test]
    fn test_measure_assignment() {
        let program = parse("c = measure q;").unwrap();
        match &program.statements[0].kind {
            StatementKind::Assignment { value, .. } => {
                assert!(matches!(value, Expression::Measure(_)));
            }
            other => panic!("expected assignment, got {other:?}"),
        }
    }

    #[test]
    fn test_register_range_and_set() {
        let program = parse("let a = q[0:2];\nlet b = q[{0, 3}];").unwrap();
        assert!(matches!(
            &program.statements[0].kind,
            StatementKind::Alias { value: RegisterExpr::Range { .. }, .. }
        ));
        assert!(matches!(
            &program.statements[1].kind,
            StatementKind::Alias { value: RegisterExpr::Set { .. }, .. }
        ));
    }

    #[test]
    fn test_gate_definition() {
        let program = parse("gate bell a, b { h a; cx a, b; }").unwrap();
        match &program.statements[0].kind {
            StatementKind::GateDef { name, qubits, body, .. } => {
                assert_eq!(name, "bell");
                assert_eq!(qubits.len(), 2);
                assert_eq!(body.len(), 2);
            }
            other => panic!("expected gate definition, got {other:?}"),
        }
    }

    #[test]
    fn test_if_else() {
        let program = parse("if (c == 1) { x q[0]; } else { h q[0]; }").unwrap();
        match &program.statements[0].kind {
            StatementKind::If {
                then_body,
                else_body,
                ..
            } => {
                assert_eq!(then_body.len(), 1);
                assert_eq!(else_body.len(), 1);
            }
            other => panic!("expected if statement, got {other:?}"),
        }
    }

    #[test]
    fn test_measure_arrow() {
        let program = parse("measure q -> c;").unwrap();
        assert!(matches!(
            &program.statements[0].kind,
            StatementKind::Measure { target: Some(_), .. }
        ));
    }
}
