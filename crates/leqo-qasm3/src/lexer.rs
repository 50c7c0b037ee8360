//! Lexer for `OpenQASM` 3 snippets.

use logos::Logos;

/// Split an annotation line into keyword and command.
///
/// The slice starts with `@`; the keyword runs to the first whitespace, the
/// rest of the line is the command (trailing comments are not stripped —
/// the annotation grammar forbids them and validation rejects the garbage).
fn annotation_parts(slice: &str) -> (String, Option<String>) {
    let body = &slice[1..];
    match body.find(|c: char| c.is_whitespace()) {
        Some(split) => {
            let command = body[split..].trim();
            (
                body[..split].to_string(),
                (!command.is_empty()).then(|| command.to_string()),
            )
        }
        None => (body.to_string(), None),
    }
}

/// Tokens for `OpenQASM` 3.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\n]+")]
#[logos(skip r"//[^\n]*")]
#[logos(skip r"/\*[^*]*\*+(?:[^/*][^*]*\*+)*/")]
pub enum Token {
    // Keywords
    #[token("OPENQASM")]
    OpenQasm,

    #[token("include")]
    Include,

    #[token("qubit")]
    Qubit,

    #[token("bit")]
    Bit,

    #[token("int")]
    Int,

    #[token("uint")]
    Uint,

    #[token("float")]
    Float,

    #[token("bool")]
    Bool,

    #[token("const")]
    Const,

    #[token("let")]
    Let,

    #[token("gate")]
    Gate,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("measure")]
    Measure,

    #[token("reset")]
    Reset,

    #[token("barrier")]
    Barrier,

    // Constants
    #[token("pi")]
    Pi,

    #[token("tau")]
    Tau,

    #[token("euler")]
    Euler,

    #[token("true")]
    True,

    #[token("false")]
    False,

    // Annotation line: `@leqo.input 0`
    #[regex(r"@[a-zA-Z_][a-zA-Z0-9_.]*[^\n]*", |lex| annotation_parts(lex.slice()))]
    AnnotationLine((String, Option<String>)),

    // Literals
    #[regex(r"[0-9]+\.[0-9]*([eE][+-]?[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    #[regex(r"[0-9]+[eE][+-]?[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    FloatLiteral(f64),

    #[regex(r"[0-9]+", |lex| lex.slice().parse::<u64>().ok())]
    IntLiteral(u64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        Some(s[1..s.len()-1].to_string())
    })]
    StringLiteral(String),

    // Identifiers
    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string())]
    Identifier(String),

    // Operators and punctuation
    #[token("++")]
    DoublePlus,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("**")]
    Power,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("%")]
    Percent,

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<=")]
    LtEq,

    #[token("<<")]
    LShift,

    #[token("<")]
    Lt,

    #[token(">=")]
    GtEq,

    #[token(">>")]
    RShift,

    #[token(">")]
    Gt,

    #[token("&&")]
    And,

    #[token("||")]
    Or,

    #[token("!")]
    Not,

    #[token("&")]
    Ampersand,

    #[token("|")]
    Pipe,

    #[token("^")]
    Caret,

    #[token("=")]
    Eq,

    #[token("->")]
    Arrow,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("[")]
    LBracket,

    #[token("]")]
    RBracket,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(";")]
    Semicolon,

    #[token(":")]
    Colon,

    #[token(",")]
    Comma,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::OpenQasm => write!(f, "OPENQASM"),
            Token::Include => write!(f, "include"),
            Token::Qubit => write!(f, "qubit"),
            Token::Bit => write!(f, "bit"),
            Token::Int => write!(f, "int"),
            Token::Uint => write!(f, "uint"),
            Token::Float => write!(f, "float"),
            Token::Bool => write!(f, "bool"),
            Token::Const => write!(f, "const"),
            Token::Let => write!(f, "let"),
            Token::Gate => write!(f, "gate"),
            Token::If => write!(f, "if"),
            Token::Else => write!(f, "else"),
            Token::Measure => write!(f, "measure"),
            Token::Reset => write!(f, "reset"),
            Token::Barrier => write!(f, "barrier"),
            Token::Pi => write!(f, "pi"),
            Token::Tau => write!(f, "tau"),
            Token::Euler => write!(f, "euler"),
            Token::True => write!(f, "true"),
            Token::False => write!(f, "false"),
            Token::AnnotationLine((keyword, _)) => write!(f, "@{keyword}"),
            Token::FloatLiteral(v) => write!(f, "{v}"),
            Token::IntLiteral(v) => write!(f, "{v}"),
            Token::StringLiteral(s) => write!(f, "\"{s}\""),
            Token::Identifier(s) => write!(f, "{s}"),
            Token::DoublePlus => write!(f, "++"),
            Token::Plus => write!(f, "+"),
            Token::Minus => write!(f, "-"),
            Token::Power => write!(f, "**"),
            Token::Star => write!(f, "*"),
            Token::Slash => write!(f, "/"),
            Token::Percent => write!(f, "%"),
            Token::EqEq => write!(f, "=="),
            Token::NotEq => write!(f, "!="),
            Token::LtEq => write!(f, "<="),
            Token::LShift => write!(f, "<<"),
            Token::Lt => write!(f, "<"),
            Token::GtEq => write!(f, ">="),
            Token::RShift => write!(f, ">>"),
            Token::Gt => write!(f, ">"),
            Token::And => write!(f, "&&"),
            Token::Or => write!(f, "||"),
            Token::Not => write!(f, "!"),
            Token::Ampersand => write!(f, "&"),
            Token::Pipe => write!(f, "|"),
            Token::Caret => write!(f, "^"),
            Token::Eq => write!(f, "="),
            Token::Arrow => write!(f, "->"),
            Token::LParen => write!(f, "("),
            Token::RParen => write!(f, ")"),
            Token::LBracket => write!(f, "["),
            Token::RBracket => write!(f, "]"),
            Token::LBrace => write!(f, "{{"),
            Token::RBrace => write!(f, "}}"),
            Token::Semicolon => write!(f, ";"),
            Token::Colon => write!(f, ":"),
            Token::Comma => write!(f, ","),
        }
    }
}

/// A token with its span information.
#[derive(Debug, Clone)]
pub struct SpannedToken {
    pub token: Token,
    pub span: std::ops::Range<usize>,
}

/// Tokenize a QASM3 source string.
pub fn tokenize(source: &str) -> Vec<Result<SpannedToken, (std::ops::Range<usize>, String)>> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        if let Ok(token) = result {
            tokens.push(Ok(SpannedToken { token, span }));
        } else {
            let slice = &source[span.clone()];
            tokens.push(Err((span, format!("Invalid token: '{slice}'"))));
        }
    }

    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok_tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .into_iter()
            .filter_map(Result::ok)
            .map(|t| t.token)
            .collect()
    }

    #[test]
    fn test_qubit_declaration() {
        let tokens = ok_tokens("qubit[2] q;");
        assert_eq!(tokens[0], Token::Qubit);
        assert_eq!(tokens[1], Token::LBracket);
        assert!(matches!(tokens[2], Token::IntLiteral(2)));
        assert_eq!(tokens[3], Token::RBracket);
        assert!(matches!(tokens[4], Token::Identifier(ref s) if s == "q"));
        assert_eq!(tokens[5], Token::Semicolon);
    }

    #[test]
    fn test_annotation_with_index() {
        let tokens = ok_tokens("@leqo.input 0\nqubit q;");
        assert!(matches!(
            &tokens[0],
            Token::AnnotationLine((kw, Some(cmd))) if kw == "leqo.input" && cmd == "0"
        ));
        assert_eq!(tokens[1], Token::Qubit);
    }

    #[test]
    fn test_bare_annotation() {
        let tokens = ok_tokens("@leqo.reusable\nlet a = q;");
        assert!(matches!(
            &tokens[0],
            Token::AnnotationLine((kw, None)) if kw == "leqo.reusable"
        ));
        assert_eq!(tokens[1], Token::Let);
    }

    #[test]
    fn test_concat_operator() {
        let tokens = ok_tokens("let r = a ++ b;");
        assert!(tokens.contains(&Token::DoublePlus));
        assert!(!tokens.contains(&Token::Plus));
    }

    #[test]
    fn test_comments_skipped() {
        let tokens = ok_tokens("// line\nqubit q; /* block */ bit c;");
        assert_eq!(tokens.len(), 6);
    }

    #[test]
    fn test_discrete_set() {
        let tokens = ok_tokens("q[{0, 2}]");
        assert_eq!(tokens[1], Token::LBracket);
        assert_eq!(tokens[2], Token::LBrace);
        assert_eq!(tokens[4], Token::Comma);
    }
}
