//! Lexer and recursive-descent parser for predicate strings.
//!
//! ```text
//! or         := and (("or" | "|") and)*
//! and        := unary (("and" | "&") unary)*
//! unary      := "not" unary | "(" or ")" | comparison
//! comparison := operand op operand
//! operand    := ident | `quoted ident` | number | 'str' | "str" | true | false | null
//! op         := == | = | != | <> | < | <= | > | >=
//! ```
//!
//! Exactly one side of a comparison must be a column. Nesting is capped at
//! [`MAX_NESTING`] levels of `not` and parentheses, and the expression tree
//! at [`MAX_DEPTH`] levels including `and`/`or` chains; deeper text is a
//! syntax error.

use crate::value::Value;

use super::{CompareOp, Predicate, PredicateError};

/// Deepest accepted nesting of `not` and parentheses.
pub(crate) const MAX_NESTING: usize = 256;

/// Deepest accepted expression tree.
pub(crate) const MAX_DEPTH: usize = 2048;

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Op(CompareOp),
    And,
    Or,
    Not,
    True,
    False,
    Null,
    LParen,
    RParen,
    Eof,
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(name) => format!("identifier `{name}`"),
            TokenKind::Int(v) => format!("number {v}"),
            TokenKind::Float(v) => format!("number {v}"),
            TokenKind::Str(s) => format!("string {s:?}"),
            TokenKind::Op(op) => format!("operator {op}"),
            TokenKind::And => "`and`".to_string(),
            TokenKind::Or => "`or`".to_string(),
            TokenKind::Not => "`not`".to_string(),
            TokenKind::True => "`true`".to_string(),
            TokenKind::False => "`false`".to_string(),
            TokenKind::Null => "`null`".to_string(),
            TokenKind::LParen => "`(`".to_string(),
            TokenKind::RParen => "`)`".to_string(),
            TokenKind::Eof => "end of input".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Lexer<'a> {
    fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn tokenize(mut self) -> Result<Vec<Token>, PredicateError> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token()?;
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                return Ok(tokens);
            }
        }
    }

    fn next_token(&mut self) -> Result<Token, PredicateError> {
        while let Some(c) = self.peek_char() {
            if !c.is_whitespace() {
                break;
            }
            self.pos += c.len_utf8();
        }

        let start = self.pos;
        let Some(ch) = self.peek_char() else {
            return Ok(Token {
                kind: TokenKind::Eof,
                pos: start,
            });
        };

        if ch.is_alphabetic() || ch == '_' {
            while let Some(c) = self.peek_char() {
                if c.is_alphanumeric() || c == '_' {
                    self.pos += c.len_utf8();
                } else {
                    break;
                }
            }
            let word = &self.input[start..self.pos];
            let kind = match word.to_ascii_lowercase().as_str() {
                "and" => TokenKind::And,
                "or" => TokenKind::Or,
                "not" => TokenKind::Not,
                "true" => TokenKind::True,
                "false" => TokenKind::False,
                "null" => TokenKind::Null,
                _ => TokenKind::Ident(word.to_string()),
            };
            return Ok(Token { kind, pos: start });
        }

        let rest = &self.input[start..];
        let starts_number = ch.is_ascii_digit()
            || ((ch == '-' || ch == '.') && rest[1..].starts_with(|c: char| c.is_ascii_digit()));
        if starts_number {
            return self.lex_number(start);
        }

        match ch {
            '\'' | '"' => return self.lex_quoted(start, ch, false),
            '`' => return self.lex_quoted(start, ch, true),
            _ => {}
        }

        let two = rest.get(..2).unwrap_or("");
        let two_op = match two {
            "==" => Some(CompareOp::Eq),
            "!=" | "<>" => Some(CompareOp::Ne),
            "<=" => Some(CompareOp::Le),
            ">=" => Some(CompareOp::Ge),
            _ => None,
        };
        if let Some(op) = two_op {
            self.pos += 2;
            return Ok(Token {
                kind: TokenKind::Op(op),
                pos: start,
            });
        }

        self.pos += ch.len_utf8();
        let kind = match ch {
            '=' => TokenKind::Op(CompareOp::Eq),
            '<' => TokenKind::Op(CompareOp::Lt),
            '>' => TokenKind::Op(CompareOp::Gt),
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '&' => TokenKind::And,
            '|' => TokenKind::Or,
            _ => {
                return Err(PredicateError::syntax(
                    start,
                    format!("unexpected character '{ch}'"),
                ));
            }
        };
        Ok(Token { kind, pos: start })
    }

    fn lex_number(&mut self, start: usize) -> Result<Token, PredicateError> {
        if self.peek_char() == Some('-') {
            self.pos += 1;
        }
        let mut is_float = false;
        while let Some(c) = self.peek_char() {
            if c.is_ascii_digit() {
                self.pos += 1;
            } else if c == '.' && !is_float {
                is_float = true;
                self.pos += 1;
            } else if (c == 'e' || c == 'E') && self.pos > start {
                is_float = true;
                self.pos += 1;
                if matches!(self.peek_char(), Some('+' | '-')) {
                    self.pos += 1;
                }
            } else {
                break;
            }
        }
        let text = &self.input[start..self.pos];
        let kind = if is_float {
            TokenKind::Float(text.parse().map_err(|_| {
                PredicateError::syntax(start, format!("invalid number {text:?}"))
            })?)
        } else {
            TokenKind::Int(text.parse().map_err(|_| {
                PredicateError::syntax(start, format!("integer {text} out of range"))
            })?)
        };
        Ok(Token { kind, pos: start })
    }

    /// Quoted string or backtick identifier. A doubled quote character
    /// stands for itself.
    fn lex_quoted(&mut self, start: usize, quote: char, ident: bool) -> Result<Token, PredicateError> {
        self.pos += quote.len_utf8();
        let mut value = String::new();
        while let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
            if c == quote {
                if self.peek_char() == Some(quote) {
                    value.push(quote);
                    self.pos += quote.len_utf8();
                    continue;
                }
                let kind = if ident {
                    TokenKind::Ident(value)
                } else {
                    TokenKind::Str(value)
                };
                return Ok(Token { kind, pos: start });
            }
            value.push(c);
        }
        let what = if ident { "identifier" } else { "string literal" };
        Err(PredicateError::syntax(start, format!("unterminated {what}")))
    }
}

enum Operand {
    Column(String),
    Literal(Value),
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    nesting: usize,
    depth: usize,
}

impl Parser {
    fn new(tokens: Vec<Token>) -> Self {
        Self {
            tokens,
            pos: 0,
            nesting: 0,
            depth: 0,
        }
    }

    fn current(&self) -> &Token {
        // The lexer always terminates the stream with Eof.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn advance(&mut self) {
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if &self.current().kind == kind {
            self.advance();
            true
        } else {
            false
        }
    }

    fn unexpected(&self, expected: &str) -> PredicateError {
        let token = self.current();
        PredicateError::syntax(
            token.pos,
            format!("expected {expected}, found {}", token.kind.describe()),
        )
    }

    fn too_deep(&self, limit: usize, what: &str) -> PredicateError {
        PredicateError::syntax(
            self.current().pos,
            format!("{what} nested deeper than {limit} levels"),
        )
    }

    fn nest(&mut self) -> Result<(), PredicateError> {
        if self.nesting >= MAX_NESTING {
            return Err(self.too_deep(MAX_NESTING, "`not` and parentheses"));
        }
        self.nesting += 1;
        Ok(())
    }

    fn deepen(&mut self) -> Result<(), PredicateError> {
        if self.depth >= MAX_DEPTH {
            return Err(self.too_deep(MAX_DEPTH, "expression"));
        }
        self.depth += 1;
        Ok(())
    }

    fn parse_predicate(&mut self) -> Result<Predicate, PredicateError> {
        let expr = self.parse_or()?;
        if self.current().kind != TokenKind::Eof {
            return Err(self.unexpected("`and`, `or` or end of input"));
        }
        Ok(expr)
    }

    // Each chained `or`/`and` wraps the tree built so far, so it adds one
    // level to the depth of everything parsed after it in the chain.
    fn parse_or(&mut self) -> Result<Predicate, PredicateError> {
        let depth = self.depth;
        let mut expr = self.parse_and()?;
        while self.eat(&TokenKind::Or) {
            self.deepen()?;
            let right = self.parse_and()?;
            expr = Predicate::Or(Box::new(expr), Box::new(right));
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_and(&mut self) -> Result<Predicate, PredicateError> {
        let depth = self.depth;
        let mut expr = self.parse_unary()?;
        while self.eat(&TokenKind::And) {
            self.deepen()?;
            let right = self.parse_unary()?;
            expr = Predicate::And(Box::new(expr), Box::new(right));
        }
        self.depth = depth;
        Ok(expr)
    }

    fn parse_unary(&mut self) -> Result<Predicate, PredicateError> {
        let (nesting, depth) = (self.nesting, self.depth);
        let expr = if self.current().kind == TokenKind::Not {
            self.nest()?;
            self.deepen()?;
            self.advance();
            Predicate::Not(Box::new(self.parse_unary()?))
        } else if self.current().kind == TokenKind::LParen {
            self.nest()?;
            self.advance();
            let inner = self.parse_or()?;
            if !self.eat(&TokenKind::RParen) {
                return Err(self.unexpected("`)`"));
            }
            inner
        } else {
            return self.parse_comparison();
        };
        self.nesting = nesting;
        self.depth = depth;
        Ok(expr)
    }

    fn parse_operand(&mut self) -> Result<Operand, PredicateError> {
        let operand = match &self.current().kind {
            TokenKind::Ident(name) => Operand::Column(name.clone()),
            TokenKind::Int(v) => Operand::Literal(Value::Int64(*v)),
            TokenKind::Float(v) => Operand::Literal(Value::Float64(*v)),
            TokenKind::Str(s) => Operand::Literal(Value::Utf8(s.clone())),
            TokenKind::True => Operand::Literal(Value::Bool(true)),
            TokenKind::False => Operand::Literal(Value::Bool(false)),
            TokenKind::Null => Operand::Literal(Value::Null),
            _ => return Err(self.unexpected("a column name or literal")),
        };
        self.advance();
        Ok(operand)
    }

    fn parse_comparison(&mut self) -> Result<Predicate, PredicateError> {
        let start = self.current().pos;
        let left = self.parse_operand()?;
        let op = match self.current().kind {
            TokenKind::Op(op) => op,
            _ => return Err(self.unexpected("a comparison operator")),
        };
        self.advance();
        let right = self.parse_operand()?;

        match (left, right) {
            (Operand::Column(column), Operand::Literal(literal)) => Ok(Predicate::Comparison {
                column,
                op,
                literal,
            }),
            (Operand::Literal(literal), Operand::Column(column)) => Ok(Predicate::Comparison {
                column,
                op: op.flip(),
                literal,
            }),
            (Operand::Column(_), Operand::Column(_)) => Err(PredicateError::syntax(
                start,
                "comparisons between two columns are not supported",
            )),
            (Operand::Literal(_), Operand::Literal(_)) => Err(PredicateError::syntax(
                start,
                "a comparison needs a column on one side",
            )),
        }
    }
}

/// Parse predicate text into an expression tree.
pub(crate) fn parse(input: &str) -> Result<Predicate, PredicateError> {
    let tokens = Lexer::new(input).tokenize()?;
    let mut parser = Parser::new(tokens);
    parser.parse_predicate()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cmp(column: &str, op: CompareOp, literal: impl Into<Value>) -> Predicate {
        Predicate::Comparison {
            column: column.to_string(),
            op,
            literal: literal.into(),
        }
    }

    #[test]
    fn parses_simple_comparison() {
        assert_eq!(
            parse("expression > 5.0").unwrap(),
            cmp("expression", CompareOp::Gt, 5.0)
        );
        assert_eq!(
            parse("category == 'coding'").unwrap(),
            cmp("category", CompareOp::Eq, "coding")
        );
        assert_eq!(parse("n = -3").unwrap(), cmp("n", CompareOp::Eq, -3_i64));
    }

    #[test]
    fn literal_on_the_left_flips_the_operator() {
        assert_eq!(parse("5 < n").unwrap(), cmp("n", CompareOp::Gt, 5_i64));
    }

    #[test]
    fn and_binds_tighter_than_or() {
        let p = parse("a == 1 or b == 2 and not c == 3").unwrap();
        let expected = Predicate::Or(
            Box::new(cmp("a", CompareOp::Eq, 1_i64)),
            Box::new(Predicate::And(
                Box::new(cmp("b", CompareOp::Eq, 2_i64)),
                Box::new(Predicate::Not(Box::new(cmp("c", CompareOp::Eq, 3_i64)))),
            )),
        );
        assert_eq!(p, expected);
    }

    #[test]
    fn symbols_keywords_and_quoting() {
        let p = parse("(`gene name` != \"it\"\"s\") & FLAG == TRUE | x == NULL").unwrap();
        let expected = Predicate::Or(
            Box::new(Predicate::And(
                Box::new(cmp("gene name", CompareOp::Ne, "it\"s")),
                Box::new(cmp("FLAG", CompareOp::Eq, true)),
            )),
            Box::new(cmp("x", CompareOp::Eq, Value::Null)),
        );
        assert_eq!(p, expected);
    }

    #[test]
    fn malformed_text_reports_position() {
        for (text, pos) in [
            ("", 0),
            ("a >", 3),
            ("a > 1 b", 6),
            ("(a > 1", 6),
            ("a ? 1", 2),
            ("1 < 2", 0),
            ("a < b", 0),
            ("name == 'open", 8),
        ] {
            match parse(text) {
                Err(PredicateError::Syntax { position, .. }) => {
                    assert_eq!(position, pos, "{text:?}")
                }
                other => panic!("{text:?}: expected syntax error, got {other:?}"),
            }
        }
    }

    fn syntax_position(text: &str) -> usize {
        match parse(text) {
            Err(PredicateError::Syntax { position, .. }) => position,
            other => panic!("expected syntax error, got {other:?}"),
        }
    }

    #[test]
    fn deep_nesting_is_a_syntax_error() {
        let parens = format!("{}x == 1{}", "(".repeat(200_000), ")".repeat(200_000));
        assert_eq!(syntax_position(&parens), MAX_NESTING);

        let nots = format!("{}x == 1", "not ".repeat(10_000));
        assert_eq!(syntax_position(&nots), MAX_NESTING * 4);

        let ok = format!("{}x == 1{}", "(".repeat(100), ")".repeat(100));
        assert_eq!(parse(&ok).unwrap(), cmp("x", CompareOp::Eq, 1_i64));
    }

    #[test]
    fn long_chains_are_bounded() {
        let chain = vec!["x == 1"; 1000].join(" or ");
        assert!(parse(&chain).is_ok());

        let chain = vec!["x == 1"; MAX_DEPTH + 10].join(" and ");
        assert!(syntax_position(&chain) > 0);
    }
}
