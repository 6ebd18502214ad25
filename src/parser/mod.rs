use crate::ast::*;
use crate::lexer::Token;

const MAX_ERRORS: usize = 20;

pub struct Parser {
    tokens: Vec<(Token, Span)>,
    pos: usize,
}

#[derive(Debug, thiserror::Error)]
#[error("Parse error at token {position}: {message}")]
pub struct ParseError {
    pub code: &'static str,
    pub position: usize,
    pub span: Span,
    pub message: String,
}

type Result<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Precedence {
    Lowest,
    Equals,
    LessGreater,
    Sum,
    Product,
    Prefix,
    Call,
    Index,
}

fn precedence_of(tok: &Token) -> Precedence {
    match tok {
        Token::Eq | Token::NotEq => Precedence::Equals,
        Token::Less | Token::Greater | Token::LessEq | Token::GreaterEq => Precedence::LessGreater,
        Token::Plus | Token::Minus => Precedence::Sum,
        Token::Star | Token::Slash => Precedence::Product,
        Token::LParen => Precedence::Call,
        Token::LBracket => Precedence::Index,
        _ => Precedence::Lowest,
    }
}

impl Parser {
    pub fn new(tokens: Vec<(Token, Span)>) -> Self {
        Parser { tokens, pos: 0 }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_span(&self) -> Span {
        match self.tokens.get(self.pos) {
            Some((_, span)) => *span,
            // Point just past the last token at EOF
            None => self
                .tokens
                .last()
                .map(|(_, s)| Span { start: s.end, end: s.end })
                .unwrap_or(Span::UNKNOWN),
        }
    }

    fn advance(&mut self) -> Option<Token> {
        let tok = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if tok.is_some() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token) -> Result<Span> {
        match self.peek() {
            Some(tok) if tok == expected => {
                let span = self.peek_span();
                self.advance();
                Ok(span)
            }
            Some(tok) => {
                let message = format!("expected next token to be {:?}, got {:?} instead", expected, tok);
                Err(self.error("MK-P003", message))
            }
            None => Err(self.error("MK-P004", format!("expected {:?}, got EOF", expected))),
        }
    }

    fn expect_ident(&mut self) -> Result<String> {
        match self.peek().cloned() {
            Some(Token::Ident(name)) => {
                self.advance();
                Ok(name)
            }
            Some(tok) => Err(self.error("MK-P005", format!("expected identifier, got {:?}", tok))),
            None => Err(self.error("MK-P006", "expected identifier, got EOF".into())),
        }
    }

    fn error(&self, code: &'static str, message: String) -> ParseError {
        ParseError {
            code,
            position: self.pos,
            span: self.peek_span(),
            message,
        }
    }

    fn at_end(&self) -> bool {
        self.pos >= self.tokens.len()
    }

    fn skip_semis(&mut self) {
        while self.peek() == Some(&Token::Semi) {
            self.advance();
        }
    }

    // ---- Statements ----

    pub fn parse_program(&mut self) -> (Program, Vec<ParseError>) {
        let mut statements = Vec::new();
        let mut errors: Vec<ParseError> = Vec::new();

        self.skip_semis();
        while !self.at_end() {
            if errors.len() >= MAX_ERRORS {
                break;
            }
            match self.parse_stmt() {
                Ok(stmt) => statements.push(stmt),
                Err(e) => {
                    errors.push(e);
                    self.sync_to_stmt_boundary();
                }
            }
            self.skip_semis();
        }

        (Program { statements }, errors)
    }

    /// Skip past the failed statement: up to and including the next top-level `;`,
    /// or up to the next `let`/`return`. Always consumes at least one token.
    fn sync_to_stmt_boundary(&mut self) {
        let start = self.pos;
        let mut depth: usize = 0;

        while let Some(tok) = self.peek().cloned() {
            match tok {
                Token::Semi if depth == 0 => {
                    self.advance();
                    return;
                }
                Token::Let | Token::Return if depth == 0 && self.pos > start => return,
                Token::LBrace => depth += 1,
                Token::RBrace => depth = depth.saturating_sub(1),
                _ => {}
            }
            self.advance();
        }
    }

    fn parse_stmt(&mut self) -> Result<Stmt> {
        let stmt = match self.peek() {
            Some(Token::Let) => self.parse_let()?,
            Some(Token::Return) => {
                self.advance();
                Stmt::Return(self.parse_expr(Precedence::Lowest)?)
            }
            _ => Stmt::Expr(self.parse_expr(Precedence::Lowest)?),
        };
        if self.peek() == Some(&Token::Semi) {
            self.advance();
        }
        Ok(stmt)
    }

    /// `let name = value`
    fn parse_let(&mut self) -> Result<Stmt> {
        self.expect(&Token::Let)?;
        let name = self.expect_ident()?;
        self.expect(&Token::Assign)?;
        let mut value = self.parse_expr(Precedence::Lowest)?;
        if let Expr::Function { name: fn_name, .. } = &mut value {
            *fn_name = Some(name.clone());
        }
        Ok(Stmt::Let { name, value })
    }

    fn parse_block(&mut self) -> Result<Block> {
        self.expect(&Token::LBrace)?;
        let mut statements = Vec::new();
        self.skip_semis();
        while !matches!(self.peek(), None | Some(Token::RBrace)) {
            statements.push(self.parse_stmt()?);
            self.skip_semis();
        }
        self.expect(&Token::RBrace)?;
        Ok(Block { statements })
    }

    // ---- Expressions ----

    fn parse_expr(&mut self, precedence: Precedence) -> Result<Expr> {
        let mut left = self.parse_prefix()?;

        while let Some(tok) = self.peek() {
            if precedence >= precedence_of(tok) {
                break;
            }
            left = match tok {
                Token::LParen => self.parse_call(left)?,
                Token::LBracket => self.parse_index(left)?,
                _ => self.parse_infix(left)?,
            };
        }

        Ok(left)
    }

    fn parse_prefix(&mut self) -> Result<Expr> {
        let Some(tok) = self.peek().cloned() else {
            return Err(self.error("MK-P002", "expected expression, got EOF".into()));
        };

        match tok {
            Token::Ident(name) => {
                self.advance();
                Ok(Expr::Ident(name))
            }
            Token::Int(n) => {
                self.advance();
                Ok(Expr::Integer(n))
            }
            Token::Str(s) => {
                self.advance();
                Ok(Expr::Str(s))
            }
            Token::True | Token::False => {
                self.advance();
                Ok(Expr::Boolean(tok == Token::True))
            }
            Token::Bang | Token::Minus => {
                self.advance();
                let right = self.parse_expr(Precedence::Prefix)?;
                let operator = tok.operator().unwrap_or_default().to_string();
                Ok(Expr::Prefix { operator, right: Box::new(right) })
            }
            Token::LParen => {
                self.advance();
                let expr = self.parse_expr(Precedence::Lowest)?;
                self.expect(&Token::RParen)?;
                Ok(expr)
            }
            Token::If => self.parse_if(),
            Token::Function => self.parse_function(),
            Token::LBracket => {
                self.advance();
                Ok(Expr::Array(self.parse_expr_list(&Token::RBracket)?))
            }
            Token::LBrace => self.parse_hash(),
            other => {
                let hint = if other == Token::Assign {
                    "\n  hint: bindings are written `let name = value;`"
                } else {
                    ""
                };
                Err(self.error("MK-P001", format!("no prefix parse function for {:?} found{}", other, hint)))
            }
        }
    }

    fn parse_infix(&mut self, left: Expr) -> Result<Expr> {
        let tok = self.advance().unwrap_or(Token::Semi);
        let Some(operator) = tok.operator() else {
            return Err(self.error("MK-P007", format!("{:?} is not an infix operator", tok)));
        };
        let right = self.parse_expr(precedence_of(&tok))?;
        Ok(Expr::Infix {
            operator: operator.to_string(),
            left: Box::new(left),
            right: Box::new(right),
        })
    }

    fn parse_call(&mut self, function: Expr) -> Result<Expr> {
        self.expect(&Token::LParen)?;
        let arguments = self.parse_expr_list(&Token::RParen)?;
        Ok(Expr::Call { function: Box::new(function), arguments })
    }

    fn parse_index(&mut self, left: Expr) -> Result<Expr> {
        self.expect(&Token::LBracket)?;
        let index = self.parse_expr(Precedence::Lowest)?;
        self.expect(&Token::RBracket)?;
        Ok(Expr::Index { left: Box::new(left), index: Box::new(index) })
    }

    /// Comma-separated expressions up to `end`; the opening delimiter is already consumed.
    /// A trailing comma is accepted.
    fn parse_expr_list(&mut self, end: &Token) -> Result<Vec<Expr>> {
        let mut items = Vec::new();
        while self.peek() != Some(end) {
            items.push(self.parse_expr(Precedence::Lowest)?);
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(end)?;
        Ok(items)
    }

    /// `if (cond) { ... } else { ... }`
    fn parse_if(&mut self) -> Result<Expr> {
        self.expect(&Token::If)?;
        self.expect(&Token::LParen)?;
        let condition = self.parse_expr(Precedence::Lowest)?;
        self.expect(&Token::RParen)?;
        let consequence = self.parse_block()?;
        let alternative = if self.peek() == Some(&Token::Else) {
            self.advance();
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Expr::If { condition: Box::new(condition), consequence, alternative })
    }

    /// `fn(a, b) { ... }`
    fn parse_function(&mut self) -> Result<Expr> {
        self.expect(&Token::Function)?;
        self.expect(&Token::LParen)?;
        let mut parameters = Vec::new();
        while self.peek() != Some(&Token::RParen) {
            parameters.push(self.expect_ident()?);
            if self.peek() == Some(&Token::Comma) {
                self.advance();
            } else {
                break;
            }
        }
        self.expect(&Token::RParen)?;
        let body = self.parse_block()?;
        Ok(Expr::Function { name: None, parameters, body })
    }

    /// `{k: v, ...}`
    fn parse_hash(&mut self) -> Result<Expr> {
        self.expect(&Token::LBrace)?;
        let mut pairs = Vec::new();
        while self.peek() != Some(&Token::RBrace) {
            let key = self.parse_expr(Precedence::Lowest)?;
            self.expect(&Token::Colon)?;
            let value = self.parse_expr(Precedence::Lowest)?;
            pairs.push((key, value));
            if self.peek() != Some(&Token::RBrace) {
                self.expect(&Token::Comma)?;
            }
        }
        self.expect(&Token::RBrace)?;
        Ok(Expr::Hash(pairs))
    }
}

/// Parse a token stream, recovering at statement boundaries.
pub fn parse(tokens: Vec<(Token, Span)>) -> (Program, Vec<ParseError>) {
    Parser::new(tokens).parse_program()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer;

    fn parse_str(source: &str) -> Program {
        let (prog, errors) = parse(lexer::lex(source).unwrap());
        assert!(errors.is_empty(), "parse errors for {:?}: {:?}", source, errors);
        prog
    }

    fn parse_str_errors(source: &str) -> Vec<ParseError> {
        parse(lexer::lex(source).unwrap()).1
    }

    fn single_expr(source: &str) -> Expr {
        let prog = parse_str(source);
        assert_eq!(prog.statements.len(), 1, "expected one statement in {:?}", source);
        match prog.statements.into_iter().next() {
            Some(Stmt::Expr(e)) => e,
            other => panic!("expected expression statement, got {:?}", other),
        }
    }

    #[test]
    fn parse_let_statements() {
        let prog = parse_str("let x = 5; let y = true; let foobar = y;");
        assert_eq!(
            prog.statements,
            vec![
                Stmt::Let { name: "x".into(), value: Expr::Integer(5) },
                Stmt::Let { name: "y".into(), value: Expr::Boolean(true) },
                Stmt::Let { name: "foobar".into(), value: Expr::Ident("y".into()) },
            ]
        );
    }

    #[test]
    fn parse_return_statement() {
        let prog = parse_str("return 993322;");
        assert_eq!(prog.statements, vec![Stmt::Return(Expr::Integer(993322))]);
    }

    #[test]
    fn parse_prefix_expressions() {
        assert_eq!(
            single_expr("!5;"),
            Expr::Prefix { operator: "!".into(), right: Box::new(Expr::Integer(5)) }
        );
        assert_eq!(
            single_expr("-foo"),
            Expr::Prefix { operator: "-".into(), right: Box::new(Expr::Ident("foo".into())) }
        );
    }

    #[test]
    fn parse_operator_precedence() {
        let cases = [
            ("-a * b", "((-a) * b)"),
            ("!-a", "(!(-a))"),
            ("a + b + c", "((a + b) + c)"),
            ("a + b * c + d / e - f", "(((a + (b * c)) + (d / e)) - f)"),
            ("3 + 4; -5 * 5", "(3 + 4)((-5) * 5)"),
            ("5 > 4 == 3 < 4", "((5 > 4) == (3 < 4))"),
            ("a <= b != c >= d", "((a <= b) != (c >= d))"),
            ("3 + 4 * 5 == 3 * 1 + 4 * 5", "((3 + (4 * 5)) == ((3 * 1) + (4 * 5)))"),
            ("1 + (2 + 3) + 4", "((1 + (2 + 3)) + 4)"),
            ("!(true == true)", "(!(true == true))"),
            ("a + add(b * c) + d", "((a + add((b * c))) + d)"),
            (
                "add(a, b, 1, 2 * 3, 4 + 5, add(6, 7 * 8))",
                "add(a, b, 1, (2 * 3), (4 + 5), add(6, (7 * 8)))",
            ),
            ("a * [1, 2, 3, 4][b * c] * d", "((a * ([1, 2, 3, 4][(b * c)])) * d)"),
            ("add(a * b[2], b[1], 2 * [1, 2][1])", "add((a * (b[2])), (b[1]), (2 * ([1, 2][1])))"),
        ];
        for (input, expected) in cases {
            assert_eq!(parse_str(input).to_string(), expected, "input: {}", input);
        }
    }

    #[test]
    fn parse_if_else() {
        let expr = single_expr("if (x < y) { x } else { y }");
        match expr {
            Expr::If { condition, consequence, alternative } => {
                assert_eq!(condition.to_string(), "(x < y)");
                assert_eq!(consequence.statements, vec![Stmt::Expr(Expr::Ident("x".into()))]);
                assert_eq!(
                    alternative.map(|b| b.statements),
                    Some(vec![Stmt::Expr(Expr::Ident("y".into()))])
                );
            }
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn parse_if_without_else() {
        match single_expr("if (x) { x }") {
            Expr::If { alternative, .. } => assert!(alternative.is_none()),
            other => panic!("expected if, got {:?}", other),
        }
    }

    #[test]
    fn parse_function_parameters() {
        let cases: [(&str, Vec<&str>); 3] = [
            ("fn() {};", vec![]),
            ("fn(x) {};", vec!["x"]),
            ("fn(x, y, z) {};", vec!["x", "y", "z"]),
        ];
        for (input, expected) in cases {
            match single_expr(input) {
                Expr::Function { parameters, name, .. } => {
                    assert_eq!(parameters, expected);
                    assert!(name.is_none());
                }
                other => panic!("expected function, got {:?}", other),
            }
        }
    }

    #[test]
    fn parse_function_literal_with_name() {
        let prog = parse_str("let myFunction = fn() { };");
        match &prog.statements[0] {
            Stmt::Let { value: Expr::Function { name, .. }, .. } => {
                assert_eq!(name.as_deref(), Some("myFunction"));
            }
            other => panic!("expected let of function, got {:?}", other),
        }
    }

    #[test]
    fn parse_call_expression() {
        let expr = single_expr("add(1, 2 * 3, 4 + 5);");
        assert_eq!(expr.to_string(), "add(1, (2 * 3), (4 + 5))");
    }

    #[test]
    fn parse_string_literal() {
        assert_eq!(single_expr(r#""hello world";"#), Expr::Str("hello world".into()));
    }

    #[test]
    fn parse_array_and_index() {
        assert_eq!(single_expr("[1, 2 * 2, 3 + 3]").to_string(), "[1, (2 * 2), (3 + 3)]");
        assert_eq!(single_expr("myArray[1 + 1]").to_string(), "(myArray[(1 + 1)])");
        assert_eq!(single_expr("[]"), Expr::Array(vec![]));
        assert_eq!(single_expr("[1, 2,]"), Expr::Array(vec![Expr::Integer(1), Expr::Integer(2)]));
    }

    #[test]
    fn parse_hash_literals() {
        assert_eq!(single_expr("{}"), Expr::Hash(vec![]));
        let expr = single_expr(r#"{"one": 0 + 1, "two": 10 - 8, true: 3}"#);
        match expr {
            Expr::Hash(pairs) => {
                let rendered: Vec<(String, String)> =
                    pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
                assert_eq!(
                    rendered,
                    vec![
                        ("one".to_string(), "(0 + 1)".to_string()),
                        ("two".to_string(), "(10 - 8)".to_string()),
                        ("true".to_string(), "3".to_string()),
                    ]
                );
            }
            other => panic!("expected hash, got {:?}", other),
        }
    }

    #[test]
    fn parse_semicolons_are_optional() {
        let prog = parse_str("let a = 1\nlet b = 2\na + b");
        assert_eq!(prog.statements.len(), 3);
    }

    #[test]
    fn parse_error_on_missing_ident() {
        let errors = parse_str_errors("let = 5;");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("expected identifier"), "{}", errors[0].message);
    }

    #[test]
    fn parse_recovers_and_reports_several_errors() {
        let errors = parse_str_errors("let x 5; let = 10; let 838383;");
        assert_eq!(errors.len(), 3, "{:?}", errors);
    }

    #[test]
    fn parse_error_at_eof_points_past_last_token() {
        let errors = parse_str_errors("let x = ");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].span, Span { start: 8, end: 8 });
        assert_eq!(errors[0].code, "MK-P002");
    }

    #[test]
    fn parse_unbalanced_paren() {
        let errors = parse_str_errors("(1 + 2");
        assert_eq!(errors.len(), 1);
        assert!(errors[0].message.contains("RParen"));
    }
}
