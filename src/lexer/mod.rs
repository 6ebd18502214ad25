use logos::Logos;

use crate::ast::Span;

#[derive(Logos, Debug, PartialEq, Clone)]
#[logos(skip r"[ \t\r\n\f]+")]
#[logos(skip(r"//[^\n]*", allow_greedy = true))]
pub enum Token {
    // Keywords
    #[token("fn")]
    Function,
    #[token("let")]
    Let,
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("if")]
    If,
    #[token("else")]
    Else,
    #[token("return")]
    Return,

    // Operators
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("!")]
    Bang,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("<=")]
    LessEq,
    #[token(">=")]
    GreaterEq,
    #[token("==")]
    Eq,
    #[token("!=")]
    NotEq,

    // Delimiters
    #[token(",")]
    Comma,
    #[token(";")]
    Semi,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token("{")]
    LBrace,
    #[token("}")]
    RBrace,
    #[token("[")]
    LBracket,
    #[token("]")]
    RBracket,

    // Literals
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),

    #[regex(r#""[^"]*""#, |lex| {
        let s = lex.slice();
        s[1..s.len() - 1].to_string()
    })]
    Str(String),

    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
}

impl Token {
    /// Source text of operator tokens, as carried by prefix and infix nodes.
    pub fn operator(&self) -> Option<&'static str> {
        Some(match self {
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Bang => "!",
            Token::Star => "*",
            Token::Slash => "/",
            Token::Less => "<",
            Token::Greater => ">",
            Token::LessEq => "<=",
            Token::GreaterEq => ">=",
            Token::Eq => "==",
            Token::NotEq => "!=",
            _ => return None,
        })
    }
}

/// Lex source code into a stream of tokens with positions.
/// Stops at the first byte sequence that is not a token.
pub fn lex(source: &str) -> Result<Vec<(Token, Span)>, LexError> {
    let mut lexer = Token::lexer(source);
    let mut tokens = Vec::new();

    while let Some(result) = lexer.next() {
        let range = lexer.span();
        match result {
            Ok(token) => tokens.push((token, Span { start: range.start, end: range.end })),
            Err(()) => {
                let snippet = source[range.clone()].to_string();
                return Err(LexError {
                    position: range.start,
                    suggestion: suggest_fix(&snippet),
                    snippet,
                });
            }
        }
    }

    Ok(tokens)
}

fn suggest_fix(bad_token: &str) -> String {
    if bad_token.starts_with('"') {
        "Close the string literal with a matching '\"'".to_string()
    } else if !bad_token.is_empty() && bad_token.bytes().all(|b| b.is_ascii_digit()) {
        format!("Integer literal '{}' does not fit in 64 bits", bad_token)
    } else if bad_token == "&" || bad_token == "|" {
        "Logical operators are not supported; use nested if expressions".to_string()
    } else {
        format!("Unexpected character(s): '{}'", bad_token)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("Lex error at position {position}: '{snippet}'. {suggestion}")]
pub struct LexError {
    pub position: usize,
    pub snippet: String,
    pub suggestion: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(source: &str) -> Vec<Token> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn lex_let_function() {
        let tokens = kinds("let add = fn(x, y) { x + y; };");
        assert_eq!(
            tokens,
            vec![
                Token::Let,
                Token::Ident("add".into()),
                Token::Assign,
                Token::Function,
                Token::LParen,
                Token::Ident("x".into()),
                Token::Comma,
                Token::Ident("y".into()),
                Token::RParen,
                Token::LBrace,
                Token::Ident("x".into()),
                Token::Plus,
                Token::Ident("y".into()),
                Token::Semi,
                Token::RBrace,
                Token::Semi,
            ]
        );
    }

    #[test]
    fn lex_two_char_operators() {
        let tokens = kinds("a == b != c <= d >= e < f > g");
        let ops: Vec<&str> = tokens.iter().filter_map(Token::operator).collect();
        assert_eq!(ops, vec!["==", "!=", "<=", ">=", "<", ">"]);
    }

    #[test]
    fn lex_string_literal() {
        assert_eq!(kinds(r#""hello world""#), vec![Token::Str("hello world".to_string())]);
    }

    #[test]
    fn lex_keywords_are_not_identifiers() {
        assert_eq!(kinds("if else return iffy"), vec![
            Token::If,
            Token::Else,
            Token::Return,
            Token::Ident("iffy".into()),
        ]);
    }

    #[test]
    fn lex_camel_case_builtin_name() {
        assert_eq!(kinds("toInt"), vec![Token::Ident("toInt".into())]);
    }

    #[test]
    fn lex_comment_ignored() {
        let tokens = kinds("// a comment\nlet");
        assert_eq!(tokens, vec![Token::Let]);
    }

    #[test]
    fn lex_spans_are_byte_offsets() {
        let tokens = lex("let  x").unwrap();
        assert_eq!(tokens[1].1, Span { start: 5, end: 6 });
    }

    #[test]
    fn lex_unterminated_string_is_error() {
        let err = lex("let s = \"oops").unwrap_err();
        assert_eq!(err.position, 8);
        assert!(err.suggestion.contains("Close the string"));
    }

    #[test]
    fn lex_integer_overflow_is_error() {
        let err = lex("99999999999999999999").unwrap_err();
        assert!(err.suggestion.contains("64 bits"), "{}", err.suggestion);
    }

    #[test]
    fn lex_unknown_character() {
        let err = lex("1 & 2").unwrap_err();
        assert_eq!(err.snippet, "&");
    }
}
