//! Tokenizer for the XPath subset.

use crate::query::evaluator::EvalError;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Slash,
    DoubleSlash,
    LBracket,
    RBracket,
    LParen,
    RParen,
    At,
    Comma,
    Pipe,
    Dot,
    DotDot,
    ColonColon,
    Star,
    Plus,
    Minus,
    Eq,
    Neq,
    Lt,
    Le,
    Gt,
    Ge,
    Literal(String),
    Number(f64),
    Name(String),
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Slash => "/",
            Self::DoubleSlash => "//",
            Self::LBracket => "[",
            Self::RBracket => "]",
            Self::LParen => "(",
            Self::RParen => ")",
            Self::At => "@",
            Self::Comma => ",",
            Self::Pipe => "|",
            Self::Dot => ".",
            Self::DotDot => "..",
            Self::ColonColon => "::",
            Self::Star => "*",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::Eq => "=",
            Self::Neq => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::Literal(s) => return write!(f, "{s:?}"),
            Self::Number(n) => return write!(f, "{n}"),
            Self::Name(n) => return f.write_str(n),
        };
        f.write_str(s)
    }
}

fn is_name_start(c: char) -> bool {
    c.is_alphabetic() || c == '_'
}

fn is_name_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '-' | '.')
}

pub fn tokenize(input: &str) -> Result<Vec<Token>, EvalError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let next = chars.get(i + 1).copied();
        let (token, width) = match c {
            c if c.is_whitespace() => {
                i += 1;
                continue;
            }
            '/' if next == Some('/') => (Token::DoubleSlash, 2),
            '/' => (Token::Slash, 1),
            '[' => (Token::LBracket, 1),
            ']' => (Token::RBracket, 1),
            '(' => (Token::LParen, 1),
            ')' => (Token::RParen, 1),
            '@' => (Token::At, 1),
            ',' => (Token::Comma, 1),
            '|' => (Token::Pipe, 1),
            ':' if next == Some(':') => (Token::ColonColon, 2),
            '*' => (Token::Star, 1),
            '+' => (Token::Plus, 1),
            '-' => (Token::Minus, 1),
            '=' => (Token::Eq, 1),
            '!' if next == Some('=') => (Token::Neq, 2),
            '<' if next == Some('=') => (Token::Le, 2),
            '<' => (Token::Lt, 1),
            '>' if next == Some('=') => (Token::Ge, 2),
            '>' => (Token::Gt, 1),
            '.' if next == Some('.') => (Token::DotDot, 2),
            '.' if next.is_some_and(|n| n.is_ascii_digit()) => {
                let (n, w) = number(&chars[i..]);
                (Token::Number(n), w)
            }
            '.' => (Token::Dot, 1),
            '"' | '\'' => {
                let Some(len) = chars[i + 1..].iter().position(|&ch| ch == c) else {
                    return Err(EvalError::invalid(format!(
                        "unterminated string literal at offset {i}"
                    )));
                };
                let lit: String = chars[i + 1..i + 1 + len].iter().collect();
                (Token::Literal(lit), len + 2)
            }
            c if c.is_ascii_digit() => {
                let (n, w) = number(&chars[i..]);
                (Token::Number(n), w)
            }
            c if is_name_start(c) => {
                let (name, w) = name(&chars[i..]);
                (Token::Name(name), w)
            }
            other => {
                return Err(EvalError::invalid(format!(
                    "unexpected character {other:?} at offset {i}"
                )))
            }
        };
        tokens.push(token);
        i += width;
    }
    Ok(tokens)
}

fn number(chars: &[char]) -> (f64, usize) {
    let mut len = 0;
    let mut seen_dot = false;
    while let Some(&c) = chars.get(len) {
        if c.is_ascii_digit() {
            len += 1;
        } else if c == '.' && !seen_dot && chars.get(len + 1) != Some(&'.') {
            seen_dot = true;
            len += 1;
        } else {
            break;
        }
    }
    let text: String = chars[..len].iter().collect();
    (text.parse().unwrap_or(f64::NAN), len)
}

/// A name, optionally with one `prefix:` part (`python:Module`).
fn name(chars: &[char]) -> (String, usize) {
    let mut len = chars.iter().take_while(|&&c| is_name_char(c)).count();
    if chars.get(len) == Some(&':')
        && chars.get(len + 1).is_some_and(|&c| is_name_start(c))
    {
        len += 1;
        len += chars[len..].iter().take_while(|&&c| is_name_char(c)).count();
    }
    (chars[..len].iter().collect(), len)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq as pa_eq;

    #[test]
    fn path_with_predicate() {
        pa_eq!(
            tokenize("//Identifier[@token='x']").unwrap(),
            vec![
                Token::DoubleSlash,
                Token::Name("Identifier".into()),
                Token::LBracket,
                Token::At,
                Token::Name("token".into()),
                Token::Eq,
                Token::Literal("x".into()),
                Token::RBracket,
            ]
        );
    }

    #[test]
    fn operators_and_numbers() {
        pa_eq!(
            tokenize("count(..) >= 2.5 != .5").unwrap(),
            vec![
                Token::Name("count".into()),
                Token::LParen,
                Token::DotDot,
                Token::RParen,
                Token::Ge,
                Token::Number(2.5),
                Token::Neq,
                Token::Number(0.5),
            ]
        );
    }

    #[test]
    fn prefixed_names_and_axes() {
        pa_eq!(
            tokenize("child::python:Module").unwrap(),
            vec![
                Token::Name("child".into()),
                Token::ColonColon,
                Token::Name("python:Module".into()),
            ]
        );
    }

    #[test]
    fn unterminated_literal_is_invalid() {
        let err = tokenize("//a[@token='x]").unwrap_err();
        assert!(err.is_invalid_expression());
    }

    #[test]
    fn stray_character_is_invalid() {
        assert!(tokenize("//a#b").unwrap_err().is_invalid_expression());
    }
}
