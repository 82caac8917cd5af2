//! Tokenizer for the worker scripting language.

use crate::ScriptError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Int(i64),
    Float(f64),
    Str(String),
    Plus,
    Minus,
    Star,
    Slash,
    Assign,
    LParen,
    RParen,
    Comma,
    Dot,
    Separator,
}

#[derive(Debug, Clone)]
pub(crate) struct Spanned {
    pub token: Token,
    pub line: usize,
}

pub(crate) fn tokenize(source: &str) -> Result<Vec<Spanned>, ScriptError> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    let mut line = 1usize;

    while let Some(&ch) = chars.peek() {
        match ch {
            '\n' => {
                chars.next();
                tokens.push(Spanned {
                    token: Token::Separator,
                    line,
                });
                line += 1;
            }
            ';' => {
                chars.next();
                tokens.push(Spanned {
                    token: Token::Separator,
                    line,
                });
            }
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '#' => {
                while let Some(&next) = chars.peek() {
                    if next == '\n' {
                        break;
                    }
                    chars.next();
                }
            }
            '"' => {
                chars.next();
                tokens.push(Spanned {
                    token: Token::Str(read_string(&mut chars, line)?),
                    line,
                });
            }
            '+' | '-' | '*' | '/' | '=' | '(' | ')' | ',' | '.' => {
                chars.next();
                let token = match ch {
                    '+' => Token::Plus,
                    '-' => Token::Minus,
                    '*' => Token::Star,
                    '/' => Token::Slash,
                    '=' => Token::Assign,
                    '(' => Token::LParen,
                    ')' => Token::RParen,
                    ',' => Token::Comma,
                    _ => Token::Dot,
                };
                tokens.push(Spanned { token, line });
            }
            _ if ch.is_ascii_digit() => {
                tokens.push(Spanned {
                    token: read_number(&mut chars, line)?,
                    line,
                });
            }
            _ if ch.is_ascii_alphabetic() || ch == '_' => {
                let mut ident = String::new();
                while let Some(&next) = chars.peek() {
                    if next.is_ascii_alphanumeric() || next == '_' {
                        ident.push(next);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Spanned {
                    token: Token::Ident(ident),
                    line,
                });
            }
            other => {
                return Err(ScriptError::Syntax {
                    line,
                    message: format!("unexpected character '{other}'"),
                });
            }
        }
    }
    Ok(tokens)
}

fn read_string(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<String, ScriptError> {
    let mut out = String::new();
    loop {
        match chars.next() {
            Some('"') => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('"') => out.push('"'),
                Some('\\') => out.push('\\'),
                Some(other) => {
                    return Err(ScriptError::Syntax {
                        line,
                        message: format!("unknown escape '\\{other}'"),
                    });
                }
                None => {
                    return Err(ScriptError::Syntax {
                        line,
                        message: "unterminated string".to_string(),
                    });
                }
            },
            Some('\n') | None => {
                return Err(ScriptError::Syntax {
                    line,
                    message: "unterminated string".to_string(),
                });
            }
            Some(other) => out.push(other),
        }
    }
}

fn read_number(
    chars: &mut std::iter::Peekable<std::str::Chars<'_>>,
    line: usize,
) -> Result<Token, ScriptError> {
    let mut digits = String::new();
    let mut is_float = false;
    while let Some(&next) = chars.peek() {
        if next.is_ascii_digit() {
            digits.push(next);
            chars.next();
        } else if next == '.' && !is_float {
            // Only consume the dot when a digit follows; `1.foo` stays an
            // attribute access error downstream.
            let mut lookahead = chars.clone();
            lookahead.next();
            if lookahead.peek().is_some_and(|c| c.is_ascii_digit()) {
                is_float = true;
                digits.push('.');
                chars.next();
            } else {
                break;
            }
        } else {
            break;
        }
    }
    if is_float {
        digits
            .parse::<f64>()
            .map(Token::Float)
            .map_err(|_| ScriptError::Syntax {
                line,
                message: format!("invalid number '{digits}'"),
            })
    } else {
        digits
            .parse::<i64>()
            .map(Token::Int)
            .map_err(|_| ScriptError::Syntax {
                line,
                message: format!("integer '{digits}' is out of range"),
            })
    }
}
