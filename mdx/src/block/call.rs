use std::fmt;

use crate::block::Stream;

/// A parameter passed to a called block: `NAME=value` or `NAME:code=value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamBinding {
    pub name: String,
    /// Invocation code selecting the expansion, e.g. `ce`. `None` passes the value through.
    pub invocation: Option<String>,
    pub value: String,
}

/// A parsed call expression: `(target [<input] [>output] [NAME[:code]=value ...])`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallBinding {
    pub target_name: String,
    pub input_redirect: Option<Stream>,
    pub output_capture: Option<Stream>,
    pub params: Vec<ParamBinding>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallError {
    MissingOpenParen,
    MissingCloseParen,
    /// Text continues after the parenthesis that closes the call.
    TrailingText(String),
    UnterminatedQuote,
    EmptyRedirect(char),
    DuplicateRedirect(char),
    MissingTarget,
}

impl fmt::Display for CallError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CallError::MissingOpenParen => write!(f, "call must start with '('"),
            CallError::MissingCloseParen => write!(f, "unbalanced parentheses: missing ')'"),
            CallError::TrailingText(text) => {
                write!(f, "unbalanced parentheses: unexpected '{}' after call", text)
            }
            CallError::UnterminatedQuote => write!(f, "unterminated quote"),
            CallError::EmptyRedirect(op) => write!(f, "'{}' without a name", op),
            CallError::DuplicateRedirect(op) => write!(f, "more than one '{}' redirect", op),
            CallError::MissingTarget => write!(f, "call has no target block"),
        }
    }
}

impl std::error::Error for CallError {}

/// Parse a call expression such as `(summarize_fruits <fruit.yml >$fruit_summary)`.
pub fn parse_call(raw: &str) -> Result<CallBinding, CallError> {
    let inner = strip_parens(raw.trim())?;

    let mut target_parts = Vec::new();
    let mut input_redirect = None;
    let mut output_capture = None;
    let mut params = Vec::new();

    for token in tokenize(inner)? {
        if let Some(rest) = token.strip_prefix('<') {
            let stream = Stream::parse(rest).ok_or(CallError::EmptyRedirect('<'))?;
            if input_redirect.replace(stream).is_some() {
                return Err(CallError::DuplicateRedirect('<'));
            }
        } else if let Some(rest) = token.strip_prefix('>') {
            let stream = Stream::parse(rest).ok_or(CallError::EmptyRedirect('>'))?;
            if output_capture.replace(stream).is_some() {
                return Err(CallError::DuplicateRedirect('>'));
            }
        } else if let Some(param) = parse_param(&token) {
            params.push(param);
        } else {
            target_parts.push(token);
        }
    }

    if target_parts.is_empty() {
        return Err(CallError::MissingTarget);
    }

    Ok(CallBinding {
        target_name: target_parts.join(" "),
        input_redirect,
        output_capture,
        params,
    })
}

/// Return the text between the outer parentheses, which must enclose the whole call.
fn strip_parens(raw: &str) -> Result<&str, CallError> {
    if !raw.starts_with('(') {
        return Err(CallError::MissingOpenParen);
    }

    let mut depth = 0usize;
    let mut in_quote = false;
    for (pos, ch) in raw.char_indices() {
        match ch {
            '"' => in_quote = !in_quote,
            '(' if !in_quote => depth += 1,
            ')' if !in_quote => {
                depth -= 1;
                if depth == 0 {
                    let rest = &raw[pos + 1..];
                    if !rest.is_empty() {
                        return Err(CallError::TrailingText(rest.to_string()));
                    }
                    return Ok(&raw[1..pos]);
                }
            }
            _ => {}
        }
    }

    if in_quote {
        Err(CallError::UnterminatedQuote)
    } else {
        Err(CallError::MissingCloseParen)
    }
}

/// Split on whitespace outside quotes and nested parentheses. Quote characters are dropped.
fn tokenize(inner: &str) -> Result<Vec<String>, CallError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quote = false;
    let mut depth = 0usize;

    for ch in inner.chars() {
        match ch {
            '"' => in_quote = !in_quote,
            '(' if !in_quote => {
                depth += 1;
                current.push(ch);
            }
            ')' if !in_quote => {
                depth = depth.saturating_sub(1);
                current.push(ch);
            }
            c if c.is_whitespace() && !in_quote && depth == 0 => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }

    if in_quote {
        return Err(CallError::UnterminatedQuote);
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    Ok(tokens)
}

fn parse_param(token: &str) -> Option<ParamBinding> {
    let (key, value) = token.split_once('=')?;
    let (name, invocation) = match key.split_once(':') {
        Some((name, code)) if !code.is_empty() && code.chars().all(|c| c.is_ascii_alphabetic()) => {
            (name, Some(code.to_string()))
        }
        Some(_) => return None,
        None => (key, None),
    };
    if !is_identifier(name) {
        return None;
    }
    Some(ParamBinding {
        name: name.to_string(),
        invocation,
        value: value.to_string(),
    })
}

/// A shell variable name: `[A-Za-z_][A-Za-z0-9_]*`.
pub fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifiers() {
        assert!(is_identifier("FRUIT_1"));
        assert!(is_identifier("_x"));
        assert!(!is_identifier("1x"));
        assert!(!is_identifier(""));
        assert!(!is_identifier("a-b"));
    }

    #[test]
    fn nested_parens_stay_in_one_token() {
        let tokens = tokenize("list DIR:c=$(pwd -P) <$x").unwrap();
        assert_eq!(tokens, vec!["list", "DIR:c=$(pwd -P)", "<$x"]);
    }

    #[test]
    fn param_requires_identifier() {
        assert!(parse_param("a-b=1").is_none());
        assert!(parse_param("NAME:1=x").is_none());
        assert_eq!(
            parse_param("NAME:ce=ls").unwrap().invocation.as_deref(),
            Some("ce")
        );
    }
}
