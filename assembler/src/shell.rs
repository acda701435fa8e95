//! Small helpers for producing shell source text.

/// Backslash-escape every character that is special to the shell, the way
/// Ruby's `Shellwords.escape` does. Newlines become `'\n'`.
pub fn shell_escape(value: &str) -> String {
    if value.is_empty() {
        return "''".to_string();
    }

    let mut escaped = String::with_capacity(value.len() * 2);
    for ch in value.chars() {
        match ch {
            '\n' => escaped.push_str("'\n'"),
            c if c.is_ascii_alphanumeric() || "_-.,:+/@".contains(c) => escaped.push(c),
            c => {
                escaped.push('\\');
                escaped.push(c);
            }
        }
    }
    escaped
}

/// Quote a file name for use after a redirection operator.
pub fn single_quote(value: &str) -> String {
    format!("'{}'", value.replace('\'', r"'\''"))
}

/// A shell function name for a block: bracket/paren forms stripped and
/// everything outside `[A-Za-z0-9_]` mapped to `_`.
pub fn function_name(block_name: &str) -> String {
    let stripped = mdx::block::strip_name_form(block_name);
    let mut name: String = stripped
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect();
    if name.is_empty() || name.starts_with(|c: char| c.is_ascii_digit()) {
        name.insert(0, '_');
    }
    name
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escape_matches_shellwords() {
        assert_eq!(shell_escape("hello world"), r"hello\ world");
        assert_eq!(shell_escape(""), "''");
        assert_eq!(shell_escape("a/b-c_d.e,f:g+h@i"), "a/b-c_d.e,f:g+h@i");
        assert_eq!(shell_escape("$HOME"), r"\$HOME");
        assert_eq!(shell_escape("it's"), r"it\'s");
        assert_eq!(shell_escape("a\nb"), "a'\n'b");
        assert_eq!(shell_escape("café"), r"caf\é");
    }

    #[test]
    fn quoting_file_names() {
        assert_eq!(single_quote("fruit.yml"), "'fruit.yml'");
        assert_eq!(single_quote("it's"), r"'it'\''s'");
    }

    #[test]
    fn function_names() {
        assert_eq!(function_name("summarize_fruits"), "summarize_fruits");
        assert_eq!(function_name("(fruit.yml)"), "fruit_yml");
        assert_eq!(function_name("make report"), "make_report");
        assert_eq!(function_name("1st"), "_1st");
        assert_eq!(function_name("()"), "_");
    }
}
