//! Tokenizer for IJVM assembly text.

use crate::error::AsmError;

/// A single token from an assembly line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    /// `name:` at the start of a line.
    Label(String),
    /// `.name`, lowercased, without the dot.
    Directive(String),
    /// A mnemonic, constant name or label reference, as written.
    Ident(String),
    /// A numeric literal (decimal or hex, optionally negative).
    Number(i64),
}

/// Tokenize a single line of assembly text.
///
/// Returns an empty Vec for blank lines and comment-only lines.
/// Comments start with `;` and extend to end of line.
pub(crate) fn tokenize_line(line: &str, line_num: usize) -> Result<Vec<Token>, AsmError> {
    // Strip comment
    let line = match line.find(';') {
        Some(pos) => &line[..pos],
        None => line,
    };

    let mut tokens = Vec::new();
    for word in line.split_whitespace() {
        let token = if let Some(name) = word.strip_suffix(':').filter(|_| tokens.is_empty()) {
            Token::Label(name.to_string())
        } else if let Some(name) = word.strip_prefix('.') {
            Token::Directive(name.to_lowercase())
        } else if looks_numeric(word) {
            Token::Number(parse_number(word).ok_or_else(|| AsmError::InvalidNumber {
                line: line_num,
                token: word.to_string(),
            })?)
        } else {
            Token::Ident(word.to_string())
        };
        tokens.push(token);
    }

    Ok(tokens)
}

fn looks_numeric(word: &str) -> bool {
    let digits = word.strip_prefix('-').unwrap_or(word);
    digits.as_bytes().first().is_some_and(|b| b.is_ascii_digit())
}

fn parse_number(word: &str) -> Option<i64> {
    let (negative, digits) = match word.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, word),
    };
    let magnitude = match digits
        .strip_prefix("0x")
        .or_else(|| digits.strip_prefix("0X"))
    {
        Some(hex) => i64::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<i64>().ok()?,
    };
    Some(if negative { -magnitude } else { magnitude })
}
