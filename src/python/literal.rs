//! Literal string extraction
//!
//! A Python string literal shows up in the tree in several shapes: a plain
//! `string`, an implicit concatenation of adjacent strings, or either of those
//! wrapped in parentheses. All callers go through [`string_literal`] so the
//! shape handling lives in one place.

use tree_sitter::Node;

/// Value of a literal string expression.
///
/// Returns `None` for anything whose value is not known statically: names,
/// calls, f-strings, byte strings, `%`/`+` expressions.
pub fn string_literal(node: Node<'_>, source: &str) -> Option<String> {
    match node.kind() {
        "string" => decode_string_token(&source[node.start_byte()..node.end_byte()]),
        "concatenated_string" => {
            let mut value = String::new();
            let mut cursor = node.walk();
            for part in node.named_children(&mut cursor) {
                match part.kind() {
                    "comment" => {}
                    "string" => {
                        value.push_str(&decode_string_token(
                            &source[part.start_byte()..part.end_byte()],
                        )?);
                    }
                    _ => return None,
                }
            }
            Some(value)
        }
        "parenthesized_expression" => {
            let mut cursor = node.walk();
            let inner: Vec<Node<'_>> = node
                .named_children(&mut cursor)
                .filter(|child| child.kind() != "comment")
                .collect();
            match inner.as_slice() {
                [single] => string_literal(*single, source),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Decode one string token including its prefix and quotes
fn decode_string_token(token: &str) -> Option<String> {
    let quote_start = token.find(['\'', '"'])?;
    let prefix = token[..quote_start].to_ascii_lowercase();
    // f-strings and t-strings are evaluated at runtime, bytes are not text
    if prefix.contains(['f', 'b', 't']) {
        return None;
    }
    let raw = prefix.contains('r');

    let quoted = &token[quote_start..];
    let quote_len = if quoted.starts_with("\"\"\"") || quoted.starts_with("'''") {
        3
    } else {
        1
    };
    if quoted.len() < quote_len * 2 {
        return None;
    }
    let body = &quoted[quote_len..quoted.len() - quote_len];

    if raw {
        Some(body.to_string())
    } else {
        Some(unescape(body))
    }
}

/// Apply Python backslash escapes. Unknown escapes are kept verbatim.
fn unescape(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut chars = body.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some(next) = chars.next() else {
            out.push('\\');
            break;
        };
        match next {
            '\n' => {}
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
            }
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'v' => out.push('\x0b'),
            '0'..='7' => {
                let mut digits = String::from(next);
                while digits.len() < 3 {
                    match chars.peek() {
                        Some(d @ '0'..='7') => {
                            digits.push(*d);
                            chars.next();
                        }
                        _ => break,
                    }
                }
                match u32::from_str_radix(&digits, 8).ok().and_then(char::from_u32) {
                    Some(decoded) => out.push(decoded),
                    None => {
                        out.push('\\');
                        out.push_str(&digits);
                    }
                }
            }
            'x' | 'u' | 'U' => {
                let width = match next {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let digits: String = chars.clone().take(width).collect();
                let decoded = if digits.len() == width
                    && digits.chars().all(|d| d.is_ascii_hexdigit())
                {
                    u32::from_str_radix(&digits, 16).ok().and_then(char::from_u32)
                } else {
                    None
                };
                match decoded {
                    Some(decoded) => {
                        out.push(decoded);
                        for _ in 0..width {
                            chars.next();
                        }
                    }
                    None => {
                        out.push('\\');
                        out.push(next);
                    }
                }
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    out
}
