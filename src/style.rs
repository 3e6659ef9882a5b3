//! Scoped style processing.
//!
//! A scoped `<style>` block is rewritten so that every selector carries an
//! attribute qualifier derived from the component's file path, and every
//! non-void element in the template is stamped with the same attribute.

use thiserror::Error;

use crate::parse::rewrite_open_tags;

/// Elements that never carry the scope attribute.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

/// At-rules whose block contains nested style rules.
const NESTING_AT_RULES: &[&str] = &["media", "supports", "container", "layer", "document"];

#[derive(Debug, Error, PartialEq)]
pub enum StyleError {
    #[error("unexpected '}}' at offset {0}")]
    UnexpectedClose(usize),
    #[error("unclosed '{{' opened at offset {0}")]
    Unclosed(usize),
    #[error("unterminated comment at offset {0}")]
    UnterminatedComment(usize),
}

impl StyleError {
    pub fn offset(&self) -> usize {
        match self {
            StyleError::UnexpectedClose(o)
            | StyleError::Unclosed(o)
            | StyleError::UnterminatedComment(o) => *o,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// SCOPE TOKEN
// ═══════════════════════════════════════════════════════════════════════════════

/// Stable short hex digest of a source path.
///
/// 32-bit rolling hash (`h * 31 + c`, wrapping) over the UTF-16 code units of
/// the path, absolute value rendered as lowercase hex, at most 8 digits.
pub fn scope_id(path: &str) -> String {
    let mut hash: i32 = 0;
    for unit in path.encode_utf16() {
        hash = (hash << 5).wrapping_sub(hash).wrapping_add(unit as i32);
    }
    let hex = format!("{:x}", (hash as i64).abs());
    hex.chars().take(8).collect()
}

/// Full attribute name, e.g. `data-v-1a2b3c`.
pub fn scope_attribute(prefix: &str, path: &str) -> String {
    format!("{}{}", prefix, scope_id(path))
}

// ═══════════════════════════════════════════════════════════════════════════════
// CSS SCOPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Rewrites every style rule in `css` so each selector carries `[attr]`.
pub fn scope_css(css: &str, attr: &str) -> Result<String, StyleError> {
    let mut out = String::with_capacity(css.len() + css.len() / 4);
    scope_rules(css, 0, attr, &mut out)?;
    Ok(out)
}

fn scope_rules(css: &str, base: usize, attr: &str, out: &mut String) -> Result<(), StyleError> {
    let bytes = css.as_bytes();
    let mut i = 0;
    let mut prelude_start = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                let end = comment_end(css, i).ok_or(StyleError::UnterminatedComment(base + i))?;
                if css[prelude_start..i].trim().is_empty() {
                    out.push_str(&css[prelude_start..end]);
                    prelude_start = end;
                }
                i = end;
            }
            b'"' | b'\'' => i = string_end(css, i),
            b';' => {
                out.push_str(&css[prelude_start..=i]);
                i += 1;
                prelude_start = i;
            }
            b'{' => {
                let close = block_end(css, i).ok_or(StyleError::Unclosed(base + i))?;
                let prelude = &css[prelude_start..i];
                let body = &css[i + 1..close];
                emit_rule(prelude, body, base + i + 1, attr, out)?;
                i = close + 1;
                prelude_start = i;
            }
            b'}' => return Err(StyleError::UnexpectedClose(base + i)),
            _ => i += 1,
        }
    }

    out.push_str(&css[prelude_start..]);
    Ok(())
}

fn emit_rule(
    prelude: &str,
    body: &str,
    body_offset: usize,
    attr: &str,
    out: &mut String,
) -> Result<(), StyleError> {
    let trimmed = prelude.trim_start();
    let leading = &prelude[..prelude.len() - trimmed.len()];
    out.push_str(leading);

    if let Some(at_rule) = trimmed.strip_prefix('@') {
        let name: String = at_rule
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || *c == '-')
            .collect();
        out.push_str(trimmed);
        out.push('{');
        if NESTING_AT_RULES.contains(&name.to_ascii_lowercase().as_str()) {
            scope_rules(body, body_offset, attr, out)?;
        } else {
            out.push_str(body);
        }
        out.push('}');
        return Ok(());
    }

    let scoped: Vec<String> = split_top_level(trimmed.trim_end(), b',')
        .into_iter()
        .map(|s| scope_selector(s.trim(), attr))
        .collect();
    out.push_str(&scoped.join(", "));
    out.push('{');
    out.push_str(body);
    out.push('}');
    Ok(())
}

/// Appends `[attr]` to the last compound selector, ahead of its pseudo part.
///
/// `h1` → `h1[a]`, `.x:hover` → `.x[a]:hover`, `nav a::before` → `nav a[a]::before`.
pub fn scope_selector(selector: &str, attr: &str) -> String {
    if selector.is_empty() {
        return selector.to_string();
    }
    let qualifier = format!("[{}]", attr);
    let bytes = selector.as_bytes();

    let mut compound_start = 0;
    let mut depth = 0i32;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(selector, i);
                continue;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b' ' | b'\t' | b'\n' | b'\r' | b'>' | b'+' | b'~' if depth == 0 => {
                compound_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }

    let mut insert_at = selector.len();
    let mut depth = 0i32;
    let mut j = compound_start;
    while j < bytes.len() {
        match bytes[j] {
            b'"' | b'\'' => {
                j = string_end(selector, j);
                continue;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            b':' if depth == 0 => {
                insert_at = j;
                break;
            }
            _ => {}
        }
        j += 1;
    }

    let mut scoped = String::with_capacity(selector.len() + qualifier.len());
    scoped.push_str(&selector[..insert_at]);
    scoped.push_str(&qualifier);
    scoped.push_str(&selector[insert_at..]);
    scoped
}

fn split_top_level(s: &str, sep: u8) -> Vec<&str> {
    let bytes = s.as_bytes();
    let mut parts = Vec::new();
    let mut depth = 0i32;
    let mut start = 0;
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(s, i);
                continue;
            }
            b'(' | b'[' => depth += 1,
            b')' | b']' => depth -= 1,
            c if c == sep && depth == 0 => {
                parts.push(&s[start..i]);
                start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    parts.push(&s[start..]);
    parts
}

/// Index just past the closing quote of the string starting at `start`.
fn string_end(s: &str, start: usize) -> usize {
    let bytes = s.as_bytes();
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

fn comment_end(s: &str, start: usize) -> Option<usize> {
    s[start + 2..].find("*/").map(|p| start + 2 + p + 2)
}

/// Index of the `}` matching the `{` at `open`.
fn block_end(s: &str, open: usize) -> Option<usize> {
    let bytes = s.as_bytes();
    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'"' | b'\'' => {
                i = string_end(s, i);
                continue;
            }
            b'/' if bytes.get(i + 1) == Some(&b'*') => {
                i = comment_end(s, i)?;
                continue;
            }
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE SCOPING
// ═══════════════════════════════════════════════════════════════════════════════

/// Adds `attr` to every non-void opening tag in `template`.
pub fn scope_template(template: &str, attr: &str) -> String {
    rewrite_open_tags(template, |tag| {
        if VOID_ELEMENTS.contains(&tag.name.to_ascii_lowercase().as_str()) {
            return None;
        }
        let close = if tag.self_closing { " />" } else { ">" };
        Some(format!("<{}{} {}{}", tag.name, tag.attrs.trim_end(), attr, close))
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scope_id_matches_rolling_hash() {
        // "a" = 97 → 0x61
        assert_eq!(scope_id("a"), "61");
        // "ab" = 97 * 31 + 98 = 3105 → 0xc21
        assert_eq!(scope_id("ab"), "c21");
        assert_eq!(scope_id(""), "0");
        let long = scope_id("/home/user/project/src/components/Counter.olova");
        assert!(long.len() <= 8);
        assert_eq!(long, scope_id("/home/user/project/src/components/Counter.olova"));
    }

    #[test]
    fn test_scope_id_negative_hash_is_absolute() {
        let id = scope_id("zzzzzzzzzzzzzzzz");
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));
        assert!(!id.starts_with('-'));
    }

    #[test]
    fn test_scope_selector_list_with_pseudo() {
        let css = "h1, .x:hover {color: red;}";
        let out = scope_css(css, "data-v-abc123").unwrap();
        assert_eq!(out, "h1[data-v-abc123], .x[data-v-abc123]:hover{color: red;}");
    }

    #[test]
    fn test_scope_selector_descendant_and_pseudo_element() {
        assert_eq!(scope_selector("nav a::before", "s"), "nav a[s]::before");
        assert_eq!(scope_selector("ul > li", "s"), "ul > li[s]");
        assert_eq!(scope_selector("a:not(.b, .c)", "s"), "a[s]:not(.b, .c)");
        assert_eq!(scope_selector("input[type=\"a:b\"]", "s"), "input[type=\"a:b\"][s]");
    }

    #[test]
    fn test_scope_media_and_keyframes() {
        let css = "@media (max-width: 600px) { p { margin: 0 } }\n@keyframes spin { from { opacity: 0 } to { opacity: 1 } }";
        let out = scope_css(css, "s").unwrap();
        assert!(out.contains("p[s]{ margin: 0 }"));
        assert!(out.contains("@keyframes spin { from { opacity: 0 } to { opacity: 1 } }"));
    }

    #[test]
    fn test_scope_keeps_comments_and_imports() {
        let css = "@import url(\"x.css\");\n/* title */\nh1 { color: blue }";
        let out = scope_css(css, "s").unwrap();
        assert!(out.starts_with("@import url(\"x.css\");"));
        assert!(out.contains("/* title */"));
        assert!(out.contains("h1[s]{ color: blue }"));
    }

    #[test]
    fn test_unbalanced_css_is_error() {
        assert!(matches!(scope_css("h1 { color: red", "s"), Err(StyleError::Unclosed(3))));
        assert!(matches!(scope_css("h1 } ", "s"), Err(StyleError::UnexpectedClose(3))));
    }

    #[test]
    fn test_scope_template_skips_void_elements() {
        let out = scope_template("<div class=\"a\"><img src=\"x.png\"><br/><span>hi</span></div>", "data-v-1");
        assert_eq!(
            out,
            "<div class=\"a\" data-v-1><img src=\"x.png\"><br/><span data-v-1>hi</span></div>"
        );
    }
}
