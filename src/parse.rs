//! Parse Module for the olova compiler
//!
//! Splits an `.olova` source document into its script, style and template
//! segments and performs the textual template rewrites that happen before
//! code generation: component tag renaming, bind-shorthand normalization and
//! interpolation trimming.

use lazy_static::lazy_static;
use regex::{Captures, Regex};
use std::collections::HashMap;

use crate::ir::{CompilerError, ERR_BLOCK_REPEATED, ERR_BLOCK_UNTERMINATED};

lazy_static! {
    static ref BLOCK_OPEN_RE: Regex = Regex::new(r"(?i)<(script|style)\b([^>]*)>").unwrap();
    static ref SCRIPT_CLOSE_RE: Regex = Regex::new(r"(?i)</script\s*>").unwrap();
    static ref STYLE_CLOSE_RE: Regex = Regex::new(r"(?i)</style\s*>").unwrap();
    static ref SCOPED_ATTR_RE: Regex = Regex::new(r"(?i)\bscoped\b").unwrap();
    static ref CLOSE_TAG_RE: Regex = Regex::new(r"</([A-Za-z][A-Za-z0-9_$-]*)\s*>").unwrap();
    static ref INTERPOLATION_RE: Regex = Regex::new(r"\{([^{}]*)\}").unwrap();
    static ref KEBAB_RE: Regex = Regex::new(r"([a-z0-9])([A-Z])").unwrap();
}

// ═══════════════════════════════════════════════════════════════════════════════
// BLOCK EXTRACTION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptBlock {
    pub content: String,
    /// Byte offset of `content` in the source document.
    pub offset: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StyleBlock {
    pub content: String,
    pub offset: usize,
    pub scoped: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct SfcBlocks {
    pub script: Option<ScriptBlock>,
    pub style: Option<StyleBlock>,
    pub template: String,
}

/// Splits a component source into at most one script block, at most one
/// style block, and the remaining template text (trimmed).
///
/// Block contents are skipped while scanning, so a `<style>` literal inside
/// a script string does not open a second block.
pub fn extract_blocks(source: &str, file_path: &str) -> Result<SfcBlocks, CompilerError> {
    let mut blocks = SfcBlocks::default();
    let mut removed: Vec<(usize, usize)> = Vec::new();
    let mut pos = 0;

    while let Some(caps) = BLOCK_OPEN_RE.captures_at(source, pos) {
        let Some(open) = caps.get(0) else { break };
        let kind = caps[1].to_ascii_lowercase();
        let attrs = caps.get(2).map_or("", |m| m.as_str());
        let close_re: &Regex = if kind == "script" {
            &*SCRIPT_CLOSE_RE
        } else {
            &*STYLE_CLOSE_RE
        };

        let close = close_re.find_at(source, open.end()).ok_or_else(|| {
            CompilerError::at_offset(
                ERR_BLOCK_UNTERMINATED,
                &format!("<{}> block is never closed", kind),
                file_path,
                source,
                open.start(),
            )
        })?;
        let content = source[open.end()..close.start()].to_string();

        if kind == "script" {
            if blocks.script.is_some() {
                return Err(repeated_block(&kind, file_path, source, open.start()));
            }
            blocks.script = Some(ScriptBlock {
                content,
                offset: open.end(),
            });
        } else {
            if blocks.style.is_some() {
                return Err(repeated_block(&kind, file_path, source, open.start()));
            }
            blocks.style = Some(StyleBlock {
                content,
                offset: open.end(),
                scoped: SCOPED_ATTR_RE.is_match(attrs),
            });
        }

        removed.push((open.start(), close.end()));
        pos = close.end();
    }

    let mut template = String::with_capacity(source.len());
    let mut last = 0;
    for (start, end) in removed {
        template.push_str(&source[last..start]);
        last = end;
    }
    template.push_str(&source[last..]);
    blocks.template = template.trim().to_string();

    Ok(blocks)
}

fn repeated_block(kind: &str, file_path: &str, source: &str, offset: usize) -> CompilerError {
    CompilerError::at_offset(
        ERR_BLOCK_REPEATED,
        &format!("multiple <{}> blocks are not supported", kind),
        file_path,
        source,
        offset,
    )
}

// ═══════════════════════════════════════════════════════════════════════════════
// OPEN TAG SCANNER
// ═══════════════════════════════════════════════════════════════════════════════

/// An opening tag found in template text.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OpenTag<'s> {
    pub name: &'s str,
    /// Raw text between the tag name and `>` (or `/>`), including leading space.
    pub attrs: &'s str,
    pub self_closing: bool,
}

/// Calls `f` for every opening tag in `src`; a returned string replaces the
/// whole tag text. Quoted attribute values and comments are respected.
pub fn rewrite_open_tags<F>(src: &str, mut f: F) -> String
where
    F: FnMut(&OpenTag) -> Option<String>,
{
    let bytes = src.as_bytes();
    let mut out = String::with_capacity(src.len());
    let mut last = 0;
    let mut i = 0;

    while i < bytes.len() {
        if bytes[i] != b'<' {
            i += 1;
            continue;
        }
        if src[i..].starts_with("<!--") {
            i = src[i + 4..]
                .find("-->")
                .map_or(bytes.len(), |p| i + 4 + p + 3);
            continue;
        }
        let name_start = i + 1;
        if !bytes.get(name_start).is_some_and(|b| b.is_ascii_alphabetic()) {
            i += 1;
            continue;
        }
        let mut name_end = name_start;
        while name_end < bytes.len()
            && (bytes[name_end].is_ascii_alphanumeric() || bytes[name_end] == b'-')
        {
            name_end += 1;
        }

        let mut k = name_end;
        let mut quote: Option<u8> = None;
        while k < bytes.len() {
            let b = bytes[k];
            match quote {
                Some(q) if b == q => quote = None,
                Some(_) => {}
                None if b == b'"' || b == b'\'' => quote = Some(b),
                None if b == b'>' => break,
                None => {}
            }
            k += 1;
        }
        if k >= bytes.len() {
            break;
        }

        let inner = &src[name_end..k];
        let (attrs, self_closing) = match inner.trim_end().strip_suffix('/') {
            Some(attrs) => (attrs, true),
            None => (inner, false),
        };
        let tag = OpenTag {
            name: &src[name_start..name_end],
            attrs,
            self_closing,
        };
        if let Some(replacement) = f(&tag) {
            out.push_str(&src[last..i]);
            out.push_str(&replacement);
            last = k + 1;
        }
        i = k + 1;
    }

    out.push_str(&src[last..]);
    out
}

// ═══════════════════════════════════════════════════════════════════════════════
// TEMPLATE REWRITES
// ═══════════════════════════════════════════════════════════════════════════════

/// `MyWidget` → `my-widget`
pub fn kebab_case(name: &str) -> String {
    KEBAB_RE.replace_all(name, "$1-$2").to_lowercase()
}

/// Rewrites `<Name .../>`, `<Name ...>` and `</Name>` for each imported
/// component to its kebab-case tag. Self-closing occurrences are expanded
/// into a paired tag.
pub fn rename_component_tags(template: &str, components: &[String]) -> String {
    if components.is_empty() {
        return template.to_string();
    }
    let tags: HashMap<&str, String> = components
        .iter()
        .map(|name| (name.as_str(), kebab_case(name)))
        .collect();

    let opened = rewrite_open_tags(template, |tag| {
        let kebab = tags.get(tag.name)?;
        let attrs = tag.attrs.trim_end();
        if tag.self_closing {
            Some(format!("<{}{}></{}>", kebab, attrs, kebab))
        } else {
            Some(format!("<{}{}>", kebab, attrs))
        }
    });

    CLOSE_TAG_RE
        .replace_all(&opened, |caps: &Captures| match tags.get(&caps[1]) {
            Some(kebab) => format!("</{}>", kebab),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Normalizes `:name="expr"` to `v-bind:name="expr"` inside opening tags.
pub fn normalize_bind_shorthand(template: &str) -> String {
    rewrite_open_tags(template, |tag| {
        let attrs = expand_shorthand_attrs(tag.attrs)?;
        let end = if tag.self_closing { "/>" } else { ">" };
        Some(format!("<{}{}{}", tag.name, attrs, end))
    })
}

fn expand_shorthand_attrs(attrs: &str) -> Option<String> {
    let bytes = attrs.as_bytes();
    let mut out = String::with_capacity(attrs.len() + 16);
    let mut quote: Option<u8> = None;
    let mut changed = false;
    let mut last = 0;

    for i in 0..bytes.len() {
        let b = bytes[i];
        match quote {
            Some(q) => {
                if b == q {
                    quote = None;
                }
            }
            None if b == b'"' || b == b'\'' => quote = Some(b),
            None if b.is_ascii_whitespace()
                && bytes.get(i + 1) == Some(&b':')
                && bytes
                    .get(i + 2)
                    .is_some_and(|c| c.is_ascii_alphanumeric() || *c == b'_' || *c == b'-') =>
            {
                out.push_str(&attrs[last..=i]);
                out.push_str("v-bind");
                last = i + 1;
                changed = true;
            }
            None => {}
        }
    }

    if !changed {
        return None;
    }
    out.push_str(&attrs[last..]);
    Some(out)
}

/// `{ msg }` → `{msg}`
pub fn trim_interpolations(template: &str) -> String {
    INTERPOLATION_RE
        .replace_all(template, |caps: &Captures| format!("{{{}}}", caps[1].trim()))
        .into_owned()
}
