//! Intermediate representation for compiled `.olova` components.
//!
//! A [`ComponentModule`] is the single serializable artifact produced by the
//! compiler. Both the generated JavaScript module text and the runtime
//! [`ComponentDescriptor`](crate::descriptor::ComponentDescriptor) are
//! derived from it.

#[cfg(feature = "napi")]
use napi_derive::napi;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ═══════════════════════════════════════════════════════════════════════════════
// ERROR CODES
// ═══════════════════════════════════════════════════════════════════════════════

pub const ERR_BLOCK_REPEATED: &str = "OLV001";
pub const ERR_BLOCK_UNTERMINATED: &str = "OLV002";
pub const ERR_SCRIPT_SYNTAX: &str = "OLV003";
pub const ERR_STYLE_SYNTAX: &str = "OLV004";
pub const ERR_PROPS_LITERAL: &str = "OLV005";

fn describe_code(code: &str) -> &'static str {
    match code {
        ERR_BLOCK_REPEATED => "A component may contain at most one <script> and one <style> block.",
        ERR_BLOCK_UNTERMINATED => "Every <script> and <style> block must be closed.",
        ERR_SCRIPT_SYNTAX => "The <script> block must be valid JavaScript.",
        ERR_STYLE_SYNTAX => "The <style> block must contain balanced CSS rules.",
        ERR_PROPS_LITERAL => "props: [...] must list string literals only.",
        _ => "Unknown error.",
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// COMPILER ERROR
// ═══════════════════════════════════════════════════════════════════════════════

/// A compile failure. The component degrades to a fallback module carrying
/// the message.
#[derive(Debug, Clone, PartialEq, Error, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
#[error("[{code}] {message} ({file}:{line}:{column})")]
pub struct CompilerError {
    pub code: String,
    pub message: String,
    pub rule: String,
    pub file: String,
    pub line: u32,
    pub column: u32,
}

impl CompilerError {
    pub fn new(code: &str, message: &str, file: &str, line: u32, column: u32) -> Self {
        CompilerError {
            code: code.to_string(),
            message: message.to_string(),
            rule: describe_code(code).to_string(),
            file: file.to_string(),
            line,
            column,
        }
    }

    /// Builds an error positioned at a byte offset inside `source`.
    pub fn at_offset(code: &str, message: &str, file: &str, source: &str, offset: usize) -> Self {
        let (line, column) = line_column(source, offset);
        Self::new(code, message, file, line, column)
    }
}

/// 1-based line and column of a byte offset.
pub fn line_column(source: &str, offset: usize) -> (u32, u32) {
    let offset = offset.min(source.len());
    let before = &source[..offset];
    let line = before.matches('\n').count() as u32 + 1;
    let column = match before.rfind('\n') {
        Some(nl) => before[nl + 1..].chars().count() as u32 + 1,
        None => before.chars().count() as u32 + 1,
    };
    (line, column)
}

// ═══════════════════════════════════════════════════════════════════════════════
// IR TYPES
// ═══════════════════════════════════════════════════════════════════════════════

/// A top-level `let`/`const` binding that becomes a reactive data field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct DataField {
    pub name: String,
    /// Initializer source text, `undefined` when the declaration had none.
    pub init: String,
}

/// A top-level function declaration that becomes a component method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct MethodIR {
    pub name: String,
    pub params: Vec<String>,
    pub params_raw: String,
    pub body: String,
    /// Body with bare data/prop references rewritten to `this.<name>`.
    pub qualified_body: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ImportIR {
    pub statement: String,
    pub source: String,
    pub specifiers: Vec<String>,
    pub is_component: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ComponentRef {
    /// Kebab-case tag used in the compiled template.
    pub tag: String,
    /// Identifier the component was imported as.
    pub name: String,
    pub source: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct StyleIR {
    pub raw: String,
    pub css: String,
    pub scoped: bool,
    pub scope_id: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "napi", napi(object))]
#[serde(rename_all = "camelCase")]
pub struct ComponentModule {
    pub file_path: String,
    pub template: String,
    pub props: Vec<String>,
    pub data: Vec<DataField>,
    pub methods: Vec<MethodIR>,
    pub imports: Vec<ImportIR>,
    pub components: Vec<ComponentRef>,
    pub style: Option<StyleIR>,
    /// Set when the module is a fallback produced from a compile failure.
    pub error: Option<String>,
}

impl ComponentModule {
    pub fn is_fallback(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_line_column() {
        let src = "a\nbc\nd";
        assert_eq!(line_column(src, 0), (1, 1));
        assert_eq!(line_column(src, 3), (2, 2));
        assert_eq!(line_column(src, 5), (3, 1));
        assert_eq!(line_column(src, 500), (3, 2));
    }

    #[test]
    fn test_compiler_error_display() {
        let err = CompilerError::at_offset(ERR_SCRIPT_SYNTAX, "oops", "App.olova", "x\ny", 2);
        assert_eq!(err.line, 2);
        assert_eq!(err.to_string(), "[OLV003] oops (App.olova:2:1)");
        assert!(err.rule.contains("valid JavaScript"));
    }
}
