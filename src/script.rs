//! Script analysis for `<script>` blocks.
//!
//! The script is parsed with oxc and its top level is classified:
//! - `import` declarations are collected (and dropped from the component body);
//!   default/named bindings imported from component files become child
//!   component candidates
//! - a `props: [...]` labelled statement declares the prop list
//! - `let`/`const` declarations become data fields
//! - function declarations become methods, with bare data/prop references
//!   qualified to `this.<name>`

use oxc_allocator::Allocator;
use oxc_ast::ast::{
    ArrayExpressionElement, BindingPattern, Expression, ImportDeclarationSpecifier, Statement,
    VariableDeclarationKind,
};
use oxc_parser::Parser;
use oxc_span::{GetSpan, SourceType};
use std::collections::HashSet;

use crate::ir::{
    CompilerError, DataField, ImportIR, MethodIR, ERR_PROPS_LITERAL, ERR_SCRIPT_SYNTAX,
};
use crate::renamer::{apply_replacements, InstanceQualifier};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScriptAnalysis {
    pub imports: Vec<ImportIR>,
    pub props: Vec<String>,
    pub data: Vec<DataField>,
    pub methods: Vec<MethodIR>,
}

impl ScriptAnalysis {
    /// Local names imported from component files, in import order.
    pub fn component_names(&self) -> Vec<String> {
        self.imports
            .iter()
            .filter(|import| import.is_component)
            .flat_map(|import| import.specifiers.iter().cloned())
            .collect()
    }
}

/// Analyzes a script block. `offset` is the script's byte offset in the
/// component source, used for error positions.
pub fn analyze_script(
    script: &str,
    file_path: &str,
    extension: &str,
    source: &str,
    offset: usize,
) -> Result<ScriptAnalysis, CompilerError> {
    let allocator = Allocator::default();
    let source_type = SourceType::default().with_module(true);
    let ret = Parser::new(&allocator, script, source_type).parse();

    if let Some(err) = ret.errors.first() {
        return Err(CompilerError::at_offset(
            ERR_SCRIPT_SYNTAX,
            &format!("script parse error: {}", err),
            file_path,
            source,
            offset,
        ));
    }

    let program = ret.program;
    let mut analysis = ScriptAnalysis::default();

    // Pass 1: imports, props, data, and the function declarations to process.
    let mut functions = Vec::new();
    for stmt in program.body.iter() {
        match stmt {
            Statement::ImportDeclaration(decl) => {
                let source_path = decl.source.value.to_string();
                let mut specifiers = Vec::new();
                if let Some(specs) = &decl.specifiers {
                    for spec in specs.iter() {
                        let local = match spec {
                            ImportDeclarationSpecifier::ImportSpecifier(s) => &s.local,
                            ImportDeclarationSpecifier::ImportDefaultSpecifier(s) => &s.local,
                            ImportDeclarationSpecifier::ImportNamespaceSpecifier(s) => &s.local,
                        };
                        specifiers.push(local.name.to_string());
                    }
                }
                analysis.imports.push(ImportIR {
                    statement: span_text(script, decl.span.start, decl.span.end).to_string(),
                    is_component: source_path.ends_with(extension),
                    source: source_path,
                    specifiers,
                });
            }
            Statement::LabeledStatement(labeled) if labeled.label.name.as_str() == "props" => {
                let Statement::ExpressionStatement(expr_stmt) = &labeled.body else {
                    continue;
                };
                let Expression::ArrayExpression(array) = &expr_stmt.expression else {
                    continue;
                };
                for element in array.elements.iter() {
                    match element_string(element) {
                        Some(name) => {
                            if !analysis.props.contains(&name) {
                                analysis.props.push(name);
                            }
                        }
                        None => {
                            return Err(CompilerError::at_offset(
                                ERR_PROPS_LITERAL,
                                "props must be string literals",
                                file_path,
                                source,
                                offset + element.span().start as usize,
                            ));
                        }
                    }
                }
            }
            Statement::VariableDeclaration(var_decl)
                if var_decl.kind != VariableDeclarationKind::Var =>
            {
                for decl in var_decl.declarations.iter() {
                    let BindingPattern::BindingIdentifier(id) = &decl.id else {
                        continue;
                    };
                    let init = decl
                        .init
                        .as_ref()
                        .map(|init| {
                            let span = init.span();
                            span_text(script, span.start, span.end).trim().to_string()
                        })
                        .unwrap_or_else(|| "undefined".to_string());
                    analysis.data.push(DataField {
                        name: id.name.to_string(),
                        init,
                    });
                }
            }
            Statement::FunctionDeclaration(func) => functions.push(func),
            _ => {}
        }
    }

    // Props win over same-named data declarations.
    let props = &analysis.props;
    analysis.data.retain(|field| !props.contains(&field.name));

    let instance_names: HashSet<String> = analysis
        .data
        .iter()
        .map(|field| field.name.clone())
        .chain(analysis.props.iter().cloned())
        .collect();

    // Pass 2: methods.
    for func in functions {
        let Some(id) = &func.id else { continue };
        let Some(body) = &func.body else { continue };

        let mut params = Vec::new();
        for param in func.params.items.iter() {
            if let BindingPattern::BindingIdentifier(p) = &param.pattern {
                params.push(p.name.to_string());
            }
        }
        let params_raw = strip_delimiters(
            span_text(script, func.params.span.start, func.params.span.end),
            '(',
            ')',
        );

        let mut qualifier = InstanceQualifier::new(&instance_names);
        qualifier.qualify_function(func);
        let (body_start, body_end) = inner_span(script, body.span.start, body.span.end);
        let qualified_body =
            apply_replacements(script, body_start, body_end, qualifier.replacements);

        analysis.methods.push(MethodIR {
            name: id.name.to_string(),
            params,
            params_raw,
            body: span_text(script, body_start, body_end).trim().to_string(),
            qualified_body: qualified_body.trim().to_string(),
        });
    }

    Ok(analysis)
}

fn element_string(element: &ArrayExpressionElement) -> Option<String> {
    match element.as_expression()? {
        Expression::StringLiteral(lit) => Some(lit.value.to_string()),
        Expression::TemplateLiteral(tpl) if tpl.expressions.is_empty() => tpl
            .quasis
            .first()
            .map(|quasi| quasi.value.raw.to_string()),
        _ => None,
    }
}

fn span_text(script: &str, start: u32, end: u32) -> &str {
    &script[start as usize..end as usize]
}

fn strip_delimiters(text: &str, open: char, close: char) -> String {
    let trimmed = text.trim();
    let inner = trimmed.strip_prefix(open).unwrap_or(trimmed);
    let inner = inner.strip_suffix(close).unwrap_or(inner);
    inner.trim().to_string()
}

/// Span of a `{ ... }` body without its braces.
fn inner_span(script: &str, start: u32, end: u32) -> (u32, u32) {
    let text = span_text(script, start, end);
    let open = if text.starts_with('{') { 1 } else { 0 };
    let close = if text.len() > open as usize && text.ends_with('}') {
        1
    } else {
        0
    };
    (start + open, end - close)
}
