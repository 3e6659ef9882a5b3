//! Instance qualification of method bodies.
//!
//! Inside a component method, bare references to data fields and props are
//! rewritten to `this.<name>`. Property names are never touched, and a name
//! that the function binds itself (parameter, local, inner function) is left
//! alone everywhere in that function.

use oxc_ast::ast::{BindingIdentifier, Expression, Function, IdentifierReference, ObjectProperty};
use oxc_ast_visit::{walk, Visit};
use std::collections::HashSet;

/// Collects every name bound inside a function: parameters, locals and
/// nested declarations.
#[derive(Default)]
pub struct BindingCollector {
    pub names: HashSet<String>,
}

impl<'a> Visit<'a> for BindingCollector {
    fn visit_binding_identifier(&mut self, ident: &BindingIdentifier<'a>) {
        self.names.insert(ident.name.to_string());
    }
}

/// Produces `(start, end, replacement)` edits in script coordinates.
pub struct InstanceQualifier<'n> {
    instance_names: &'n HashSet<String>,
    shadowed: HashSet<String>,
    pub replacements: Vec<(u32, u32, String)>,
}

impl<'n> InstanceQualifier<'n> {
    pub fn new(instance_names: &'n HashSet<String>) -> Self {
        InstanceQualifier {
            instance_names,
            shadowed: HashSet::new(),
            replacements: Vec::new(),
        }
    }

    fn qualifies(&self, name: &str) -> bool {
        self.instance_names.contains(name) && !self.shadowed.contains(name)
    }

    /// Collects edits for the parameters and body of `func`.
    pub fn qualify_function<'a>(&mut self, func: &Function<'a>) {
        let mut collector = BindingCollector::default();
        collector.visit_formal_parameters(&func.params);
        if let Some(body) = &func.body {
            collector.visit_function_body(body);
        }
        self.shadowed = collector.names;

        // Default parameter values may reference instance state too.
        self.visit_formal_parameters(&func.params);
        if let Some(body) = &func.body {
            self.visit_function_body(body);
        }
    }
}

impl<'a, 'n> Visit<'a> for InstanceQualifier<'n> {
    fn visit_identifier_reference(&mut self, ident: &IdentifierReference<'a>) {
        let name = ident.name.as_str();
        if self.qualifies(name) {
            self.replacements
                .push((ident.span.start, ident.span.end, format!("this.{}", name)));
        }
    }

    fn visit_object_property(&mut self, prop: &ObjectProperty<'a>) {
        if prop.shorthand {
            if let Expression::Identifier(ident) = &prop.value {
                let name = ident.name.as_str();
                if self.qualifies(name) {
                    self.replacements.push((
                        ident.span.start,
                        ident.span.end,
                        format!("{}: this.{}", name, name),
                    ));
                }
                return;
            }
        }
        walk::walk_object_property(self, prop);
    }
}

/// Applies edits to the `[start, end)` slice of `source`.
pub fn apply_replacements(
    source: &str,
    start: u32,
    end: u32,
    mut replacements: Vec<(u32, u32, String)>,
) -> String {
    let mut result = source[start as usize..end as usize].to_string();
    replacements.retain(|(s, e, _)| *s >= start && *e <= end);
    replacements.sort_by(|a, b| b.0.cmp(&a.0));
    replacements.dedup_by(|a, b| a.0 == b.0);
    for (s, e, text) in replacements {
        result.replace_range(((s - start) as usize)..((e - start) as usize), &text);
    }
    result
}
