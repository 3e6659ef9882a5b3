//! Template rendering.
//!
//! `ComponentInstance::render` turns the descriptor's template into a fresh
//! detached subtree:
//!
//! 1. parse the template as a body fragment
//! 2. pick (or create) the single root and tag it with the instance id
//! 3. split `{key}` interpolations into live text nodes
//! 4. install `onclick` handlers
//! 5. resolve `v-bind:attr` / `:attr` directives
//! 6. instantiate child components in place of their placeholder tags
//!
//! Every render first drops the bindings, listeners and children of the
//! previous render. Failures never escape: a broken instance renders as an
//! inline error element, a broken child as an error element in place of its
//! placeholder.

use std::rc::Rc;
use thiserror::Error;
use tracing::{debug, error, warn};

use crate::compile::ERROR_BANNER_STYLE;
use crate::document::{
    append_child, attributes, create_element, create_text, descendants, get_attribute,
    is_element, is_text, parent_of, parse_fragment_nodes, remove_attribute, replace_with,
    set_attribute, tag_name, text_content, Handle,
};
use crate::eval::{EvalError, Interpreter, Scope, Value};
use crate::expr::{parse_expression, parse_program, Expr, Stmt};
use crate::instance::{ComponentInstance, COMPONENT_ID_ATTR};
use crate::registry::{Listener, NodeBinding, PropBinding, Registry};

/// Component nesting allowed below the root instance.
pub const MAX_NESTING_DEPTH: usize = 32;

const BIND_PREFIX: &str = "v-bind:";

#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    #[error("component nesting exceeds {0} levels")]
    NestingTooDeep(usize),
    #[error("<{0}> is no longer attached to the template")]
    Detached(String),
}

/// Inline error element shown in place of a subtree that failed to render.
pub fn error_element(message: &str) -> Handle {
    let element = create_element("div");
    set_attribute(&element, "style", ERROR_BANNER_STYLE);
    append_child(&element, &create_text(message));
    element
}

// ═══════════════════════════════════════════════════════════════════════════════
// CLICK HANDLERS
// ═══════════════════════════════════════════════════════════════════════════════

/// A parsed `onclick` attribute.
#[derive(Debug, Clone, PartialEq)]
pub enum ClickHandler {
    /// `name` or `name(args…)` naming a declared method. Without arguments
    /// the method receives the event.
    Method { name: String, args: Option<Vec<Expr>> },
    /// Any other statement list, run with `event` bound.
    Script(Vec<Stmt>),
}

impl ClickHandler {
    pub fn parse(source: &str, instance: &ComponentInstance) -> Result<Self, crate::expr::ParseError> {
        let source = source.trim();
        if let Ok(expr) = parse_expression(source) {
            match &expr {
                Expr::Ident(name) if instance.has_method(name) => {
                    return Ok(ClickHandler::Method {
                        name: name.clone(),
                        args: None,
                    });
                }
                Expr::Call { callee, args } => {
                    if let Expr::Ident(name) = callee.as_ref() {
                        if instance.has_method(name) {
                            return Ok(ClickHandler::Method {
                                name: name.clone(),
                                args: Some(args.clone()),
                            });
                        }
                    }
                }
                // A bare name that is not a method is called like a function.
                Expr::Ident(_) => {
                    return Ok(ClickHandler::Script(vec![Stmt::Expr(Expr::Call {
                        callee: Box::new(expr.clone()),
                        args: vec![Expr::Ident("event".to_string())],
                    })]));
                }
                _ => {}
            }
        }
        parse_program(source).map(ClickHandler::Script)
    }

    pub fn run(&self, instance: &ComponentInstance, event: Value) -> Result<(), EvalError> {
        match self {
            ClickHandler::Method { name, args: None } => {
                instance.call_method(name, vec![event])?;
            }
            ClickHandler::Method {
                name,
                args: Some(args),
            } => {
                let mut interpreter =
                    Interpreter::with_locals(instance, vec![("event".to_string(), event)]);
                let values = args
                    .iter()
                    .map(|arg| interpreter.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                instance.call_method(name, values)?;
            }
            ClickHandler::Script(stmts) => {
                Interpreter::with_locals(instance, vec![("event".to_string(), event)])
                    .run(stmts)?;
            }
        }
        Ok(())
    }
}

fn click_event(target: &Handle) -> Value {
    Value::object([
        ("type", Value::from("click")),
        ("target", Value::from(tag_name(target).unwrap_or_default())),
    ])
}

/// Dispatches a click at `target`, bubbling to the document root. The path
/// and its listeners are collected before any handler runs; each listener
/// runs once and re-renders its instance on success. Returns the number of
/// handlers that ran, or the first handler error.
pub fn dispatch_click(registry: &Registry, target: &Handle) -> Result<usize, EvalError> {
    let mut path = vec![target.clone()];
    let mut current = parent_of(target);
    while let Some(node) = current {
        current = parent_of(&node);
        path.push(node);
    }
    let listeners: Vec<Listener> = path
        .iter()
        .flat_map(|node| registry.listeners_on(node))
        .collect();

    let event = click_event(target);
    let mut ran = 0;
    let mut first_error = None;
    for listener in listeners {
        let Some(instance) = registry.lookup_instance(&listener.instance) else {
            debug!(instance = %listener.instance, "listener owner was released");
            continue;
        };
        ran += 1;
        match listener.handler.run(&instance, event.clone()) {
            Ok(()) => instance.refresh(),
            Err(err) => {
                error!(instance = %instance.id(), error = %err, "click handler failed");
                first_error.get_or_insert(err);
            }
        }
    }
    match first_error {
        Some(err) => Err(err),
        None => Ok(ran),
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// RENDER PIPELINE
// ═══════════════════════════════════════════════════════════════════════════════

fn is_placeholder(instance: &ComponentInstance, node: &Handle) -> bool {
    tag_name(node).is_some_and(|tag| instance.descriptor().component(&tag).is_some())
}

fn is_raw_text_parent(node: &Handle) -> bool {
    parent_of(node)
        .and_then(|parent| tag_name(&parent))
        .is_some_and(|tag| tag == "script" || tag == "style")
}

fn is_within(node: &Handle, ancestor: &Handle) -> bool {
    let mut current = Some(node.clone());
    while let Some(next) = current {
        if Rc::ptr_eq(&next, ancestor) {
            return true;
        }
        current = parent_of(&next);
    }
    false
}

/// Splits text into literal runs and `{key}` references. An unterminated
/// `{` stays literal.
fn split_interpolations(text: &str) -> Vec<(bool, String)> {
    let mut parts = Vec::new();
    let mut rest = text;
    while let Some(open) = rest.find('{') {
        let Some(len) = rest[open + 1..].find('}') else {
            break;
        };
        if open > 0 {
            parts.push((false, rest[..open].to_string()));
        }
        parts.push((true, rest[open + 1..open + 1 + len].trim().to_string()));
        rest = &rest[open + 1 + len + 1..];
    }
    if !rest.is_empty() {
        parts.push((false, rest.to_string()));
    }
    parts
}

fn bind_target(attr: &str) -> Option<&str> {
    attr.strip_prefix(BIND_PREFIX)
        .or_else(|| attr.strip_prefix(':'))
        .filter(|name| !name.is_empty())
}

impl ComponentInstance {
    /// Builds a fresh subtree for the current data and records it as this
    /// instance's live root.
    pub fn render(&self) -> Handle {
        let registry = &self.context().registry;
        registry.reset(self.id());
        match self.render_template() {
            Ok(root) => root,
            Err(err) => {
                error!(instance = %self.id(), error = %err, "render failed");
                registry.reset(self.id());
                let element = error_element(&format!("Rendering error: {}", err));
                set_attribute(&element, COMPONENT_ID_ATTR, self.id());
                registry.set_root(self.id(), element.clone());
                element
            }
        }
    }

    fn render_template(&self) -> Result<Handle, RenderError> {
        if self.depth > MAX_NESTING_DEPTH {
            return Err(RenderError::NestingTooDeep(MAX_NESTING_DEPTH));
        }
        let nodes = parse_fragment_nodes(&self.descriptor().template);
        let root = self.select_root(nodes);
        set_attribute(&root, COMPONENT_ID_ATTR, self.id());
        self.context().registry.set_root(self.id(), root.clone());

        self.interpolate(&root);
        self.install_click_handlers(&root);
        self.resolve_bindings(&root);
        self.mount_children(&root);
        Ok(root)
    }

    /// Step 2. A lone element is the root; anything else is wrapped.
    fn select_root(&self, nodes: Vec<Handle>) -> Handle {
        let significant: Vec<&Handle> = nodes
            .iter()
            .filter(|node| is_element(node) || (is_text(node) && !text_content(node).trim().is_empty()))
            .collect();
        if let [single] = significant.as_slice() {
            if is_element(single) && !is_placeholder(self, single) {
                return (*single).clone();
            }
        }
        let wrapper = create_element("div");
        set_attribute(&wrapper, "style", "display: contents");
        for node in &nodes {
            append_child(&wrapper, node);
        }
        wrapper
    }

    /// Step 3.
    fn interpolate(&self, root: &Handle) {
        let registry = &self.context().registry;
        let text_nodes: Vec<Handle> = descendants(root)
            .into_iter()
            .filter(|node| is_text(node) && !is_raw_text_parent(node))
            .collect();

        for node in text_nodes {
            let text = text_content(&node);
            if !text.contains('{') {
                continue;
            }
            let parts = split_interpolations(&text);
            if parts.iter().all(|(is_key, _)| !is_key) {
                continue;
            }
            let mut replacements = Vec::with_capacity(parts.len());
            for (is_key, part) in parts {
                if !is_key {
                    replacements.push(create_text(&part));
                    continue;
                }
                if part.is_empty() {
                    continue;
                }
                let value = self.data().get(&part).unwrap_or_default();
                let live = create_text(&value.to_display_string());
                registry.bind_node(self.id(), &part, NodeBinding::Text(live.clone()));
                replacements.push(live);
            }
            replace_with(&node, &replacements);
        }
    }

    /// Step 4. The attribute itself stays in the markup.
    fn install_click_handlers(&self, root: &Handle) {
        let registry = &self.context().registry;
        let elements = std::iter::once(root.clone())
            .chain(descendants(root))
            .filter(|node| is_element(node) && !is_placeholder(self, node));
        for element in elements {
            let Some(source) = get_attribute(&element, "onclick") else {
                continue;
            };
            match ClickHandler::parse(&source, self) {
                Ok(handler) => registry.add_listener(
                    self.id(),
                    Listener {
                        element: Rc::downgrade(&element),
                        instance: self.id().to_string(),
                        handler: Rc::new(handler),
                    },
                ),
                Err(err) => {
                    warn!(instance = %self.id(), handler = %source, error = %err, "ignoring onclick handler")
                }
            }
        }
    }

    /// A directive value names a live key when the key holds a defined value.
    fn bound_value(&self, key: &str) -> Option<Value> {
        self.data().get(key).filter(|value| *value != Value::Undefined)
    }

    /// Step 5.
    fn resolve_bindings(&self, root: &Handle) {
        let registry = &self.context().registry;
        let elements = std::iter::once(root.clone())
            .chain(descendants(root))
            .filter(|node| is_element(node) && !is_placeholder(self, node));
        for element in elements {
            for (attr, value) in attributes(&element) {
                let Some(target) = bind_target(&attr) else {
                    continue;
                };
                remove_attribute(&element, &attr);
                let key = value.trim();
                match self.bound_value(key) {
                    Some(current) => {
                        set_attribute(&element, target, &current.to_js_string());
                        registry.bind_node(
                            self.id(),
                            key,
                            NodeBinding::Attribute {
                                element: element.clone(),
                                name: target.to_string(),
                            },
                        );
                    }
                    None => set_attribute(&element, target, &value),
                }
            }
        }
    }

    /// Step 6.
    fn mount_children(&self, root: &Handle) {
        let placeholders: Vec<Handle> = descendants(root)
            .into_iter()
            .filter(|node| is_placeholder(self, node))
            .collect();
        for placeholder in placeholders {
            // Placeholders nested in an already replaced one are gone.
            if !is_within(&placeholder, root) {
                continue;
            }
            if let Err(err) = self.mount_child(&placeholder) {
                let tag = tag_name(&placeholder).unwrap_or_default();
                error!(instance = %self.id(), component = %tag, error = %err, "child component failed");
                let element = error_element(&format!("Error rendering component: {}", err));
                replace_with(&placeholder, &[element]);
            }
        }
    }

    fn mount_child(&self, placeholder: &Handle) -> Result<(), RenderError> {
        let tag = tag_name(placeholder).unwrap_or_default();
        let Some(descriptor) = self.descriptor().component(&tag).cloned() else {
            return Err(RenderError::Detached(tag));
        };
        if self.depth + 1 > MAX_NESTING_DEPTH {
            return Err(RenderError::NestingTooDeep(MAX_NESTING_DEPTH));
        }

        let mut props: Vec<(String, Value)> = Vec::new();
        let mut bound: Vec<(String, String)> = Vec::new();
        for (attr, value) in attributes(placeholder) {
            if let Some(target) = bind_target(&attr) {
                let prop = descriptor.declared_prop(target).unwrap_or(target).to_string();
                let key = value.trim();
                match self.bound_value(key) {
                    Some(current) => {
                        props.push((prop.clone(), current));
                        bound.push((key.to_string(), prop));
                    }
                    None => props.push((prop, Value::String(value.clone()))),
                }
            } else if let Some(prop) = descriptor.declared_prop(&attr) {
                props.push((prop.to_string(), Value::String(value.clone())));
            }
        }

        let registry = &self.context().registry;
        let child = ComponentInstance::new(descriptor, props, self.context().clone(), self.depth + 1);
        registry.add_child(self.id(), child.clone());
        let subtree = child.render();
        if !replace_with(placeholder, &[subtree]) {
            return Err(RenderError::Detached(tag));
        }
        for (key, prop) in bound {
            registry.bind_prop(
                self.id(),
                &key,
                PropBinding {
                    child: child.clone(),
                    prop,
                },
            );
        }
        debug!(parent = %self.id(), child = %child.id(), component = %tag, "mounted child");
        Ok(())
    }
}
