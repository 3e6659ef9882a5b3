//! # olova
//!
//! Single-file component compiler and DOM runtime.
//!
//! ## Compiler
//!
//! A `.olova` source holds at most one `<script>`, at most one `<style>`
//! (optionally `scoped`) and a template made of everything else.
//! [`compile_sfc`] splits the blocks, analyses the script with oxc, rewrites
//! component tags and bind shorthand, scopes styles and produces a
//! [`ComponentModule`]. [`generate_module`] renders that module as the ES
//! module served by the build plugin ([`transform`]). Compile failures never
//! abort: the module falls back to a template showing the error.
//!
//! ## Runtime
//!
//! [`create_app`] instantiates a [`ComponentDescriptor`] against a
//! [`Document`]; [`App::mount`] renders it into an anchor element. Every
//! write to instance data is pushed synchronously into the text nodes,
//! attributes and child props bound to that key. Clicks re-render the
//! owning instance.
//!
//! Script code never runs as arbitrary source: method bodies, data
//! initializers and `onclick` handlers are parsed into a small statement
//! language and interpreted against the instance's data.

#[cfg(feature = "napi")]
use napi_derive::napi;

mod app;
mod codegen;
mod compile;
mod descriptor;
mod discovery;
mod document;
mod eval;
mod expr;
mod instance;
mod ir;
mod parse;
mod reactive;
mod registry;
mod render;
mod renamer;
mod script;
mod style;

#[cfg(test)]
mod compile_tests;
#[cfg(test)]
mod expression_tests;
#[cfg(test)]
mod render_tests;

pub use app::{create_app, App, MountError};
pub use codegen::{escape_template_literal, generate_module};
#[cfg(feature = "napi")]
pub use compile::transform_native;
pub use compile::{compile_sfc, transform, CompileOptions, CompileResult};
pub use descriptor::{
    ComponentDescriptor, DataFactory, DataInitError, DataSource, MethodBindError, MethodSource,
    NativeMethod,
};
pub use discovery::{discover_components, ComponentLibrary, DiscoveryError, LinkError};
pub use document::{Document, Handle, SelectorError};
pub use eval::{EvalError, Value};
pub use expr::ParseError;
pub use instance::{ComponentInstance, RenderContext, COMPONENT_ID_ATTR};
pub use ir::{
    CompilerError, ComponentModule, ComponentRef, DataField, ImportIR, MethodIR, StyleIR,
};
pub use reactive::ReactiveData;
pub use registry::Registry;
pub use render::{ClickHandler, RenderError, MAX_NESTING_DEPTH};
pub use style::{scope_attribute, scope_css, scope_id, StyleError};

/// DOM helpers for working with rendered trees.
pub mod dom {
    pub use crate::document::{
        append_child, attributes, children_of, create_element, create_text, descendants,
        get_attribute, inner_html, outer_html, parent_of, parse_fragment_nodes, set_attribute,
        tag_name, text_content,
    };
}

#[cfg(feature = "napi")]
#[napi]
pub fn compile_bridge() -> String {
    "olova native bridge connected".to_string()
}
