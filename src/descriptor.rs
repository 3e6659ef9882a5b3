//! Runtime component descriptors.
//!
//! A descriptor is what the app host instantiates: template text, declared
//! props, a data source, methods and the child components its template may
//! use. Descriptors are immutable once built and shared through `Rc`.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use thiserror::Error;

use crate::eval::{EvalError, Interpreter, Value, ValuesScope};
use crate::expr::{parse_expression, ParseError};
use crate::instance::ComponentInstance;
use crate::ir::ComponentModule;

pub type NativeMethod = Rc<dyn Fn(&ComponentInstance, &[Value]) -> Result<Value, EvalError>>;
pub type DataFactory = Rc<dyn Fn() -> Result<Vec<(String, Value)>, DataInitError>>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum DataInitError {
    #[error("data initializer for `{name}` failed: {source}")]
    Initializer { name: String, source: EvalError },
    #[error("data factory failed: {0}")]
    Factory(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("method `{name}` could not be bound: {source}")]
pub struct MethodBindError {
    pub name: String,
    pub source: ParseError,
}

/// Where an instance's initial data comes from. Every source produces a
/// fresh mapping per instance.
#[derive(Clone)]
pub enum DataSource {
    Values(Vec<(String, Value)>),
    /// Initializer expressions, evaluated in order.
    Initializers(Vec<(String, String)>),
    Factory(DataFactory),
}

impl Default for DataSource {
    fn default() -> Self {
        DataSource::Values(Vec::new())
    }
}

impl fmt::Debug for DataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataSource::Values(values) => f.debug_tuple("Values").field(values).finish(),
            DataSource::Initializers(fields) => f.debug_tuple("Initializers").field(fields).finish(),
            DataSource::Factory(_) => f.write_str("Factory(..)"),
        }
    }
}

impl DataSource {
    pub fn produce(&self) -> Result<Vec<(String, Value)>, DataInitError> {
        match self {
            DataSource::Values(values) => Ok(values.clone()),
            DataSource::Initializers(fields) => {
                let scope = ValuesScope::default();
                for (name, init) in fields {
                    let value = parse_expression(init)
                        .map_err(EvalError::from)
                        .and_then(|expr| Interpreter::new(&scope).eval(&expr))
                        .map_err(|source| DataInitError::Initializer {
                            name: name.clone(),
                            source,
                        })?;
                    scope.define(name, value);
                }
                Ok(scope.into_values())
            }
            DataSource::Factory(factory) => factory(),
        }
    }
}

#[derive(Clone)]
pub enum MethodSource {
    Native(NativeMethod),
    /// Script form: parameter names and a statement-list body.
    Script { params: Vec<String>, body: String },
}

impl fmt::Debug for MethodSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodSource::Native(_) => f.write_str("Native(..)"),
            MethodSource::Script { params, body } => f
                .debug_struct("Script")
                .field("params", params)
                .field("body", body)
                .finish(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComponentDescriptor {
    pub template: String,
    pub props: Vec<String>,
    pub data: DataSource,
    pub methods: Vec<(String, MethodSource)>,
    /// Lowercase tag name → child descriptor.
    pub components: HashMap<String, Rc<ComponentDescriptor>>,
    /// CSS registered globally when an instance is created.
    pub style: Option<String>,
}

impl ComponentDescriptor {
    pub fn new(template: impl Into<String>) -> Self {
        ComponentDescriptor {
            template: template.into(),
            ..Default::default()
        }
    }

    pub fn with_props<S: Into<String>>(mut self, props: impl IntoIterator<Item = S>) -> Self {
        for prop in props {
            let prop = prop.into();
            if !self.props.contains(&prop) {
                self.props.push(prop);
            }
        }
        self
    }

    pub fn with_data<K: Into<String>>(mut self, values: impl IntoIterator<Item = (K, Value)>) -> Self {
        self.data = DataSource::Values(values.into_iter().map(|(k, v)| (k.into(), v)).collect());
        self
    }

    pub fn with_initializers<K: Into<String>, E: Into<String>>(
        mut self,
        fields: impl IntoIterator<Item = (K, E)>,
    ) -> Self {
        self.data = DataSource::Initializers(
            fields.into_iter().map(|(k, e)| (k.into(), e.into())).collect(),
        );
        self
    }

    pub fn with_data_factory<F>(mut self, factory: F) -> Self
    where
        F: Fn() -> Result<Vec<(String, Value)>, DataInitError> + 'static,
    {
        self.data = DataSource::Factory(Rc::new(factory));
        self
    }

    pub fn with_method<S: Into<String>>(
        mut self,
        name: impl Into<String>,
        params: impl IntoIterator<Item = S>,
        body: impl Into<String>,
    ) -> Self {
        self.methods.push((
            name.into(),
            MethodSource::Script {
                params: params.into_iter().map(Into::into).collect(),
                body: body.into(),
            },
        ));
        self
    }

    pub fn with_native_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: Fn(&ComponentInstance, &[Value]) -> Result<Value, EvalError> + 'static,
    {
        self.methods
            .push((name.into(), MethodSource::Native(Rc::new(method))));
        self
    }

    pub fn with_component(mut self, tag: &str, descriptor: Rc<ComponentDescriptor>) -> Self {
        self.components.insert(tag.to_ascii_lowercase(), descriptor);
        self
    }

    pub fn with_style(mut self, css: impl Into<String>) -> Self {
        self.style = Some(css.into());
        self
    }

    /// Builds a descriptor from compiler output. `components` maps each
    /// imported component name to its linked descriptor.
    pub fn from_module(
        module: &ComponentModule,
        components: &HashMap<String, Rc<ComponentDescriptor>>,
    ) -> Self {
        let mut descriptor = ComponentDescriptor::new(module.template.clone())
            .with_props(module.props.iter().cloned())
            .with_initializers(
                module
                    .data
                    .iter()
                    .map(|field| (field.name.clone(), field.init.clone())),
            );

        for method in &module.methods {
            descriptor = descriptor.with_method(
                method.name.clone(),
                method.params.iter().cloned(),
                method.qualified_body.clone(),
            );
        }

        for component in &module.components {
            if let Some(child) = components.get(&component.name) {
                descriptor = descriptor.with_component(&component.tag, child.clone());
            }
        }

        if let Some(style) = &module.style {
            if !style.css.trim().is_empty() {
                descriptor = descriptor.with_style(style.css.clone());
            }
        }
        descriptor
    }

    pub fn component(&self, tag: &str) -> Option<&Rc<ComponentDescriptor>> {
        self.components.get(&tag.to_ascii_lowercase())
    }

    /// The declared prop matching `name` case-insensitively.
    pub fn declared_prop(&self, name: &str) -> Option<&str> {
        self.props
            .iter()
            .find(|prop| prop.eq_ignore_ascii_case(name))
            .map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{ComponentRef, DataField, MethodIR, StyleIR};

    #[test]
    fn test_initializers_produce_fresh_values() {
        let d = ComponentDescriptor::new("<p></p>")
            .with_initializers([("items", "[1, 2]"), ("n", "items.length")]);
        let first = d.data.produce().unwrap();
        assert_eq!(first[1].1, Value::from(2));
        assert_eq!(d.data.produce().unwrap(), first);
    }

    #[test]
    fn test_failing_initializer_names_the_field() {
        let d = ComponentDescriptor::new("").with_initializers([("ok", "1"), ("bad", "missing + 1")]);
        match d.data.produce() {
            Err(DataInitError::Initializer { name, .. }) => assert_eq!(name, "bad"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_from_module_links_components_and_style() {
        let module = ComponentModule {
            file_path: "/App.olova".to_string(),
            template: "<div><child-card></child-card></div>".to_string(),
            props: vec!["title".to_string()],
            data: vec![DataField {
                name: "count".to_string(),
                init: "0".to_string(),
            }],
            methods: vec![MethodIR {
                name: "inc".to_string(),
                params: vec!["by".to_string()],
                params_raw: "by".to_string(),
                body: "count += by;".to_string(),
                qualified_body: "this.count += by;".to_string(),
            }],
            components: vec![ComponentRef {
                tag: "child-card".to_string(),
                name: "ChildCard".to_string(),
                source: "./ChildCard.olova".to_string(),
            }],
            style: Some(StyleIR {
                raw: "p{}".to_string(),
                css: "p[data-v-1]{}".to_string(),
                scoped: true,
                scope_id: "data-v-1".to_string(),
            }),
            ..Default::default()
        };
        let child = Rc::new(ComponentDescriptor::new("<span></span>"));
        let mut linked = HashMap::new();
        linked.insert("ChildCard".to_string(), child);

        let d = ComponentDescriptor::from_module(&module, &linked);
        assert_eq!(d.props, vec!["title"]);
        assert!(d.component("child-card").is_some());
        assert_eq!(d.style.as_deref(), Some("p[data-v-1]{}"));
        match &d.methods[0].1 {
            MethodSource::Script { params, body } => {
                assert_eq!(params, &vec!["by".to_string()]);
                assert_eq!(body, "this.count += by;");
            }
            MethodSource::Native(_) => panic!("expected script method"),
        }
    }

    #[test]
    fn test_declared_prop_is_case_insensitive() {
        let d = ComponentDescriptor::new("").with_props(["userName", "userName"]);
        assert_eq!(d.props.len(), 1);
        assert_eq!(d.declared_prop("username"), Some("userName"));
    }
}
