//! Component instances.
//!
//! An instance pairs a descriptor with its own reactive data and bound
//! methods. Its data callback pushes each write into the DOM nodes bound to
//! that key and into the child props fed by it; the render pipeline lives in
//! `render.rs`.

use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, error, warn};

use crate::descriptor::{ComponentDescriptor, MethodBindError, MethodSource, NativeMethod};
use crate::document::{replace_with, set_attribute, set_text, Document};
use crate::eval::{EvalError, Interpreter, Scope, Value, MAX_CALL_DEPTH};
use crate::expr::{parse_program, Stmt};
use crate::reactive::ReactiveData;
use crate::registry::{NodeBinding, Registry};

/// Attribute identifying an instance's live root element.
pub const COMPONENT_ID_ATTR: &str = "data-component-id";

static INSTANCE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_instance_id() -> String {
    format!(
        "component-{}",
        INSTANCE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
    )
}

/// Shared state threaded through instantiation and rendering.
#[derive(Clone)]
pub struct RenderContext {
    pub document: Rc<Document>,
    pub registry: Registry,
}

impl RenderContext {
    pub fn new(document: Rc<Document>) -> Self {
        RenderContext {
            document,
            registry: Registry::new(),
        }
    }
}

enum BoundMethod {
    Native(NativeMethod),
    Script { params: Vec<String>, body: Rc<Vec<Stmt>> },
}

pub struct InstanceState {
    id: String,
    descriptor: Rc<ComponentDescriptor>,
    data: ReactiveData,
    methods: HashMap<String, BoundMethod>,
    pub(crate) context: RenderContext,
    pub(crate) depth: usize,
    call_depth: Cell<usize>,
}

#[derive(Clone)]
pub struct ComponentInstance(Rc<InstanceState>);

#[derive(Clone)]
pub struct WeakInstance(Weak<InstanceState>);

impl WeakInstance {
    pub fn upgrade(&self) -> Option<ComponentInstance> {
        self.0.upgrade().map(ComponentInstance)
    }
}

impl Deref for ComponentInstance {
    type Target = InstanceState;

    fn deref(&self) -> &InstanceState {
        &self.0
    }
}

impl fmt::Debug for ComponentInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentInstance")
            .field("id", &self.id)
            .field("data", &self.data)
            .finish()
    }
}

impl PartialEq for ComponentInstance {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

fn bind_methods(descriptor: &ComponentDescriptor, id: &str) -> HashMap<String, BoundMethod> {
    let mut methods = HashMap::new();
    for (name, source) in &descriptor.methods {
        let bound = match source {
            MethodSource::Native(method) => BoundMethod::Native(method.clone()),
            MethodSource::Script { params, body } => match parse_program(body) {
                Ok(stmts) => BoundMethod::Script {
                    params: params.clone(),
                    body: Rc::new(stmts),
                },
                Err(source) => {
                    let err = MethodBindError {
                        name: name.clone(),
                        source,
                    };
                    error!(instance = %id, error = %err, "skipping method");
                    continue;
                }
            },
        };
        methods.insert(name.clone(), bound);
    }
    methods
}

impl ComponentInstance {
    /// Creates an instance whose data is the descriptor's data overlaid with
    /// `props`. Declared props always exist as data keys.
    pub fn new(
        descriptor: Rc<ComponentDescriptor>,
        props: Vec<(String, Value)>,
        context: RenderContext,
        depth: usize,
    ) -> Self {
        let id = next_instance_id();

        let mut values = descriptor.data.produce().unwrap_or_else(|err| {
            error!(instance = %id, error = %err, "data initialization failed, using empty data");
            Vec::new()
        });
        for prop in &descriptor.props {
            if !values.iter().any(|(k, _)| k == prop) {
                values.push((prop.clone(), Value::Undefined));
            }
        }
        for (key, value) in props {
            match values.iter_mut().find(|(k, _)| *k == key) {
                Some(slot) => slot.1 = value,
                None => values.push((key, value)),
            }
        }

        let methods = bind_methods(&descriptor, &id);

        if let Some(css) = &descriptor.style {
            context.document.inject_style(css);
        }

        let state = Rc::new_cyclic(|weak: &Weak<InstanceState>| {
            let weak = weak.clone();
            let data = ReactiveData::new(values, move |key, value| {
                if let Some(state) = weak.upgrade() {
                    ComponentInstance(state).on_change(key, value);
                }
            });
            InstanceState {
                id,
                descriptor,
                data,
                methods,
                context,
                depth,
                call_depth: Cell::new(0),
            }
        });
        let instance = ComponentInstance(state);
        instance.context.registry.register_instance(&instance);
        debug!(instance = %instance.id, depth, "created instance");
        instance
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn data(&self) -> &ReactiveData {
        &self.data
    }

    pub fn descriptor(&self) -> &Rc<ComponentDescriptor> {
        &self.descriptor
    }

    pub fn context(&self) -> &RenderContext {
        &self.context
    }

    pub fn downgrade(&self) -> WeakInstance {
        WeakInstance(Rc::downgrade(&self.0))
    }

    /// The element carrying this instance's id in the current render.
    pub fn root_element(&self) -> Option<crate::document::Handle> {
        self.context.registry.root(&self.id)
    }

    pub fn children(&self) -> Vec<ComponentInstance> {
        self.context.registry.children(&self.id)
    }

    pub fn method_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.methods.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let Some(method) = self.methods.get(name) else {
            return Err(EvalError::NotCallable(name.to_string()));
        };
        let depth = self.call_depth.get();
        if depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepth(MAX_CALL_DEPTH));
        }
        self.call_depth.set(depth + 1);
        let result = match method {
            BoundMethod::Native(method) => method(self, &args),
            BoundMethod::Script { params, body } => {
                let mut args = args.into_iter();
                let locals = params
                    .iter()
                    .map(|param| (param.clone(), args.next().unwrap_or_default()))
                    .collect();
                Interpreter::with_locals(self, locals).run(body)
            }
        };
        self.call_depth.set(depth);
        result
    }

    /// Data callback: refreshes the DOM nodes bound to `key` and re-renders
    /// the children whose props it feeds.
    fn on_change(&self, key: &str, value: &Value) {
        let registry = &self.context.registry;
        for binding in registry.node_bindings(&self.id, key) {
            match binding {
                NodeBinding::Text(node) => set_text(&node, &value.to_display_string()),
                NodeBinding::Attribute { element, name } => {
                    set_attribute(&element, &name, &value.to_js_string())
                }
            }
        }
        for binding in registry.prop_bindings(&self.id, key) {
            debug!(
                instance = %self.id,
                key,
                child = %binding.child.id,
                prop = %binding.prop,
                "propagating prop"
            );
            binding.child.data.replace_quietly(&binding.prop, value.clone());
            binding.child.refresh();
        }
    }

    /// Re-renders and swaps the new subtree in for the current live root.
    pub fn refresh(&self) {
        let registry = &self.context.registry;
        if !registry.is_registered(&self.id) {
            warn!(instance = %self.id, "refresh of a released instance ignored");
            return;
        }
        let old_root = registry.root(&self.id);
        let new_root = self.render();
        match old_root {
            Some(old) => {
                if !replace_with(&old, &[new_root]) {
                    debug!(instance = %self.id, "instance is not attached, nothing to swap");
                }
            }
            None => debug!(instance = %self.id, "first render on refresh"),
        }
    }
}

impl Scope for ComponentInstance {
    fn lookup(&self, name: &str) -> Option<Value> {
        self.data.get(name)
    }

    fn assign(&self, name: &str, value: Value) {
        self.data.set(name, value);
    }

    fn replace_quietly(&self, name: &str, value: Value) {
        self.data.replace_quietly(name, value);
    }

    fn has_method(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    fn call_method(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        ComponentInstance::call_method(self, name, args)
    }

    fn snapshot(&self) -> Value {
        self.data.snapshot()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> RenderContext {
        RenderContext::new(Rc::new(Document::parse("<html><body></body></html>")))
    }

    fn counter() -> Rc<ComponentDescriptor> {
        Rc::new(
            ComponentDescriptor::new("<p>{count}</p>")
                .with_data([("count", Value::from(1))])
                .with_method("add", ["n"], "this.count = this.count + n; return this.count;")
                .with_method("twice", Vec::<String>::new(), "add(1); return add(1);")
                .with_method("broken", Vec::<String>::new(), "for (;;) {}")
                .with_method("recurse", Vec::<String>::new(), "return recurse();"),
        )
    }

    #[test]
    fn test_ids_are_unique() {
        let ctx = context();
        let a = ComponentInstance::new(counter(), vec![], ctx.clone(), 0);
        let b = ComponentInstance::new(counter(), vec![], ctx, 0);
        assert_ne!(a.id(), b.id());
        assert!(a.id().starts_with("component-"));
    }

    #[test]
    fn test_script_methods_mutate_data() {
        let inst = ComponentInstance::new(counter(), vec![], context(), 0);
        assert_eq!(inst.call_method("add", vec![Value::from(4)]).unwrap(), Value::from(5));
        assert_eq!(inst.call_method("twice", vec![]).unwrap(), Value::from(7));
        assert_eq!(inst.data().get("count"), Some(Value::from(7)));
    }

    #[test]
    fn test_unparsable_method_is_skipped() {
        let inst = ComponentInstance::new(counter(), vec![], context(), 0);
        assert_eq!(inst.method_names(), vec!["add", "recurse", "twice"]);
        assert!(matches!(
            inst.call_method("broken", vec![]),
            Err(EvalError::NotCallable(_))
        ));
    }

    #[test]
    fn test_recursion_is_bounded() {
        let inst = ComponentInstance::new(counter(), vec![], context(), 0);
        assert_eq!(
            inst.call_method("recurse", vec![]),
            Err(EvalError::CallDepth(MAX_CALL_DEPTH))
        );
        // The counter unwinds.
        assert_eq!(inst.call_method("add", vec![Value::from(1)]).unwrap(), Value::from(2));
    }

    #[test]
    fn test_props_override_data_and_declared_props_exist() {
        let d = Rc::new(
            ComponentDescriptor::new("<p></p>")
                .with_props(["label", "hint"])
                .with_data([("label", Value::from("default"))]),
        );
        let inst = ComponentInstance::new(d, vec![("label".to_string(), Value::from("A"))], context(), 0);
        assert_eq!(inst.data().get("label"), Some(Value::from("A")));
        assert_eq!(inst.data().get("hint"), Some(Value::Undefined));
        assert!(inst.data().is_tracked("hint"));
    }

    #[test]
    fn test_failing_data_factory_yields_empty_data() {
        let d = Rc::new(ComponentDescriptor::new("<p></p>").with_data_factory(|| {
            Err(crate::descriptor::DataInitError::Factory("boom".to_string()))
        }));
        let inst = ComponentInstance::new(d, vec![], context(), 0);
        assert!(inst.data().keys().is_empty());
    }

    #[test]
    fn test_native_methods_receive_the_instance() {
        let d = Rc::new(
            ComponentDescriptor::new("<p></p>")
                .with_data([("n", Value::from(0))])
                .with_native_method("bump", |inst, args| {
                    let by = args.first().map_or(1.0, Value::to_number);
                    let next = inst.data().get("n").unwrap_or_default().to_number() + by;
                    inst.data().set("n", next);
                    Ok(Value::from(next))
                }),
        );
        let inst = ComponentInstance::new(d, vec![], context(), 0);
        inst.call_method("bump", vec![Value::from(3)]).unwrap();
        assert_eq!(inst.data().get("n"), Some(Value::from(3)));
    }
}
