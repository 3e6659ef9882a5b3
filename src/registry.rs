//! Per-application bookkeeping.
//!
//! The registry maps instance ids to their live root element, their direct
//! children, the DOM nodes bound to each data key, the child props fed by
//! each data key, and the click listeners installed by their last render.
//! Rows belong to the instance whose render created them and are dropped
//! when that instance re-renders or is released.
//!
//! Accessors hand out clones; no borrow of the tables outlives a call, so
//! callbacks that re-enter the registry are safe.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use crate::document::Handle;
use crate::instance::{ComponentInstance, WeakInstance};
use crate::render::ClickHandler;

/// A DOM location refreshed when a data key changes.
#[derive(Debug, Clone)]
pub enum NodeBinding {
    Text(Handle),
    Attribute { element: Handle, name: String },
}

/// A child prop fed from a parent data key.
#[derive(Clone)]
pub struct PropBinding {
    pub child: ComponentInstance,
    pub prop: String,
}

#[derive(Clone)]
pub struct Listener {
    pub element: Weak<markup5ever_rcdom::Node>,
    pub instance: String,
    pub handler: Rc<ClickHandler>,
}

#[derive(Default)]
struct Tables {
    instances: HashMap<String, WeakInstance>,
    roots: HashMap<String, Handle>,
    children: HashMap<String, Vec<ComponentInstance>>,
    node_bindings: HashMap<String, HashMap<String, Vec<NodeBinding>>>,
    prop_bindings: HashMap<String, HashMap<String, Vec<PropBinding>>>,
    listeners: HashMap<String, Vec<Listener>>,
}

#[derive(Clone, Default)]
pub struct Registry {
    tables: Rc<RefCell<Tables>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    // ─── instances ────────────────────────────────────────────────────────────

    pub fn register_instance(&self, instance: &ComponentInstance) {
        self.tables
            .borrow_mut()
            .instances
            .insert(instance.id().to_string(), instance.downgrade());
    }

    pub fn lookup_instance(&self, id: &str) -> Option<ComponentInstance> {
        self.tables
            .borrow()
            .instances
            .get(id)
            .and_then(WeakInstance::upgrade)
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.tables.borrow().instances.contains_key(id)
    }

    pub fn instance_count(&self) -> usize {
        self.tables.borrow().instances.len()
    }

    // ─── roots ────────────────────────────────────────────────────────────────

    pub fn set_root(&self, id: &str, root: Handle) {
        self.tables.borrow_mut().roots.insert(id.to_string(), root);
    }

    pub fn root(&self, id: &str) -> Option<Handle> {
        self.tables.borrow().roots.get(id).cloned()
    }

    // ─── children ─────────────────────────────────────────────────────────────

    pub fn add_child(&self, parent: &str, child: ComponentInstance) {
        self.tables
            .borrow_mut()
            .children
            .entry(parent.to_string())
            .or_default()
            .push(child);
    }

    pub fn children(&self, parent: &str) -> Vec<ComponentInstance> {
        self.tables
            .borrow()
            .children
            .get(parent)
            .cloned()
            .unwrap_or_default()
    }

    // ─── bindings ─────────────────────────────────────────────────────────────

    pub fn bind_node(&self, id: &str, key: &str, binding: NodeBinding) {
        self.tables
            .borrow_mut()
            .node_bindings
            .entry(id.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(binding);
    }

    pub fn node_bindings(&self, id: &str, key: &str) -> Vec<NodeBinding> {
        self.tables
            .borrow()
            .node_bindings
            .get(id)
            .and_then(|keys| keys.get(key))
            .cloned()
            .unwrap_or_default()
    }

    pub fn bind_prop(&self, parent: &str, key: &str, binding: PropBinding) {
        self.tables
            .borrow_mut()
            .prop_bindings
            .entry(parent.to_string())
            .or_default()
            .entry(key.to_string())
            .or_default()
            .push(binding);
    }

    pub fn prop_bindings(&self, parent: &str, key: &str) -> Vec<PropBinding> {
        self.tables
            .borrow()
            .prop_bindings
            .get(parent)
            .and_then(|keys| keys.get(key))
            .cloned()
            .unwrap_or_default()
    }

    // ─── listeners ────────────────────────────────────────────────────────────

    pub fn add_listener(&self, id: &str, listener: Listener) {
        self.tables
            .borrow_mut()
            .listeners
            .entry(id.to_string())
            .or_default()
            .push(listener);
    }

    /// Listeners installed on `element`, in installation order per instance.
    pub fn listeners_on(&self, element: &Handle) -> Vec<Listener> {
        let tables = self.tables.borrow();
        let mut ids: Vec<&String> = tables.listeners.keys().collect();
        ids.sort();
        ids.into_iter()
            .flat_map(|id| tables.listeners[id].iter())
            .filter(|listener| std::ptr::eq(listener.element.as_ptr(), Rc::as_ptr(element)))
            .cloned()
            .collect()
    }

    // ─── teardown ─────────────────────────────────────────────────────────────

    /// Drops the rows created by `id`'s last render and releases its
    /// children.
    pub fn reset(&self, id: &str) {
        let children = {
            let mut tables = self.tables.borrow_mut();
            tables.node_bindings.remove(id);
            tables.prop_bindings.remove(id);
            tables.listeners.remove(id);
            tables.children.remove(id).unwrap_or_default()
        };
        for child in children {
            self.release(child.id());
        }
    }

    /// Forgets an instance and, recursively, everything it owns.
    pub fn release(&self, id: &str) {
        self.reset(id);
        let mut tables = self.tables.borrow_mut();
        tables.instances.remove(id);
        tables.roots.remove(id);
    }

    /// Empties every table. Instances hold the registry and the registry
    /// holds child instances, so the owning app clears it on drop.
    pub fn clear(&self) {
        let old = std::mem::take(&mut *self.tables.borrow_mut());
        drop(old);
    }
}
