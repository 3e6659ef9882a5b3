//! Application host.

use std::rc::Rc;
use thiserror::Error;
use tracing::debug;

use crate::descriptor::ComponentDescriptor;
use crate::document::{append_child, clear_children, Document, Handle, SelectorError};
use crate::eval::EvalError;
use crate::instance::{ComponentInstance, RenderContext};
use crate::reactive::ReactiveData;
use crate::registry::Registry;
use crate::render::dispatch_click;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum MountError {
    #[error("Element with selector \"{0}\" not found")]
    NotFound(String),
    #[error(transparent)]
    Selector(#[from] SelectorError),
}

pub struct App {
    root: ComponentInstance,
    context: RenderContext,
}

/// Builds the root instance for `descriptor` against `document`.
pub fn create_app(descriptor: Rc<ComponentDescriptor>, document: &Rc<Document>) -> App {
    let context = RenderContext::new(document.clone());
    let root = ComponentInstance::new(descriptor, Vec::new(), context.clone(), 0);
    App { root, context }
}

impl App {
    /// Renders the root instance into the element matching `selector`,
    /// replacing its children. Nothing is touched when no element matches.
    pub fn mount(&self, selector: &str) -> Result<Handle, MountError> {
        let anchor = self
            .context
            .document
            .query_selector(selector)?
            .ok_or_else(|| MountError::NotFound(selector.to_string()))?;
        clear_children(&anchor);
        let root = self.root.render();
        append_child(&anchor, &root);
        debug!(selector, instance = %self.root.id(), "mounted app");
        Ok(root)
    }

    pub fn data(&self) -> &ReactiveData {
        self.root.data()
    }

    pub fn root(&self) -> &ComponentInstance {
        &self.root
    }

    pub fn document(&self) -> &Rc<Document> {
        &self.context.document
    }

    pub fn registry(&self) -> &Registry {
        &self.context.registry
    }

    /// Dispatches a click at `target`; see [`dispatch_click`].
    pub fn click(&self, target: &Handle) -> Result<usize, EvalError> {
        dispatch_click(&self.context.registry, target)
    }
}

impl Drop for App {
    fn drop(&mut self) {
        self.context.registry.clear();
    }
}
