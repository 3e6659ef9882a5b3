//! Reactive instance data.
//!
//! A `ReactiveData` wraps an ordered key/value mapping. Writing one of the
//! keys present at construction stores the value and then runs the change
//! callback before `set` returns. There is no batching and no dependency
//! graph: the callback decides who cares about the key.

use std::cell::RefCell;
use std::collections::HashSet;
use std::fmt;
use std::rc::Rc;

use crate::eval::Value;

pub type ChangeCallback = Rc<dyn Fn(&str, &Value)>;

pub struct ReactiveData {
    values: RefCell<Vec<(String, Value)>>,
    tracked: HashSet<String>,
    on_change: Option<ChangeCallback>,
}

impl fmt::Debug for ReactiveData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReactiveData")
            .field("values", &self.values.borrow())
            .field("tracked", &self.tracked)
            .finish()
    }
}

impl ReactiveData {
    pub fn new<F>(values: Vec<(String, Value)>, on_change: F) -> Self
    where
        F: Fn(&str, &Value) + 'static,
    {
        let mut data = Self::untracked(values);
        data.on_change = Some(Rc::new(on_change));
        data
    }

    /// Data without a change callback.
    pub fn untracked(values: Vec<(String, Value)>) -> Self {
        let tracked = values.iter().map(|(k, _)| k.clone()).collect();
        ReactiveData {
            values: RefCell::new(values),
            tracked,
            on_change: None,
        }
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values
            .borrow()
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.clone())
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.values.borrow().iter().any(|(k, _)| k == key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.values.borrow().iter().map(|(k, _)| k.clone()).collect()
    }

    /// Whether writes to `key` notify.
    pub fn is_tracked(&self, key: &str) -> bool {
        self.tracked.contains(key)
    }

    /// Stores `value` under `key`, then notifies if the key is tracked.
    pub fn set(&self, key: &str, value: impl Into<Value>) {
        let value = value.into();
        self.store(key, value.clone());
        if !self.tracked.contains(key) {
            return;
        }
        if let Some(callback) = &self.on_change {
            callback(key, &value);
        }
    }

    /// Stores without notifying.
    pub fn replace_quietly(&self, key: &str, value: impl Into<Value>) {
        self.store(key, value.into());
    }

    fn store(&self, key: &str, value: Value) {
        let mut values = self.values.borrow_mut();
        match values.iter_mut().find(|(k, _)| k == key) {
            Some(slot) => slot.1 = value,
            None => values.push((key.to_string(), value)),
        }
    }

    /// The whole mapping as an object value.
    pub fn snapshot(&self) -> Value {
        Value::Object(self.values.borrow().clone())
    }

    pub fn to_json(&self) -> serde_json::Value {
        self.snapshot().to_json()
    }
}
