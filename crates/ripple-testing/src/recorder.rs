use std::sync::Arc;

use parking_lot::Mutex;

/// Collects values delivered to callbacks so tests can assert on them.
///
/// Clones share the same storage.
#[derive(Debug)]
pub struct Recorder<T> {
    values: Arc<Mutex<Vec<T>>>,
}

impl<T> Clone for Recorder<T> {
    fn clone(&self) -> Self {
        Self {
            values: self.values.clone(),
        }
    }
}

impl<T> Default for Recorder<T> {
    fn default() -> Self {
        Self {
            values: Arc::new(Mutex::new(Vec::new())),
        }
    }
}

impl<T: Clone + Send + 'static> Recorder<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, value: T) {
        self.values.lock().push(value)
    }

    /// A callback recording each value it is called with.
    pub fn callback(&self) -> impl FnMut(&T) + Send + 'static {
        let values = self.values.clone();
        move |value| values.lock().push(value.clone())
    }

    pub fn len(&self) -> usize {
        self.values.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.lock().is_empty()
    }

    /// A copy of the values recorded so far.
    pub fn values(&self) -> Vec<T> {
        self.values.lock().clone()
    }

    /// Remove and return the values recorded so far.
    pub fn take(&self) -> Vec<T> {
        std::mem::take(&mut *self.values.lock())
    }
}

impl<T: ToString> Recorder<T> {
    /// The recorded values rendered with `Display`.
    pub fn to_strings(&self) -> Vec<String> {
        self.values.lock().iter().map(|value| value.to_string()).collect()
    }
}
