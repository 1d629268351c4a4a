//! Per-session identity map

use crate::value::Value;
use std::any::{Any, TypeId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Shared handle on a session-tracked entity
pub type Shared<T> = Rc<RefCell<T>>;

/// Wrap an entity for use with a session
pub fn shared<T>(entity: T) -> Shared<T> {
    Rc::new(RefCell::new(entity))
}

/// One live instance per (type, key); later inserts replace earlier ones
#[derive(Default)]
pub(crate) struct SessionCache {
    entries: HashMap<(TypeId, String), Rc<dyn Any>>,
}

impl SessionCache {
    pub fn get<T: 'static>(&self, key: &Value) -> Option<Shared<T>> {
        self.entries
            .get(&(TypeId::of::<T>(), key.identity_key()))
            .cloned()
            .and_then(|entry| entry.downcast::<RefCell<T>>().ok())
    }

    pub fn insert<T: 'static>(&mut self, key: &Value, entity: &Shared<T>) {
        let entry: Rc<dyn Any> = Rc::clone(entity) as Rc<dyn Any>;
        self.entries
            .insert((TypeId::of::<T>(), key.identity_key()), entry);
    }

    pub fn remove<T: 'static>(&mut self, key: &Value) {
        self.entries.remove(&(TypeId::of::<T>(), key.identity_key()));
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default, PartialEq)]
    struct Note {
        text: String,
    }

    #[test]
    fn test_same_identity_returns_same_instance() {
        let mut cache = SessionCache::default();
        let note = shared(Note::default());
        cache.insert(&Value::Int32(7), &note);

        let found = cache.get::<Note>(&Value::Int32(7)).unwrap();
        assert!(Rc::ptr_eq(&found, &note));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_lookup_is_scoped_by_type() {
        let mut cache = SessionCache::default();
        cache.insert(&Value::Int32(1), &shared(Note::default()));
        assert!(cache.get::<String>(&Value::Int32(1)).is_none());
    }

    #[test]
    fn test_last_write_wins_and_remove() {
        let mut cache = SessionCache::default();
        let first = shared(Note { text: "a".into() });
        let second = shared(Note { text: "b".into() });
        cache.insert(&Value::Int32(1), &first);
        cache.insert(&Value::Int32(1), &second);
        assert_eq!(cache.get::<Note>(&Value::Int32(1)).unwrap().borrow().text, "b");

        cache.remove::<Note>(&Value::Int32(1));
        assert!(cache.get::<Note>(&Value::Int32(1)).is_none());
        cache.clear();
        assert_eq!(cache.len(), 0);
    }
}
