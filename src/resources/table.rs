//! Lock-guarded id → resource map shared by the simple resource managers

use crate::protocol::{X11Error, X11Result};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

pub struct ResourceTable<T> {
    items: Mutex<HashMap<u32, T>>,
    not_found: fn(u32) -> X11Error,
}

impl<T> ResourceTable<T> {
    /// `not_found` builds the error returned for an unknown id.
    pub fn new(not_found: fn(u32) -> X11Error) -> Self {
        ResourceTable {
            items: Mutex::new(HashMap::new()),
            not_found,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<u32, T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Ids are unique within one table only; a clash is an IDChoice error.
    pub fn insert(&self, id: u32, item: T) -> X11Result<()> {
        let mut items = self.lock();
        if items.contains_key(&id) {
            return Err(X11Error::bad_id_choice(id));
        }
        items.insert(id, item);
        Ok(())
    }

    pub fn contains(&self, id: u32) -> bool {
        self.lock().contains_key(&id)
    }

    pub fn with<R>(&self, id: u32, f: impl FnOnce(&T) -> R) -> X11Result<R> {
        let items = self.lock();
        items.get(&id).map(f).ok_or_else(|| (self.not_found)(id))
    }

    pub fn with_mut<R>(&self, id: u32, f: impl FnOnce(&mut T) -> R) -> X11Result<R> {
        let mut items = self.lock();
        items.get_mut(&id).map(f).ok_or_else(|| (self.not_found)(id))
    }

    /// Freeing an id that is not present is not an error.
    pub fn remove(&self, id: u32) -> Option<T> {
        self.lock().remove(&id)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: Clone> ResourceTable<T> {
    pub fn get(&self, id: u32) -> X11Result<T> {
        self.with(id, T::clone)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ErrorCode;

    #[test]
    fn test_insert_get_remove() {
        let table: ResourceTable<String> = ResourceTable::new(X11Error::bad_gc);
        table.insert(5, "five".to_string()).unwrap();
        assert_eq!(table.get(5).unwrap(), "five");
        assert_eq!(table.insert(5, "again".into()).unwrap_err().code, ErrorCode::IDChoice);

        let err = table.get(6).unwrap_err();
        assert_eq!(err.code, ErrorCode::GContext);
        assert_eq!(err.bad_value, 6);

        assert!(table.remove(5).is_some());
        assert!(table.remove(5).is_none());
        assert!(table.is_empty());
    }

    #[test]
    fn test_with_mut() {
        let table: ResourceTable<u32> = ResourceTable::new(X11Error::bad_font);
        table.insert(1, 10).unwrap();
        table.with_mut(1, |v| *v += 5).unwrap();
        assert_eq!(table.get(1).unwrap(), 15);
    }
}
