//! Atom table
//!
//! Owned by the server root and handed to whatever needs atom names. Index 0
//! is `None`, the predefined atoms follow, interned names are appended.

use crate::protocol::{Atom, X11Error, X11Result, PREDEFINED_ATOMS};
use std::sync::{Mutex, PoisonError};

pub struct AtomTable {
    names: Mutex<Vec<String>>,
}

impl AtomTable {
    pub fn new() -> Self {
        let mut names = Vec::with_capacity(PREDEFINED_ATOMS.len() + 64);
        names.push(String::new());
        names.extend(PREDEFINED_ATOMS.iter().map(|s| s.to_string()));
        AtomTable {
            names: Mutex::new(names),
        }
    }

    /// Return the atom for `name`, creating it on first use.
    pub fn intern(&self, name: &str) -> Atom {
        let mut names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(id) = find(&names, name) {
            return Atom(id);
        }
        names.push(name.to_string());
        let atom = Atom((names.len() - 1) as u32);
        log::debug!("Interned atom {} = {:?}", atom.get(), name);
        atom
    }

    /// Existing atom for `name`, never creates one.
    pub fn lookup(&self, name: &str) -> Option<Atom> {
        let names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        find(&names, name).map(Atom)
    }

    pub fn name(&self, atom: Atom) -> X11Result<String> {
        let names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        match atom.get() {
            0 => Err(X11Error::bad_atom(0)),
            id => names
                .get(id as usize)
                .cloned()
                .ok_or_else(|| X11Error::bad_atom(id)),
        }
    }

    pub fn is_valid(&self, atom: Atom) -> bool {
        let names = self.names.lock().unwrap_or_else(PoisonError::into_inner);
        atom.get() != 0 && (atom.get() as usize) < names.len()
    }

    pub fn validate(&self, atom: Atom) -> X11Result<Atom> {
        if self.is_valid(atom) {
            Ok(atom)
        } else {
            Err(X11Error::bad_atom(atom.get()))
        }
    }

    pub fn len(&self) -> usize {
        self.names.lock().unwrap_or_else(PoisonError::into_inner).len() - 1
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Linear scan; the table stays small.
fn find(names: &[String], name: &str) -> Option<u32> {
    names
        .iter()
        .skip(1)
        .position(|n| n == name)
        .map(|i| i as u32 + 1)
}
