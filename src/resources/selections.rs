//! Selection ownership and input focus

use crate::protocol::Atom;
use crate::windows::EventSink;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

/// Focus value meaning "whatever window the pointer is in"
pub const FOCUS_POINTER_ROOT: u32 = 1;

#[derive(Clone)]
pub struct SelectionOwner {
    pub window: u32,
    pub time: u32,
    pub client: Arc<dyn EventSink>,
}

/// Result of a SetSelectionOwner attempt
pub enum OwnerChange {
    /// Timestamp older than the current ownership, nothing changed
    Rejected,
    /// The requested owner already held it
    Unchanged,
    /// Ownership moved; the previous holder (if any) must be told
    Changed(Option<SelectionOwner>),
}

#[derive(Default)]
pub struct SelectionTable {
    owners: Mutex<HashMap<Atom, SelectionOwner>>,
}

impl SelectionTable {
    pub fn new() -> Self {
        SelectionTable::default()
    }

    /// `window` 0 releases the selection. A change is accepted when `time`
    /// is not older than the stored ownership time.
    pub fn set_owner(
        &self,
        selection: Atom,
        window: u32,
        time: u32,
        client: Arc<dyn EventSink>,
    ) -> OwnerChange {
        let mut owners = self.owners.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = owners.get(&selection) {
            if time < current.time {
                return OwnerChange::Rejected;
            }
            if current.window == window && window != 0 {
                return OwnerChange::Unchanged;
            }
        }

        let previous = if window == 0 {
            owners.remove(&selection)
        } else {
            owners.insert(
                selection,
                SelectionOwner {
                    window,
                    time,
                    client,
                },
            )
        };
        OwnerChange::Changed(previous)
    }

    pub fn owner(&self, selection: Atom) -> Option<SelectionOwner> {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&selection)
            .cloned()
    }

    /// Forget every selection held through `client_id`.
    pub fn drop_client(&self, client_id: u32) {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, owner| owner.client.client_id() != client_id);
    }

    /// Forget selections owned by a window that is going away.
    pub fn drop_window(&self, window: u32) {
        self.owners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|_, owner| owner.window != window);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InputFocus {
    pub window: u32,
    pub revert_to: u8,
}

pub struct FocusState {
    focus: Mutex<InputFocus>,
}

impl FocusState {
    pub fn new() -> Self {
        FocusState {
            focus: Mutex::new(InputFocus {
                window: FOCUS_POINTER_ROOT,
                revert_to: 0,
            }),
        }
    }

    pub fn get(&self) -> InputFocus {
        *self.focus.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set(&self, window: u32, revert_to: u8) {
        *self.focus.lock().unwrap_or_else(PoisonError::into_inner) = InputFocus { window, revert_to };
    }

    /// Applied when the focus window is destroyed.
    pub fn window_gone(&self, window: u32) {
        let mut focus = self.focus.lock().unwrap_or_else(PoisonError::into_inner);
        if focus.window == window {
            focus.window = FOCUS_POINTER_ROOT;
        }
    }
}

impl Default for FocusState {
    fn default() -> Self {
        Self::new()
    }
}
