//! Interned strings used as property names.
//!
//! Interning makes key equality a pointer comparison. Interned strings live
//! for the rest of the process, so only the fixed names of property schemas
//! are interned. Blackboard keys are plain strings.

use ::once_cell::sync::Lazy;
use std::cmp::Ordering;
use std::collections::HashSet;
use std::fmt::{Debug, Display, Formatter, Result as FmtResult};
use std::ops::Deref;
use std::sync::{Mutex, PoisonError};

static SYMBOL_HEAP: Lazy<Mutex<HashSet<&'static str>>> = Lazy::new(|| Mutex::new(HashSet::new()));

/// An interned string with O(1) equality.
#[derive(Clone, Copy, Eq, Hash)]
pub struct Symbol {
    s: &'static str,
}

impl Symbol {
    /// Retrieves the address of the backing string.
    pub fn addr(self) -> usize {
        self.s.as_ptr() as usize
    }

    pub fn as_str(self) -> &'static str {
        self.s
    }

    #[cfg(test)]
    pub(crate) fn is_interned(s: &str) -> bool {
        SYMBOL_HEAP
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(s)
    }
}

impl Debug for Symbol {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        Debug::fmt(self.s, fmt)
    }
}

impl Deref for Symbol {
    type Target = str;
    fn deref(&self) -> &str {
        self.s
    }
}

impl Display for Symbol {
    fn fmt(&self, fmt: &mut Formatter) -> FmtResult {
        fmt.write_str(self.s)
    }
}

impl<S: AsRef<str>> From<S> for Symbol {
    fn from(s: S) -> Symbol {
        let s = s.as_ref();
        let mut heap = SYMBOL_HEAP.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(interned) = heap.get(s) {
            return Symbol { s: interned };
        }
        let interned: &'static str = Box::leak(s.to_owned().into_boxed_str());
        heap.insert(interned);
        Symbol { s: interned }
    }
}

impl Ord for Symbol {
    fn cmp(&self, other: &Self) -> Ordering {
        self.addr().cmp(&other.addr())
    }
}

impl PartialEq for Symbol {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl PartialOrd for Symbol {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<S: AsRef<str>> PartialEq<S> for Symbol {
    fn eq(&self, other: &S) -> bool {
        self.s == other.as_ref()
    }
}
