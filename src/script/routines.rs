//! Engine routine signatures.
//!
//! `ACTION` instructions call into the game engine by routine index. The decompiler only needs
//! each routine's argument types (to know how many stack frames an argument consumes) and its
//! return type (to know what is pushed back). The catalogue itself is game specific and is
//! supplied by the caller through the [`Routines`] trait.

use std::collections::HashMap;

use crate::script::VariableType;

/// Signature of one engine routine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDecl {
    /// Routine name as used in scripts, e.g. `GetObjectByTag`
    pub name: String,
    /// Type of the value pushed after the call
    pub return_type: VariableType,
    /// Argument types in declaration order
    pub argument_types: Vec<VariableType>,
}

impl RoutineDecl {
    /// Creates a routine declaration.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        return_type: VariableType,
        argument_types: Vec<VariableType>,
    ) -> Self {
        Self {
            name: name.into(),
            return_type,
            argument_types,
        }
    }

    /// Type of the argument at `index`, if declared.
    #[must_use]
    pub fn argument_type(&self, index: usize) -> Option<VariableType> {
        self.argument_types.get(index).copied()
    }

    /// Number of declared arguments.
    #[must_use]
    pub fn argument_count(&self) -> usize {
        self.argument_types.len()
    }
}

/// Lookup of routine signatures by index and by name.
pub trait Routines {
    /// Signature of the routine with the given index.
    fn get(&self, index: u16) -> Option<&RoutineDecl>;

    /// Index of the routine with the given name.
    fn index_by_name(&self, name: &str) -> Option<u16>;

    /// Number of known routines.
    fn len(&self) -> usize;

    /// Returns `true` if no routines are known.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A `Vec`-backed [`Routines`] implementation.
///
/// ```rust
/// use ncsdecomp::script::{RoutineDecl, RoutineTable, Routines, VariableType};
///
/// let mut table = RoutineTable::new();
/// let random = table.add(RoutineDecl::new("Random", VariableType::Int, vec![VariableType::Int]));
/// assert_eq!(table.index_by_name("Random"), Some(random));
/// assert_eq!(table.get(random).map(|r| r.return_type), Some(VariableType::Int));
/// ```
#[derive(Debug, Clone, Default)]
pub struct RoutineTable {
    routines: Vec<RoutineDecl>,
    by_name: HashMap<String, u16>,
}

impl RoutineTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a table whose indices follow iteration order.
    pub fn from_decls(decls: impl IntoIterator<Item = RoutineDecl>) -> Self {
        let mut table = Self::new();
        for decl in decls {
            table.add(decl);
        }
        table
    }

    /// Appends a routine and returns its index.
    ///
    /// When two routines share a name, name lookup resolves to the first one. Routines beyond
    /// index `u16::MAX` are not addressable by `ACTION` and saturate to that index.
    pub fn add(&mut self, decl: RoutineDecl) -> u16 {
        let index = u16::try_from(self.routines.len()).unwrap_or(u16::MAX);
        self.by_name.entry(decl.name.clone()).or_insert(index);
        self.routines.push(decl);
        index
    }
}

impl Routines for RoutineTable {
    fn get(&self, index: u16) -> Option<&RoutineDecl> {
        self.routines.get(usize::from(index))
    }

    fn index_by_name(&self, name: &str) -> Option<u16> {
        self.by_name.get(name).copied()
    }

    fn len(&self) -> usize {
        self.routines.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn indices_follow_insertion_order() {
        let table = RoutineTable::from_decls([
            RoutineDecl::new("Random", VariableType::Int, vec![VariableType::Int]),
            RoutineDecl::new("PrintString", VariableType::Void, vec![VariableType::String]),
            RoutineDecl::new("Random", VariableType::Float, vec![]),
        ]);

        assert_eq!(table.len(), 3);
        assert_eq!(table.index_by_name("PrintString"), Some(1));
        assert_eq!(table.index_by_name("Random"), Some(0));
        assert_eq!(table.index_by_name("Missing"), None);
        assert_eq!(
            table.get(1).and_then(|r| r.argument_type(0)),
            Some(VariableType::String)
        );
        assert!(table.get(3).is_none());
    }
}
