//! Source coordinates and the node wrapper.

use std::fmt;
use std::rc::Rc;

/// Location of a grammar symbol in the input.
///
/// Columns are 1-based and count characters since the last newline, the way
/// diagnostics conventionally report them.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Coord {
    pub file: Rc<str>,
    pub line: usize,
    pub column: usize,
}

impl Coord {
    pub fn new(file: Rc<str>, line: usize, column: usize) -> Coord {
        Coord { file, line, column }
    }

    /// Placeholder coordinate for synthesized nodes.
    pub fn none() -> Coord {
        Coord {
            file: Rc::from(""),
            line: 0,
            column: 0,
        }
    }
}

impl Default for Coord {
    fn default() -> Coord {
        Coord::none()
    }
}

impl fmt::Display for Coord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.file, self.line)?;
        if self.column > 0 {
            write!(f, "({})", self.column)?;
        }
        Ok(())
    }
}

/// An AST element paired with the coordinate it came from.
///
/// Equality and hashing look only at the element itself: two trees parsed
/// from differently-placed but identical source compare equal.
#[derive(Debug, Clone)]
pub struct Node<T> {
    pub node: T,
    pub coord: Coord,
}

impl<T> Node<T> {
    pub fn new(node: T, coord: Coord) -> Node<T> {
        Node { node, coord }
    }
}

impl<T: PartialEq> PartialEq for Node<T> {
    fn eq(&self, other: &Node<T>) -> bool {
        self.node == other.node
    }
}

impl<T: Eq> Eq for Node<T> {}

impl<T: std::hash::Hash> std::hash::Hash for Node<T> {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.node.hash(state);
    }
}
