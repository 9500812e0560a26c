//! The AST node model: tagged-union statement and expression
//! nodes, each carrying a source span and a typed payload. Ownership is
//! tree-shaped — no parent pointers, no shared ownership (see DESIGN.md's
//! note on "Cyclic references").

pub mod expr;
pub mod stmt;
pub mod types;

pub use expr::{ExprKind, ExprNode};
pub use stmt::{BlockStmt, StmtKind, StmtNode};
pub use types::{Identifier, LiteralValue, NameRef, Type};
