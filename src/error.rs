//! Error types for the deduction engine.

use thiserror::Error;

use crate::{Cell, Col, Row};

/// Errors surfaced by the knowledge base.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KnowledgeError {
    /// The observation stream is inconsistent, or an inference went wrong.
    /// Fatal for the current game.
    #[error("contradiction in the knowledge base: {0}")]
    Contradiction(#[from] Contradiction),

    /// An observation was recorded for a cell outside the grid.
    #[error("cell {cell:?} is outside the {height}x{width} grid")]
    OutOfBounds {
        cell: Cell,
        height: usize,
        width: usize,
    },

    /// An observation was recorded twice for the same cell.
    #[error("cell {cell:?} has already been revealed")]
    AlreadyRevealed { cell: Cell },

    /// The SAT backend failed while answering a probe.
    #[error("sat solver failure: {0}")]
    Solver(String),
}

/// The specific inconsistency found while folding knowledge together.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Contradiction {
    /// A cell is forced to be both a mine and safe.
    #[error("cell ({0}, {1}) is forced to be both a mine and safe")]
    ConflictingFact(Row, Col),

    /// A constraint demands more mines than it has cells.
    #[error("a constraint demands {count} mines among {cells} cells")]
    ImpossibleCount { cells: usize, count: usize },

    /// A constraint ran out of cells with mines still unaccounted for.
    #[error("a constraint over no cells still carries {count} mines")]
    DanglingCount { count: usize },

    /// Two nested constraints demand incompatible mine counts.
    #[error("a nested constraint expects {inner} mines where at most {outer} fit")]
    NestedCountExceeded { inner: usize, outer: usize },

    /// No mine placement satisfies the recorded constraints.
    #[error("no mine placement satisfies the recorded constraints")]
    Unsatisfiable,
}

/// Result type for knowledge-base operations.
pub type KnowledgeResult<T> = Result<T, KnowledgeError>;
