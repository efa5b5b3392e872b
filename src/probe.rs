//! Exhaustive certainty checks backed by a SAT solver.
//!
//! The subset rule runs one pass per observation and can leave provable
//! facts undiscovered. Encoding every live sentence as a CNF formula and
//! asking whether the opposite status is satisfiable settles any single
//! cell exactly, without mutating the knowledge base.

use tracing::debug;
use varisat::{CnfFormula, ExtendFormula, Lit, Solver};

use crate::error::{Contradiction, KnowledgeError, KnowledgeResult};
use crate::knowledge::KnowledgeBase;
use crate::Cell;

/// Verdict for a single probed cell.
#[derive(Eq, PartialEq, Debug)]
pub enum ProbeResult {
    /// Every consistent mine placement leaves the cell mine-free.
    Safe,

    /// Every consistent mine placement puts a mine on the cell.
    Unsafe,

    /// Both outcomes are consistent with current knowledge.
    Unknown,
}

/// Decide with certainty whether `cell` is safe, a mine, or undetermined
/// under every mine placement consistent with the knowledge base.
pub fn check_cell(kb: &KnowledgeBase, cell: Cell) -> KnowledgeResult<ProbeResult> {
    if kb.safes().contains(&cell) {
        return Ok(ProbeResult::Safe);
    }
    if kb.mines().contains(&cell) {
        return Ok(ProbeResult::Unsafe);
    }

    let mine_consistent = satisfiable(kb, cell, true)?;
    let safe_consistent = satisfiable(kb, cell, false)?;

    let verdict = match (mine_consistent, safe_consistent) {
        (false, false) => return Err(Contradiction::Unsatisfiable.into()),
        (false, true) => ProbeResult::Safe,
        (true, false) => ProbeResult::Unsafe,
        (true, true) => ProbeResult::Unknown,
    };
    debug!(row = cell.0, col = cell.1, verdict = ?verdict, "probe answered");
    Ok(verdict)
}

/// Whether any mine placement satisfies every live sentence with `cell`
/// pinned to `as_mine`.
fn satisfiable(kb: &KnowledgeBase, cell: Cell, as_mine: bool) -> KnowledgeResult<bool> {
    let width = kb.width();
    // Dimacs variables must be nonzero, hence the shift by one.
    let mine_lit = |(row, col): Cell, is_mine: bool| -> Lit {
        let var = (row * width + col) as isize + 1;
        Lit::from_dimacs(if is_mine { var } else { -var })
    };

    let mut formula = CnfFormula::new();
    formula.add_clause(&[mine_lit(cell, as_mine)]);

    for sentence in kb.sentences() {
        let cells: Vec<Cell> = sentence.cells().iter().copied().collect();
        let n = cells.len();
        let count = sentence.count();

        // At most `count` mines: any count+1 of the cells include a safe one.
        for subset in combinations(&cells, count + 1) {
            let clause: Vec<Lit> = subset.iter().map(|&c| mine_lit(c, false)).collect();
            formula.add_clause(&clause);
        }
        // At least `count` mines: any n-count+1 of the cells include a mine.
        for subset in combinations(&cells, n - count + 1) {
            let clause: Vec<Lit> = subset.iter().map(|&c| mine_lit(c, true)).collect();
            formula.add_clause(&clause);
        }
    }

    let mut solver = Solver::new();
    solver.add_formula(&formula);
    solver
        .solve()
        .map_err(|err| KnowledgeError::Solver(err.to_string()))
}

/// All size-`k` subsets of `cells`, in input order. Sentence cell sets are
/// bounded by the eight-neighbor limit, so the expansion stays small.
fn combinations(cells: &[Cell], k: usize) -> Vec<Vec<Cell>> {
    if k == 0 {
        return vec![vec![]];
    }
    if cells.len() < k {
        return vec![];
    }
    let head = cells[0];
    let tail = &cells[1..];
    let mut result: Vec<Vec<Cell>> = combinations(tail, k - 1)
        .into_iter()
        .map(|mut subset| {
            subset.insert(0, head);
            subset
        })
        .collect();
    result.extend(combinations(tail, k));
    result
}
