//! The knowledge base: certain facts plus live sentences, and the
//! inference loop that keeps them mutually consistent.

use std::collections::{BTreeSet, HashSet};

use datafrog::Iteration;
use rand::prelude::*;
use tracing::{debug, trace};

use crate::error::{Contradiction, KnowledgeError, KnowledgeResult};
use crate::sentence::Sentence;
use crate::Cell;

/// A certain fact about a single cell.
#[derive(Copy, Clone, Debug, Ord, PartialOrd, PartialEq, Eq)]
enum Fact {
    Mine,
    Safe,
}

/// Everything one engine instance knows about a single game.
///
/// `moves_made`, `mines` and `safes` only ever grow; `sentences` grows with
/// observations and derived facts and shrinks as constraints resolve. One
/// instance is owned and mutated by a single caller; independent games use
/// independent instances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KnowledgeBase {
    height: usize,
    width: usize,
    moves_made: BTreeSet<Cell>,
    mines: BTreeSet<Cell>,
    safes: BTreeSet<Cell>,
    sentences: Vec<Sentence>,
}

impl KnowledgeBase {
    /// Create an empty knowledge base for a `height` x `width` grid.
    pub fn new(height: usize, width: usize) -> KnowledgeBase {
        KnowledgeBase {
            height,
            width,
            moves_made: BTreeSet::new(),
            mines: BTreeSet::new(),
            safes: BTreeSet::new(),
            sentences: Vec::new(),
        }
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn width(&self) -> usize {
        self.width
    }

    /// Cells known with certainty to be mines.
    pub fn mines(&self) -> &BTreeSet<Cell> {
        &self.mines
    }

    /// Cells known with certainty to be safe.
    pub fn safes(&self) -> &BTreeSet<Cell> {
        &self.safes
    }

    /// Cells already revealed through [`record_observation`].
    ///
    /// [`record_observation`]: KnowledgeBase::record_observation
    pub fn moves_made(&self) -> &BTreeSet<Cell> {
        &self.moves_made
    }

    /// The live constraints. Resolved sentences are pruned, so every entry
    /// here still says something about unknown cells.
    pub fn sentences(&self) -> &[Sentence] {
        &self.sentences
    }

    /// Fold in one observation from the harness: `cell` was revealed and
    /// touches exactly `count` mines among its neighbors.
    ///
    /// Records the move, marks the cell safe, constrains the full neighbor
    /// set, then runs propagation, one subset-derivation pass, and
    /// propagation again. On `Err` the base is left in its last consistent
    /// form before the offending mark.
    pub fn record_observation(&mut self, cell: Cell, count: usize) -> KnowledgeResult<()> {
        if !self.in_bounds(cell) {
            return Err(KnowledgeError::OutOfBounds {
                cell,
                height: self.height,
                width: self.width,
            });
        }
        if self.moves_made.contains(&cell) {
            return Err(KnowledgeError::AlreadyRevealed { cell });
        }
        debug!(row = cell.0, col = cell.1, count, "recording observation");

        self.moves_made.insert(cell);
        self.mark_safe(cell)?;

        // The sentence covers every in-bounds neighbor, including ones
        // already resolved; propagation strips those, not construction.
        let neighbors = self.neighbors(cell);
        if count > neighbors.len() {
            return Err(Contradiction::ImpossibleCount {
                cells: neighbors.len(),
                count,
            }
            .into());
        }
        let sentence = Sentence::new(neighbors, count);
        if !self.sentences.contains(&sentence) {
            self.sentences.push(sentence);
        }

        self.propagate()?;
        self.derive_subsets()?;
        self.propagate()?;

        debug!(
            mines = self.mines.len(),
            safes = self.safes.len(),
            sentences = self.sentences.len(),
            "observation folded in"
        );
        Ok(())
    }

    /// Record that `cell` is certainly a mine and fold the fact into every
    /// live sentence. Idempotent.
    pub fn mark_mine(&mut self, cell: Cell) -> KnowledgeResult<()> {
        if self.safes.contains(&cell) {
            return Err(Contradiction::ConflictingFact(cell.0, cell.1).into());
        }
        // Validate against every sentence before touching any of them, so
        // a contradiction leaves the base unchanged.
        if let Some(sentence) = self.sentences.iter().find(|s| s.refutes_mine(cell)) {
            trace!(%sentence, row = cell.0, col = cell.1, "mine mark refuted");
            return Err(Contradiction::ConflictingFact(cell.0, cell.1).into());
        }
        self.mines.insert(cell);
        for sentence in &mut self.sentences {
            sentence.mark_mine(cell)?;
        }
        Ok(())
    }

    /// Record that `cell` is certainly safe and fold the fact into every
    /// live sentence. Idempotent.
    pub fn mark_safe(&mut self, cell: Cell) -> KnowledgeResult<()> {
        if self.mines.contains(&cell) {
            return Err(Contradiction::ConflictingFact(cell.0, cell.1).into());
        }
        if let Some(sentence) = self.sentences.iter().find(|s| s.refutes_safe(cell)) {
            trace!(%sentence, row = cell.0, col = cell.1, "safe mark refuted");
            return Err(Contradiction::ConflictingFact(cell.0, cell.1).into());
        }
        self.safes.insert(cell);
        for sentence in &mut self.sentences {
            sentence.mark_safe(cell)?;
        }
        Ok(())
    }

    /// A cell known to be safe that has not been played yet.
    pub fn safe_move(&self) -> Option<Cell> {
        self.safes
            .iter()
            .find(|cell| !self.moves_made.contains(cell))
            .copied()
    }

    /// A uniformly random cell that is neither played nor a known mine.
    /// `None` once no such cell exists.
    pub fn random_move<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<Cell> {
        let eligible: Vec<Cell> = (0..self.height)
            .flat_map(|row| (0..self.width).map(move |col| (row, col)))
            .filter(|cell| !self.moves_made.contains(cell) && !self.mines.contains(cell))
            .collect();
        eligible.choose(rng).copied()
    }

    fn in_bounds(&self, cell: Cell) -> bool {
        cell.0 < self.height && cell.1 < self.width
    }

    /// All in-bounds cells within one row and one column of `cell`,
    /// excluding `cell` itself.
    fn neighbors(&self, (row, col): Cell) -> BTreeSet<Cell> {
        let mut cells = BTreeSet::new();
        for r in row.saturating_sub(1)..=(row + 1).min(self.height - 1) {
            for c in col.saturating_sub(1)..=(col + 1).min(self.width - 1) {
                if (r, c) != (row, col) {
                    cells.insert((r, c));
                }
            }
        }
        cells
    }

    /// Drive the per-sentence rules to a fixed point.
    ///
    /// The iteration variable holds every `(cell, fact)` pair applied so
    /// far, seeded with the already-confirmed sets so sentences recorded
    /// after those facts still hear about them. Each round applies the
    /// facts that became known in the previous round to every sentence,
    /// prunes resolved sentences, and scans the survivors for newly
    /// certain cells. Since datafrog dedups against everything already
    /// applied, `changed` goes false exactly when a full pass learns
    /// nothing new.
    pub(crate) fn propagate(&mut self) -> KnowledgeResult<()> {
        let mut iteration = Iteration::new();
        let facts = iteration.variable::<(Cell, Fact)>("facts");

        let seeds: Vec<(Cell, Fact)> = self
            .mines
            .iter()
            .map(|&cell| (cell, Fact::Mine))
            .chain(self.safes.iter().map(|&cell| (cell, Fact::Safe)))
            .collect();
        facts.extend(seeds);

        while iteration.changed() {
            let fresh: Vec<(Cell, Fact)> = facts.recent.borrow().elements.clone();
            for (cell, fact) in fresh {
                match fact {
                    Fact::Mine => self.mark_mine(cell)?,
                    Fact::Safe => self.mark_safe(cell)?,
                }
            }

            self.prune_resolved()?;

            let mut derived: Vec<(Cell, Fact)> = Vec::new();
            for sentence in &self.sentences {
                derived.extend(sentence.known_mines().into_iter().map(|c| (c, Fact::Mine)));
                derived.extend(sentence.known_safes().into_iter().map(|c| (c, Fact::Safe)));
            }
            facts.extend(derived);
        }

        facts.complete();
        Ok(())
    }

    /// One pass of the subset rule: for sentences `a ⊆ b`, the cells `b`
    /// has beyond `a` carry exactly `b.count - a.count` mines.
    ///
    /// A single pass per observation; anything it leaves on the table is
    /// recovered on a later observation or by the probe module.
    pub(crate) fn derive_subsets(&mut self) -> KnowledgeResult<()> {
        let mut derived: Vec<Sentence> = Vec::new();
        for (i, s1) in self.sentences.iter().enumerate() {
            for (j, s2) in self.sentences.iter().enumerate() {
                if i == j || !s1.cells().is_subset(s2.cells()) {
                    continue;
                }
                if s1.count() > s2.count() {
                    return Err(Contradiction::NestedCountExceeded {
                        inner: s1.count(),
                        outer: s2.count(),
                    }
                    .into());
                }
                let cells: BTreeSet<Cell> = s2.cells().difference(s1.cells()).copied().collect();
                let count = s2.count() - s1.count();
                if cells.is_empty() {
                    if count != 0 {
                        return Err(Contradiction::DanglingCount { count }.into());
                    }
                    continue;
                }
                let candidate = Sentence::new(cells, count);
                if !self.sentences.contains(&candidate) && !derived.contains(&candidate) {
                    trace!(%candidate, "derived sentence");
                    derived.push(candidate);
                }
            }
        }
        if !derived.is_empty() {
            debug!(derived = derived.len(), "subset rule produced new sentences");
            self.sentences.extend(derived);
        }
        Ok(())
    }

    /// Drop sentences whose cells have emptied, plus any that converged to
    /// a value-equal duplicate of an earlier one. An emptied sentence with
    /// mines still unaccounted for means the observation stream was
    /// inconsistent.
    fn prune_resolved(&mut self) -> KnowledgeResult<()> {
        for sentence in &self.sentences {
            if sentence.is_resolved() && sentence.count() != 0 {
                return Err(Contradiction::DanglingCount {
                    count: sentence.count(),
                }
                .into());
            }
        }
        let before = self.sentences.len();
        let mut seen: HashSet<Sentence> = HashSet::new();
        self.sentences
            .retain(|sentence| !sentence.is_resolved() && seen.insert(sentence.clone()));
        let pruned = before - self.sentences.len();
        if pruned > 0 {
            trace!(pruned, live = self.sentences.len(), "dropped resolved sentences");
        }
        Ok(())
    }

    #[cfg(test)]
    pub(crate) fn push_sentence(&mut self, sentence: Sentence) {
        self.sentences.push(sentence);
    }
}
