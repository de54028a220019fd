//! Subdivision fractal (spec C5): a balanced, dithered subdivision tree
//! driven by an opaque density query, in a square (2D) and a prism (2D+Z)
//! variant. The two variants share an arena/loan-bookkeeping core (this
//! module) and differ in geometry, realized-volume formula, and curve
//! extraction (`square.rs`, `prism.rs`).
//!
//! The neighbor graph is cyclic (spec §9), so cells are addressed by dense
//! `usize` indices into a flat arena rather than by owned references —
//! splicing in a new neighbor link is just inserting an index, which never
//! invalidates any other cell's indices, satisfying the "index-stable
//! container" requirement without a literal doubly linked list.

pub mod prism;
pub mod square;

use std::collections::HashMap;

pub type CellId = usize;

#[derive(Debug, Clone, Default)]
pub(crate) struct LoanBook {
    outbound: HashMap<CellId, f64>,
}

impl LoanBook {
    pub fn owed_to(&self, neighbor: CellId) -> f64 {
        self.outbound.get(&neighbor).copied().unwrap_or(0.0)
    }

    pub fn total_outbound(&self) -> f64 {
        self.outbound.values().sum()
    }

    fn set(&mut self, neighbor: CellId, amount: f64) {
        if amount <= 0.0 {
            self.outbound.remove(&neighbor);
        } else {
            self.outbound.insert(neighbor, amount);
        }
    }

    fn add(&mut self, neighbor: CellId, amount: f64) {
        let current = self.owed_to(neighbor);
        self.set(neighbor, current + amount);
    }

    fn take_all(&mut self) -> Vec<(CellId, f64)> {
        self.outbound.drain().collect()
    }
}

/// Bookkeeping shared by every cell regardless of geometry variant.
///
/// The full tree down to `max_depth` is built up front (spec §4.5.1);
/// `children` records that static structure, while `realized` tracks the
/// *current cutting frontier* that balancing (§4.5.3) moves up and down.
/// A cell below the frontier still exists in the arena (its parent's
/// `children` still points to it) but is inert until activated.
#[derive(Debug, Clone)]
pub(crate) struct CellMeta {
    pub depth: u32,
    pub parent: Option<CellId>,
    pub children: Option<Vec<CellId>>,
    pub realized: bool,
    pub neighbors: Vec<CellId>,
    pub filled_volume_allowance: f64,
    pub minimally_required_density: f64,
    pub loans: LoanBook,
    pub is_dithered: bool,
}

impl CellMeta {
    pub fn new(depth: u32, parent: Option<CellId>, children: Option<Vec<CellId>>) -> Self {
        Self {
            depth,
            parent,
            children,
            realized: false,
            neighbors: Vec::new(),
            filled_volume_allowance: 0.0,
            minimally_required_density: 0.0,
            loans: LoanBook::default(),
            is_dithered: false,
        }
    }

    pub fn is_realized(&self) -> bool {
        self.realized
    }
}

/// What a neighbor currently owes this cell, found by scanning neighbors —
/// a loan is always recorded on the lender's own `LoanBook`, never mirrored
/// on the borrower (spec §4.5.3).
pub(crate) fn inbound_loans(metas: &[CellMeta], cell: CellId) -> Vec<(CellId, f64)> {
    metas[cell]
        .neighbors
        .iter()
        .filter_map(|&n| {
            let owed = metas[n].loans.owed_to(cell);
            (owed > 0.0).then_some((n, owed))
        })
        .collect()
}

pub(crate) fn value_balance(metas: &[CellMeta], cell: CellId, realized_volume: f64) -> f64 {
    let meta = &metas[cell];
    let inbound: f64 = inbound_loans(metas, cell).iter().map(|(_, v)| v).sum();
    meta.filled_volume_allowance - realized_volume - meta.loans.total_outbound() + inbound
}

/// A cell is "constrained" when a neighbor is shallower (bigger) than it —
/// subdividing further would violate the depth-difference invariant
/// relative to that neighbor (spec §8 property 5).
pub(crate) fn is_constrained(metas: &[CellMeta], cell: CellId) -> bool {
    metas[cell]
        .neighbors
        .iter()
        .any(|&n| metas[n].depth < metas[cell].depth)
}

/// Moves a loan from `from` to `to`, netting first against any existing
/// reverse loan so that `loan(A,B) * loan(B,A) = 0` always holds (spec §8
/// property 4).
pub(crate) fn issue_loan(metas: &mut [CellMeta], from: CellId, to: CellId, amount: f64) {
    if amount <= 0.0 {
        return;
    }
    let reverse = metas[to].loans.owed_to(from);
    if reverse > 0.0 {
        let offset = reverse.min(amount);
        metas[to].loans.set(from, reverse - offset);
        let remainder = amount - offset;
        if remainder > 0.0 {
            metas[from].loans.add(to, remainder);
        }
    } else {
        metas[from].loans.add(to, amount);
    }
}

/// Splits every loan currently owed to `parent` equally across `children`,
/// redirecting the lenders' records (spec §4.5.3: subdividing "transfers
/// all inbound loans equally to the new children"). The parent's own
/// outbound loans are dropped, not inherited — per the design note, this
/// preserves the naive equal-share bias rather than fixing it.
pub(crate) fn redistribute_inbound_loans_to_children(
    metas: &mut [CellMeta],
    parent: CellId,
    children: &[CellId],
) {
    if children.is_empty() {
        return;
    }
    for (lender, amount) in inbound_loans(metas, parent) {
        metas[lender].loans.set(parent, 0.0);
        let share = amount / children.len() as f64;
        for &child in children {
            metas[lender].loans.add(child, share);
        }
    }
    metas[parent].loans.take_all();
}

/// Rebalances negative child balances by introducing loans from
/// positive-balance siblings, proportional to each donor's surplus. Two
/// passes suffice: any child's debt is bounded by the most distant
/// sibling's surplus (spec §4.5.3).
pub(crate) fn solve_child_debts(metas: &mut [CellMeta], children: &[CellId], realized_volumes: &[f64]) {
    for _ in 0..2 {
        let balances: Vec<f64> = children
            .iter()
            .zip(realized_volumes)
            .map(|(&c, &rv)| value_balance(metas, c, rv))
            .collect();
        let mut changed = false;
        for (i, &child) in children.iter().enumerate() {
            if balances[i] >= 0.0 {
                continue;
            }
            let deficit = -balances[i];
            let donors: Vec<(CellId, f64)> = children
                .iter()
                .enumerate()
                .filter(|&(j, _)| j != i && balances[j] > 0.0)
                .map(|(j, &c)| (c, balances[j]))
                .collect();
            let total_surplus: f64 = donors.iter().map(|(_, s)| s).sum();
            if total_surplus <= 0.0 {
                continue;
            }
            for (donor, surplus) in donors {
                let share = deficit * (surplus / total_surplus);
                issue_loan(metas, donor, child, share);
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
}

/// The subdivision and loan phases operate identically on either geometry
/// variant; only geometric subdivision and realized-volume computation
/// differ (spec §4.5.3).
pub(crate) trait SubdivisionTree {
    fn metas(&self) -> &[CellMeta];
    fn metas_mut(&mut self) -> &mut [CellMeta];
    fn realized_volume(&self, id: CellId) -> f64;
    fn max_depth(&self) -> u32;
    fn realized_ids(&self) -> Vec<CellId>;
    /// Moves the cut frontier at `id` down one level: `id` stops being
    /// realized and its (already pre-built) children start being, and
    /// their ids are returned.
    fn subdivide(&mut self, id: CellId) -> Vec<CellId>;
}

pub(crate) fn balance(tree: &mut dyn SubdivisionTree) {
    loop {
        let subdivided = subdivision_phase(tree);
        let loaned = loan_phase(tree);
        if !subdivided && !loaned {
            break;
        }
    }
}

fn subdivision_phase(tree: &mut dyn SubdivisionTree) -> bool {
    let mut realized = tree.realized_ids();
    realized.sort_by_key(|&id| tree.metas()[id].depth);

    let mut changed = false;
    for id in realized {
        if !tree.metas()[id].is_realized() {
            continue; // subdivided earlier this pass
        }
        let depth = tree.metas()[id].depth;
        if depth >= tree.max_depth() {
            continue;
        }
        let balance = value_balance(tree.metas(), id, tree.realized_volume(id));
        if balance >= 0.0 && !is_constrained(tree.metas(), id) {
            let children = tree.subdivide(id);
            let volumes: Vec<f64> = children.iter().map(|&c| tree.realized_volume(c)).collect();
            redistribute_inbound_loans_to_children(tree.metas_mut(), id, &children);
            solve_child_debts(tree.metas_mut(), &children, &volumes);
            changed = true;
        }
    }
    changed
}

fn loan_phase(tree: &mut dyn SubdivisionTree) -> bool {
    let mut realized = tree.realized_ids();
    realized.sort_by(|&a, &b| tree.metas()[b].depth.cmp(&tree.metas()[a].depth));

    let mut changed = false;
    for id in realized {
        let rv = tree.realized_volume(id);
        let bal = value_balance(tree.metas(), id, rv);
        if bal <= 0.0 || !is_constrained(tree.metas(), id) {
            continue;
        }
        let constraining: Vec<CellId> = tree.metas()[id]
            .neighbors
            .iter()
            .copied()
            .filter(|&n| tree.metas()[n].depth < tree.metas()[id].depth)
            .collect();
        if constraining.is_empty() {
            continue;
        }
        let share = bal / constraining.len() as f64;
        for n in constraining {
            issue_loan(tree.metas_mut(), id, n, share);
        }
        changed = true;
    }
    changed
}
