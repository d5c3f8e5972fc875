use super::{ConcurrencyId, Operation};

/// Transforms `Split(a, b)` against a concurrent operation `against`.
/// `b` runs after `a` has already taken effect locally, so it must be
/// transformed against `against` *as it looks once `a` has happened* —
/// computed by transforming `against` itself against `a`.
pub(super) fn transform_self(
    a: &Operation,
    b: &Operation,
    against: &Operation,
    self_lcs: Option<&Operation>,
    against_lcs: Option<&Operation>,
    concurrency_id: Option<ConcurrencyId>,
) -> Operation {
    let new_a = a.transform(against, self_lcs, against_lcs, concurrency_id);
    let against_after_a = against.transform(a, against_lcs, self_lcs, concurrency_id);
    let new_b = b.transform(&against_after_a, self_lcs, against_lcs, concurrency_id);
    Operation::Split(Box::new(new_a), Box::new(new_b))
}

/// Transforms a plain operation `op` against a concurrent `Split(a, b)`:
/// `a` and `b` apply in sequence at the other site, so `op` must be walked
/// through both transforms in turn.
pub(super) fn transform_against(
    op: &Operation,
    a: &Operation,
    b: &Operation,
    self_lcs: Option<&Operation>,
    against_lcs: Option<&Operation>,
    concurrency_id: Option<ConcurrencyId>,
) -> Operation {
    let after_a = op.transform(a, self_lcs, against_lcs, concurrency_id);
    after_a.transform(b, self_lcs, against_lcs, concurrency_id)
}

/// Flattens a (possibly nested) `Split` tree into its leaves, in the order
/// they must be applied.
pub fn unsplit(op: Operation) -> Vec<Operation> {
    match op {
        Operation::Split(a, b) => {
            let mut out = unsplit(*a);
            out.extend(unsplit(*b));
            out
        }
        other => vec![other],
    }
}
