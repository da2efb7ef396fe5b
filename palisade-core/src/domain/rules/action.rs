// palisade-core/src/domain/rules/action.rs

use crate::domain::rules::rule::Action;

/// Concrete effect of a rule on one record (or on the run, for `Abort`).
///
/// Ordering is severity: `Keep < Drop < Abort`. When several rules apply to
/// the same record, the most severe disposition wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Disposition {
    Keep,
    Drop,
    Abort,
}

impl Disposition {
    /// Combine two dispositions, keeping the most severe one.
    pub fn escalate(self, other: Disposition) -> Disposition {
        self.max(other)
    }
}

/// Map a rule's configured action and its evaluation outcome to an effect.
///
/// A passing record is always kept, whatever the action. `ignore` keeps the
/// record even on failure (it is only annotated), `drop` excludes it,
/// `fail` aborts the run.
pub fn resolve(action: Action, record_failed: bool) -> Disposition {
    if !record_failed {
        return Disposition::Keep;
    }
    match action {
        Action::Ignore => Disposition::Keep,
        Action::Drop => Disposition::Drop,
        Action::Fail => Disposition::Abort,
    }
}
