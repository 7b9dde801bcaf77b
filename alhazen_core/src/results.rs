//! Per-condition participant results returned by a run.

use serde::Serialize;

/// Results of one condition, ordered by participant index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConditionResults<C, O> {
    /// Condition value (`None` for the null condition)
    pub condition: Option<C>,

    /// One entry per participant, index `i` holding participant `i`
    pub results: Vec<O>,
}

/// Mapping from condition to its ordered participant results.
///
/// Conditions appear in sweep order. Lookup is by value, so conditions only
/// need `PartialEq` (floating-point sweeps work).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunResults<C, O> {
    groups: Vec<ConditionResults<C, O>>,
}

impl<C, O> RunResults<C, O> {
    pub fn new(groups: Vec<ConditionResults<C, O>>) -> Self {
        Self { groups }
    }

    /// Number of conditions.
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Total number of retained participant results.
    pub fn total(&self) -> usize {
        self.groups.iter().map(|g| g.results.len()).sum()
    }

    /// Iterates over conditions in sweep order.
    pub fn iter(&self) -> impl Iterator<Item = &ConditionResults<C, O>> {
        self.groups.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConditionResults<C, O>> {
        self.groups.iter_mut()
    }

    /// All results, condition by condition, each in participant order.
    pub fn into_values(self) -> Vec<O> {
        self.groups.into_iter().flat_map(|g| g.results).collect()
    }
}

impl<C: PartialEq, O> RunResults<C, O> {
    /// Results for `condition`, or `None` if it was not part of the sweep.
    ///
    /// Pass `None` to look up the null condition.
    pub fn get(&self, condition: Option<&C>) -> Option<&[O]> {
        self.groups
            .iter()
            .find(|g| g.condition.as_ref() == condition)
            .map(|g| g.results.as_slice())
    }
}

impl<C, O> IntoIterator for RunResults<C, O> {
    type Item = ConditionResults<C, O>;
    type IntoIter = std::vec::IntoIter<ConditionResults<C, O>>;

    fn into_iter(self) -> Self::IntoIter {
        self.groups.into_iter()
    }
}
