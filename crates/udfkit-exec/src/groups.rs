//! Per-group aggregate states
//!
//! States live in an arena addressed by [`GroupId`]. Producing a group's
//! output or merging it into another group releases its slot; touching a
//! released slot is an error rather than a silent reuse.

use tracing::trace;
use udfkit_ir::Value;

use crate::aggregate::{AggregatePlan, AggregateState};
use crate::error::ExecError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct GroupId(pub usize);

pub struct GroupStates<'p, 'a> {
    plan: &'p AggregatePlan<'a>,
    slots: Vec<Option<AggregateState>>,
}

impl<'p, 'a> GroupStates<'p, 'a> {
    pub fn new(plan: &'p AggregatePlan<'a>) -> Self {
        Self {
            plan,
            slots: Vec::new(),
        }
    }

    /// Creates a fresh state for a new group
    pub fn allocate(&mut self) -> GroupId {
        self.slots.push(Some(self.plan.init()));
        GroupId(self.slots.len() - 1)
    }

    fn slot(&mut self, id: GroupId) -> Result<&mut AggregateState, ExecError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(ExecError::StateReleased(id.0))
    }

    fn take(&mut self, id: GroupId) -> Result<AggregateState, ExecError> {
        self.slots
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(ExecError::StateReleased(id.0))
    }

    pub fn update(&mut self, id: GroupId, row: &[Value]) -> Result<(), ExecError> {
        let plan = self.plan;
        plan.update(self.slot(id)?, row)
    }

    /// Folds `from` into `into`; `from` is released
    pub fn merge(&mut self, into: GroupId, from: GroupId) -> Result<(), ExecError> {
        if !self.plan.supports_merge() {
            return Err(ExecError::MergeUnsupported(self.plan.name().to_string()));
        }
        if into == from {
            self.slot(into)?;
            return Ok(());
        }
        let other = self.take(from)?;
        trace!(into = into.0, from = from.0, "merging group states");
        let plan = self.plan;
        plan.merge(self.slot(into)?, other)
    }

    /// Renders the group's result and releases its state
    pub fn output(&mut self, id: GroupId) -> Result<Value, ExecError> {
        let state = self.take(id)?;
        self.plan.finish(state)
    }

    /// Number of groups whose state has not been released
    pub fn live(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use udfkit_ir::{DataType, TypeAttr};
    use udfkit_registry::default_library;

    #[test]
    fn test_output_releases_state() {
        let plan =
            AggregatePlan::compile(default_library(), "count", &[TypeAttr::new(DataType::Int64)])
                .unwrap();
        let mut groups = GroupStates::new(&plan);
        let a = groups.allocate();
        let b = groups.allocate();
        groups.update(a, &[Value::Int64(7)]).unwrap();
        groups.update(b, &[Value::Int64(8)]).unwrap();
        groups.update(b, &[Value::Int64(9)]).unwrap();

        assert_eq!(groups.output(b).unwrap(), Value::Int64(2));
        assert_eq!(groups.live(), 1);
        assert!(matches!(groups.output(b), Err(ExecError::StateReleased(1))));
        assert!(matches!(
            groups.update(b, &[Value::Int64(1)]),
            Err(ExecError::StateReleased(1))
        ));
        assert!(matches!(groups.output(GroupId(5)), Err(ExecError::StateReleased(5))));
    }

    #[test]
    fn test_merge_releases_source() {
        let plan =
            AggregatePlan::compile(default_library(), "sum", &[TypeAttr::new(DataType::Double)])
                .unwrap();
        let mut groups = GroupStates::new(&plan);
        let a = groups.allocate();
        let b = groups.allocate();
        groups.update(a, &[Value::Double(1.5)]).unwrap();
        groups.update(b, &[Value::Double(2.0)]).unwrap();
        groups.merge(a, b).unwrap();

        assert_eq!(groups.live(), 1);
        assert!(matches!(groups.merge(a, b), Err(ExecError::StateReleased(1))));
        assert_eq!(groups.output(a).unwrap(), Value::Double(3.5));
        assert_eq!(groups.len(), 2);
    }
}
