//! Workflow results.
//!
//! Carry a workflow stage's result together with the propagation ledger it
//! produced and the names of the tasks it ran.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::ledger::{LinkedAccountKey, PropagationByResource};

/// Result of a workflow stage plus the resources it touched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowResult<T> {
    result: T,
    prop_by_res: PropagationByResource<String>,
    performed_tasks: BTreeSet<String>,
}

impl<T> WorkflowResult<T> {
    pub fn new(
        result: T,
        prop_by_res: PropagationByResource<String>,
        performed_tasks: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            result,
            prop_by_res,
            performed_tasks: performed_tasks.into_iter().map(Into::into).collect(),
        }
    }

    pub fn result(&self) -> &T {
        &self.result
    }

    pub fn prop_by_res(&self) -> &PropagationByResource<String> {
        &self.prop_by_res
    }

    pub fn prop_by_res_mut(&mut self) -> &mut PropagationByResource<String> {
        &mut self.prop_by_res
    }

    pub fn performed_tasks(&self) -> &BTreeSet<String> {
        &self.performed_tasks
    }

    /// Take the parts apart.
    pub fn into_parts(self) -> (T, PropagationByResource<String>, BTreeSet<String>) {
        (self.result, self.prop_by_res, self.performed_tasks)
    }

    /// Replace the result value, keeping ledger and tasks.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> WorkflowResult<U> {
        WorkflowResult {
            result: f(self.result),
            prop_by_res: self.prop_by_res,
            performed_tasks: self.performed_tasks,
        }
    }
}

/// [`WorkflowResult`] for users, with a second ledger for linked accounts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserWorkflowResult<T> {
    #[serde(flatten)]
    inner: WorkflowResult<T>,
    prop_by_linked_account: PropagationByResource<LinkedAccountKey>,
}

impl<T> UserWorkflowResult<T> {
    pub fn new(
        result: T,
        prop_by_res: PropagationByResource<String>,
        prop_by_linked_account: PropagationByResource<LinkedAccountKey>,
        performed_tasks: impl IntoIterator<Item = impl Into<String>>,
    ) -> Self {
        Self {
            inner: WorkflowResult::new(result, prop_by_res, performed_tasks),
            prop_by_linked_account,
        }
    }

    pub fn result(&self) -> &T {
        self.inner.result()
    }

    pub fn prop_by_res(&self) -> &PropagationByResource<String> {
        self.inner.prop_by_res()
    }

    pub fn prop_by_res_mut(&mut self) -> &mut PropagationByResource<String> {
        self.inner.prop_by_res_mut()
    }

    pub fn prop_by_linked_account(&self) -> &PropagationByResource<LinkedAccountKey> {
        &self.prop_by_linked_account
    }

    pub fn prop_by_linked_account_mut(&mut self) -> &mut PropagationByResource<LinkedAccountKey> {
        &mut self.prop_by_linked_account
    }

    pub fn performed_tasks(&self) -> &BTreeSet<String> {
        self.inner.performed_tasks()
    }

    /// The result without the linked-account ledger.
    pub fn into_workflow_result(self) -> WorkflowResult<T> {
        self.inner
    }
}
