// src/nodes/node.rs

use std::fmt;

use crate::types::NodeId;

/// How node ids map to hostnames on the testbed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeNaming {
    pub control_prefix: String,
    pub ssh_prefix: String,
}

impl NodeNaming {
    pub fn new(control_prefix: &str, ssh_prefix: &str) -> Self {
        Self {
            control_prefix: control_prefix.to_string(),
            ssh_prefix: ssh_prefix.to_string(),
        }
    }

    pub fn control_hostname(&self, id: NodeId) -> String {
        format!("{}{:02}", self.control_prefix, id)
    }

    pub fn ssh_hostname(&self, id: NodeId) -> String {
        format!("{}{:02}", self.ssh_prefix, id)
    }
}

impl Default for NodeNaming {
    fn default() -> Self {
        Self::new("reboot", "fit")
    }
}

/// Result of the last operation dispatched to a node within a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeOutcome {
    /// Completed with the expected positive condition.
    Succeeded,
    /// Completed, but the remote check exited with a non-zero status.
    NonZero(i32),
    /// The operation raised an error.
    Errored(String),
    /// The phase deadline elapsed before the operation reported back.
    TimedOut,
}

impl NodeOutcome {
    pub fn from_unit(result: anyhow::Result<()>) -> Self {
        match result {
            Ok(()) => NodeOutcome::Succeeded,
            Err(e) => NodeOutcome::Errored(format!("{e:#}")),
        }
    }

    pub fn from_status(result: anyhow::Result<i32>) -> Self {
        match result {
            Ok(0) => NodeOutcome::Succeeded,
            Ok(code) => NodeOutcome::NonZero(code),
            Err(e) => NodeOutcome::Errored(format!("{e:#}")),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, NodeOutcome::Succeeded)
    }
}

/// A node as seen by one phase.
///
/// `NodeRef`s are built fresh at the start of every phase from the live
/// selection and dropped at its end; nothing carries over between phases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRef {
    pub id: NodeId,
    control_hostname: String,
    ssh_hostname: String,
    outcome: Option<NodeOutcome>,
}

impl NodeRef {
    pub fn new(id: NodeId, naming: &NodeNaming) -> Self {
        Self {
            id,
            control_hostname: naming.control_hostname(id),
            ssh_hostname: naming.ssh_hostname(id),
            outcome: None,
        }
    }

    pub fn control_hostname(&self) -> &str {
        &self.control_hostname
    }

    pub fn ssh_hostname(&self) -> &str {
        &self.ssh_hostname
    }

    /// Outcome of the operation dispatched in the current phase, if it has
    /// been collected.
    pub fn outcome(&self) -> Option<&NodeOutcome> {
        self.outcome.as_ref()
    }

    pub(crate) fn set_outcome(&mut self, outcome: NodeOutcome) {
        self.outcome = Some(outcome);
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.ssh_hostname)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hostnames_are_zero_padded() {
        let node = NodeRef::new(7, &NodeNaming::default());
        assert_eq!(node.control_hostname(), "reboot07");
        assert_eq!(node.ssh_hostname(), "fit07");
        assert_eq!(NodeNaming::default().ssh_hostname(37), "fit37");
    }

    #[test]
    fn outcomes_from_results() {
        assert_eq!(NodeOutcome::from_status(Ok(0)), NodeOutcome::Succeeded);
        assert_eq!(NodeOutcome::from_status(Ok(1)), NodeOutcome::NonZero(1));
        assert!(matches!(
            NodeOutcome::from_unit(Err(anyhow::anyhow!("no route"))),
            NodeOutcome::Errored(msg) if msg.contains("no route")
        ));
    }
}
