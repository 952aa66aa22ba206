// src/exec/shell.rs

//! Command-backed collaborators used in production.
//!
//! Every operation renders one of the `[commands]` templates from the config
//! and runs it with `sh -c`. This keeps the engine independent from the
//! testbed tooling (`rhubarbe`, `ssh`, `sendmail`, the sidecar client): the
//! site adapts the templates, not the code.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::config::CommandsSection;
use crate::exec::backend::{
    BoxFuture, ImageDeployer, Lease, LeaseService, LeaseWindow, MailTransport, PowerControl,
    ReachabilityProbe, RemoteCommand, StatusPublisher,
};
use crate::exec::process::{render, run_shell, shell_quote};
use crate::nodes::NodeRef;
use crate::report::MailMessage;
use crate::types::{NodeId, PowerMode};

/// ssh reserves this exit status for its own (connection) errors.
const SSH_CONNECTION_ERROR: i32 = 255;

#[derive(Debug, Clone)]
pub struct ShellBackend {
    commands: CommandsSection,
}

impl ShellBackend {
    pub fn new(commands: CommandsSection) -> Self {
        Self { commands }
    }

    fn node_vars(node: &NodeRef) -> Vec<(&'static str, String)> {
        vec![
            ("id", node.id.to_string()),
            ("host", node.ssh_hostname().to_string()),
            ("control", node.control_hostname().to_string()),
        ]
    }

    fn render_for_node(template: &str, node: &NodeRef, extra: &[(&str, String)]) -> String {
        let mut owned = Self::node_vars(node);
        owned.extend(extra.iter().map(|(k, v)| (*k, v.clone())));
        let vars: Vec<(&str, &str)> = owned.iter().map(|(k, v)| (*k, v.as_str())).collect();
        render(template, &vars, &[])
    }
}

fn host_list(nodes: &[NodeRef]) -> String {
    nodes
        .iter()
        .map(|n| shell_quote(n.ssh_hostname()))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parse the first line printed by the lease command.
///
/// Format: `principal [start_epoch end_epoch]`; an empty output means no
/// lease is active.
pub fn parse_lease_output(stdout: &str) -> anyhow::Result<Option<Lease>> {
    let Some(line) = stdout.lines().map(str::trim).find(|l| !l.is_empty()) else {
        return Ok(None);
    };

    let fields: Vec<&str> = line.split_whitespace().collect();
    let window = match fields.as_slice() {
        [_principal] => None,
        [_principal, start, end] => {
            let start: i64 = start.parse().with_context(|| format!("lease start '{start}'"))?;
            let end: i64 = end.parse().with_context(|| format!("lease end '{end}'"))?;
            Some(LeaseWindow {
                start: DateTime::<Utc>::from_timestamp(start, 0)
                    .ok_or_else(|| anyhow!("lease start {start} out of range"))?,
                end: DateTime::<Utc>::from_timestamp(end, 0)
                    .ok_or_else(|| anyhow!("lease end {end} out of range"))?,
            })
        }
        _ => return Err(anyhow!("unexpected lease line '{line}'")),
    };

    Ok(Some(Lease {
        principal: fields[0].to_string(),
        window,
    }))
}

impl LeaseService for ShellBackend {
    fn active_lease<'a>(&'a self, resource: &'a str) -> BoxFuture<'a, anyhow::Result<Option<Lease>>> {
        Box::pin(async move {
            let cmd = render(&self.commands.lease, &[("resource", resource)], &[]);
            let output = run_shell(&cmd, None).await?.ensure_success("lease query")?;
            parse_lease_output(&output.stdout)
        })
    }
}

impl PowerControl for ShellBackend {
    fn send_action<'a>(
        &'a self,
        node: &'a NodeRef,
        mode: PowerMode,
        check_delay: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let cmd = Self::render_for_node(
                &self.commands.power,
                node,
                &[("mode", mode.to_string())],
            );
            run_shell(&cmd, None)
                .await?
                .ensure_success(&format!("power {mode} on {node}"))?;

            tokio::time::sleep(check_delay).await;

            let cmd = Self::render_for_node(&self.commands.power_status, node, &[]);
            let output = run_shell(&cmd, None)
                .await?
                .ensure_success(&format!("power status of {node}"))?;
            let state = output
                .stdout
                .split_whitespace()
                .last()
                .unwrap_or_default()
                .to_lowercase();
            let expected = if mode.expects_powered() { "on" } else { "off" };

            debug!(node = %node, %mode, state = %state, "power post-condition");
            if state != expected {
                return Err(anyhow!(
                    "{node} reports power '{state}' after '{mode}', expected '{expected}'"
                ));
            }
            Ok(())
        })
    }

    fn power_off_all<'a>(&'a self, nodes: &'a [NodeRef]) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let hosts = host_list(nodes);
            let cmd = render(&self.commands.all_off, &[], &[("hosts", hosts.as_str())]);
            run_shell(&cmd, None).await?.ensure_success("power off")?;
            Ok(())
        })
    }
}

impl ImageDeployer for ShellBackend {
    fn load<'a>(
        &'a self,
        nodes: &'a [NodeRef],
        image: &'a Path,
        bandwidth: u32,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<Vec<(NodeId, anyhow::Result<()>)>>> {
        Box::pin(async move {
            let hosts = host_list(nodes);
            let image = image.to_string_lossy();
            let bandwidth = bandwidth.to_string();
            let timeout = timeout.as_secs().to_string();
            let cmd = render(
                &self.commands.load,
                &[
                    ("image", image.as_ref()),
                    ("bandwidth", bandwidth.as_str()),
                    ("timeout", timeout.as_str()),
                ],
                &[("hosts", hosts.as_str())],
            );

            let output = run_shell(&cmd, None).await?;
            info!(image = %image, exit_code = output.code, "image loader exited");

            // The loader reports for the whole batch only.
            Ok(nodes
                .iter()
                .map(|n| {
                    let res = if output.success() {
                        Ok(())
                    } else {
                        Err(anyhow!("loader exited with status {}", output.code))
                    };
                    (n.id, res)
                })
                .collect())
        })
    }
}

impl ReachabilityProbe for ShellBackend {
    fn wait_for<'a>(
        &'a self,
        node: &'a NodeRef,
        backoff: Duration,
        timeout: Duration,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let cmd = Self::render_for_node(
                &self.commands.wait,
                node,
                &[
                    ("backoff", backoff.as_secs().max(1).to_string()),
                    ("timeout", timeout.as_secs().max(1).to_string()),
                ],
            );
            run_shell(&cmd, None)
                .await?
                .ensure_success(&format!("waiting for {node}"))?;
            Ok(())
        })
    }
}

impl RemoteCommand for ShellBackend {
    fn run<'a>(&'a self, node: &'a NodeRef, command: &'a str) -> BoxFuture<'a, anyhow::Result<i32>> {
        Box::pin(async move {
            let cmd = Self::render_for_node(
                &self.commands.remote,
                node,
                &[("command", command.to_string())],
            );
            let output = run_shell(&cmd, None).await?;
            if output.code == SSH_CONNECTION_ERROR {
                return Err(anyhow!("ssh to {node} failed"));
            }
            Ok(output.code)
        })
    }
}

impl StatusPublisher for ShellBackend {
    fn set_attribute<'a>(
        &'a self,
        node: NodeId,
        key: &'a str,
        value: &'a str,
    ) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let id = node.to_string();
            let cmd = render(
                &self.commands.status,
                &[("id", id.as_str()), ("key", key), ("value", value)],
                &[],
            );
            run_shell(&cmd, None)
                .await?
                .ensure_success("status update")?;
            Ok(())
        })
    }
}

impl MailTransport for ShellBackend {
    fn send<'a>(&'a self, message: &'a MailMessage) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let payload = message.to_rfc822();
            run_shell(&self.commands.mail, Some(payload.as_bytes()))
                .await?
                .ensure_success("mail transport")?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nodes::NodeNaming;

    #[test]
    fn lease_output_variants() {
        assert_eq!(parse_lease_output("").unwrap(), None);
        assert_eq!(parse_lease_output("\n  \n").unwrap(), None);

        let lease = parse_lease_output("inria_r2lab.nightly\n").unwrap().unwrap();
        assert_eq!(lease.principal, "inria_r2lab.nightly");
        assert!(lease.window.is_none());

        let lease = parse_lease_output("someone 1700000000 1700003600")
            .unwrap()
            .unwrap();
        let window = lease.window.unwrap();
        assert_eq!((window.end - window.start).num_seconds(), 3600);

        assert!(parse_lease_output("a b").is_err());
        assert!(parse_lease_output("a x y").is_err());
    }

    #[tokio::test]
    async fn remote_command_returns_exit_status() {
        let mut commands = CommandsSection::default();
        commands.remote = "test {host} = fit03 && sh -c {command}".to_string();
        let backend = ShellBackend::new(commands);
        let node = NodeRef::new(3, &NodeNaming::default());

        assert_eq!(backend.run(&node, "exit 0").await.unwrap(), 0);
        assert_eq!(backend.run(&node, "exit 1").await.unwrap(), 1);
        assert!(backend.run(&node, "exit 255").await.is_err());
    }

    #[tokio::test]
    async fn power_action_checks_reported_state() {
        let mut commands = CommandsSection::default();
        commands.power = "true {mode} {host}".to_string();
        commands.power_status = "echo {host} is on".to_string();
        let backend = ShellBackend::new(commands);
        let node = NodeRef::new(1, &NodeNaming::default());

        backend
            .send_action(&node, PowerMode::On, Duration::from_millis(1))
            .await
            .unwrap();
        assert!(
            backend
                .send_action(&node, PowerMode::Off, Duration::from_millis(1))
                .await
                .is_err()
        );
    }
}
