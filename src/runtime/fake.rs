//! In-memory container runtime for tests.
//!
//! Enforces the two exclusivity rules a real runtime enforces (unique names
//! and host ports), records every call, and lets tests inject failures.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use crate::error::{HalldyllError, Result, RuntimeError};

use super::client::ContainerRuntime;
use super::types::{ContainerInstance, ExecOutput, InstanceState, RestartPolicy, RunSpec};

/// Runtime operations, as recorded by the fake.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum Op {
    Ping,
    Inspect,
    ListRunning,
    UpdateRestart,
    Stop,
    Remove,
    Pull,
    Run,
    Exec,
    Logs,
}

impl Op {
    const fn is_mutation(self) -> bool {
        matches!(
            self,
            Self::UpdateRestart | Self::Stop | Self::Remove | Self::Pull | Self::Run
        )
    }
}

#[derive(Debug)]
struct FakeContainer {
    instance: ContainerInstance,
    host_ports: Vec<u16>,
    restart: RestartPolicy,
}

#[derive(Debug, Default)]
struct FakeState {
    containers: BTreeMap<String, FakeContainer>,
    calls: Vec<Op>,
    failing: HashSet<Op>,
    foreign_ports: HashSet<u16>,
    hang_pull: bool,
    exit_on_start: bool,
    config_check_exit: i32,
    next_id: u64,
}

impl FakeState {
    fn record(&mut self, op: Op) -> Result<()> {
        self.calls.push(op);
        if self.failing.contains(&op) {
            return Err(HalldyllError::Runtime(RuntimeError::command_failed(
                format!("{op:?}"),
                "injected failure",
            )));
        }
        Ok(())
    }

    fn port_taken(&self, port: u16) -> bool {
        self.foreign_ports.contains(&port)
            || self
                .containers
                .values()
                .any(|c| c.instance.is_running() && c.host_ports.contains(&port))
    }
}

/// In-memory [`ContainerRuntime`].
#[derive(Debug, Default)]
pub(crate) struct FakeRuntime {
    state: Mutex<FakeState>,
}

impl FakeRuntime {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake runtime lock poisoned")
    }

    /// Makes every future call of `op` fail.
    pub(crate) fn fail(&self, op: Op) {
        self.lock().failing.insert(op);
    }

    /// Marks a host port as bound by an unrelated process.
    pub(crate) fn occupy_port(&self, port: u16) {
        self.lock().foreign_ports.insert(port);
    }

    /// Makes image pulls never complete.
    pub(crate) fn hang_pull(&self) {
        self.lock().hang_pull = true;
    }

    /// Makes new instances exit right after they start.
    pub(crate) fn exit_on_start(&self) {
        self.lock().exit_on_start = true;
    }

    /// Makes the in-container configuration check fail.
    pub(crate) fn fail_config_check(&self) {
        self.lock().config_check_exit = 1;
    }

    /// Seeds a pre-existing instance without recording a call.
    pub(crate) fn seed(&self, spec: &RunSpec, running: bool) {
        let mut state = self.lock();
        state.next_id += 1;
        let id = format!("seed-{}", state.next_id);
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                instance: ContainerInstance {
                    id,
                    name: spec.name.clone(),
                    image: spec.image.clone(),
                    state: if running {
                        InstanceState::Running
                    } else {
                        InstanceState::Stopped
                    },
                    labels: spec.labels.clone(),
                    env: spec.env.clone(),
                },
                host_ports: spec.ports.iter().map(|p| p.host).collect(),
                restart: spec.restart,
            },
        );
    }

    /// Returns every recorded call in order.
    pub(crate) fn calls(&self) -> Vec<Op> {
        self.lock().calls.clone()
    }

    /// Returns the number of state-mutating calls recorded.
    pub(crate) fn mutation_count(&self) -> usize {
        self.lock().calls.iter().filter(|op| op.is_mutation()).count()
    }

    /// Returns the instance under a name, if any.
    pub(crate) fn instance(&self, name: &str) -> Option<ContainerInstance> {
        self.lock().containers.get(name).map(|c| c.instance.clone())
    }

    /// Returns the restart policy of a named instance.
    pub(crate) fn restart_policy(&self, name: &str) -> Option<RestartPolicy> {
        self.lock().containers.get(name).map(|c| c.restart)
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<()> {
        self.lock().record(Op::Ping)
    }

    async fn inspect(&self, name: &str) -> Result<Option<ContainerInstance>> {
        let mut state = self.lock();
        state.record(Op::Inspect)?;
        Ok(state.containers.get(name).map(|c| c.instance.clone()))
    }

    async fn list_running(&self, name: &str) -> Result<Vec<ContainerInstance>> {
        let mut state = self.lock();
        state.record(Op::ListRunning)?;
        Ok(state
            .containers
            .values()
            .filter(|c| c.instance.name == name && c.instance.is_running())
            .map(|c| c.instance.clone())
            .collect())
    }

    async fn update_restart_policy(&self, name: &str, policy: RestartPolicy) -> Result<()> {
        let mut state = self.lock();
        state.record(Op::UpdateRestart)?;
        let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
        container.restart = policy;
        Ok(())
    }

    async fn stop(&self, name: &str, _timeout: Duration) -> Result<()> {
        let mut state = self.lock();
        state.record(Op::Stop)?;
        let container = state.containers.get_mut(name).ok_or_else(|| no_such(name))?;
        container.instance.state = InstanceState::Stopped;
        Ok(())
    }

    async fn remove(&self, name: &str, force: bool) -> Result<()> {
        let mut state = self.lock();
        state.record(Op::Remove)?;
        let running = state
            .containers
            .get(name)
            .ok_or_else(|| no_such(name))?
            .instance
            .is_running();
        if running && !force {
            return Err(HalldyllError::Runtime(RuntimeError::command_failed(
                "rm",
                "cannot remove a running container",
            )));
        }
        state.containers.remove(name);
        Ok(())
    }

    async fn pull(&self, _image: &str) -> Result<()> {
        let hang = {
            let mut state = self.lock();
            state.record(Op::Pull)?;
            state.hang_pull
        };
        if hang {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn run(&self, spec: &RunSpec) -> Result<String> {
        let mut state = self.lock();
        state.record(Op::Run)?;

        if state.containers.contains_key(&spec.name) {
            return Err(HalldyllError::Runtime(RuntimeError::command_failed(
                "run",
                format!("Conflict. The container name \"/{}\" is already in use", spec.name),
            )));
        }
        let bind_conflict = spec
            .ports
            .iter()
            .map(|p| p.host)
            .find(|port| state.port_taken(*port));

        state.next_id += 1;
        let id = format!("fake-{}", state.next_id);
        let running = bind_conflict.is_none() && !state.exit_on_start;
        state.containers.insert(
            spec.name.clone(),
            FakeContainer {
                instance: ContainerInstance {
                    id: id.clone(),
                    name: spec.name.clone(),
                    image: spec.image.clone(),
                    state: if running {
                        InstanceState::Running
                    } else {
                        InstanceState::Stopped
                    },
                    labels: spec.labels.clone(),
                    env: spec.env.clone(),
                },
                host_ports: spec.ports.iter().map(|p| p.host).collect(),
                restart: spec.restart,
            },
        );

        // The runtime creates the container before binding, so a bind
        // failure leaves it behind in the created state.
        if let Some(port) = bind_conflict {
            return Err(HalldyllError::Runtime(RuntimeError::command_failed(
                "run",
                format!("Bind for 0.0.0.0:{port} failed: port is already allocated"),
            )));
        }
        Ok(id)
    }

    async fn exec(&self, name: &str, _command: &[String]) -> Result<ExecOutput> {
        let mut state = self.lock();
        state.record(Op::Exec)?;
        let container = state.containers.get(name).ok_or_else(|| no_such(name))?;
        if !container.instance.is_running() {
            return Err(HalldyllError::Runtime(RuntimeError::command_failed(
                "exec",
                format!("container {name} is not running"),
            )));
        }

        let upstream = format!(
            "{}:{}",
            container.instance.env.get("UPSTREAM_HOST").map_or("", String::as_str),
            container.instance.env.get("UPSTREAM_PORT").map_or("", String::as_str)
        );
        let exit_code = state.config_check_exit;
        Ok(ExecOutput {
            exit_code,
            stdout: String::new(),
            stderr: if exit_code == 0 {
                format!("nginx: configuration file test is successful (upstream {upstream})")
            } else {
                String::from("nginx: [emerg] invalid port in upstream \"${UPSTREAM_HOST}:\"")
            },
        })
    }

    async fn logs(&self, name: &str, tail: u32) -> Result<String> {
        let mut state = self.lock();
        state.record(Op::Logs)?;
        let container = state.containers.get(name).ok_or_else(|| no_such(name))?;
        let lines = [
            format!("{}: starting", container.instance.id),
            String::from("envsubst: rendering templates"),
            String::from("nginx: ready for start up"),
        ];
        let skip = lines.len().saturating_sub(tail as usize);
        Ok(lines[skip..].join("\n"))
    }
}

fn no_such(name: &str) -> HalldyllError {
    HalldyllError::Runtime(RuntimeError::command_failed(
        "runtime",
        format!("No such container: {name}"),
    ))
}
