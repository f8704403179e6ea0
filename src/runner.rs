//! Service runner: executes a single action (`start`, `stop`, `restart`,
//! `status`, ...) against one service, including dependency checks, hook
//! dispatch, and state-store transitions.
use std::path::PathBuf;
use std::process::Command;

use tracing::{info, warn};

use crate::depend::ServiceGraph;
use crate::env::RcEnv;
use crate::error::{RunnerError, StoreError};
use crate::hooks::{HookBus, HookEvent, HookName};
use crate::store::{self, PrimaryState, StateHandle};

/// Outcome of a single runner invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The action completed and left the service in this primary state.
    Settled(PrimaryState),
    /// The start was deferred because a `need` dependency is `inactive`.
    Deferred,
    /// The action was a no-op due to a precondition flag (`--ifstarted` and
    /// the service wasn't started, etc).
    Skipped,
}

/// Preconditions and behavior flags accepted from the command line.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Only proceed if the service is currently `started`.
    pub ifstarted: bool,
    /// Only proceed if the service is currently `inactive`.
    pub ifinactive: bool,
    /// Only proceed if the service is currently `stopped`.
    pub ifstopped: bool,
    /// Skip dependency checks and hook dispatch for `need`/`use` services.
    pub nodeps: bool,
}

/// A payload is the actual executable work behind a service action. The
/// default is [`ShellPayload`], which shells out to the service's init
/// script; tests substitute a fake implementation.
pub trait ServicePayload {
    /// Runs `action` for `service`, returning the process exit status.
    fn invoke(&self, service: &str, script: &PathBuf, action: &str, env: &RcEnv)
        -> Result<i32, RunnerError>;
}

/// Invokes a service's init script as `sh -c '<script>' <action>`.
#[derive(Debug, Clone, Default)]
pub struct ShellPayload;

impl ServicePayload for ShellPayload {
    fn invoke(
        &self,
        service: &str,
        script: &PathBuf,
        action: &str,
        env: &RcEnv,
    ) -> Result<i32, RunnerError> {
        let mut cmd = Command::new("sh");
        cmd.arg(script).arg(action);
        env.apply_to_direct_payload(&mut cmd, service);

        let status = cmd.status()?;
        Ok(status.code().unwrap_or(-1))
    }
}

/// Drives service actions against the dependency graph and state store.
pub struct Runner<'a, P: ServicePayload = ShellPayload> {
    graph: &'a ServiceGraph,
    store: &'a StateHandle,
    hooks: &'a HookBus,
    payload: P,
}

impl<'a> Runner<'a, ShellPayload> {
    /// Builds a runner using the default shell payload.
    pub fn new(graph: &'a ServiceGraph, store: &'a StateHandle, hooks: &'a HookBus) -> Self {
        Self {
            graph,
            store,
            hooks,
            payload: ShellPayload,
        }
    }
}

impl<'a, P: ServicePayload> Runner<'a, P> {
    /// Builds a runner with a custom payload implementation, for testing.
    pub fn with_payload(
        graph: &'a ServiceGraph,
        store: &'a StateHandle,
        hooks: &'a HookBus,
        payload: P,
    ) -> Self {
        Self {
            graph,
            store,
            hooks,
            payload,
        }
    }

    /// Runs `action` for `service` with `script` as its init script path.
    pub fn run(
        &self,
        service: &str,
        script: &PathBuf,
        action: &str,
        env: &RcEnv,
        opts: RunOptions,
    ) -> Result<RunOutcome, RunnerError> {
        let idx = self
            .graph
            .index_of(service)
            .ok_or_else(|| RunnerError::NotFound(service.to_string()))?;

        let current = store::primary::query(self.store, service);
        if let Some(skip) = self.check_precondition(current, opts) {
            return Ok(skip);
        }

        if action == "start" && !opts.nodeps {
            if let Some(broken) = self.find_broken_need(idx) {
                return Err(RunnerError::BrokenDependency {
                    service: service.to_string(),
                    dependency: broken,
                });
            }
            if let Some(waited_on) = self.find_inactive_need(idx) {
                store::schedule::schedule_start_on(self.store, service, &waited_on)?;
                return Ok(RunOutcome::Deferred);
            }
        }

        let _guard = store::exclusive::try_acquire(self.store, service)
            .map_err(|e| match e {
                StoreError::AlreadyExclusive(s) => RunnerError::AlreadyExclusive(s),
                other => RunnerError::Store(other),
            })?;

        self.dispatch_pre_hook(action, service);
        self.mark_transitional(service, action, script)?;

        let status = self.payload.invoke(service, script, action, env)?;

        let outcome = if status == 0 {
            self.mark_settled(service, action, script)?;
            store::schedule::clear_schedule(self.store, service)?;
            self.dispatch_post_hook(action, service);
            RunOutcome::Settled(
                store::primary::query(self.store, service).unwrap_or(PrimaryState::Stopped),
            )
        } else {
            warn!(service, action, status, "service payload exited non-zero");
            store::primary::mark(self.store, service, PrimaryState::Failed, script)?;
            return Err(RunnerError::PayloadFailed {
                service: service.to_string(),
                action: action.to_string(),
                status,
            });
        };

        info!(service, action, "service action settled");
        Ok(outcome)
    }

    fn check_precondition(&self, current: Option<PrimaryState>, opts: RunOptions) -> Option<RunOutcome> {
        if opts.ifstarted && current != Some(PrimaryState::Started) {
            return Some(RunOutcome::Skipped);
        }
        if opts.ifinactive && current != Some(PrimaryState::Inactive) {
            return Some(RunOutcome::Skipped);
        }
        if opts.ifstopped && current != Some(PrimaryState::Stopped) && current.is_some() {
            return Some(RunOutcome::Skipped);
        }
        None
    }

    fn find_broken_need(&self, idx: usize) -> Option<String> {
        let node = self.graph.node(idx);
        for &need_idx in &node.need {
            let need_node = self.graph.node(need_idx);
            if need_node.keywords.iter().any(|k| k == crate::constants::KEYWORD_BROKEN) {
                return Some(need_node.name.clone());
            }
            if store::primary::query(self.store, &need_node.name) == Some(PrimaryState::Failed) {
                return Some(need_node.name.clone());
            }
        }
        None
    }

    fn find_inactive_need(&self, idx: usize) -> Option<String> {
        let node = self.graph.node(idx);
        for &need_idx in &node.need {
            let need_node = self.graph.node(need_idx);
            if store::primary::query(self.store, &need_node.name) == Some(PrimaryState::Inactive) {
                return Some(need_node.name.clone());
            }
        }
        None
    }

    fn mark_transitional(&self, service: &str, action: &str, script: &PathBuf) -> Result<(), RunnerError> {
        let state = match action {
            "start" => PrimaryState::Starting,
            "stop" => PrimaryState::Stopping,
            _ => return Ok(()),
        };
        store::primary::mark(self.store, service, state, script)?;
        Ok(())
    }

    fn mark_settled(&self, service: &str, action: &str, script: &PathBuf) -> Result<(), RunnerError> {
        let state = match action {
            "start" => PrimaryState::Started,
            "stop" => PrimaryState::Stopped,
            _ => return Ok(()),
        };
        store::primary::mark(self.store, service, state, script)?;
        Ok(())
    }

    fn dispatch_pre_hook(&self, action: &str, service: &str) {
        let hook = match action {
            "start" => HookName::StartPre,
            "stop" => HookName::StopPre,
            _ => return,
        };
        self.hooks.dispatch(&HookEvent::new(hook, service));
    }

    fn dispatch_post_hook(&self, action: &str, service: &str) {
        let hook = match action {
            "start" => HookName::StartPost,
            "stop" => HookName::StopPost,
            _ => return,
        };
        self.hooks.dispatch(&HookEvent::new(hook, service));
    }
}
