//! Core transition algorithm: computes the start/stop sets for a runlevel
//! change and drives them through the [`crate::runner::Runner`] with
//! bounded parallelism.
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use crossterm::event::{self, Event, KeyCode};
use nix::sys::signal::{self, Signal};
use nix::unistd::{self, Pid};
use tracing::warn;

use crate::constants::{RC_STARTING_SENTINEL, RC_STOPPING_SENTINEL};
use crate::depend::{self, DependOptions, RelType, ServiceGraph};
use crate::env::RcEnv;
use crate::error::RunlevelError;
use crate::hooks::{HookBus, HookEvent, HookName};
use crate::runlevel::{self, Runlevel};
use crate::runner::{RunOptions, RunOutcome, Runner};
use crate::store::{self, PrimaryState, StateHandle};

/// Behavior flags for a transition.
#[derive(Debug, Clone, Copy)]
pub struct TransitionOptions {
    /// Prompt interactively before retrying or skipping a failed service.
    pub interactive: bool,
    /// Maximum number of services started or stopped concurrently.
    pub parallel: usize,
}

impl Default for TransitionOptions {
    fn default() -> Self {
        Self {
            interactive: false,
            parallel: 1,
        }
    }
}

/// Relation types followed when computing a runlevel order: hard
/// dependencies, soft dependencies, and ordering-only predecessors.
const ORDER_TYPES: &[RelType] = &[RelType::Need, RelType::Use, RelType::After];

/// Summary of what happened during a transition.
#[derive(Debug, Clone, Default)]
pub struct TransitionReport {
    /// Services successfully started.
    pub started: Vec<String>,
    /// Services successfully stopped.
    pub stopped: Vec<String>,
    /// Services whose action failed.
    pub failed: Vec<String>,
    /// Services skipped via interactive prompt.
    pub skipped: Vec<String>,
}

/// Brings the system to `target_runlevel`: stops services no longer a
/// member and not needed by one that is, then starts every member in
/// dependency order.
pub fn transition(
    graph: &ServiceGraph,
    store_handle: &StateHandle,
    runlevel_root: &Path,
    scripts_dir: &Path,
    hooks: &HookBus,
    target_runlevel: &str,
    opts: TransitionOptions,
) -> Result<TransitionReport, RunlevelError> {
    runlevel::reject_reserved(target_runlevel).or_else(|e| {
        // "default", "boot", etc. are valid *targets*; reject_reserved only
        // guards administrator-supplied *new* runlevel names elsewhere, so a
        // transition into a reserved name is always allowed here.
        if matches!(e, RunlevelError::Reserved(_)) {
            Ok(())
        } else {
            Err(e)
        }
    })?;

    let members = runlevel::stacked_members(runlevel_root, target_runlevel, |_| Vec::new())?;

    let interrupted = Arc::new(AtomicBool::new(false));
    install_signal_handler(Arc::clone(&interrupted));

    hooks.dispatch(&HookEvent::new(HookName::RunlevelStart, target_runlevel));

    let mut report = TransitionReport::default();

    store::inctl::take_control(store_handle, RC_STOPPING_SENTINEL)?;
    stop_phase(graph, store_handle, scripts_dir, &members, &interrupted, opts, &mut report);
    store::inctl::release_control(store_handle, RC_STOPPING_SENTINEL)?;

    if !interrupted.load(Ordering::SeqCst) {
        store::inctl::take_control(store_handle, RC_STARTING_SENTINEL)?;
        start_phase(graph, store_handle, scripts_dir, &members, hooks, &interrupted, opts, &mut report);
        store::inctl::release_control(store_handle, RC_STARTING_SENTINEL)?;
    }

    hooks.dispatch(&HookEvent::new(HookName::RunlevelStop, target_runlevel));

    Ok(report)
}

fn stop_phase(
    graph: &ServiceGraph,
    store_handle: &StateHandle,
    scripts_dir: &Path,
    members: &BTreeSet<String>,
    interrupted: &Arc<AtomicBool>,
    opts: TransitionOptions,
    report: &mut TransitionReport,
) {
    let to_stop: Vec<usize> = graph
        .nodes()
        .iter()
        .enumerate()
        .filter(|(_, node)| {
            !members.contains(&node.name)
                && store::primary::query(store_handle, &node.name) == Some(PrimaryState::Started)
        })
        .map(|(idx, _)| idx)
        .collect();

    let options = DependOptions {
        trace: true,
        stop: true,
        ..Default::default()
    };
    let full_order = depend::order(graph, ORDER_TYPES, &to_stop, None, options);
    // `order()` expands through followed edges to compute a valid *start*
    // ordering; restrict back down to the services actually being stopped
    // and reverse it, since a dependency being left running should not
    // itself be stopped as a side effect.
    let stop_set: BTreeSet<usize> = to_stop.iter().copied().collect();
    let mut order: Vec<usize> = full_order.into_iter().filter(|i| stop_set.contains(i)).collect();
    order.reverse();

    run_batches(graph, store_handle, scripts_dir, &order, "stop", None, interrupted, opts, report);
}

fn start_phase(
    graph: &ServiceGraph,
    store_handle: &StateHandle,
    scripts_dir: &Path,
    members: &BTreeSet<String>,
    hooks: &HookBus,
    interrupted: &Arc<AtomicBool>,
    opts: TransitionOptions,
    report: &mut TransitionReport,
) {
    let targets: Vec<usize> = members
        .iter()
        .filter_map(|name| graph.index_of(name))
        .collect();

    // A stale `failed` marker from a previous attempt must not block this
    // one; clear it for every member about to be (re)started.
    for &idx in &targets {
        let name = &graph.node(idx).name;
        if store::primary::query(store_handle, name) == Some(PrimaryState::Failed) {
            let _ = store::primary::mark(store_handle, name, PrimaryState::Stopped, &scripts_dir.join(name));
        }
    }

    let options = DependOptions {
        trace: true,
        start: true,
        ..Default::default()
    };
    let order = depend::order(graph, ORDER_TYPES, &targets, None, options);

    run_batches(graph, store_handle, scripts_dir, &order, "start", Some(hooks), interrupted, opts, report);
}

fn run_batches(
    graph: &ServiceGraph,
    store_handle: &StateHandle,
    scripts_dir: &Path,
    order: &[usize],
    action: &str,
    hooks: Option<&HookBus>,
    interrupted: &Arc<AtomicBool>,
    opts: TransitionOptions,
    report: &mut TransitionReport,
) {
    let no_hooks = HookBus::new(vec![]);
    let hooks = hooks.unwrap_or(&no_hooks);

    let env = RcEnv::from_process();
    let results = Arc::new(Mutex::new(Vec::new()));

    for batch in order.chunks(opts.parallel.max(1)) {
        if interrupted.load(Ordering::SeqCst) {
            break;
        }

        std::thread::scope(|scope| {
            for &idx in batch {
                let name = graph.node(idx).name.clone();
                let script = scripts_dir.join(&name);
                let results = Arc::clone(&results);
                let env = env.clone();
                scope.spawn(move || {
                    let runner = Runner::new(graph, store_handle, hooks);
                    let outcome = runner.run(&name, &script, action, &env, RunOptions::default());
                    results.lock().expect("results mutex poisoned").push((name, outcome));
                });
            }
        });

        let mut guard = results.lock().expect("results mutex poisoned");
        for (name, outcome) in guard.drain(..) {
            match outcome {
                Ok(RunOutcome::Settled(PrimaryState::Started)) => report.started.push(name),
                Ok(RunOutcome::Settled(PrimaryState::Stopped)) => report.stopped.push(name),
                Ok(RunOutcome::Skipped) => report.skipped.push(name),
                Ok(_) => {}
                Err(e) => {
                    warn!(service = %name, error = %e, "service action failed");
                    report.failed.push(name.clone());
                    if interrupted.load(Ordering::SeqCst) {
                        continue;
                    }
                    if opts.interactive && !prompt_continue(&name) {
                        interrupted.store(true, Ordering::SeqCst);
                    }
                }
            }
        }
    }
}

fn prompt_continue(service: &str) -> bool {
    println!("service '{service}' failed; continue? [Y/n]");
    if event::poll(std::time::Duration::from_secs(0)).unwrap_or(false) {
        if let Ok(Event::Key(key)) = event::read() {
            return !matches!(key.code, KeyCode::Char('n') | KeyCode::Char('N'));
        }
    }
    true
}

fn install_signal_handler(interrupted: Arc<AtomicBool>) {
    let pgid = unistd::getpgrp();
    let _ = ctrlc::set_handler(move || {
        interrupted.store(true, Ordering::SeqCst);
        let _ = signal::kill(Pid::from_raw(-pgid.as_raw()), Signal::SIGTERM);
    });
}
