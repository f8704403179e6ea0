//! Provider alias resolution.
//!
//! Multiple services may `provide` the same alias (several `net.*` scripts
//! all `provide net`, for instance). When a dependent `need`s the alias
//! rather than a concrete service, exactly one provider must be chosen at
//! traversal time, against the live state of the system — never guessed.
use super::graph::ServiceGraph;

/// Where a candidate is looked for during a probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeLocation {
    /// A member of the runlevel currently being transitioned to/from.
    CurrentRunlevel,
    /// Coldplugged-then-hotplugged at boot, regardless of runlevel.
    Hotplugged,
    /// A member of the boot runlevel, when it differs from the current one.
    BootRunlevel,
    /// No membership filter at all.
    Anywhere,
}

/// The primary-state bucket a probe is looking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProbeState {
    Started,
    Starting,
    Stopped,
}

/// The fixed 13-probe sequence. Earlier entries win; within an entry,
/// matching more than one candidate is ambiguity, not preference.
const PROBES: &[(ProbeLocation, ProbeState)] = &[
    (ProbeLocation::CurrentRunlevel, ProbeState::Started),
    (ProbeLocation::CurrentRunlevel, ProbeState::Starting),
    (ProbeLocation::CurrentRunlevel, ProbeState::Stopped),
    (ProbeLocation::Hotplugged, ProbeState::Started),
    (ProbeLocation::Hotplugged, ProbeState::Starting),
    (ProbeLocation::BootRunlevel, ProbeState::Started),
    (ProbeLocation::BootRunlevel, ProbeState::Starting),
    (ProbeLocation::Hotplugged, ProbeState::Stopped),
    (ProbeLocation::Anywhere, ProbeState::Started),
    (ProbeLocation::Anywhere, ProbeState::Starting),
    (ProbeLocation::CurrentRunlevel, ProbeState::Stopped),
    (ProbeLocation::BootRunlevel, ProbeState::Stopped),
    (ProbeLocation::Anywhere, ProbeState::Stopped),
];

/// Per-service facts the probe table is evaluated against. Every field is a
/// closure so callers can answer from whatever live sources they have
/// (runlevel directories, the state store) without this module depending on
/// either.
pub struct ProbeContext<'a> {
    /// True iff `name` is a member of the runlevel currently being entered
    /// or left.
    pub in_current_runlevel: &'a dyn Fn(&str) -> bool,
    /// True iff `name` is a member of the boot runlevel. Ignored when the
    /// boot runlevel *is* the current runlevel (no separate probe needed).
    pub in_boot_runlevel: &'a dyn Fn(&str) -> bool,
    /// True iff `name` carries the `hotplugged` flag.
    pub hotplugged: &'a dyn Fn(&str) -> bool,
    /// True iff `name`'s primary state is `started`.
    pub started: &'a dyn Fn(&str) -> bool,
    /// True iff `name`'s primary state is `starting`.
    pub starting: &'a dyn Fn(&str) -> bool,
    /// True iff `name`'s primary state is `stopped` (or any state other than
    /// `started`/`starting`, since every probe only ever asks one question
    /// about a candidate at a time).
    pub stopped: &'a dyn Fn(&str) -> bool,
    /// Whether the boot runlevel and the current runlevel are the same, in
    /// which case boot-runlevel probes are skipped (current-runlevel probes
    /// already cover them).
    pub boot_is_current: bool,
}

fn matches_location(ctx: &ProbeContext<'_>, location: ProbeLocation, name: &str) -> bool {
    match location {
        ProbeLocation::CurrentRunlevel => (ctx.in_current_runlevel)(name),
        ProbeLocation::Hotplugged => (ctx.hotplugged)(name),
        ProbeLocation::BootRunlevel => !ctx.boot_is_current && (ctx.in_boot_runlevel)(name),
        ProbeLocation::Anywhere => true,
    }
}

fn matches_state(ctx: &ProbeContext<'_>, state: ProbeState, name: &str) -> bool {
    match state {
        ProbeState::Started => (ctx.started)(name),
        ProbeState::Starting => (ctx.starting)(name),
        ProbeState::Stopped => (ctx.stopped)(name),
    }
}

/// Resolves which concrete service should satisfy `alias`, given the set of
/// candidate node indices that declare `provide alias`.
///
/// If the caller is stopping, every candidate is returned unfiltered (the
/// caller iterates and stops all of them). If `strict`, candidates are
/// intersected with runlevel/boot-runlevel membership and returned as soon
/// as that intersection is non-empty. Otherwise the 13-probe sequence runs
/// in order: each probe that matches exactly one candidate resolves
/// immediately; a probe matching more than one resolves to "no provider"
/// (ambiguity is never guessed away); a probe matching zero falls through
/// to the next. If every probe comes up empty or ambiguous, resolution
/// returns `None`.
pub fn resolve_provider(
    graph: &ServiceGraph,
    candidates: &[usize],
    stopping: bool,
    strict: bool,
    ctx: &ProbeContext<'_>,
) -> Vec<usize> {
    if candidates.is_empty() {
        return Vec::new();
    }
    if candidates.len() == 1 {
        return vec![candidates[0]];
    }
    if stopping {
        return candidates.to_vec();
    }

    let names: Vec<(usize, &str)> = candidates
        .iter()
        .map(|&idx| (idx, graph.node(idx).name.as_str()))
        .collect();

    if strict {
        let in_runlevel: Vec<usize> = names
            .iter()
            .filter(|(_, name)| (ctx.in_current_runlevel)(name) || (!ctx.boot_is_current && (ctx.in_boot_runlevel)(name)))
            .map(|(idx, _)| *idx)
            .collect();
        if !in_runlevel.is_empty() {
            return in_runlevel;
        }
    }

    for &(location, state) in PROBES {
        let matched: Vec<usize> = names
            .iter()
            .filter(|(_, name)| matches_location(ctx, location, name) && matches_state(ctx, state, name))
            .map(|(idx, _)| *idx)
            .collect();

        match matched.len() {
            0 => continue,
            1 => return matched,
            _ => return Vec::new(),
        }
    }

    Vec::new()
}

/// Convenience wrapper over [`resolve_provider`] for the common case of a
/// single-provider expectation (e.g. resolving a `need`/`use` target):
/// returns `Some` only when resolution settles on exactly one candidate.
pub fn resolve_single_provider(
    graph: &ServiceGraph,
    candidates: &[usize],
    strict: bool,
    ctx: &ProbeContext<'_>,
) -> Option<usize> {
    let resolved = resolve_provider(graph, candidates, false, strict, ctx);
    match resolved.as_slice() {
        [single] => Some(*single),
        _ => None,
    }
}
