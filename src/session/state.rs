//! Session states and the transition table

use std::fmt;

/// What the viewer is presenting
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionState {
    Empty,
    OctreeTracer,
    PathTracing,
    Loading,
}

impl SessionState {
    pub const ALL: [SessionState; 4] = [
        SessionState::Empty,
        SessionState::OctreeTracer,
        SessionState::PathTracing,
        SessionState::Loading,
    ];
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Empty => "empty",
            SessionState::OctreeTracer => "octree",
            SessionState::PathTracing => "path tracing",
            SessionState::Loading => "loading",
        };
        f.write_str(name)
    }
}

/// Inputs the controller feeds through [`transition`]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum SessionEvent {
    LoadRequested,
    LoadSucceeded,
    LoadFailed,
    PathTraceRequested,
    /// User asked the running trace to stop
    StopRequested,
    TraceDone,
    TraceCancelled,
    TraceFailed,
}

impl SessionEvent {
    pub const ALL: [SessionEvent; 8] = [
        SessionEvent::LoadRequested,
        SessionEvent::LoadSucceeded,
        SessionEvent::LoadFailed,
        SessionEvent::PathTraceRequested,
        SessionEvent::StopRequested,
        SessionEvent::TraceDone,
        SessionEvent::TraceCancelled,
        SessionEvent::TraceFailed,
    ];
}

/// Side effect the controller performs while taking a transition
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    /// Hand the request to the loader, cancelling a running trace first
    RequestLoad { cancel_trace: bool },
    /// Make the loaded octree live and retire the previous one
    PublishOctree,
    ReportLoadError,
    /// Snapshot the scene and start the path tracer
    StartPathTrace,
    /// Set the tracer's cancel flag; the state changes on `TraceCancelled`
    RequestCancel,
    /// Retire the displayed trace image
    ReleaseTraceImage,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    pub next: SessionState,
    pub action: Action,
}

/// Transition table. `None` means the event is dropped in `state`.
pub fn transition(state: SessionState, event: SessionEvent) -> Option<Transition> {
    use SessionEvent as E;
    use SessionState as S;

    let (next, action) = match (state, event) {
        (_, E::LoadRequested) => (
            S::Loading,
            Action::RequestLoad {
                cancel_trace: state == S::PathTracing,
            },
        ),
        (S::Loading, E::LoadSucceeded) => (S::OctreeTracer, Action::PublishOctree),
        (S::Loading, E::LoadFailed) => (S::Empty, Action::ReportLoadError),
        (S::OctreeTracer, E::PathTraceRequested) => (S::PathTracing, Action::StartPathTrace),
        (S::PathTracing, E::StopRequested) => (S::PathTracing, Action::RequestCancel),
        (S::PathTracing, E::TraceDone | E::TraceCancelled | E::TraceFailed) => {
            (S::OctreeTracer, Action::ReleaseTraceImage)
        }
        _ => return None,
    };
    Some(Transition { next, action })
}

#[cfg(test)]
mod tests {
    use super::*;
    use SessionEvent as E;
    use SessionState as S;

    type Row = (S, E, Option<(S, Action)>);

    const TABLE: [Row; 32] = [
        (S::Empty, E::LoadRequested, Some((S::Loading, Action::RequestLoad { cancel_trace: false }))),
        (S::Empty, E::LoadSucceeded, None),
        (S::Empty, E::LoadFailed, None),
        (S::Empty, E::PathTraceRequested, None),
        (S::Empty, E::StopRequested, None),
        (S::Empty, E::TraceDone, None),
        (S::Empty, E::TraceCancelled, None),
        (S::Empty, E::TraceFailed, None),
        (S::OctreeTracer, E::LoadRequested, Some((S::Loading, Action::RequestLoad { cancel_trace: false }))),
        (S::OctreeTracer, E::LoadSucceeded, None),
        (S::OctreeTracer, E::LoadFailed, None),
        (S::OctreeTracer, E::PathTraceRequested, Some((S::PathTracing, Action::StartPathTrace))),
        (S::OctreeTracer, E::StopRequested, None),
        (S::OctreeTracer, E::TraceDone, None),
        (S::OctreeTracer, E::TraceCancelled, None),
        (S::OctreeTracer, E::TraceFailed, None),
        (S::PathTracing, E::LoadRequested, Some((S::Loading, Action::RequestLoad { cancel_trace: true }))),
        (S::PathTracing, E::LoadSucceeded, None),
        (S::PathTracing, E::LoadFailed, None),
        (S::PathTracing, E::PathTraceRequested, None),
        (S::PathTracing, E::StopRequested, Some((S::PathTracing, Action::RequestCancel))),
        (S::PathTracing, E::TraceDone, Some((S::OctreeTracer, Action::ReleaseTraceImage))),
        (S::PathTracing, E::TraceCancelled, Some((S::OctreeTracer, Action::ReleaseTraceImage))),
        (S::PathTracing, E::TraceFailed, Some((S::OctreeTracer, Action::ReleaseTraceImage))),
        (S::Loading, E::LoadRequested, Some((S::Loading, Action::RequestLoad { cancel_trace: false }))),
        (S::Loading, E::LoadSucceeded, Some((S::OctreeTracer, Action::PublishOctree))),
        (S::Loading, E::LoadFailed, Some((S::Empty, Action::ReportLoadError))),
        (S::Loading, E::PathTraceRequested, None),
        (S::Loading, E::StopRequested, None),
        (S::Loading, E::TraceDone, None),
        (S::Loading, E::TraceCancelled, None),
        (S::Loading, E::TraceFailed, None),
    ];

    #[test]
    fn test_every_pair_matches_table() {
        for state in S::ALL {
            for event in E::ALL {
                let rows: Vec<&Row> = TABLE.iter().filter(|r| r.0 == state && r.1 == event).collect();
                assert_eq!(rows.len(), 1, "{:?} + {:?} listed {} times", state, event, rows.len());
                let actual = transition(state, event).map(|t| (t.next, t.action));
                assert_eq!(actual, rows[0].2, "{:?} + {:?}", state, event);
            }
        }
    }

    #[test]
    fn test_load_is_accepted_everywhere() {
        for state in S::ALL {
            let t = transition(state, E::LoadRequested).unwrap();
            assert_eq!(t.next, S::Loading);
        }
        assert_eq!(
            transition(S::PathTracing, E::LoadRequested).unwrap().action,
            Action::RequestLoad { cancel_trace: true }
        );
    }

    #[test]
    fn test_path_trace_needs_live_octree() {
        assert!(transition(S::Empty, E::PathTraceRequested).is_none());
        assert!(transition(S::Loading, E::PathTraceRequested).is_none());
        assert!(transition(S::PathTracing, E::PathTraceRequested).is_none());
    }

    #[test]
    fn test_trace_events_ignored_outside_path_tracing() {
        for state in [S::Empty, S::OctreeTracer, S::Loading] {
            for event in [E::StopRequested, E::TraceDone, E::TraceCancelled, E::TraceFailed] {
                assert!(transition(state, event).is_none());
            }
        }
    }

    #[test]
    fn test_stop_waits_for_cancelled() {
        let stop = transition(S::PathTracing, E::StopRequested).unwrap();
        assert_eq!(stop.next, S::PathTracing);
        let cancelled = transition(stop.next, E::TraceCancelled).unwrap();
        assert_eq!(cancelled.next, S::OctreeTracer);
    }
}
