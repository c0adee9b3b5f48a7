//! Session phase machine
//!
//! [`transition`] is a pure function of (phase, event). It returns the next
//! phase and the effects the session must carry out, in order. Nothing here
//! touches the store.

use std::fmt;

use crate::core::error::{AxisError, Result};
use crate::entities::result::normalize_work_order;

/// Editing mode while a drawing is loaded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// Placing balloons and editing specs
    Ballooning,
    /// Entering results for one work order
    Inspection { work_order: String },
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Mode::Ballooning => f.write_str("ballooning"),
            Mode::Inspection { work_order } => write!(f, "inspection ({work_order})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    NoDrawingLoaded,
    DrawingLoaded(Mode),
}

impl Phase {
    pub fn mode(&self) -> Option<&Mode> {
        match self {
            Phase::NoDrawingLoaded => None,
            Phase::DrawingLoaded(mode) => Some(mode),
        }
    }

    pub fn is_loaded(&self) -> bool {
        matches!(self, Phase::DrawingLoaded(_))
    }
}

/// Inputs to the phase machine
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// A drawing's store was opened
    Load,
    EnterBallooning,
    EnterInspection(String),
    Close,
}

/// Why observers are being notified
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Loaded,
    ModeChanged,
    FeaturesChanged,
    ResultsChanged,
    ViewChanged,
    /// The mirror was re-read after a desync
    Refreshed,
    Closed,
}

/// Commands the session executes after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    ResetHistory,
    ResetView,
    ReleaseStore,
    ReloadMirror,
    ClearMirror,
    Notify(ChangeKind),
}

/// Next phase and effects for `event` in `phase`
pub fn transition(phase: &Phase, event: &Event) -> Result<(Phase, Vec<Effect>)> {
    use Effect::*;

    match (phase, event) {
        (_, Event::Load) => Ok((
            Phase::DrawingLoaded(Mode::Ballooning),
            vec![ResetHistory, ResetView, ReloadMirror, Notify(ChangeKind::Loaded)],
        )),

        (Phase::NoDrawingLoaded, Event::Close) => Ok((Phase::NoDrawingLoaded, Vec::new())),
        (Phase::NoDrawingLoaded, _) => Err(AxisError::validation("no drawing is loaded")),

        (Phase::DrawingLoaded(Mode::Ballooning), Event::EnterBallooning) => {
            Ok((phase.clone(), Vec::new()))
        }
        (Phase::DrawingLoaded(_), Event::EnterBallooning) => Ok((
            Phase::DrawingLoaded(Mode::Ballooning),
            vec![ReloadMirror, Notify(ChangeKind::ModeChanged)],
        )),

        (Phase::DrawingLoaded(current), Event::EnterInspection(work_order)) => {
            let work_order = normalize_work_order(work_order)
                .ok_or_else(|| AxisError::validation("work order must not be empty"))?;
            let next = Mode::Inspection { work_order };
            if *current == next {
                return Ok((phase.clone(), Vec::new()));
            }
            Ok((
                Phase::DrawingLoaded(next),
                vec![ReloadMirror, Notify(ChangeKind::ModeChanged)],
            ))
        }

        (Phase::DrawingLoaded(_), Event::Close) => Ok((
            Phase::NoDrawingLoaded,
            vec![ResetHistory, ReleaseStore, ClearMirror, Notify(ChangeKind::Closed)],
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn inspection(wo: &str) -> Phase {
        Phase::DrawingLoaded(Mode::Inspection {
            work_order: wo.to_string(),
        })
    }

    #[test]
    fn test_load_enters_ballooning() {
        let (phase, effects) = transition(&Phase::NoDrawingLoaded, &Event::Load).unwrap();
        assert_eq!(phase, Phase::DrawingLoaded(Mode::Ballooning));
        assert_eq!(effects.last(), Some(&Effect::Notify(ChangeKind::Loaded)));
    }

    #[test]
    fn test_mode_toggles_only_when_loaded() {
        assert!(transition(&Phase::NoDrawingLoaded, &Event::EnterBallooning).is_err());
        assert!(transition(&Phase::NoDrawingLoaded, &Event::EnterInspection("WO1".into())).is_err());

        let loaded = Phase::DrawingLoaded(Mode::Ballooning);
        let (phase, effects) = transition(&loaded, &Event::EnterInspection(" WO1 ".into())).unwrap();
        assert_eq!(phase, inspection("WO1"));
        assert_eq!(effects, vec![Effect::ReloadMirror, Effect::Notify(ChangeKind::ModeChanged)]);

        let (phase, effects) = transition(&phase, &Event::EnterInspection("WO1".into())).unwrap();
        assert_eq!(phase, inspection("WO1"));
        assert!(effects.is_empty());

        let (phase, _) = transition(&phase, &Event::EnterBallooning).unwrap();
        assert_eq!(phase, Phase::DrawingLoaded(Mode::Ballooning));
    }

    #[test]
    fn test_empty_work_order_is_rejected() {
        let loaded = Phase::DrawingLoaded(Mode::Ballooning);
        assert!(transition(&loaded, &Event::EnterInspection("  ".into())).is_err());
    }

    #[test]
    fn test_close_returns_to_no_drawing() {
        let (phase, effects) = transition(&inspection("WO1"), &Event::Close).unwrap();
        assert_eq!(phase, Phase::NoDrawingLoaded);
        assert!(effects.contains(&Effect::ReleaseStore));

        let (phase, effects) = transition(&Phase::NoDrawingLoaded, &Event::Close).unwrap();
        assert_eq!(phase, Phase::NoDrawingLoaded);
        assert!(effects.is_empty());
    }
}
