//! Button edge detection and press-to-segment alignment.

use std::collections::{HashSet, VecDeque};

use shotscope_common::config::LabelerConfig;
use shotscope_common::error::{ShotscopeError, ShotscopeResult};
use shotscope_model::segment::{ShotLabel, ShotSegment};

/// Closed segments remembered for alignment.
const CLOSED_HISTORY: usize = 32;

/// Result of a confirmed press.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelOutcome {
    Assigned {
        shot_id: String,
        label: ShotLabel,
        t_label: u64,
        delay_ms: u64,
    },
    Unmatched {
        t_label: u64,
    },
}

#[derive(Debug, Clone)]
pub struct Labeler {
    config: LabelerConfig,
    positive: ShotLabel,
    /// Last accepted button level.
    stable: Option<u8>,
    /// Level differing from `stable` and when it first appeared.
    candidate: Option<(u8, u64)>,
    /// `(shot_id, t_end)`, oldest first.
    closed: VecDeque<(String, u64)>,
    labeled: HashSet<String>,
}

impl Labeler {
    pub fn new(config: LabelerConfig) -> ShotscopeResult<Self> {
        let positive: ShotLabel = config
            .positive_label
            .parse()
            .map_err(|e| ShotscopeError::config(format!("labeler.positive_label: {e}")))?;
        Ok(Self {
            config,
            positive,
            stable: None,
            candidate: None,
            closed: VecDeque::with_capacity(CLOSED_HISTORY),
            labeled: HashSet::new(),
        })
    }

    pub fn config(&self) -> &LabelerConfig {
        &self.config
    }

    /// Make a closed segment eligible for press labels.
    pub fn segment_closed(&mut self, segment: &ShotSegment) {
        let Some(t_end) = segment.t_end else {
            return;
        };
        if self.closed.len() == CLOSED_HISTORY {
            if let Some((old, _)) = self.closed.pop_front() {
                self.labeled.remove(&old);
            }
        }
        self.closed.push_back((segment.shot_id.clone(), t_end));
    }

    /// Exclude a segment from further press labels.
    pub fn mark_labeled(&mut self, shot_id: &str) {
        self.labeled.insert(shot_id.to_string());
    }

    /// Feed one button sample. Returns an outcome for each confirmed press.
    pub fn feed(&mut self, button: u8, t_ms: u64) -> Option<LabelOutcome> {
        let Some(stable) = self.stable else {
            self.stable = Some(button);
            return None;
        };
        if button == stable {
            self.candidate = None;
            return None;
        }

        let since = match self.candidate {
            Some((level, since)) if level == button => since,
            _ => {
                self.candidate = Some((button, t_ms));
                t_ms
            }
        };
        if t_ms.saturating_sub(since) < self.config.debounce_ms {
            return None;
        }

        self.stable = Some(button);
        self.candidate = None;
        if button != self.config.pressed_level {
            return None;
        }
        Some(self.align(since))
    }

    fn align(&mut self, t_evt: u64) -> LabelOutcome {
        for (shot_id, t_end) in self.closed.iter().rev() {
            if t_evt < *t_end {
                continue;
            }
            let delay = t_evt - t_end;
            if delay < self.config.min_delay_ms {
                continue;
            }
            if delay > self.config.max_delay_ms {
                break;
            }
            if !self.labeled.insert(shot_id.clone()) {
                tracing::debug!(%shot_id, "Segment already labeled, press ignored");
                return LabelOutcome::Unmatched { t_label: t_evt };
            }
            return LabelOutcome::Assigned {
                shot_id: shot_id.clone(),
                label: self.positive,
                t_label: t_evt,
                delay_ms: delay,
            };
        }
        tracing::debug!(t_label = t_evt, "Press matched no segment");
        LabelOutcome::Unmatched { t_label: t_evt }
    }

    /// Forget button state and segment history.
    pub fn reset(&mut self) {
        self.stable = None;
        self.candidate = None;
        self.closed.clear();
        self.labeled.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn closed_segment(t_start: u64, t_end: u64) -> ShotSegment {
        let mut seg = ShotSegment::open(t_start);
        seg.t_end = Some(t_end);
        seg
    }

    fn labeler() -> Labeler {
        Labeler::new(LabelerConfig::default()).unwrap()
    }

    /// Button level every 10 ms over `[from, to)`.
    fn run(l: &mut Labeler, from: u64, to: u64, level: u8) -> Vec<LabelOutcome> {
        (from..to)
            .step_by(10)
            .filter_map(|t| l.feed(level, t))
            .collect()
    }

    #[test]
    fn test_press_after_segment_labels_it() {
        let mut l = labeler();
        let seg = closed_segment(1_000, 1_500);
        run(&mut l, 0, 1_500, 0);
        l.segment_closed(&seg);
        run(&mut l, 1_500, 2_500, 0);
        let out = run(&mut l, 2_500, 2_900, 1);
        assert_eq!(
            out,
            vec![LabelOutcome::Assigned {
                shot_id: seg.shot_id.clone(),
                label: ShotLabel::Good,
                t_label: 2_500,
                delay_ms: 1_000,
            }]
        );
    }

    #[test]
    fn test_late_press_is_unmatched() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        l.segment_closed(&closed_segment(1_000, 1_500));
        let out = run(&mut l, 6_500, 6_900, 1);
        assert_eq!(out, vec![LabelOutcome::Unmatched { t_label: 6_500 }]);
    }

    #[test]
    fn test_press_too_soon_is_unmatched() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        l.segment_closed(&closed_segment(1_000, 1_500));
        let out = run(&mut l, 1_600, 2_000, 1);
        assert_eq!(out, vec![LabelOutcome::Unmatched { t_label: 1_600 }]);
    }

    #[test]
    fn test_bounce_collapses_to_single_edge() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        l.segment_closed(&closed_segment(0, 50));
        let mut out = Vec::new();
        for (i, t) in (1_000..1_100).step_by(10).enumerate() {
            out.extend(l.feed((i % 2) as u8, t));
        }
        out.extend(run(&mut l, 1_100, 1_500, 1));
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0], LabelOutcome::Assigned { t_label: 1_090, .. }));
    }

    #[test]
    fn test_segment_labeled_once() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        let seg = closed_segment(0, 1_000);
        l.segment_closed(&seg);
        let first = run(&mut l, 1_500, 1_800, 1);
        run(&mut l, 1_800, 2_100, 0);
        let second = run(&mut l, 2_100, 2_400, 1);
        assert!(matches!(first[0], LabelOutcome::Assigned { .. }));
        assert_eq!(second, vec![LabelOutcome::Unmatched { t_label: 2_100 }]);
    }

    #[test]
    fn test_most_recent_segment_wins() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        let older = closed_segment(0, 1_000);
        let newer = closed_segment(1_200, 1_800);
        l.segment_closed(&older);
        l.segment_closed(&newer);
        let out = run(&mut l, 2_200, 2_500, 1);
        assert!(matches!(
            &out[0],
            LabelOutcome::Assigned { shot_id, delay_ms: 400, .. } if *shot_id == newer.shot_id
        ));
    }

    #[test]
    fn test_manual_mark_blocks_press() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        let seg = closed_segment(0, 1_000);
        l.segment_closed(&seg);
        l.mark_labeled(&seg.shot_id);
        let out = run(&mut l, 1_500, 1_800, 1);
        assert_eq!(out, vec![LabelOutcome::Unmatched { t_label: 1_500 }]);
    }

    #[test]
    fn test_initial_level_is_not_an_edge() {
        let mut l = labeler();
        assert!(run(&mut l, 0, 1_000, 1).is_empty());
    }

    #[test]
    fn test_invalid_positive_label_rejected() {
        let config = LabelerConfig {
            positive_label: "great".into(),
            ..LabelerConfig::default()
        };
        assert!(Labeler::new(config).is_err());
    }

    #[test]
    fn test_reset_forgets_segments() {
        let mut l = labeler();
        run(&mut l, 0, 100, 0);
        l.segment_closed(&closed_segment(0, 1_000));
        l.reset();
        run(&mut l, 1_000, 1_500, 0);
        let out = run(&mut l, 1_500, 1_800, 1);
        assert_eq!(out, vec![LabelOutcome::Unmatched { t_label: 1_500 }]);
    }
}
