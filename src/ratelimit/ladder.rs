//! Escalation ladder for the graduated abuse detector.
//!
//! Each rung covers a band of per-window request counts and names what to do
//! when a request lands in it. Rungs are kept sorted from the highest band
//! down, so only the most severe applicable rung fires. Adding a severity is
//! inserting a rung.

use std::time::Duration;

/// What the detector does for a request whose count lands on a rung.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Block immediately for this long.
    Block(Duration),
    /// Record a warning; block for `block` once `max_warnings` accumulate.
    Warn { max_warnings: i64, block: Duration },
}

/// One band of the ladder: counts in `(above, up_to]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rung {
    /// Exclusive lower bound
    pub above: i64,
    /// Inclusive upper bound; `None` means unbounded
    pub up_to: Option<i64>,
    /// Action for counts in the band
    pub action: Action,
}

impl Rung {
    /// Create a rung.
    pub fn new(above: i64, up_to: Option<i64>, action: Action) -> Self {
        Self {
            above,
            up_to,
            action,
        }
    }

    /// Whether `count` falls in this band.
    pub fn matches(&self, count: i64) -> bool {
        count > self.above && self.up_to.map_or(true, |up_to| count <= up_to)
    }
}

/// Ordered list of rungs, evaluated top-down.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ladder {
    rungs: Vec<Rung>,
}

impl Ladder {
    /// Build a ladder. Rungs are sorted highest band first.
    pub fn new(mut rungs: Vec<Rung>) -> Self {
        rungs.sort_by(|a, b| b.above.cmp(&a.above));
        Self { rungs }
    }

    /// The action for `count`, or `None` when no rung applies.
    pub fn classify(&self, count: i64) -> Option<Action> {
        self.rungs
            .iter()
            .find(|rung| rung.matches(count))
            .map(|rung| rung.action)
    }

    /// Rungs, highest first.
    pub fn rungs(&self) -> &[Rung] {
        &self.rungs
    }
}

impl Default for Ladder {
    /// More than 120 per minute: 30 minutes. More than 90: 5 minutes.
    /// More than 60: warn, and block for a minute on the third warning.
    fn default() -> Self {
        Self::new(vec![
            Rung::new(120, None, Action::Block(Duration::from_secs(1800))),
            Rung::new(90, Some(120), Action::Block(Duration::from_secs(300))),
            Rung::new(
                60,
                Some(90),
                Action::Warn {
                    max_warnings: 3,
                    block: Duration::from_secs(60),
                },
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_ladder_bands() {
        let ladder = Ladder::default();

        assert_eq!(ladder.classify(1), None);
        assert_eq!(ladder.classify(60), None);
        assert!(matches!(ladder.classify(61), Some(Action::Warn { max_warnings: 3, .. })));
        assert!(matches!(ladder.classify(90), Some(Action::Warn { .. })));
        assert_eq!(ladder.classify(91), Some(Action::Block(Duration::from_secs(300))));
        assert_eq!(ladder.classify(120), Some(Action::Block(Duration::from_secs(300))));
        assert_eq!(ladder.classify(121), Some(Action::Block(Duration::from_secs(1800))));
        assert_eq!(ladder.classify(10_000), Some(Action::Block(Duration::from_secs(1800))));
    }

    #[test]
    fn test_rungs_sorted_high_to_low() {
        let ladder = Ladder::new(vec![
            Rung::new(10, None, Action::Block(Duration::from_secs(1))),
            Rung::new(50, None, Action::Block(Duration::from_secs(2))),
        ]);

        assert_eq!(ladder.rungs()[0].above, 50);
        // Overlapping unbounded rungs: the higher one wins.
        assert_eq!(ladder.classify(51), Some(Action::Block(Duration::from_secs(2))));
        assert_eq!(ladder.classify(11), Some(Action::Block(Duration::from_secs(1))));
    }

    #[test]
    fn test_inserting_a_rung() {
        let mut rungs = Ladder::default().rungs().to_vec();
        rungs.push(Rung::new(500, None, Action::Block(Duration::from_secs(86_400))));
        let ladder = Ladder::new(rungs);

        assert_eq!(ladder.classify(501), Some(Action::Block(Duration::from_secs(86_400))));
        assert_eq!(ladder.classify(200), Some(Action::Block(Duration::from_secs(1800))));
    }
}
