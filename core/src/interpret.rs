//! Clinical-significance classification.
//!
//! Two classifications per construct (or calibrated item): whether the
//! current score is clinically significant, and whether the change from
//! the immediately prior score is. Both run through tiered rules that
//! degrade with the available calibration; threshold+MID is the
//! strongest tier and wins when present.

use crate::domain::{Calibration, Direction};
use serde::{Deserialize, Serialize};

/// Rule that decided the current-score classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CurrentRule {
    ThresholdMid,
    NormativeHalfSd,
    ThresholdOnly,
    NormativeMeanOnly,
    NotClassified,
}

/// Rule that decided the change classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeRule {
    Mid,
    NormativeSd,
    RatioFallback,
    ThresholdCrossing,
    NotClassified,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChangeDirection {
    Improving,
    Worsening,
    Unchanged,
    Unknown,
}

/// Classification output for one construct or item.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Interpretation {
    pub current_significant: bool,
    pub change_significant: bool,
    pub change_direction: ChangeDirection,
    pub current_reason: CurrentRule,
    pub change_reason: ChangeRule,
}

impl Interpretation {
    pub fn not_classified() -> Self {
        Self {
            current_significant: false,
            change_significant: false,
            change_direction: ChangeDirection::Unknown,
            current_reason: CurrentRule::NotClassified,
            change_reason: ChangeRule::NotClassified,
        }
    }

    /// Significant on both axes; such constructs rank first in topline
    /// lists.
    pub fn both_axes(&self) -> bool {
        self.current_significant && self.change_significant
    }
}

/// Classify a current score under the tiered rule table.
pub fn classify_current(
    direction: Direction,
    cal: &Calibration,
    score: f64,
) -> (bool, CurrentRule) {
    match direction {
        Direction::HigherBetter => classify_low_tail(cal, score),
        Direction::LowerBetter => classify_high_tail(cal, score),
        Direction::MiddleBetter => {
            let (low_sig, low_rule) = classify_low_tail(cal, score);
            let (high_sig, high_rule) = classify_high_tail(cal, score);
            // Both tails run the same tier, so either rule names it.
            let rule = if low_rule == CurrentRule::NotClassified {
                high_rule
            } else {
                low_rule
            };
            (low_sig || high_sig, rule)
        }
        Direction::None => (false, CurrentRule::NotClassified),
    }
}

/// Low-tail rules: a score that is too *low* is significant
/// (Higher-Better, and the lower tail of Middle-Better).
fn classify_low_tail(cal: &Calibration, score: f64) -> (bool, CurrentRule) {
    if let (Some(threshold), Some(mid)) = (cal.threshold, cal.mid) {
        return (score <= threshold - mid, CurrentRule::ThresholdMid);
    }
    if let (Some(mean), Some(sd)) = (cal.normative_mean, cal.normative_sd) {
        return (score <= mean - 0.5 * sd, CurrentRule::NormativeHalfSd);
    }
    if let Some(threshold) = cal.threshold {
        return (score < threshold, CurrentRule::ThresholdOnly);
    }
    if let Some(mean) = cal.normative_mean {
        return (score < mean, CurrentRule::NormativeMeanOnly);
    }
    (false, CurrentRule::NotClassified)
}

/// High-tail rules: mirror image of [`classify_low_tail`].
fn classify_high_tail(cal: &Calibration, score: f64) -> (bool, CurrentRule) {
    if let (Some(threshold), Some(mid)) = (cal.threshold, cal.mid) {
        return (score >= threshold + mid, CurrentRule::ThresholdMid);
    }
    if let (Some(mean), Some(sd)) = (cal.normative_mean, cal.normative_sd) {
        return (score >= mean + 0.5 * sd, CurrentRule::NormativeHalfSd);
    }
    if let Some(threshold) = cal.threshold {
        return (score > threshold, CurrentRule::ThresholdOnly);
    }
    if let Some(mean) = cal.normative_mean {
        return (score > mean, CurrentRule::NormativeMeanOnly);
    }
    (false, CurrentRule::NotClassified)
}

/// Classify the change against the immediately prior score.
///
/// `fallback_ratio` is the relative-change cut used when neither MID
/// nor a normative SD is calibrated.
pub fn classify_change(
    direction: Direction,
    cal: &Calibration,
    current: f64,
    previous: Option<f64>,
    fallback_ratio: f64,
) -> (bool, ChangeDirection, ChangeRule) {
    let Some(previous) = previous else {
        return (false, ChangeDirection::Unknown, ChangeRule::NotClassified);
    };
    let delta = current - previous;

    let change_direction = direction_of_change(direction, cal, current, previous);

    if direction == Direction::MiddleBetter {
        if let Some(center) = cal.threshold.or(cal.normative_mean) {
            let crossed =
                delta != 0.0 && (previous - center) * (current - center) <= 0.0;
            return (crossed, change_direction, ChangeRule::ThresholdCrossing);
        }
    }

    if let Some(mid) = cal.mid {
        let significant =
            delta.abs() >= mid && change_direction == ChangeDirection::Worsening;
        return (significant, change_direction, ChangeRule::Mid);
    }
    if let Some(sd) = cal.normative_sd {
        return (delta.abs() >= sd, change_direction, ChangeRule::NormativeSd);
    }

    let significant = if previous == 0.0 {
        delta != 0.0
    } else {
        (delta.abs() / previous.abs()) >= fallback_ratio
    };
    (significant, change_direction, ChangeRule::RatioFallback)
}

fn direction_of_change(
    direction: Direction,
    cal: &Calibration,
    current: f64,
    previous: f64,
) -> ChangeDirection {
    let delta = current - previous;
    if delta == 0.0 {
        return ChangeDirection::Unchanged;
    }
    match direction {
        Direction::HigherBetter => {
            if delta > 0.0 {
                ChangeDirection::Improving
            } else {
                ChangeDirection::Worsening
            }
        }
        Direction::LowerBetter => {
            if delta < 0.0 {
                ChangeDirection::Improving
            } else {
                ChangeDirection::Worsening
            }
        }
        Direction::MiddleBetter => {
            // Moving toward the calibrated center is improvement.
            match cal.threshold.or(cal.normative_mean) {
                Some(center) => {
                    let before = (previous - center).abs();
                    let after = (current - center).abs();
                    if after < before {
                        ChangeDirection::Improving
                    } else if after > before {
                        ChangeDirection::Worsening
                    } else {
                        ChangeDirection::Unchanged
                    }
                }
                None => ChangeDirection::Unknown,
            }
        }
        Direction::None => ChangeDirection::Unknown,
    }
}

/// Full interpretation of one score series point.
pub fn interpret(
    direction: Direction,
    cal: &Calibration,
    current: Option<f64>,
    previous: Option<f64>,
    fallback_ratio: f64,
) -> Interpretation {
    // Null scores render as a sentinel downstream and are never
    // classified.
    let Some(current) = current else {
        return Interpretation::not_classified();
    };

    let (current_significant, current_reason) = classify_current(direction, cal, current);
    let (change_significant, change_direction, change_reason) =
        classify_change(direction, cal, current, previous, fallback_ratio);

    Interpretation {
        current_significant,
        change_significant,
        change_direction,
        current_reason,
        change_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cal(
        mean: Option<f64>,
        sd: Option<f64>,
        threshold: Option<f64>,
        mid: Option<f64>,
    ) -> Calibration {
        Calibration {
            normative_mean: mean,
            normative_sd: sd,
            threshold,
            mid,
        }
    }

    #[test]
    fn test_threshold_mid_rule_higher_better() {
        let c = cal(None, None, Some(3.0), Some(0.5));
        // Significant iff score <= 2.5
        assert_eq!(
            classify_current(Direction::HigherBetter, &c, 2.5),
            (true, CurrentRule::ThresholdMid)
        );
        assert_eq!(
            classify_current(Direction::HigherBetter, &c, 2.6),
            (false, CurrentRule::ThresholdMid)
        );
    }

    #[test]
    fn test_threshold_mid_rule_mirrors_for_lower_better() {
        let c = cal(None, None, Some(3.0), Some(0.5));
        assert_eq!(
            classify_current(Direction::LowerBetter, &c, 3.5),
            (true, CurrentRule::ThresholdMid)
        );
        assert_eq!(
            classify_current(Direction::LowerBetter, &c, 3.4),
            (false, CurrentRule::ThresholdMid)
        );
    }

    #[test]
    fn test_normative_half_sd_beats_bare_threshold() {
        // Threshold present but no MID, with full normative data: the
        // normative tier decides.
        let c = cal(Some(50.0), Some(10.0), Some(40.0), None);
        let (sig, rule) = classify_current(Direction::HigherBetter, &c, 44.0);
        assert_eq!(rule, CurrentRule::NormativeHalfSd);
        assert!(sig); // 44 <= 50 - 5
    }

    #[test]
    fn test_threshold_only_is_strict() {
        let c = cal(None, None, Some(3.0), None);
        assert_eq!(
            classify_current(Direction::HigherBetter, &c, 3.0),
            (false, CurrentRule::ThresholdOnly)
        );
        assert_eq!(
            classify_current(Direction::HigherBetter, &c, 2.9),
            (true, CurrentRule::ThresholdOnly)
        );
    }

    #[test]
    fn test_mean_only_rule() {
        let c = cal(Some(10.0), None, None, None);
        assert_eq!(
            classify_current(Direction::LowerBetter, &c, 10.5),
            (true, CurrentRule::NormativeMeanOnly)
        );
    }

    #[test]
    fn test_middle_better_unions_the_tails() {
        let c = cal(Some(0.0), Some(2.0), None, None);
        assert!(classify_current(Direction::MiddleBetter, &c, -1.5).0);
        assert!(classify_current(Direction::MiddleBetter, &c, 1.5).0);
        assert!(!classify_current(Direction::MiddleBetter, &c, 0.5).0);
    }

    #[test]
    fn test_uncalibrated_is_not_classified() {
        let c = cal(None, None, None, None);
        assert_eq!(
            classify_current(Direction::HigherBetter, &c, 5.0),
            (false, CurrentRule::NotClassified)
        );
        assert_eq!(
            classify_current(Direction::None, &cal(Some(1.0), None, None, None), 5.0),
            (false, CurrentRule::NotClassified)
        );
    }

    #[test]
    fn test_mid_change_rule_requires_worsening() {
        let c = cal(None, None, Some(3.0), Some(0.5));
        // 4.0 → 3.4: worsening by 0.6 >= MID
        let (sig, dir, rule) =
            classify_change(Direction::HigherBetter, &c, 3.4, Some(4.0), 0.10);
        assert!(sig);
        assert_eq!(dir, ChangeDirection::Worsening);
        assert_eq!(rule, ChangeRule::Mid);

        // Improvement of the same size is not flagged under MID.
        let (sig, dir, _) = classify_change(Direction::HigherBetter, &c, 4.0, Some(3.4), 0.10);
        assert!(!sig);
        assert_eq!(dir, ChangeDirection::Improving);
    }

    #[test]
    fn test_sd_change_fallback_is_magnitude_only() {
        let c = cal(Some(50.0), Some(2.0), None, None);
        let (sig, dir, rule) =
            classify_change(Direction::HigherBetter, &c, 54.0, Some(50.0), 0.10);
        assert!(sig);
        assert_eq!(dir, ChangeDirection::Improving);
        assert_eq!(rule, ChangeRule::NormativeSd);
    }

    #[test]
    fn test_ratio_fallback() {
        let c = cal(None, None, None, None);
        let (sig, _, rule) = classify_change(Direction::LowerBetter, &c, 11.0, Some(10.0), 0.10);
        assert!(sig); // 10% exactly
        assert_eq!(rule, ChangeRule::RatioFallback);

        let (sig, _, _) = classify_change(Direction::LowerBetter, &c, 10.9, Some(10.0), 0.10);
        assert!(!sig);
    }

    #[test]
    fn test_middle_better_change_triggers_on_crossing() {
        let c = cal(None, None, Some(5.0), None);
        let (sig, _, rule) = classify_change(Direction::MiddleBetter, &c, 6.0, Some(4.0), 0.10);
        assert!(sig);
        assert_eq!(rule, ChangeRule::ThresholdCrossing);

        let (sig, _, _) = classify_change(Direction::MiddleBetter, &c, 4.5, Some(4.0), 0.10);
        assert!(!sig);
    }

    #[test]
    fn test_no_prior_score_is_unknown() {
        let c = cal(None, None, Some(3.0), Some(0.5));
        let (sig, dir, rule) = classify_change(Direction::HigherBetter, &c, 3.0, None, 0.10);
        assert!(!sig);
        assert_eq!(dir, ChangeDirection::Unknown);
        assert_eq!(rule, ChangeRule::NotClassified);
    }

    #[test]
    fn test_null_score_is_never_classified() {
        let c = cal(Some(10.0), Some(2.0), None, None);
        let interp = interpret(Direction::HigherBetter, &c, None, Some(9.0), 0.10);
        assert_eq!(interp, Interpretation::not_classified());
    }

    #[test]
    fn test_direction_mirror_round_trip() {
        // Flipping direction inverts the classification on the
        // mirrored input.
        let c = cal(None, None, Some(0.0), Some(1.0));
        for score in [-3.0, -1.0, -0.5, 0.5, 1.0, 3.0] {
            let higher = classify_current(Direction::HigherBetter, &c, score).0;
            let lower = classify_current(Direction::LowerBetter, &c, -score).0;
            assert_eq!(higher, lower, "score {score}");
        }
    }
}
