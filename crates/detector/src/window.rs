//! Per-window change detection
//!
//! For each configured window the new price is compared against the
//! observation nearest to `now - window`, and against every observation
//! inside the window to decide whether it is a local high or low.

use chrono::NaiveDateTime;
use rust_decimal::{Decimal, RoundingStrategy};

use pricewatch_core::{AlertEvent, AlertKind, Direction, PriceObservation, SkipReason, Window};
use pricewatch_feed::PriceSeries;

/// Decimal places kept on percent changes
pub const PERCENT_SCALE: u32 = 3;

/// Percent move from `historic` to `current`, always positive, rounded half
/// away from zero. `None` when the prices are equal or `historic` is zero.
pub fn percent_change(historic: Decimal, current: Decimal) -> Option<(Direction, Decimal)> {
    if historic == current {
        return None;
    }
    let scaled = current
        .checked_div(historic)?
        .checked_mul(Decimal::ONE_HUNDRED)?;

    let (direction, change) = if current > historic {
        (Direction::Up, scaled - Decimal::ONE_HUNDRED)
    } else {
        (Direction::Down, Decimal::ONE_HUNDRED - scaled)
    };
    Some((
        direction,
        change.round_dp_with_strategy(PERCENT_SCALE, RoundingStrategy::MidpointAwayFromZero),
    ))
}

/// Whether `price` is the highest and/or lowest of `observations`
pub fn extremes(observations: &[PriceObservation], price: Decimal) -> (bool, bool) {
    let mut was_ath = true;
    let mut was_atl = true;
    for o in observations {
        if o.price > price {
            was_ath = false;
        }
        if o.price < price {
            was_atl = false;
        }
        if !was_ath && !was_atl {
            break;
        }
    }
    (was_ath, was_atl)
}

/// Result of evaluating one window
#[derive(Debug, Clone, PartialEq)]
pub enum Evaluation {
    Skipped(SkipReason),
    /// Reference price equals the current one
    Unchanged,
    Moved(WindowOutcome),
}

/// A price move measured over one window
#[derive(Debug, Clone, PartialEq)]
pub struct WindowOutcome {
    pub window: Window,
    pub direction: Direction,
    pub percent_change: Decimal,
    pub reference: PriceObservation,
    pub current: PriceObservation,
    pub was_ath: bool,
    pub was_atl: bool,
    pub meets_threshold: bool,
}

impl WindowOutcome {
    /// Threshold met and the price is a new extreme in its direction
    pub fn is_alert(&self) -> bool {
        self.meets_threshold
            && match self.direction {
                Direction::Up => self.was_ath,
                Direction::Down => self.was_atl,
            }
    }

    /// Threshold met but the price is not a new extreme
    pub fn is_suppressed(&self) -> bool {
        self.meets_threshold && !self.is_alert()
    }

    pub fn to_event(&self, symbol: &str) -> AlertEvent {
        AlertEvent {
            symbol: symbol.to_string(),
            kind: match self.direction {
                Direction::Up => AlertKind::Ath,
                Direction::Down => AlertKind::Atl,
            },
            window: Some(self.window.label.clone()),
            threshold: Some(self.window.threshold),
            reference_price: self.reference.price,
            current_price: self.current.price,
            percent_change: self.percent_change,
            reference_timestamp: Some(self.reference.timestamp),
            current_timestamp: self.current.timestamp,
        }
    }
}

/// Evaluates a series against the configured window table
#[derive(Debug, Clone)]
pub struct WindowEvaluator {
    windows: Vec<Window>,
}

impl WindowEvaluator {
    pub fn new(windows: Vec<Window>) -> Self {
        Self { windows }
    }

    pub fn windows(&self) -> &[Window] {
        &self.windows
    }

    /// Evaluate `current` (already appended to `series`) over one window
    pub fn evaluate(
        &self,
        series: &PriceSeries,
        window: &Window,
        current: &PriceObservation,
        now: NaiveDateTime,
    ) -> Evaluation {
        if series.len() < 2 {
            return Evaluation::Skipped(SkipReason::EmptyHistory);
        }
        let Some(reference) = series.nearest(window.duration, now) else {
            return Evaluation::Skipped(SkipReason::EmptyHistory);
        };
        if reference.price.is_zero() {
            return Evaluation::Skipped(SkipReason::DegenerateComparison);
        }

        let Some((direction, change)) = percent_change(reference.price, current.price) else {
            return if reference.price == current.price {
                Evaluation::Unchanged
            } else {
                Evaluation::Skipped(SkipReason::DegenerateComparison)
            };
        };

        let (was_ath, was_atl) = extremes(series.since(now - window.duration), current.price);

        Evaluation::Moved(WindowOutcome {
            window: window.clone(),
            direction,
            percent_change: change,
            reference: *reference,
            current: *current,
            was_ath,
            was_atl,
            meets_threshold: change >= window.threshold,
        })
    }

    /// Every configured window, in configuration order
    pub fn evaluate_all(
        &self,
        series: &PriceSeries,
        current: &PriceObservation,
        now: NaiveDateTime,
    ) -> Vec<Evaluation> {
        self.windows
            .iter()
            .map(|w| self.evaluate(series, w, current, now))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use pricewatch_core::parse_timestamp;
    use proptest::prelude::*;
    use rust_decimal_macros::dec;

    fn ts(raw: &str) -> NaiveDateTime {
        parse_timestamp(raw).unwrap()
    }

    fn five_minutes(threshold: Decimal) -> Window {
        Window::new("5m", Duration::minutes(5), threshold)
    }

    fn moved(evaluation: Evaluation) -> WindowOutcome {
        match evaluation {
            Evaluation::Moved(outcome) => outcome,
            other => panic!("expected a move, got {other:?}"),
        }
    }

    #[test]
    fn test_percent_change_up_and_down() {
        assert_eq!(percent_change(dec!(100), dec!(150)), Some((Direction::Up, dec!(50.000))));
        assert_eq!(percent_change(dec!(150), dec!(100)), Some((Direction::Down, dec!(33.333))));
        assert_eq!(percent_change(dec!(100), dec!(100)), None);
        assert_eq!(percent_change(Decimal::ZERO, dec!(1)), None);
    }

    #[test]
    fn test_percent_change_rounds_half_away_from_zero() {
        // 1.0000125 / 1 * 100 - 100 = 0.00125 -> 0.001
        assert_eq!(
            percent_change(dec!(1), dec!(1.0000125)),
            Some((Direction::Up, dec!(0.001)))
        );
        // 0.0015 exactly rounds up to 0.002
        assert_eq!(
            percent_change(dec!(1), dec!(1.000015)),
            Some((Direction::Up, dec!(0.002)))
        );
    }

    #[test]
    fn test_extremes() {
        let t = ts("2024-03-01 12:00:00");
        let obs = [
            PriceObservation::new(dec!(10), t),
            PriceObservation::new(dec!(20), t),
        ];
        assert_eq!(extremes(&obs, dec!(20)), (true, false));
        assert_eq!(extremes(&obs, dec!(10)), (false, true));
        assert_eq!(extremes(&obs, dec!(15)), (false, false));
        assert_eq!(extremes(&[], dec!(15)), (true, true));
    }

    #[test]
    fn test_single_observation_is_skipped() {
        let t0 = ts("2024-03-01 12:00:00");
        let mut series = PriceSeries::new("BTC", "USD");
        series.append(dec!(100), t0);

        let evaluator = WindowEvaluator::new(vec![five_minutes(dec!(10))]);
        let current = *series.current().unwrap();
        assert_eq!(
            evaluator.evaluate_all(&series, &current, t0),
            vec![Evaluation::Skipped(SkipReason::EmptyHistory)]
        );
    }

    #[test]
    fn test_ath_scenario() {
        let t0 = ts("2024-03-01 12:00:00");
        let t1 = ts("2024-03-01 12:01:00");
        let t2 = ts("2024-03-01 12:03:00");

        let mut series = PriceSeries::new("BTC", "USD");
        series.append(dec!(100), t0);
        assert!(!series.append(dec!(100), t1));
        assert_eq!(series.len(), 1);
        series.append(dec!(150), t2);

        let window = five_minutes(dec!(10));
        let evaluator = WindowEvaluator::new(vec![window.clone()]);
        let current = *series.current().unwrap();
        let outcome = moved(evaluator.evaluate(&series, &window, &current, t2));

        assert!(outcome.is_alert());
        let event = outcome.to_event("BTC");
        assert_eq!(event.kind, AlertKind::Ath);
        assert_eq!(event.percent_change, dec!(50.0));
        assert_eq!(event.reference_price, dec!(100));
        assert_eq!(event.window.as_deref(), Some("5m"));
    }

    #[test]
    fn test_move_below_threshold_does_not_alert() {
        let t0 = ts("2024-03-01 12:00:00");
        let mut series = PriceSeries::new("BTC", "USD");
        series.append(dec!(100), t0);
        series.append(dec!(105), t0 + Duration::minutes(1));

        let window = five_minutes(dec!(10));
        let current = *series.current().unwrap();
        let outcome = moved(WindowEvaluator::new(vec![]).evaluate(
            &series,
            &window,
            &current,
            t0 + Duration::minutes(1),
        ));
        assert!(!outcome.meets_threshold);
        assert!(!outcome.is_alert());
        assert!(!outcome.is_suppressed());
    }

    #[test]
    fn test_non_extreme_move_is_suppressed() {
        let t0 = ts("2024-03-01 12:00:00");
        let mut series = PriceSeries::new("ETH", "USD");
        series.append(dec!(100), t0);
        series.append(dec!(200), t0 + Duration::minutes(1));
        series.append(dec!(150), t0 + Duration::minutes(2));

        let window = five_minutes(dec!(10));
        let now = t0 + Duration::minutes(2);
        let current = *series.current().unwrap();
        let outcome = moved(WindowEvaluator::new(vec![]).evaluate(&series, &window, &current, now));

        // nearest to 11:57 is the 100 at 12:00, but 200 inside the window beats 150
        assert_eq!(outcome.direction, Direction::Up);
        assert!(!outcome.was_ath);
        assert!(outcome.is_suppressed());
    }

    #[test]
    fn test_atl_fires_on_new_low() {
        let t0 = ts("2024-03-01 12:00:00");
        let mut series = PriceSeries::new("SOL", "USD");
        series.append(dec!(150), t0);
        series.append(dec!(100), t0 + Duration::minutes(1));

        let window = five_minutes(dec!(10));
        let now = t0 + Duration::minutes(1);
        let current = *series.current().unwrap();
        let outcome = moved(WindowEvaluator::new(vec![]).evaluate(&series, &window, &current, now));

        assert!(outcome.is_alert());
        let event = outcome.to_event("SOL");
        assert_eq!(event.kind, AlertKind::Atl);
        assert_eq!(event.percent_change, dec!(33.333));
    }

    #[test]
    fn test_zero_reference_is_degenerate() {
        let t0 = ts("2024-03-01 12:00:00");
        let series = PriceSeries::with_history(
            "NEW",
            "USD",
            vec![
                PriceObservation::new(Decimal::ZERO, t0),
                PriceObservation::new(dec!(5), t0 + Duration::minutes(4)),
            ],
        );

        let current = *series.current().unwrap();
        let window = five_minutes(dec!(1));
        assert_eq!(
            WindowEvaluator::new(vec![]).evaluate(&series, &window, &current, t0 + Duration::minutes(4)),
            Evaluation::Skipped(SkipReason::DegenerateComparison)
        );
    }

    #[test]
    fn test_reference_equal_to_current_is_unchanged() {
        let t0 = ts("2024-03-01 12:00:00");
        let mut series = PriceSeries::new("BTC", "USD");
        series.append(dec!(100), t0);
        series.append(dec!(101), t0 + Duration::minutes(1));
        series.append(dec!(100), t0 + Duration::minutes(2));

        // 5m ago is closest to the first 100
        let window = five_minutes(dec!(0.1));
        let now = t0 + Duration::minutes(2);
        let current = *series.current().unwrap();
        assert_eq!(
            WindowEvaluator::new(vec![]).evaluate(&series, &window, &current, now),
            Evaluation::Unchanged
        );
    }

    proptest! {
        #[test]
        fn prop_ath_flag_matches_window_contents(
            prices in proptest::collection::vec(1u32..1000, 2..50),
            window_secs in 1i64..3000,
        ) {
            let t0 = ts("2024-03-01 12:00:00");
            let mut series = PriceSeries::new("BTC", "USD");
            for (i, p) in prices.iter().enumerate() {
                series.append(Decimal::from(*p), t0 + Duration::seconds(i as i64 * 60));
            }
            let now = t0 + Duration::seconds(prices.len() as i64 * 60);
            let current = *series.current().unwrap();
            let window = Window::new("w", Duration::seconds(window_secs), Decimal::ZERO);

            if let Evaluation::Moved(outcome) =
                WindowEvaluator::new(vec![]).evaluate(&series, &window, &current, now)
            {
                let cutoff = now - window.duration;
                let expected = !series
                    .observations()
                    .iter()
                    .any(|o| o.timestamp > cutoff && o.price > current.price);
                prop_assert_eq!(outcome.was_ath, expected);
            }
        }
    }
}
