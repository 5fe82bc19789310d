//! Per-seat chess clocks with Fischer increment.
//!
//! Only one clock runs at a time. The stored remaining time for the side
//! to move is its value at `turn_started_at`; the live value is derived
//! from it on demand, so nothing has to tick in the background.

use std::time::Duration;

use gambit_protocol::{ClockView, Color, TimeControl};
use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct GameClock {
    white: Duration,
    black: Duration,
    increment: Duration,
    turn_started_at: Option<Instant>,
}

impl GameClock {
    /// Both sides start with the control's initial time. The clock is
    /// stopped until [`start`](Self::start).
    pub fn new(control: &TimeControl) -> Self {
        Self::with_remaining(
            control.initial_duration(),
            control.initial_duration(),
            control.increment_duration(),
        )
    }

    /// A stopped clock with explicit remaining times, used when restoring.
    pub fn with_remaining(white: Duration, black: Duration, increment: Duration) -> Self {
        Self {
            white,
            black,
            increment,
            turn_started_at: None,
        }
    }

    /// Starts timing the side to move from `now`. No-op if already running.
    pub fn start(&mut self, now: Instant) {
        if self.turn_started_at.is_none() {
            self.turn_started_at = Some(now);
        }
    }

    pub fn is_running(&self) -> bool {
        self.turn_started_at.is_some()
    }

    fn slot(&mut self, color: Color) -> &mut Duration {
        match color {
            Color::White => &mut self.white,
            Color::Black => &mut self.black,
        }
    }

    /// Remaining time as of the start of the current turn.
    pub fn stored(&self, color: Color) -> Duration {
        match color {
            Color::White => self.white,
            Color::Black => self.black,
        }
    }

    fn elapsed(&self, now: Instant) -> Duration {
        self.turn_started_at
            .map(|started| now.saturating_duration_since(started))
            .unwrap_or_default()
    }

    /// Live remaining time for `color`, given which side is on move.
    pub fn remaining(&self, color: Color, running: Color, now: Instant) -> Duration {
        let stored = self.stored(color);
        if color == running {
            stored.saturating_sub(self.elapsed(now))
        } else {
            stored
        }
    }

    /// Charges the mover for the time spent on this turn and hands the
    /// clock to the opponent.
    ///
    /// Returns `true` if the mover ran out before the move arrived; in that
    /// case the clock is pinned at zero and no increment is added.
    pub fn charge(&mut self, mover: Color, now: Instant) -> bool {
        let left = self.remaining(mover, mover, now);
        let flagged = left.is_zero();
        let increment = self.increment;
        *self.slot(mover) = if flagged {
            Duration::ZERO
        } else {
            left.saturating_add(increment)
        };
        self.turn_started_at = Some(now);
        flagged
    }

    /// Stops the clock, charging the side on move without increment.
    pub fn stop(&mut self, running: Color, now: Instant) {
        if self.is_running() {
            let left = self.remaining(running, running, now);
            *self.slot(running) = left;
            self.turn_started_at = None;
        }
    }

    /// Returns the side whose time is used up, checking the side to move
    /// first.
    pub fn exhausted(&self, running: Color, now: Instant) -> Option<Color> {
        [running, running.opposite()]
            .into_iter()
            .find(|&color| self.remaining(color, running, now).is_zero())
    }

    /// Builds the wire view. `running` is `None` once the game is over or
    /// before it starts.
    pub fn view(&self, running: Option<Color>, now: Instant) -> ClockView {
        let on_move = running.unwrap_or(Color::White);
        let live = |color| match running {
            Some(_) if self.is_running() => self.remaining(color, on_move, now),
            _ => self.stored(color),
        };
        let ms = |d: Duration| u64::try_from(d.as_millis()).unwrap_or(u64::MAX);
        ClockView {
            white_ms: ms(live(Color::White)),
            black_ms: ms(live(Color::Black)),
            running: running.filter(|_| self.is_running()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn blitz() -> GameClock {
        GameClock::new(&TimeControl {
            initial: 300,
            increment: 5,
        })
    }

    #[test]
    fn test_charge_deducts_elapsed_and_adds_increment() {
        let t0 = Instant::now();
        let mut clock = blitz();
        clock.start(t0);
        let flagged = clock.charge(Color::White, t0 + Duration::from_secs(10));
        assert!(!flagged);
        assert_eq!(clock.stored(Color::White), Duration::from_secs(295));
        assert_eq!(clock.stored(Color::Black), Duration::from_secs(300));
    }

    #[test]
    fn test_charge_after_flag_pins_zero_without_increment() {
        let t0 = Instant::now();
        let mut clock = blitz();
        clock.start(t0);
        let flagged = clock.charge(Color::White, t0 + Duration::from_secs(301));
        assert!(flagged);
        assert_eq!(clock.stored(Color::White), Duration::ZERO);
    }

    #[test]
    fn test_remaining_only_runs_for_side_on_move() {
        let t0 = Instant::now();
        let mut clock = blitz();
        clock.start(t0);
        let later = t0 + Duration::from_secs(7);
        assert_eq!(
            clock.remaining(Color::White, Color::White, later),
            Duration::from_secs(293)
        );
        assert_eq!(
            clock.remaining(Color::Black, Color::White, later),
            Duration::from_secs(300)
        );
    }

    #[test]
    fn test_exhausted_reports_side_out_of_time() {
        let t0 = Instant::now();
        let mut clock = GameClock::with_remaining(
            Duration::from_secs(60),
            Duration::ZERO,
            Duration::ZERO,
        );
        clock.start(t0);
        assert_eq!(clock.exhausted(Color::White, t0), Some(Color::Black));
        assert_eq!(
            clock.exhausted(Color::White, t0 + Duration::from_secs(60)),
            Some(Color::White)
        );
    }

    #[test]
    fn test_stopped_clock_does_not_tick() {
        let t0 = Instant::now();
        let mut clock = blitz();
        clock.start(t0);
        clock.stop(Color::White, t0 + Duration::from_secs(3));
        let view = clock.view(None, t0 + Duration::from_secs(100));
        assert_eq!(view.white_ms, 297_000);
        assert_eq!(view.black_ms, 300_000);
        assert_eq!(view.running, None);
    }

    #[test]
    fn test_charge_huge_increment_saturates() {
        let t0 = Instant::now();
        let mut clock = GameClock::with_remaining(Duration::MAX, Duration::MAX, Duration::MAX);
        clock.start(t0);
        let flagged = clock.charge(Color::White, t0 + Duration::from_secs(1));
        assert!(!flagged);
        assert_eq!(clock.stored(Color::White), Duration::MAX);
        let view = clock.view(Some(Color::Black), t0 + Duration::from_secs(1));
        assert_eq!(view.white_ms, u64::MAX);
    }
}
