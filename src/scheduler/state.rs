//! Render scheduling state machine
//!
//! Viewport events arm two deadlines: a short one for a responsive pass and
//! a long one for a final pass. The machine is pure; the driver feeds it the
//! clock.

use std::str::FromStr;
use std::time::{Duration, Instant};

use crate::engine::Fidelity;
use crate::error::ViewerError;
use crate::settings::SchedulerSettings;

/// Viewport changes reported by the host
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewportEvent {
    Resize,
    Scroll,
    /// Distinct end-of-scroll signal, where the environment has one
    ScrollEnd,
}

impl FromStr for ViewportEvent {
    type Err = ViewerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "resize" => Ok(ViewportEvent::Resize),
            "scroll" => Ok(ViewportEvent::Scroll),
            "scrollend" => Ok(ViewportEvent::ScrollEnd),
            other => Err(ViewerError::InvalidViewportEvent(other.to_string())),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchedulerState {
    Idle,
    PendingResponsive,
    PendingFinal,
}

#[derive(Clone, Debug)]
pub struct RenderScheduler {
    responsive_delay: Duration,
    final_delay: Duration,
    scroll_end_supported: bool,
    responsive_at: Option<Instant>,
    final_at: Option<Instant>,
}

impl RenderScheduler {
    #[must_use]
    pub fn new(settings: &SchedulerSettings, scroll_end_supported: bool) -> Self {
        Self {
            responsive_delay: settings.responsive_delay(),
            final_delay: settings.final_delay(),
            scroll_end_supported,
            responsive_at: None,
            final_at: None,
        }
    }

    #[must_use]
    pub fn state(&self) -> SchedulerState {
        if self.final_at.is_some() {
            SchedulerState::PendingFinal
        } else if self.responsive_at.is_some() {
            SchedulerState::PendingResponsive
        } else {
            SchedulerState::Idle
        }
    }

    /// Re-arm timers for a viewport event observed at `now`.
    pub fn on_event(&mut self, event: ViewportEvent, now: Instant) {
        match event {
            ViewportEvent::Resize => self.arm_both(now),
            ViewportEvent::Scroll if self.scroll_end_supported => {
                self.responsive_at = Some(now + self.responsive_delay);
            }
            ViewportEvent::Scroll => self.arm_both(now),
            ViewportEvent::ScrollEnd => {
                self.final_at = Some(now + self.final_delay);
            }
        }
    }

    fn arm_both(&mut self, now: Instant) {
        self.responsive_at = Some(now + self.responsive_delay);
        self.final_at = Some(now + self.final_delay);
    }

    /// Earliest armed deadline.
    #[must_use]
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.responsive_at, self.final_at) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every deadline that has passed. A due final pass subsumes a due
    /// responsive one and returns the machine to idle; a responsive pass
    /// leaves a pending final deadline untouched.
    pub fn poll(&mut self, now: Instant) -> Vec<Fidelity> {
        if self.final_at.is_some_and(|at| at <= now) {
            self.final_at = None;
            self.responsive_at = None;
            return vec![Fidelity::Final];
        }

        if self.responsive_at.is_some_and(|at| at <= now) {
            self.responsive_at = None;
            return vec![Fidelity::Responsive];
        }

        Vec::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scheduler(scroll_end: bool) -> RenderScheduler {
        RenderScheduler::new(
            &SchedulerSettings {
                responsive_delay_ms: 100,
                final_delay_ms: 600,
            },
            scroll_end,
        )
    }

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    /// Drive the scheduler through `events` (offsets from t0) and poll at
    /// every millisecond until quiet, collecting emitted passes.
    fn run_burst(scheduler: &mut RenderScheduler, events: &[(u64, ViewportEvent)]) -> Vec<Fidelity> {
        let t0 = Instant::now();
        let mut emitted = Vec::new();
        let mut pending = events.iter().peekable();
        for tick in 0..5_000 {
            let now = t0 + ms(tick);
            while let Some((at, event)) = pending.peek() {
                if *at > tick {
                    break;
                }
                scheduler.on_event(*event, now);
                pending.next();
            }
            emitted.extend(scheduler.poll(now));
        }
        emitted
    }

    #[test]
    fn resize_arms_both_timers() {
        let mut s = scheduler(false);
        let t0 = Instant::now();
        s.on_event(ViewportEvent::Resize, t0);

        assert_eq!(s.state(), SchedulerState::PendingFinal);
        assert_eq!(s.next_deadline(), Some(t0 + ms(100)));
    }

    #[test]
    fn short_timer_keeps_pending_final() {
        let mut s = scheduler(false);
        let t0 = Instant::now();
        s.on_event(ViewportEvent::Resize, t0);

        assert_eq!(s.poll(t0 + ms(100)), vec![Fidelity::Responsive]);
        assert_eq!(s.state(), SchedulerState::PendingFinal);
        assert_eq!(s.poll(t0 + ms(600)), vec![Fidelity::Final]);
        assert_eq!(s.state(), SchedulerState::Idle);
    }

    #[test]
    fn final_subsumes_responsive_when_both_due() {
        let mut s = scheduler(false);
        let t0 = Instant::now();
        s.on_event(ViewportEvent::Resize, t0);

        assert_eq!(s.poll(t0 + ms(1_000)), vec![Fidelity::Final]);
        assert!(s.poll(t0 + ms(1_001)).is_empty());
    }

    #[test]
    fn scroll_with_scroll_end_arms_responsive_only() {
        let mut s = scheduler(true);
        let t0 = Instant::now();
        s.on_event(ViewportEvent::Scroll, t0);
        assert_eq!(s.state(), SchedulerState::PendingResponsive);

        s.on_event(ViewportEvent::ScrollEnd, t0 + ms(10));
        assert_eq!(s.state(), SchedulerState::PendingFinal);
    }

    #[test]
    fn scroll_without_scroll_end_arms_both() {
        let mut s = scheduler(false);
        s.on_event(ViewportEvent::Scroll, Instant::now());
        assert_eq!(s.state(), SchedulerState::PendingFinal);
    }

    #[test]
    fn burst_inside_short_window_settles_to_one_of_each() {
        let mut s = scheduler(false);
        let events: Vec<_> = (0..20)
            .map(|i| {
                let event = if i % 2 == 0 {
                    ViewportEvent::Resize
                } else {
                    ViewportEvent::Scroll
                };
                (i * 7, event)
            })
            .collect();

        let emitted = run_burst(&mut s, &events);
        assert_eq!(emitted, vec![Fidelity::Responsive, Fidelity::Final]);
    }

    #[test]
    fn scroll_only_burst_with_scroll_end_collapses_to_one_responsive() {
        let mut s = scheduler(true);
        let events: Vec<_> = (0..10).map(|i| (i * 20, ViewportEvent::Scroll)).collect();

        assert_eq!(run_burst(&mut s, &events), vec![Fidelity::Responsive]);
    }

    #[test]
    fn unknown_event_names_are_rejected() {
        assert_eq!("resize".parse::<ViewportEvent>(), Ok(ViewportEvent::Resize));
        assert!(matches!(
            "zoom".parse::<ViewportEvent>(),
            Err(ViewerError::InvalidViewportEvent(_))
        ));
    }
}
