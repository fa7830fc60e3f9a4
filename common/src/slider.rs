//! Slide-to-confirm control.
//!
//! A one-dimensional drag reports a single confirmation once the handle crosses the
//! threshold. Releasing below the threshold snaps the handle back to the start.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Threshold {
    /// Fraction of the available travel, e.g. 0.9.
    Fraction(f32),
    /// Confirm once the remaining gap to the end of travel is smaller than this.
    Distance(f32),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AfterConfirm {
    StayConfirmed,
    AutoReset(Duration),
}

#[derive(Debug, Clone)]
pub struct SlideConfirm {
    travel: f32,
    threshold: Threshold,
    after_confirm: AfterConfirm,
    offset: f32,
    confirmed: bool,
    confirmed_at: Option<Instant>,
}

impl Default for SlideConfirm {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl SlideConfirm {
    pub const DEFAULT_FRACTION: f32 = 0.9;
    pub const DEFAULT_RESET_DELAY: Duration = Duration::from_millis(1000);

    pub fn new(travel: f32) -> Self {
        Self {
            travel: travel.max(0.0),
            threshold: Threshold::Fraction(Self::DEFAULT_FRACTION),
            after_confirm: AfterConfirm::StayConfirmed,
            offset: 0.0,
            confirmed: false,
            confirmed_at: None,
        }
    }

    pub fn with_threshold(mut self, threshold: Threshold) -> Self {
        self.threshold = threshold;
        self
    }

    pub fn with_after_confirm(mut self, after_confirm: AfterConfirm) -> Self {
        self.after_confirm = after_confirm;
        self
    }

    pub fn offset(&self) -> f32 {
        self.offset
    }

    pub fn is_confirmed(&self) -> bool {
        self.confirmed
    }

    /// The handle has to leave the start, whatever the threshold says about a short track.
    fn crossed(&self) -> bool {
        if self.offset <= 0.0 {
            return false;
        }
        match self.threshold {
            Threshold::Fraction(fraction) => self.offset >= self.travel * fraction,
            Threshold::Distance(distance) => self.travel - self.offset < distance,
        }
    }

    /// Moves the handle by `delta`. Returns `true` only on the drag that confirms.
    pub fn drag(&mut self, delta: f32) -> bool {
        if self.confirmed {
            return false;
        }
        self.offset = (self.offset + delta).clamp(0.0, self.travel);
        if self.crossed() {
            self.confirmed = true;
            self.confirmed_at = Some(Instant::now());
            return true;
        }
        false
    }

    pub fn release(&mut self) {
        if !self.confirmed {
            self.offset = 0.0;
        }
    }

    pub fn reset(&mut self) {
        self.offset = 0.0;
        self.confirmed = false;
        self.confirmed_at = None;
    }

    /// Performs the delayed reset of the auto-reset variant. Returns `true` if it reset.
    pub fn poll_auto_reset(&mut self, now: Instant) -> bool {
        let AfterConfirm::AutoReset(delay) = self.after_confirm else {
            return false;
        };
        match self.confirmed_at {
            Some(at) if now.saturating_duration_since(at) >= delay => {
                self.reset();
                true
            }
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn confirms_once_at_ninety_percent() {
        let mut slider = SlideConfirm::new(100.0);
        assert!(!slider.drag(60.0));
        assert!(!slider.drag(29.0));
        assert!(slider.drag(2.0));
        assert!(slider.is_confirmed());
        assert!(!slider.drag(10.0));
    }

    #[test]
    fn release_below_threshold_snaps_back() {
        let mut slider = SlideConfirm::new(100.0);
        slider.drag(50.0);
        slider.release();
        assert_eq!(slider.offset(), 0.0);
        assert!(!slider.is_confirmed());
    }

    #[test]
    fn offset_is_clamped() {
        let mut slider = SlideConfirm::new(100.0);
        slider.drag(-20.0);
        assert_eq!(slider.offset(), 0.0);
        slider.drag(500.0);
        assert_eq!(slider.offset(), 100.0);
    }

    #[test]
    fn stays_confirmed_until_reset() {
        let mut slider = SlideConfirm::new(100.0);
        slider.drag(95.0);
        slider.release();
        assert!(slider.is_confirmed());
        assert!(!slider.poll_auto_reset(Instant::now() + Duration::from_secs(60)));
        slider.reset();
        assert!(!slider.is_confirmed());
        assert!(slider.drag(95.0));
    }

    #[test]
    fn distance_variant_auto_resets() {
        let mut slider = SlideConfirm::new(200.0)
            .with_threshold(Threshold::Distance(20.0))
            .with_after_confirm(AfterConfirm::AutoReset(SlideConfirm::DEFAULT_RESET_DELAY));
        assert!(!slider.drag(180.0));
        assert!(slider.drag(5.0));
        assert!(!slider.poll_auto_reset(Instant::now()));
        assert!(slider.poll_auto_reset(Instant::now() + Duration::from_secs(2)));
        assert!(!slider.is_confirmed());
        assert_eq!(slider.offset(), 0.0);
    }

    #[test]
    fn never_confirms_without_moving() {
        let mut flat = SlideConfirm::new(0.0);
        assert!(!flat.drag(0.0));
        assert!(!flat.drag(50.0));
        assert!(!flat.is_confirmed());

        let mut short = SlideConfirm::new(10.0).with_threshold(Threshold::Distance(20.0));
        assert!(!short.drag(0.0));
        assert!(!short.drag(-5.0));
        assert!(!short.is_confirmed());
        assert!(short.drag(1.0));
    }
}
