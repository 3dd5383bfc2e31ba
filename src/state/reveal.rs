use std::time::Duration;

use thiserror::Error;

/// Phases of the animation played after an exact guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealPhase {
    /// Nothing is being revealed.
    Idle,
    /// The guessed profile fades out.
    FadingOutProfile,
    /// The brand mark is shown on its own.
    ShowingBrand,
    /// The brand mark is shown with its suffix.
    ShowingBrandWithSuffix,
    /// The sequence finished; the session must advance and acknowledge.
    Complete,
}

/// How long each timed phase is held before the next one starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RevealTimings {
    /// Hold time of [`RevealPhase::FadingOutProfile`].
    pub fade_out_profile: Duration,
    /// Hold time of [`RevealPhase::ShowingBrand`].
    pub show_brand: Duration,
    /// Hold time of [`RevealPhase::ShowingBrandWithSuffix`].
    pub show_brand_with_suffix: Duration,
}

impl Default for RevealTimings {
    fn default() -> Self {
        Self {
            fade_out_profile: Duration::from_millis(300),
            show_brand: Duration::from_millis(700),
            show_brand_with_suffix: Duration::from_millis(1500),
        }
    }
}

impl RevealTimings {
    /// Time from the start of the reveal until it completes.
    pub fn total(&self) -> Duration {
        self.fade_out_profile + self.show_brand + self.show_brand_with_suffix
    }
}

/// What the owner of the machine must do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevealStep {
    /// Arm a timer for the given duration, then call [`RevealMachine::on_timer`].
    Hold(Duration),
    /// The reveal finished.
    Complete,
}

/// Raised when the machine is driven out of order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("reveal cannot {action} while in {phase:?}")]
pub struct RevealOrderError {
    /// Phase the machine was in.
    pub phase: RevealPhase,
    /// Operation that was attempted.
    pub action: &'static str,
}

/// Timer-driven reveal sequence. Phases are strictly ordered and never skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RevealMachine {
    phase: RevealPhase,
    timings: RevealTimings,
}

impl RevealMachine {
    /// Idle machine using `timings`.
    pub fn new(timings: RevealTimings) -> Self {
        Self {
            phase: RevealPhase::Idle,
            timings,
        }
    }

    /// Current phase.
    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    /// Leave idle and start fading out the profile.
    pub fn start(&mut self) -> Result<RevealStep, RevealOrderError> {
        if self.phase != RevealPhase::Idle {
            return Err(self.order_error("start"));
        }
        self.phase = RevealPhase::FadingOutProfile;
        Ok(RevealStep::Hold(self.timings.fade_out_profile))
    }

    /// The timer armed by the previous step fired.
    pub fn on_timer(&mut self) -> Result<RevealStep, RevealOrderError> {
        let (next, step) = match self.phase {
            RevealPhase::FadingOutProfile => (
                RevealPhase::ShowingBrand,
                RevealStep::Hold(self.timings.show_brand),
            ),
            RevealPhase::ShowingBrand => (
                RevealPhase::ShowingBrandWithSuffix,
                RevealStep::Hold(self.timings.show_brand_with_suffix),
            ),
            RevealPhase::ShowingBrandWithSuffix => (RevealPhase::Complete, RevealStep::Complete),
            RevealPhase::Idle | RevealPhase::Complete => return Err(self.order_error("advance")),
        };
        self.phase = next;
        Ok(step)
    }

    /// Return to idle once the owner handled completion.
    pub fn acknowledge(&mut self) -> Result<(), RevealOrderError> {
        if self.phase != RevealPhase::Complete {
            return Err(self.order_error("acknowledge"));
        }
        self.phase = RevealPhase::Idle;
        Ok(())
    }

    /// Abort the sequence from any phase.
    pub fn cancel(&mut self) {
        self.phase = RevealPhase::Idle;
    }

    fn order_error(&self, action: &'static str) -> RevealOrderError {
        RevealOrderError {
            phase: self.phase,
            action,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn runs_phases_in_order() {
        let timings = RevealTimings::default();
        let mut machine = RevealMachine::new(timings);

        assert_eq!(
            machine.start().unwrap(),
            RevealStep::Hold(Duration::from_millis(300))
        );
        assert_eq!(machine.phase(), RevealPhase::FadingOutProfile);

        assert_eq!(
            machine.on_timer().unwrap(),
            RevealStep::Hold(Duration::from_millis(700))
        );
        assert_eq!(machine.phase(), RevealPhase::ShowingBrand);

        assert_eq!(
            machine.on_timer().unwrap(),
            RevealStep::Hold(Duration::from_millis(1500))
        );
        assert_eq!(machine.phase(), RevealPhase::ShowingBrandWithSuffix);

        assert_eq!(machine.on_timer().unwrap(), RevealStep::Complete);
        assert_eq!(machine.phase(), RevealPhase::Complete);

        machine.acknowledge().unwrap();
        assert_eq!(machine.phase(), RevealPhase::Idle);
        assert_eq!(timings.total(), Duration::from_millis(2500));
    }

    #[test]
    fn rejects_out_of_order_driving() {
        let mut machine = RevealMachine::new(RevealTimings::default());
        assert!(machine.on_timer().is_err());
        assert!(machine.acknowledge().is_err());

        machine.start().unwrap();
        let err = machine.start().unwrap_err();
        assert_eq!(err.phase, RevealPhase::FadingOutProfile);
    }

    #[test]
    fn cancel_returns_to_idle() {
        let mut machine = RevealMachine::new(RevealTimings::default());
        machine.start().unwrap();
        machine.on_timer().unwrap();
        machine.cancel();
        assert_eq!(machine.phase(), RevealPhase::Idle);
        assert!(machine.start().is_ok());
    }
}
