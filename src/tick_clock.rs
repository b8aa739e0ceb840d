use crate::config::TICKS_PER_PULSE;

/// Position on the output queue's timeline, in queue ticks since stream start
pub type TickPosition = u64;

/// Counts queue ticks for outgoing clock pulses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickClock {
    position: TickPosition,
}

impl TickClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves one MIDI clock pulse forward and returns the new position
    pub fn advance(&mut self) -> TickPosition {
        self.position += TICKS_PER_PULSE;
        self.position
    }

    pub fn current(&self) -> TickPosition {
        self.position
    }

    pub fn reset(&mut self) {
        self.position = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_advance_by_four_ticks_per_pulse() {
        let mut clock = TickClock::new();
        assert_eq!(clock.advance(), 4);
        assert_eq!(clock.advance(), 8);
        assert_eq!(clock.current(), 8);
    }

    #[test]
    fn test_k_advances_yield_4k() {
        for k in [0u64, 1, 24, 96, 1000] {
            let mut clock = TickClock::new();
            for _ in 0..k {
                clock.advance();
            }
            assert_eq!(clock.current(), 4 * k);
        }
    }

    #[test]
    fn test_current_has_no_side_effect() {
        let mut clock = TickClock::new();
        clock.advance();
        assert_eq!(clock.current(), clock.current());
        clock.reset();
        assert_eq!(clock.current(), 0);
    }
}
