//! Frame-rate reducer.
//!
//! Decides, per incoming data frame, whether to forward it so that the
//! output rate matches the configured target. The policy is a deterministic
//! accumulator: each frame adds `R_out / R_in`, and the frame is emitted
//! when the accumulator reaches one. This yields exactly `R_out` emissions
//! per `R_in` inputs on average with the emissions spaced as evenly as
//! floating point permits. A configuration change that alters the input
//! rate does not reset the accumulator; the drift is bounded by one frame.

/// Output rates accepted by the CLI, in frames per second.
pub const VALID_OUTPUT_RATES: [u16; 9] = [1, 2, 4, 5, 10, 20, 25, 40, 50];

pub fn is_valid_output_rate(rate: u16) -> bool {
    VALID_OUTPUT_RATES.contains(&rate)
}

pub struct RateReducer {
    input_rate: f64,
    output_rate: f64,
    accumulator: f64,
}

impl RateReducer {
    /// `output_rate` must come from [`VALID_OUTPUT_RATES`]; the CLI rejects
    /// anything else at startup. Until a configuration supplies the input
    /// rate, the reducer passes every frame through.
    pub fn new(output_rate: u16) -> Self {
        RateReducer {
            input_rate: output_rate as f64,
            output_rate: output_rate as f64,
            accumulator: 0.0,
        }
    }

    /// Updates the input rate from the active configuration. The running
    /// accumulator is deliberately kept.
    pub fn set_input_rate(&mut self, frames_per_second: f64) {
        self.input_rate = frames_per_second;
    }

    /// Advances the accumulator for one incoming frame and reports whether
    /// it should be forwarded.
    pub fn should_emit(&mut self) -> bool {
        if self.input_rate <= 0.0 {
            return true;
        }
        self.accumulator += self.output_rate / self.input_rate;
        if self.accumulator >= 1.0 {
            self.accumulator -= 1.0;
            true
        } else {
            false
        }
    }

    pub fn accumulator(&self) -> f64 {
        self.accumulator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_rates() {
        for rate in VALID_OUTPUT_RATES {
            assert!(is_valid_output_rate(rate));
        }
        for rate in [0, 3, 30, 60, 100] {
            assert!(!is_valid_output_rate(rate));
        }
    }

    #[test]
    fn test_fifty_to_ten() {
        // R_in = 50, R_out = 10: exactly 10 of 50 frames pass, every fifth.
        let mut reducer = RateReducer::new(10);
        reducer.set_input_rate(50.0);

        let mut emitted = Vec::new();
        for i in 0..50 {
            if reducer.should_emit() {
                emitted.push(i);
            }
            assert!(
                reducer.accumulator() >= 0.0 && reducer.accumulator() < 1.0,
                "accumulator {} escaped [0, 1)",
                reducer.accumulator()
            );
        }
        assert_eq!(emitted, vec![4, 9, 14, 19, 24, 29, 34, 39, 44, 49]);
    }

    #[test]
    fn test_identity_when_rates_match() {
        let mut reducer = RateReducer::new(50);
        reducer.set_input_rate(50.0);
        for _ in 0..100 {
            assert!(reducer.should_emit());
        }
    }

    #[test]
    fn test_emission_count_bound() {
        // For any N and ratio p the reducer emits floor(N*p) or floor(N*p)+1.
        for (r_in, r_out) in [(50u16, 1u16), (50, 2), (50, 25), (25, 10), (50, 40)] {
            let mut reducer = RateReducer::new(r_out);
            reducer.set_input_rate(r_in as f64);
            let n = 997;
            let emitted = (0..n).filter(|_| reducer.should_emit()).count();
            let expected = (n as f64) * (r_out as f64) / (r_in as f64);
            assert!(
                emitted == expected.floor() as usize || emitted == expected.floor() as usize + 1,
                "{} of {} frames at {}/{}",
                emitted,
                n,
                r_out,
                r_in
            );
        }
    }

    #[test]
    fn test_rate_change_keeps_accumulator() {
        let mut reducer = RateReducer::new(10);
        reducer.set_input_rate(50.0);
        for _ in 0..3 {
            reducer.should_emit();
        }
        let before = reducer.accumulator();
        reducer.set_input_rate(25.0);
        assert_eq!(reducer.accumulator(), before);
    }

    #[test]
    fn test_unknown_input_rate_passes_through() {
        let mut reducer = RateReducer::new(10);
        reducer.set_input_rate(0.0);
        assert!(reducer.should_emit());
    }
}
