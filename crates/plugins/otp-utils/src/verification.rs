//! TOTP verification with clock-skew tolerance.

use subtle::ConstantTimeEq;
use twostep_core::Secret;

use crate::generator::TotpEngine;

impl TotpEngine {
    /// Verifies `candidate` against the codes of the current step and
    /// `window` steps on either side.
    pub fn verify(&self, secret: &Secret, candidate: &str, unix_time: u64, window: u64) -> bool {
        self.verify_step(secret, candidate, unix_time, window).is_some()
    }

    /// Like [`TotpEngine::verify`], but returns the step whose code matched.
    ///
    /// The current step is tried first, then alternating older and newer
    /// steps moving outwards.
    pub fn verify_step(
        &self,
        secret: &Secret,
        candidate: &str,
        unix_time: u64,
        window: u64,
    ) -> Option<u64> {
        if candidate.len() != self.digits() as usize {
            return None;
        }

        let current = self.time_step(unix_time);
        candidate_steps(current, window).find(|step| {
            self.generate_code(secret, *step).is_ok_and(|expected| {
                constant_time_eq(expected.as_str().as_bytes(), candidate.as_bytes())
            })
        })
    }

    /// Unix time at which a code generated for `time_step` stops verifying
    /// under the given window.
    pub fn valid_until(&self, time_step: u64, window: u64) -> u64 {
        time_step
            .saturating_add(window)
            .saturating_add(1)
            .saturating_mul(self.period())
    }
}

/// Steps to try, nearest first: `s, s-1, s+1, s-2, s+2, ...`.
fn candidate_steps(current: u64, window: u64) -> impl Iterator<Item = u64> {
    let around = (1..=window).flat_map(move |distance| {
        let older = current.checked_sub(distance);
        let newer = current.checked_add(distance);
        older.into_iter().chain(newer)
    });
    std::iter::once(current).chain(around)
}

/// Constant-time byte comparison.
///
/// Lengths are compared up front; code length is public.
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.ct_eq(b).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TotpOptions;

    fn engine() -> TotpEngine {
        TotpEngine::new(&TotpOptions::default()).unwrap()
    }

    fn secret() -> Secret {
        Secret::new(b"12345678901234567890".to_vec()).unwrap()
    }

    #[test]
    fn test_generated_code_verifies_with_zero_window() {
        let engine = engine();
        let secret = secret();
        for time in [0u64, 59, 1_111_111_109, 1_700_000_000] {
            let code = engine.code_at(&secret, time).unwrap();
            assert!(engine.verify(&secret, code.as_str(), time, 0));
        }
    }

    #[test]
    fn test_skew_within_window() {
        let engine = engine();
        let secret = secret();
        let t = 59;
        let code = engine.code_at(&secret, t).unwrap();

        assert!(engine.verify(&secret, code.as_str(), t, 1));
        assert!(engine.verify(&secret, code.as_str(), t + 29, 1));
        assert!(!engine.verify(&secret, code.as_str(), t + 61, 1));
    }

    #[test]
    fn test_previous_step_is_reported() {
        let engine = engine();
        let secret = secret();
        let code = engine.generate_code(&secret, 10).unwrap();

        assert_eq!(engine.verify_step(&secret, code.as_str(), 10 * 30, 1), Some(10));
        assert_eq!(engine.verify_step(&secret, code.as_str(), 11 * 30, 1), Some(10));
        assert_eq!(engine.verify_step(&secret, code.as_str(), 9 * 30, 1), Some(10));
        assert_eq!(engine.verify_step(&secret, code.as_str(), 11 * 30, 0), None);
    }

    #[test]
    fn test_wrong_length_is_rejected() {
        let engine = engine();
        let secret = secret();
        let code = engine.code_at(&secret, 59).unwrap();

        assert!(!engine.verify(&secret, &format!("{}0", code.as_str()), 59, 1));
        assert!(!engine.verify(&secret, "", 59, 1));
    }

    #[test]
    fn test_window_at_epoch_does_not_underflow() {
        let engine = engine();
        let secret = secret();
        let code = engine.generate_code(&secret, 1).unwrap();
        assert_eq!(engine.verify_step(&secret, code.as_str(), 0, 1), Some(1));
    }

    #[test]
    fn test_candidate_step_order() {
        let steps: Vec<u64> = candidate_steps(10, 2).collect();
        assert_eq!(steps, vec![10, 9, 11, 8, 12]);

        let steps: Vec<u64> = candidate_steps(0, 1).collect();
        assert_eq!(steps, vec![0, 1]);
    }

    #[test]
    fn test_valid_until() {
        let engine = engine();
        // Step 1 covers [30, 60); with window 1 it is still accepted during step 2.
        assert_eq!(engine.valid_until(1, 1), 90);
        assert_eq!(engine.valid_until(1, 0), 60);
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"287082", b"287082"));
        assert!(!constant_time_eq(b"287082", b"287083"));
        assert!(!constant_time_eq(b"short", b"longer"));
    }
}
