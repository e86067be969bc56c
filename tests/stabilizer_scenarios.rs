//! Stabilizer behaviour through the public API
//!
//! Exercises the documented laws of the filter: grace period, zero
//! confirmation, bounded smoothing and reset.

use gpuload::stabilizer::{StabilizerConfig, StabilizerPhase, UsageStabilizer};

fn standard() -> UsageStabilizer {
    UsageStabilizer::new(StabilizerConfig::new(5000, 0.3, 3, -1))
}

/// Small deterministic generator so the sweeps below need no extra crates
struct Lcg(u64);

impl Lcg {
    fn next(&mut self) -> u64 {
        self.0 = self.0.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
        self.0 >> 33
    }

    fn raw(&mut self) -> i32 {
        // Mix of failures, zeros, in-range values and out-of-range values
        match self.next() % 10 {
            0 | 1 => -1,
            2 | 3 => 0,
            4 => 100 + (self.next() % 50) as i32,
            _ => (self.next() % 101) as i32,
        }
    }
}

#[test]
fn test_failure_is_held_then_expires() {
    let s = standard();
    assert_eq!(s.update(40, 0), 40);
    assert_eq!(s.update(-1, 1000), 40);
    assert_eq!(s.update(-1, 6000), -1);
}

#[test]
fn test_third_zero_moves_toward_zero() {
    let s = standard();
    s.update(40, -100);
    assert_eq!(s.stable(), 40);

    assert_eq!(s.update(0, 0), 40);
    assert_eq!(s.update(0, 10), 40);
    assert_eq!(s.update(0, 20), 28);
}

#[test]
fn test_grace_period_law() {
    for grace in [0_i64, 1, 7, 250] {
        let s = UsageStabilizer::new(StabilizerConfig::new(grace, 0.3, 3, -1));
        let t0 = 10_000;
        s.update(55, t0);

        for t in t0 + 1..=t0 + grace {
            assert_eq!(s.update(-1, t), 55, "grace {} at t{:+}", grace, t - t0);
        }
        assert_eq!(s.update(-1, t0 + grace + 1), -1, "grace {}", grace);
    }
}

#[test]
fn test_zero_confirmation_law() {
    for confirm in 1..=6 {
        let s = UsageStabilizer::new(StabilizerConfig::new(5000, 0.3, confirm, -1));
        s.update(80, 0);

        for i in 1..confirm {
            assert_eq!(s.update(0, i as i64), 80, "confirm {} zero {}", confirm, i);
        }

        // round(80 + 0.3 * (0 - 80)) = 56
        assert_eq!(s.update(0, confirm as i64), 56, "confirm {}", confirm);
    }
}

#[test]
fn test_smoothing_never_overshoots() {
    for alpha in [0.05, 0.3, 0.5, 0.95] {
        for p in (0..=100).step_by(5) {
            for n in (1..=100).step_by(7) {
                let s = UsageStabilizer::new(StabilizerConfig::new(5000, alpha, 1, -1));
                s.update(p, 0);
                let v = s.update(n, 1);
                let (lo, hi) = if p <= n { (p, n) } else { (n, p) };
                assert!(
                    (lo..=hi).contains(&v),
                    "alpha {} p {} n {} gave {}",
                    alpha,
                    p,
                    n,
                    v
                );
            }
        }
    }
}

#[test]
fn test_value_stays_in_range_or_sentinel() {
    for seed in 1..=20 {
        let mut rng = Lcg(seed);
        let s = UsageStabilizer::new(StabilizerConfig::new(300, 0.4, 2, -7));

        let mut now = 0;
        for _ in 0..500 {
            now += (rng.next() % 200) as i64;
            let v = s.update(rng.raw(), now);
            assert!(v == -7 || (0..=100).contains(&v), "seed {} gave {}", seed, v);
            assert_eq!(v, s.stable());
        }
    }
}

#[test]
fn test_reset_matches_fresh_instance() {
    let used = standard();
    for (t, raw) in [(0, 10), (5, 0), (10, -1), (20, 90)] {
        used.update(raw, t);
    }
    used.reset();

    let fresh = standard();
    assert_eq!(used.update(64, 1000), fresh.update(64, 1000));
    assert_eq!(used.phase(), fresh.phase());
}

#[test]
fn test_failure_between_zeros_keeps_streak() {
    let s = standard();
    s.update(40, 0);
    s.update(0, 10);
    s.update(-1, 15);
    s.update(0, 20);
    assert_eq!(s.phase(), StabilizerPhase::ZeroPending(2));
    assert_eq!(s.update(0, 30), 28);
}

#[test]
fn test_defaults_match_documented_values() {
    let config = UsageStabilizer::default().config().to_owned();
    assert_eq!(config, StabilizerConfig::new(5000, 0.3, 3, -1));
}
