//! Human-emulating pacing model.
//!
//! Pure functions that turn configured delay bounds and a send index into
//! randomized waits shaped like a person working through a list: quick at
//! first, slowing over a long run, occasionally wandering off entirely.
//! Used by the send queue before every campaign send and by the
//! continuation engine before automated replies.
//!
//! Every function has a `_with_rng` variant taking the RNG explicitly so
//! tests can drive it with a seeded generator.

use std::time::Duration;

use rand::Rng;
use rand_distr::{Distribution, Normal};

/// Sends with an index below this are "warm-up": a bit faster than the
/// configured bounds.
const WARMUP_SENDS: usize = 5;

/// Past this index the sender "tires" and the mean delay starts growing.
const FATIGUE_THRESHOLD: usize = 30;

/// Mean growth per send past the fatigue threshold.
const FATIGUE_SLOPE: f64 = 0.02;

/// Fatigue never more than doubles the mean.
const FATIGUE_CEILING: f64 = 2.0;

/// Chance of a long "got distracted" pause on any non-warm-up send.
const DISTRACTION_CHANCE: f64 = 0.08;

/// Typing speed distribution, characters per second.
const TYPING_CPS_MEAN: f64 = 65.0;
const TYPING_CPS_STD: f64 = 15.0;

/// Floor for the drawn typing rate.
const TYPING_CPS_MIN: f64 = 20.0;

/// Bounds for a simulated typing burst.
const TYPING_MIN_MS: f64 = 2_000.0;
const TYPING_MAX_MS: f64 = 15_000.0;

/// Bounds for the short pause before "reading" an inbound message.
const READ_MIN_MS: u64 = 1_500;
const READ_MAX_MS: u64 = 4_000;

/// Delay in whole seconds before send number `index` of a run of `total`.
///
/// `min`/`max` are the campaign's configured pacing bounds in seconds. The
/// result is always in `[min*0.5, max*2.5]` (and at least 1 second), so a
/// stray draw can never stall a queue or machine-gun it.
pub fn send_delay_secs(min: u64, max: u64, index: usize, total: usize) -> u64 {
    send_delay_secs_with_rng(min, max, index, total, &mut rand::thread_rng())
}

/// [`send_delay_secs`] with an explicit RNG.
pub fn send_delay_secs_with_rng<R: Rng + ?Sized>(
    min: u64,
    max: u64,
    index: usize,
    _total: usize,
    rng: &mut R,
) -> u64 {
    let (min, max) = if min <= max { (min, max) } else { (max, min) };

    let mut mean = (min + max) as f64 / 2.0;
    let mut std = (max - min) as f64 / 4.0;

    if index < WARMUP_SENDS {
        mean *= 0.7;
        std *= 0.5;
    }
    if index > FATIGUE_THRESHOLD {
        let slowdown =
            (1.0 + FATIGUE_SLOPE * (index - FATIGUE_THRESHOLD) as f64).min(FATIGUE_CEILING);
        mean *= slowdown;
    }

    // A human occasionally puts the phone down mid-run.
    let center = if index > WARMUP_SENDS && rng.gen::<f64>() < DISTRACTION_CHANCE {
        mean * 3.0
    } else {
        mean
    };

    let drawn = Normal::new(center, std)
        .map(|dist| dist.sample(rng))
        .unwrap_or(center);

    let clamped = drawn.clamp(min as f64 * 0.5, max as f64 * 2.5);
    (clamped.floor() as u64).max(1)
}

/// How long to show the typing indicator for a message of `text_len` chars.
///
/// Draws a typing speed around 65 cps, jitters the resulting duration by
/// ±20% and clamps to 2-15 seconds.
pub fn typing_duration(text_len: usize) -> Duration {
    typing_duration_with_rng(text_len, &mut rand::thread_rng())
}

/// [`typing_duration`] with an explicit RNG.
pub fn typing_duration_with_rng<R: Rng + ?Sized>(text_len: usize, rng: &mut R) -> Duration {
    let cps = Normal::new(TYPING_CPS_MEAN, TYPING_CPS_STD)
        .map(|dist| dist.sample(rng))
        .unwrap_or(TYPING_CPS_MEAN);

    let base_ms = text_len as f64 / cps.max(TYPING_CPS_MIN) * 1_000.0;
    let jittered = base_ms * rng.gen_range(0.8..=1.2);

    Duration::from_millis(jittered.clamp(TYPING_MIN_MS, TYPING_MAX_MS) as u64)
}

/// A short pause before reacting to an inbound message, as if reading it.
pub fn read_delay() -> Duration {
    read_delay_with_rng(&mut rand::thread_rng())
}

/// [`read_delay`] with an explicit RNG.
pub fn read_delay_with_rng<R: Rng + ?Sized>(rng: &mut R) -> Duration {
    Duration::from_millis(rng.gen_range(READ_MIN_MS..=READ_MAX_MS))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_delay_stays_in_bounds_for_all_phases() {
        let mut rng = StdRng::seed_from_u64(7);
        let cases = [
            (30u64, 90u64),
            (5, 5),
            (1, 2),
            (60, 600),
            (0, 10),
        ];

        for (min, max) in cases {
            // Warm-up, steady, distraction-eligible and fatigued indices.
            for index in [0usize, 3, 6, 20, 31, 80, 500] {
                for _ in 0..200 {
                    let delay = send_delay_secs_with_rng(min, max, index, 1000, &mut rng);
                    assert!(delay >= 1, "delay {} not positive", delay);
                    assert!(
                        delay as f64 >= (min as f64 * 0.5).floor(),
                        "delay {} below floor for min={}",
                        delay,
                        min
                    );
                    assert!(
                        delay as f64 <= max as f64 * 2.5,
                        "delay {} above ceiling for max={}",
                        delay,
                        max
                    );
                }
            }
        }
    }

    #[test]
    fn test_delay_equal_bounds_degenerate() {
        let mut rng = StdRng::seed_from_u64(11);
        // min == max collapses the distribution; every phase still lands
        // inside [min*0.5, max*2.5].
        for index in [0usize, 10, 50] {
            let delay = send_delay_secs_with_rng(40, 40, index, 100, &mut rng);
            assert!((20..=100).contains(&delay));
        }
    }

    #[test]
    fn test_delay_swapped_bounds_normalized() {
        let mut rng = StdRng::seed_from_u64(13);
        let delay = send_delay_secs_with_rng(90, 30, 10, 100, &mut rng);
        assert!((15..=225).contains(&delay));
    }

    #[test]
    fn test_warmup_is_faster_on_average() {
        let mut rng = StdRng::seed_from_u64(17);
        let sample = |index: usize, rng: &mut StdRng| -> f64 {
            let mut sum = 0u64;
            for _ in 0..2000 {
                sum += send_delay_secs_with_rng(30, 90, index, 100, rng);
            }
            sum as f64 / 2000.0
        };

        let warm = sample(1, &mut rng);
        let steady = sample(10, &mut rng);
        assert!(
            warm < steady,
            "warm-up mean {} should undercut steady mean {}",
            warm,
            steady
        );
    }

    #[test]
    fn test_fatigue_slows_down_on_average() {
        let mut rng = StdRng::seed_from_u64(19);
        let sample = |index: usize, rng: &mut StdRng| -> f64 {
            let mut sum = 0u64;
            for _ in 0..2000 {
                sum += send_delay_secs_with_rng(30, 90, index, 1000, rng);
            }
            sum as f64 / 2000.0
        };

        let steady = sample(10, &mut rng);
        let tired = sample(90, &mut rng);
        assert!(
            tired > steady,
            "fatigued mean {} should exceed steady mean {}",
            tired,
            steady
        );
    }

    #[test]
    fn test_typing_duration_bounds() {
        let mut rng = StdRng::seed_from_u64(23);
        for len in [0usize, 1, 40, 200, 5000, 1_000_000] {
            for _ in 0..200 {
                let duration = typing_duration_with_rng(len, &mut rng);
                assert!(duration >= Duration::from_millis(2000));
                assert!(duration <= Duration::from_millis(15000));
            }
        }
    }

    #[test]
    fn test_typing_duration_scales_with_length() {
        let mut rng = StdRng::seed_from_u64(29);
        let mean_ms = |len: usize, rng: &mut StdRng| -> f64 {
            let mut sum = 0u128;
            for _ in 0..500 {
                sum += typing_duration_with_rng(len, rng).as_millis();
            }
            sum as f64 / 500.0
        };

        let short = mean_ms(120, &mut rng);
        let long = mean_ms(600, &mut rng);
        assert!(long > short);
    }

    #[test]
    fn test_read_delay_bounds() {
        let mut rng = StdRng::seed_from_u64(31);
        for _ in 0..500 {
            let pause = read_delay_with_rng(&mut rng);
            assert!(pause >= Duration::from_millis(1500));
            assert!(pause <= Duration::from_millis(4000));
        }
    }
}
