//! Multi-level feedback queue arithmetic.
//!
//! Pure 17.14 fixed-point formulas; the thread module applies them at
//! their required cadences from the timer interrupt:
//!
//! - every tick: the running thread's `recent_cpu` is incremented;
//! - every second: `load_avg` decays toward the current ready count and
//!   every thread's `recent_cpu` decays by a load-dependent factor;
//! - every four ticks: every thread's priority is recomputed and the
//!   ready queue is re-sorted.

use crate::fixed_point::Fixed;
use crate::thread::{PRI_MAX, PRI_MIN};

/// Ticks between whole-system priority recomputations.
pub const PRIORITY_INTERVAL: i64 = 4;

/// Smallest nice value.
pub const NICE_MIN: i32 = -20;

/// Largest nice value.
pub const NICE_MAX: i32 = 20;

/// `priority = PRI_MAX - recent_cpu/4 - 2*nice`, rounded to nearest and
/// clamped to the priority band.
pub fn priority(recent_cpu: Fixed, nice: i32) -> i32 {
    let raw = recent_cpu
        .div_int(-4)
        .add_int(PRI_MAX - nice * 2)
        .to_int_round();
    raw.clamp(PRI_MIN, PRI_MAX)
}

/// `load_avg = (59/60)*load_avg + (1/60)*ready_threads`.
///
/// `ready_threads` counts the ready queue plus the running thread when it
/// is not the idle thread; the running thread is never queued as ready.
pub fn load_avg(load_avg: Fixed, ready_threads: i32) -> Fixed {
    let decay = Fixed::from_int(59).div_int(60);
    let weight = Fixed::from_int(1).div_int(60);
    decay * load_avg + weight.mul_int(ready_threads)
}

/// `recent_cpu = (2*load_avg)/(2*load_avg + 1) * recent_cpu + nice`.
pub fn decay_recent_cpu(recent_cpu: Fixed, load_avg: Fixed, nice: i32) -> Fixed {
    let twice_load = load_avg.mul_int(2);
    let coefficient = twice_load / twice_load.add_int(1);
    coefficient * recent_cpu + Fixed::from_int(nice)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_priority_of_fresh_thread() {
        // No CPU history, nice 0: top of the band.
        assert_eq!(priority(Fixed::ZERO, 0), PRI_MAX);
    }

    #[test]
    fn test_priority_falls_with_recent_cpu() {
        let fresh = priority(Fixed::ZERO, 0);
        let busy = priority(Fixed::from_int(40), 0);
        assert!(busy < fresh);
        assert_eq!(busy, PRI_MAX - 10);
    }

    #[test]
    fn test_priority_falls_with_nice() {
        assert_eq!(priority(Fixed::ZERO, 5), PRI_MAX - 10);
        assert_eq!(priority(Fixed::ZERO, NICE_MIN), PRI_MAX); // clamped
    }

    #[test]
    fn test_priority_clamped_to_band() {
        assert_eq!(priority(Fixed::from_int(1000), NICE_MAX), PRI_MIN);
        assert_eq!(priority(Fixed::ZERO, -NICE_MAX), PRI_MAX);
    }

    #[test]
    fn test_load_avg_converges_upward() {
        // Constant load of 1 pulls the average from 0 toward 1.
        let mut load = Fixed::ZERO;
        for _ in 0..60 {
            load = load_avg(load, 1);
        }
        let x100 = load.mul_int(100).to_int_round();
        assert!(x100 > 50 && x100 < 100, "load_avg x100 = {x100}");
    }

    #[test]
    fn test_load_avg_decays_to_zero() {
        let mut load = Fixed::from_int(2);
        for _ in 0..600 {
            load = load_avg(load, 0);
        }
        assert!(load.mul_int(100).to_int_round() < 5);
        assert!(load >= Fixed::ZERO);
    }

    #[test]
    fn test_recent_cpu_decay_is_contracting() {
        // With load_avg 1 the decay factor is 2/3.
        let load = Fixed::from_int(1);
        let decayed = decay_recent_cpu(Fixed::from_int(30), load, 0);
        assert_eq!(decayed.to_int_round(), 20);
    }

    #[test]
    fn test_recent_cpu_decay_folds_in_nice() {
        let decayed = decay_recent_cpu(Fixed::ZERO, Fixed::ZERO, 7);
        assert_eq!(decayed.to_int_round(), 7);
    }
}
