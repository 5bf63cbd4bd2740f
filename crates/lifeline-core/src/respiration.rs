//! Injectable randomness for astronaut consumption.
//!
//! An astronaut draws two random quantities per tick: the base oxygen draw
//! and whether it gets a moment of passive rest that sheds some fatigue.
//! Both come through the [`Respiration`] trait so tests can script them.
//!
//! The production source, [`SeededRespiration`], wraps a ChaCha8 RNG seeded
//! from a `u64`, so identical seeds produce identical breathing sequences.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Smallest base draw per tick.
pub const BASE_DRAW_MIN: u8 = 1;

/// Largest base draw per tick.
pub const BASE_DRAW_MAX: u8 = 4;

/// Probability of passive rest on any given tick.
pub const REST_CHANCE: f64 = 0.05;

/// Source of per-tick randomness for an [`Astronaut`](crate::Astronaut).
pub trait Respiration: Send {
    /// Base oxygen draw for this tick, in `[BASE_DRAW_MIN, BASE_DRAW_MAX]`.
    ///
    /// Values outside that range are clamped by the astronaut.
    fn base_draw(&mut self) -> u8;

    /// Whether the astronaut rests this tick (sheds a little fatigue).
    fn rests(&mut self) -> bool;
}

/// Deterministic respiration backed by a seeded ChaCha8 RNG.
#[derive(Clone, Debug)]
pub struct SeededRespiration {
    rng: ChaCha8Rng,
}

impl SeededRespiration {
    /// Create a source from a seed.
    pub fn new(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }
}

impl Respiration for SeededRespiration {
    fn base_draw(&mut self) -> u8 {
        self.rng.random_range(BASE_DRAW_MIN..=BASE_DRAW_MAX)
    }

    fn rests(&mut self) -> bool {
        self.rng.random_bool(REST_CHANCE)
    }
}

impl<T: Respiration + ?Sized> Respiration for Box<T> {
    fn base_draw(&mut self) -> u8 {
        (**self).base_draw()
    }

    fn rests(&mut self) -> bool {
        (**self).rests()
    }
}
