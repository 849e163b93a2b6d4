//! Price Walk - bounded random walk for synthetic oracle reports
//!
//! Each step picks a direction, a volatility band (wider for cheap assets,
//! occasionally multiplied by a shock factor) and a uniform position inside
//! that band, then rounds to the reporting precision.
//!
//! Draw order per step: direction, spike, position.

use rust_decimal::prelude::FromPrimitive;
use rust_decimal::{Decimal, RoundingStrategy};
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

use crate::random::Randomness;
use crate::types::{Direction, PriceWalkState};

/// Tunable parameters of the walk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WalkPolicy {
    /// Prices at or below this use `low_price_band`
    pub low_price_threshold: Decimal,
    /// Band for prices above the threshold (0.05 = 5%)
    pub base_band: Decimal,
    /// Band for prices at or below the threshold
    pub low_price_band: Decimal,
    /// Probability of the shock regime
    pub spike_probability: f64,
    /// Band multiplier in the shock regime
    pub spike_multiplier: Decimal,
    /// Decimal places of reported prices
    pub decimals: u32,
}

impl Default for WalkPolicy {
    fn default() -> Self {
        Self {
            low_price_threshold: dec!(2),
            base_band: dec!(0.05),
            low_price_band: dec!(0.10),
            spike_probability: 0.15,
            spike_multiplier: dec!(4),
            decimals: 2,
        }
    }
}

/// Result of one walk step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WalkStep {
    pub state: PriceWalkState,
    pub next_price: Decimal,
}

#[derive(Debug, Clone, Default)]
pub struct PriceWalk {
    policy: WalkPolicy,
}

impl PriceWalk {
    pub fn new(policy: WalkPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &WalkPolicy {
        &self.policy
    }

    /// Band before the spike multiplier
    pub fn base_band(&self, previous_price: Decimal) -> Decimal {
        if previous_price > self.policy.low_price_threshold {
            self.policy.base_band
        } else {
            self.policy.low_price_band
        }
    }

    /// Draw direction and regime for a step from `previous_price`
    pub fn plan<G: Randomness + ?Sized>(&self, previous_price: Decimal, rng: &mut G) -> PriceWalkState {
        let direction = if rng.draw() < 0.5 {
            Direction::Up
        } else {
            Direction::Down
        };

        let mut band = self.base_band(previous_price);
        let spiked = rng.draw() < self.policy.spike_probability;
        if spiked {
            band = band.saturating_mul(self.policy.spike_multiplier);
        }

        PriceWalkState {
            previous_price,
            direction,
            volatility_band: band,
            spiked,
        }
    }

    /// Inclusive range the next price is drawn from
    pub fn bounds(state: &PriceWalkState) -> (Decimal, Decimal) {
        let p = state.previous_price;
        let band = state.volatility_band;
        match state.direction {
            Direction::Up => (p, p.saturating_mul(Decimal::ONE.saturating_add(band))),
            Direction::Down => (p.saturating_mul(Decimal::ONE.saturating_sub(band)), p),
        }
    }

    /// Compute the next reported price.
    ///
    /// `previous_price` must be positive; the caller guarantees it.
    pub fn next_price<G: Randomness + ?Sized>(&self, previous_price: Decimal, rng: &mut G) -> WalkStep {
        let state = self.plan(previous_price, rng);
        let (low, high) = Self::bounds(&state);

        let position = Decimal::from_f64(rng.draw()).unwrap_or(Decimal::ZERO);
        let raw = low.saturating_add(high.saturating_sub(low).saturating_mul(position));

        WalkStep {
            state,
            next_price: self.quantize(raw, low, high),
        }
    }

    /// Round to the reporting precision while staying inside `[low, high]`
    /// and above zero.
    fn quantize(&self, raw: Decimal, low: Decimal, high: Decimal) -> Decimal {
        let dp = self.policy.decimals;
        let tick = Decimal::new(1, dp);

        let mut price = raw.round_dp_with_strategy(dp, RoundingStrategy::MidpointAwayFromZero);

        let low_tick = low.round_dp_with_strategy(dp, RoundingStrategy::AwayFromZero);
        let high_tick = high.round_dp_with_strategy(dp, RoundingStrategy::ToZero);
        // A band narrower than one tick has no representable interior; keep
        // the rounded value.
        if low_tick <= high_tick {
            price = price.clamp(low_tick, high_tick);
        }

        let mut price = price.max(tick);
        price.rescale(dp);
        price
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::random::{RngRandomness, ScriptedRandomness};

    fn walk() -> PriceWalk {
        PriceWalk::default()
    }

    #[test]
    fn base_band_depends_on_price_tier() {
        let w = walk();
        assert_eq!(w.base_band(dec!(2.01)), dec!(0.05));
        assert_eq!(w.base_band(dec!(100)), dec!(0.05));
        assert_eq!(w.base_band(dec!(2)), dec!(0.10));
        assert_eq!(w.base_band(dec!(0.5)), dec!(0.10));
    }

    #[test]
    fn up_without_spike_stays_in_ten_percent_band() {
        // up, no spike, midpoint
        let mut rng = ScriptedRandomness::new(vec![0.2, 0.9, 0.5]);
        let step = walk().next_price(dec!(1.50), &mut rng);

        assert_eq!(step.state.direction, Direction::Up);
        assert!(!step.state.spiked);
        assert_eq!(step.state.volatility_band, dec!(0.10));
        assert_eq!(step.next_price, dec!(1.58));
        assert_eq!(step.next_price.scale(), 2);
    }

    #[test]
    fn spike_multiplies_band() {
        // down, spike, lowest point
        let mut rng = ScriptedRandomness::new(vec![0.7, 0.05, 0.0]);
        let step = walk().next_price(dec!(10.00), &mut rng);

        assert_eq!(step.state.direction, Direction::Down);
        assert!(step.state.spiked);
        assert_eq!(step.state.volatility_band, dec!(0.20));
        assert_eq!(step.next_price, dec!(8.00));
    }

    #[test]
    fn output_is_tick_aligned_even_for_integral_prices() {
        let mut rng = ScriptedRandomness::new(vec![0.2, 0.9, 0.0]);
        let step = walk().next_price(dec!(10), &mut rng);
        assert_eq!(step.next_price.to_string(), "10.00");
    }

    #[test]
    fn tiny_price_never_reaches_zero() {
        // down, spike, lowest point: raw 0.006
        let mut rng = ScriptedRandomness::new(vec![0.9, 0.0, 0.0]);
        let step = walk().next_price(dec!(0.01), &mut rng);
        assert_eq!(step.next_price, dec!(0.01));
    }

    #[test]
    fn random_steps_respect_selected_band() {
        let w = walk();
        let mut rng = RngRandomness::seeded(42);
        let mut spikes = 0;

        for i in 0..10_000u32 {
            let previous = Decimal::new(50 + (i as i64 * 37) % 50_000, 2);
            let step = w.next_price(previous, &mut rng);
            let band = step.state.volatility_band;

            assert!(step.next_price > Decimal::ZERO);
            assert_eq!(step.next_price.scale(), 2);
            assert!(step.next_price >= previous * (Decimal::ONE - band));
            assert!(step.next_price <= previous * (Decimal::ONE + band));
            match step.state.direction {
                Direction::Up => assert!(step.next_price >= previous),
                Direction::Down => assert!(step.next_price <= previous),
            }
            if step.state.spiked {
                spikes += 1;
                assert_eq!(band, w.base_band(previous) * dec!(4));
            } else {
                assert_eq!(band, w.base_band(previous));
            }
        }

        // ~15% spike regime
        assert!((1_200..1_800).contains(&spikes), "spikes = {}", spikes);
    }
}
