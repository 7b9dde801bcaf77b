//! Instance-based memory with blended retrieval.
//!
//! Each instance remembers an outcome for a choice and the times it was
//! experienced. Retrieval uses base-level activation with power-law decay
//! plus logistic noise:
//!
//! ```text
//! A_i   = ln( Σ_j (now - t_j)^-d ) + ε,    ε ~ Logistic(0, s)
//! P_i   = exp(A_i / τ) / Σ_k exp(A_k / τ), τ = s·√2
//! blend = Σ_i P_i · outcome_i
//! ```

use rand::Rng;
use rand_distr::{Distribution, Open01};
use std::f64::consts::SQRT_2;

/// Default decay exponent `d`.
pub const DEFAULT_DECAY: f64 = 0.5;

/// Default noise scale `s`.
pub const DEFAULT_NOISE: f64 = 0.25;

#[derive(Debug, Clone)]
struct Instance<K> {
    choice: K,
    outcome: f64,
    references: Vec<u64>,
}

/// Memory of (choice, outcome) instances on a discrete clock.
#[derive(Debug, Clone)]
pub struct BlendedMemory<K> {
    instances: Vec<Instance<K>>,
    time: u64,
    decay: f64,
    noise: f64,
    temperature: Option<f64>,
}

impl<K: Clone + PartialEq> Default for BlendedMemory<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Clone + PartialEq> BlendedMemory<K> {
    pub fn new() -> Self {
        Self {
            instances: Vec::new(),
            time: 0,
            decay: DEFAULT_DECAY,
            noise: DEFAULT_NOISE,
            temperature: None,
        }
    }

    pub fn with_decay(mut self, decay: f64) -> Self {
        self.decay = decay;
        self
    }

    /// Sets the activation noise scale (0 disables noise).
    pub fn with_noise(mut self, noise: f64) -> Self {
        self.noise = noise;
        self
    }

    /// Overrides the blending temperature (default `noise·√2`).
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn time(&self) -> u64 {
        self.time
    }

    /// Blending temperature in use.
    pub fn temperature(&self) -> f64 {
        self.temperature.unwrap_or(self.noise * SQRT_2)
    }

    /// Moves the clock forward.
    pub fn advance(&mut self, amount: u64) {
        self.time += amount;
    }

    /// Records an experience at the current time.
    ///
    /// An existing instance with the same choice and outcome is reinforced
    /// rather than duplicated.
    pub fn learn(&mut self, choice: K, outcome: f64) {
        let now = self.time;
        match self
            .instances
            .iter_mut()
            .find(|i| i.choice == choice && i.outcome == outcome)
        {
            Some(instance) => instance.references.push(now),
            None => self.instances.push(Instance {
                choice,
                outcome,
                references: vec![now],
            }),
        }
    }

    /// Number of distinct instances stored.
    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    fn activation<R: Rng + ?Sized>(&self, instance: &Instance<K>, rng: &mut R) -> f64 {
        let strength: f64 = instance
            .references
            .iter()
            // An instance learned this tick counts as one tick old
            .map(|&t| (self.time.saturating_sub(t).max(1) as f64).powf(-self.decay))
            .sum();

        let mut activation = strength.ln();
        if self.noise > 0.0 {
            let u: f64 = Open01.sample(rng);
            activation += self.noise * (u / (1.0 - u)).ln();
        }
        activation
    }

    /// Blended outcome for `choice`, or `None` if it was never experienced.
    pub fn blend<R: Rng + ?Sized>(&self, choice: &K, rng: &mut R) -> Option<f64> {
        let matching: Vec<(f64, f64)> = self
            .instances
            .iter()
            .filter(|i| &i.choice == choice)
            .map(|i| (self.activation(i, rng), i.outcome))
            .collect();
        if matching.is_empty() {
            return None;
        }

        let temperature = self.temperature();
        let peak = matching
            .iter()
            .map(|(a, _)| *a)
            .fold(f64::NEG_INFINITY, f64::max);
        let weights: Vec<f64> = matching
            .iter()
            .map(|(a, _)| ((a - peak) / temperature).exp())
            .collect();
        let total: f64 = weights.iter().sum();

        Some(
            weights
                .iter()
                .zip(&matching)
                .map(|(w, (_, outcome))| w / total * outcome)
                .sum(),
        )
    }

    /// The choice with the highest blended outcome, with that value.
    ///
    /// Ties are broken uniformly at random. Choices never experienced are
    /// skipped.
    pub fn best_blend<R: Rng + ?Sized>(&self, choices: &[K], rng: &mut R) -> Option<(K, f64)> {
        let mut best_value = f64::NEG_INFINITY;
        let mut tied: Vec<&K> = Vec::new();
        for choice in choices {
            if let Some(value) = self.blend(choice, rng) {
                if value > best_value || tied.is_empty() {
                    best_value = value;
                    tied.clear();
                    tied.push(choice);
                } else if value == best_value {
                    tied.push(choice);
                }
            }
        }

        let pick = match tied.len() {
            0 => return None,
            1 => 0,
            n => rng.gen_range(0..n),
        };
        Some((tied[pick].clone(), best_value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    fn quiet() -> BlendedMemory<&'static str> {
        BlendedMemory::new().with_noise(0.0).with_temperature(1.0)
    }

    #[test]
    fn test_single_instance_blends_to_its_outcome() {
        let mut memory = quiet();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        memory.learn("safe", 12.0);
        memory.advance(1);

        assert_relative_eq!(memory.blend(&"safe", &mut rng).unwrap(), 12.0);
        assert_eq!(memory.blend(&"risky", &mut rng), None);
    }

    #[test]
    fn test_equal_activation_averages() {
        let mut memory = quiet();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        memory.learn("risky", 10.0);
        memory.learn("risky", 0.0);
        memory.advance(1);

        assert_eq!(memory.len(), 2);
        assert_relative_eq!(memory.blend(&"risky", &mut rng).unwrap(), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn test_recent_instance_dominates() {
        let mut memory = quiet();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        memory.learn("risky", 0.0);
        memory.advance(50);
        memory.learn("risky", 10.0);
        memory.advance(1);

        assert!(memory.blend(&"risky", &mut rng).unwrap() > 5.0);
    }

    #[test]
    fn test_reinforcement_reuses_instance() {
        let mut memory = quiet();
        memory.learn("safe", 1.0);
        memory.advance(1);
        memory.learn("safe", 1.0);

        assert_eq!(memory.len(), 1);
        assert_eq!(memory.time(), 1);
    }

    #[test]
    fn test_best_blend_picks_higher_value() {
        let mut memory = quiet();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        memory.learn("safe", 1.0);
        memory.learn("risky", 10.0);
        memory.advance(1);

        let (choice, value) = memory.best_blend(&["safe", "risky"], &mut rng).unwrap();
        assert_eq!(choice, "risky");
        assert_relative_eq!(value, 10.0);
    }

    #[test]
    fn test_ties_broken_at_random() {
        let mut memory = BlendedMemory::new();
        let mut rng = ChaCha8Rng::seed_from_u64(3);
        memory.learn("safe", 12.0);
        memory.learn("risky", 12.0);
        memory.advance(1);

        let mut risky = 0;
        for _ in 0..1000 {
            let (choice, value) = memory.best_blend(&["safe", "risky"], &mut rng).unwrap();
            assert_relative_eq!(value, 12.0);
            if choice == "risky" {
                risky += 1;
            }
        }
        assert!(risky > 400 && risky < 600, "risky chosen {} of 1000", risky);
    }

    #[test]
    fn test_best_blend_without_instances() {
        let memory = quiet();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(memory.best_blend(&["safe", "risky"], &mut rng), None);
    }

    #[test]
    fn test_noisy_blend_stays_within_outcome_range() {
        let mut memory = BlendedMemory::new();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        memory.learn("risky", 10.0);
        memory.learn("risky", 0.0);
        memory.advance(3);

        assert_relative_eq!(memory.temperature(), DEFAULT_NOISE * SQRT_2);
        for _ in 0..100 {
            let value = memory.blend(&"risky", &mut rng).unwrap();
            assert!((0.0..=10.0).contains(&value));
        }
    }
}
