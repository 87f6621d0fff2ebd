use rand::Rng;
use rand_distr::{Distribution as RandDistribution, Exp, Gamma, LogNormal, Normal, Pareto, Uniform};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SampleError {
    #[error("unknown or malformed distribution {name:?} with parameters {parameters:?}")]
    InvalidDistribution { name: String, parameters: Vec<f64> },

    #[error("distribution {name:?} produced a non-positive throughput ({value})")]
    NonPositiveThroughput { name: String, value: f64 },

    #[error("distribution {name:?} kept producing negative delays after {attempts} resamples")]
    NegativeDelayExhausted { name: String, attempts: u32 },
}

/// `{"name": str, "parameters": "(p1,p2,...)"}` as described in spec.md §6.
/// Accepts either the original tuple-as-string shape or a plain JSON array,
/// since both appear across the corpus' config-loading code.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Distribution {
    pub name: String,
    pub parameters: Vec<f64>,
}

impl<'de> Deserialize<'de> for Distribution {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        #[derive(Deserialize)]
        struct Raw {
            name: String,
            parameters: RawParameters,
        }
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawParameters {
            Text(String),
            List(Vec<f64>),
        }
        let raw = Raw::deserialize(deserializer)?;
        let parameters = match raw.parameters {
            RawParameters::List(list) => list,
            RawParameters::Text(text) => parse_tuple_string(&text)
                .map_err(|e| serde::de::Error::custom(format!("bad parameters {text:?}: {e}")))?,
        };
        Ok(Distribution { name: raw.name, parameters })
    }
}

/// Parses a `"(p1, p2, ...)"` string into its component floats. Exposed for
/// other tuple-string fields in the input files (e.g. a factory's
/// `mega_hashrate_range`) that share this same source-derived shape.
pub fn parse_tuple_string(text: &str) -> Result<Vec<f64>, std::num::ParseFloatError> {
    text.trim()
        .trim_start_matches('(')
        .trim_end_matches(')')
        .split(',')
        .map(|p| p.trim())
        .filter(|p| !p.is_empty())
        .map(|p| p.parse::<f64>())
        .collect()
}

/// A distribution resolved into a sampler that can be drawn from repeatedly.
/// This is the simulator's only source of non-determinism: callers supply
/// the shared kernel-owned RNG so a whole run can be replayed from its seed.
pub enum Sampler {
    Uniform(Uniform<f64>),
    Normal(Normal<f64>),
    LogNormal(LogNormal<f64>),
    Exponential(Exp<f64>),
    Gamma(Gamma<f64>),
    Pareto(Pareto<f64>),
    Constant(f64),
}

impl Sampler {
    pub fn build(dist: &Distribution) -> Result<Self, SampleError> {
        let p = &dist.parameters;
        let invalid = || SampleError::InvalidDistribution {
            name: dist.name.clone(),
            parameters: p.clone(),
        };
        let sampler = match dist.name.to_ascii_lowercase().as_str() {
            "uniform" => {
                let (lo, hi) = (*p.first().ok_or_else(invalid)?, *p.get(1).ok_or_else(invalid)?);
                if lo >= hi {
                    return Err(invalid());
                }
                Sampler::Uniform(Uniform::new(lo, hi))
            }
            "normal" | "norm" | "gaussian" => {
                let (mean, std) =
                    (*p.first().ok_or_else(invalid)?, *p.get(1).ok_or_else(invalid)?);
                Sampler::Normal(Normal::new(mean, std).map_err(|_| invalid())?)
            }
            "lognormal" | "lognorm" => {
                let (mu, sigma) =
                    (*p.first().ok_or_else(invalid)?, *p.get(1).ok_or_else(invalid)?);
                Sampler::LogNormal(LogNormal::new(mu, sigma).map_err(|_| invalid())?)
            }
            "exponential" | "expon" | "exp" => {
                let rate = *p.first().ok_or_else(invalid)?;
                Sampler::Exponential(Exp::new(rate).map_err(|_| invalid())?)
            }
            "gamma" => {
                let (shape, scale) =
                    (*p.first().ok_or_else(invalid)?, *p.get(1).ok_or_else(invalid)?);
                Sampler::Gamma(Gamma::new(shape, scale).map_err(|_| invalid())?)
            }
            "pareto" => {
                let (scale, shape) =
                    (*p.first().ok_or_else(invalid)?, *p.get(1).ok_or_else(invalid)?);
                Sampler::Pareto(Pareto::new(scale, shape).map_err(|_| invalid())?)
            }
            "constant" | "degenerate" | "fixed" => {
                Sampler::Constant(*p.first().ok_or_else(invalid)?)
            }
            _ => return Err(invalid()),
        };
        Ok(sampler)
    }

    pub fn sample(&self, rng: &mut impl Rng) -> f64 {
        match self {
            Sampler::Uniform(d) => d.sample(rng),
            Sampler::Normal(d) => d.sample(rng),
            Sampler::LogNormal(d) => d.sample(rng),
            Sampler::Exponential(d) => d.sample(rng),
            Sampler::Gamma(d) => d.sample(rng),
            Sampler::Pareto(d) => d.sample(rng),
            Sampler::Constant(v) => *v,
        }
    }

    /// Resamples up to `max_attempts` times if a draw comes back negative,
    /// per the `time_between_blocks` guard spec.md's Open Questions call
    /// for (resampling over clamping, for realism).
    pub fn sample_non_negative(
        &self,
        rng: &mut impl Rng,
        name: &str,
        max_attempts: u32,
    ) -> Result<f64, SampleError> {
        for _ in 0..max_attempts {
            let v = self.sample(rng);
            if v >= 0.0 {
                return Ok(v);
            }
            tracing::trace!(distribution = name, value = v, "resampling negative draw");
        }
        Err(SampleError::NegativeDelayExhausted {
            name: name.to_owned(),
            attempts: max_attempts,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_chacha::ChaCha8Rng;

    #[test]
    fn parses_tuple_string_parameters() {
        let json = r#"{"name":"uniform","parameters":"(20, 40)"}"#;
        let dist: Distribution = serde_json::from_str(json).unwrap();
        assert_eq!(dist.parameters, vec![20.0, 40.0]);
    }

    #[test]
    fn parses_array_parameters() {
        let json = r#"{"name":"uniform","parameters":[20.0, 40.0]}"#;
        let dist: Distribution = serde_json::from_str(json).unwrap();
        assert_eq!(dist.parameters, vec![20.0, 40.0]);
    }

    #[test]
    fn constant_sampler_always_returns_same_value() {
        let dist = Distribution { name: "constant".into(), parameters: vec![10.0] };
        let sampler = Sampler::build(&dist).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        assert_eq!(sampler.sample(&mut rng), 10.0);
        assert_eq!(sampler.sample(&mut rng), 10.0);
    }

    #[test]
    fn uniform_samples_stay_in_range() {
        let dist = Distribution { name: "uniform".into(), parameters: vec![1.0, 2.0] };
        let sampler = Sampler::build(&dist).unwrap();
        let mut rng = ChaCha8Rng::seed_from_u64(42);
        for _ in 0..100 {
            let v = sampler.sample(&mut rng);
            assert!((1.0..2.0).contains(&v));
        }
    }

    #[test]
    fn unknown_distribution_is_rejected() {
        let dist = Distribution { name: "made-up".into(), parameters: vec![1.0] };
        assert!(Sampler::build(&dist).is_err());
    }
}
