//! # Forecast Engine
//!
//! ## Overview
//! Produces a five-point AQI forecast from the recent history window, either
//! by asking an external sequence predictor to continue the series or, when
//! that is unavailable or misbehaving, with a local momentum/mean-reversion
//! heuristic.
//!
//! ## Key Behaviors
//! - Only the last [`RECENT_WINDOW`] history samples participate.
//! - External output is re-anchored so the curve continues from the actual
//!   current value rather than whatever level the predictor invented.
//! - A predictor transport error permanently degrades the session to the
//!   heuristic; a merely unusable completion (fewer than three numbers)
//!   falls back for that call only, at reduced confidence.

pub mod external;

pub use external::{parse_numeric_tokens, HttpSequencePredictor, PredictorError, SequencePredictor};

use std::fmt;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// Points per forecast curve.
pub const CURVE_LEN: usize = 5;
/// How many trailing history samples a forecast looks at.
pub const RECENT_WINDOW: usize = 10;
/// Minimum usable numeric tokens in a completion.
const MIN_EXTERNAL_TOKENS: usize = 3;
/// Confidence of an offset-aligned external forecast.
const EXTERNAL_CONFIDENCE: f64 = 0.88;
/// Confidence when a completion was unusable and the heuristic stood in.
const THIN_COMPLETION_CONFIDENCE: f64 = 0.6;
/// Momentum decay per projected step.
const MOMENTUM_DAMPING: f64 = 0.8;
/// Pull toward the baseline per projected step.
const GRAVITY_FACTOR: f64 = 0.05;
/// Level the heuristic reverts toward.
const BASELINE_AQI: f64 = 100.0;
/// Total width of the uniform jitter applied per projected step.
const DEFAULT_JITTER_WIDTH: f64 = 5.0;

/// Health of the external predictor for this session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ForecastStatus {
    /// External predictor (if configured) is still trusted.
    Active,
    /// External predictor failed; heuristic only until restart.
    Degraded,
}

impl fmt::Display for ForecastStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let token = match self {
            ForecastStatus::Active => "active",
            ForecastStatus::Degraded => "degraded",
        };
        write!(f, "{token}")
    }
}

/// One forecast: the value it starts from, the projected points and how much
/// the engine trusts them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub current: f64,
    pub prediction_curve: [f64; CURVE_LEN],
    pub confidence: f64,
}

pub struct ForecastEngine<P = HttpSequencePredictor> {
    rng: StdRng,
    external: Option<P>,
    status: ForecastStatus,
    jitter_width: f64,
}

impl<P: SequencePredictor + Send> ForecastEngine<P> {
    pub fn new(seed: Option<u64>) -> Self {
        let rng = match seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        Self {
            rng,
            external: None,
            status: ForecastStatus::Active,
            jitter_width: DEFAULT_JITTER_WIDTH,
        }
    }

    /// Attaches an external predictor.
    pub fn with_predictor(mut self, predictor: P) -> Self {
        self.external = Some(predictor);
        self
    }

    /// Overrides the heuristic jitter width; `0.0` disables jitter, which
    /// makes projections deterministic.
    pub fn with_jitter(mut self, width: f64) -> Self {
        self.jitter_width = width;
        self
    }

    pub fn status(&self) -> ForecastStatus {
        self.status
    }

    /// Forecasts the next [`CURVE_LEN`] values from `history`, oldest first.
    /// Every input produces a result, an empty history included.
    pub async fn predict(&mut self, history: &[f64]) -> PredictionResult {
        let start = history.len().saturating_sub(RECENT_WINDOW);
        let recent = &history[start..];

        if self.status == ForecastStatus::Degraded {
            return self.heuristic(recent, None);
        }
        let Some(predictor) = self.external.as_mut() else {
            return self.heuristic(recent, None);
        };

        let prompt = format!(
            "predict next values: {}",
            recent
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join(", ")
        );
        match predictor.generate(&prompt).await {
            Ok(completion) => {
                let tokens = parse_numeric_tokens(&completion);
                if tokens.len() < MIN_EXTERNAL_TOKENS {
                    log::debug!(
                        "Completion had {} usable numbers, using heuristic for this forecast",
                        tokens.len()
                    );
                    return self.heuristic(recent, Some(THIN_COMPLETION_CONFIDENCE));
                }
                Self::align(recent, &tokens)
            }
            Err(e) => {
                log::error!(
                    "External predictor failed, degrading to heuristic for this session: {e}"
                );
                self.status = ForecastStatus::Degraded;
                self.heuristic(recent, None)
            }
        }
    }

    /// Re-anchors external predictions onto the actual current value,
    /// truncating to [`CURVE_LEN`] points or padding by repeating the last.
    fn align(recent: &[f64], tokens: &[f64]) -> PredictionResult {
        let current = recent.last().copied().unwrap_or(0.0);
        let offset = current - tokens[0];
        let mut curve = [0.0; CURVE_LEN];
        let mut last = tokens[0] + offset;
        for (i, slot) in curve.iter_mut().enumerate() {
            if let Some(token) = tokens.get(i) {
                last = token + offset;
            }
            *slot = last;
        }
        PredictionResult {
            current,
            prediction_curve: curve,
            confidence: EXTERNAL_CONFIDENCE,
        }
    }

    /// Momentum projection with mean reversion toward [`BASELINE_AQI`]. The
    /// running value is carried forward unrounded; each emitted point is
    /// rounded.
    fn heuristic(&mut self, recent: &[f64], confidence: Option<f64>) -> PredictionResult {
        let current = recent.last().copied().unwrap_or(0.0);
        let previous = if recent.len() >= 2 {
            recent[recent.len() - 2]
        } else {
            current
        };

        let mut momentum = current - previous;
        let mut value = current;
        let mut curve = [0.0; CURVE_LEN];
        for slot in curve.iter_mut() {
            momentum *= MOMENTUM_DAMPING;
            let gravity = (BASELINE_AQI - value) * GRAVITY_FACTOR;
            value += momentum + gravity + self.jitter();
            *slot = value.round();
        }

        let confidence = confidence.unwrap_or_else(|| self.rng.random_range(0.85..0.95));
        PredictionResult {
            current,
            prediction_curve: curve,
            confidence,
        }
    }

    fn jitter(&mut self) -> f64 {
        if self.jitter_width > 0.0 {
            let half = self.jitter_width / 2.0;
            self.rng.random_range(-half..half)
        } else {
            0.0
        }
    }
}
