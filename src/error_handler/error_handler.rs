//! A ring-buffer tracker of past forecasts vs. actuals that derives
//! per-leadtime, per-coordinate error statistics and calibrates new
//! forecast ranges (spec.md §4.3).
//!
//! Grounded on `ErrorHandler` in the teacher's `trcf/errorhandler.rs`:
//! `recompute_errors`'s leadtime/coordinate double loop, the
//! positive/negative sum and squared-sum accumulation feeding
//! `error_mean`/`error_rmse`, `interpolated_median`/
//! `interpolated_lower_rank`/`interpolated_upper_rank`, and the
//! `adjust`/`adjust_minimal` calibration math are adapted close to
//! line-for-line. Changed: the teacher grows `past_forecasts`/`actuals` as
//! `Vec`s via `push` until they reach `error_horizon + forecast_horizon`
//! entries; spec.md §3/§4.3 specifies both rings as preallocated to that
//! fixed length `L` from construction, so this version indexes two
//! fixed-size `Vec`s by `sequence_index mod L` from the first tick rather
//! than tracking a separate growth phase. `length(...)` clamps to zero
//! per spec.md §9 open question (a) instead of assuming `sequence_index >=
//! i + 1` (the teacher's version underflows there).

use crate::common::{DiVector, RangeVector};
use crate::contracts::ForecastDescriptor;
use crate::error_handler::types::Calibration;
use crate::errors::{RCFError, Result};
use crate::util::{check_argument, maxf32, minf32};

/// Maximum allowed `error_horizon` (spec.md §3).
pub const MAX_ERROR_HORIZON: usize = 1024;

#[derive(Clone)]
pub struct ErrorHandler {
    base_dimension: usize,
    sequence_index: u64,
    percentile: f32,
    forecast_horizon: usize,
    error_horizon: usize,
    ring_length: usize,

    past_forecasts: Vec<RangeVector>,
    actuals: Vec<Vec<f32>>,

    error_mean: Vec<f32>,
    error_rmse: DiVector,
    error_distribution: RangeVector,
    interval_precision: Vec<f32>,
    last_deviations: Vec<f32>,

    /// Reserved for a future multiplicative calibration scheme (spec.md §9
    /// open question (b)): initialized and carried, never read by
    /// `calibrate`.
    multipliers: Vec<f32>,
    /// Reserved alongside [`Self::multipliers`]; see spec.md §9(b).
    adders: Vec<f32>,
}

impl ErrorHandler {
    pub fn new(
        base_dimension: usize,
        forecast_horizon: usize,
        error_horizon: usize,
        percentile: f32,
    ) -> Result<Self> {
        check_argument(base_dimension > 0, "base dimension must be positive")?;
        check_argument(forecast_horizon > 0, "forecast horizon must be positive")?;
        check_argument(
            error_horizon >= forecast_horizon,
            "error horizon must be at least the forecast horizon",
        )?;
        check_argument(
            error_horizon <= MAX_ERROR_HORIZON,
            "error horizon exceeds the maximum allowed",
        )?;
        check_argument(
            percentile > 0.01 && percentile < 0.49,
            "percentile must lie in (0.01, 0.49)",
        )?;

        let ring_length = error_horizon + forecast_horizon;
        let slots = forecast_horizon * base_dimension;
        Ok(ErrorHandler {
            base_dimension,
            sequence_index: 0,
            percentile,
            forecast_horizon,
            error_horizon,
            ring_length,
            past_forecasts: vec![RangeVector::new(slots); ring_length],
            actuals: vec![vec![0.0; base_dimension]; ring_length],
            error_mean: vec![0.0; slots],
            error_rmse: DiVector::empty(slots),
            error_distribution: RangeVector::new(slots),
            interval_precision: vec![0.0; slots],
            last_deviations: vec![0.0; base_dimension],
            multipliers: vec![1.0; base_dimension],
            adders: vec![0.0; base_dimension],
        })
    }

    /// Reconstruct an error handler from a previously flattened ring-buffer
    /// snapshot (spec.md §4.3, "Serialization constructor"). `actuals_flat`
    /// must have length `current_length * base_dimension`; `forecasts_flat`
    /// must have length `current_length * 3 * forecast_horizon *
    /// base_dimension` (the `values`/`upper`/`lower` triple per ring slot).
    /// Both are laid out ring-slot-major. Fails with `Misaligned` if the
    /// declared `current_length` is inconsistent with either buffer's
    /// length or exceeds `error_horizon + forecast_horizon`.
    #[allow(clippy::too_many_arguments)]
    pub fn from_flattened(
        base_dimension: usize,
        forecast_horizon: usize,
        error_horizon: usize,
        percentile: f32,
        sequence_index: u64,
        current_length: usize,
        actuals_flat: &[f32],
        forecasts_flat: &[f32],
    ) -> Result<Self> {
        let mut handler = Self::new(base_dimension, forecast_horizon, error_horizon, percentile)?;
        check_argument(
            current_length <= handler.ring_length,
            "declared ring length exceeds error_horizon + forecast_horizon",
        )?;
        if current_length * base_dimension != actuals_flat.len() {
            return Err(RCFError::Misaligned {
                msg: "actuals array length inconsistent with declared ring length",
            });
        }
        let slots = forecast_horizon * base_dimension;
        if current_length * 3 * slots != forecasts_flat.len() {
            return Err(RCFError::Misaligned {
                msg: "past-forecasts array length inconsistent with declared ring length",
            });
        }

        for slot in 0..current_length {
            handler.actuals[slot]
                .copy_from_slice(&actuals_flat[slot * base_dimension..(slot + 1) * base_dimension]);
            let base = slot * 3 * slots;
            handler.past_forecasts[slot] = RangeVector::create(
                &forecasts_flat[base..base + slots],
                &forecasts_flat[base + slots..base + 2 * slots],
                &forecasts_flat[base + 2 * slots..base + 3 * slots],
            );
        }
        handler.sequence_index = sequence_index;
        handler.recompute_errors()?;
        Ok(handler)
    }

    pub fn sequence_index(&self) -> u64 {
        self.sequence_index
    }

    /// Record the actual observed at the current tick and any fallback
    /// widening deviations to use until enough error samples have
    /// accumulated, then recompute all derived statistics. Must be called
    /// before [`Self::update_forecasts`] for the same tick (spec.md §5).
    pub fn update_actuals(&mut self, input: &[f32], deviations: &[f32]) -> Result<()> {
        check_argument(input.len() == self.base_dimension, "incorrect input length")?;
        check_argument(
            deviations.len() == self.base_dimension,
            "incorrect deviations length",
        )?;

        if self.sequence_index > 0 {
            let slot = self.ring_index(self.sequence_index - 1);
            self.actuals[slot].copy_from_slice(input);
        }

        self.sequence_index += 1;
        self.recompute_errors()?;

        self.last_deviations.copy_from_slice(deviations);
        Ok(())
    }

    /// Record the forecast issued at the current tick. Must be called
    /// after [`Self::update_actuals`] for the same tick (spec.md §5).
    pub fn update_forecasts(&mut self, range_vector: &RangeVector) -> Result<()> {
        check_argument(
            range_vector.len() == self.forecast_horizon * self.base_dimension,
            "incorrect forecast length",
        )?;
        check_argument(self.sequence_index > 0, "update_actuals must run first")?;
        let slot = self.ring_index(self.sequence_index - 1);
        self.past_forecasts[slot] = range_vector.clone();
        Ok(())
    }

    /// Fill in a [`ForecastDescriptor`] from the current derived statistics
    /// (spec.md §6).
    pub fn augment_descriptor(&self) -> ForecastDescriptor {
        ForecastDescriptor {
            error_mean: self.error_mean.clone(),
            error_rmse_high: self.error_rmse.high.clone(),
            error_rmse_low: self.error_rmse.low.clone(),
            observed_error_distribution: self.error_distribution.clone(),
            interval_precision: self.interval_precision.clone(),
        }
    }

    fn ring_index(&self, sequence_ordinal: u64) -> usize {
        (sequence_ordinal % self.ring_length as u64) as usize
    }

    /// Number of (forecast, actual) pairs available for leadtime `i`,
    /// clamped to zero rather than underflowing when `sequence_index < i +
    /// 1` (spec.md §9 open question (a)).
    fn length(sequence_index: u64, error_horizon: usize, i: usize) -> usize {
        let i = i as u64;
        if sequence_index < i + 1 {
            0
        } else {
            (sequence_index - i - 1).min(error_horizon as u64) as usize
        }
    }

    /// Recompute `error_mean`, `error_rmse`, `error_distribution` and
    /// `interval_precision` from scratch, purely as a function of the
    /// current ring contents and `sequence_index`. Calling this twice with
    /// no interleaved update is idempotent (spec.md §8).
    fn recompute_errors(&mut self) -> Result<()> {
        if self.sequence_index == 0 {
            return Ok(());
        }
        let input_idx = self.sequence_index - 1;
        let mut errors = vec![0.0f32; self.error_horizon];

        for i in 0..self.forecast_horizon {
            let len = Self::length(self.sequence_index, self.error_horizon, i);
            for j in 0..self.base_dimension {
                let pos = i * self.base_dimension + j;
                if len == 0 {
                    self.error_mean[pos] = 0.0;
                    self.error_rmse.high[pos] = 0.0;
                    self.error_rmse.low[pos] = 0.0;
                    self.error_distribution.values[pos] = 0.0;
                    self.error_distribution.upper[pos] = 0.0;
                    self.error_distribution.lower[pos] = 0.0;
                    self.interval_precision[pos] = 0.0;
                    continue;
                }

                let mut positive_sum = 0.0f64;
                let mut positive_sq_sum = 0.0f64;
                let mut positive_count = 0usize;
                let mut negative_sum = 0.0f64;
                let mut negative_sq_sum = 0.0f64;
                let mut hits = 0.0f32;

                for k in 0..len {
                    let actual_slot = self.ring_index(input_idx - k as u64);
                    let forecast_slot = self.ring_index(input_idx - i as u64 - k as u64);
                    let actual = self.actuals[actual_slot][j];
                    let forecast = &self.past_forecasts[forecast_slot];
                    let error = (actual - forecast.values[pos]) as f64;
                    errors[k] = error as f32;

                    if forecast.lower[pos] <= actual && actual <= forecast.upper[pos] {
                        hits += 1.0;
                    }
                    if error >= 0.0 {
                        positive_sum += error;
                        positive_sq_sum += error * error;
                        positive_count += 1;
                    } else {
                        negative_sum += error;
                        negative_sq_sum += error * error;
                    }
                }

                self.error_mean[pos] = ((positive_sum + negative_sum) / len as f64) as f32;
                self.error_rmse.high[pos] = if positive_count == 0 {
                    0.0
                } else {
                    (positive_sq_sum / positive_count as f64).sqrt()
                };
                self.error_rmse.low[pos] = if positive_count == len {
                    0.0
                } else {
                    -(negative_sq_sum / (len - positive_count) as f64).sqrt()
                };
                self.interval_precision[pos] = hits / len as f32;

                if len as f32 * self.percentile >= 1.0 {
                    let window = &mut errors[0..len];
                    window.sort_by(|a, b| a.partial_cmp(b).unwrap());
                    let rank = len as f32 * self.percentile;
                    self.error_distribution.values[pos] = Self::interpolated_median(window);
                    self.error_distribution.upper[pos] = Self::interpolated_upper_rank(window, rank);
                    self.error_distribution.lower[pos] = Self::interpolated_lower_rank(window, rank);
                }
            }
        }
        Ok(())
    }

    /// Calibrate `ranges` in place using the derived error distribution
    /// (spec.md §4.3). Where too few samples have accumulated for a
    /// leadtime/coordinate, widens symmetrically by `1.3 *
    /// last_deviations[j]` instead of using the (unreliable) empirical
    /// quantile.
    pub fn calibrate(&self, method: Calibration, ranges: &mut RangeVector) -> Result<()> {
        check_argument(
            ranges.len() == self.forecast_horizon * self.base_dimension,
            "mismatched forecast length",
        )?;
        if method == Calibration::NONE {
            return Ok(());
        }
        for i in 0..self.forecast_horizon {
            let len = Self::length(self.sequence_index, self.error_horizon, i);
            if len == 0 {
                continue;
            }
            for j in 0..self.base_dimension {
                let pos = i * self.base_dimension + j;
                if len as f32 * self.percentile < 1.0 {
                    let deviation = self.last_deviations[j];
                    ranges.upper[pos] = maxf32(ranges.upper[pos], ranges.values[pos] + 1.3 * deviation);
                    ranges.lower[pos] = minf32(ranges.lower[pos], ranges.values[pos] - 1.3 * deviation);
                } else {
                    match method {
                        Calibration::SIMPLE => Self::adjust(pos, ranges, &self.error_distribution),
                        Calibration::MINIMAL => Self::adjust_minimal(pos, ranges, &self.error_distribution),
                        Calibration::NONE => unreachable!(),
                    }
                }
            }
        }
        Ok(())
    }

    /// The zero-biased median: if the two middle values straddle zero the
    /// median is exactly 0, reducing the externality of a sign change
    /// (spec.md §4.3).
    fn interpolated_median(ascending: &[f32]) -> f32 {
        let len = ascending.len();
        let (lower, upper) = if len % 2 == 0 {
            (ascending[len / 2 - 1], ascending[len / 2])
        } else {
            let mid = (ascending[len / 2] + ascending[len / 2 - 1]) / 2.0;
            (mid, mid)
        };
        if lower <= 0.0 && 0.0 <= upper {
            0.0
        } else {
            (upper + lower) / 2.0
        }
    }

    fn interpolated_lower_rank(ascending: &[f32], frac_rank: f32) -> f32 {
        let rank = frac_rank.floor() as usize;
        ascending[rank - 1] + (frac_rank - rank as f32) * (ascending[rank] - ascending[rank - 1])
    }

    fn interpolated_upper_rank(ascending: &[f32], frac_rank: f32) -> f32 {
        let len = ascending.len();
        let rank = frac_rank.floor() as usize;
        ascending[len - rank]
            + (frac_rank - rank as f32) * (ascending[len - rank - 1] - ascending[len - rank])
    }

    /// `SIMPLE`: widen relative to the already-shifted `values`.
    fn adjust(pos: usize, ranges: &mut RangeVector, dist: &RangeVector) {
        ranges.values[pos] += dist.values[pos];
        ranges.upper[pos] = maxf32(ranges.values[pos], ranges.upper[pos] + dist.upper[pos]);
        ranges.lower[pos] = minf32(ranges.values[pos], ranges.lower[pos] + dist.lower[pos]);
    }

    /// `MINIMAL`: widen relative to the pre-shift `values`.
    fn adjust_minimal(pos: usize, ranges: &mut RangeVector, dist: &RangeVector) {
        let old_value = ranges.values[pos];
        ranges.values[pos] += dist.values[pos];
        ranges.upper[pos] = maxf32(ranges.values[pos], old_value + dist.upper[pos]);
        ranges.lower[pos] = minf32(ranges.values[pos], old_value + dist.lower[pos]);
    }
}
