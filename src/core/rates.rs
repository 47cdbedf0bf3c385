use crate::core::stats::{axial_mean_and_std, linear_regression, median, scaled_mad, LinearFit};
use crate::core::transects::{DistanceObservation, TransectId, TransectSeries};
use crate::io::raster_stack::decimal_year;
use crate::types::{CoastError, CoastResult};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// Rate-of-change fitting parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RateParams {
    /// Fraction of epochs that must be observed before a trend is fitted
    pub min_observation_fraction: f64,
    /// p-value at or below which a trend is significant
    pub significance_level: f64,
    /// Residuals beyond this many scaled MADs are rejected and the trend refit
    pub outlier_threshold: Option<f64>,
    /// Change envelope (map units) above which a fit is flagged extreme
    pub extreme_change_threshold: f64,
    /// Circular std (degrees) of shoreline angles above which a fit is flagged
    pub max_angular_std: f64,
}

impl Default for RateParams {
    fn default() -> Self {
        Self {
            min_observation_fraction: 0.5,
            significance_level: 0.01,
            outlier_threshold: Some(3.0),
            extreme_change_threshold: 200.0,
            max_angular_std: 30.0,
        }
    }
}

/// Smallest series a trend is ever fitted to
const MIN_FIT_OBSERVATIONS: usize = 3;

/// Residual spread (map units) below which no epoch is treated as an outlier
const MIN_RESIDUAL_SPREAD: f64 = 1e-3;

/// Quality flag attached to every fitted trend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Certainty {
    Good,
    /// Shoreline moved further than is physically plausible
    ExtremeValue,
    /// Shoreline orientation changed a lot between epochs
    HighAngularVariability,
}

/// A fitted distance/time trend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendFit {
    /// Map units per year; positive means the shoreline moves seaward
    pub slope: f64,
    pub intercept: f64,
    pub std_error: f64,
    pub p_value: f64,
    pub significant: bool,
    pub observations_used: usize,
    /// Epochs rejected as outliers before the final fit
    pub outliers: Vec<NaiveDate>,
    /// Shoreline change envelope: furthest minus nearest distance
    pub envelope: f64,
    /// Net shoreline movement: last minus first distance
    pub net_movement: f64,
    pub max_date: NaiveDate,
    pub min_date: NaiveDate,
    pub angle_mean: f64,
    pub angle_std: f64,
    pub certainty: Certainty,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum RateEstimate {
    Fitted(TrendFit),
    /// Too few observed epochs; no slope is reported
    InsufficientData { valid: usize, required: usize },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateOfChangeResult {
    pub transect: TransectId,
    pub valid_observations: usize,
    pub total_epochs: usize,
    pub estimate: RateEstimate,
}

impl RateOfChangeResult {
    /// Fitted slope, `None` when data were insufficient
    pub fn rate(&self) -> Option<f64> {
        match &self.estimate {
            RateEstimate::Fitted(fit) => Some(fit.slope),
            RateEstimate::InsufficientData { .. } => None,
        }
    }

    pub fn is_significant(&self) -> bool {
        matches!(&self.estimate, RateEstimate::Fitted(fit) if fit.significant)
    }
}

/// One observed epoch in time order
#[derive(Debug, Clone, Copy)]
struct Sample {
    date: NaiveDate,
    year: f64,
    distance: f64,
    angle: f64,
}

/// Fits linear shoreline-change trends per transect
pub struct RateOfChangeEstimator {
    params: RateParams,
}

impl RateOfChangeEstimator {
    pub fn new(params: RateParams) -> Self {
        Self { params }
    }

    pub fn standard() -> Self {
        Self::new(RateParams::default())
    }

    /// Observed epochs needed out of `total_epochs`
    pub fn required_observations(&self, total_epochs: usize) -> usize {
        let fraction = (self.params.min_observation_fraction * total_epochs as f64).ceil() as usize;
        fraction.max(MIN_FIT_OBSERVATIONS)
    }

    /// Fit one transect's series.
    ///
    /// Observations are ordered by date whatever their input order; two
    /// observations with the same date fail with
    /// [`CoastError::DuplicateTimestamp`].
    pub fn estimate(&self, series: &TransectSeries) -> CoastResult<RateOfChangeResult> {
        let mut observations = series.observations.clone();
        observations.sort_by_key(|o| o.date);
        if let Some(pair) = observations.windows(2).find(|w| w[0].date == w[1].date) {
            return Err(CoastError::DuplicateTimestamp(pair[0].date));
        }

        let samples: Vec<Sample> = observations
            .iter()
            .filter_map(|o| match o.observation {
                DistanceObservation::Observed { distance, angle } => Some(Sample {
                    date: o.date,
                    year: decimal_year(o.date),
                    distance,
                    angle,
                }),
                DistanceObservation::Absent(_) => None,
            })
            .collect();

        let total_epochs = observations.len();
        let required = self.required_observations(total_epochs);
        let insufficient = RateEstimate::InsufficientData {
            valid: samples.len(),
            required,
        };

        let estimate = if samples.len() < required {
            insufficient
        } else {
            self.fit(&samples, required).unwrap_or(insufficient)
        };

        Ok(RateOfChangeResult {
            transect: series.transect.id,
            valid_observations: samples.len(),
            total_epochs,
            estimate,
        })
    }

    /// Fit every series of a tile
    pub fn estimate_all(&self, series: &[TransectSeries]) -> CoastResult<Vec<RateOfChangeResult>> {
        let results = series
            .iter()
            .map(|s| self.estimate(s))
            .collect::<CoastResult<Vec<_>>>()?;

        let fitted = results.iter().filter(|r| r.rate().is_some()).count();
        let significant = results.iter().filter(|r| r.is_significant()).count();
        log::debug!(
            "Rates: {} of {} transects fitted, {} significant",
            fitted,
            results.len(),
            significant
        );
        Ok(results)
    }

    fn fit(&self, samples: &[Sample], required: usize) -> Option<RateEstimate> {
        let (mut fit, mut used) = regress(samples)?;
        let mut outliers = Vec::new();

        if let Some(threshold) = self.params.outlier_threshold {
            let rejected = residual_outliers(&fit, &used, threshold);
            if !rejected.is_empty() && used.len() - rejected.len() >= required {
                let kept: Vec<Sample> = used
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| !rejected.contains(i))
                    .map(|(_, s)| *s)
                    .collect();
                if let Some((refit, refit_used)) = regress(&kept) {
                    outliers = rejected.iter().map(|&i| used[i].date).collect();
                    fit = refit;
                    used = refit_used;
                }
            }
        }

        let first = used.first()?;
        let last = used.last()?;
        let max = used.iter().max_by(|a, b| a.distance.total_cmp(&b.distance))?;
        let min = used.iter().min_by(|a, b| a.distance.total_cmp(&b.distance))?;
        let angles: Vec<f64> = used.iter().map(|s| s.angle).collect();
        let (angle_mean, angle_std) = axial_mean_and_std(&angles)?;
        let envelope = max.distance - min.distance;

        let certainty = if envelope > self.params.extreme_change_threshold {
            Certainty::ExtremeValue
        } else if angle_std > self.params.max_angular_std {
            Certainty::HighAngularVariability
        } else {
            Certainty::Good
        };

        Some(RateEstimate::Fitted(TrendFit {
            slope: fit.slope,
            intercept: fit.intercept,
            std_error: fit.slope_std_error,
            p_value: fit.p_value,
            significant: fit.p_value <= self.params.significance_level,
            observations_used: used.len(),
            outliers,
            envelope,
            net_movement: last.distance - first.distance,
            max_date: max.date,
            min_date: min.date,
            angle_mean,
            angle_std,
            certainty,
        }))
    }
}

fn regress(samples: &[Sample]) -> Option<(LinearFit, Vec<Sample>)> {
    let x: Vec<f64> = samples.iter().map(|s| s.year).collect();
    let y: Vec<f64> = samples.iter().map(|s| s.distance).collect();
    linear_regression(&x, &y).map(|fit| (fit, samples.to_vec()))
}

/// Indices whose residual deviates from the median residual by more than
/// `threshold` scaled MADs
fn residual_outliers(fit: &LinearFit, samples: &[Sample], threshold: f64) -> Vec<usize> {
    let residuals: Vec<f64> = samples
        .iter()
        .map(|s| s.distance - fit.predict(s.year))
        .collect();
    let (Some(centre), Some(mad)) = (median(&residuals), scaled_mad(&residuals)) else {
        return Vec::new();
    };
    if mad < MIN_RESIDUAL_SPREAD {
        return Vec::new();
    }
    residuals
        .iter()
        .enumerate()
        .filter(|(_, r)| (*r - centre).abs() > threshold * mad)
        .map(|(i, _)| i)
        .collect()
}
