//! Run-wide configuration shared by every tile

use crate::core::{
    BaselineParams, CleaningParams, ExtractionParams, HotspotParams, MergeParams, RateParams,
    TransectParams,
};
use crate::types::{CoastError, CoastResult};
use serde::{Deserialize, Serialize};

/// Parameters for every processing stage
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoastlinesConfig {
    pub extraction: ExtractionParams,
    pub cleaning: CleaningParams,
    pub baseline: BaselineParams,
    pub transects: TransectParams,
    pub rates: RateParams,
    pub hotspots: HotspotParams,
    pub merge: MergeParams,
}

impl CoastlinesConfig {
    /// Reject settings no tile could be processed with
    pub fn validate(&self) -> CoastResult<()> {
        let e = &self.extraction;
        if !e.threshold.is_finite() || !(-1.0..=1.0).contains(&e.threshold) {
            return invalid(format!(
                "extraction threshold {} outside the water index range [-1, 1]",
                e.threshold
            ));
        }
        check_fraction("extraction.min_valid_fraction", e.min_valid_fraction, true)?;
        check_non_negative("extraction.gap_tolerance", e.gap_tolerance)?;
        check_non_negative("extraction.simplify_tolerance", e.simplify_tolerance)?;

        let c = &self.cleaning;
        check_non_negative("cleaning.min_length", c.min_length)?;
        check_positive("cleaning.max_reference_distance", c.max_reference_distance)?;
        check_non_negative("cleaning.duplicate_tolerance", c.duplicate_tolerance)?;

        let b = &self.baseline;
        check_positive("baseline.vertex_spacing", b.vertex_spacing)?;
        if b.smoothing_window == 0 {
            return invalid("baseline.smoothing_window must be at least 1".to_string());
        }

        let t = &self.transects;
        check_positive("transects.spacing", t.spacing)?;
        check_positive("transects.length", t.length)?;
        check_positive("transects.tangent_window", t.tangent_window)?;

        let r = &self.rates;
        check_fraction("rates.min_observation_fraction", r.min_observation_fraction, false)?;
        check_fraction("rates.significance_level", r.significance_level, false)?;
        if let Some(threshold) = r.outlier_threshold {
            check_positive("rates.outlier_threshold", threshold)?;
        }
        check_positive("rates.extreme_change_threshold", r.extreme_change_threshold)?;
        check_positive("rates.max_angular_std", r.max_angular_std)?;

        let h = &self.hotspots;
        if !(h.segment_length > t.spacing) {
            return invalid(format!(
                "hotspots.segment_length {} must exceed the transect spacing {}",
                h.segment_length, t.spacing
            ));
        }
        if h.min_transects == 0 {
            return invalid("hotspots.min_transects must be at least 1".to_string());
        }

        check_non_negative("merge.boundary_buffer", self.merge.boundary_buffer)?;
        Ok(())
    }
}

fn invalid(message: String) -> CoastResult<()> {
    Err(CoastError::InvalidConfig(message))
}

fn check_positive(name: &str, value: f64) -> CoastResult<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        invalid(format!("{} must be positive, got {}", name, value))
    }
}

fn check_non_negative(name: &str, value: f64) -> CoastResult<()> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        invalid(format!("{} must be non-negative, got {}", name, value))
    }
}

/// Fraction in (0, 1], or [0, 1] when `allow_zero`
fn check_fraction(name: &str, value: f64, allow_zero: bool) -> CoastResult<()> {
    let lower_ok = if allow_zero { value >= 0.0 } else { value > 0.0 };
    if value.is_finite() && lower_ok && value <= 1.0 {
        Ok(())
    } else {
        invalid(format!("{} must be a fraction, got {}", name, value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(CoastlinesConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_settings_rejected() {
        let mut config = CoastlinesConfig::default();
        config.extraction.threshold = 1.5;
        assert!(matches!(config.validate(), Err(CoastError::InvalidConfig(_))));

        let mut config = CoastlinesConfig::default();
        config.transects.spacing = 0.0;
        assert!(config.validate().is_err());

        let mut config = CoastlinesConfig::default();
        config.rates.min_observation_fraction = 1.2;
        assert!(config.validate().is_err());

        let mut config = CoastlinesConfig::default();
        config.hotspots.segment_length = 20.0;
        assert!(config.validate().is_err());

        let mut config = CoastlinesConfig::default();
        config.merge.boundary_buffer = f64::NAN;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_outlier_rejection_can_be_disabled() {
        let mut config = CoastlinesConfig::default();
        config.rates.outlier_threshold = None;
        assert!(config.validate().is_ok());
        config.rates.outlier_threshold = Some(-1.0);
        assert!(config.validate().is_err());
    }
}
