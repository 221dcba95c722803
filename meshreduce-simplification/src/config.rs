//! Reduction job configuration

use serde::{Deserialize, Serialize};

use crate::error::{SimplifyError, SimplifyResult};

/// Options recognised by a reduction job.
///
/// Exactly one of `target_triangle_count` and `target_ratio` must be set.
/// Deserialized configs start with neither target set, so a file naming only
/// `target_triangle_count` is valid.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default = "ReductionConfig::untargeted", deny_unknown_fields)]
pub struct ReductionConfig {
    /// Stop once the live triangle count is at or below this value.
    pub target_triangle_count: Option<usize>,

    /// Fraction of the input triangles to keep, `0 < r <= 1`.
    pub target_ratio: Option<f32>,

    /// Stop when the cheapest remaining collapse costs more than this.
    pub error_ceiling: Option<f64>,

    /// Never collapse an edge touching a boundary vertex.
    pub preserve_boundary_edges: bool,

    /// Reject collapses that rotate a surviving triangle's normal further than this.
    pub normal_flip_angle_threshold_degrees: f64,

    /// Enforce the link condition so the result stays manifold.
    pub preserve_topology: bool,

    /// Weight of the boundary constraint planes when boundaries are not locked.
    pub boundary_weight: f64,

    /// Collapses producing triangles below this quality (1 = equilateral) are penalised.
    pub quality_threshold: f64,

    /// Smallest triangle quality the penalty divides by.
    pub quality_floor: f64,

    /// Weight of the uv stretch added to a collapse's cost when the mesh has uvs.
    pub texture_weight: f64,

    /// Place merged vertices at the quadric minimizer instead of the best of midpoint/endpoints.
    pub optimal_placement: bool,

    /// Weight triangle planes by area when accumulating quadrics.
    pub area_weighting: bool,

    /// Relative determinant below which the quadric system counts as singular.
    pub singular_tolerance: f64,

    /// Triangles with area at or below this are treated as degenerate.
    pub degenerate_area_epsilon: f64,

    /// Run the cleaning pass before import.
    pub clean_input: bool,
}

impl Default for ReductionConfig {
    fn default() -> Self {
        Self {
            target_ratio: Some(0.5),
            ..Self::untargeted()
        }
    }
}

impl ReductionConfig {
    fn untargeted() -> Self {
        Self {
            target_triangle_count: None,
            target_ratio: None,
            error_ceiling: None,
            preserve_boundary_edges: true,
            normal_flip_angle_threshold_degrees: 85.0,
            preserve_topology: true,
            boundary_weight: 1.0,
            quality_threshold: 0.3,
            quality_floor: 1e-6,
            texture_weight: 1.0,
            optimal_placement: true,
            area_weighting: true,
            singular_tolerance: 1e-10,
            degenerate_area_epsilon: 1e-12,
            clean_input: false,
        }
    }

    /// Create a config targeting a specific triangle count.
    pub fn with_target_triangles(count: usize) -> Self {
        Self {
            target_triangle_count: Some(count),
            ..Self::untargeted()
        }
    }

    /// Create a config targeting a ratio of the input triangles.
    pub fn with_target_ratio(ratio: f32) -> Self {
        Self {
            target_ratio: Some(ratio),
            ..Self::untargeted()
        }
    }

    pub fn error_ceiling(mut self, ceiling: f64) -> Self {
        self.error_ceiling = Some(ceiling);
        self
    }

    pub fn preserve_boundary_edges(mut self, preserve: bool) -> Self {
        self.preserve_boundary_edges = preserve;
        self
    }

    pub fn normal_flip_angle(mut self, degrees: f64) -> Self {
        self.normal_flip_angle_threshold_degrees = degrees;
        self
    }

    pub fn preserve_topology(mut self, preserve: bool) -> Self {
        self.preserve_topology = preserve;
        self
    }

    pub fn boundary_weight(mut self, weight: f64) -> Self {
        self.boundary_weight = weight;
        self
    }

    pub fn quality_threshold(mut self, threshold: f64) -> Self {
        self.quality_threshold = threshold;
        self
    }

    pub fn texture_weight(mut self, weight: f64) -> Self {
        self.texture_weight = weight;
        self
    }

    pub fn optimal_placement(mut self, optimal: bool) -> Self {
        self.optimal_placement = optimal;
        self
    }

    pub fn clean_input(mut self, clean: bool) -> Self {
        self.clean_input = clean;
        self
    }

    /// Check option ranges and the target exclusivity rule.
    pub fn validate(&self) -> SimplifyResult<()> {
        match (self.target_triangle_count, self.target_ratio) {
            (Some(_), Some(_)) => {
                return Err(invalid(
                    "target_triangle_count and target_ratio are mutually exclusive",
                ))
            }
            (None, None) => {
                return Err(invalid(
                    "one of target_triangle_count or target_ratio is required",
                ))
            }
            (None, Some(r)) if !(r > 0.0 && r <= 1.0) => {
                return Err(invalid(format!("target_ratio {r} must be in (0, 1]")))
            }
            _ => {}
        }

        if let Some(ceiling) = self.error_ceiling {
            if ceiling.is_nan() || ceiling < 0.0 {
                return Err(invalid(format!("error_ceiling {ceiling} must be >= 0")));
            }
        }
        let angle = self.normal_flip_angle_threshold_degrees;
        if !(angle > 0.0 && angle <= 180.0) {
            return Err(invalid(format!(
                "normal_flip_angle_threshold_degrees {angle} must be in (0, 180]"
            )));
        }
        if !(self.boundary_weight >= 0.0 && self.boundary_weight.is_finite()) {
            return Err(invalid("boundary_weight must be finite and >= 0"));
        }
        if !(self.texture_weight >= 0.0 && self.texture_weight.is_finite()) {
            return Err(invalid("texture_weight must be finite and >= 0"));
        }
        if !(0.0..=1.0).contains(&self.quality_threshold) {
            return Err(invalid("quality_threshold must be in [0, 1]"));
        }
        if !(self.quality_floor > 0.0 && self.quality_floor <= 1.0) {
            return Err(invalid("quality_floor must be in (0, 1]"));
        }
        if !(self.singular_tolerance >= 0.0) || !(self.degenerate_area_epsilon >= 0.0) {
            return Err(invalid("tolerances must be >= 0"));
        }
        Ok(())
    }

    /// Resolve the triangle target for an input of `triangles` triangles.
    pub fn resolve_target(&self, triangles: usize) -> SimplifyResult<usize> {
        self.validate()?;
        match (self.target_triangle_count, self.target_ratio) {
            (Some(count), _) => Ok(count),
            (None, Some(ratio)) => Ok((triangles as f64 * f64::from(ratio)).floor() as usize),
            (None, None) => Err(invalid("no triangle target set")),
        }
    }

    /// Cosine of the normal flip threshold, the form the collapse guard compares against.
    pub fn normal_flip_cos(&self) -> f64 {
        self.normal_flip_angle_threshold_degrees.to_radians().cos()
    }
}

fn invalid(msg: impl Into<String>) -> SimplifyError {
    SimplifyError::InvalidConfig(msg.into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ReductionConfig::default();
        assert_eq!(config.target_ratio, Some(0.5));
        assert!(config.target_triangle_count.is_none());
        assert!(config.preserve_boundary_edges);
        assert!(config.preserve_topology);
        assert_eq!(config.normal_flip_angle_threshold_degrees, 85.0);
        assert!(config.error_ceiling.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_targets_are_exclusive() {
        let mut config = ReductionConfig::with_target_triangles(10);
        assert!(config.validate().is_ok());
        config.target_ratio = Some(0.5);
        assert!(matches!(
            config.validate(),
            Err(SimplifyError::InvalidConfig(_))
        ));

        config.target_ratio = None;
        config.target_triangle_count = None;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_ratio_range() {
        assert!(ReductionConfig::with_target_ratio(0.0).validate().is_err());
        assert!(ReductionConfig::with_target_ratio(1.5).validate().is_err());
        assert!(ReductionConfig::with_target_ratio(f32::NAN).validate().is_err());
        assert!(ReductionConfig::with_target_ratio(1.0).validate().is_ok());
    }

    #[test]
    fn test_resolve_target() {
        let config = ReductionConfig::with_target_ratio(0.5);
        assert_eq!(config.resolve_target(50).unwrap(), 25);
        assert_eq!(config.resolve_target(7).unwrap(), 3);

        let config = ReductionConfig::with_target_triangles(4);
        assert_eq!(config.resolve_target(12).unwrap(), 4);
    }

    #[test]
    fn test_builder() {
        let config = ReductionConfig::with_target_triangles(100)
            .error_ceiling(0.01)
            .preserve_boundary_edges(false)
            .normal_flip_angle(60.0)
            .boundary_weight(5.0)
            .texture_weight(0.0)
            .clean_input(true);

        assert_eq!(config.error_ceiling, Some(0.01));
        assert!(!config.preserve_boundary_edges);
        assert_eq!(config.normal_flip_angle_threshold_degrees, 60.0);
        assert_eq!(config.boundary_weight, 5.0);
        assert_eq!(config.texture_weight, 0.0);
        assert!(config.clean_input);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_invalid_ranges() {
        assert!(ReductionConfig::default().normal_flip_angle(0.0).validate().is_err());
        assert!(ReductionConfig::default().error_ceiling(-1.0).validate().is_err());
        assert!(ReductionConfig::default().quality_threshold(2.0).validate().is_err());
        assert!(ReductionConfig::default().boundary_weight(-1.0).validate().is_err());
        assert!(ReductionConfig::default().texture_weight(f64::INFINITY).validate().is_err());

        let mut config = ReductionConfig::default();
        config.quality_floor = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_normal_flip_cos() {
        let config = ReductionConfig::default().normal_flip_angle(90.0);
        approx::assert_abs_diff_eq!(config.normal_flip_cos(), 0.0, epsilon = 1e-12);
    }

    #[test]
    fn test_deserialize_count_only() {
        let config: ReductionConfig =
            serde_json::from_str(r#"{ "target_triangle_count": 4 }"#).unwrap();
        assert_eq!(config.target_triangle_count, Some(4));
        assert!(config.target_ratio.is_none());
        assert!(config.preserve_boundary_edges);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_deserialize_rejects_unknown_keys() {
        let result: Result<ReductionConfig, _> =
            serde_json::from_str(r#"{ "target_ratio": 0.5, "speed": 3 }"#);
        assert!(result.is_err());
    }
}
