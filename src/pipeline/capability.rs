//! Capability negotiation.
//!
//! A consumer asks a source node for an output with given characteristics
//! (a [`CapabilityRequest`]). Source nodes implement [`CapabilitySource`];
//! its provided `supports_capability` method resolves the request into a
//! concrete [`OutputSpec`] or explains why it cannot.
//!
//! Sizes are reached through the hardware scaler, which applies an integer
//! ratio `num / den` per axis. See [`best_fit`].

use crate::pipeline::error::NegotiationError;
use crate::pipeline::message::DatatypeKind;
use serde::{Deserialize, Serialize};

/// Largest scaler numerator.
pub const MAX_SCALE_NUMERATOR: u32 = 16;
/// Largest scaler denominator.
pub const MAX_SCALE_DENOMINATOR: u32 = 63;

/// Where an output's messages are produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Residency {
    #[default]
    Device,
    Host,
}

/// Desired characteristics of a new output.
#[derive(Debug, Clone, PartialEq)]
pub struct CapabilityRequest {
    pub kind: DatatypeKind,
    /// `(width, height)`; `None` keeps the source size.
    pub size: Option<(u32, u32)>,
    /// `None` keeps the source rate.
    pub fps: Option<f32>,
    pub residency: Residency,
    /// Key in the dynamic output map; generated when `None`.
    pub name: Option<String>,
}

impl CapabilityRequest {
    pub fn new(kind: DatatypeKind) -> Self {
        Self {
            kind,
            size: None,
            fps: None,
            residency: Residency::Device,
            name: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn with_fps(mut self, fps: f32) -> Self {
        self.fps = Some(fps);
        self
    }

    pub fn on_host(mut self, on_host: bool) -> Self {
        self.residency = if on_host {
            Residency::Host
        } else {
            Residency::Device
        };
        self
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Same output characteristics, ignoring the requested name.
    pub fn same_profile(&self, other: &CapabilityRequest) -> bool {
        self.kind == other.kind
            && self.size == other.size
            && self.fps == other.fps
            && self.residency == other.residency
    }
}

/// Integer scaling ratio applied by the scaler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScaleFactor {
    pub numerator: u32,
    pub denominator: u32,
}

impl ScaleFactor {
    pub const IDENTITY: ScaleFactor = ScaleFactor {
        numerator: 1,
        denominator: 1,
    };

    pub fn apply(self, input: u32) -> u32 {
        scaled_size(input, self.numerator, self.denominator)
    }
}

/// Result of [`best_fit`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScaleFit {
    pub scale: ScaleFactor,
    pub achieved: u32,
}

/// `floor(input * num / denom)`. A zero denominator yields 0.
pub fn scaled_size(input: u32, num: u32, denom: u32) -> u32 {
    if denom == 0 {
        return 0;
    }
    (input as u64 * num as u64 / denom as u64) as u32
}

/// Pick the downscaling ratio whose output is closest to `requested`.
///
/// Candidates satisfy `1 <= num <= 16`, `1 <= den <= 63` and `num <= den`.
/// Ties go to the smaller denominator, then the smaller numerator, which also
/// keeps the winner in lowest terms. Returns `None` when `requested` is zero,
/// larger than `input`, or below the smallest reachable size.
pub fn best_fit(input: u32, requested: u32) -> Option<ScaleFit> {
    if requested == 0 || requested > input {
        return None;
    }
    if requested < scaled_size(input, 1, MAX_SCALE_DENOMINATOR) {
        return None;
    }

    let mut best: Option<(u32, ScaleFit)> = None;
    for denominator in 1..=MAX_SCALE_DENOMINATOR {
        for numerator in 1..=denominator.min(MAX_SCALE_NUMERATOR) {
            let achieved = scaled_size(input, numerator, denominator);
            let diff = achieved.abs_diff(requested);
            // Iteration order already favours smaller denominators, then
            // smaller numerators, so only strictly better fits replace.
            let better = match &best {
                None => true,
                Some((best_diff, _)) => diff < *best_diff,
            };
            if better {
                best = Some((
                    diff,
                    ScaleFit {
                        scale: ScaleFactor {
                            numerator,
                            denominator,
                        },
                        achieved,
                    },
                ));
            }
        }
    }
    best.map(|(_, fit)| fit)
}

/// Concrete output a source committed to.
#[derive(Debug, Clone, PartialEq)]
pub struct OutputSpec {
    pub kind: DatatypeKind,
    pub width: u32,
    pub height: u32,
    pub horizontal_scale: ScaleFactor,
    pub vertical_scale: ScaleFactor,
    pub fps: f32,
    pub residency: Residency,
}

/// Implemented by nodes that can materialize outputs on request.
pub trait CapabilitySource {
    /// Kinds this source can emit on a dynamic output.
    fn producible_kinds(&self) -> &[DatatypeKind];

    /// Where the source's outputs live.
    fn output_residency(&self) -> Residency;

    /// Unscaled frame size.
    fn source_size(&self) -> (u32, u32);

    /// Highest rate the source runs at.
    fn source_fps(&self) -> f32;

    /// Resolve `request` against this source.
    fn supports_capability(
        &self,
        request: &CapabilityRequest,
    ) -> Result<OutputSpec, NegotiationError> {
        if !self.producible_kinds().contains(&request.kind) {
            return Err(NegotiationError::NoCompatibleKind {
                requested: request.kind,
            });
        }

        let (src_w, src_h) = self.source_size();
        let (width, height, horizontal_scale, vertical_scale) = match request.size {
            Some((w, h)) => {
                let fit_w = best_fit(src_w, w).ok_or(NegotiationError::ScaleOutOfBounds {
                    axis: "width",
                    input: src_w,
                    requested: w,
                })?;
                let fit_h = best_fit(src_h, h).ok_or(NegotiationError::ScaleOutOfBounds {
                    axis: "height",
                    input: src_h,
                    requested: h,
                })?;
                (fit_w.achieved, fit_h.achieved, fit_w.scale, fit_h.scale)
            }
            None => (src_w, src_h, ScaleFactor::IDENTITY, ScaleFactor::IDENTITY),
        };

        let available = self.output_residency();
        if request.residency != available {
            return Err(NegotiationError::UnsupportedResidency {
                requested: request.residency,
                available,
            });
        }

        let max = self.source_fps();
        let fps = match request.fps {
            Some(fps) if fps <= 0.0 || fps > max => {
                return Err(NegotiationError::UnsupportedFrameRate {
                    requested: fps,
                    max,
                })
            }
            Some(fps) => fps,
            None => max,
        };

        Ok(OutputSpec {
            kind: request.kind,
            width,
            height,
            horizontal_scale,
            vertical_scale,
            fps,
            residency: available,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    struct FixedSource;

    impl CapabilitySource for FixedSource {
        fn producible_kinds(&self) -> &[DatatypeKind] {
            &[DatatypeKind::ImgFrame]
        }
        fn output_residency(&self) -> Residency {
            Residency::Device
        }
        fn source_size(&self) -> (u32, u32) {
            (1280, 800)
        }
        fn source_fps(&self) -> f32 {
            30.0
        }
    }

    #[test]
    fn test_scaled_size() {
        assert_eq!(scaled_size(1920, 2, 3), 1280);
        assert_eq!(scaled_size(1280, 1, 3), 426);
        assert_eq!(scaled_size(10, 1, 0), 0);
    }

    #[test]
    fn test_best_fit_exact_half() {
        let fit = best_fit(1280, 640).unwrap();
        assert_eq!(fit.achieved, 640);
        assert_eq!(
            fit.scale,
            ScaleFactor {
                numerator: 1,
                denominator: 2
            }
        );
    }

    #[test]
    fn test_best_fit_identity() {
        let fit = best_fit(1920, 1920).unwrap();
        assert_eq!(fit.scale, ScaleFactor::IDENTITY);
    }

    #[test]
    fn test_best_fit_prefers_small_denominator() {
        // 1080 * 1/3 = 360 and 1080 * 2/6 = 360; lowest terms wins.
        let fit = best_fit(1080, 360).unwrap();
        assert_eq!(
            fit.scale,
            ScaleFactor {
                numerator: 1,
                denominator: 3
            }
        );
    }

    #[test]
    fn test_best_fit_out_of_bounds() {
        assert!(best_fit(1280, 0).is_none());
        assert!(best_fit(1280, 1281).is_none());
        // 1280 / 63 = 20
        assert!(best_fit(1280, 19).is_none());
        assert!(best_fit(1280, 20).is_some());
    }

    #[test]
    fn test_negotiation_success() {
        let req = CapabilityRequest::new(DatatypeKind::ImgFrame)
            .with_size(640, 400)
            .with_fps(15.0);
        let spec = FixedSource.supports_capability(&req).unwrap();
        assert_eq!((spec.width, spec.height), (640, 400));
        assert_eq!(spec.fps, 15.0);
        assert_eq!(spec.residency, Residency::Device);
    }

    #[test]
    fn test_negotiation_failures() {
        let src = FixedSource;
        assert!(matches!(
            src.supports_capability(&CapabilityRequest::new(DatatypeKind::NNData)),
            Err(NegotiationError::NoCompatibleKind { .. })
        ));
        assert!(matches!(
            src.supports_capability(
                &CapabilityRequest::new(DatatypeKind::ImgFrame).with_size(4000, 400)
            ),
            Err(NegotiationError::ScaleOutOfBounds { axis: "width", .. })
        ));
        assert!(matches!(
            src.supports_capability(&CapabilityRequest::new(DatatypeKind::ImgFrame).on_host(true)),
            Err(NegotiationError::UnsupportedResidency { .. })
        ));
        assert!(matches!(
            src.supports_capability(&CapabilityRequest::new(DatatypeKind::ImgFrame).with_fps(60.0)),
            Err(NegotiationError::UnsupportedFrameRate { .. })
        ));
    }

    #[test]
    fn test_same_profile_ignores_name() {
        let a = CapabilityRequest::new(DatatypeKind::ImgFrame).with_size(640, 400);
        let b = a.clone().named("left");
        assert!(a.same_profile(&b));
        assert!(!a.same_profile(&a.clone().with_fps(5.0)));
    }

    proptest! {
        #[test]
        fn test_best_fit_is_optimal(input in 64u32..4096, frac in 0.02f64..1.0) {
            let requested = ((input as f64) * frac).max(1.0) as u32;
            if let Some(fit) = best_fit(input, requested) {
                let diff = fit.achieved.abs_diff(requested);
                prop_assert!(fit.scale.numerator <= MAX_SCALE_NUMERATOR);
                prop_assert!(fit.scale.denominator <= MAX_SCALE_DENOMINATOR);
                prop_assert!(fit.scale.numerator <= fit.scale.denominator);
                prop_assert_eq!(fit.achieved, scaled_size(input, fit.scale.numerator, fit.scale.denominator));
                for den in 1..=MAX_SCALE_DENOMINATOR {
                    for num in 1..=den.min(MAX_SCALE_NUMERATOR) {
                        prop_assert!(scaled_size(input, num, den).abs_diff(requested) >= diff);
                    }
                }
            }
        }
    }
}
