//! Face geometry metrics from a single detector pass.

use crate::types::{DetectedFace, FaceMetrics, LandmarkKind};

/// Smallest bounding dimension used in ratios, so a degenerate box never divides by zero.
const MIN_BOUNDING_DIMENSION: f32 = 1.0;

/// Derive metrics from one frame's detector output.
///
/// Only the first face in detector order is measured; additional faces are
/// ignored rather than aggregated. An empty detection yields `None`, which is
/// a valid observation and not an error.
pub fn extract_metrics(faces: &[DetectedFace]) -> Option<FaceMetrics> {
    let face = faces.first()?;

    let width = face.bounds.width.max(MIN_BOUNDING_DIMENSION);
    let height = face.bounds.height.max(MIN_BOUNDING_DIMENSION);

    let eye_distance_ratio = match (
        face.landmark(LandmarkKind::LeftEye),
        face.landmark(LandmarkKind::RightEye),
    ) {
        (Some(left), Some(right)) => Some(left.distance(&right) / width),
        _ => None,
    };

    Some(FaceMetrics {
        bounding_width: width,
        bounding_height: height,
        width_height_ratio: width / height,
        eye_distance_ratio,
        smiling_probability: face.smiling_probability,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FaceBounds, Landmark, Point};

    fn face(width: f32, height: f32) -> DetectedFace {
        DetectedFace {
            bounds: FaceBounds { x: 10.0, y: 20.0, width, height },
            confidence: 0.9,
            landmarks: Vec::new(),
            smiling_probability: None,
        }
    }

    fn eyes(left: (f32, f32), right: (f32, f32)) -> Vec<Landmark> {
        vec![
            Landmark { kind: LandmarkKind::LeftEye, position: Point::new(left.0, left.1) },
            Landmark { kind: LandmarkKind::RightEye, position: Point::new(right.0, right.1) },
        ]
    }

    #[test]
    fn test_no_faces_is_absent() {
        assert!(extract_metrics(&[]).is_none());
    }

    #[test]
    fn test_width_height_ratio() {
        let m = extract_metrics(&[face(120.0, 100.0)]).unwrap();
        assert!((m.width_height_ratio - 1.2).abs() < 1e-6);
        assert_eq!(m.bounding_width, 120.0);
        assert_eq!(m.bounding_height, 100.0);
    }

    #[test]
    fn test_eye_distance_ratio() {
        let mut f = face(100.0, 100.0);
        f.landmarks = eyes((10.0, 50.0), (30.0, 50.0));
        let m = extract_metrics(&[f]).unwrap();
        assert!((m.eye_distance_ratio.unwrap() - 0.2).abs() < 1e-6);
    }

    #[test]
    fn test_eye_distance_diagonal() {
        let mut f = face(50.0, 80.0);
        f.landmarks = eyes((0.0, 0.0), (30.0, 40.0));
        let m = extract_metrics(&[f]).unwrap();
        assert!((m.eye_distance_ratio.unwrap() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_missing_eye_yields_no_ratio() {
        let mut f = face(100.0, 100.0);
        f.landmarks = vec![Landmark {
            kind: LandmarkKind::LeftEye,
            position: Point::new(10.0, 50.0),
        }];
        let m = extract_metrics(&[f]).unwrap();
        assert!(m.eye_distance_ratio.is_none());
    }

    #[test]
    fn test_degenerate_box_is_clamped() {
        let m = extract_metrics(&[face(0.0, 0.25)]).unwrap();
        assert_eq!(m.bounding_width, 1.0);
        assert_eq!(m.bounding_height, 1.0);
        assert_eq!(m.width_height_ratio, 1.0);
    }

    #[test]
    fn test_only_first_face_is_used() {
        let first = face(60.0, 30.0);
        let second = face(10.0, 100.0);
        let m = extract_metrics(&[first, second]).unwrap();
        assert!((m.width_height_ratio - 2.0).abs() < 1e-6);
    }

    #[test]
    fn test_smiling_probability_passthrough() {
        let mut f = face(100.0, 100.0);
        f.smiling_probability = Some(0.73);
        let m = extract_metrics(&[f]).unwrap();
        assert_eq!(m.smiling_probability, Some(0.73));
    }
}
