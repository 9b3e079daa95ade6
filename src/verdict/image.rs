// Image verdict aggregation.
//
// NSFW class probabilities fold into four categories, taking the max when
// several classes map to one category. Object and face detections under the
// confidence floor are dropped (a detection exactly at the floor is kept),
// and corner boxes become (x, y, width, height).

use crate::analysis::image_meta::{Dimensions, ImageFormat};
use crate::signals::traits::{Corners, NsfwPrediction, RawFace, RawObject};

use super::types::{
    BoundingBox, Classification, DetectedObject, FaceDetection, Faces, ImageAnalysisResult,
    ImageMetadata, Nsfw, NsfwCategories, Point, Signal,
};

pub const DEFAULT_DETECTION_FLOOR: f64 = 0.5;

/// Everything the image aggregator consumes. `None` marks a failed remote signal.
#[derive(Debug, Clone)]
pub struct ImageSignals {
    pub nsfw: Option<Vec<NsfwPrediction>>,
    pub objects: Option<Vec<RawObject>>,
    pub faces: Option<Vec<RawFace>>,
    pub format: ImageFormat,
    /// `None` when the header couldn't be parsed
    pub dimensions: Option<Dimensions>,
    pub size: u64,
}

/// Combine image signals into a verdict.
pub fn aggregate_image(signals: ImageSignals, detection_floor: f64) -> ImageAnalysisResult {
    let mut missing = Vec::new();

    let nsfw = match signals.nsfw {
        Some(predictions) => nsfw_from_predictions(&predictions),
        None => {
            missing.push(Signal::Nsfw);
            nsfw_from_predictions(&[])
        }
    };

    let objects = match signals.objects {
        Some(raw) => raw
            .into_iter()
            .filter(|o| o.confidence >= detection_floor)
            .map(|o| DetectedObject {
                class: o.class,
                confidence: o.confidence,
                bbox: normalize_box(&o.corners),
            })
            .collect(),
        None => {
            missing.push(Signal::Objects);
            Vec::new()
        }
    };

    let detections: Vec<FaceDetection> = match signals.faces {
        Some(raw) => raw
            .into_iter()
            .filter(|f| f.confidence >= detection_floor)
            .map(|f| FaceDetection {
                confidence: f.confidence,
                bbox: normalize_box(&f.corners),
                landmarks: landmark_points(&f.landmarks),
            })
            .collect(),
        None => {
            missing.push(Signal::Faces);
            Vec::new()
        }
    };

    ImageAnalysisResult {
        nsfw,
        objects,
        faces: Faces {
            count: detections.len(),
            detections,
        },
        metadata: ImageMetadata {
            dimensions: signals.dimensions.unwrap_or_default(),
            format: signals.format.as_str().to_string(),
            size: signals.size,
        },
        missing_signals: missing,
    }
}

/// Fold raw class probabilities into the four NSFW categories.
pub fn nsfw_from_predictions(predictions: &[NsfwPrediction]) -> Nsfw {
    let mut categories = NsfwCategories::default();

    for pred in predictions {
        let slot = match pred.class_name.to_lowercase().as_str() {
            "porn" | "hentai" => &mut categories.adult,
            "sexy" => &mut categories.suggestive,
            "violence" | "gore" => &mut categories.violence,
            "hate" => &mut categories.hate,
            _ => continue,
        };
        *slot = slot.max(pred.probability);
    }

    let score = [
        categories.adult,
        categories.suggestive,
        categories.violence,
        categories.hate,
    ]
    .into_iter()
    .fold(0.0, f64::max);

    Nsfw {
        score,
        categories,
        predictions: predictions
            .iter()
            .map(|p| Classification {
                category: p.class_name.clone(),
                confidence: p.probability,
            })
            .collect(),
    }
}

pub fn normalize_box(c: &Corners) -> BoundingBox {
    BoundingBox {
        x: c.x1,
        y: c.y1,
        width: c.x2 - c.x1,
        height: c.y2 - c.y1,
    }
}

/// Pair a flat x,y,x,y list into points; a trailing odd value is dropped.
pub fn landmark_points(flat: &[f64]) -> Vec<Point> {
    flat.chunks_exact(2)
        .map(|xy| Point { x: xy[0], y: xy[1] })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pred(class: &str, p: f64) -> NsfwPrediction {
        NsfwPrediction {
            class_name: class.to_string(),
            probability: p,
        }
    }

    fn corners(x1: f64, y1: f64, x2: f64, y2: f64) -> Corners {
        Corners { x1, y1, x2, y2 }
    }

    #[test]
    fn test_adult_labels_collapse_via_max() {
        let nsfw = nsfw_from_predictions(&[
            pred("Porn", 0.3),
            pred("Hentai", 0.6),
            pred("Neutral", 0.1),
        ]);
        assert_eq!(nsfw.categories.adult, 0.6);
        assert_eq!(nsfw.score, 0.6);
        assert_eq!(nsfw.predictions.len(), 3);
        assert_eq!(nsfw.predictions[0].category, "Porn");
    }

    #[test]
    fn test_score_is_max_category() {
        let nsfw = nsfw_from_predictions(&[pred("Sexy", 0.4), pred("Gore", 0.7)]);
        assert_eq!(nsfw.categories.suggestive, 0.4);
        assert_eq!(nsfw.categories.violence, 0.7);
        assert_eq!(nsfw.score, 0.7);
    }

    #[test]
    fn test_floor_keeps_exact_value() {
        let signals = ImageSignals {
            nsfw: Some(vec![]),
            objects: Some(vec![
                RawObject {
                    class: "dog".into(),
                    confidence: 0.5,
                    corners: corners(10.0, 20.0, 50.0, 80.0),
                },
                RawObject {
                    class: "cat".into(),
                    confidence: 0.4999,
                    corners: corners(0.0, 0.0, 1.0, 1.0),
                },
            ]),
            faces: Some(vec![RawFace {
                confidence: 0.3,
                corners: corners(0.0, 0.0, 1.0, 1.0),
                landmarks: vec![],
            }]),
            format: ImageFormat::Png,
            dimensions: Some(Dimensions {
                width: 100,
                height: 100,
            }),
            size: 2048,
        };
        let result = aggregate_image(signals, DEFAULT_DETECTION_FLOOR);
        assert_eq!(result.objects.len(), 1);
        assert_eq!(result.objects[0].class, "dog");
        assert_eq!(
            result.objects[0].bbox,
            BoundingBox {
                x: 10.0,
                y: 20.0,
                width: 40.0,
                height: 60.0
            }
        );
        assert_eq!(result.faces.count, 0);
        assert_eq!(result.metadata.format, "png");
        assert!(result.missing_signals.is_empty());
    }

    #[test]
    fn test_landmark_pairs() {
        let points = landmark_points(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(
            points,
            vec![Point { x: 1.0, y: 2.0 }, Point { x: 3.0, y: 4.0 }]
        );
    }

    #[test]
    fn test_missing_image_signals() {
        let signals = ImageSignals {
            nsfw: None,
            objects: None,
            faces: None,
            format: ImageFormat::Jpeg,
            dimensions: None,
            size: 10,
        };
        let result = aggregate_image(signals, DEFAULT_DETECTION_FLOOR);
        assert_eq!(
            result.missing_signals,
            vec![Signal::Nsfw, Signal::Objects, Signal::Faces]
        );
        assert_eq!(result.nsfw.score, 0.0);
        assert_eq!(result.metadata.dimensions, Dimensions::default());
    }
}
