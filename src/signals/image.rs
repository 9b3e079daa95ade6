// HTTP image classifier: NSFW, object and face detection behind one endpoint.
//
// Talks to an inference server that hosts the three vision models and speaks
// a small JSON protocol. Each route takes `{"image": "<base64>"}`:
//
//   POST /nsfw    -> {"predictions": [{"className": "Porn", "probability": 0.91}, ...]}
//   POST /objects -> {"boxes": [[x1, y1, x2, y2], ...], "scores": [...], "classes": [...]}
//   POST /faces   -> {"detections": [[confidence, x1, y1, x2, y2, lx, ly, ...], ...]}
//
// Object and face outputs are the detector's raw tensors flattened to JSON;
// class ids index the COCO label table below.

use anyhow::{Context, Result};
use async_trait::async_trait;
use base64::Engine;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::rate_limiter::RateLimiter;
use super::traits::{Corners, ImageClassifier, NsfwPrediction, RawFace, RawObject};

pub struct HttpImageClassifier {
    client: Client,
    endpoint: String,
    rate_limiter: RateLimiter,
}

impl HttpImageClassifier {
    pub fn new(endpoint: &str, rate_limiter: RateLimiter) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("sift/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            rate_limiter,
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(&self, route: &str, image: &[u8]) -> Result<T> {
        self.rate_limiter.acquire().await;

        let body = ImageRequest {
            image: base64::engine::general_purpose::STANDARD.encode(image),
        };
        let url = format!("{}/{}", self.endpoint, route);

        let response = self
            .client
            .post(&url)
            .json(&body)
            .send()
            .await
            .with_context(|| format!("Failed to call image classifier /{route}"))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            anyhow::bail!("Image classifier /{} returned {}: {}", route, status, text);
        }

        response
            .json()
            .await
            .with_context(|| format!("Failed to parse image classifier /{route} response"))
    }
}

#[async_trait]
impl ImageClassifier for HttpImageClassifier {
    async fn classify_nsfw(&self, image: &[u8]) -> Result<Vec<NsfwPrediction>> {
        let response: NsfwResponse = self.post("nsfw", image).await?;
        Ok(response.predictions)
    }

    async fn detect_objects(&self, image: &[u8]) -> Result<Vec<RawObject>> {
        let response: ObjectResponse = self.post("objects", image).await?;
        objects_from_response(response)
    }

    async fn detect_faces(&self, image: &[u8]) -> Result<Vec<RawFace>> {
        let response: FaceResponse = self.post("faces", image).await?;
        faces_from_response(response)
    }
}

fn objects_from_response(response: ObjectResponse) -> Result<Vec<RawObject>> {
    let n = response.boxes.len();
    if response.scores.len() != n || response.classes.len() != n {
        anyhow::bail!(
            "Object detector returned mismatched tensors: {} boxes, {} scores, {} classes",
            n,
            response.scores.len(),
            response.classes.len()
        );
    }

    Ok(response
        .boxes
        .into_iter()
        .zip(response.scores)
        .zip(response.classes)
        .map(|((b, confidence), class_id)| RawObject {
            class: coco_class_name(class_id).to_string(),
            confidence,
            corners: Corners {
                x1: b[0],
                y1: b[1],
                x2: b[2],
                y2: b[3],
            },
        })
        .collect())
}

fn faces_from_response(response: FaceResponse) -> Result<Vec<RawFace>> {
    response
        .detections
        .into_iter()
        .map(|row| {
            if row.len() < 5 {
                anyhow::bail!("Face detection row has {} values, expected at least 5", row.len());
            }
            Ok(RawFace {
                confidence: row[0],
                corners: Corners {
                    x1: row[1],
                    y1: row[2],
                    x2: row[3],
                    y2: row[4],
                },
                landmarks: row[5..].to_vec(),
            })
        })
        .collect()
}

/// COCO label for a detector class id; "unknown" when out of range.
pub fn coco_class_name(class_id: u32) -> &'static str {
    COCO_CLASSES
        .get(class_id as usize)
        .copied()
        .unwrap_or("unknown")
}

const COCO_CLASSES: [&str; 80] = [
    "person", "bicycle", "car", "motorcycle", "airplane", "bus", "train", "truck", "boat",
    "traffic light", "fire hydrant", "stop sign", "parking meter", "bench", "bird", "cat", "dog",
    "horse", "sheep", "cow", "elephant", "bear", "zebra", "giraffe", "backpack", "umbrella",
    "handbag", "tie", "suitcase", "frisbee", "skis", "snowboard", "sports ball", "kite",
    "baseball bat", "baseball glove", "skateboard", "surfboard", "tennis racket", "bottle",
    "wine glass", "cup", "fork", "knife", "spoon", "bowl", "banana", "apple", "sandwich",
    "orange", "broccoli", "carrot", "hot dog", "pizza", "donut", "cake", "chair", "couch",
    "potted plant", "bed", "dining table", "toilet", "tv", "laptop", "mouse", "remote",
    "keyboard", "cell phone", "microwave", "oven", "toaster", "sink", "refrigerator", "book",
    "clock", "vase", "scissors", "teddy bear", "hair drier", "toothbrush",
];

#[derive(Serialize)]
struct ImageRequest {
    image: String,
}

#[derive(Deserialize)]
struct NsfwResponse {
    predictions: Vec<NsfwPrediction>,
}

#[derive(Deserialize)]
struct ObjectResponse {
    boxes: Vec<[f64; 4]>,
    scores: Vec<f64>,
    classes: Vec<u32>,
}

#[derive(Deserialize)]
struct FaceResponse {
    detections: Vec<Vec<f64>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_coco_lookup() {
        assert_eq!(coco_class_name(0), "person");
        assert_eq!(coco_class_name(16), "dog");
        assert_eq!(coco_class_name(79), "toothbrush");
        assert_eq!(coco_class_name(80), "unknown");
    }

    #[test]
    fn test_objects_from_response() {
        let json = r#"{"boxes": [[0.1, 0.2, 0.5, 0.6]], "scores": [0.88], "classes": [2]}"#;
        let resp: ObjectResponse = serde_json::from_str(json).unwrap();
        let objects = objects_from_response(resp).unwrap();
        assert_eq!(objects.len(), 1);
        assert_eq!(objects[0].class, "car");
        assert!((objects[0].corners.x2 - 0.5).abs() < 1e-10);
    }

    #[test]
    fn test_objects_mismatched_lengths_rejected() {
        let json = r#"{"boxes": [[0, 0, 1, 1]], "scores": [], "classes": [1]}"#;
        let resp: ObjectResponse = serde_json::from_str(json).unwrap();
        assert!(objects_from_response(resp).is_err());
    }

    #[test]
    fn test_faces_split_landmarks() {
        let json = r#"{"detections": [[0.95, 10, 20, 50, 80, 15, 30, 40, 30]]}"#;
        let resp: FaceResponse = serde_json::from_str(json).unwrap();
        let faces = faces_from_response(resp).unwrap();
        assert_eq!(faces.len(), 1);
        assert_eq!(faces[0].landmarks, vec![15.0, 30.0, 40.0, 30.0]);
        assert_eq!(faces[0].corners.y2, 80.0);
    }

    #[test]
    fn test_short_face_row_rejected() {
        let resp = FaceResponse {
            detections: vec![vec![0.9, 1.0]],
        };
        assert!(faces_from_response(resp).is_err());
    }

    #[test]
    fn test_nsfw_response_parses_camel_case() {
        let json = r#"{"predictions": [{"className": "Porn", "probability": 0.7}]}"#;
        let resp: NsfwResponse = serde_json::from_str(json).unwrap();
        assert_eq!(resp.predictions[0].class_name, "Porn");
    }
}
