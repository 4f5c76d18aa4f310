//! Persistable text form of keypoints and descriptors.
//!
//! Both blobs are versioned JSON envelopes. Floats use shortest round-trip
//! formatting, so decoding returns bit-identical values. Bare arrays written
//! before the envelope existed are still accepted on decode.

use serde::{Deserialize, Serialize};
use snout_core::{DescriptorSet, DescriptorSetError, Keypoint};

pub const CODEC_VERSION: u32 = 1;

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("Malformed blob: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Unsupported blob version {0} (expected {CODEC_VERSION})")]
    UnsupportedVersion(u32),
    #[error("Descriptor rows: {0}")]
    Shape(#[from] DescriptorSetError),
    #[error("{keypoints} keypoints but {descriptors} descriptors")]
    CountMismatch { keypoints: usize, descriptors: usize },
    #[error("Non-finite {field} at index {index} cannot be persisted")]
    NonFinite { field: &'static str, index: usize },
}

pub type CodecResult<T> = Result<T, CodecError>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
struct KeypointRecord {
    pt: [f32; 2],
    #[serde(rename = "Size")]
    size: f32,
    #[serde(rename = "Angle")]
    angle: f32,
    #[serde(rename = "Response")]
    response: f32,
    #[serde(rename = "Octave")]
    octave: i32,
    #[serde(rename = "ClassId")]
    class_id: i32,
}

impl From<&Keypoint> for KeypointRecord {
    fn from(kp: &Keypoint) -> Self {
        Self {
            pt: [kp.x, kp.y],
            size: kp.size,
            angle: kp.angle,
            response: kp.response,
            octave: kp.octave,
            class_id: kp.class_id,
        }
    }
}

impl From<KeypointRecord> for Keypoint {
    fn from(r: KeypointRecord) -> Self {
        Keypoint {
            x: r.pt[0],
            y: r.pt[1],
            size: r.size,
            angle: r.angle,
            response: r.response,
            octave: r.octave,
            class_id: r.class_id,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct KeypointsEnvelope {
    version: u32,
    keypoints: Vec<KeypointRecord>,
}

#[derive(Serialize, Deserialize)]
struct DescriptorsEnvelope {
    version: u32,
    cols: usize,
    rows: Vec<Vec<f32>>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum KeypointsBlob {
    Versioned(KeypointsEnvelope),
    Legacy(Vec<KeypointRecord>),
}

#[derive(Deserialize)]
#[serde(untagged)]
enum DescriptorsBlob {
    Versioned(DescriptorsEnvelope),
    Legacy(Vec<Vec<f32>>),
}

fn check_version(version: u32) -> CodecResult<()> {
    if version != CODEC_VERSION {
        return Err(CodecError::UnsupportedVersion(version));
    }
    Ok(())
}

/// JSON has no NaN or infinity, so such values would not decode back
fn check_finite(field: &'static str, index: usize, values: &[f32]) -> CodecResult<()> {
    if values.iter().all(|v| v.is_finite()) {
        Ok(())
    } else {
        Err(CodecError::NonFinite { field, index })
    }
}

pub fn encode_keypoints(keypoints: &[Keypoint]) -> CodecResult<String> {
    for (i, kp) in keypoints.iter().enumerate() {
        check_finite("keypoint", i, &[kp.x, kp.y, kp.size, kp.angle, kp.response])?;
    }
    let envelope = KeypointsEnvelope {
        version: CODEC_VERSION,
        keypoints: keypoints.iter().map(KeypointRecord::from).collect(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

pub fn encode_descriptors(descriptors: &DescriptorSet) -> CodecResult<String> {
    for (i, row) in descriptors.iter().enumerate() {
        check_finite("descriptor", i, row)?;
    }
    let envelope = DescriptorsEnvelope {
        version: CODEC_VERSION,
        cols: descriptors.cols(),
        rows: descriptors.rows().to_vec(),
    };
    Ok(serde_json::to_string(&envelope)?)
}

/// Encode a keypoint/descriptor pair as `(keypoints_text, descriptors_text)`
pub fn encode(keypoints: &[Keypoint], descriptors: &DescriptorSet) -> CodecResult<(String, String)> {
    Ok((encode_keypoints(keypoints)?, encode_descriptors(descriptors)?))
}

pub fn decode_keypoints(text: &str) -> CodecResult<Vec<Keypoint>> {
    let records = match serde_json::from_str::<KeypointsBlob>(text)? {
        KeypointsBlob::Versioned(env) => {
            check_version(env.version)?;
            env.keypoints
        }
        KeypointsBlob::Legacy(records) => records,
    };
    Ok(records.into_iter().map(Keypoint::from).collect())
}

pub fn decode_descriptors(text: &str) -> CodecResult<DescriptorSet> {
    let set = match serde_json::from_str::<DescriptorsBlob>(text)? {
        DescriptorsBlob::Versioned(env) => {
            check_version(env.version)?;
            DescriptorSet::with_cols(env.cols, env.rows)?
        }
        DescriptorsBlob::Legacy(rows) => DescriptorSet::from_rows(rows)?,
    };
    Ok(set)
}

/// Inverse of [`encode`]; the two blobs must describe the same number of features
pub fn decode(keypoints_text: &str, descriptors_text: &str) -> CodecResult<(Vec<Keypoint>, DescriptorSet)> {
    let keypoints = decode_keypoints(keypoints_text)?;
    let descriptors = decode_descriptors(descriptors_text)?;
    if keypoints.len() != descriptors.len() {
        return Err(CodecError::CountMismatch {
            keypoints: keypoints.len(),
            descriptors: descriptors.len(),
        });
    }
    Ok((keypoints, descriptors))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn sample_keypoint() -> Keypoint {
        Keypoint {
            x: 12.345678,
            y: 0.1,
            size: 3.3333333,
            angle: 271.5,
            response: 0.012345679,
            octave: 0x00ff_0201,
            class_id: -1,
        }
    }

    #[test]
    fn test_empty_round_trip_is_explicit() {
        let empty = DescriptorSet::with_cols(128, Vec::new()).unwrap();
        let (kt, dt) = encode(&[], &empty).unwrap();
        assert_eq!(kt, r#"{"version":1,"keypoints":[]}"#);
        assert_eq!(dt, r#"{"version":1,"cols":128,"rows":[]}"#);

        let (kps, desc) = decode(&kt, &dt).unwrap();
        assert!(kps.is_empty());
        assert_eq!(desc, empty);
    }

    #[test]
    fn test_keypoint_field_names() {
        let text = encode_keypoints(&[Keypoint::new(1.5, 2.0, 4.0)]).unwrap();
        assert_eq!(
            text,
            r#"{"version":1,"keypoints":[{"pt":[1.5,2.0],"Size":4.0,"Angle":-1.0,"Response":0.0,"Octave":0,"ClassId":-1}]}"#
        );
    }

    #[test]
    fn test_round_trip_is_exact() {
        let kps = vec![sample_keypoint(), Keypoint::new(f32::MIN_POSITIVE, 1e30, 0.5)];
        let desc = DescriptorSet::from_rows(vec![vec![0.1, 1.0 / 3.0, 255.0], vec![-0.0, 1e-40, 7.0]]).unwrap();
        let (kt, dt) = encode(&kps, &desc).unwrap();
        let (kps2, desc2) = decode(&kt, &dt).unwrap();
        assert_eq!(kps2, kps);
        for (a, b) in desc.iter().zip(desc2.iter()) {
            let bits_a: Vec<u32> = a.iter().map(|v| v.to_bits()).collect();
            let bits_b: Vec<u32> = b.iter().map(|v| v.to_bits()).collect();
            assert_eq!(bits_a, bits_b);
        }
    }

    #[test]
    fn test_legacy_bare_arrays_decode() {
        let kt = r#"[{"pt":[10.0,20.5],"Size":6.2,"Angle":90.0,"Response":0.03,"Octave":513,"ClassId":-1}]"#;
        let dt = "[[0.0,1.0,2.0,3.0]]";
        let (kps, desc) = decode(kt, dt).unwrap();
        assert_eq!(kps[0].x, 10.0);
        assert_eq!(kps[0].y, 20.5);
        assert_eq!(kps[0].octave, 513);
        assert_eq!(desc.cols(), 4);
        assert_eq!(desc.get(0), Some(&[0.0, 1.0, 2.0, 3.0][..]));

        assert!(decode_descriptors("[]").unwrap().is_empty());
        assert!(decode_keypoints("[]").unwrap().is_empty());
    }

    #[test]
    fn test_unsupported_version() {
        let err = decode_descriptors(r#"{"version":7,"cols":2,"rows":[]}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(7)));
        let err = decode_keypoints(r#"{"version":2,"keypoints":[]}"#).unwrap_err();
        assert!(matches!(err, CodecError::UnsupportedVersion(2)));
    }

    #[test]
    fn test_malformed_blobs() {
        assert!(matches!(decode_descriptors("not json"), Err(CodecError::Json(_))));
        assert!(matches!(
            decode_descriptors(r#"{"version":1,"cols":3,"rows":[[1.0,2.0]]}"#),
            Err(CodecError::Shape(_))
        ));
        assert!(matches!(decode_descriptors("[[1.0],[1.0,2.0]]"), Err(CodecError::Shape(_))));
    }

    #[test]
    fn test_count_mismatch() {
        let kt = encode_keypoints(&[sample_keypoint()]).unwrap();
        let dt = encode_descriptors(&DescriptorSet::with_cols(2, Vec::new()).unwrap()).unwrap();
        assert!(matches!(
            decode(&kt, &dt),
            Err(CodecError::CountMismatch {
                keypoints: 1,
                descriptors: 0
            })
        ));
    }

    #[test]
    fn test_non_finite_values_are_rejected() {
        let mut kp = sample_keypoint();
        kp.response = f32::NAN;
        let err = encode_keypoints(&[sample_keypoint(), kp]).unwrap_err();
        assert!(matches!(
            err,
            CodecError::NonFinite {
                field: "keypoint",
                index: 1
            }
        ));

        let desc = DescriptorSet::from_rows(vec![vec![f32::INFINITY, 1.0]]).unwrap();
        let err = encode_descriptors(&desc).unwrap_err();
        assert!(matches!(
            err,
            CodecError::NonFinite {
                field: "descriptor",
                index: 0
            }
        ));
    }

    fn finite_f32() -> impl Strategy<Value = f32> {
        prop::num::f32::NORMAL | prop::num::f32::SUBNORMAL | prop::num::f32::ZERO
    }

    fn keypoint() -> impl Strategy<Value = Keypoint> {
        (finite_f32(), finite_f32(), finite_f32(), finite_f32(), finite_f32(), any::<i32>(), any::<i32>()).prop_map(
            |(x, y, size, angle, response, octave, class_id)| Keypoint {
                x,
                y,
                size,
                angle,
                response,
                octave,
                class_id,
            },
        )
    }

    proptest! {
        #[test]
        fn prop_decode_inverts_encode(
            (kps, rows, cols) in (0usize..6).prop_flat_map(|cols| {
                (0usize..12).prop_flat_map(move |n| (
                    prop::collection::vec(keypoint(), n),
                    prop::collection::vec(prop::collection::vec(finite_f32(), cols), n),
                    Just(cols),
                ))
            })
        ) {
            let desc = DescriptorSet::with_cols(cols, rows).unwrap();
            let (kt, dt) = encode(&kps, &desc).unwrap();
            let (kps2, desc2) = decode(&kt, &dt).unwrap();
            prop_assert_eq!(kps2, kps);
            prop_assert_eq!(desc2.cols(), desc.cols());
            prop_assert_eq!(desc2, desc);
        }
    }
}
