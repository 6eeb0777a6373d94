//! Content hashing of show payloads.
//!
//! The hash identifies what a viewer would see: the normalized payload plus
//! the options that change the built artifact. It lets viewers skip
//! refetching unchanged objects and lets the build cache keep an entry when
//! the same content is shown again.

use sha2::{Digest, Sha256};
use yacv_types::{BuildOptions, Geometry, ShowPayload};

/// Compute the SHA-256 content hash of a payload and its build options.
///
/// Returns the hash as a lowercase hex string. `auto_clear` is not part of
/// the hash because it does not affect the artifact.
pub fn content_hash(payload: &ShowPayload, options: &BuildOptions) -> String {
    let mut hasher = Sha256::new();
    match payload {
        ShowPayload::Glb(bytes) => {
            hasher.update(b"glb");
            feed_len(&mut hasher, bytes.len());
            hasher.update(bytes);
        }
        ShowPayload::Geometry(geometry) => {
            hasher.update(b"geometry");
            feed_geometry(&mut hasher, geometry);
        }
    }
    feed_options(&mut hasher, options);
    format!("{:x}", hasher.finalize())
}

fn feed_len(hasher: &mut Sha256, len: usize) {
    hasher.update((len as u64).to_le_bytes());
}

fn feed_points(hasher: &mut Sha256, points: &[[f32; 3]]) {
    feed_len(hasher, points.len());
    for point in points {
        for coordinate in point {
            hasher.update(coordinate.to_le_bytes());
        }
    }
}

fn feed_geometry(hasher: &mut Sha256, geometry: &Geometry) {
    match geometry {
        Geometry::Shape(shape) => {
            hasher.update(b"shape");
            feed_len(hasher, shape.faces.len());
            for face in &shape.faces {
                feed_points(hasher, &face.positions);
                feed_len(hasher, face.triangles.len());
                for triangle in &face.triangles {
                    for index in triangle {
                        hasher.update(index.to_le_bytes());
                    }
                }
                feed_len(hasher, face.uvs.len());
                for uv in &face.uvs {
                    for coordinate in uv {
                        hasher.update(coordinate.to_le_bytes());
                    }
                }
            }
            feed_len(hasher, shape.edges.len());
            for edge in &shape.edges {
                feed_points(hasher, &edge.points);
            }
            feed_points(hasher, &shape.vertices);
        }
        Geometry::Location(placement) => {
            hasher.update(b"location");
            for value in placement.position.iter().chain(&placement.orientation) {
                hasher.update(value.to_le_bytes());
            }
        }
    }
}

fn feed_options(hasher: &mut Sha256, options: &BuildOptions) {
    hasher.update(options.tolerance.to_le_bytes());
    hasher.update(options.angular_tolerance.to_le_bytes());
    hasher.update([
        u8::from(options.faces),
        u8::from(options.edges),
        u8::from(options.vertices),
    ]);
    // Sorted keys; each entry length-prefixed so boundaries cannot shift.
    feed_len(hasher, options.extra.len());
    for (key, value) in &options.extra {
        feed_str(hasher, key);
        feed_str(hasher, &value.to_string());
    }
}

fn feed_str(hasher: &mut Sha256, text: &str) {
    feed_len(hasher, text.len());
    hasher.update(text.as_bytes());
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use bytes::Bytes;
    use yacv_types::{Placement, Shape};

    use super::*;

    fn cube_corner() -> ShowPayload {
        ShowPayload::Geometry(Arc::new(Geometry::Shape(Shape {
            vertices: vec![[0.0, 0.0, 0.0], [1.0, 1.0, 1.0]],
            ..Shape::default()
        })))
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let options = BuildOptions::default();
        let first = content_hash(&cube_corner(), &options);
        let second = content_hash(&cube_corner(), &options);
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn build_options_change_the_hash() {
        let base = content_hash(&cube_corner(), &BuildOptions::default());
        let coarser = content_hash(
            &cube_corner(),
            &BuildOptions::default().with_tolerance(0.5),
        );
        let extra = content_hash(
            &cube_corner(),
            &BuildOptions::default().with_extra("color", serde_json::json!("red")),
        );
        assert_ne!(base, coarser);
        assert_ne!(base, extra);
    }

    #[test]
    fn every_extra_entry_is_hashed() {
        let hash = |pairs: &[(&str, serde_json::Value)]| {
            let options = pairs
                .iter()
                .fold(BuildOptions::default(), |options, (key, value)| {
                    options.with_extra(*key, value.clone())
                });
            content_hash(&cube_corner(), &options)
        };
        let nested = serde_json::json!({ "rgb": [1, 0, 0], "alpha": null });

        let forward = hash(&[("color", nested.clone()), ("layer", serde_json::json!(2))]);
        let reverse = hash(&[("layer", serde_json::json!(2)), ("color", nested.clone())]);
        assert_eq!(forward, reverse);

        let fewer = hash(&[("color", nested)]);
        assert_ne!(forward, fewer);
        assert_ne!(
            hash(&[("ab", serde_json::json!("c"))]),
            hash(&[("a", serde_json::json!("bc"))])
        );
    }

    #[test]
    fn auto_clear_does_not_change_the_hash() {
        let with = content_hash(&cube_corner(), &BuildOptions::default());
        let without = content_hash(
            &cube_corner(),
            &BuildOptions::default().with_auto_clear(false),
        );
        assert_eq!(with, without);
    }

    #[test]
    fn payload_kinds_do_not_collide() {
        let options = BuildOptions::default();
        let glb = content_hash(&ShowPayload::Glb(Bytes::new()), &options);
        let location = content_hash(
            &ShowPayload::Geometry(Arc::new(Geometry::Location(Placement::default()))),
            &options,
        );
        assert_ne!(glb, location);
    }
}
