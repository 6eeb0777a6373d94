//! The tessellator seam and the default mesh tessellator.
//!
//! A [`Tessellator`] turns normalized [`Geometry`] into the bytes served to
//! viewers. It runs on the blocking pool, once per cache entry, so it may be
//! arbitrarily slow. [`MeshTessellator`] writes the pre-triangulated faces,
//! polyline edges and vertices of a shape straight into a GLB.

use bytes::Bytes;
use yacv_types::{BuildOptions, Geometry, Placement, Shape};

use crate::glb::{GlbBuilder, GlbError, Material, PrimitiveMode};

/// Length of the axes drawn for a placement, in model units.
const AXIS_LENGTH: f64 = 1.0;

/// Errors returned by a [`Tessellator`].
#[derive(Debug, thiserror::Error)]
pub enum TessellateError {
    /// Writing the container failed.
    #[error(transparent)]
    Glb(#[from] GlbError),

    /// The geometry cannot be meshed.
    #[error("invalid geometry: {0}")]
    Invalid(String),
}

/// Converts geometry into a renderable artifact.
pub trait Tessellator: Send + Sync + 'static {
    /// Build the artifact for `geometry`.
    fn tessellate(
        &self,
        geometry: &Geometry,
        options: &BuildOptions,
    ) -> Result<Bytes, TessellateError>;
}

impl<F> Tessellator for F
where
    F: Fn(&Geometry, &BuildOptions) -> Result<Bytes, TessellateError> + Send + Sync + 'static,
{
    fn tessellate(
        &self,
        geometry: &Geometry,
        options: &BuildOptions,
    ) -> Result<Bytes, TessellateError> {
        self(geometry, options)
    }
}

/// Default tessellator producing one GLB per object.
///
/// Faces become `TRIANGLES` primitives, edges `LINE_STRIP` and vertices
/// `POINTS`, filtered by the `faces`, `edges` and `vertices` options.
/// Placements are drawn as red, green and blue axis lines.
#[derive(Debug, Clone, Copy, Default)]
pub struct MeshTessellator;

impl Tessellator for MeshTessellator {
    fn tessellate(
        &self,
        geometry: &Geometry,
        options: &BuildOptions,
    ) -> Result<Bytes, TessellateError> {
        let mut builder = GlbBuilder::new();
        match geometry {
            Geometry::Shape(shape) => add_shape(&mut builder, shape, options)?,
            Geometry::Location(placement) => add_axes(&mut builder, placement)?,
        }
        Ok(builder.finish()?)
    }
}

fn add_shape(
    builder: &mut GlbBuilder,
    shape: &Shape,
    options: &BuildOptions,
) -> Result<(), TessellateError> {
    if options.faces {
        for face in &shape.faces {
            let indices: Vec<u32> = face.triangles.iter().flatten().copied().collect();
            builder.add_primitive(
                PrimitiveMode::Triangles,
                &face.positions,
                &indices,
                &face.uvs,
                Material::FACE,
            )?;
        }
    }
    if options.edges {
        for edge in shape.edges.iter().filter(|edge| edge.points.len() > 1) {
            let count = u32::try_from(edge.points.len())
                .map_err(|_overflow| TessellateError::Invalid("edge has too many points".into()))?;
            let indices: Vec<u32> = (0..count).collect();
            builder.add_primitive(
                PrimitiveMode::LineStrip,
                &edge.points,
                &indices,
                &[],
                Material::EDGE,
            )?;
        }
    }
    if options.vertices {
        for vertex in &shape.vertices {
            builder.add_primitive(
                PrimitiveMode::Points,
                std::slice::from_ref(vertex),
                &[0],
                &[],
                Material::VERTEX,
            )?;
        }
    }
    Ok(())
}

/// Rotate `v` by Euler angles in degrees, applied about X, then Y, then Z.
fn rotate(orientation: [f64; 3], v: [f64; 3]) -> [f64; 3] {
    let [rx, ry, rz] = orientation.map(f64::to_radians);
    let [x, y, z] = v;
    let (y, z) = (y * rx.cos() - z * rx.sin(), y * rx.sin() + z * rx.cos());
    let (x, z) = (x * ry.cos() + z * ry.sin(), -x * ry.sin() + z * ry.cos());
    let (x, y) = (x * rz.cos() - y * rz.sin(), x * rz.sin() + y * rz.cos());
    [x, y, z]
}

#[allow(clippy::cast_possible_truncation)]
fn to_point(v: [f64; 3]) -> [f32; 3] {
    v.map(|c| c as f32)
}

fn add_axes(builder: &mut GlbBuilder, placement: &Placement) -> Result<(), TessellateError> {
    let axes = [
        ([AXIS_LENGTH, 0.0, 0.0], [1.0, 0.0, 0.0, 1.0]),
        ([0.0, AXIS_LENGTH, 0.0], [0.0, 1.0, 0.0, 1.0]),
        ([0.0, 0.0, AXIS_LENGTH], [0.0, 0.0, 1.0, 1.0]),
    ];
    let origin = placement.position;
    for (direction, base_color) in axes {
        let [dx, dy, dz] = rotate(placement.orientation, direction);
        let [ox, oy, oz] = origin;
        let tip = [ox + dx, oy + dy, oz + dz];
        builder.add_primitive(
            PrimitiveMode::LineStrip,
            &[to_point(origin), to_point(tip)],
            &[0, 1],
            &[],
            Material {
                base_color,
                ..Material::EDGE
            },
        )?;
    }
    Ok(())
}
