//! Canonical geometric representation of shown objects.
//!
//! Producer objects of any type are normalized into a [`Geometry`] by the
//! shape adapters in `yacv-core`. The representation is deliberately plain
//! data: already-triangulated faces, polyline edges and loose vertices, or a
//! [`Placement`] that viewers draw as a set of axes.
//!
//! Producers model in the CAD convention (Z up). Viewers expect the glTF
//! convention (Y up); [`Geometry::into_y_up`] performs the conversion.

use serde::{Deserialize, Serialize};

/// A point or direction in 3D space.
pub type Point3 = [f32; 3];

/// A normalized, renderable object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Geometry {
    /// A boundary representation made of faces, edges and vertices.
    Shape(Shape),
    /// A coordinate frame, drawn as three axes.
    Location(Placement),
}

/// Faces, edges and vertices of a solid, surface or wire.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Shape {
    /// Triangulated faces.
    #[serde(default)]
    pub faces: Vec<Face>,
    /// Edges as polylines.
    #[serde(default)]
    pub edges: Vec<Edge>,
    /// Loose vertices.
    #[serde(default)]
    pub vertices: Vec<Point3>,
}

/// A single triangulated face.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Face {
    /// Vertex positions.
    pub positions: Vec<Point3>,
    /// Triangles as indices into `positions`.
    pub triangles: Vec<[u32; 3]>,
    /// Optional texture coordinates, one per position.
    #[serde(default)]
    pub uvs: Vec<[f32; 2]>,
}

/// A single edge, discretized as a polyline.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Ordered points along the edge.
    pub points: Vec<Point3>,
}

/// A coordinate frame: origin plus Euler orientation in degrees.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Placement {
    /// Origin of the frame.
    pub position: [f64; 3],
    /// Rotation about X, Y and Z in degrees.
    pub orientation: [f64; 3],
}

/// Rotate a Z-up point into the Y-up convention (-90 degrees about X).
const fn rotate_to_y_up(point: Point3) -> Point3 {
    let [x, y, z] = point;
    [x, z, -y]
}

impl Shape {
    /// Whether the shape has nothing to render.
    pub fn is_empty(&self) -> bool {
        self.faces.is_empty() && self.edges.is_empty() && self.vertices.is_empty()
    }

    fn into_y_up(mut self) -> Self {
        for face in &mut self.faces {
            for position in &mut face.positions {
                *position = rotate_to_y_up(*position);
            }
        }
        for edge in &mut self.edges {
            for point in &mut edge.points {
                *point = rotate_to_y_up(*point);
            }
        }
        for vertex in &mut self.vertices {
            *vertex = rotate_to_y_up(*vertex);
        }
        self
    }
}

impl Placement {
    fn into_y_up(self) -> Self {
        let [px, py, pz] = self.position;
        let [ox, oy, oz] = self.orientation;
        Self {
            position: [px, pz, -py],
            orientation: [ox - 90.0, oy, oz],
        }
    }
}

impl Geometry {
    /// Convert from the Z-up CAD convention to the Y-up glTF convention.
    #[must_use]
    pub fn into_y_up(self) -> Self {
        match self {
            Self::Shape(shape) => Self::Shape(shape.into_y_up()),
            Self::Location(placement) => Self::Location(placement.into_y_up()),
        }
    }
}

impl From<Shape> for Geometry {
    fn from(shape: Shape) -> Self {
        Self::Shape(shape)
    }
}

impl From<Placement> for Geometry {
    fn from(placement: Placement) -> Self {
        Self::Location(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn y_up_rotates_points() {
        let shape = Shape {
            vertices: vec![[1.0, 2.0, 3.0]],
            edges: vec![Edge {
                points: vec![[0.0, 0.0, 1.0]],
            }],
            ..Shape::default()
        };
        let Geometry::Shape(rotated) = Geometry::from(shape).into_y_up() else {
            panic!("expected a shape");
        };
        assert_eq!(rotated.vertices, vec![[1.0, 3.0, -2.0]]);
        assert_eq!(rotated.edges[0].points, vec![[0.0, 1.0, -0.0]]);
    }

    #[test]
    fn y_up_adjusts_placement_orientation() {
        let placement = Placement {
            position: [1.0, 2.0, 3.0],
            orientation: [0.0, 10.0, 20.0],
        };
        let Geometry::Location(rotated) = Geometry::from(placement).into_y_up() else {
            panic!("expected a location");
        };
        assert_eq!(rotated.position, [1.0, 3.0, -2.0]);
        assert_eq!(rotated.orientation, [-90.0, 10.0, 20.0]);
    }

    #[test]
    fn geometry_json_is_tagged() {
        let json = serde_json::to_value(Geometry::from(Placement::default())).unwrap();
        assert_eq!(json["kind"], "location");
    }
}
