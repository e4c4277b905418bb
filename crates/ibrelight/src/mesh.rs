//! Subject mesh arrays and their upload as vertex buffers.

use std::rc::Rc;

use glam::{Vec2, Vec3};
use ibrelight_gl::Context;
use ibrelight_scene::SubjectGeometry;

use crate::error::{IbrelightError, Result};

/// Unindexed triangle soup of the subject.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeshData {
    pub positions: Vec<Vec3>,
    pub normals: Vec<Vec3>,
    pub tex_coords: Option<Vec<Vec2>>,
}

impl MeshData {
    pub fn new(positions: Vec<Vec3>, normals: Vec<Vec3>) -> Self {
        Self {
            positions,
            normals,
            tex_coords: None,
        }
    }

    pub fn with_tex_coords(mut self, tex_coords: Vec<Vec2>) -> Self {
        self.tex_coords = Some(tex_coords);
        self
    }

    /// Checks that the arrays form whole triangles of matching length.
    pub fn validate(&self) -> Result<()> {
        let count = self.positions.len();
        if count == 0 || count % 3 != 0 {
            return Err(IbrelightError::InvalidMesh(format!(
                "{count} positions do not form whole triangles"
            )));
        }
        if self.normals.len() != count {
            return Err(IbrelightError::InvalidMesh(format!(
                "{} normals for {count} positions",
                self.normals.len()
            )));
        }
        if let Some(tex_coords) = &self.tex_coords {
            if tex_coords.len() != count {
                return Err(IbrelightError::InvalidMesh(format!(
                    "{} texture coordinates for {count} positions",
                    tex_coords.len()
                )));
            }
        }
        Ok(())
    }

    /// Center and diagonal of the axis-aligned bounding box.
    #[must_use]
    pub fn bounds(&self) -> (Vec3, f32) {
        let Some(first) = self.positions.first() else {
            return (Vec3::ZERO, 0.0);
        };
        let (min, max) = self
            .positions
            .iter()
            .fold((*first, *first), |(min, max), p| (min.min(*p), max.max(*p)));
        ((min + max) * 0.5, (max - min).length())
    }

    /// Uploads the arrays as subject vertex buffers.
    pub fn upload(&self, context: &Context) -> Result<SubjectGeometry> {
        self.validate()?;
        let flatten = |vectors: &[Vec3]| -> Vec<f32> {
            vectors.iter().flat_map(|v| v.to_array()).collect()
        };
        let position = context.create_vertex_buffer(3, &flatten(self.positions.as_slice()))?;
        let normal = context.create_vertex_buffer(3, &flatten(self.normals.as_slice()))?;
        let tex_coord = match &self.tex_coords {
            Some(tex_coords) => {
                let data: Vec<f32> = tex_coords.iter().flat_map(|t| t.to_array()).collect();
                Some(Rc::new(context.create_vertex_buffer(2, &data)?))
            }
            None => None,
        };
        log::debug!("uploaded subject mesh with {} triangles", self.positions.len() / 3);
        Ok(SubjectGeometry {
            position: Rc::new(position),
            normal: Rc::new(normal),
            tex_coord,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle() -> MeshData {
        MeshData::new(
            vec![Vec3::ZERO, Vec3::new(2.0, 0.0, 0.0), Vec3::new(0.0, 2.0, 0.0)],
            vec![Vec3::Z; 3],
        )
    }

    #[test]
    fn test_valid_triangle() {
        assert!(triangle().validate().is_ok());
        assert!(triangle()
            .with_tex_coords(vec![Vec2::ZERO, Vec2::X, Vec2::Y])
            .validate()
            .is_ok());
    }

    #[test]
    fn test_rejects_mismatched_arrays() {
        let mut mesh = triangle();
        mesh.normals.pop();
        assert!(matches!(mesh.validate(), Err(IbrelightError::InvalidMesh(_))));

        let mesh = triangle().with_tex_coords(vec![Vec2::ZERO]);
        assert!(mesh.validate().is_err());

        assert!(MeshData::default().validate().is_err());
        let mut partial = triangle();
        partial.positions.push(Vec3::ONE);
        partial.normals.push(Vec3::Z);
        assert!(partial.validate().is_err());
    }

    #[test]
    fn test_bounds() {
        let (center, diagonal) = triangle().bounds();
        assert_eq!(center, Vec3::new(1.0, 1.0, 0.0));
        assert!((diagonal - 8.0_f32.sqrt()).abs() < 1e-6);
        assert_eq!(MeshData::default().bounds(), (Vec3::ZERO, 0.0));
    }
}
