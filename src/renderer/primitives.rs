use super::vertex::{v, TangentVertex, Vertex};
use std::f32::consts::PI;

/// Unit sphere with tangents along increasing longitude.
pub fn sphere_mesh(segments: u32, rings: u32) -> (Vec<TangentVertex>, Vec<u32>) {
    let mut vertices = Vec::with_capacity(((rings + 1) * (segments + 1)) as usize);
    let mut indices = Vec::with_capacity((rings * segments * 6) as usize);

    for ring in 0..=rings {
        let phi = PI * ring as f32 / rings as f32;
        let y = phi.cos();
        let ring_radius = phi.sin();

        for segment in 0..=segments {
            let theta = 2.0 * PI * segment as f32 / segments as f32;
            let pos = [ring_radius * theta.cos(), y, ring_radius * theta.sin()];
            let uv = [segment as f32 / segments as f32, ring as f32 / rings as f32];
            let tangent = [-theta.sin(), 0.0, theta.cos(), 1.0];

            vertices.push(v(pos, pos, uv, tangent));
        }
    }

    for ring in 0..rings {
        for segment in 0..segments {
            let current = ring * (segments + 1) + segment;
            let next = current + segments + 1;
            indices.extend_from_slice(&[current, next, current + 1, current + 1, next, next + 1]);
        }
    }

    (vertices, indices)
}

/// Unit cube centred on the origin, 4 vertices per face.
pub fn cube_mesh() -> (Vec<TangentVertex>, Vec<u16>) {
    // (normal, tangent, bitangent) per face; corners are normal/2 +- t/2 +- b/2.
    const FACES: [([f32; 3], [f32; 3], [f32; 3]); 6] = [
        ([1.0, 0.0, 0.0], [0.0, 0.0, -1.0], [0.0, 1.0, 0.0]),
        ([-1.0, 0.0, 0.0], [0.0, 0.0, 1.0], [0.0, 1.0, 0.0]),
        ([0.0, 1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, -1.0]),
        ([0.0, -1.0, 0.0], [1.0, 0.0, 0.0], [0.0, 0.0, 1.0]),
        ([0.0, 0.0, 1.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
        ([0.0, 0.0, -1.0], [-1.0, 0.0, 0.0], [0.0, 1.0, 0.0]),
    ];
    const CORNERS: [(f32, f32); 4] = [(-1.0, -1.0), (1.0, -1.0), (1.0, 1.0), (-1.0, 1.0)];

    let mut verts = Vec::with_capacity(24);
    for (normal, tangent, bitangent) in FACES {
        for (s, t) in CORNERS {
            let pos = [
                0.5 * (normal[0] + s * tangent[0] + t * bitangent[0]),
                0.5 * (normal[1] + s * tangent[1] + t * bitangent[1]),
                0.5 * (normal[2] + s * tangent[2] + t * bitangent[2]),
            ];
            let uv = [(s + 1.0) * 0.5, (1.0 - t) * 0.5];
            verts.push(v(pos, normal, uv, [tangent[0], tangent[1], tangent[2], 1.0]));
        }
    }

    let idx = (0..6u16)
        .flat_map(|f| {
            let o = f * 4;
            [o, o + 1, o + 2, o, o + 2, o + 3]
        })
        .collect::<Vec<_>>();

    (verts, idx)
}

/// [`cube_mesh`] without tangents.
pub fn cube_mesh_standard() -> (Vec<Vertex>, Vec<u16>) {
    let (verts, idx) = cube_mesh();
    (verts.into_iter().map(Vertex::from).collect(), idx)
}

/// Single non-indexed triangle facing +Z.
pub fn triangle() -> Vec<Vertex> {
    let n = [0.0, 0.0, 1.0];
    vec![
        Vertex {
            pos: [0.0, 0.5, 0.0],
            normal: n,
            uv: [0.5, 0.0],
        },
        Vertex {
            pos: [-0.5, -0.5, 0.0],
            normal: n,
            uv: [0.0, 1.0],
        },
        Vertex {
            pos: [0.5, -0.5, 0.0],
            normal: n,
            uv: [1.0, 1.0],
        },
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn cube_counts_look_right() {
        let (v, i) = cube_mesh();
        assert_eq!(v.len(), 24);
        assert_eq!(i.len(), 36);
    }

    #[test]
    fn cube_faces_wind_counter_clockwise_outward() {
        let (verts, idx) = cube_mesh();
        for tri in idx.chunks(3) {
            let a = Vec3::from(verts[tri[0] as usize].pos);
            let b = Vec3::from(verts[tri[1] as usize].pos);
            let c = Vec3::from(verts[tri[2] as usize].pos);
            let face_normal = (b - a).cross(c - a).normalize();
            let normal = Vec3::from(verts[tri[0] as usize].normal);
            assert!(face_normal.abs_diff_eq(normal, 1e-5));
        }
    }

    #[test]
    fn sphere_counts_look_right() {
        let (v, i) = sphere_mesh(8, 4);
        assert_eq!(v.len(), 9 * 5);
        assert_eq!(i.len(), 8 * 4 * 6);
    }
}
