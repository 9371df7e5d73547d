// SPDX-License-Identifier: GPL-3.0-only

//! Column-major 4x4 matrices for projection and texture-coordinate transforms

/// Column-major 4x4 matrix, element `(row, col)` at `col * 4 + row`
pub type Mat4 = [f32; 16];

pub const IDENTITY: Mat4 = [
    1.0, 0.0, 0.0, 0.0, //
    0.0, 1.0, 0.0, 0.0, //
    0.0, 0.0, 1.0, 0.0, //
    0.0, 0.0, 0.0, 1.0,
];

/// Scale on the x and y axes
pub fn scale(sx: f32, sy: f32) -> Mat4 {
    let mut m = IDENTITY;
    m[0] = sx;
    m[5] = sy;
    m
}

/// Counter-clockwise rotation about the z axis
pub fn rotation_z(degrees: f32) -> Mat4 {
    let (sin, cos) = degrees.to_radians().sin_cos();
    let mut m = IDENTITY;
    m[0] = cos;
    m[1] = sin;
    m[4] = -sin;
    m[5] = cos;
    m
}

/// `a * b` (applies `b` first)
pub fn multiply(a: &Mat4, b: &Mat4) -> Mat4 {
    let mut out = [0.0; 16];
    for col in 0..4 {
        for row in 0..4 {
            out[col * 4 + row] = (0..4).map(|k| a[k * 4 + row] * b[col * 4 + k]).sum();
        }
    }
    out
}

/// Transform a 2D point (z = 0, w = 1)
pub fn transform_point(m: &Mat4, p: [f32; 2]) -> (f32, f32) {
    let x = m[0] * p[0] + m[4] * p[1] + m[12];
    let y = m[1] * p[0] + m[5] * p[1] + m[13];
    (x, y)
}

/// Transform a texture coordinate the way the vertex shaders do
pub fn transform_uv(m: &Mat4, uv: [f32; 2]) -> (f32, f32) {
    transform_point(m, uv)
}
