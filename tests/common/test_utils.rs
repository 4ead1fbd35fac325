#![allow(dead_code)]

use simple_gl::{GraphicsContext, Recorder, device::Device, shader::ShaderProgram};

pub const VERTEX_SHADER: &str = include_str!("shaders/textured.vert.wgsl");
pub const FRAGMENT_SHADER: &str = include_str!("shaders/textured.frag.wgsl");
pub const TINTED_FRAGMENT_SHADER: &str = include_str!("shaders/tinted.frag.wgsl");

pub const SURFACE_WIDTH: u32 = 640;
pub const SURFACE_HEIGHT: u32 = 480;

/// Six faces, four vertices each.
#[rustfmt::skip]
pub const CUBE_VERTICES: [f32; 72] = [
    -0.5, 0.5, -0.5,   -0.5, -0.5, -0.5,   0.5, -0.5, -0.5,   0.5, 0.5, -0.5,
    -0.5, 0.5, 0.5,    -0.5, -0.5, 0.5,    0.5, -0.5, 0.5,    0.5, 0.5, 0.5,
    0.5, 0.5, -0.5,    0.5, -0.5, -0.5,    0.5, -0.5, 0.5,    0.5, 0.5, 0.5,
    -0.5, 0.5, -0.5,   -0.5, -0.5, -0.5,   -0.5, -0.5, 0.5,   -0.5, 0.5, 0.5,
    -0.5, 0.5, 0.5,    -0.5, 0.5, -0.5,    0.5, 0.5, -0.5,    0.5, 0.5, 0.5,
    -0.5, -0.5, 0.5,   -0.5, -0.5, -0.5,   0.5, -0.5, -0.5,   0.5, -0.5, 0.5,
];

#[rustfmt::skip]
pub const CUBE_INDICES: [u32; 36] = [
    0, 1, 3,    3, 1, 2,
    4, 5, 7,    7, 5, 6,
    8, 9, 11,   11, 9, 10,
    12, 13, 15, 15, 13, 14,
    16, 17, 19, 19, 17, 18,
    20, 21, 23, 23, 21, 22,
];

pub fn cube_texture_coords() -> Vec<f32> {
    [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0].repeat(6)
}

/// A surface of [`SURFACE_WIDTH`] x [`SURFACE_HEIGHT`] on a fresh recorder.
pub fn recording_context() -> GraphicsContext<Recorder> {
    GraphicsContext::create_surface(
        Recorder::new(SURFACE_WIDTH, SURFACE_HEIGHT),
        SURFACE_WIDTH,
        SURFACE_HEIGHT,
    )
}

pub fn textured_shader<D: Device>(ctx: &mut GraphicsContext<D>) -> ShaderProgram {
    ShaderProgram::compile(ctx, VERTEX_SHADER, FRAGMENT_SHADER)
        .expect("textured shader should compile")
}

pub fn checkerboard(size: u32) -> image::RgbaImage {
    image::RgbaImage::from_fn(size, size, |x, y| {
        if (x + y) % 2 == 0 {
            image::Rgba([255, 255, 255, 255])
        } else {
            image::Rgba([40, 120, 40, 255])
        }
    })
}
