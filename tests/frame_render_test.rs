use std::rc::Rc;

use cgmath::{Vector3, vec3};
use common::test_utils::*;
use simple_gl::{
    camera::Camera,
    context::Bindings,
    data_structures::{
        entity::Entity,
        mesh::Mesh,
        terrain::{Terrain, TerrainGrid},
        texture::Texture,
    },
    device::{Command, ShaderStage, UniformValue},
    render::{Renderer, RendererConfig},
    shader::{PROJECTION_MATRIX, ShaderError, ShaderProgram, TRANSFORMATION_MATRIX, VIEW_MATRIX},
};

mod common;

fn textured_cube(ctx: &mut simple_gl::GraphicsContext<simple_gl::Recorder>) -> Rc<Mesh> {
    let texture = Texture::from_rgba(ctx, &checkerboard(4));
    let mut mesh = Mesh::new(ctx, &CUBE_VERTICES, &CUBE_INDICES).unwrap();
    mesh.attach_texture(ctx, texture, &cube_texture_coords())
        .unwrap();
    Rc::new(mesh)
}

#[test]
fn renderer_uploads_projection_once_and_restores_bindings() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    let renderer = Renderer::new(&mut ctx, &shader, RendererConfig::default());

    assert_eq!(
        ctx.device().uniform_value(shader.id(), PROJECTION_MATRIX),
        Some(UniformValue::from(renderer.projection()))
    );
    assert_eq!(ctx.bindings(), Bindings::default());
    assert_eq!(ctx.device().current_program(), None);
}

#[test]
fn renderer_projection_survives_a_resize() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    let renderer = Renderer::new(&mut ctx, &shader, RendererConfig::default());

    ctx.set_host_size(100, 800);
    ctx.resize_to_fit();
    assert!((ctx.aspect_ratio() - 0.125).abs() < 1e-6);

    let cube = Entity::new(textured_cube(&mut ctx), vec3(0.0, 0.0, -1.5));
    {
        let mut frame = shader.bind(&mut ctx);
        renderer.draw(&mut frame, &cube, &shader);
    }
    assert_eq!(
        ctx.device().uniform_value(shader.id(), PROJECTION_MATRIX),
        Some(UniformValue::from(renderer.projection()))
    );
    assert_eq!(ctx.device().draw_calls().count(), 1);
}

#[test]
fn full_frame_draws_cube_and_terrain() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    let renderer = Renderer::new(&mut ctx, &shader, RendererConfig::default());

    let mut cube = Entity::new(textured_cube(&mut ctx), vec3(0.0, 0.0, -1.5));
    cube.rotate(0.0, 1.0, 1.0);
    let grass = Texture::from_rgba(&mut ctx, &checkerboard(8));
    let grid = TerrainGrid::generate(40.0, 4, &mut rand::thread_rng());
    let terrain = Terrain::new(&mut ctx, &grid, Some(grass)).unwrap();
    let camera = Camera::default();
    ctx.take_commands();

    ctx.clear_to_black();
    {
        let mut frame = shader.bind(&mut ctx);
        shader.load_view_matrix(&mut frame, camera.view_matrix());
        renderer.draw(&mut frame, &cube, &shader);
        renderer.draw(&mut frame, &terrain.entity, &shader);
    }
    ctx.present().unwrap();

    let recorder = ctx.device();
    assert_eq!(recorder.draw_calls().count(), 2);
    assert_eq!(recorder.primitives_drawn(), 12 + 18);
    assert_eq!(ctx.bindings(), Bindings::default());
    assert!(recorder.depth_test_enabled());
    assert_eq!(recorder.commands().last(), Some(&Command::Present));
    assert_eq!(
        recorder.uniform_value(shader.id(), VIEW_MATRIX),
        Some(camera.view_matrix().into())
    );
    assert_eq!(
        recorder.uniform_value(shader.id(), TRANSFORMATION_MATRIX),
        Some(terrain.entity.transformation_matrix().into())
    );

    // The cube's matrix is uploaded before its own draw.
    let commands = recorder.commands();
    let first_draw = commands
        .iter()
        .position(|c| matches!(c, Command::DrawElements { .. }))
        .unwrap();
    let cube_matrix: UniformValue = cube.transformation_matrix().into();
    assert!(
        commands[..first_draw]
            .iter()
            .any(|c| matches!(c, Command::Uniform { value, .. } if *value == cube_matrix))
    );
    assert!(matches!(
        commands[first_draw],
        Command::DrawElements {
            count: 36,
            texture: Some(_),
            ..
        }
    ));
}

#[test]
fn broken_vertex_source_is_a_compile_error() {
    let mut ctx = recording_context();
    let error = ShaderProgram::compile(&mut ctx, "fn vs_main( {", FRAGMENT_SHADER).unwrap_err();
    assert!(matches!(
        error,
        ShaderError::Compile {
            stage: ShaderStage::Vertex,
            ..
        }
    ));
}

#[test]
fn broken_fragment_source_releases_the_vertex_shader() {
    let mut ctx = recording_context();
    let error = ShaderProgram::compile(&mut ctx, VERTEX_SHADER, "@fragment fn").unwrap_err();
    assert!(matches!(
        error,
        ShaderError::Compile {
            stage: ShaderStage::Fragment,
            ..
        }
    ));
    assert!(
        ctx.device()
            .commands()
            .iter()
            .any(|c| matches!(c, Command::DeleteShader(_)))
    );
}

#[test]
fn mismatched_stages_are_a_link_error() {
    const FS: &str = r#"
@fragment
fn fs_main(@location(3) normal: vec3<f32>) -> @location(0) vec4<f32> {
    return vec4<f32>(normal, 1.0);
}
"#;
    let mut ctx = recording_context();
    let error = ShaderProgram::compile(&mut ctx, VERTEX_SHADER, FS).unwrap_err();
    assert!(matches!(error, ShaderError::Link { .. }));
    let deletes = ctx
        .device()
        .commands()
        .iter()
        .filter(|c| matches!(c, Command::DeleteShader(_)))
        .count();
    assert_eq!(deletes, 2);
}

#[test]
fn named_uniforms_reach_the_program() {
    let mut ctx = recording_context();
    let shader = ShaderProgram::compile(&mut ctx, VERTEX_SHADER, TINTED_FRAGMENT_SHADER).unwrap();

    shader.set_uniform_vec3(&mut ctx, "colour", Vector3::new(0.1, 0.5, 0.9));
    shader.set_uniform_float(&mut ctx, "strength", 0.75);

    let recorder = ctx.device();
    assert_eq!(
        recorder.uniform_value(shader.id(), "colour"),
        Some(UniformValue::Vec3([0.1, 0.5, 0.9]))
    );
    assert_eq!(
        recorder.uniform_value(shader.id(), "strength"),
        Some(UniformValue::Float(0.75))
    );
    assert_eq!(ctx.current_program(), None);
}

#[test]
fn unknown_uniform_names_are_ignored() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    ctx.take_commands();

    assert!(shader.uniform_location(&ctx, "lightColour").is_none());
    shader.set_uniform_float(&mut ctx, "lightColour", 1.0);
    assert!(ctx.device().commands().is_empty());
}

#[test]
fn uniform_of_the_wrong_type_keeps_the_previous_value() {
    let mut ctx = recording_context();
    let shader = ShaderProgram::compile(&mut ctx, VERTEX_SHADER, TINTED_FRAGMENT_SHADER).unwrap();
    shader.set_uniform_float(&mut ctx, "strength", 0.5);
    shader.set_uniform_vec3(&mut ctx, "strength", Vector3::new(1.0, 1.0, 1.0));
    assert_eq!(
        ctx.device().uniform_value(shader.id(), "strength"),
        Some(UniformValue::Float(0.5))
    );
}

#[test]
fn bind_and_unbind_round_trip() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    {
        let scope = shader.bind(&mut ctx);
        assert_eq!(scope.current_program(), Some(shader.id()));
        assert_eq!(scope.device().current_program(), Some(shader.id()));
    }
    assert_eq!(ctx.current_program(), None);

    let scope = shader.bind(&mut ctx);
    drop(scope);
    let mut outer = ctx.use_program(shader.id());
    shader.unbind(&mut outer);
    assert_eq!(outer.current_program(), None);
    assert_eq!(outer.device().current_program(), None);
    drop(outer);
    assert_eq!(ctx.current_program(), None);
}

#[test]
fn draw_with_binds_the_shader_around_the_mesh() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    let cube = textured_cube(&mut ctx);
    ctx.take_commands();

    cube.draw_with(&mut ctx, &shader);
    assert_eq!(ctx.device().draw_calls().count(), 1);
    assert_eq!(ctx.device().primitives_drawn(), 12);
    assert_eq!(ctx.bindings(), Bindings::default());
}

#[test]
fn mesh_without_indices_draws_nothing() {
    let mut ctx = recording_context();
    let shader = textured_shader(&mut ctx);
    let renderer = Renderer::new(&mut ctx, &shader, RendererConfig::default());
    let empty = Entity::new(Rc::new(Mesh::new(&mut ctx, &[], &[]).unwrap()), vec3(0.0, 0.0, 0.0));

    let mut frame = shader.bind(&mut ctx);
    renderer.draw(&mut frame, &empty, &shader);
    assert_eq!(frame.device().draw_calls().count(), 0);
}
