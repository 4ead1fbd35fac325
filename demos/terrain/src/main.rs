use std::{rc::Rc, sync::Arc};

use instant::Instant;
use log::{error, info};
use simple_gl::{
    GraphicsContext, WgpuDevice,
    camera::{Camera, DEFAULT_SENSITIVITY, InputState},
    cgmath::vec3,
    data_structures::{
        entity::Entity,
        mesh::Mesh,
        terrain::{Terrain, TerrainConfig},
        texture::Texture,
    },
    render::{Renderer, RendererConfig},
    shader::ShaderProgram,
};
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowId},
};

const VERTEX_SHADER: &str = include_str!("shaders/textured.vert.wgsl");
const FRAGMENT_SHADER: &str = include_str!("shaders/textured.frag.wgsl");

#[rustfmt::skip]
const CUBE_VERTICES: [f32; 72] = [
    -0.5, 0.5, -0.5,   -0.5, -0.5, -0.5,   0.5, -0.5, -0.5,   0.5, 0.5, -0.5,
    -0.5, 0.5, 0.5,    -0.5, -0.5, 0.5,    0.5, -0.5, 0.5,    0.5, 0.5, 0.5,
    0.5, 0.5, -0.5,    0.5, -0.5, -0.5,    0.5, -0.5, 0.5,    0.5, 0.5, 0.5,
    -0.5, 0.5, -0.5,   -0.5, -0.5, -0.5,   -0.5, -0.5, 0.5,   -0.5, 0.5, 0.5,
    -0.5, 0.5, 0.5,    -0.5, 0.5, -0.5,    0.5, 0.5, -0.5,    0.5, 0.5, 0.5,
    -0.5, -0.5, 0.5,   -0.5, -0.5, -0.5,   0.5, -0.5, -0.5,   0.5, -0.5, 0.5,
];

#[rustfmt::skip]
const CUBE_INDICES: [u32; 36] = [
    0, 1, 3,    3, 1, 2,
    4, 5, 7,    7, 5, 6,
    8, 9, 11,   11, 9, 10,
    12, 13, 15, 15, 13, 14,
    16, 17, 19, 19, 17, 18,
    20, 21, 23, 23, 21, 22,
];

fn checkerboard(size: u32, cell: u32, dark: [u8; 3], light: [u8; 3]) -> image::RgbaImage {
    image::RgbaImage::from_fn(size, size, |x, y| {
        let [r, g, b] = if (x / cell + y / cell) % 2 == 0 {
            light
        } else {
            dark
        };
        image::Rgba([r, g, b, 255])
    })
}

struct Scene {
    window: Arc<Window>,
    ctx: GraphicsContext<WgpuDevice>,
    shader: ShaderProgram,
    renderer: Renderer,
    camera: Camera,
    input: InputState,
    cube: Entity,
    terrain: Terrain,
    last_frame: Instant,
}

impl Scene {
    fn new(window: Arc<Window>) -> anyhow::Result<Self> {
        let device = futures::executor::block_on(WgpuDevice::new(window.clone()))?;
        let mut ctx = GraphicsContext::create_surface(device, 640, 480);
        ctx.resize_to_fit();
        ctx.clear_to_black();

        let crate_texture = Texture::from_rgba(
            &mut ctx,
            &checkerboard(64, 8, [120, 70, 30], [200, 150, 90]),
        );
        let mut mesh = Mesh::new(&mut ctx, &CUBE_VERTICES, &CUBE_INDICES)?;
        let texture_coords = [0.0, 0.0, 0.0, 1.0, 1.0, 1.0, 1.0, 0.0].repeat(6);
        mesh.attach_texture(&mut ctx, crate_texture, &texture_coords)?;

        let shader = ShaderProgram::compile(&mut ctx, VERTEX_SHADER, FRAGMENT_SHADER)?;
        let renderer = Renderer::new(&mut ctx, &shader, RendererConfig::default());

        let grass = Texture::from_rgba(
            &mut ctx,
            &checkerboard(256, 16, [40, 110, 35], [60, 140, 50]),
        );
        let terrain = Terrain::generate(
            &mut ctx,
            TerrainConfig {
                size: 100.0,
                ..TerrainConfig::default()
            },
            Some(grass),
        )?;
        info!("scene ready at {}x{}", ctx.width(), ctx.height());

        Ok(Self {
            window,
            ctx,
            shader,
            renderer,
            camera: Camera::default(),
            input: InputState::new(),
            cube: Entity::new(Rc::new(mesh), vec3(0.0, 0.0, -1.5)),
            terrain,
            last_frame: Instant::now(),
        })
    }

    fn redraw(&mut self) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.camera.speed = dt * 10.0;
        self.camera
            .update_from_pointer(&self.input, DEFAULT_SENSITIVITY);
        self.cube.rotate(0.0, 1.0, 1.0);

        self.ctx.clear_to_black();
        {
            let mut frame = self.shader.bind(&mut self.ctx);
            self.shader
                .load_view_matrix(&mut frame, self.camera.view_matrix());
            self.renderer.draw(&mut frame, &self.cube, &self.shader);
            self.renderer
                .draw(&mut frame, &self.terrain.entity, &self.shader);
        }
        if let Err(e) = self.ctx.present() {
            error!("Unable to render {e}");
        }
    }
}

#[derive(Default)]
struct App {
    scene: Option<Scene>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.scene.is_some() {
            return;
        }
        let attributes = Window::default_attributes()
            .with_title("simple-gl terrain")
            .with_inner_size(PhysicalSize::new(640, 480));
        let scene = event_loop
            .create_window(attributes)
            .map_err(anyhow::Error::from)
            .and_then(|window| Scene::new(Arc::new(window)));
        match scene {
            Ok(scene) => {
                scene.window.request_redraw();
                self.scene = Some(scene);
            }
            Err(e) => {
                error!("cannot set up the scene: {e:#}");
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _: WindowId, event: WindowEvent) {
        let Some(scene) = &mut self.scene else {
            return;
        };
        if let Some(key) = scene.input.handle_window_event(&event) {
            scene.camera.on_key(key);
        }
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(_) => scene.ctx.resize_to_fit(),
            WindowEvent::RedrawRequested => {
                scene.redraw();
                scene.window.request_redraw();
            }
            _ => {}
        }
    }
}

fn main() -> anyhow::Result<()> {
    simple_gl::init_logger();
    let event_loop = EventLoop::new()?;
    let mut app = App::default();
    event_loop.run_app(&mut app)?;
    Ok(())
}
