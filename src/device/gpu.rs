//! [`Device`] implementation on top of wgpu.
//!
//! # Key types
//!
//! - [`WgpuDevice`]: owns the wgpu device/queue and a drawing target, either
//!   a winit window surface or an offscreen texture.
//!
//! The GL state machine maps onto wgpu like this:
//!
//! - a linked program is two shader modules plus one render pipeline per depth
//!   mode (depth test on/off) and a CPU copy of each uniform block
//! - `draw_elements` snapshots the bound program's uniform blocks, vertex array
//!   and texture into a draw call; draw calls of one frame are encoded into a
//!   single render pass when the frame is cleared again or presented
//! - textures are sampled from `@group(1)`-style texture/sampler bindings; with
//!   no texture bound a 1x1 white texture is used
//! - vertex inputs the bound vertex array does not provide read zeros

use std::{collections::HashMap, iter, sync::Arc, time::Duration};

use anyhow::{Context as _, Result, anyhow, bail};
use log::{debug, trace, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use super::{
    Device, DeviceError, ProgramId, ShaderId, ShaderStage, TextureId, UniformLocation,
    UniformValue, VertexArrayId, rgba8_len,
};
use crate::shader::reflect::{self, CompiledStage, ProgramLayout, ResourceKind};

const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

enum Target {
    Window {
        window: Arc<Window>,
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
        configured: bool,
        frame: Option<wgpu::SurfaceTexture>,
    },
    Offscreen {
        texture: wgpu::Texture,
        host_size: (u32, u32),
    },
}

struct ProgramEntry {
    layout: ProgramLayout,
    bind_group_layouts: Vec<wgpu::BindGroupLayout>,
    /// Indexed by "depth test enabled".
    pipelines: [wgpu::RenderPipeline; 2],
    uniforms: Vec<Vec<u8>>,
}

#[derive(Default)]
struct VertexArrayEntry {
    index: Option<wgpu::Buffer>,
    index_count: u32,
    /// Number of vertices the largest index addresses.
    vertex_count: u32,
    /// slot -> (buffer, components, vertices)
    attributes: HashMap<u32, (wgpu::Buffer, u32, u32)>,
}

#[derive(Clone)]
struct TextureEntry {
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
}

struct DrawCall {
    program: ProgramId,
    vertex_array: VertexArrayId,
    texture: Option<TextureId>,
    count: u32,
    depth_test: bool,
    viewport: Option<(i32, i32, u32, u32)>,
    uniforms: Vec<Vec<u8>>,
}

#[derive(Default)]
struct Frame {
    clear: Option<[f32; 4]>,
    draws: Vec<DrawCall>,
}

pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    target: Target,
    format: wgpu::TextureFormat,
    size: (u32, u32),
    depth: wgpu::TextureView,
    zeros: wgpu::Buffer,
    white: TextureEntry,
    shaders: Vec<Option<CompiledStage>>,
    programs: Vec<ProgramEntry>,
    vertex_arrays: Vec<VertexArrayEntry>,
    textures: Vec<TextureEntry>,
    program: Option<ProgramId>,
    vertex_array: Option<VertexArrayId>,
    texture: Option<TextureId>,
    depth_test: bool,
    viewport: Option<(i32, i32, u32, u32)>,
    frame: Option<Frame>,
}

impl std::fmt::Debug for WgpuDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WgpuDevice")
            .field("format", &self.format)
            .field("size", &self.size)
            .field("programs", &self.programs.len())
            .field("vertex_arrays", &self.vertex_arrays.len())
            .field("textures", &self.textures.len())
            .finish_non_exhaustive()
    }
}

fn instance() -> wgpu::Instance {
    wgpu::Instance::new(&wgpu::InstanceDescriptor {
        #[cfg(not(target_arch = "wasm32"))]
        backends: wgpu::Backends::PRIMARY,
        #[cfg(target_arch = "wasm32")]
        backends: wgpu::Backends::GL,
        ..Default::default()
    })
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::default(),
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .context("no suitable graphics adapter")?;
    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("simple-gl device"),
            required_features: wgpu::Features::empty(),
            // WebGL2 is the lowest common denominator we target.
            required_limits: if cfg!(target_arch = "wasm32") {
                wgpu::Limits::downlevel_webgl2_defaults()
            } else {
                wgpu::Limits::default()
            },
            ..Default::default()
        })
        .await
        .context("cannot open the graphics device")?;
    Ok((adapter, device, queue))
}

fn depth_view(device: &wgpu::Device, width: u32, height: u32) -> wgpu::TextureView {
    device
        .create_texture(&wgpu::TextureDescriptor {
            label: Some("depth texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        })
        .create_view(&wgpu::TextureViewDescriptor::default())
}

fn offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("offscreen target"),
        size: wgpu::Extent3d {
            width: width.max(1),
            height: height.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    })
}

fn upload_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    rgba: &[u8],
) -> TextureEntry {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("texture"),
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            aspect: wgpu::TextureAspect::All,
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
        },
        rgba,
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
        address_mode_u: wgpu::AddressMode::Repeat,
        address_mode_v: wgpu::AddressMode::Repeat,
        address_mode_w: wgpu::AddressMode::Repeat,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        ..Default::default()
    });
    TextureEntry { view, sampler }
}

fn vertex_format(components: u32) -> wgpu::VertexFormat {
    match components {
        1 => wgpu::VertexFormat::Float32,
        2 => wgpu::VertexFormat::Float32x2,
        3 => wgpu::VertexFormat::Float32x3,
        _ => wgpu::VertexFormat::Float32x4,
    }
}

/// Uniform buffers are bound whole, so blocks are padded to 16 bytes.
fn padded_block_size(size: u32) -> usize {
    (size.max(16).div_ceil(16) * 16) as usize
}

impl WgpuDevice {
    /// Opens a device that draws onto `window`.
    pub async fn new(window: Arc<Window>) -> Result<Self> {
        let size = window.inner_size();
        debug!("wgpu setup for a {}x{} window", size.width, size.height);
        let instance = instance();
        let surface = instance.create_surface(window.clone())?;
        let (adapter, device, queue) = request_device(&instance, Some(&surface)).await?;

        let caps = surface.get_capabilities(&adapter);
        // Colours written by shaders are linear, so prefer an sRGB surface.
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .context("the surface supports no texture format")?;
        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width,
            height: size.height,
            present_mode: caps
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps
                .alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        let configured = size.width > 0 && size.height > 0;
        if configured {
            surface.configure(&device, &config);
        }
        let target = Target::Window {
            window,
            surface,
            config,
            configured,
            frame: None,
        };
        Ok(Self::with_target(
            device,
            queue,
            target,
            format,
            (size.width, size.height),
        ))
    }

    /// Opens a device that draws into a `width` x `height` RGBA8 texture.
    pub async fn headless(width: u32, height: u32) -> Result<Self> {
        debug!("wgpu setup for a {width}x{height} offscreen target");
        let instance = instance();
        let (_, device, queue) = request_device(&instance, None).await?;
        let texture = offscreen_texture(&device, width, height);
        let target = Target::Offscreen {
            texture,
            host_size: (width, height),
        };
        Ok(Self::with_target(
            device,
            queue,
            target,
            OFFSCREEN_FORMAT,
            (width, height),
        ))
    }

    fn with_target(
        device: wgpu::Device,
        queue: wgpu::Queue,
        target: Target,
        format: wgpu::TextureFormat,
        size: (u32, u32),
    ) -> Self {
        let depth = depth_view(&device, size.0, size.1);
        let zeros = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("zero vertex buffer"),
            size: 16,
            usage: wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
        let white = upload_texture(&device, &queue, 1, 1, &[255, 255, 255, 255]);
        Self {
            device,
            queue,
            target,
            format,
            size,
            depth,
            zeros,
            white,
            shaders: Vec::new(),
            programs: Vec::new(),
            vertex_arrays: Vec::new(),
            textures: Vec::new(),
            program: None,
            vertex_array: None,
            texture: None,
            depth_test: false,
            viewport: None,
            frame: None,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    /// Reads back the offscreen target after finishing pending draws.
    ///
    /// Only available for devices created with [`WgpuDevice::headless`].
    pub async fn read_pixels(&mut self) -> Result<image::RgbaImage> {
        self.flush()?;
        let Target::Offscreen { texture, .. } = &self.target else {
            bail!("read_pixels needs an offscreen device");
        };
        let (width, height) = (texture.width(), texture.height());
        let unpadded = 4 * width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded = unpadded.div_ceil(align) * align;

        let output = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback buffer"),
            size: (padded * height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                aspect: wgpu::TextureAspect::All,
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &output,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded),
                    rows_per_image: Some(height),
                },
            },
            texture.size(),
        );
        self.queue.submit(iter::once(encoder.finish()));

        // The mapping has to be requested before polling, otherwise the wait never ends.
        let slice = output.slice(..);
        let (tx, rx) = futures_intrusive::channel::shared::oneshot_channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        self.device
            .poll(wgpu::PollType::Wait {
                submission_index: None,
                timeout: Some(Duration::from_secs(3)),
            })
            .map_err(|e| anyhow!("waiting for the readback failed: {e:?}"))?;
        rx.receive()
            .await
            .context("the readback was cancelled")?
            .map_err(|e| anyhow!("cannot map the readback buffer: {e:?}"))?;

        let mut pixels = Vec::with_capacity((unpadded * height) as usize);
        {
            let data = slice.get_mapped_range();
            for row in data.chunks(padded as usize) {
                pixels.extend_from_slice(&row[..unpadded as usize]);
            }
        }
        output.unmap();
        image::RgbaImage::from_raw(width, height, pixels).context("readback has the wrong size")
    }

    fn create_pipeline(
        &self,
        layout: &wgpu::PipelineLayout,
        vertex: &wgpu::ShaderModule,
        fragment: &wgpu::ShaderModule,
        program: &ProgramLayout,
        depth_test: bool,
    ) -> wgpu::RenderPipeline {
        let attributes: Vec<[wgpu::VertexAttribute; 1]> = program
            .vertex_inputs
            .iter()
            .map(|input| {
                [wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: input.location,
                    format: vertex_format(input.components),
                }]
            })
            .collect();
        let buffers: Vec<wgpu::VertexBufferLayout> = program
            .vertex_inputs
            .iter()
            .zip(&attributes)
            .map(|(input, attributes)| wgpu::VertexBufferLayout {
                array_stride: (input.components * 4) as wgpu::BufferAddress,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes,
            })
            .collect();

        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                cache: None,
                label: Some("program pipeline"),
                layout: Some(layout),
                vertex: wgpu::VertexState {
                    module: vertex,
                    entry_point: Some(&program.vertex_entry),
                    buffers: &buffers,
                    compilation_options: Default::default(),
                },
                fragment: Some(wgpu::FragmentState {
                    module: fragment,
                    entry_point: Some(&program.fragment_entry),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                    compilation_options: Default::default(),
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    strip_index_format: None,
                    front_face: wgpu::FrontFace::Ccw,
                    cull_mode: None,
                    polygon_mode: wgpu::PolygonMode::Fill,
                    unclipped_depth: false,
                    conservative: false,
                },
                // With the depth test off nothing is tested and nothing is written.
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: depth_test,
                    depth_compare: if depth_test {
                        wgpu::CompareFunction::Less
                    } else {
                        wgpu::CompareFunction::Always
                    },
                    stencil: wgpu::StencilState::default(),
                    bias: wgpu::DepthBiasState::default(),
                }),
                multisample: wgpu::MultisampleState {
                    count: 1,
                    mask: !0,
                    alpha_to_coverage_enabled: false,
                },
                multiview: None,
            })
    }

    fn bind_group_layouts(&self, layout: &ProgramLayout) -> Vec<wgpu::BindGroupLayout> {
        (0..layout.group_count())
            .map(|group| {
                let entries: Vec<wgpu::BindGroupLayoutEntry> = layout
                    .resources
                    .iter()
                    .filter(|slot| slot.group == group)
                    .map(|slot| {
                        let mut visibility = wgpu::ShaderStages::NONE;
                        if slot.vertex {
                            visibility |= wgpu::ShaderStages::VERTEX;
                        }
                        if slot.fragment {
                            visibility |= wgpu::ShaderStages::FRAGMENT;
                        }
                        let ty = match slot.kind {
                            ResourceKind::Uniform { .. } => wgpu::BindingType::Buffer {
                                ty: wgpu::BufferBindingType::Uniform,
                                has_dynamic_offset: false,
                                min_binding_size: None,
                            },
                            ResourceKind::Texture => wgpu::BindingType::Texture {
                                multisampled: false,
                                view_dimension: wgpu::TextureViewDimension::D2,
                                sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            },
                            ResourceKind::Sampler => {
                                wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering)
                            }
                        };
                        wgpu::BindGroupLayoutEntry {
                            binding: slot.binding,
                            visibility,
                            ty,
                            count: None,
                        }
                    })
                    .collect();
                self.device
                    .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                        label: Some("program bind group layout"),
                        entries: &entries,
                    })
            })
            .collect()
    }

    fn bind_groups(&self, draw: &DrawCall) -> Vec<wgpu::BindGroup> {
        let program = &self.programs[draw.program.index()];
        let texture = draw
            .texture
            .and_then(|id| self.textures.get(id.index()))
            .unwrap_or(&self.white);
        let buffers: Vec<wgpu::Buffer> = draw
            .uniforms
            .iter()
            .map(|bytes| {
                self.device
                    .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                        label: Some("uniform block"),
                        contents: bytes,
                        usage: wgpu::BufferUsages::UNIFORM,
                    })
            })
            .collect();

        program
            .bind_group_layouts
            .iter()
            .enumerate()
            .map(|(group, bind_group_layout)| {
                let entries: Vec<wgpu::BindGroupEntry> = program
                    .layout
                    .resources
                    .iter()
                    .filter(|slot| slot.group == group as u32)
                    .map(|slot| wgpu::BindGroupEntry {
                        binding: slot.binding,
                        resource: match slot.kind {
                            ResourceKind::Uniform { block } => buffers[block].as_entire_binding(),
                            ResourceKind::Texture => {
                                wgpu::BindingResource::TextureView(&texture.view)
                            }
                            ResourceKind::Sampler => {
                                wgpu::BindingResource::Sampler(&texture.sampler)
                            }
                        },
                    })
                    .collect();
                self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("program bind group"),
                    layout: bind_group_layout,
                    entries: &entries,
                })
            })
            .collect()
    }

    /// Checks a draw call against the buffers it references.
    fn drawable(&self, draw: &DrawCall) -> bool {
        let Some(vertex_array) = self.vertex_arrays.get(draw.vertex_array.index()) else {
            return false;
        };
        if vertex_array.index.is_none() || draw.count > vertex_array.index_count {
            warn!(
                "draw of {} indices but only {} are uploaded, skipped",
                draw.count, vertex_array.index_count
            );
            return false;
        }
        let program = &self.programs[draw.program.index()];
        for input in &program.layout.vertex_inputs {
            if let Some((_, _, vertices)) = vertex_array.attributes.get(&input.location) {
                if *vertices < vertex_array.vertex_count {
                    warn!(
                        "attribute {} holds {} vertices but indices address {}, skipped",
                        input.location, vertices, vertex_array.vertex_count
                    );
                    return false;
                }
            }
        }
        true
    }

    fn ensure_zeros(&mut self, size: u64) {
        if self.zeros.size() >= size {
            return;
        }
        self.zeros = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("zero vertex buffer"),
            size: size.next_power_of_two(),
            usage: wgpu::BufferUsages::VERTEX,
            mapped_at_creation: false,
        });
    }

    fn target_view(&mut self) -> Result<Option<wgpu::TextureView>, DeviceError> {
        match &mut self.target {
            Target::Window {
                surface,
                configured,
                frame,
                ..
            } => {
                if !*configured {
                    return Ok(None);
                }
                if frame.is_none() {
                    let texture = surface
                        .get_current_texture()
                        .map_err(|e| DeviceError::Surface(e.to_string()))?;
                    *frame = Some(texture);
                }
                Ok(frame.as_ref().map(|frame| {
                    frame
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default())
                }))
            }
            Target::Offscreen { texture, .. } => Ok(Some(
                texture.create_view(&wgpu::TextureViewDescriptor::default()),
            )),
        }
    }

    /// Encodes the pending frame into one render pass and submits it.
    fn flush(&mut self) -> Result<(), DeviceError> {
        let Some(frame) = self.frame.take() else {
            return Ok(());
        };
        let Some(view) = self.target_view()? else {
            trace!("surface not configured, frame dropped");
            return Ok(());
        };

        let draws: Vec<&DrawCall> = frame
            .draws
            .iter()
            .filter(|draw| draw.count > 0 && self.drawable(draw))
            .collect();
        let zeros_needed = draws
            .iter()
            .map(|draw| u64::from(self.vertex_arrays[draw.vertex_array.index()].vertex_count) * 16)
            .max()
            .unwrap_or(0);
        self.ensure_zeros(zeros_needed);
        let bind_groups: Vec<Vec<wgpu::BindGroup>> =
            draws.iter().map(|draw| self.bind_groups(draw)).collect();

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("frame encoder"),
            });
        {
            let (load, depth_load) = match frame.clear {
                Some([r, g, b, a]) => (
                    wgpu::LoadOp::Clear(wgpu::Color {
                        r: r as f64,
                        g: g as f64,
                        b: b as f64,
                        a: a as f64,
                    }),
                    wgpu::LoadOp::Clear(1.0),
                ),
                None => (wgpu::LoadOp::Load, wgpu::LoadOp::Load),
            };
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("frame pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth,
                    depth_ops: Some(wgpu::Operations {
                        load: depth_load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            for (draw, groups) in draws.iter().zip(&bind_groups) {
                let program = &self.programs[draw.program.index()];
                let vertex_array = &self.vertex_arrays[draw.vertex_array.index()];
                let Some(index) = &vertex_array.index else {
                    continue;
                };
                pass.set_pipeline(&program.pipelines[usize::from(draw.depth_test)]);
                if let Some((x, y, width, height)) = draw.viewport {
                    let x = x.clamp(0, self.size.0 as i32) as u32;
                    let y = y.clamp(0, self.size.1 as i32) as u32;
                    let width = width.min(self.size.0 - x);
                    let height = height.min(self.size.1 - y);
                    if width > 0 && height > 0 {
                        pass.set_viewport(
                            x as f32,
                            y as f32,
                            width as f32,
                            height as f32,
                            0.0,
                            1.0,
                        );
                    }
                }
                for (group, bind_group) in groups.iter().enumerate() {
                    pass.set_bind_group(group as u32, bind_group, &[]);
                }
                for (slot, input) in program.layout.vertex_inputs.iter().enumerate() {
                    match vertex_array.attributes.get(&input.location) {
                        Some((buffer, components, _)) if *components == input.components => {
                            pass.set_vertex_buffer(slot as u32, buffer.slice(..));
                        }
                        _ => pass.set_vertex_buffer(slot as u32, self.zeros.slice(..)),
                    }
                }
                pass.set_index_buffer(index.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.count, 0, 0..1);
            }
        }
        self.queue.submit(iter::once(encoder.finish()));
        Ok(())
    }

    fn pending_frame(&mut self) -> &mut Frame {
        self.frame.get_or_insert_with(Frame::default)
    }
}

impl Device for WgpuDevice {
    fn viewport_size(&self) -> (u32, u32) {
        match &self.target {
            Target::Window { window, .. } => {
                let size = window.inner_size();
                (size.width, size.height)
            }
            Target::Offscreen { host_size, .. } => *host_size,
        }
    }

    fn resize(&mut self, width: u32, height: u32) {
        if self.flush().is_err() {
            warn!("pending frame lost while resizing");
        }
        self.size = (width, height);
        match &mut self.target {
            Target::Window {
                surface,
                config,
                configured,
                frame,
                ..
            } => {
                *frame = None;
                // wgpu rejects 0x0 surfaces; configuration waits for a real size.
                *configured = width > 0 && height > 0;
                if *configured {
                    config.width = width;
                    config.height = height;
                    surface.configure(&self.device, config);
                }
            }
            Target::Offscreen { texture, .. } => {
                *texture = offscreen_texture(&self.device, width, height);
            }
        }
        self.depth = depth_view(&self.device, width, height);
        debug!("surface resized to {width}x{height}");
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.viewport = Some((x, y, width, height));
    }

    fn enable_depth_test(&mut self) {
        self.depth_test = true;
    }

    fn clear(&mut self, colour: [f32; 4]) {
        if self.frame.as_ref().is_some_and(|frame| !frame.draws.is_empty()) {
            if let Err(e) = self.flush() {
                warn!("{e}");
            }
        }
        self.pending_frame().clear = Some(colour);
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.flush()?;
        if let Target::Window { frame, .. } = &mut self.target {
            if let Some(frame) = frame.take() {
                frame.present();
            }
        }
        Ok(())
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let compiled = reflect::compile(stage, source)?;
        let id = ShaderId(self.shaders.len() as u32);
        self.shaders.push(Some(compiled));
        Ok(id)
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        let stage = |id: ShaderId| {
            self.shaders
                .get(id.index())
                .and_then(Option::as_ref)
                .ok_or_else(|| format!("shader object {} does not exist", id.0))
        };
        let (vertex, fragment) = (stage(vertex)?, stage(fragment)?);
        let layout = reflect::link(vertex, fragment)?;

        let module = |compiled: &CompiledStage| {
            self.device
                .create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(match compiled.stage() {
                        ShaderStage::Vertex => "vertex shader",
                        ShaderStage::Fragment => "fragment shader",
                    }),
                    source: wgpu::ShaderSource::Wgsl(compiled.source().into()),
                })
        };
        let (vertex, fragment) = (module(vertex), module(fragment));

        let bind_group_layouts = self.bind_group_layouts(&layout);
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("program pipeline layout"),
                bind_group_layouts: &bind_group_layouts.iter().collect::<Vec<_>>(),
                push_constant_ranges: &[],
            });
        let pipelines = [
            self.create_pipeline(&pipeline_layout, &vertex, &fragment, &layout, false),
            self.create_pipeline(&pipeline_layout, &vertex, &fragment, &layout, true),
        ];
        let uniforms = layout
            .uniform_blocks
            .iter()
            .map(|block| vec![0; padded_block_size(block.size)])
            .collect();

        let id = ProgramId(self.programs.len() as u32);
        debug!(
            "program {} linked: {} vertex inputs, {} uniform blocks",
            id.0,
            layout.vertex_inputs.len(),
            layout.uniform_blocks.len()
        );
        self.programs.push(ProgramEntry {
            layout,
            bind_group_layouts,
            pipelines,
            uniforms,
        });
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if let Some(slot) = self.shaders.get_mut(shader.index()) {
            *slot = None;
        }
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let entry = self.programs.get(program.index())?;
        let (block, field) = entry.layout.uniform(name)?;
        Some(UniformLocation {
            program,
            block,
            offset: field.offset,
            kind: field.kind,
        })
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
    }

    fn upload_uniform(&mut self, location: &UniformLocation, value: UniformValue) {
        if self.program != Some(location.program) {
            warn!("uniform upload for a program that is not bound ignored");
            return;
        }
        if location.kind != value.kind() {
            warn!(
                "uniform of type {:?} uploaded as {:?}, ignored",
                location.kind,
                value.kind()
            );
            return;
        }
        let Some(block) = self
            .programs
            .get_mut(location.program.index())
            .and_then(|program| program.uniforms.get_mut(location.block))
        else {
            return;
        };
        let bytes = value.to_bytes();
        let start = location.offset as usize;
        if let Some(target) = block.get_mut(start..start + bytes.len()) {
            target.copy_from_slice(&bytes);
        }
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(VertexArrayEntry::default());
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.vertex_array = vertex_array;
    }

    fn upload_indices(&mut self, indices: &[u32]) {
        let Some(entry) = self
            .vertex_array
            .and_then(|id| self.vertex_arrays.get_mut(id.index()))
        else {
            warn!("index upload without a bound vertex array ignored");
            return;
        };
        // Keep a non-empty buffer around so the vertex array stays drawable.
        let contents: &[u32] = if indices.is_empty() { &[0] } else { indices };
        entry.index = Some(
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("index buffer"),
                    contents: bytemuck::cast_slice(contents),
                    usage: wgpu::BufferUsages::INDEX,
                }),
        );
        entry.index_count = indices.len() as u32;
        entry.vertex_count = indices.iter().max().map_or(0, |max| max + 1);
    }

    fn upload_attribute(&mut self, slot: u32, components: u32, data: &[f32]) {
        let Some(entry) = self
            .vertex_array
            .and_then(|id| self.vertex_arrays.get_mut(id.index()))
        else {
            warn!("attribute upload without a bound vertex array ignored");
            return;
        };
        if !(1..=4).contains(&components) || data.is_empty() {
            warn!("attribute {slot} with {components} components and {} floats ignored", data.len());
            return;
        }
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("attribute buffer"),
                contents: bytemuck::cast_slice(data),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let vertices = data.len() as u32 / components;
        entry.attributes.insert(slot, (buffer, components, vertices));
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId {
        let id = TextureId(self.textures.len() as u32);
        let entry = if width == 0 || height == 0 || rgba8_len(width, height) != Some(rgba.len()) {
            warn!(
                "texture data of {} bytes does not match {width}x{height} RGBA8, using white",
                rgba.len()
            );
            self.white.clone()
        } else {
            upload_texture(&self.device, &self.queue, width, height, rgba)
        };
        self.textures.push(entry);
        trace!("texture {} created ({width}x{height})", id.0);
        id
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
    }

    fn draw_elements(&mut self, count: u32) {
        let (Some(program), Some(vertex_array)) = (self.program, self.vertex_array) else {
            warn!("draw without a bound program and vertex array skipped");
            return;
        };
        let Some(uniforms) = self
            .programs
            .get(program.index())
            .map(|entry| entry.uniforms.clone())
        else {
            return;
        };
        let draw = DrawCall {
            program,
            vertex_array,
            texture: self.texture,
            count,
            depth_test: self.depth_test,
            viewport: self.viewport,
            uniforms,
        };
        self.pending_frame().draws.push(draw);
    }
}
