//! Headless [`Device`] that records every call.
//!
//! The recorder keeps the same state a GL context keeps (bound program,
//! vertex array and texture, uniform values per program, buffer sizes per
//! vertex array) and compiles shaders with the same reflection code as
//! [`super::WgpuDevice`], so shader errors surface identically. Nothing is
//! drawn; tests read back [`Recorder::commands`] and the tracked state.

use std::collections::{BTreeMap, HashMap};

use log::{trace, warn};

use super::{
    Device, DeviceError, ProgramId, ShaderId, ShaderStage, TextureId, UniformLocation,
    UniformValue, VertexArrayId, rgba8_len,
};
use crate::shader::reflect::{self, CompiledStage, ProgramLayout};

/// One recorded device call.
#[derive(Clone, Debug, PartialEq)]
pub enum Command {
    Resize {
        width: u32,
        height: u32,
    },
    Viewport {
        x: i32,
        y: i32,
        width: u32,
        height: u32,
    },
    EnableDepthTest,
    Clear([f32; 4]),
    Present,
    CompileShader(ShaderStage, ShaderId),
    LinkProgram(ProgramId),
    DeleteShader(ShaderId),
    UseProgram(Option<ProgramId>),
    CreateVertexArray(VertexArrayId),
    BindVertexArray(Option<VertexArrayId>),
    UploadIndices {
        vertex_array: VertexArrayId,
        count: usize,
    },
    UploadAttribute {
        vertex_array: VertexArrayId,
        slot: u32,
        components: u32,
        len: usize,
    },
    CreateTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    BindTexture(Option<TextureId>),
    Uniform {
        program: ProgramId,
        location: UniformLocation,
        value: UniformValue,
    },
    DrawElements {
        program: Option<ProgramId>,
        vertex_array: Option<VertexArrayId>,
        texture: Option<TextureId>,
        count: u32,
    },
}

#[derive(Debug)]
struct RecordedProgram {
    layout: ProgramLayout,
    values: HashMap<(usize, u32), UniformValue>,
}

#[derive(Debug, Default)]
struct RecordedVertexArray {
    index_count: usize,
    /// slot -> (components, float count)
    attributes: BTreeMap<u32, (u32, usize)>,
}

#[derive(Debug)]
pub struct Recorder {
    host_size: (u32, u32),
    shaders: Vec<Option<CompiledStage>>,
    programs: Vec<RecordedProgram>,
    vertex_arrays: Vec<RecordedVertexArray>,
    textures: Vec<(u32, u32)>,
    program: Option<ProgramId>,
    vertex_array: Option<VertexArrayId>,
    texture: Option<TextureId>,
    depth_test: bool,
    commands: Vec<Command>,
}

impl Recorder {
    /// A recorder whose host reports a drawable area of `width` x `height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            host_size: (width, height),
            shaders: Vec::new(),
            programs: Vec::new(),
            vertex_arrays: Vec::new(),
            textures: Vec::new(),
            program: None,
            vertex_array: None,
            texture: None,
            depth_test: false,
            commands: Vec::new(),
        }
    }

    /// Simulates the host (window, canvas) changing size.
    pub fn set_host_size(&mut self, width: u32, height: u32) {
        self.host_size = (width, height);
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Returns and forgets everything recorded so far.
    pub fn take_commands(&mut self) -> Vec<Command> {
        std::mem::take(&mut self.commands)
    }

    pub fn current_program(&self) -> Option<ProgramId> {
        self.program
    }

    pub fn current_vertex_array(&self) -> Option<VertexArrayId> {
        self.vertex_array
    }

    pub fn current_texture(&self) -> Option<TextureId> {
        self.texture
    }

    pub fn depth_test_enabled(&self) -> bool {
        self.depth_test
    }

    /// The last value uploaded to uniform `name` of `program`.
    pub fn uniform_value(&self, program: ProgramId, name: &str) -> Option<UniformValue> {
        let recorded = self.programs.get(program.index())?;
        let (block, field) = recorded.layout.uniform(name)?;
        recorded.values.get(&(block, field.offset)).copied()
    }

    /// Number of index and attribute floats attached to `vertex_array`, by slot.
    pub fn attribute_len(&self, vertex_array: VertexArrayId, slot: u32) -> Option<usize> {
        self.vertex_arrays
            .get(vertex_array.index())?
            .attributes
            .get(&slot)
            .map(|&(_, len)| len)
    }

    pub fn index_count(&self, vertex_array: VertexArrayId) -> Option<usize> {
        self.vertex_arrays
            .get(vertex_array.index())
            .map(|va| va.index_count)
    }

    /// Every draw call that had both a program and a vertex array bound.
    pub fn draw_calls(&self) -> impl Iterator<Item = &Command> {
        self.commands.iter().filter(|command| {
            matches!(
                command,
                Command::DrawElements {
                    program: Some(_),
                    vertex_array: Some(_),
                    ..
                }
            )
        })
    }

    /// Triangles issued by [`Recorder::draw_calls`].
    pub fn primitives_drawn(&self) -> u32 {
        self.draw_calls()
            .map(|command| match command {
                Command::DrawElements { count, .. } => count / 3,
                _ => 0,
            })
            .sum()
    }

    fn bound_vertex_array(&mut self, what: &str) -> Option<(VertexArrayId, &mut RecordedVertexArray)> {
        let Some(id) = self.vertex_array else {
            warn!("{what} without a bound vertex array ignored");
            return None;
        };
        self.vertex_arrays.get_mut(id.index()).map(|va| (id, va))
    }
}

impl Device for Recorder {
    fn viewport_size(&self) -> (u32, u32) {
        self.host_size
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.commands.push(Command::Resize { width, height });
    }

    fn set_viewport(&mut self, x: i32, y: i32, width: u32, height: u32) {
        self.commands.push(Command::Viewport {
            x,
            y,
            width,
            height,
        });
    }

    fn enable_depth_test(&mut self) {
        self.depth_test = true;
        self.commands.push(Command::EnableDepthTest);
    }

    fn clear(&mut self, colour: [f32; 4]) {
        self.commands.push(Command::Clear(colour));
    }

    fn present(&mut self) -> Result<(), DeviceError> {
        self.commands.push(Command::Present);
        Ok(())
    }

    fn compile_shader(&mut self, stage: ShaderStage, source: &str) -> Result<ShaderId, String> {
        let compiled = reflect::compile(stage, source)?;
        let id = ShaderId(self.shaders.len() as u32);
        self.shaders.push(Some(compiled));
        self.commands.push(Command::CompileShader(stage, id));
        Ok(id)
    }

    fn link_program(&mut self, vertex: ShaderId, fragment: ShaderId) -> Result<ProgramId, String> {
        let stage = |id: ShaderId| {
            self.shaders
                .get(id.index())
                .and_then(Option::as_ref)
                .ok_or_else(|| format!("shader object {} does not exist", id.0))
        };
        let layout = reflect::link(stage(vertex)?, stage(fragment)?)?;
        let id = ProgramId(self.programs.len() as u32);
        self.programs.push(RecordedProgram {
            layout,
            values: HashMap::new(),
        });
        self.commands.push(Command::LinkProgram(id));
        Ok(id)
    }

    fn delete_shader(&mut self, shader: ShaderId) {
        if let Some(slot) = self.shaders.get_mut(shader.index()) {
            *slot = None;
        }
        self.commands.push(Command::DeleteShader(shader));
    }

    fn uniform_location(&self, program: ProgramId, name: &str) -> Option<UniformLocation> {
        let recorded = self.programs.get(program.index())?;
        let (block, field) = recorded.layout.uniform(name)?;
        Some(UniformLocation {
            program,
            block,
            offset: field.offset,
            kind: field.kind,
        })
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        self.program = program;
        self.commands.push(Command::UseProgram(program));
    }

    fn upload_uniform(&mut self, location: &UniformLocation, value: UniformValue) {
        let Some(program) = self.program else {
            warn!("uniform upload without a bound program ignored");
            return;
        };
        if location.program != program {
            warn!("uniform location of program {} used while program {} is bound", location.program.0, program.0);
            return;
        }
        if location.kind != value.kind() {
            warn!("uniform of type {:?} uploaded as {:?}, ignored", location.kind, value.kind());
            return;
        }
        if let Some(recorded) = self.programs.get_mut(program.index()) {
            recorded
                .values
                .insert((location.block, location.offset), value);
        }
        self.commands.push(Command::Uniform {
            program,
            location: *location,
            value,
        });
    }

    fn create_vertex_array(&mut self) -> VertexArrayId {
        let id = VertexArrayId(self.vertex_arrays.len() as u32);
        self.vertex_arrays.push(RecordedVertexArray::default());
        self.commands.push(Command::CreateVertexArray(id));
        id
    }

    fn bind_vertex_array(&mut self, vertex_array: Option<VertexArrayId>) {
        self.vertex_array = vertex_array;
        self.commands.push(Command::BindVertexArray(vertex_array));
    }

    fn upload_indices(&mut self, indices: &[u32]) {
        let Some((vertex_array, recorded)) = self.bound_vertex_array("index upload") else {
            return;
        };
        recorded.index_count = indices.len();
        self.commands.push(Command::UploadIndices {
            vertex_array,
            count: indices.len(),
        });
    }

    fn upload_attribute(&mut self, slot: u32, components: u32, data: &[f32]) {
        let Some((vertex_array, recorded)) = self.bound_vertex_array("attribute upload") else {
            return;
        };
        recorded.attributes.insert(slot, (components, data.len()));
        self.commands.push(Command::UploadAttribute {
            vertex_array,
            slot,
            components,
            len: data.len(),
        });
    }

    fn create_texture(&mut self, width: u32, height: u32, rgba: &[u8]) -> TextureId {
        if rgba8_len(width, height) != Some(rgba.len()) {
            warn!("texture data of {} bytes does not match {width}x{height} RGBA8", rgba.len());
        }
        let id = TextureId(self.textures.len() as u32);
        self.textures.push((width, height));
        trace!("texture {} created ({width}x{height})", id.0);
        self.commands.push(Command::CreateTexture {
            texture: id,
            width,
            height,
        });
        id
    }

    fn bind_texture(&mut self, texture: Option<TextureId>) {
        self.texture = texture;
        self.commands.push(Command::BindTexture(texture));
    }

    fn draw_elements(&mut self, count: u32) {
        if self.program.is_none() {
            warn!("draw without a bound program");
        }
        self.commands.push(Command::DrawElements {
            program: self.program,
            vertex_array: self.vertex_array,
            texture: self.texture,
            count,
        });
    }
}
