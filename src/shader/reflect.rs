//! Shader compilation, linking and uniform reflection.
//!
//! Both devices compile WGSL with naga (wgpu's shader compiler) so that a
//! shader rejected by one device is rejected by the other with the same log.
//!
//! The contract between shader sources and the rest of the crate:
//!
//! - the vertex source has a `@vertex` entry point, the fragment source a
//!   `@fragment` entry point (the first one of each is used)
//! - vertex inputs are read from `@location(n)`, where `n` is the attribute
//!   slot (0 position, 1 texture coordinates, 2 normal)
//! - uniforms are `var<uniform>` globals. A struct-typed block exposes each
//!   member under its member name, a plain-typed one under the variable name
//! - textures (`texture_2d<f32>`) and samplers are sampled from texture unit 0

use std::collections::BTreeMap;

use crate::device::{ShaderStage, UniformKind};

/// One successfully compiled stage.
#[derive(Debug)]
pub struct CompiledStage {
    stage: ShaderStage,
    source: String,
    module: naga::Module,
}

impl CompiledStage {
    pub fn stage(&self) -> ShaderStage {
        self.stage
    }

    pub fn source(&self) -> &str {
        &self.source
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VertexInput {
    pub location: u32,
    pub components: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformField {
    pub name: String,
    pub offset: u32,
    pub kind: UniformKind,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UniformBlock {
    pub group: u32,
    pub binding: u32,
    /// Byte size of the block as laid out by the shader compiler.
    pub size: u32,
    pub fields: Vec<UniformField>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResourceKind {
    /// Index into [`ProgramLayout::uniform_blocks`].
    Uniform { block: usize },
    Texture,
    Sampler,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceSlot {
    pub group: u32,
    pub binding: u32,
    pub kind: ResourceKind,
    pub vertex: bool,
    pub fragment: bool,
}

/// Everything a device needs to know about a linked program.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProgramLayout {
    pub vertex_entry: String,
    pub fragment_entry: String,
    /// Sorted by location.
    pub vertex_inputs: Vec<VertexInput>,
    pub uniform_blocks: Vec<UniformBlock>,
    /// Sorted by (group, binding).
    pub resources: Vec<ResourceSlot>,
}

impl ProgramLayout {
    /// Resolves a uniform name to `(block index, field)`.
    pub fn uniform(&self, name: &str) -> Option<(usize, &UniformField)> {
        self.uniform_blocks
            .iter()
            .enumerate()
            .find_map(|(block, b)| b.fields.iter().find(|f| f.name == name).map(|f| (block, f)))
    }

    /// Number of bind groups the program uses (highest group + 1).
    pub fn group_count(&self) -> u32 {
        self.resources.iter().map(|r| r.group + 1).max().unwrap_or(0)
    }
}

/// Parses and validates one stage, returning the compiler log on failure.
pub fn compile(stage: ShaderStage, source: &str) -> Result<CompiledStage, String> {
    let module = naga::front::wgsl::parse_str(source).map_err(|e| e.emit_to_string(source))?;
    naga::valid::Validator::new(
        naga::valid::ValidationFlags::all(),
        naga::valid::Capabilities::all(),
    )
    .validate(&module)
    .map_err(|e| e.emit_to_string(source))?;
    Ok(CompiledStage {
        stage,
        source: source.to_string(),
        module,
    })
}

/// Matches the two stages against each other, returning the linker log on failure.
pub fn link(vertex: &CompiledStage, fragment: &CompiledStage) -> Result<ProgramLayout, String> {
    if vertex.stage != ShaderStage::Vertex {
        return Err("the first shader object is not a vertex shader".to_string());
    }
    if fragment.stage != ShaderStage::Fragment {
        return Err("the second shader object is not a fragment shader".to_string());
    }
    let vs_entry = entry_point(&vertex.module, naga::ShaderStage::Vertex)
        .ok_or("the vertex shader has no @vertex entry point")?;
    let fs_entry = entry_point(&fragment.module, naga::ShaderStage::Fragment)
        .ok_or("the fragment shader has no @fragment entry point")?;

    let mut vertex_inputs = Vec::new();
    for (location, ty) in argument_locations(&vertex.module, &vs_entry.function) {
        let components = components(&vertex.module.types[ty].inner).ok_or_else(|| {
            format!("vertex input @location({location}) is not a float scalar or vector")
        })?;
        vertex_inputs.push(VertexInput {
            location,
            components,
        });
    }
    vertex_inputs.sort_by_key(|input| input.location);

    let outputs = result_locations(&vertex.module, &vs_entry.function);
    for (location, _) in argument_locations(&fragment.module, &fs_entry.function) {
        if !outputs.contains(&location) {
            return Err(format!(
                "fragment input @location({location}) is not written by the vertex shader"
            ));
        }
    }

    let mut declared: BTreeMap<(u32, u32), (Declared, bool, bool)> = BTreeMap::new();
    for (stage, module) in [
        (ShaderStage::Vertex, &vertex.module),
        (ShaderStage::Fragment, &fragment.module),
    ] {
        for (key, resource) in resources(module)? {
            let entry = declared
                .entry(key)
                .or_insert_with(|| (resource.clone(), false, false));
            if entry.0 != resource {
                return Err(format!(
                    "@group({}) @binding({}) is declared differently by the two shaders",
                    key.0, key.1
                ));
            }
            match stage {
                ShaderStage::Vertex => entry.1 = true,
                ShaderStage::Fragment => entry.2 = true,
            }
        }
    }

    let mut uniform_blocks = Vec::new();
    let mut slots = Vec::new();
    for ((group, binding), (resource, vertex, fragment)) in declared {
        let kind = match resource {
            Declared::Uniform { size, fields } => {
                uniform_blocks.push(UniformBlock {
                    group,
                    binding,
                    size,
                    fields,
                });
                ResourceKind::Uniform {
                    block: uniform_blocks.len() - 1,
                }
            }
            Declared::Texture => ResourceKind::Texture,
            Declared::Sampler => ResourceKind::Sampler,
        };
        slots.push(ResourceSlot {
            group,
            binding,
            kind,
            vertex,
            fragment,
        });
    }

    Ok(ProgramLayout {
        vertex_entry: vs_entry.name.clone(),
        fragment_entry: fs_entry.name.clone(),
        vertex_inputs,
        uniform_blocks,
        resources: slots,
    })
}

#[derive(Clone, Debug, PartialEq)]
enum Declared {
    Uniform { size: u32, fields: Vec<UniformField> },
    Texture,
    Sampler,
}

fn entry_point(module: &naga::Module, stage: naga::ShaderStage) -> Option<&naga::EntryPoint> {
    module.entry_points.iter().find(|ep| ep.stage == stage)
}

fn resources(module: &naga::Module) -> Result<Vec<((u32, u32), Declared)>, String> {
    let mut found = Vec::new();
    for (_, var) in module.global_variables.iter() {
        let Some(rb) = &var.binding else { continue };
        let inner = &module.types[var.ty].inner;
        let declared = match (var.space, inner) {
            (naga::AddressSpace::Uniform, naga::TypeInner::Struct { members, span }) => {
                Declared::Uniform {
                    size: *span,
                    fields: members
                        .iter()
                        .map(|member| UniformField {
                            name: member.name.clone().unwrap_or_default(),
                            offset: member.offset,
                            kind: uniform_kind(&module.types[member.ty].inner),
                        })
                        .collect(),
                }
            }
            (naga::AddressSpace::Uniform, inner) => Declared::Uniform {
                size: inner.size(module.to_ctx()),
                fields: vec![UniformField {
                    name: var.name.clone().unwrap_or_default(),
                    offset: 0,
                    kind: uniform_kind(inner),
                }],
            },
            (
                naga::AddressSpace::Handle,
                naga::TypeInner::Image {
                    dim: naga::ImageDimension::D2,
                    arrayed: false,
                    class:
                        naga::ImageClass::Sampled {
                            kind: naga::ScalarKind::Float,
                            multi: false,
                        },
                },
            ) => Declared::Texture,
            (naga::AddressSpace::Handle, naga::TypeInner::Sampler { comparison: false }) => {
                Declared::Sampler
            }
            _ => {
                return Err(format!(
                    "@group({}) @binding({}) is not a uniform block, a 2D float texture or a filtering sampler",
                    rb.group, rb.binding
                ));
            }
        };
        found.push(((rb.group, rb.binding), declared));
    }
    Ok(found)
}

fn uniform_kind(inner: &naga::TypeInner) -> UniformKind {
    match *inner {
        naga::TypeInner::Scalar(scalar) if scalar == naga::Scalar::F32 => UniformKind::Float,
        naga::TypeInner::Vector {
            size: naga::VectorSize::Tri,
            scalar,
        } if scalar == naga::Scalar::F32 => UniformKind::Vec3,
        naga::TypeInner::Matrix {
            columns: naga::VectorSize::Quad,
            rows: naga::VectorSize::Quad,
            scalar,
        } if scalar == naga::Scalar::F32 => UniformKind::Mat4,
        _ => UniformKind::Unsupported,
    }
}

fn components(inner: &naga::TypeInner) -> Option<u32> {
    match *inner {
        naga::TypeInner::Scalar(scalar) if scalar == naga::Scalar::F32 => Some(1),
        naga::TypeInner::Vector { size, scalar } if scalar == naga::Scalar::F32 => {
            Some(size as u32)
        }
        _ => None,
    }
}

/// `@location`s bound by an entry point's arguments, struct members included.
fn argument_locations(
    module: &naga::Module,
    function: &naga::Function,
) -> Vec<(u32, naga::Handle<naga::Type>)> {
    let mut locations = Vec::new();
    for argument in &function.arguments {
        collect_locations(module, argument.binding.as_ref(), argument.ty, &mut locations);
    }
    locations
}

fn result_locations(module: &naga::Module, function: &naga::Function) -> Vec<u32> {
    let mut locations = Vec::new();
    if let Some(result) = &function.result {
        collect_locations(module, result.binding.as_ref(), result.ty, &mut locations);
    }
    locations.into_iter().map(|(location, _)| location).collect()
}

fn collect_locations(
    module: &naga::Module,
    binding: Option<&naga::Binding>,
    ty: naga::Handle<naga::Type>,
    out: &mut Vec<(u32, naga::Handle<naga::Type>)>,
) {
    match binding {
        Some(naga::Binding::Location { location, .. }) => out.push((*location, ty)),
        Some(naga::Binding::BuiltIn(_)) => {}
        None => {
            if let naga::TypeInner::Struct { members, .. } = &module.types[ty].inner {
                for member in members {
                    if let Some(naga::Binding::Location { location, .. }) = &member.binding {
                        out.push((*location, member.ty));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VERTEX: &str = r#"
struct Matrices {
    transformationMatrix: mat4x4<f32>,
    projectionMatrix: mat4x4<f32>,
    viewMatrix: mat4x4<f32>,
    tint: vec3<f32>,
    fade: f32,
}
@group(0) @binding(0) var<uniform> matrices: Matrices;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) uv: vec2<f32>,
}

@vertex
fn vs_main(@location(0) position: vec3<f32>, @location(1) uv: vec2<f32>) -> VertexOutput {
    var out: VertexOutput;
    out.clip_position = matrices.projectionMatrix * matrices.viewMatrix
        * matrices.transformationMatrix * vec4<f32>(position * matrices.tint * matrices.fade, 1.0);
    out.uv = uv;
    return out;
}
"#;

    const FRAGMENT: &str = r#"
@group(1) @binding(0) var diffuse: texture_2d<f32>;
@group(1) @binding(1) var diffuse_sampler: sampler;
@group(1) @binding(2) var<uniform> brightness: f32;

@fragment
fn fs_main(@location(0) uv: vec2<f32>) -> @location(0) vec4<f32> {
    return textureSample(diffuse, diffuse_sampler, uv) * brightness;
}
"#;

    fn linked() -> ProgramLayout {
        let vs = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fs = compile(ShaderStage::Fragment, FRAGMENT).unwrap();
        link(&vs, &fs).unwrap()
    }

    #[test]
    fn struct_members_resolve_to_std140_offsets() {
        let layout = linked();
        let (block, field) = layout.uniform("viewMatrix").unwrap();
        assert_eq!(block, 0);
        assert_eq!(field.offset, 128);
        assert_eq!(field.kind, UniformKind::Mat4);

        // vec3 is 16-aligned and the trailing f32 packs into its last 4 bytes
        assert_eq!(layout.uniform("tint").unwrap().1.offset, 192);
        assert_eq!(layout.uniform("fade").unwrap().1.offset, 204);
        assert_eq!(layout.uniform_blocks[0].size, 208);
    }

    #[test]
    fn plain_uniform_is_named_after_the_variable() {
        let layout = linked();
        let (block, field) = layout.uniform("brightness").unwrap();
        assert_eq!(block, 1);
        assert_eq!(field.offset, 0);
        assert_eq!(field.kind, UniformKind::Float);
        assert!(layout.uniform("missing").is_none());
    }

    #[test]
    fn vertex_inputs_and_resources_are_collected() {
        let layout = linked();
        assert_eq!(layout.vertex_entry, "vs_main");
        assert_eq!(layout.fragment_entry, "fs_main");
        assert_eq!(
            layout.vertex_inputs,
            vec![
                VertexInput { location: 0, components: 3 },
                VertexInput { location: 1, components: 2 },
            ]
        );
        assert_eq!(layout.group_count(), 2);
        let kinds: Vec<_> = layout.resources.iter().map(|r| r.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ResourceKind::Uniform { block: 0 },
                ResourceKind::Texture,
                ResourceKind::Sampler,
                ResourceKind::Uniform { block: 1 },
            ]
        );
        assert!(layout.resources[0].vertex && !layout.resources[0].fragment);
    }

    #[test]
    fn syntax_errors_fail_to_compile_with_a_log() {
        let err = compile(ShaderStage::Vertex, "@vertex fn vs_main( -> {").unwrap_err();
        assert!(!err.is_empty());
    }

    #[test]
    fn missing_entry_point_fails_to_link() {
        let vs = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fs = compile(ShaderStage::Fragment, "fn helper() -> f32 { return 1.0; }").unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.contains("@fragment"));
    }

    #[test]
    fn unmatched_varying_fails_to_link() {
        let vs = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fs = compile(
            ShaderStage::Fragment,
            "@fragment fn fs_main(@location(3) n: vec3<f32>) -> @location(0) vec4<f32> { return vec4<f32>(n, 1.0); }",
        )
        .unwrap();
        let err = link(&vs, &fs).unwrap_err();
        assert!(err.contains("@location(3)"));
    }

    #[test]
    fn conflicting_bindings_fail_to_link() {
        let vs = compile(ShaderStage::Vertex, VERTEX).unwrap();
        let fs = compile(
            ShaderStage::Fragment,
            "@group(0) @binding(0) var<uniform> other: f32;\n@fragment fn fs_main() -> @location(0) vec4<f32> { return vec4<f32>(other); }",
        )
        .unwrap();
        assert!(link(&vs, &fs).is_err());
    }
}
