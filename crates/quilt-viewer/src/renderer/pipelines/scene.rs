//! Scene geometry: lit objects, their quilt-instanced variant, the error
//! shader and the gradient sky.

use super::{dynamic_uniform_entry, fs_tri_layout};
use crate::data::types::{InstanceRaw, ObjectUniform, SkyUniform, Vertex, ViewInstancingUniform};
use crate::renderer::targets::DEPTH_FMT;

const SCENE_WGSL: &str = r#"
struct Object {
    view:  mat4x4<f32>,
    proj:  mat4x4<f32>,
    model: mat4x4<f32>,
    color: vec4<f32>,
}

struct Views {
    view_offset: array<vec4<f32>, 64>,
    screen_rect: array<vec4<f32>, 64>,
    target_size: vec4<f32>,
}

@group(0) @binding(0) var<uniform> obj: Object;
@group(1) @binding(0) var<uniform> views: Views;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0) normal: vec3<f32>,
    // Tile bounds in framebuffer pixels: min xy, max xy.
    @location(1) @interpolate(flat) bounds: vec4<f32>,
}

@vertex
fn vs_main(@location(0) pos: vec3<f32>, @location(1) normal: vec3<f32>) -> VSOut {
    var out: VSOut;
    out.clip = obj.proj * obj.view * obj.model * vec4<f32>(pos, 1.0);
    out.normal = (obj.model * vec4<f32>(normal, 0.0)).xyz;
    out.bounds = vec4<f32>(0.0);
    return out;
}

@vertex
fn vs_instanced(
    @location(0) pos: vec3<f32>,
    @location(1) normal: vec3<f32>,
    @location(2) m0: vec4<f32>,
    @location(3) m1: vec4<f32>,
    @location(4) m2: vec4<f32>,
    @location(5) m3: vec4<f32>,
    @builtin(instance_index) instance: u32,
) -> VSOut {
    let model = mat4x4<f32>(m0, m1, m2, m3);
    let offset = views.view_offset[instance];
    let rect = views.screen_rect[instance];

    var view = obj.view;
    view[3][0] = view[3][0] - offset.x;
    view[3][1] = view[3][1] - offset.y;
    var proj = obj.proj;
    proj[2][0] = proj[2][0] - offset.z;
    proj[2][1] = proj[2][1] - offset.w;

    var clip = proj * view * model * vec4<f32>(pos, 1.0);
    // Squeeze the full frame into the tile.
    clip.x = clip.x * rect.z * 0.5 + rect.x * clip.w;
    clip.y = clip.y * rect.w * 0.5 + rect.y * clip.w;

    let size = views.target_size.xy;
    let lo = rect.xy - rect.zw * 0.5;
    let hi = rect.xy + rect.zw * 0.5;

    var out: VSOut;
    out.clip = clip;
    out.normal = (model * vec4<f32>(normal, 0.0)).xyz;
    out.bounds = vec4<f32>(
        (lo.x + 1.0) * 0.5 * size.x,
        (1.0 - hi.y) * 0.5 * size.y,
        (hi.x + 1.0) * 0.5 * size.x,
        (1.0 - lo.y) * 0.5 * size.y,
    );
    return out;
}

fn shade(normal: vec3<f32>, color: vec4<f32>) -> vec4<f32> {
    let n = normalize(normal);
    let l = normalize(vec3<f32>(0.35, 0.6, 0.7));
    let lambert = max(dot(n, l), 0.0);
    return vec4<f32>(color.rgb * (0.25 + 0.75 * lambert), color.a);
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    return shade(in.normal, obj.color);
}

@fragment
fn fs_instanced(in: VSOut) -> @location(0) vec4<f32> {
    let p = in.clip.xy;
    if (p.x < in.bounds.x || p.y < in.bounds.y || p.x >= in.bounds.z || p.y >= in.bounds.w) {
        discard;
    }
    return shade(in.normal, obj.color);
}

@fragment
fn fs_error(in: VSOut) -> @location(0) vec4<f32> {
    return vec4<f32>(1.0, 0.0, 1.0, 1.0);
}
"#;

const SKY_WGSL: &str = r#"
struct Sky {
    inv_view_proj: mat4x4<f32>,
    zenith:        vec4<f32>,
    horizon:       vec4<f32>,
}

@group(0) @binding(0) var<uniform> sky: Sky;

struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0)        ndc: vec2<f32>,
}

@vertex
fn vs_main(@location(0) pos: vec2<f32>) -> VSOut {
    var out: VSOut;
    out.clip = vec4<f32>(pos, 1.0, 1.0);
    out.ndc = pos;
    return out;
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    let near = sky.inv_view_proj * vec4<f32>(in.ndc, 0.0, 1.0);
    let far = sky.inv_view_proj * vec4<f32>(in.ndc, 1.0, 1.0);
    let dir = normalize(far.xyz / far.w - near.xyz / near.w);
    return mix(sky.horizon, sky.zenith, clamp(dir.y * 0.5 + 0.5, 0.0, 1.0));
}
"#;

const VERTEX_ATTRS: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
const INSTANCE_ATTRS: [wgpu::VertexAttribute; 4] =
    wgpu::vertex_attr_array![2 => Float32x4, 3 => Float32x4, 4 => Float32x4, 5 => Float32x4];

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &VERTEX_ATTRS,
    }
}

fn instance_layout() -> wgpu::VertexBufferLayout<'static> {
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<InstanceRaw>() as u64,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &INSTANCE_ATTRS,
    }
}

/// Which object shader a draw uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenePass {
    Opaque,
    Transparent,
    Error,
}

/// Bind group layouts shared by the pipelines of every output format.
pub struct SceneLayouts {
    pub object: wgpu::BindGroupLayout,
    pub views: wgpu::BindGroupLayout,
    pub sky: wgpu::BindGroupLayout,
}

impl SceneLayouts {
    pub fn new(device: &wgpu::Device) -> Self {
        let layout = |label: &str, visibility, size| {
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                label: Some(label),
                entries: &[dynamic_uniform_entry(0, visibility, size)],
            })
        };
        Self {
            object: layout(
                "Scene Object Layout",
                wgpu::ShaderStages::VERTEX_FRAGMENT,
                std::mem::size_of::<ObjectUniform>(),
            ),
            views: layout(
                "Scene Views Layout",
                wgpu::ShaderStages::VERTEX,
                std::mem::size_of::<ViewInstancingUniform>(),
            ),
            sky: layout("Sky Layout", wgpu::ShaderStages::FRAGMENT, std::mem::size_of::<SkyUniform>()),
        }
    }
}

/// Every scene pipeline for one color format.
pub struct ScenePipelines {
    opaque: wgpu::RenderPipeline,
    transparent: wgpu::RenderPipeline,
    error: wgpu::RenderPipeline,
    opaque_instanced: wgpu::RenderPipeline,
    transparent_instanced: wgpu::RenderPipeline,
    sky: wgpu::RenderPipeline,
}

struct PipelineDesc<'a> {
    label: &'a str,
    layout: &'a wgpu::PipelineLayout,
    shader: &'a wgpu::ShaderModule,
    vs: &'a str,
    fs: &'a str,
    buffers: &'a [wgpu::VertexBufferLayout<'a>],
    blend: Option<wgpu::BlendState>,
    depth_write: bool,
}

fn build(device: &wgpu::Device, color_fmt: wgpu::TextureFormat, desc: PipelineDesc<'_>) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(desc.label),
        layout: Some(desc.layout),
        vertex: wgpu::VertexState {
            module: desc.shader,
            entry_point: desc.vs,
            buffers: desc.buffers,
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            ..Default::default()
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: DEPTH_FMT,
            depth_write_enabled: desc.depth_write,
            depth_compare: wgpu::CompareFunction::LessEqual,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        fragment: Some(wgpu::FragmentState {
            module: desc.shader,
            entry_point: desc.fs,
            targets: &[Some(wgpu::ColorTargetState {
                format: color_fmt,
                blend: desc.blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
            compilation_options: wgpu::PipelineCompilationOptions::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        multiview: None,
    })
}

impl ScenePipelines {
    pub fn new(device: &wgpu::Device, layouts: &SceneLayouts, color_fmt: wgpu::TextureFormat) -> Self {
        let scene = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("scene.wgsl"),
            source: wgpu::ShaderSource::Wgsl(SCENE_WGSL.into()),
        });
        let sky_shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("sky.wgsl"),
            source: wgpu::ShaderSource::Wgsl(SKY_WGSL.into()),
        });

        let object_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene PipelineLayout"),
            bind_group_layouts: &[&layouts.object],
            push_constant_ranges: &[],
        });
        let instanced_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Instanced PipelineLayout"),
            bind_group_layouts: &[&layouts.object, &layouts.views],
            push_constant_ranges: &[],
        });
        let sky_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Sky PipelineLayout"),
            bind_group_layouts: &[&layouts.sky],
            push_constant_ranges: &[],
        });

        let single = [vertex_layout()];
        let instanced = [vertex_layout(), instance_layout()];
        let fullscreen = [fs_tri_layout()];
        let object = |label, fs, blend, depth_write| PipelineDesc {
            label,
            layout: &object_layout,
            shader: &scene,
            vs: "vs_main",
            fs,
            buffers: &single,
            blend,
            depth_write,
        };
        let instancing = |label, blend, depth_write| PipelineDesc {
            label,
            layout: &instanced_layout,
            shader: &scene,
            vs: "vs_instanced",
            fs: "fs_instanced",
            buffers: &instanced,
            blend,
            depth_write,
        };
        let blend = Some(wgpu::BlendState::ALPHA_BLENDING);

        Self {
            opaque: build(device, color_fmt, object("Scene Opaque Pipeline", "fs_main", None, true)),
            transparent: build(device, color_fmt, object("Scene Transparent Pipeline", "fs_main", blend, false)),
            error: build(device, color_fmt, object("Scene Error Pipeline", "fs_error", None, true)),
            opaque_instanced: build(device, color_fmt, instancing("Quilt Instanced Opaque Pipeline", None, true)),
            transparent_instanced: build(
                device,
                color_fmt,
                instancing("Quilt Instanced Transparent Pipeline", blend, false),
            ),
            sky: build(
                device,
                color_fmt,
                PipelineDesc {
                    label: "Sky Pipeline",
                    layout: &sky_layout,
                    shader: &sky_shader,
                    vs: "vs_main",
                    fs: "fs_main",
                    buffers: &fullscreen,
                    blend: None,
                    depth_write: false,
                },
            ),
        }
    }

    pub fn object(&self, pass: ScenePass) -> &wgpu::RenderPipeline {
        match pass {
            ScenePass::Opaque => &self.opaque,
            ScenePass::Transparent => &self.transparent,
            ScenePass::Error => &self.error,
        }
    }

    pub fn instanced(&self, transparent: bool) -> &wgpu::RenderPipeline {
        if transparent {
            &self.transparent_instanced
        } else {
            &self.opaque_instanced
        }
    }

    pub fn sky(&self) -> &wgpu::RenderPipeline {
        &self.sky
    }
}
