//! The interleave pass: samples the quilt once per subpixel and writes the
//! result straight onto the panel.

use super::{dynamic_uniform_entry, fs_tri_buffer, fs_tri_layout, nearest_sampler, sampler_entry, texture_entry};
use lenticular::compositor::LenticularUniforms;

const LENTICULAR_WGSL: &str = r#"
struct VSOut {
    @builtin(position) clip: vec4<f32>,
    @location(0)         uv: vec2<f32>,
}

struct Lenticular {
    pitch:    f32,
    tilt:     f32,
    center:   f32,
    inv_view: f32,
    flip_x:   f32,
    flip_y:   f32,
    subp:     f32,
    pad0:     f32,
    ri:       i32,
    bi:       i32,
    pad1:     vec2<i32>,
    tile:     vec4<f32>,
    aspect:   vec4<f32>,
}

@group(0) @binding(0) var tQuilt: texture_2d<f32>;
@group(0) @binding(1) var samp: sampler;
@group(0) @binding(2) var<uniform> lens: Lenticular;

@vertex
fn vs_main(@location(0) pos: vec2<f32>) -> VSOut {
    var out: VSOut;
    out.clip = vec4<f32>(pos, 0.0, 1.0);
    out.uv = vec2<f32>(0.5 * (pos.x + 1.0), 0.5 * (-pos.y + 1.0));
    return out;
}

// `uv` is in tile space with y up; the quilt is stored top row first.
fn quilt_uv(uv: vec2<f32>, phase: f32) -> vec2<f32> {
    let views = lens.tile.x * lens.tile.y;
    let z = min(floor(phase * views), views - 1.0);
    let row = floor(z / lens.tile.x);
    let col = z - row * lens.tile.x;
    let x = (col + uv.x) / lens.tile.x;
    let y = (row + 1.0 - uv.y) / lens.tile.y;
    return vec2<f32>(x, y) * lens.tile.zw;
}

@fragment
fn fs_main(in: VSOut) -> @location(0) vec4<f32> {
    // Panel space, origin bottom-left.
    let uv = vec2<f32>(in.uv.x, 1.0 - in.uv.y);

    var nuv = vec2<f32>(mix(uv.x, 1.0 - uv.x, lens.flip_x), mix(uv.y, 1.0 - uv.y, lens.flip_y));
    nuv -= 0.5;
    let modx = clamp(
        step(lens.aspect.y, lens.aspect.x) * step(lens.aspect.z, 0.5)
            + step(lens.aspect.x, lens.aspect.y) * step(0.5, lens.aspect.z),
        0.0, 1.0);
    nuv.x = mix(nuv.x, nuv.x * lens.aspect.x / lens.aspect.y, modx);
    nuv.y = mix(nuv.y * lens.aspect.y / lens.aspect.x, nuv.y, modx);
    nuv += 0.5;
    if (any(nuv < vec2<f32>(0.0)) || any(nuv > vec2<f32>(1.0))) {
        return vec4<f32>(0.0, 0.0, 0.0, 1.0);
    }

    var s: array<vec4<f32>, 3>;
    for (var i = 0; i < 3; i++) {
        var phase = fract((uv.x + f32(i) * lens.subp + uv.y * lens.tilt) * lens.pitch - lens.center);
        phase = mix(phase, 1.0 - phase, lens.inv_view);
        s[i] = textureSampleLevel(tQuilt, samp, quilt_uv(nuv, phase), 0.0);
    }
    return vec4<f32>(s[lens.ri].r, s[1].g, s[lens.bi].b, 1.0);
}
"#;

/// Pipeline behind a compositing material handle.
pub struct LenticularPass {
    pipeline: wgpu::RenderPipeline,
    layout: wgpu::BindGroupLayout,
    sampler: wgpu::Sampler,
    fs_vbo: wgpu::Buffer,
}

impl LenticularPass {
    pub fn new(device: &wgpu::Device, out_fmt: wgpu::TextureFormat) -> Self {
        let layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Lenticular Layout"),
            entries: &[
                texture_entry(0),
                sampler_entry(1),
                dynamic_uniform_entry(
                    2,
                    wgpu::ShaderStages::FRAGMENT,
                    std::mem::size_of::<LenticularUniforms>(),
                ),
            ],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("lenticular.wgsl"),
            source: wgpu::ShaderSource::Wgsl(LENTICULAR_WGSL.into()),
        });

        let pipe_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Lenticular PipelineLayout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Lenticular Pipeline"),
            layout: Some(&pipe_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[fs_tri_layout()],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: out_fmt,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
        });

        Self {
            pipeline,
            layout,
            sampler: nearest_sampler(device, "Lenticular Sampler"),
            fs_vbo: fs_tri_buffer(device, "Lenticular FS VBO"),
        }
    }

    /// Bind group for one composite. `uniforms` is the arena buffer; the
    /// draw's slice is selected with a dynamic offset.
    pub fn bind(
        &self,
        device: &wgpu::Device,
        quilt: &wgpu::TextureView,
        uniforms: &wgpu::Buffer,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Lenticular Bind"),
            layout: &self.layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(quilt),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: uniforms,
                        offset: 0,
                        size: wgpu::BufferSize::new(std::mem::size_of::<LenticularUniforms>() as u64),
                    }),
                },
            ],
        })
    }

    pub fn draw<'a>(&'a self, rpass: &mut wgpu::RenderPass<'a>, bind: &'a wgpu::BindGroup, offset: u32) {
        rpass.set_pipeline(&self.pipeline);
        rpass.set_bind_group(0, bind, &[offset]);
        rpass.set_vertex_buffer(0, self.fs_vbo.slice(..));
        rpass.draw(0..3, 0..1);
    }
}
