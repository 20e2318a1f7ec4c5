use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use glam::{DMat4, DVec4};
use parallax_engine::device::{BackendResult, ContextId, WgpuBackend};
use parallax_engine::{BackendError, DrawPass, GeometrySource, SurfaceId};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Vertex {
    position: [f32; 3],
    color: [f32; 3],
}

impl Vertex {
    fn layout() -> wgpu::VertexBufferLayout<'static> {
        const ATTRS: [wgpu::VertexAttribute; 2] =
            wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x3];
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &ATTRS,
        }
    }
}

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct PassUniform {
    clip_from_world: [[f32; 4]; 4],
}

/// Triangle in world units, centred on the origin in the z = 0 plane.
const TRIANGLE: [Vertex; 3] = [
    Vertex { position: [-0.05, -0.04, 0.0], color: [1.0, 0.2, 0.2] },
    Vertex { position: [0.05, -0.04, 0.0], color: [0.2, 1.0, 0.2] },
    Vertex { position: [0.0, 0.05, 0.0], color: [0.2, 0.2, 1.0] },
];

/// Remaps GL clip depth ([-1, 1]) to the [0, 1] range wgpu rasterizes.
const GL_TO_WGPU_DEPTH: DMat4 = DMat4::from_cols(
    DVec4::new(1.0, 0.0, 0.0, 0.0),
    DVec4::new(0.0, 1.0, 0.0, 0.0),
    DVec4::new(0.0, 0.0, 0.5, 0.0),
    DVec4::new(0.0, 0.0, 0.5, 1.0),
);

/// GPU objects of one context. Recreated whenever the engine asks for a rebuild.
struct ContextObjects {
    pipeline: wgpu::RenderPipeline,
    bind_group_layout: wgpu::BindGroupLayout,
    vertices: wgpu::Buffer,
}

impl ContextObjects {
    fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("headless triangle shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/triangle.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("headless triangle bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("headless triangle pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("headless triangle pipeline"),
            layout: Some(&layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[Vertex::layout()],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
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
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview_mask: None,
            cache: None,
        });

        let vertices = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("headless triangle vbo"),
            contents: bytemuck::cast_slice(&TRIANGLE),
            usage: wgpu::BufferUsages::VERTEX,
        });

        Self {
            pipeline,
            bind_group_layout,
            vertices,
        }
    }
}

/// One colored triangle, drawn into the opaque layer of every pass.
#[derive(Default)]
pub struct TriangleScene {
    objects: HashMap<ContextId, ContextObjects>,
    passes: u64,
}

impl TriangleScene {
    pub fn new() -> Self {
        Self::default()
    }
}

impl GeometrySource<WgpuBackend> for TriangleScene {
    fn draw_opaque(&mut self, pass: &mut DrawPass<'_, '_, WgpuBackend>) -> BackendResult<()> {
        let surface: SurfaceId = pass.surface();
        let context = pass.context_id();
        let rebuild = pass.rebuild_requested();
        let clip = (GL_TO_WGPU_DEPTH * pass.matrices().clip_from_world()).as_mat4();

        let (_, ctx) = pass.parts();
        if rebuild || !self.objects.contains_key(&context) {
            log::debug!("{surface}: building triangle pipeline on context {context}");
            let objects = ContextObjects::new(ctx.device(), ctx.color_format());
            self.objects.insert(context, objects);
        }
        let Some(objects) = self.objects.get(&context) else {
            return Ok(());
        };

        // Each pass gets its own uniform; queue writes would all land before
        // the frame's single submit.
        let uniform = ctx.device().create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("headless pass uniform"),
            contents: bytemuck::bytes_of(&PassUniform {
                clip_from_world: clip.to_cols_array_2d(),
            }),
            usage: wgpu::BufferUsages::UNIFORM,
        });
        let bind_group = ctx.device().create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("headless pass bind group"),
            layout: &objects.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform.as_entire_binding(),
            }],
        });

        let Some((encoder, view)) = ctx.frame_target(surface) else {
            return Err(BackendError::new("draw_opaque", format!("{surface} has no open frame")));
        };
        let mut rpass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("headless triangle pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
                depth_slice: None,
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
            multiview_mask: None,
        });
        rpass.set_pipeline(&objects.pipeline);
        rpass.set_bind_group(0, &bind_group, &[]);
        rpass.set_vertex_buffer(0, objects.vertices.slice(..));
        rpass.draw(0..3, 0..1);

        self.passes += 1;
        Ok(())
    }
}

impl Drop for TriangleScene {
    fn drop(&mut self) {
        log::debug!("triangle scene drew {} passes", self.passes);
    }
}
