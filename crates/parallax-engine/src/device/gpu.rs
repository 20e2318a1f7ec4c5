use std::collections::HashMap;

use anyhow::{Context as _, Result};

use crate::coords::PixelRect;
use crate::error::BackendError;
use crate::surface::SurfaceId;
use crate::view::Eye;

use super::backend::{
    BackendResult, GraphicsBackend, ResourceDesc, ResourceId, ResourceKind, SurfaceDesc,
};

/// Initialization parameters for the wgpu backend.
///
/// Keep this structure stable and minimal. Add configuration flags only when a
/// concrete platform or backend requirement exists.
#[derive(Debug, Clone)]
pub struct GpuInit {
    pub power_preference: wgpu::PowerPreference,

    /// Use a software adapter; handy on CI machines without a GPU.
    pub force_fallback_adapter: bool,

    /// Required wgpu features.
    ///
    /// Favor an empty set for portability unless a feature is strictly necessary.
    pub required_features: wgpu::Features,

    /// Limits requested from the adapter/device.
    pub required_limits: wgpu::Limits,

    /// Format of the per-eye back and front buffers.
    pub color_format: wgpu::TextureFormat,

    /// Format of the accumulation buffer. Needs more precision than the color
    /// targets so that eight weighted samples do not band.
    pub accum_format: wgpu::TextureFormat,
}

impl Default for GpuInit {
    fn default() -> Self {
        Self {
            power_preference: wgpu::PowerPreference::HighPerformance,
            force_fallback_adapter: false,
            required_features: wgpu::Features::empty(),
            required_limits: wgpu::Limits::default(),
            color_format: wgpu::TextureFormat::Rgba8Unorm,
            accum_format: wgpu::TextureFormat::Rgba16Float,
        }
    }
}

/// Offscreen wgpu implementation of [`GraphicsBackend`].
///
/// Each context owns its own device and queue. Surfaces render into offscreen
/// back buffers; `swap` copies them to front buffers readers can copy out of.
pub struct WgpuBackend {
    instance: wgpu::Instance,
    init: GpuInit,
    next_resource: u64,
}

/// Native context: device, queue, per-surface targets and context-owned objects.
pub struct WgpuContext {
    adapter: wgpu::Adapter,
    device: wgpu::Device,
    queue: wgpu::Queue,
    init: GpuInit,
    passes: AccumPasses,
    targets: HashMap<SurfaceId, SurfaceTargets>,
    resources: HashMap<ResourceId, GpuResource>,

    /// Open between `begin_frame` and `end_frame`/`swap`.
    encoder: Option<wgpu::CommandEncoder>,
}

enum GpuResource {
    Texture(wgpu::Texture),
    DisplayList(wgpu::Buffer),
}

struct Target {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
}

struct SurfaceTargets {
    width: u32,
    height: u32,
    stereo: bool,
    /// Left, then right when stereo.
    back: Vec<Target>,
    front: Vec<Target>,
    scratch: Target,
    accum: Target,
    scratch_bind_group: wgpu::BindGroup,
    accum_bind_group: wgpu::BindGroup,
    eye: Eye,
    accumulating: bool,
    frames_presented: u64,
}

struct AccumPasses {
    bind_group_layout: wgpu::BindGroupLayout,
    accumulate: wgpu::RenderPipeline,
    resolve: wgpu::RenderPipeline,
}

impl WgpuBackend {
    pub fn new(init: GpuInit) -> Self {
        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        Self {
            instance,
            init,
            next_resource: 1,
        }
    }

    async fn request_device(&self) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
        let adapter = self
            .instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: self.init.power_preference,
                compatible_surface: None,
                force_fallback_adapter: self.init.force_fallback_adapter,
            })
            .await
            .context("failed to find a suitable GPU adapter")?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("parallax device"),
                required_features: self.init.required_features,
                required_limits: self.init.required_limits.clone(),
                experimental_features: wgpu::ExperimentalFeatures::disabled(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::Off,
            })
            .await
            .context("failed to create wgpu device/queue")?;

        Ok((adapter, device, queue))
    }
}

impl Default for WgpuBackend {
    fn default() -> Self {
        Self::new(GpuInit::default())
    }
}

impl WgpuContext {
    pub fn adapter_info(&self) -> wgpu::AdapterInfo {
        self.adapter.get_info()
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn color_format(&self) -> wgpu::TextureFormat {
        self.init.color_format
    }

    /// Encoder and current draw target of `surface`, while a frame is open.
    ///
    /// The target is the scratch buffer during accumulation, otherwise the
    /// selected eye's back buffer.
    pub fn frame_target(
        &mut self,
        surface: SurfaceId,
    ) -> Option<(&mut wgpu::CommandEncoder, &wgpu::TextureView)> {
        let encoder = self.encoder.as_mut()?;
        let targets = self.targets.get(&surface)?;
        Some((encoder, &targets.draw_target().view))
    }

    /// Presented image of one eye, valid after the first `swap`.
    pub fn front_buffer(&self, surface: SurfaceId, eye: Eye) -> Option<&wgpu::Texture> {
        let t = self.targets.get(&surface)?;
        t.front.get(t.eye_index(eye)).map(|t| &t.texture)
    }

    pub fn frames_presented(&self, surface: SurfaceId) -> u64 {
        self.targets.get(&surface).map_or(0, |t| t.frames_presented)
    }

    fn targets_mut(&mut self, surface: SurfaceId, op: &'static str) -> BackendResult<&mut SurfaceTargets> {
        self.targets
            .get_mut(&surface)
            .ok_or_else(|| BackendError::new(op, format!("{surface} has no targets in this context")))
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }

    fn build_targets(&self, desc: &SurfaceDesc) -> SurfaceTargets {
        let (width, height) = desc.rect.target_size();
        let eyes = if desc.stereo { 2 } else { 1 };
        let color = self.init.color_format;

        let back = (0..eyes)
            .map(|_| create_target(&self.device, "parallax back buffer", width, height, color))
            .collect();
        let front = (0..eyes)
            .map(|_| create_target(&self.device, "parallax front buffer", width, height, color))
            .collect();
        let scratch = create_target(&self.device, "parallax scratch", width, height, color);
        let accum = create_target(
            &self.device,
            "parallax accumulation",
            width,
            height,
            self.init.accum_format,
        );

        let scratch_bind_group = self.passes.bind(&self.device, &scratch.view);
        let accum_bind_group = self.passes.bind(&self.device, &accum.view);

        SurfaceTargets {
            width,
            height,
            stereo: desc.stereo,
            back,
            front,
            scratch,
            accum,
            scratch_bind_group,
            accum_bind_group,
            eye: Eye::Left,
            accumulating: false,
            frames_presented: 0,
        }
    }
}

impl SurfaceTargets {
    fn eye_index(&self, eye: Eye) -> usize {
        match eye {
            Eye::Right if self.stereo => 1,
            _ => 0,
        }
    }

    fn back_buffer(&self) -> &Target {
        &self.back[self.eye_index(self.eye)]
    }

    fn draw_target(&self) -> &Target {
        if self.accumulating {
            &self.scratch
        } else {
            self.back_buffer()
        }
    }
}

impl AccumPasses {
    fn new(device: &wgpu::Device, init: &GpuInit) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("parallax accum shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shaders/accum.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("parallax accum bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: false },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            }],
        });

        let layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("parallax accum pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        // dst += src * constant; the constant is the sample weight.
        let weighted_add = wgpu::BlendComponent {
            src_factor: wgpu::BlendFactor::Constant,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        };

        let accumulate = fullscreen_pipeline(
            device,
            &layout,
            &shader,
            "parallax accumulate pipeline",
            init.accum_format,
            Some(wgpu::BlendState {
                color: weighted_add,
                alpha: weighted_add,
            }),
        );
        let resolve = fullscreen_pipeline(
            device,
            &layout,
            &shader,
            "parallax accum return pipeline",
            init.color_format,
            None,
        );

        Self {
            bind_group_layout,
            accumulate,
            resolve,
        }
    }

    fn bind(&self, device: &wgpu::Device, view: &wgpu::TextureView) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("parallax accum bind group"),
            layout: &self.bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            }],
        })
    }
}

impl GraphicsBackend for WgpuBackend {
    type Context = WgpuContext;

    fn create_context(&mut self, surface: &SurfaceDesc) -> BackendResult<WgpuContext> {
        let (adapter, device, queue) = pollster::block_on(self.request_device())
            .map_err(|e| BackendError::from_anyhow("create_context", e))?;

        let info = adapter.get_info();
        log::info!("context for {} on {} ({:?})", surface.id, info.name, info.backend);

        let passes = AccumPasses::new(&device, &self.init);
        let mut ctx = WgpuContext {
            adapter,
            device,
            queue,
            init: self.init.clone(),
            passes,
            targets: HashMap::new(),
            resources: HashMap::new(),
            encoder: None,
        };
        let targets = ctx.build_targets(surface);
        ctx.targets.insert(surface.id, targets);
        Ok(ctx)
    }

    fn destroy_context(&mut self, mut context: WgpuContext) -> BackendResult<()> {
        context.encoder = None;
        for (_, resource) in context.resources.drain() {
            match resource {
                GpuResource::Texture(t) => t.destroy(),
                GpuResource::DisplayList(b) => b.destroy(),
            }
        }
        context.targets.clear();
        context.device.destroy();
        Ok(())
    }

    fn attach_surface(&mut self, context: &mut WgpuContext, surface: &SurfaceDesc) -> BackendResult<()> {
        let targets = context.build_targets(surface);
        context.targets.insert(surface.id, targets);
        Ok(())
    }

    fn detach_surface(&mut self, context: &mut WgpuContext, surface: SurfaceId) {
        context.targets.remove(&surface);
    }

    fn make_current(&mut self, _context: Option<&mut WgpuContext>) -> BackendResult<()> {
        // wgpu devices are not bound to threads.
        Ok(())
    }

    fn supports_multisample(&self, _context: &WgpuContext) -> bool {
        // Targets are single-sampled; antialiasing goes through accumulation.
        false
    }

    fn create_resource(&mut self, context: &mut WgpuContext, desc: &ResourceDesc) -> BackendResult<ResourceId> {
        let resource = match *desc {
            ResourceDesc::Texture { width, height } => {
                GpuResource::Texture(context.device.create_texture(&wgpu::TextureDescriptor {
                    label: Some("parallax texture"),
                    size: wgpu::Extent3d {
                        width: width.max(1),
                        height: height.max(1),
                        depth_or_array_layers: 1,
                    },
                    mip_level_count: 1,
                    sample_count: 1,
                    dimension: wgpu::TextureDimension::D2,
                    format: wgpu::TextureFormat::Rgba8Unorm,
                    usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                    view_formats: &[],
                }))
            }
            ResourceDesc::DisplayList { size_bytes } => {
                GpuResource::DisplayList(context.device.create_buffer(&wgpu::BufferDescriptor {
                    label: Some("parallax display list"),
                    size: size_bytes.max(4),
                    usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                    mapped_at_creation: false,
                }))
            }
        };

        let id = ResourceId::from_raw(self.next_resource);
        self.next_resource += 1;
        context.resources.insert(id, resource);
        Ok(id)
    }

    fn delete_resource(&mut self, context: &mut WgpuContext, kind: ResourceKind, id: ResourceId) -> BackendResult<()> {
        match context.resources.remove(&id) {
            Some(GpuResource::Texture(t)) if kind == ResourceKind::Texture => t.destroy(),
            Some(GpuResource::DisplayList(b)) if kind == ResourceKind::DisplayList => b.destroy(),
            Some(other) => {
                context.resources.insert(id, other);
                return Err(BackendError::new("delete_resource", format!("{id} is not a {kind:?}")));
            }
            None => return Err(BackendError::new("delete_resource", format!("unknown resource {id}"))),
        }
        Ok(())
    }

    fn resize_target(&mut self, context: &mut WgpuContext, surface: SurfaceId, rect: PixelRect) -> BackendResult<()> {
        let current = context.targets_mut(surface, "resize_target")?;
        let (width, height) = rect.target_size();
        if (current.width, current.height) == (width, height) {
            return Ok(());
        }
        let desc = SurfaceDesc {
            id: surface,
            rect,
            stereo: current.stereo,
            offscreen: true,
        };
        let targets = context.build_targets(&desc);
        context.targets.insert(surface, targets);
        Ok(())
    }

    fn begin_frame(&mut self, context: &mut WgpuContext, surface: SurfaceId) -> BackendResult<()> {
        let targets = context.targets_mut(surface, "begin_frame")?;
        targets.eye = Eye::Left;
        targets.accumulating = false;
        context.open_encoder_split();
        Ok(())
    }

    fn select_eye(&mut self, context: &mut WgpuContext, surface: SurfaceId, eye: Eye) -> BackendResult<()> {
        context.targets_mut(surface, "select_eye")?.eye = eye;
        Ok(())
    }

    fn clear(&mut self, context: &mut WgpuContext, surface: SurfaceId, color: [f32; 4]) -> BackendResult<()> {
        context.targets_mut(surface, "clear")?;
        let [r, g, b, a] = color.map(f64::from);
        let (encoder, targets) = context.open_encoder_split();
        let Some(targets) = targets.get(&surface) else {
            return Ok(());
        };
        clear_pass(encoder, &targets.draw_target().view, wgpu::Color { r, g, b, a });
        Ok(())
    }

    fn accum_clear(&mut self, context: &mut WgpuContext, surface: SurfaceId) -> BackendResult<()> {
        context.targets_mut(surface, "accum_clear")?.accumulating = true;
        let (encoder, targets) = context.open_encoder_split();
        if let Some(targets) = targets.get(&surface) {
            clear_pass(encoder, &targets.accum.view, wgpu::Color::TRANSPARENT);
        }
        Ok(())
    }

    fn accumulate(&mut self, context: &mut WgpuContext, surface: SurfaceId, weight: f32) -> BackendResult<()> {
        context.targets_mut(surface, "accumulate")?;
        let w = f64::from(weight);
        let pipeline = &context.passes.accumulate;
        let Some(encoder) = context.encoder.as_mut() else {
            return Err(BackendError::new("accumulate", "no frame in progress"));
        };
        let Some(targets) = context.targets.get(&surface) else {
            return Ok(());
        };
        let mut rpass = load_pass(encoder, &targets.accum.view, "parallax accumulate pass");
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &targets.scratch_bind_group, &[]);
        rpass.set_blend_constant(wgpu::Color { r: w, g: w, b: w, a: w });
        rpass.draw(0..3, 0..1);
        Ok(())
    }

    fn accum_return(&mut self, context: &mut WgpuContext, surface: SurfaceId) -> BackendResult<()> {
        context.targets_mut(surface, "accum_return")?.accumulating = false;
        let pipeline = &context.passes.resolve;
        let Some(encoder) = context.encoder.as_mut() else {
            return Err(BackendError::new("accum_return", "no frame in progress"));
        };
        let Some(targets) = context.targets.get(&surface) else {
            return Ok(());
        };
        let mut rpass = load_pass(encoder, &targets.back_buffer().view, "parallax accum return pass");
        rpass.set_pipeline(pipeline);
        rpass.set_bind_group(0, &targets.accum_bind_group, &[]);
        rpass.draw(0..3, 0..1);
        Ok(())
    }

    fn end_frame(&mut self, context: &mut WgpuContext, surface: SurfaceId) -> BackendResult<()> {
        context.targets_mut(surface, "end_frame")?.accumulating = false;
        context.submit();
        Ok(())
    }

    fn abort_frame(&mut self, context: &mut WgpuContext, surface: SurfaceId) {
        if let Some(t) = context.targets.get_mut(&surface) {
            t.accumulating = false;
        }
        if context.encoder.take().is_some() {
            log::debug!("{surface}: dropped unsubmitted frame commands");
        }
    }

    fn swap(&mut self, context: &mut WgpuContext, surface: SurfaceId) -> BackendResult<()> {
        context.targets_mut(surface, "swap")?;
        let (encoder, targets) = context.open_encoder_split();
        if let Some(t) = targets.get_mut(&surface) {
            let extent = wgpu::Extent3d {
                width: t.width,
                height: t.height,
                depth_or_array_layers: 1,
            };
            for (back, front) in t.back.iter().zip(&t.front) {
                encoder.copy_texture_to_texture(
                    back.texture.as_image_copy(),
                    front.texture.as_image_copy(),
                    extent,
                );
            }
            t.frames_presented += 1;
        }
        context.submit();
        Ok(())
    }
}

impl WgpuContext {
    /// Opens the frame encoder if needed and returns it alongside the target map.
    fn open_encoder_split(&mut self) -> (&mut wgpu::CommandEncoder, &mut HashMap<SurfaceId, SurfaceTargets>) {
        let Self { encoder, targets, device, .. } = self;
        let encoder = encoder.get_or_insert_with(|| {
            device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("parallax frame encoder"),
            })
        });
        (encoder, targets)
    }
}

fn create_target(
    device: &wgpu::Device,
    label: &'static str,
    width: u32,
    height: u32,
    format: wgpu::TextureFormat,
) -> Target {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT
            | wgpu::TextureUsages::TEXTURE_BINDING
            | wgpu::TextureUsages::COPY_SRC
            | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    Target { texture, view }
}

fn fullscreen_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    label: &'static str,
    format: wgpu::TextureFormat,
    blend: Option<wgpu::BlendState>,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(label),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
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
    })
}

fn clear_pass(encoder: &mut wgpu::CommandEncoder, view: &wgpu::TextureView, color: wgpu::Color) {
    let _ = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some("parallax clear pass"),
        color_attachments: &[Some(wgpu::RenderPassColorAttachment {
            view,
            resolve_target: None,
            ops: wgpu::Operations {
                load: wgpu::LoadOp::Clear(color),
                store: wgpu::StoreOp::Store,
            },
            depth_slice: None,
        })],
        depth_stencil_attachment: None,
        timestamp_writes: None,
        occlusion_query_set: None,
        multiview_mask: None,
    });
}

fn load_pass<'e>(
    encoder: &'e mut wgpu::CommandEncoder,
    view: &wgpu::TextureView,
    label: &'static str,
) -> wgpu::RenderPass<'e> {
    encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
        label: Some(label),
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
    })
}
