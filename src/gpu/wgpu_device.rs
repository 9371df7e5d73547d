// SPDX-License-Identifier: GPL-3.0-only

//! wgpu implementation of [`GpuDevice`]
//!
//! The display surface is an offscreen RGBA texture: windowing belongs to the
//! host, which either presents that texture or reads it back. Every clear and
//! draw is recorded as its own render pass into one encoder per tick and
//! submitted by [`GpuDevice::finish_frame`] (or before a readback).
//!
//! External textures are emulated: latching copies the surface buffer into an
//! RGBA texture of the allocated buffer size, and the buffer's crop transform
//! is applied to texture coordinates like on platforms with true external
//! images.

use super::{
    DrawCall, FramebufferId, GpuDevice, MAX_DRAW_TEXTURES, ProgramId, ProgramSource,
    RenderTarget, ResourceCounts, TextureId, TextureKind,
};
use crate::errors::{RenderError, RenderResult};
use crate::frame::SurfaceBuffer;
use crate::viewport::ViewportRect;
use std::collections::HashMap;
use tracing::{debug, info, warn};
use wgpu::util::DeviceExt;

/// Format of the display surface and every offscreen target
const TARGET_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8Unorm;

const VERTEX_ATTRIBUTES: [wgpu::VertexAttribute; 2] =
    wgpu::vertex_attr_array![0 => Float32x2, 1 => Float32x2];

/// Information about the created GPU device
#[derive(Debug, Clone)]
pub struct GpuDeviceInfo {
    /// Name of the GPU adapter
    pub adapter_name: String,
    /// Backend being used (Vulkan, Metal, DX12, etc.)
    pub backend: wgpu::Backend,
}

/// Create a wgpu device and queue for rendering
pub async fn create_device(
    label: &str,
) -> Result<(wgpu::Device, wgpu::Queue, GpuDeviceInfo), String> {
    info!(label, "Creating GPU device for preview rendering");

    let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
        backends: wgpu::Backends::PRIMARY,
        ..Default::default()
    });

    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: None,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|e| format!("Failed to find suitable GPU adapter: {}", e))?;

    let adapter_info = adapter.get_info();
    info!(
        adapter = %adapter_info.name,
        backend = ?adapter_info.backend,
        "GPU adapter selected"
    );

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some(label),
            required_features: wgpu::Features::empty(),
            required_limits: adapter.limits(),
            memory_hints: wgpu::MemoryHints::Performance,
            ..Default::default()
        })
        .await
        .map_err(|e| format!("Failed to create GPU device: {}", e))?;

    let info = GpuDeviceInfo {
        adapter_name: adapter_info.name.clone(),
        backend: adapter_info.backend,
    };

    Ok((device, queue, info))
}

struct GpuTexture {
    kind: TextureKind,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    /// Set for framebuffer color attachments
    owner: Option<FramebufferId>,
}

struct Framebuffer {
    color: TextureId,
    width: u32,
    height: u32,
}

/// wgpu-backed graphics device with an offscreen display surface
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    info: GpuDeviceInfo,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    /// Bound to texture slots a draw leaves empty
    dummy_view: wgpu::TextureView,
    screen: wgpu::Texture,
    screen_view: wgpu::TextureView,
    screen_size: (u32, u32),
    programs: HashMap<ProgramId, wgpu::RenderPipeline>,
    textures: HashMap<TextureId, GpuTexture>,
    framebuffers: HashMap<FramebufferId, Framebuffer>,
    next_id: u32,
    target: RenderTarget,
    viewport: ViewportRect,
    encoder: Option<wgpu::CommandEncoder>,
}

impl WgpuDevice {
    /// Wrap an existing device and queue with a `width × height` display surface
    pub fn new(
        device: wgpu::Device,
        queue: wgpu::Queue,
        info: GpuDeviceInfo,
        width: u32,
        height: u32,
    ) -> Self {
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Preview Bind Group Layout"),
            entries: &[
                // Uniforms
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
                texture_layout_entry(2),
                texture_layout_entry(3),
                texture_layout_entry(4),
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Preview Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Preview Sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        let dummy = create_wgpu_texture(&device, "Dummy Texture", TARGET_FORMAT, 1, 1, false);
        let dummy_view = dummy.create_view(&wgpu::TextureViewDescriptor::default());

        let width = width.max(1);
        let height = height.max(1);
        let screen = create_wgpu_texture(&device, "Display Surface", TARGET_FORMAT, width, height, true);
        let screen_view = screen.create_view(&wgpu::TextureViewDescriptor::default());

        Self {
            device,
            queue,
            info,
            bind_group_layout,
            pipeline_layout,
            sampler,
            dummy_view,
            screen,
            screen_view,
            screen_size: (width, height),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashMap::new(),
            next_id: 1,
            target: RenderTarget::Screen,
            viewport: ViewportRect::full(width, height),
            encoder: None,
        }
    }

    pub fn info(&self) -> &GpuDeviceInfo {
        &self.info
    }

    fn next_id(&mut self) -> u32 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn take_encoder(&mut self) -> wgpu::CommandEncoder {
        self.encoder.take().unwrap_or_else(|| {
            self.device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Preview Frame Encoder"),
                })
        })
    }

    fn target_size(&self) -> (u32, u32) {
        match self.target {
            RenderTarget::Screen => self.screen_size,
            RenderTarget::Offscreen(fb) => self
                .framebuffers
                .get(&fb)
                .map(|f| (f.width, f.height))
                .unwrap_or((0, 0)),
        }
    }

    fn target_view(&self) -> Option<&wgpu::TextureView> {
        match self.target {
            RenderTarget::Screen => Some(&self.screen_view),
            RenderTarget::Offscreen(fb) => {
                let framebuffer = self.framebuffers.get(&fb)?;
                self.textures.get(&framebuffer.color).map(|t| &t.view)
            }
        }
    }

    /// (Re)allocate a texture's storage if its size changed
    fn ensure_texture_size(&mut self, id: TextureId, width: u32, height: u32) -> RenderResult<()> {
        let texture = self
            .textures
            .get_mut(&id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", id)))?;

        if texture.width == width && texture.height == height {
            return Ok(());
        }

        debug!(?id, width, height, "Reallocating texture");
        let format = texture_format(texture.kind);
        texture.texture = create_wgpu_texture(&self.device, "Frame Texture", format, width, height, false);
        texture.view = texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        texture.width = width;
        texture.height = height;
        Ok(())
    }

    fn upload(&self, id: TextureId, data: &[u8], bytes_per_row: u32) -> RenderResult<()> {
        let texture = self
            .textures
            .get(&id)
            .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", id)))?;

        self.queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &texture.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(bytes_per_row),
                rows_per_image: Some(texture.height),
            },
            wgpu::Extent3d {
                width: texture.width,
                height: texture.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }

    fn record_draw(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        call: &DrawCall<'_>,
    ) -> RenderResult<()> {
        if call.textures.len() > MAX_DRAW_TEXTURES {
            return Err(RenderError::InvalidHandle(format!(
                "{} textures bound, at most {}",
                call.textures.len(),
                MAX_DRAW_TEXTURES
            )));
        }

        let (target_width, target_height) = self.target_size();
        let viewport = clamp_to_target(self.viewport, target_width, target_height);
        if viewport.is_empty() {
            return Ok(());
        }

        let pipeline = self
            .programs
            .get(&call.program)
            .ok_or_else(|| RenderError::InvalidHandle(format!("program {:?}", call.program)))?;

        let mut views = [&self.dummy_view; MAX_DRAW_TEXTURES];
        for (slot, id) in call.textures.iter().enumerate() {
            views[slot] = self
                .textures
                .get(id)
                .map(|t| &t.view)
                .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", id)))?;
        }

        let target_view = self
            .target_view()
            .ok_or_else(|| RenderError::InvalidHandle(format!("target {:?}", self.target)))?;

        let uniform_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Draw Uniforms"),
                contents: bytemuck::bytes_of(&call.uniforms),
                usage: wgpu::BufferUsages::UNIFORM,
            });
        let vertices = call.quad.vertices();
        let vertex_buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Quad Vertices"),
                contents: bytemuck::cast_slice(&vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });

        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Draw Bind Group"),
            layout: &self.bind_group_layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: uniform_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(views[0]),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(views[1]),
                },
                wgpu::BindGroupEntry {
                    binding: 4,
                    resource: wgpu::BindingResource::TextureView(views[2]),
                },
            ],
        });

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Draw Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target_view,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(
            viewport.x as f32,
            viewport.y as f32,
            viewport.width as f32,
            viewport.height as f32,
            0.0,
            1.0,
        );
        pass.set_pipeline(pipeline);
        pass.set_bind_group(0, &bind_group, &[]);
        pass.set_vertex_buffer(0, vertex_buffer.slice(..));
        pass.draw(0..4, 0..1);
        Ok(())
    }

    fn submit(&mut self) {
        if let Some(encoder) = self.encoder.take() {
            self.queue.submit(std::iter::once(encoder.finish()));
        }
    }
}

impl GpuDevice for WgpuDevice {
    fn create_program(&mut self, source: &ProgramSource) -> RenderResult<ProgramId> {
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(source.label.as_ref()),
                source: wgpu::ShaderSource::Wgsl(source.wgsl.clone()),
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ShaderCompileFailed(format!(
                "{}: {}",
                source.label, err
            )));
        }

        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: (4 * std::mem::size_of::<f32>()) as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &VERTEX_ATTRIBUTES,
        }];

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = self
            .device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(source.label.as_ref()),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &module,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &vertex_buffers,
                },
                fragment: Some(wgpu::FragmentState {
                    module: &module,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: TARGET_FORMAT,
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleStrip,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            });
        if let Some(err) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(RenderError::ProgramLinkFailed(format!(
                "{}: {}",
                source.label, err
            )));
        }

        let id = ProgramId(self.next_id());
        debug!(?id, label = %source.label, "Program created");
        self.programs.insert(id, pipeline);
        Ok(id)
    }

    fn delete_program(&mut self, program: ProgramId) {
        if self.programs.remove(&program).is_none() {
            warn!(?program, "Deleting unknown program");
        }
    }

    fn create_texture(
        &mut self,
        kind: TextureKind,
        width: u32,
        height: u32,
    ) -> RenderResult<TextureId> {
        let width = width.max(1);
        let height = height.max(1);
        let texture = create_wgpu_texture(
            &self.device,
            "Frame Texture",
            texture_format(kind),
            width,
            height,
            false,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let id = TextureId(self.next_id());
        self.textures.insert(
            id,
            GpuTexture {
                kind,
                texture,
                view,
                width,
                height,
                owner: None,
            },
        );
        Ok(id)
    }

    fn write_texture(
        &mut self,
        texture: TextureId,
        width: u32,
        height: u32,
        data: &[u8],
    ) -> RenderResult<()> {
        let kind = self
            .textures
            .get(&texture)
            .map(|t| t.kind)
            .ok_or_else(|| RenderError::InvalidHandle(format!("texture {:?}", texture)))?;

        let bytes_per_row = width * kind.bytes_per_pixel() as u32;
        if width == 0 || height == 0 || data.len() < bytes_per_row as usize * height as usize {
            return Err(RenderError::TextureUpdateTransientFailure(format!(
                "{} bytes for {}x{} upload",
                data.len(),
                width,
                height
            )));
        }

        self.ensure_texture_size(texture, width, height)?;
        self.upload(texture, data, bytes_per_row)
    }

    fn latch_surface(&mut self, texture: TextureId, buffer: &SurfaceBuffer) -> RenderResult<()> {
        match self.textures.get(&texture).map(|t| t.kind) {
            Some(TextureKind::External) => {}
            Some(kind) => {
                return Err(RenderError::InvalidHandle(format!(
                    "texture {:?} is {:?}, not external",
                    texture, kind
                )));
            }
            None => return Err(RenderError::InvalidHandle(format!("texture {:?}", texture))),
        }

        self.ensure_texture_size(texture, buffer.buffer_width, buffer.buffer_height)?;
        self.upload(texture, &buffer.data, buffer.buffer_width * 4)
    }

    fn delete_texture(&mut self, texture: TextureId) {
        match self.textures.get(&texture).map(|t| t.owner) {
            Some(Some(owner)) => {
                warn!(?texture, ?owner, "Refusing to delete a framebuffer attachment");
            }
            Some(None) => {
                self.textures.remove(&texture);
            }
            None => warn!(?texture, "Deleting unknown texture"),
        }
    }

    fn create_framebuffer(&mut self, width: u32, height: u32) -> RenderResult<FramebufferId> {
        let max = self.device.limits().max_texture_dimension_2d;
        if width == 0 || height == 0 || width > max || height > max {
            return Err(RenderError::FramebufferIncomplete(format!(
                "{}x{} (max {})",
                width, height, max
            )));
        }

        let texture = create_wgpu_texture(
            &self.device,
            "Offscreen Color Attachment",
            TARGET_FORMAT,
            width,
            height,
            true,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let framebuffer = FramebufferId(self.next_id());
        let color = TextureId(self.next_id());
        self.textures.insert(
            color,
            GpuTexture {
                kind: TextureKind::Rgba,
                texture,
                view,
                width,
                height,
                owner: Some(framebuffer),
            },
        );
        self.framebuffers.insert(
            framebuffer,
            Framebuffer {
                color,
                width,
                height,
            },
        );
        debug!(?framebuffer, width, height, "Framebuffer created");
        Ok(framebuffer)
    }

    fn delete_framebuffer(&mut self, framebuffer: FramebufferId) {
        match self.framebuffers.remove(&framebuffer) {
            Some(fb) => {
                self.textures.remove(&fb.color);
                if self.target == RenderTarget::Offscreen(framebuffer) {
                    self.target = RenderTarget::Screen;
                }
            }
            None => warn!(?framebuffer, "Deleting unknown framebuffer"),
        }
    }

    fn framebuffer_texture(&self, framebuffer: FramebufferId) -> RenderResult<TextureId> {
        self.framebuffers
            .get(&framebuffer)
            .map(|fb| fb.color)
            .ok_or_else(|| RenderError::InvalidHandle(format!("framebuffer {:?}", framebuffer)))
    }

    fn bind_target(&mut self, target: RenderTarget) {
        self.target = target;
    }

    fn set_viewport(&mut self, rect: ViewportRect) {
        self.viewport = rect;
    }

    fn clear(&mut self, color: [f32; 4]) {
        let mut encoder = self.take_encoder();
        if let Some(view) = self.target_view() {
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Clear Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color {
                            r: color[0] as f64,
                            g: color[1] as f64,
                            b: color[2] as f64,
                            a: color[3] as f64,
                        }),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        } else {
            warn!(target = ?self.target, "Clear on a missing target");
        }
        self.encoder = Some(encoder);
    }

    fn draw(&mut self, call: &DrawCall<'_>) -> RenderResult<()> {
        let mut encoder = self.take_encoder();
        let result = self.record_draw(&mut encoder, call);
        self.encoder = Some(encoder);
        result
    }

    fn surface_size(&self) -> (u32, u32) {
        self.screen_size
    }

    fn resize_surface(&mut self, width: u32, height: u32) {
        let width = width.max(1);
        let height = height.max(1);
        if self.screen_size == (width, height) {
            return;
        }

        // Finish anything recorded against the old surface first
        self.submit();
        self.screen = create_wgpu_texture(&self.device, "Display Surface", TARGET_FORMAT, width, height, true);
        self.screen_view = self
            .screen
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.screen_size = (width, height);
        debug!(width, height, "Display surface resized");
    }

    fn finish_frame(&mut self) -> RenderResult<()> {
        self.submit();
        Ok(())
    }

    fn read_pixels(&mut self, rect: ViewportRect) -> RenderResult<Vec<u8>> {
        let (width, height) = self.screen_size;
        if rect.is_empty() || rect.x + rect.width > width || rect.y + rect.height > height {
            return Err(RenderError::ReadbackFailed(format!(
                "rect {} outside {}x{} surface",
                rect, width, height
            )));
        }

        let unpadded_bytes_per_row = rect.width * 4;
        let padded_bytes_per_row = unpadded_bytes_per_row
            .div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size: (padded_bytes_per_row * rect.height) as u64,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self.take_encoder();
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &self.screen,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: rect.x,
                    y: rect.y,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(rect.height),
                },
            },
            wgpu::Extent3d {
                width: rect.width,
                height: rect.height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let padded = pollster::block_on(read_buffer(&self.device, &staging))
            .map_err(RenderError::ReadbackFailed)?;

        // Strip row padding
        let mut rgba = Vec::with_capacity(rect.rgba_len());
        for row in padded.chunks(padded_bytes_per_row as usize).take(rect.height as usize) {
            rgba.extend_from_slice(&row[..unpadded_bytes_per_row as usize]);
        }
        Ok(rgba)
    }

    fn resource_counts(&self) -> ResourceCounts {
        ResourceCounts {
            textures: self.textures.values().filter(|t| t.owner.is_none()).count(),
            programs: self.programs.len(),
            framebuffers: self.framebuffers.len(),
        }
    }
}

fn texture_layout_entry(binding: u32) -> wgpu::BindGroupLayoutEntry {
    wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: true },
            view_dimension: wgpu::TextureViewDimension::D2,
            multisampled: false,
        },
        count: None,
    }
}

fn texture_format(kind: TextureKind) -> wgpu::TextureFormat {
    match kind {
        TextureKind::Luma => wgpu::TextureFormat::R8Unorm,
        TextureKind::External | TextureKind::Rgba => wgpu::TextureFormat::Rgba8Unorm,
    }
}

fn create_wgpu_texture(
    device: &wgpu::Device,
    label: &str,
    format: wgpu::TextureFormat,
    width: u32,
    height: u32,
    render_target: bool,
) -> wgpu::Texture {
    let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
    if render_target {
        usage |= wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
    }

    device.create_texture(&wgpu::TextureDescriptor {
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
        usage,
        view_formats: &[],
    })
}

/// Intersect a viewport with the bound target
fn clamp_to_target(rect: ViewportRect, width: u32, height: u32) -> ViewportRect {
    let x = rect.x.min(width);
    let y = rect.y.min(height);
    ViewportRect::new(
        x,
        y,
        rect.width.min(width - x),
        rect.height.min(height - y),
    )
}

/// Map a buffer for reading and copy its contents out
async fn read_buffer(device: &wgpu::Device, buffer: &wgpu::Buffer) -> Result<Vec<u8>, String> {
    let slice = buffer.slice(..);
    let (sender, receiver) = futures::channel::oneshot::channel();

    slice.map_async(wgpu::MapMode::Read, move |result| {
        let _ = sender.send(result);
    });

    let _ = device.poll(wgpu::PollType::wait_indefinitely());

    receiver
        .await
        .map_err(|_| "Failed to receive buffer mapping".to_string())?
        .map_err(|e| format!("Failed to map buffer: {:?}", e))?;

    let data = slice.get_mapped_range().to_vec();
    buffer.unmap();

    Ok(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clamp_to_target() {
        let rect = clamp_to_target(ViewportRect::new(600, 0, 608, 1080), 1000, 1080);
        assert_eq!(rect, ViewportRect::new(600, 0, 400, 1080));

        let outside = clamp_to_target(ViewportRect::new(2000, 0, 10, 10), 1000, 1000);
        assert!(outside.is_empty());
    }

    #[test]
    fn test_create_device() {
        // Requires a GPU, skipped when none is available
        match pollster::block_on(create_device("test_device")) {
            Ok((device, queue, info)) => {
                assert!(!info.adapter_name.is_empty());
                let mut gpu = WgpuDevice::new(device, queue, info, 64, 32);
                assert_eq!(gpu.surface_size(), (64, 32));
                gpu.clear([1.0, 0.0, 0.0, 1.0]);
                let pixels = gpu.read_pixels(ViewportRect::new(0, 0, 4, 2)).unwrap();
                assert_eq!(pixels.len(), 4 * 2 * 4);
                assert_eq!(&pixels[..4], &[255, 0, 0, 255]);
            }
            Err(e) => println!("Skipping test (no GPU): {}", e),
        }
    }
}
