//! GPU resource ownership and draw submission.
//!
//! Every device resource lives here, keyed by opaque handles; nothing else
//! in the crate touches a GPU object except through the upload/destroy
//! contract of this type.

use std::collections::HashMap;
use std::num::NonZeroU64;
use std::sync::Arc;

use log::{info, warn};
use wgpu::util::DeviceExt;
use winit::window::Window;

use crate::geometry::GeometryBuffer;
use crate::texture::{PixelFormat, Texture};

use super::error::RenderError;
use super::shader::{validate_wgsl, ShaderProgram};
use super::shaders::composer;
use super::uniforms::{UniformBinder, UniformLayout, UniformSet, BLOCK_BINDING, SAMPLER_BINDING};
use super::{GeometryHandle, ProgramHandle, TextureHandle};

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.03,
    g: 0.03,
    b: 0.05,
    a: 1.0,
};

/// Owns the device, queue, swapchain, and every uploaded resource.
pub struct GraphicsContext {
    window: Option<Arc<Window>>,
    surface: Option<wgpu::Surface<'static>>,
    config: Option<wgpu::SurfaceConfiguration>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    depth: Option<DepthBuffer>,
    sampler: wgpu::Sampler,
    geometries: HashMap<u64, GeometryRecord>,
    programs: HashMap<u64, ProgramRecord>,
    textures: HashMap<u64, TextureRecord>,
    next_id: u64,
    viewport: Option<[f32; 4]>,
    offscreen: Option<TextureHandle>,
    frame: Option<FrameState>,
}

struct GeometryRecord {
    vertex: wgpu::Buffer,
    index: wgpu::Buffer,
    index_count: u32,
}

struct TextureRecord {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
    format: PixelFormat,
    renderable: bool,
}

struct ProgramRecord {
    label: String,
    vs_module: wgpu::ShaderModule,
    fs_module: wgpu::ShaderModule,
    layout: UniformLayout,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    pipelines: HashMap<(wgpu::TextureFormat, bool), wgpu::RenderPipeline>,
}

struct FrameState {
    surface_texture: wgpu::SurfaceTexture,
    view: wgpu::TextureView,
}

impl GraphicsContext {
    /// Initializes the GPU for the provided window.
    pub async fn new(window: Arc<Window>) -> Result<Self, RenderError> {
        let size = window.inner_size();
        if size.width == 0 || size.height == 0 {
            return Err(RenderError::Surface("window has zero area".to_string()));
        }

        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let surface = instance
            .create_surface(Arc::clone(&window))
            .map_err(|err| RenderError::Surface(err.to_string()))?;

        let (device, queue, adapter) = request_device(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .find(|format| format.is_srgb())
            .copied()
            .unwrap_or(surface_caps.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width,
            height: size.height,
            present_mode: wgpu::PresentMode::Fifo,
            desired_maximum_frame_latency: 2,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        let depth = DepthBuffer::create(&device, size.width, size.height);
        let sampler = create_sampler(&device);

        info!(
            "initialized {}x{} surface ({:?})",
            size.width, size.height, surface_format
        );

        Ok(Self {
            window: Some(window),
            surface: Some(surface),
            config: Some(config),
            device,
            queue,
            depth: Some(depth),
            sampler,
            geometries: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
            viewport: None,
            offscreen: None,
            frame: None,
        })
    }

    /// Initializes the GPU without a window; draws target offscreen
    /// textures only.
    pub async fn headless() -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor::default());
        let (device, queue, _adapter) = request_device(&instance, None).await?;
        let sampler = create_sampler(&device);
        Ok(Self {
            window: None,
            surface: None,
            config: None,
            device,
            queue,
            depth: None,
            sampler,
            geometries: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            next_id: 1,
            viewport: None,
            offscreen: None,
            frame: None,
        })
    }

    pub fn window(&self) -> Option<&Window> {
        self.window.as_deref()
    }

    /// Aspect ratio of the surface, 1.0 for headless contexts.
    pub fn surface_aspect(&self) -> f32 {
        match &self.config {
            Some(config) if config.height > 0 => config.width as f32 / config.height as f32,
            _ => 1.0,
        }
    }

    /// Reconfigures the swapchain and depth buffer after a window resize.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let (Some(surface), Some(config)) = (&self.surface, &mut self.config) {
            config.width = width;
            config.height = height;
            surface.configure(&self.device, config);
            self.depth = Some(DepthBuffer::create(&self.device, width, height));
        }
    }

    fn next_handle(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Allocates device buffers for the geometry and records them under a
    /// new handle.
    pub fn upload_geometry(&mut self, geometry: &GeometryBuffer) -> GeometryHandle {
        let vertex = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("geometry-vertices"),
                contents: bytemuck::cast_slice(&geometry.interleaved()),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let index = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("geometry-indices"),
                contents: bytemuck::cast_slice(geometry.indices()),
                usage: wgpu::BufferUsages::INDEX,
            });
        let id = self.next_handle();
        self.geometries.insert(
            id,
            GeometryRecord {
                vertex,
                index,
                index_count: geometry.indices().len() as u32,
            },
        );
        GeometryHandle(id)
    }

    pub fn destroy_geometry(&mut self, handle: GeometryHandle) {
        if self.geometries.remove(&handle.0).is_none() {
            warn!("destroy_geometry called with a stale handle");
        }
    }

    /// Composes, validates, and compiles both stages of a program.
    ///
    /// Compilation failures are fatal and carry the compiler diagnostic;
    /// nothing is retried.
    pub fn compile_program(&mut self, program: &ShaderProgram) -> Result<ProgramHandle, RenderError> {
        let composer = composer();
        let vs_source = composer.compose(program.label(), program.vertex_source(), program.defines())?;
        validate_wgsl(program.label(), &vs_source)?;
        let fs_source =
            composer.compose(program.label(), program.fragment_source(), program.defines())?;
        validate_wgsl(program.label(), &fs_source)?;

        let vs_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{}-vs", program.label())),
                source: wgpu::ShaderSource::Wgsl(vs_source.into()),
            });
        let fs_module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(&format!("{}-fs", program.label())),
                source: wgpu::ShaderSource::Wgsl(fs_source.into()),
            });

        let layout = program.layout().clone();
        let mut entries = Vec::new();
        if layout.has_block() {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: BLOCK_BINDING,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: NonZeroU64::new(layout.block_size() as u64),
                },
                count: None,
            });
        }
        if layout.texture_count() > 0 {
            entries.push(wgpu::BindGroupLayoutEntry {
                binding: SAMPLER_BINDING,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            });
            for binding in layout.texture_bindings() {
                entries.push(wgpu::BindGroupLayoutEntry {
                    binding,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: wgpu::TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                });
            }
        }

        let bind_group_layout =
            self.device
                .create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                    label: Some(&format!("{}-bind-layout", program.label())),
                    entries: &entries,
                });
        let pipeline_layout = self
            .device
            .create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some(&format!("{}-pipeline-layout", program.label())),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let id = self.next_handle();
        self.programs.insert(
            id,
            ProgramRecord {
                label: program.label().to_string(),
                vs_module,
                fs_module,
                layout,
                bind_group_layout,
                pipeline_layout,
                pipelines: HashMap::new(),
            },
        );
        Ok(ProgramHandle(id))
    }

    pub fn destroy_program(&mut self, handle: ProgramHandle) {
        if self.programs.remove(&handle.0).is_none() {
            warn!("destroy_program called with a stale handle");
        }
    }

    /// Transfers host pixels to a new device texture.
    pub fn upload_texture(&mut self, texture: &Texture) -> TextureHandle {
        let record = self.create_texture_record(texture);
        let id = self.next_handle();
        self.textures.insert(id, record);
        TextureHandle(id)
    }

    /// Re-uploads host pixels into an existing device texture.
    ///
    /// Matching dimensions update the device object in place; a size or
    /// format change replaces it under the same handle, never leaking a
    /// duplicate.
    pub fn update_texture(
        &mut self,
        handle: TextureHandle,
        texture: &Texture,
    ) -> Result<(), RenderError> {
        let matches = self
            .textures
            .get(&handle.0)
            .map(|record| {
                record.width == texture.width()
                    && record.height == texture.height()
                    && record.format == texture.format()
            })
            .ok_or(RenderError::UnknownHandle("texture"))?;
        if matches {
            let record = &self.textures[&handle.0];
            write_texture_pixels(&self.queue, &record.texture, texture);
        } else {
            let record = self.create_texture_record(texture);
            self.textures.insert(handle.0, record);
        }
        Ok(())
    }

    fn create_texture_record(&self, texture: &Texture) -> TextureRecord {
        let format = device_format(texture.format());
        let renderable = matches!(
            texture.format(),
            PixelFormat::Rgba8 | PixelFormat::Rgbm8
        );
        let mut usage = wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST;
        if renderable {
            usage |= wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC;
        }
        let device_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("uploaded-texture"),
            size: wgpu::Extent3d {
                width: texture.width(),
                height: texture.height(),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage,
            view_formats: &[],
        });
        write_texture_pixels(&self.queue, &device_texture, texture);
        let view = device_texture.create_view(&wgpu::TextureViewDescriptor::default());
        TextureRecord {
            texture: device_texture,
            view,
            width: texture.width(),
            height: texture.height(),
            format: texture.format(),
            renderable,
        }
    }

    /// Allocates an offscreen color target without host data.
    pub fn create_render_target(&mut self, width: u32, height: u32) -> TextureHandle {
        let device_texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("render-target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let view = device_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let id = self.next_handle();
        self.textures.insert(
            id,
            TextureRecord {
                texture: device_texture,
                view,
                width: width.max(1),
                height: height.max(1),
                format: PixelFormat::Rgba8,
                renderable: true,
            },
        );
        TextureHandle(id)
    }

    pub fn destroy_texture(&mut self, handle: TextureHandle) {
        if self.textures.remove(&handle.0).is_none() {
            warn!("destroy_texture called with a stale handle");
        }
    }

    /// Runs `f` with the texture attached as the render target, restoring
    /// the default target and window viewport on every exit path.
    pub fn with_render_target<T>(
        &mut self,
        target: TextureHandle,
        f: impl FnOnce(&mut Self) -> Result<T, RenderError>,
    ) -> Result<T, RenderError> {
        {
            let record = self
                .textures
                .get(&target.0)
                .ok_or(RenderError::UnknownHandle("texture"))?;
            if !record.renderable {
                return Err(RenderError::IncompleteTarget(
                    "texture format cannot be a color attachment".to_string(),
                ));
            }
        }
        self.offscreen = Some(target);
        let result = f(self);
        self.offscreen = None;
        self.viewport = None;
        result
    }

    /// Restricts rasterization to a sub-rectangle of the current target.
    pub fn set_viewport(&mut self, x: u32, y: u32, width: u32, height: u32) {
        self.viewport = Some([x as f32, y as f32, width as f32, height as f32]);
    }

    /// Restores the full-target viewport.
    pub fn reset_viewport(&mut self) {
        self.viewport = None;
    }

    /// Acquires the next swapchain frame; draws land on it until
    /// [`Self::end_frame`]. Headless contexts never have a frame to give.
    pub fn begin_frame(&mut self) -> Result<(), wgpu::SurfaceError> {
        let surface = self.surface.as_ref().ok_or(wgpu::SurfaceError::Lost)?;
        let surface_texture = surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.frame = Some(FrameState {
            surface_texture,
            view,
        });
        Ok(())
    }

    pub fn end_frame(&mut self) {
        if let Some(frame) = self.frame.take() {
            frame.surface_texture.present();
        }
    }

    fn current_target(&self) -> Result<(wgpu::TextureView, wgpu::TextureFormat, bool), RenderError> {
        if let Some(target) = self.offscreen {
            let record = self
                .textures
                .get(&target.0)
                .ok_or(RenderError::UnknownHandle("texture"))?;
            return Ok((record.view.clone(), wgpu::TextureFormat::Rgba8Unorm, false));
        }
        match (&self.frame, &self.config) {
            (Some(frame), Some(config)) => Ok((frame.view.clone(), config.format, true)),
            _ => Err(RenderError::NoTarget),
        }
    }

    /// Clears the current target (and depth when rendering to the surface).
    pub fn clear(&mut self) -> Result<(), RenderError> {
        let (view, _format, use_depth) = self.current_target()?;
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("clear-encoder"),
            });
        {
            let depth_attachment = self.depth.as_ref().filter(|_| use_depth).map(|depth| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            });
            let _pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("clear-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Binds the program variant for the current target, packs the uniform
    /// set, and issues one indexed draw.
    pub fn draw(
        &mut self,
        geometry: GeometryHandle,
        program: ProgramHandle,
        uniforms: &UniformSet,
    ) -> Result<(), RenderError> {
        let (target_view, target_format, use_depth) = self.current_target()?;

        let (block_bytes, texture_views, label) = {
            let record = self
                .programs
                .get(&program.0)
                .ok_or(RenderError::UnknownHandle("program"))?;
            let binder = UniformBinder::new(&record.layout, &record.label);
            let block_bytes = binder.pack(uniforms)?;
            let mut texture_views = Vec::new();
            for (binding, handle) in binder.textures(uniforms)? {
                let texture = self
                    .textures
                    .get(&handle.0)
                    .ok_or(RenderError::UnknownHandle("texture"))?;
                texture_views.push((binding, texture.view.clone()));
            }
            (block_bytes, texture_views, record.label.clone())
        };

        let block_buffer = (!block_bytes.is_empty()).then(|| {
            self.device
                .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("{label}-uniforms")),
                    contents: &block_bytes,
                    usage: wgpu::BufferUsages::UNIFORM,
                })
        });

        let record = self
            .programs
            .get_mut(&program.0)
            .ok_or(RenderError::UnknownHandle("program"))?;

        let mut entries = Vec::new();
        if let Some(buffer) = &block_buffer {
            entries.push(wgpu::BindGroupEntry {
                binding: BLOCK_BINDING,
                resource: buffer.as_entire_binding(),
            });
        }
        if !texture_views.is_empty() {
            entries.push(wgpu::BindGroupEntry {
                binding: SAMPLER_BINDING,
                resource: wgpu::BindingResource::Sampler(&self.sampler),
            });
            for (binding, view) in &texture_views {
                entries.push(wgpu::BindGroupEntry {
                    binding: *binding,
                    resource: wgpu::BindingResource::TextureView(view),
                });
            }
        }
        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!("{label}-bind-group")),
            layout: &record.bind_group_layout,
            entries: &entries,
        });

        let pipeline_key = (target_format, use_depth);
        if !record.pipelines.contains_key(&pipeline_key) {
            let pipeline = create_pipeline(
                &self.device,
                &record.label,
                &record.pipeline_layout,
                &record.vs_module,
                &record.fs_module,
                target_format,
                use_depth,
            );
            record.pipelines.insert(pipeline_key, pipeline);
        }
        let pipeline = &record.pipelines[&pipeline_key];

        let geometry_record = self
            .geometries
            .get(&geometry.0)
            .ok_or(RenderError::UnknownHandle("geometry"))?;

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("draw-encoder"),
            });
        {
            let depth_attachment = self.depth.as_ref().filter(|_| use_depth).map(|depth| {
                wgpu::RenderPassDepthStencilAttachment {
                    view: &depth.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }
            });
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("draw-pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &target_view,
                    depth_slice: None,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: depth_attachment,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            if let Some([x, y, w, h]) = self.viewport {
                pass.set_viewport(x, y, w, h, 0.0, 1.0);
            }
            pass.set_pipeline(pipeline);
            pass.set_bind_group(0, &bind_group, &[]);
            pass.set_vertex_buffer(0, geometry_record.vertex.slice(..));
            pass.set_index_buffer(geometry_record.index.slice(..), wgpu::IndexFormat::Uint32);
            pass.draw_indexed(0..geometry_record.index_count, 0, 0..1);
        }
        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }

    /// Whether the texture is attached-and-sized for rendering/readback.
    pub fn is_target_complete(&self, target: TextureHandle) -> bool {
        self.textures
            .get(&target.0)
            .map(|record| record.renderable && record.width > 0 && record.height > 0)
            .unwrap_or(false)
    }

    /// Blocking readback of an offscreen target into tight RGBA bytes.
    ///
    /// The target must report complete before any readback; incomplete
    /// targets are reported, not crashed on.
    pub fn read_pixels(&mut self, target: TextureHandle) -> Result<Vec<u8>, RenderError> {
        if !self.is_target_complete(target) {
            return Err(RenderError::IncompleteTarget(
                "readback requires a complete render target".to_string(),
            ));
        }
        let record = self
            .textures
            .get(&target.0)
            .ok_or(RenderError::UnknownHandle("texture"))?;
        let (width, height) = (record.width, record.height);
        let bytes_per_pixel = 4usize;

        let tight_bpr = bytes_per_pixel * width as usize;
        let padded_bpr = align_copy_row(tight_bpr);
        let buffer_size = (padded_bpr * height as usize) as wgpu::BufferAddress;

        let staging = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("readback-staging"),
            size: buffer_size,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("readback-encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &record.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bpr as u32),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::PollType::wait_indefinitely());
        rx.recv()
            .map_err(|err| RenderError::Readback(err.to_string()))?
            .map_err(|err| RenderError::Readback(err.to_string()))?;

        let data = slice.get_mapped_range();
        let mut tight = vec![0u8; tight_bpr * height as usize];
        for row in 0..height as usize {
            let src = row * padded_bpr;
            let dst = row * tight_bpr;
            tight[dst..dst + tight_bpr].copy_from_slice(&data[src..src + tight_bpr]);
        }
        drop(data);
        staging.unmap();

        Ok(tight)
    }
}

async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'static>>,
) -> Result<(wgpu::Device, wgpu::Queue, wgpu::Adapter), RenderError> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .map_err(|err| RenderError::NoAdapter(err.to_string()))?;

    let (device, queue) = adapter
        .request_device(&wgpu::DeviceDescriptor {
            label: Some("pbr-viewer-device"),
            ..Default::default()
        })
        .await
        .map_err(|err| RenderError::RequestDevice(err.to_string()))?;
    Ok((device, queue, adapter))
}

fn create_sampler(device: &wgpu::Device) -> wgpu::Sampler {
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("shared-sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: wgpu::FilterMode::Linear,
        min_filter: wgpu::FilterMode::Linear,
        mipmap_filter: wgpu::FilterMode::Nearest,
        ..Default::default()
    })
}

fn device_format(format: PixelFormat) -> wgpu::TextureFormat {
    match format {
        PixelFormat::Rgba8 | PixelFormat::Rgbm8 => wgpu::TextureFormat::Rgba8Unorm,
        PixelFormat::Rgba8Srgb => wgpu::TextureFormat::Rgba8UnormSrgb,
        PixelFormat::RgbaF32 => wgpu::TextureFormat::Rgba32Float,
    }
}

fn write_texture_pixels(queue: &wgpu::Queue, device_texture: &wgpu::Texture, texture: &Texture) {
    let bytes_per_row = texture.width() * texture.format().bytes_per_pixel() as u32;
    queue.write_texture(
        wgpu::TexelCopyTextureInfo {
            texture: device_texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        texture.pixels(),
        wgpu::TexelCopyBufferLayout {
            offset: 0,
            bytes_per_row: Some(bytes_per_row),
            rows_per_image: Some(texture.height()),
        },
        wgpu::Extent3d {
            width: texture.width(),
            height: texture.height(),
            depth_or_array_layers: 1,
        },
    );
}

fn align_copy_row(bytes: usize) -> usize {
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT as usize;
    bytes.div_ceil(align) * align
}

fn create_pipeline(
    device: &wgpu::Device,
    label: &str,
    layout: &wgpu::PipelineLayout,
    vs_module: &wgpu::ShaderModule,
    fs_module: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    use_depth: bool,
) -> wgpu::RenderPipeline {
    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(&format!("{label}-pipeline")),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: vs_module,
            entry_point: Some("vs_main"),
            compilation_options: Default::default(),
            buffers: &[wgpu::VertexBufferLayout {
                array_stride: (8 * std::mem::size_of::<f32>()) as u64,
                step_mode: wgpu::VertexStepMode::Vertex,
                attributes: &[
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: 0,
                        shader_location: 0,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x3,
                        offset: (3 * std::mem::size_of::<f32>()) as u64,
                        shader_location: 1,
                    },
                    wgpu::VertexAttribute {
                        format: wgpu::VertexFormat::Float32x2,
                        offset: (6 * std::mem::size_of::<f32>()) as u64,
                        shader_location: 2,
                    },
                ],
            }],
        },
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: Some(wgpu::Face::Back),
            polygon_mode: wgpu::PolygonMode::Fill,
            ..Default::default()
        },
        depth_stencil: use_depth.then(|| wgpu::DepthStencilState {
            format: DepthBuffer::FORMAT,
            depth_write_enabled: true,
            depth_compare: wgpu::CompareFunction::Less,
            stencil: Default::default(),
            bias: Default::default(),
        }),
        multisample: wgpu::MultisampleState::default(),
        fragment: Some(wgpu::FragmentState {
            module: fs_module,
            entry_point: Some("fs_main"),
            compilation_options: Default::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: None,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        multiview: None,
        cache: None,
    })
}

struct DepthBuffer {
    _texture: wgpu::Texture,
    view: wgpu::TextureView,
}

impl DepthBuffer {
    const FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn create(device: &wgpu::Device, width: u32, height: u32) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth-texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: Self::FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            _texture: texture,
            view,
        }
    }
}
