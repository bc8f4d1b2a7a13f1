//! Multisampled render pipeline.
//!
//! Owns the surface, device, and queue, the 8-sample offscreen color and
//! depth attachments, and the two blend-state pipelines. Every frame the
//! scene is drawn into the multisampled target and resolved into the
//! surface texture for presentation.

use std::sync::Arc;

use crate::scene::LoadError;

use super::camera::CameraFrame;
use super::model::{DrawModel, Model};
use super::texture::TextureResource;
use super::uniforms::{GlobalBindings, GlobalUniform, UniformBuffer};
use super::vertex::Vertex;

/// Sample count of the offscreen target, fixed at construction.
pub const DEFAULT_SAMPLE_COUNT: u32 = 8;

/// Background color, matching the source viewer's 24/24/24 grey.
const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 24.0 / 255.0,
    g: 24.0 / 255.0,
    b: 24.0 / 255.0,
    a: 1.0,
};

/// The two mutually exclusive blend states.
///
/// `Opaque` depth-tests and writes with blending off; `Blended` disables
/// the depth test and blends with src-alpha / one-minus-src-alpha.
/// Transparent geometry is not sorted back-to-front; that inaccuracy is an
/// accepted property of the simple blended mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlendMode {
    Opaque,
    Blended,
}

impl BlendMode {
    pub fn toggled(self) -> Self {
        match self {
            BlendMode::Opaque => BlendMode::Blended,
            BlendMode::Blended => BlendMode::Opaque,
        }
    }
}

/// Bind group layouts created once at engine construction and reused by
/// every model bind; the per-frame path never queries a layout.
pub struct BindLayouts {
    pub transform: wgpu::BindGroupLayout,
    pub material: wgpu::BindGroupLayout,
}

pub struct RenderEngine {
    surface: wgpu::Surface<'static>,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    config: wgpu::SurfaceConfiguration,
    sample_count: u32,

    msaa_target: TextureResource,
    depth_texture: TextureResource,

    globals_ubo: UniformBuffer<GlobalUniform>,
    globals: GlobalBindings,
    layouts: BindLayouts,

    opaque_pipeline: wgpu::RenderPipeline,
    blended_pipeline: wgpu::RenderPipeline,
    blend_mode: BlendMode,
}

impl RenderEngine {
    /// Brings up wgpu for the given window and builds all fixed state:
    /// attachments at the initial size and both blend-state pipelines.
    pub async fn new(
        window: impl Into<wgpu::SurfaceTarget<'static>>,
        width: u32,
        height: u32,
    ) -> Result<RenderEngine, LoadError> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(window)
            .map_err(|err| LoadError::GpuResourceFailure(err.to_string()))?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .map_err(|err| LoadError::GpuResourceFailure(err.to_string()))?;

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("WGPU Device"),
                required_features: wgpu::Features::default(),
                required_limits: wgpu::Limits::default(),
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await
            .map_err(|err| LoadError::GpuResourceFailure(err.to_string()))?;

        let surface_capabilities = surface.get_capabilities(&adapter);
        let format = surface_capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .unwrap_or(surface_capabilities.formats[0]);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode: surface_capabilities.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let sample_count = DEFAULT_SAMPLE_COUNT;
        let msaa_target = TextureResource::create_msaa_target(&device, &config, sample_count);
        let depth_texture = TextureResource::create_depth_texture(&device, &config, sample_count);

        let globals_ubo = UniformBuffer::new(&device, "Globals");
        let globals = GlobalBindings::new(&device, &globals_ubo);

        let transform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Transform Bind Group Layout"),
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
        let material_layout = super::material::create_material_layout(&device);
        let layouts = BindLayouts {
            transform: transform_layout,
            material: material_layout,
        };

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Scene Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("shader.wgsl").into()),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[globals.layout(), &layouts.transform, &layouts.material],
            push_constant_ranges: &[],
        });

        let opaque_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            format,
            sample_count,
            BlendMode::Opaque,
        );
        let blended_pipeline = create_pipeline(
            &device,
            &pipeline_layout,
            &shader,
            format,
            sample_count,
            BlendMode::Blended,
        );

        Ok(RenderEngine {
            surface,
            device: device.into(),
            queue: queue.into(),
            config,
            sample_count,
            msaa_target,
            depth_texture,
            globals_ubo,
            globals,
            layouts,
            opaque_pipeline,
            blended_pipeline,
            blend_mode: BlendMode::Opaque,
        })
    }

    /// Resizes the surface and rebuilds both offscreen attachments at the
    /// new size. The sample count never changes after construction.
    pub fn resize(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.surface.configure(&self.device, &self.config);

        self.msaa_target =
            TextureResource::create_msaa_target(&self.device, &self.config, self.sample_count);
        self.depth_texture =
            TextureResource::create_depth_texture(&self.device, &self.config, self.sample_count);
    }

    pub fn toggle_blend_mode(&mut self) {
        self.blend_mode = self.blend_mode.toggled();
        log::info!("blend mode: {:?}", self.blend_mode);
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.blend_mode
    }

    /// Draws one frame: write the camera's matrices, render the model into
    /// the multisampled target, resolve into the surface, present.
    ///
    /// Surface loss is handled by reconfiguring and skipping the frame;
    /// running out of device memory is fatal and aborts the render loop.
    pub fn render_frame(&mut self, model: &Model, frame: CameraFrame) -> Result<(), LoadError> {
        self.globals_ubo
            .update_content(&self.queue, GlobalUniform::from(frame));

        let surface_texture = match self.surface.get_current_texture() {
            Ok(texture) => texture,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                self.surface.configure(&self.device, &self.config);
                return Ok(());
            }
            Err(wgpu::SurfaceError::Timeout) => return Ok(()),
            Err(err) => {
                return Err(LoadError::GpuResourceFailure(format!(
                    "surface acquisition: {err}"
                )));
            }
        };
        let surface_view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Scene Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &self.msaa_target.view,
                    resolve_target: Some(&surface_view),
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Discard,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture.view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            render_pass.set_pipeline(match self.blend_mode {
                BlendMode::Opaque => &self.opaque_pipeline,
                BlendMode::Blended => &self.blended_pipeline,
            });
            render_pass.set_bind_group(0, self.globals.bind_group(), &[]);
            render_pass.draw_model(model);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    pub fn layouts(&self) -> &BindLayouts {
        &self.layouts
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn sample_count(&self) -> u32 {
        self.sample_count
    }
}

/// Builds one render pipeline for the given blend state. The two states
/// differ only in depth test and color blending; front faces are clockwise
/// and back faces are culled, matching the flattener's preserved winding.
fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::PipelineLayout,
    shader: &wgpu::ShaderModule,
    format: wgpu::TextureFormat,
    sample_count: u32,
    mode: BlendMode,
) -> wgpu::RenderPipeline {
    let (depth_compare, depth_write_enabled, blend) = match mode {
        BlendMode::Opaque => (wgpu::CompareFunction::Less, true, None),
        BlendMode::Blended => (
            wgpu::CompareFunction::Always,
            false,
            Some(wgpu::BlendState::ALPHA_BLENDING),
        ),
    };

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some(match mode {
            BlendMode::Opaque => "Opaque Pipeline",
            BlendMode::Blended => "Blended Pipeline",
        }),
        layout: Some(layout),
        vertex: wgpu::VertexState {
            module: shader,
            entry_point: Some("vs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            buffers: &[Vertex::desc()],
        },
        fragment: Some(wgpu::FragmentState {
            module: shader,
            entry_point: Some("fs_main"),
            compilation_options: wgpu::PipelineCompilationOptions::default(),
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend,
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Cw,
            cull_mode: Some(wgpu::Face::Back),
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: Some(wgpu::DepthStencilState {
            format: TextureResource::DEPTH_FORMAT,
            depth_write_enabled,
            depth_compare,
            stencil: wgpu::StencilState::default(),
            bias: wgpu::DepthBiasState::default(),
        }),
        multisample: wgpu::MultisampleState {
            count: sample_count,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
        cache: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn toggling_blend_mode_twice_is_identity() {
        let mode = BlendMode::Opaque;
        assert_eq!(mode.toggled(), BlendMode::Blended);
        assert_eq!(mode.toggled().toggled(), mode);
    }
}
