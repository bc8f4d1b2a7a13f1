//! GPU resource binding for a loaded model.
//!
//! [`Model`] owns the CPU-side meshes and materials from the loader and the
//! GPU handles derived from them. Upload is split into three steps with
//! separate failure domains, run once each after load:
//!
//! 1. [`Model::create_buffers`] - vertex/index buffers and per-part
//!    transform uniforms.
//! 2. [`Model::load_textures`] - material textures (or the shared white
//!    placeholder).
//! 3. [`Model::bind`] - bind groups against the engine's cached layouts, so
//!    rendering never queries a layout again.
//!
//! Allocation failures surface as [`LoadError::GpuResourceFailure`] through
//! wgpu error scopes and abort the load; no partially-bound model is handed
//! to the render loop.

use wgpu::util::DeviceExt;

use crate::scene::{LoadError, LoadedModel, ModelPart, ResolvedMaterial};

use super::material::{create_material_bind_group, MaterialUniform};
use super::render_engine::BindLayouts;
use super::texture::TextureResource;
use super::uniforms::UniformBuffer;
use super::vertex::Vertex;

struct MeshGpu {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

pub struct Model {
    meshes: Vec<crate::scene::FlatMesh>,
    materials: Vec<ResolvedMaterial>,
    parts: Vec<ModelPart>,

    mesh_gpu: Vec<MeshGpu>,
    part_transforms: Vec<wgpu::Buffer>,
    textures: Vec<Option<TextureResource>>,
    placeholder: Option<TextureResource>,
    material_ubos: Vec<UniformBuffer<MaterialUniform>>,
    material_groups: Vec<wgpu::BindGroup>,
    part_groups: Vec<wgpu::BindGroup>,
}

impl Model {
    pub fn new(loaded: LoadedModel) -> Self {
        Self {
            meshes: loaded.meshes,
            materials: loaded.materials,
            parts: loaded.parts,
            mesh_gpu: Vec::new(),
            part_transforms: Vec::new(),
            textures: Vec::new(),
            placeholder: None,
            material_ubos: Vec::new(),
            material_groups: Vec::new(),
            part_groups: Vec::new(),
        }
    }

    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Uploads every flat mesh verbatim into vertex/index buffers and
    /// creates the per-part transform uniforms. Intended to be called once
    /// per model; a second call replaces the previous set (the old handles
    /// are released when dropped).
    pub fn create_buffers(&mut self, device: &wgpu::Device) -> Result<(), LoadError> {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        self.mesh_gpu.clear();
        for (index, mesh) in self.meshes.iter().enumerate() {
            let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Vertex Buffer {index}")),
                contents: bytemuck::cast_slice(&mesh.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(&format!("Index Buffer {index}")),
                contents: bytemuck::cast_slice(&mesh.indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            self.mesh_gpu.push(MeshGpu {
                vertex_buffer,
                index_buffer,
                index_count: mesh.indices.len() as u32,
            });
        }

        self.part_transforms.clear();
        for (index, part) in self.parts.iter().enumerate() {
            let transform: [[f32; 4]; 4] = part.transform.into();
            self.part_transforms
                .push(device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some(&format!("Part Transform {index}")),
                    contents: bytemuck::cast_slice(&transform),
                    usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                }));
        }

        check_error_scope(device, "model buffer creation")
    }

    /// Uploads each material's decoded image; materials without one share a
    /// 1x1 white placeholder so every material bind group has a texture.
    pub fn load_textures(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
    ) -> Result<(), LoadError> {
        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        self.textures.clear();
        for material in &self.materials {
            self.textures.push(material.texture.as_ref().map(|image| {
                TextureResource::from_image(device, queue, image, &material.name)
            }));
        }
        if self.textures.iter().any(Option::is_none) {
            self.placeholder = Some(TextureResource::white_placeholder(device, queue));
        }

        check_error_scope(device, "texture upload")
    }

    /// Builds the material and per-part bind groups against the engine's
    /// layouts. Requires `create_buffers` and `load_textures` to have run.
    pub fn bind(&mut self, device: &wgpu::Device, layouts: &BindLayouts) -> Result<(), LoadError> {
        assert_eq!(
            self.mesh_gpu.len(),
            self.meshes.len(),
            "create_buffers must run before bind"
        );
        assert_eq!(
            self.textures.len(),
            self.materials.len(),
            "load_textures must run before bind"
        );

        device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);

        self.material_ubos.clear();
        self.material_groups.clear();
        for (index, material) in self.materials.iter().enumerate() {
            let ubo = UniformBuffer::new_with_data(
                device,
                &format!("Material Uniform `{}`", material.name),
                &MaterialUniform::new(material),
            );
            let texture = self.textures[index]
                .as_ref()
                .or(self.placeholder.as_ref())
                .expect("placeholder texture missing for untextured material");
            self.material_groups.push(create_material_bind_group(
                device,
                &layouts.material,
                &ubo,
                texture,
                &material.name,
            ));
            self.material_ubos.push(ubo);
        }

        self.part_groups.clear();
        for (index, buffer) in self.part_transforms.iter().enumerate() {
            self.part_groups
                .push(device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some(&format!("Part Bind Group {index}")),
                    layout: &layouts.transform,
                    entries: &[wgpu::BindGroupEntry {
                        binding: 0,
                        resource: buffer.as_entire_binding(),
                    }],
                }));
        }

        check_error_scope(device, "bind group creation")
    }
}

fn check_error_scope(device: &wgpu::Device, stage: &str) -> Result<(), LoadError> {
    match pollster::block_on(device.pop_error_scope()) {
        Some(error) => Err(LoadError::GpuResourceFailure(format!("{stage}: {error}"))),
        None => Ok(()),
    }
}

/// Render-pass extension issuing one indexed draw per model part.
pub trait DrawModel<'a> {
    fn draw_model(&mut self, model: &'a Model);
}

impl<'a, 'b> DrawModel<'b> for wgpu::RenderPass<'a>
where
    'b: 'a,
{
    fn draw_model(&mut self, model: &'b Model) {
        for (index, part) in model.parts.iter().enumerate() {
            // Nothing to draw until the model is fully bound.
            let (Some(mesh), Some(part_group), Some(material_group)) = (
                model.mesh_gpu.get(part.mesh as usize),
                model.part_groups.get(index),
                model.material_groups.get(part.material as usize),
            ) else {
                return;
            };

            self.set_bind_group(1, part_group, &[]);
            self.set_bind_group(2, material_group, &[]);
            self.set_vertex_buffer(0, mesh.vertex_buffer.slice(..));
            self.set_index_buffer(mesh.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
            self.draw_indexed(0..mesh.index_count, 0, 0..1);
        }
    }
}
