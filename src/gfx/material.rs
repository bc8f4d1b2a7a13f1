//! Material uniform layout and bind group plumbing.
//!
//! Each material occupies bind group 2: one Phong uniform block plus a
//! texture view and sampler. Materials without an image bind the shared
//! white placeholder and set `has_texture` to 0.

use crate::scene::ResolvedMaterial;

use super::texture::TextureResource;
use super::uniforms::UniformBuffer;

/// GPU uniform block for a material. Must match `MaterialData` in
/// `shader.wgsl` exactly; colors are padded to vec4 for uniform alignment.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MaterialUniform {
    pub ambient: [f32; 4],
    pub diffuse: [f32; 4],
    pub specular: [f32; 4],
    pub shininess: f32,
    pub has_texture: u32,
    _padding: [f32; 2],
}

impl MaterialUniform {
    pub fn new(material: &ResolvedMaterial) -> Self {
        Self {
            ambient: pad(material.ambient),
            diffuse: pad(material.diffuse),
            specular: pad(material.specular),
            shininess: material.shininess,
            has_texture: material.texture.is_some() as u32,
            _padding: [0.0; 2],
        }
    }
}

fn pad(color: [f32; 3]) -> [f32; 4] {
    [color[0], color[1], color[2], 1.0]
}

/// Creates the bind group layout every material shares: uniform block at
/// binding 0, texture at 1, sampler at 2, all fragment-stage.
pub fn create_material_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Material Bind Group Layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
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
                ty: wgpu::BindingType::Texture {
                    multisampled: false,
                    view_dimension: wgpu::TextureViewDimension::D2,
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 2,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

/// Builds one material's bind group against the shared layout.
pub fn create_material_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    ubo: &UniformBuffer<MaterialUniform>,
    texture: &TextureResource,
    label: &str,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some(label),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: ubo.binding_resource(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&texture.view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::Sampler(&texture.sampler),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_flags_texture_presence() {
        let mut material = ResolvedMaterial {
            name: "m".to_string(),
            ambient: [0.1, 0.2, 0.3],
            diffuse: [0.4, 0.5, 0.6],
            specular: [0.7, 0.8, 0.9],
            shininess: 16.0,
            texture: None,
        };
        let uniform = MaterialUniform::new(&material);
        assert_eq!(uniform.has_texture, 0);
        assert_eq!(uniform.ambient, [0.1, 0.2, 0.3, 1.0]);
        assert_eq!(uniform.shininess, 16.0);

        material.texture = Some(crate::scene::TextureImage {
            width: 1,
            height: 1,
            rgba: vec![255; 4],
        });
        assert_eq!(MaterialUniform::new(&material).has_texture, 1);
    }
}
