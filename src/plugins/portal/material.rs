use bevy::{
    prelude::*,
    reflect::TypeUuid,
    render::render_resource::{AsBindGroup, ShaderRef},
};

/// Surface material for an open portal. The texture slot receives the
/// portal's render target; the shader samples it in screen space so the
/// image lines up with the main view.
///
/// Rendered double-sided: portals are visible from both sides, and mirror
/// views arrive with reversed winding.
#[derive(AsBindGroup, Debug, Clone, TypeUuid, Reflect)]
#[uuid = "7c3f2a16-9b5d-4e21-a0c8-55e1d26fb1aa"]
pub struct PortalMaterial {
    #[texture(0)]
    #[sampler(1)]
    pub texture: Handle<Image>,
}

impl Material for PortalMaterial {
    fn fragment_shader() -> ShaderRef {
        "shaders/portal.wgsl".into()
    }

    fn specialize(
        _pipeline: &bevy::pbr::MaterialPipeline<Self>,
        descriptor: &mut bevy::render::render_resource::RenderPipelineDescriptor,
        _layout: &bevy::render::mesh::MeshVertexBufferLayout,
        _key: bevy::pbr::MaterialPipelineKey<Self>,
    ) -> Result<(), bevy::render::render_resource::SpecializedMeshPipelineError> {
        descriptor.primitive.cull_mode = None;
        Ok(())
    }
}
