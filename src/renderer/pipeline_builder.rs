// src/renderer/pipeline_builder.rs
use super::internal::pipeline::PipelineSpec;

const VERTEX_ENTRY: &str = "vs_main";
const FRAGMENT_ENTRY: &str = "fs_main";

/// Turns a [`PipelineSpec`] into the fixed-function state of a
/// `wgpu::RenderPipeline`.
///
/// All translation happens in [`from_spec`](Self::from_spec) so the result
/// can be inspected without a device; [`build`](Self::build) only hands the
/// state to wgpu.
#[derive(Debug, Clone)]
pub struct PipelineBuilder {
    label: &'static str,
    attributes: Vec<wgpu::VertexAttribute>,
    array_stride: wgpu::BufferAddress,
    color_target: wgpu::ColorTargetState,
    depth_stencil: wgpu::DepthStencilState,
    primitive: wgpu::PrimitiveState,
    multisample: wgpu::MultisampleState,
}

impl PipelineBuilder {
    /// `depth_format` is the format of the pass's depth attachment. The
    /// attachment is always present, so a spec without depth testing still
    /// declares it and compares with `Always`.
    pub fn from_spec(spec: &PipelineSpec, depth_format: wgpu::TextureFormat) -> Self {
        let blend = if spec.alpha_blend() {
            wgpu::BlendState::ALPHA_BLENDING
        } else {
            wgpu::BlendState::REPLACE
        };

        let (depth_write_enabled, depth_compare) = if spec.depth_test() {
            (true, wgpu::CompareFunction::Less)
        } else {
            (false, wgpu::CompareFunction::Always)
        };

        Self {
            label: "ModelBatchPipeline",
            attributes: spec.vertex_layout().to_wgpu_attributes(),
            array_stride: spec.vertex_layout().stride(),
            color_target: wgpu::ColorTargetState {
                format: spec.color_format(),
                blend: Some(blend),
                write_mask: wgpu::ColorWrites::ALL,
            },
            depth_stencil: wgpu::DepthStencilState {
                format: depth_format,
                depth_write_enabled,
                depth_compare,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: spec.topology(),
                cull_mode: spec.cull_mode(),
                front_face: wgpu::FrontFace::Ccw,
                polygon_mode: wgpu::PolygonMode::Fill,
                ..Default::default()
            },
            multisample: wgpu::MultisampleState {
                count: spec.sample_count(),
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
        }
    }

    pub fn with_label(mut self, label: &'static str) -> Self {
        self.label = label;
        self
    }

    pub fn label(&self) -> &'static str {
        self.label
    }

    pub fn color_target(&self) -> &wgpu::ColorTargetState {
        &self.color_target
    }

    pub fn depth_stencil(&self) -> &wgpu::DepthStencilState {
        &self.depth_stencil
    }

    pub fn primitive(&self) -> &wgpu::PrimitiveState {
        &self.primitive
    }

    pub fn multisample(&self) -> &wgpu::MultisampleState {
        &self.multisample
    }

    pub fn attributes(&self) -> &[wgpu::VertexAttribute] {
        &self.attributes
    }

    pub fn build(
        &self,
        device: &wgpu::Device,
        layout: &wgpu::PipelineLayout,
        shader: &wgpu::ShaderModule,
    ) -> wgpu::RenderPipeline {
        let vertex_buffers = [wgpu::VertexBufferLayout {
            array_stride: self.array_stride,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &self.attributes,
        }];
        let targets = [Some(self.color_target.clone())];

        device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some(self.label),
            layout: Some(layout),
            vertex: wgpu::VertexState {
                module: shader,
                entry_point: Some(VERTEX_ENTRY),
                buffers: &vertex_buffers,
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: shader,
                entry_point: Some(FRAGMENT_ENTRY),
                targets: &targets,
                compilation_options: Default::default(),
            }),
            primitive: self.primitive,
            depth_stencil: Some(self.depth_stencil.clone()),
            multisample: self.multisample,
            multiview: None,
            cache: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::{GpuFacade, RecordingGpu};
    use crate::renderer::VertexLayoutDescriptor;

    const DEPTH: wgpu::TextureFormat = wgpu::TextureFormat::Depth24Plus;

    fn spec(layout: VertexLayoutDescriptor) -> PipelineSpec {
        let mut gpu = RecordingGpu::new();
        let shader = gpu.create_shader("test", "").unwrap();
        PipelineSpec::new(layout, shader)
    }

    #[test]
    fn opaque_spec_replaces_and_depth_tests() {
        let builder = PipelineBuilder::from_spec(&spec(VertexLayoutDescriptor::standard()), DEPTH);

        assert_eq!(builder.color_target().blend, Some(wgpu::BlendState::REPLACE));
        assert!(builder.depth_stencil().depth_write_enabled);
        assert_eq!(
            builder.depth_stencil().depth_compare,
            wgpu::CompareFunction::Less
        );
        assert_eq!(builder.primitive().cull_mode, Some(wgpu::Face::Back));
        assert_eq!(builder.multisample().count, 1);
        assert_eq!(builder.label(), "ModelBatchPipeline");
    }

    #[test]
    fn label_does_not_change_translated_state() {
        let spec = spec(VertexLayoutDescriptor::standard()).with_alpha_blend(true);
        let plain = PipelineBuilder::from_spec(&spec, DEPTH);
        let labelled = PipelineBuilder::from_spec(&spec, DEPTH).with_label("Blended");

        assert_eq!(labelled.label(), "Blended");
        assert_eq!(labelled.color_target(), plain.color_target());
        assert_eq!(labelled.primitive(), plain.primitive());
        assert_eq!(labelled.attributes(), plain.attributes());
    }

    #[test]
    fn spec_fields_carry_through() {
        let spec = spec(VertexLayoutDescriptor::normal_mapped())
            .with_alpha_blend(true)
            .with_depth_test(false)
            .with_cull_mode(None)
            .with_sample_count(4)
            .with_topology(wgpu::PrimitiveTopology::LineList)
            .with_color_format(wgpu::TextureFormat::Rgba16Float);
        let builder = PipelineBuilder::from_spec(&spec, DEPTH);

        assert_eq!(
            builder.color_target().blend,
            Some(wgpu::BlendState::ALPHA_BLENDING)
        );
        assert_eq!(
            builder.color_target().format,
            wgpu::TextureFormat::Rgba16Float
        );
        assert!(!builder.depth_stencil().depth_write_enabled);
        assert_eq!(
            builder.depth_stencil().depth_compare,
            wgpu::CompareFunction::Always
        );
        assert_eq!(builder.depth_stencil().format, DEPTH);
        assert_eq!(builder.primitive().cull_mode, None);
        assert_eq!(
            builder.primitive().topology,
            wgpu::PrimitiveTopology::LineList
        );
        assert_eq!(builder.multisample().count, 4);
        assert_eq!(builder.attributes().len(), 4);
    }
}
