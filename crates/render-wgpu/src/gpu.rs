use std::collections::BTreeMap;

use volterra_common::GridDimension;
use volterra_render::shaders::{PARAM_OFFSETS, PARAMS_SIZE};
use volterra_render::{
    BackendError, BufferHandle, DrawMetrics, EffectHandle, GraphicsBackend, ProgramEntryPoints,
    ShaderLanguage, TextureHandle, UniformValue, Vertex,
};
use wgpu::util::DeviceExt;

const CLEAR_COLOR: wgpu::Color = wgpu::Color {
    r: 0.1,
    g: 0.1,
    b: 0.15,
    a: 1.0,
};

/// Byte offset of a named parameter inside the uniform block.
pub fn uniform_offset(name: &str) -> Option<u64> {
    PARAM_OFFSETS
        .iter()
        .find(|(n, _)| *n == name)
        .map(|(_, offset)| *offset)
}

fn vertex_layout() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] =
        wgpu::vertex_attr_array![0 => Float32x3, 1 => Float32x4];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<Vertex>() as u64,
        step_mode: wgpu::VertexStepMode::Vertex,
        attributes: &ATTRIBUTES,
    }
}

struct Program {
    techniques: BTreeMap<String, wgpu::RenderPipeline>,
}

enum BufferKind {
    Vertex,
    Index { count: u32 },
}

struct GpuBuffer {
    buffer: wgpu::Buffer,
    kind: BufferKind,
}

struct RecordedDraw {
    effect: EffectHandle,
    technique: String,
    vertices: BufferHandle,
    indices: BufferHandle,
    index_count: u32,
}

/// wgpu implementation of [`GraphicsBackend`].
///
/// Parameters live in one uniform buffer at fixed offsets. Each technique of
/// a compiled program gets its own render pipeline. Draw calls are recorded
/// and replayed into a render pass by [`WgpuBackend::encode_frame`].
pub struct WgpuBackend {
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_format: wgpu::TextureFormat,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    next_handle: u32,
    programs: BTreeMap<EffectHandle, Program>,
    active_effect: Option<EffectHandle>,
    active_technique: Option<String>,
    buffers: BTreeMap<BufferHandle, GpuBuffer>,
    volumes: BTreeMap<TextureHandle, wgpu::Texture>,
    pending: Vec<RecordedDraw>,
    frame: DrawMetrics,
}

impl WgpuBackend {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, surface_format: wgpu::TextureFormat) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("effect_parameters"),
            contents: &[0u8; PARAMS_SIZE as usize],
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("effect_bind_group_layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: wgpu::BufferSize::new(PARAMS_SIZE),
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: false },
                        view_dimension: wgpu::TextureViewDimension::D3,
                        multisampled: false,
                    },
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("effect_pipeline_layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // Empty volume until a density field is uploaded.
        let placeholder = create_volume(&device, "empty_volume", GridDimension::cube(1));
        queue.write_texture(
            placeholder.as_image_copy(),
            bytemuck::cast_slice(&[0.0f32]),
            volume_copy_layout(GridDimension::cube(1)),
            volume_extent(GridDimension::cube(1)),
        );
        let bind_group = create_bind_group(&device, &bind_group_layout, &uniform_buffer, &placeholder);

        Self {
            device,
            queue,
            surface_format,
            bind_group_layout,
            pipeline_layout,
            uniform_buffer,
            bind_group,
            next_handle: 1,
            programs: BTreeMap::new(),
            active_effect: None,
            active_technique: None,
            buffers: BTreeMap::new(),
            volumes: BTreeMap::new(),
            pending: Vec::new(),
            frame: DrawMetrics::default(),
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn surface_format(&self) -> wgpu::TextureFormat {
        self.surface_format
    }

    pub fn active_technique(&self) -> Option<&str> {
        self.active_technique.as_deref()
    }

    /// Replay the draws recorded since the last call into one render pass
    /// targeting `view`, and submit it.
    pub fn encode_frame(&mut self, view: &wgpu::TextureView) {
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("raycast_encoder"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("raycast_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(CLEAR_COLOR),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                ..Default::default()
            });

            pass.set_bind_group(0, &self.bind_group, &[]);
            for draw in &self.pending {
                let Some(pipeline) = self
                    .programs
                    .get(&draw.effect)
                    .and_then(|p| p.techniques.get(&draw.technique))
                else {
                    tracing::warn!(technique = %draw.technique, "program released before encoding, draw skipped");
                    continue;
                };
                let (Some(vertices), Some(indices)) =
                    (self.buffers.get(&draw.vertices), self.buffers.get(&draw.indices))
                else {
                    continue;
                };
                pass.set_pipeline(pipeline);
                pass.set_vertex_buffer(0, vertices.buffer.slice(..));
                pass.set_index_buffer(indices.buffer.slice(..), wgpu::IndexFormat::Uint32);
                pass.draw_indexed(0..draw.index_count, 0, 0..1);
            }
        }

        self.pending.clear();
        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn allocate_handle(&mut self) -> u32 {
        let handle = self.next_handle;
        self.next_handle += 1;
        handle
    }

    fn create_pipeline(
        &self,
        module: &wgpu::ShaderModule,
        entry_points: &ProgramEntryPoints,
        technique: &str,
    ) -> wgpu::RenderPipeline {
        let vertex_entry = entry_points.vertex_entry_point(technique);
        let fragment_entry = format!("fs_{technique}");
        self.device
            .create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some(technique),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module,
                    entry_point: Some(&vertex_entry),
                    compilation_options: Default::default(),
                    buffers: &[vertex_layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module,
                    entry_point: Some(&fragment_entry),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: self.surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    ..Default::default()
                },
                depth_stencil: None,
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
    }

    fn index_count(&self, handle: BufferHandle) -> Option<u32> {
        match self.buffers.get(&handle)?.kind {
            BufferKind::Index { count } => Some(count),
            BufferKind::Vertex => None,
        }
    }
}

impl GraphicsBackend for WgpuBackend {
    fn compile_effect(
        &mut self,
        language: ShaderLanguage,
        name: &str,
        source: &[u8],
    ) -> Result<EffectHandle, BackendError> {
        if language != ShaderLanguage::Wgsl {
            return Err(BackendError::UnsupportedLanguage(language));
        }
        let compile_error = |message: String| BackendError::Compile {
            name: name.to_string(),
            message,
        };
        let text = std::str::from_utf8(source).map_err(|e| compile_error(e.to_string()))?;
        let entry_points =
            ProgramEntryPoints::parse_wgsl(text).map_err(|e| compile_error(e.to_string()))?;

        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let module = self
            .device
            .create_shader_module(wgpu::ShaderModuleDescriptor {
                label: Some(name),
                source: wgpu::ShaderSource::Wgsl(text.into()),
            });
        let techniques: BTreeMap<String, wgpu::RenderPipeline> = entry_points
            .techniques()
            .into_iter()
            .map(|technique| {
                let pipeline = self.create_pipeline(&module, &entry_points, &technique);
                (technique, pipeline)
            })
            .collect();
        if let Some(error) = pollster::block_on(self.device.pop_error_scope()) {
            return Err(compile_error(error.to_string()));
        }

        let handle = EffectHandle(self.allocate_handle());
        tracing::info!(effect = name, techniques = techniques.len(), "effect compiled");
        self.programs.insert(handle, Program { techniques });
        self.active_effect = Some(handle);
        self.active_technique = None;
        Ok(handle)
    }

    fn release_effect(&mut self, effect: EffectHandle) {
        self.programs.remove(&effect);
        if self.active_effect == Some(effect) {
            self.active_effect = None;
            self.active_technique = None;
        }
    }

    fn techniques(&self) -> Vec<String> {
        self.active_effect
            .and_then(|h| self.programs.get(&h))
            .map(|p| p.techniques.keys().cloned().collect())
            .unwrap_or_default()
    }

    fn select_technique(&mut self, name: &str) -> Result<(), BackendError> {
        let program = self
            .active_effect
            .and_then(|h| self.programs.get(&h))
            .ok_or(BackendError::NoActiveEffect)?;
        if !program.techniques.contains_key(name) {
            return Err(BackendError::TechniqueNotFound(name.to_string()));
        }
        self.active_technique = Some(name.to_string());
        Ok(())
    }

    fn set_uniform(&mut self, name: &str, value: UniformValue) -> Result<(), BackendError> {
        if self.active_effect.is_none() {
            return Err(BackendError::NoActiveEffect);
        }
        let offset =
            uniform_offset(name).ok_or_else(|| BackendError::UnknownParameter(name.to_string()))?;
        self.queue
            .write_buffer(&self.uniform_buffer, offset, &value.to_bytes());
        Ok(())
    }

    fn create_vertex_buffer(
        &mut self,
        label: &str,
        vertices: &[Vertex],
    ) -> Result<BufferHandle, BackendError> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
        let handle = BufferHandle(self.allocate_handle());
        self.buffers.insert(
            handle,
            GpuBuffer {
                buffer,
                kind: BufferKind::Vertex,
            },
        );
        Ok(handle)
    }

    fn create_index_buffer(
        &mut self,
        label: &str,
        indices: &[u32],
    ) -> Result<BufferHandle, BackendError> {
        let buffer = self
            .device
            .create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents: bytemuck::cast_slice(indices),
                usage: wgpu::BufferUsages::INDEX,
            });
        let handle = BufferHandle(self.allocate_handle());
        self.buffers.insert(
            handle,
            GpuBuffer {
                buffer,
                kind: BufferKind::Index {
                    count: indices.len() as u32,
                },
            },
        );
        Ok(handle)
    }

    fn create_volume_texture(
        &mut self,
        label: &str,
        dimension: GridDimension,
        samples: &[f32],
    ) -> Result<TextureHandle, BackendError> {
        let max = self.device.limits().max_texture_dimension_3d;
        if dimension.as_array().iter().any(|&e| e > max) {
            return Err(BackendError::VolumeTooLarge { dimension, max });
        }
        if samples.len() != dimension.sample_count() {
            return Err(BackendError::SampleCountMismatch {
                dimension,
                expected: dimension.sample_count(),
                actual: samples.len(),
            });
        }

        let texture = create_volume(&self.device, label, dimension);
        self.queue.write_texture(
            texture.as_image_copy(),
            bytemuck::cast_slice(samples),
            volume_copy_layout(dimension),
            volume_extent(dimension),
        );
        self.bind_group = create_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.uniform_buffer,
            &texture,
        );

        let handle = TextureHandle(self.allocate_handle());
        self.volumes.insert(handle, texture);
        tracing::debug!(%dimension, "volume texture uploaded");
        Ok(handle)
    }

    fn release_volume_texture(&mut self, texture: TextureHandle) {
        // The bind group keeps the bound texture alive until it is replaced.
        if self.volumes.remove(&texture).is_some() {
            tracing::debug!(?texture, "volume texture released");
        }
    }

    fn draw_indexed(
        &mut self,
        vertices: BufferHandle,
        indices: BufferHandle,
        primitive_count: u32,
    ) -> Result<(), BackendError> {
        if !matches!(
            self.buffers.get(&vertices).map(|b| &b.kind),
            Some(BufferKind::Vertex)
        ) {
            return Err(BackendError::InvalidBuffer(vertices));
        }
        let available = self
            .index_count(indices)
            .ok_or(BackendError::InvalidBuffer(indices))?;
        let index_count = primitive_count * 3;
        if index_count > available {
            return Err(BackendError::InvalidBuffer(indices));
        }
        let (Some(effect), Some(technique)) = (self.active_effect, self.active_technique.clone())
        else {
            return Err(BackendError::NoActiveEffect);
        };

        self.pending.push(RecordedDraw {
            effect,
            technique,
            vertices,
            indices,
            index_count,
        });
        self.frame.draw_count += 1;
        self.frame.primitive_count += primitive_count as u64;
        Ok(())
    }

    fn begin_frame(&mut self) {
        self.frame = DrawMetrics::default();
    }

    fn metrics(&self) -> DrawMetrics {
        self.frame
    }
}

fn volume_extent(dimension: GridDimension) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width: dimension.x,
        height: dimension.y,
        depth_or_array_layers: dimension.z,
    }
}

/// Tightly packed `f32` rows, `u` fastest, then `v`, then `w`.
fn volume_copy_layout(dimension: GridDimension) -> wgpu::TexelCopyBufferLayout {
    wgpu::TexelCopyBufferLayout {
        offset: 0,
        bytes_per_row: Some(dimension.x * std::mem::size_of::<f32>() as u32),
        rows_per_image: Some(dimension.y),
    }
}

fn create_volume(device: &wgpu::Device, label: &str, dimension: GridDimension) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: volume_extent(dimension),
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D3,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    volume: &wgpu::Texture,
) -> wgpu::BindGroup {
    let view = volume.create_view(&wgpu::TextureViewDescriptor::default());
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("effect_bind_group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(&view),
            },
        ],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use volterra_render::shaders::VOLUME_RAYCASTING_WGSL;
    use volterra_render::{EffectMode, PARAMETER_NAMES};

    #[test]
    fn every_parameter_has_an_offset() {
        for name in PARAMETER_NAMES {
            assert!(uniform_offset(name).is_some(), "{name}");
        }
        assert_eq!(uniform_offset("WorldViewProjectionMatrix"), Some(0));
        assert_eq!(uniform_offset("Unknown"), None);
    }

    #[test]
    fn vertex_entry_falls_back_to_main() {
        let entry_points = ProgramEntryPoints::parse_wgsl(VOLUME_RAYCASTING_WGSL).unwrap();
        assert_eq!(
            entry_points.vertex_entry_point(EffectMode::VertexColor.technique_name()),
            "vs_VertexColor"
        );
        assert_eq!(
            entry_points.vertex_entry_point(EffectMode::FullVolumeRaycasting.technique_name()),
            "vs_main"
        );
    }

    #[test]
    fn vertex_layout_matches_vertex() {
        let layout = vertex_layout();
        assert_eq!(layout.array_stride, 28);
        assert_eq!(layout.attributes[1].offset, 12);
    }

    #[test]
    fn volume_rows_are_tightly_packed() {
        let layout = volume_copy_layout(GridDimension::new(5, 3, 2));
        assert_eq!(layout.bytes_per_row, Some(20));
        assert_eq!(layout.rows_per_image, Some(3));
        let extent = volume_extent(GridDimension::new(5, 3, 2));
        assert_eq!(extent.depth_or_array_layers, 2);
    }
}
