use super::RenderError;
use super::lookup::{FREQUENCY_LUT_SIZE, PALETTE_LUT_SIZE};
use super::params::{ParameterPatch, RenderParameters};
use super::view::{ColumnSink, RendererState, SpectrogramUniforms, SpectrogramView, UploadPlan};
use crate::dsp::CircularColumnBuffer;
use std::sync::Arc;
use tracing::{debug, info};

/// Target format used by [`StreamingRenderer::headless`].
pub const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// GPU mirror of a [`CircularColumnBuffer`] drawn as a scrolling spectrogram.
///
/// Columns are stored transposed: texture row `i` holds ring slot `i`, so
/// each new column is a single contiguous row write.
pub struct StreamingRenderer {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
    format: wgpu::TextureFormat,
    pipeline: wgpu::RenderPipeline,
    resources: GpuResources,
    view: SpectrogramView,
}

impl StreamingRenderer {
    pub fn new(
        device: Arc<wgpu::Device>,
        queue: Arc<wgpu::Queue>,
        format: wgpu::TextureFormat,
        canvas_width: u32,
        canvas_height: u32,
    ) -> Result<Self, RenderError> {
        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let layout = create_bind_group_layout(&device);
        let pipeline = create_pipeline(&device, &layout, format);
        let resources = GpuResources::new(&device, layout);
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::Validation(err.to_string()));
        }

        let view = SpectrogramView::new(canvas_width, canvas_height);
        resources.write_palette(&queue, view.palette_lut());
        resources.write_frequency(&queue, view.frequency_lut());

        info!("[renderer] ready ({canvas_width}x{canvas_height}, {format:?})");

        Ok(Self {
            device,
            queue,
            format,
            pipeline,
            resources,
            view,
        })
    }

    /// Create a renderer on the default adapter with no surface attached.
    pub async fn headless(canvas_width: u32, canvas_height: u32) -> Result<Self, RenderError> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::default(),
                force_fallback_adapter: false,
                compatible_surface: None,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;

        let adapter_info = adapter.get_info();
        debug!(
            "[renderer] using adapter {} ({:?})",
            adapter_info.name, adapter_info.backend
        );

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("Spectrostream device"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::downlevel_defaults()
                        .using_resolution(adapter.limits()),
                },
                None,
            )
            .await
            .map_err(|err| RenderError::RequestDevice(err.to_string()))?;

        Self::new(
            Arc::new(device),
            Arc::new(queue),
            OFFSCREEN_FORMAT,
            canvas_width,
            canvas_height,
        )
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn parameters(&self) -> &RenderParameters {
        self.view.parameters()
    }

    pub fn state(&self) -> RendererState {
        self.view.state()
    }

    pub fn needs_redraw(&self) -> bool {
        self.view.needs_redraw()
    }

    pub fn update_parameters(&mut self, patch: &ParameterPatch) {
        let changes = self.view.update_parameters(patch);
        if changes.palette {
            self.resources
                .write_palette(&self.queue, self.view.palette_lut());
        }
        if changes.frequency {
            self.resources
                .write_frequency(&self.queue, self.view.frequency_lut());
        }
        debug!(
            "[renderer] parameters updated (palette: {}, frequency axis: {})",
            changes.palette, changes.frequency
        );
    }

    /// Upload whatever changed in `buffer` since the previous call.
    pub fn update_spectrogram(
        &mut self,
        buffer: &CircularColumnBuffer,
        force_full: bool,
    ) -> Result<UploadPlan, RenderError> {
        let limit = self.device.limits().max_texture_dimension_2d;
        if buffer.width() > limit as usize || buffer.height() > limit as usize {
            return Err(RenderError::TextureTooLarge {
                width: buffer.width(),
                height: buffer.height(),
                limit,
            });
        }

        let mut sink = TextureSink {
            device: &self.device,
            queue: &self.queue,
            resources: &mut self.resources,
        };
        let plan = self.view.update_spectrogram(buffer, force_full, &mut sink);
        if let UploadPlan::Full { reallocate: true } = plan {
            debug!(
                "[renderer] column texture reallocated for {}x{}",
                buffer.width(),
                buffer.height()
            );
        }
        Ok(plan)
    }

    /// Advance smoothing and draw one frame into `target`.
    pub fn render(&mut self, target: &wgpu::TextureView) {
        let uniforms = self.view.begin_frame();
        self.resources.write_uniforms(&self.queue, uniforms);

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Spectrogram frame"),
            });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Spectrogram pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.resources.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }

        self.queue.submit(Some(encoder.finish()));
        self.view.end_frame();
    }

    pub fn resize_canvas(&mut self, width: u32, height: u32) {
        debug!("[renderer] canvas resized to {width}x{height}");
        self.view.resize_canvas(width, height);
    }

    pub fn fast_resize_canvas(&mut self, width: u32, height: u32) {
        self.view.fast_resize_canvas(width, height);
    }

    /// Colour target matching this renderer's format, for off-screen frames.
    pub fn create_target(&self, width: u32, height: u32) -> wgpu::Texture {
        self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Spectrogram target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: self.format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        })
    }
}

struct TextureSink<'a> {
    device: &'a wgpu::Device,
    queue: &'a wgpu::Queue,
    resources: &'a mut GpuResources,
}

impl ColumnSink for TextureSink<'_> {
    fn reallocate(&mut self, width: usize, height: usize) {
        self.resources
            .reallocate_columns(self.device, width as u32, height as u32);
    }

    fn write_columns(&mut self, first_column: usize, data: &[f32]) {
        let height = self.resources.columns.1;
        let count = data.len() as u32 / height.max(1);
        if count == 0 {
            return;
        }

        self.queue.write_texture(
            wgpu::ImageCopyTexture {
                texture: &self.resources.spectrogram_texture,
                mip_level: 0,
                origin: wgpu::Origin3d {
                    x: 0,
                    y: first_column as u32,
                    z: 0,
                },
                aspect: wgpu::TextureAspect::All,
            },
            bytemuck::cast_slice(data),
            wgpu::ImageDataLayout {
                offset: 0,
                bytes_per_row: Some(height * std::mem::size_of::<f32>() as u32),
                rows_per_image: None,
            },
            wgpu::Extent3d {
                width: height,
                height: count,
                depth_or_array_layers: 1,
            },
        );
    }
}

struct GpuResources {
    layout: wgpu::BindGroupLayout,
    uniform_buffer: wgpu::Buffer,
    spectrogram_texture: wgpu::Texture,
    spectrogram_view: wgpu::TextureView,
    frequency_texture: wgpu::Texture,
    frequency_view: wgpu::TextureView,
    palette_texture: wgpu::Texture,
    palette_view: wgpu::TextureView,
    palette_sampler: wgpu::Sampler,
    bind_group: wgpu::BindGroup,
    /// Ring width and column height of the spectrogram texture.
    columns: (u32, u32),
    uniform_cache: Option<SpectrogramUniforms>,
}

impl GpuResources {
    fn new(device: &wgpu::Device, layout: wgpu::BindGroupLayout) -> Self {
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Spectrogram uniform buffer"),
            size: std::mem::size_of::<SpectrogramUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let spectrogram_texture = create_column_texture(device, 1, 1);
        let spectrogram_view =
            spectrogram_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let frequency_texture = create_lookup_texture(
            device,
            "Spectrogram frequency lookup",
            FREQUENCY_LUT_SIZE,
            wgpu::TextureFormat::R32Float,
        );
        let frequency_view = frequency_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Spectrogram frequency view"),
            dimension: Some(wgpu::TextureViewDimension::D1),
            ..Default::default()
        });

        let palette_texture = create_lookup_texture(
            device,
            "Spectrogram palette texture",
            PALETTE_LUT_SIZE,
            wgpu::TextureFormat::Rgba8Unorm,
        );
        let palette_view = palette_texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("Spectrogram palette view"),
            dimension: Some(wgpu::TextureViewDimension::D1),
            ..Default::default()
        });

        let palette_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Spectrogram palette sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let bind_group = create_bind_group(
            device,
            &layout,
            &uniform_buffer,
            &spectrogram_view,
            &frequency_view,
            &palette_view,
            &palette_sampler,
        );

        Self {
            layout,
            uniform_buffer,
            spectrogram_texture,
            spectrogram_view,
            frequency_texture,
            frequency_view,
            palette_texture,
            palette_view,
            palette_sampler,
            bind_group,
            columns: (1, 1),
            uniform_cache: None,
        }
    }

    fn reallocate_columns(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.spectrogram_texture = create_column_texture(device, width, height);
        self.spectrogram_view = self
            .spectrogram_texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        self.bind_group = create_bind_group(
            device,
            &self.layout,
            &self.uniform_buffer,
            &self.spectrogram_view,
            &self.frequency_view,
            &self.palette_view,
            &self.palette_sampler,
        );
        self.columns = (width.max(1), height.max(1));
    }

    fn write_uniforms(&mut self, queue: &wgpu::Queue, uniforms: SpectrogramUniforms) {
        if self.uniform_cache == Some(uniforms) {
            return;
        }
        queue.write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(&uniforms));
        self.uniform_cache = Some(uniforms);
    }

    fn write_palette(&self, queue: &wgpu::Queue, lut: &[u8]) {
        write_lookup(queue, &self.palette_texture, lut, PALETTE_LUT_SIZE, 4);
    }

    fn write_frequency(&self, queue: &wgpu::Queue, lut: &[f32]) {
        write_lookup(
            queue,
            &self.frequency_texture,
            bytemuck::cast_slice(lut),
            FREQUENCY_LUT_SIZE,
            std::mem::size_of::<f32>() as u32,
        );
    }
}

fn write_lookup(
    queue: &wgpu::Queue,
    texture: &wgpu::Texture,
    bytes: &[u8],
    texels: u32,
    bytes_per_texel: u32,
) {
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        bytes,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(texels * bytes_per_texel),
            rows_per_image: None,
        },
        wgpu::Extent3d {
            width: texels,
            height: 1,
            depth_or_array_layers: 1,
        },
    );
}

fn create_bind_group_layout(device: &wgpu::Device) -> wgpu::BindGroupLayout {
    let unfilterable = |binding, view_dimension| wgpu::BindGroupLayoutEntry {
        binding,
        visibility: wgpu::ShaderStages::FRAGMENT,
        ty: wgpu::BindingType::Texture {
            sample_type: wgpu::TextureSampleType::Float { filterable: false },
            view_dimension,
            multisampled: false,
        },
        count: None,
    };

    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("Spectrogram bind group layout"),
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
            unfilterable(1, wgpu::TextureViewDimension::D2),
            unfilterable(2, wgpu::TextureViewDimension::D1),
            wgpu::BindGroupLayoutEntry {
                binding: 3,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable: true },
                    view_dimension: wgpu::TextureViewDimension::D1,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 4,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                count: None,
            },
        ],
    })
}

fn create_pipeline(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    format: wgpu::TextureFormat,
) -> wgpu::RenderPipeline {
    let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some("Spectrogram shader"),
        source: wgpu::ShaderSource::Wgsl(include_str!("shaders/spectrogram.wgsl").into()),
    });

    let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
        label: Some("Spectrogram pipeline layout"),
        bind_group_layouts: &[layout],
        push_constant_ranges: &[],
    });

    device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
        label: Some("Spectrogram pipeline"),
        layout: Some(&pipeline_layout),
        vertex: wgpu::VertexState {
            module: &shader,
            entry_point: "vs_main",
            buffers: &[],
        },
        fragment: Some(wgpu::FragmentState {
            module: &shader,
            entry_point: "fs_main",
            targets: &[Some(wgpu::ColorTargetState {
                format,
                blend: Some(wgpu::BlendState::REPLACE),
                write_mask: wgpu::ColorWrites::ALL,
            })],
        }),
        primitive: wgpu::PrimitiveState {
            topology: wgpu::PrimitiveTopology::TriangleList,
            strip_index_format: None,
            front_face: wgpu::FrontFace::Ccw,
            cull_mode: None,
            unclipped_depth: false,
            polygon_mode: wgpu::PolygonMode::Fill,
            conservative: false,
        },
        depth_stencil: None,
        multisample: wgpu::MultisampleState {
            count: 1,
            mask: !0,
            alpha_to_coverage_enabled: false,
        },
        multiview: None,
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    uniform_buffer: &wgpu::Buffer,
    spectrogram_view: &wgpu::TextureView,
    frequency_view: &wgpu::TextureView,
    palette_view: &wgpu::TextureView,
    palette_sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("Spectrogram bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::TextureView(spectrogram_view),
            },
            wgpu::BindGroupEntry {
                binding: 2,
                resource: wgpu::BindingResource::TextureView(frequency_view),
            },
            wgpu::BindGroupEntry {
                binding: 3,
                resource: wgpu::BindingResource::TextureView(palette_view),
            },
            wgpu::BindGroupEntry {
                binding: 4,
                resource: wgpu::BindingResource::Sampler(palette_sampler),
            },
        ],
    })
}

/// `width` ring slots of `height` rows, stored one slot per texture row.
fn create_column_texture(device: &wgpu::Device, width: u32, height: u32) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Spectrogram column texture"),
        size: wgpu::Extent3d {
            width: height.max(1),
            height: width.max(1),
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::R32Float,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

fn create_lookup_texture(
    device: &wgpu::Device,
    label: &str,
    texels: u32,
    format: wgpu::TextureFormat,
) -> wgpu::Texture {
    device.create_texture(&wgpu::TextureDescriptor {
        label: Some(label),
        size: wgpu::Extent3d {
            width: texels,
            height: 1,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D1,
        format,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::GradientPreset;
    use crate::render::view::ColumnSpan;
    use crate::util::telemetry;

    const WIDTH: u32 = 64;
    const HEIGHT: u32 = 8;

    fn headless_renderer() -> Option<StreamingRenderer> {
        telemetry::init_for_tests();
        match pollster::block_on(StreamingRenderer::headless(WIDTH, HEIGHT)) {
            Ok(renderer) => Some(renderer),
            Err(RenderError::NoAdapter) => {
                eprintln!("no GPU adapter available, skipping");
                None
            }
            Err(err) => panic!("renderer setup failed: {err}"),
        }
    }

    fn filled(count: usize, height: usize, value: f32) -> Vec<f32> {
        vec![value; count * height]
    }

    /// Red channel of every pixel in `target`, row by row.
    fn read_red(renderer: &StreamingRenderer, target: &wgpu::Texture) -> Vec<u8> {
        let bytes_per_row = WIDTH * 4;
        assert_eq!(bytes_per_row % wgpu::COPY_BYTES_PER_ROW_ALIGNMENT, 0);

        let readback = renderer.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Spectrogram readback"),
            size: u64::from(bytes_per_row * HEIGHT),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = renderer
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Spectrogram readback"),
            });
        encoder.copy_texture_to_buffer(
            target.as_image_copy(),
            wgpu::ImageCopyBuffer {
                buffer: &readback,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(HEIGHT),
                },
            },
            target.size(),
        );
        renderer.queue.submit(Some(encoder.finish()));

        let slice = readback.slice(..);
        let (sender, receiver) = async_channel::bounded(1);
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = sender.try_send(result);
        });
        let _ = renderer.device.poll(wgpu::Maintain::Wait);
        receiver
            .recv_blocking()
            .expect("map callback")
            .expect("map readback buffer");

        let red: Vec<u8> = slice
            .get_mapped_range()
            .chunks_exact(4)
            .map(|pixel| pixel[0])
            .collect();
        readback.unmap();
        red
    }

    fn columns_where(red: &[u8], predicate: impl Fn(u8) -> bool) -> Vec<usize> {
        (0..WIDTH as usize)
            .filter(|&x| (0..HEIGHT as usize).all(|y| predicate(red[y * WIDTH as usize + x])))
            .collect()
    }

    fn settle(renderer: &mut StreamingRenderer, target: &wgpu::TextureView) {
        for _ in 0..128 {
            if !renderer.needs_redraw() {
                return;
            }
            renderer.render(target);
        }
        panic!("parameters never settled");
    }

    #[test]
    fn columns_before_the_logical_start_render_black() {
        let Some(mut renderer) = headless_renderer() else {
            return;
        };
        assert_eq!(renderer.format(), OFFSCREEN_FORMAT);
        let target = renderer.create_target(WIDTH, HEIGHT);
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        // 64 px at the default 4 px per column shows all 16 slots.
        let mut buffer = CircularColumnBuffer::new(16, 4);
        buffer.enqueue(&filled(16, 4, 1.0)).expect("whole columns");
        renderer.update_spectrogram(&buffer, false).expect("upload");
        renderer.render(&view);
        let red = read_red(&renderer, &target);
        assert_eq!(columns_where(&red, |r| r == 255).len(), WIDTH as usize);

        buffer.clear();
        buffer.enqueue(&filled(4, 4, 1.0)).expect("whole columns");
        assert_eq!(
            renderer.update_spectrogram(&buffer, false).expect("upload"),
            UploadPlan::Full { reallocate: false }
        );
        renderer.render(&view);
        let red = read_red(&renderer, &target);

        assert_eq!(columns_where(&red, |r| r == 0), (0..48).collect::<Vec<_>>());
        assert_eq!(columns_where(&red, |r| r == 255), (48..64).collect::<Vec<_>>());
    }

    #[test]
    fn wrapped_ring_draws_the_newest_column_at_the_right_edge() {
        let Some(mut renderer) = headless_renderer() else {
            return;
        };
        let target = renderer.create_target(WIDTH, HEIGHT);
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        let mut buffer = CircularColumnBuffer::new(16, 4);
        buffer.enqueue(&filled(12, 4, 0.0)).expect("whole columns");
        renderer.update_spectrogram(&buffer, false).expect("upload");

        let mut fresh = filled(5, 4, 0.0);
        fresh.extend(filled(1, 4, 1.0));
        buffer.enqueue(&fresh).expect("whole columns");
        assert_eq!(
            renderer.update_spectrogram(&buffer, false).expect("upload"),
            UploadPlan::Wrapped {
                head: ColumnSpan { first: 0, count: 2 },
                tail: ColumnSpan { first: 12, count: 4 },
            }
        );
        assert_eq!(buffer.start(), 2);

        renderer.render(&view);
        let red = read_red(&renderer, &target);

        let dark = columns_where(&red, |r| r == 0);
        assert!((0..56).all(|x| dark.contains(&x)));
        let lit = columns_where(&red, |r| r == 255);
        assert!((60..64).all(|x| lit.contains(&x)));
        assert!(lit.iter().all(|&x| x >= 56));
    }

    #[test]
    fn contrast_curve_lifts_mid_intensities() {
        let Some(mut renderer) = headless_renderer() else {
            return;
        };
        let target = renderer.create_target(WIDTH, HEIGHT);
        let view = target.create_view(&wgpu::TextureViewDescriptor::default());

        // 0.02 at the default sensitivity of 25 lands at half scale.
        let mut buffer = CircularColumnBuffer::new(16, 4);
        buffer.enqueue(&filled(16, 4, 0.02)).expect("whole columns");
        renderer.update_spectrogram(&buffer, false).expect("upload");

        renderer.update_parameters(&ParameterPatch {
            gradient: Some(GradientPreset::Monochrome),
            contrast: Some(0.0),
            ..ParameterPatch::default()
        });
        settle(&mut renderer, &view);
        let flat = read_red(&renderer, &target)[WIDTH as usize / 2];

        renderer.update_parameters(&ParameterPatch {
            contrast: Some(25.0),
            ..ParameterPatch::default()
        });
        settle(&mut renderer, &view);
        let curved = read_red(&renderer, &target)[WIDTH as usize / 2];

        // Linear 0.5 is about 188 once encoded to sRGB.
        assert!((180..=196).contains(&flat), "flat response was {flat}");
        assert!(curved > flat + 20, "curved {curved} vs flat {flat}");
    }
}
