//! Device-independent half of the streaming renderer.
//!
//! [`SpectrogramView`] decides which columns of a [`CircularColumnBuffer`]
//! must be re-uploaded, keeps the smoothed render parameters and builds the
//! uniform block. Uploads go through a [`ColumnSink`], which is the GPU texture
//! in production and a [`CpuMirror`] in tests.

use super::lookup::{FREQUENCY_LUT_SIZE, frequency_lut, full_range_hz, palette_lut, scale_range};
use super::params::{ParameterPatch, RenderParameters, Smoothed};
use crate::dsp::CircularColumnBuffer;
use bytemuck::{Pod, Zeroable};

/// Contrast values below this are sent to the shader as zero (no curve).
pub const MIN_CONTRAST: f32 = 0.05;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RendererState {
    /// Nothing changed since the last frame.
    #[default]
    Idle,
    /// A frame is needed: new columns, parameters still gliding, or a resize.
    Dirty,
    Rendering,
}

/// Destination of column uploads, addressed by ring slot.
pub trait ColumnSink {
    /// Discard previous contents and make room for `width` columns of `height`.
    fn reallocate(&mut self, width: usize, height: usize);

    /// Overwrite slots `[first_column, first_column + data.len() / height)`.
    fn write_columns(&mut self, first_column: usize, data: &[f32]);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ColumnSpan {
    pub first: usize,
    pub count: usize,
}

impl ColumnSpan {
    pub fn end(&self) -> usize {
        self.first + self.count
    }
}

/// Upload chosen by [`SpectrogramView::update_spectrogram`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadPlan {
    Unchanged,
    Full { reallocate: bool },
    Contiguous(ColumnSpan),
    /// New columns wrapped past the last slot: `head` starts at slot 0 and
    /// `tail` ends at the buffer width.
    Wrapped { head: ColumnSpan, tail: ColumnSpan },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct BufferSnapshot {
    epoch: u64,
    written: u64,
    start: usize,
    len: usize,
    width: usize,
    height: usize,
}

impl BufferSnapshot {
    fn of(buffer: &CircularColumnBuffer) -> Self {
        Self {
            epoch: buffer.epoch(),
            written: buffer.written(),
            start: buffer.start(),
            len: buffer.len(),
            width: buffer.width(),
            height: buffer.height(),
        }
    }
}

/// Uniform block shared with `shaders/spectrogram.wgsl`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable, PartialEq)]
pub struct SpectrogramUniforms {
    /// Buffer width, column height, frequency lookup size, unused.
    pub dims: [u32; 4],
    /// Ring offset, valid length and visible span (fractions of the buffer
    /// width), half a column in the same units.
    pub ring: [f32; 4],
    /// Contrast, sensitivity, displayed scale range min and max.
    pub style: [f32; 4],
}

/// Which lookup images were rebuilt by a parameter update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ParameterChanges {
    pub palette: bool,
    pub frequency: bool,
}

#[derive(Debug)]
pub struct SpectrogramView {
    params: RenderParameters,
    configured: bool,
    state: RendererState,
    palette: Vec<u8>,
    frequency: Vec<f32>,
    range_min: Smoothed,
    range_max: Smoothed,
    contrast: Smoothed,
    sensitivity: Smoothed,
    zoom: Smoothed,
    seen: Option<BufferSnapshot>,
    force_full: bool,
    canvas: (u32, u32),
    last_real_width: u32,
    zoom_override: f64,
}

impl SpectrogramView {
    pub fn new(canvas_width: u32, canvas_height: u32) -> Self {
        let params = RenderParameters::default();
        let (range_min, range_max) = scale_range(&params);
        let canvas_width = canvas_width.max(1);

        Self {
            palette: palette_lut(params.gradient.stops()),
            frequency: frequency_lut(params.scale, full_range_hz(&params)),
            range_min: Smoothed::new(range_min),
            range_max: Smoothed::new(range_max),
            contrast: Smoothed::new(f64::from(params.contrast)),
            sensitivity: Smoothed::new(f64::from(params.sensitivity)),
            zoom: Smoothed::new(f64::from(params.zoom)),
            params,
            configured: false,
            state: RendererState::Dirty,
            seen: None,
            force_full: false,
            canvas: (canvas_width, canvas_height.max(1)),
            last_real_width: canvas_width,
            zoom_override: 1.0,
        }
    }

    pub fn parameters(&self) -> &RenderParameters {
        &self.params
    }

    pub fn state(&self) -> RendererState {
        self.state
    }

    pub fn needs_redraw(&self) -> bool {
        self.state == RendererState::Dirty
    }

    pub fn palette_lut(&self) -> &[u8] {
        &self.palette
    }

    pub fn frequency_lut(&self) -> &[f32] {
        &self.frequency
    }

    /// Canvas size the backing target was last allocated for.
    pub fn canvas(&self) -> (u32, u32) {
        self.canvas
    }

    pub fn zoom_override(&self) -> f64 {
        self.zoom_override
    }

    pub fn update_parameters(&mut self, patch: &ParameterPatch) -> ParameterChanges {
        let next = self.params.apply(patch);
        let first = !self.configured;

        let changes = ParameterChanges {
            palette: first || next.gradient != self.params.gradient,
            frequency: first || next.frequency_view_differs(&self.params),
        };

        if changes.palette {
            self.palette = palette_lut(next.gradient.stops());
        }

        if changes.frequency {
            self.frequency = frequency_lut(next.scale, full_range_hz(&next));
            let (min, max) = scale_range(&next);
            if first || next.axis_differs(&self.params) {
                self.range_min.snap(min);
                self.range_max.snap(max);
            } else {
                self.range_min.set_target(min);
                self.range_max.set_target(max);
            }
        }

        self.contrast.set_target(f64::from(next.contrast));
        self.sensitivity.set_target(f64::from(next.sensitivity));
        self.zoom.set_target(f64::from(next.zoom));

        self.params = next;
        self.configured = true;
        self.state = RendererState::Dirty;
        changes
    }

    /// Pick the smallest upload that brings the sink in line with `buffer`.
    pub fn plan_upload(&self, buffer: &CircularColumnBuffer, force_full: bool) -> UploadPlan {
        let current = BufferSnapshot::of(buffer);
        let Some(seen) = self.seen else {
            return UploadPlan::Full { reallocate: true };
        };

        if seen.width != current.width || seen.height != current.height {
            return UploadPlan::Full { reallocate: true };
        }

        if force_full
            || self.force_full
            || seen.epoch != current.epoch
            || current.written < seen.written
        {
            return UploadPlan::Full { reallocate: false };
        }

        let fresh = current.written - seen.written;
        if fresh == 0 {
            return UploadPlan::Unchanged;
        }
        if fresh > current.width as u64 {
            return UploadPlan::Full { reallocate: false };
        }

        let fresh = fresh as usize;
        let width = current.width;
        let first = (current.start + current.len - fresh) % width;
        if first + fresh <= width {
            UploadPlan::Contiguous(ColumnSpan {
                first,
                count: fresh,
            })
        } else {
            UploadPlan::Wrapped {
                head: ColumnSpan {
                    first: 0,
                    count: first + fresh - width,
                },
                tail: ColumnSpan {
                    first,
                    count: width - first,
                },
            }
        }
    }

    /// Diff `buffer` against the last state seen and upload what changed.
    pub fn update_spectrogram<S: ColumnSink>(
        &mut self,
        buffer: &CircularColumnBuffer,
        force_full: bool,
        sink: &mut S,
    ) -> UploadPlan {
        let plan = self.plan_upload(buffer, force_full);

        match plan {
            UploadPlan::Unchanged => {}
            UploadPlan::Full { reallocate } => {
                if reallocate {
                    sink.reallocate(buffer.width(), buffer.height());
                }
                sink.write_columns(0, buffer.raw());
            }
            UploadPlan::Contiguous(span) => {
                sink.write_columns(span.first, buffer.slot_range(span.first, span.count));
            }
            UploadPlan::Wrapped { head, tail } => {
                sink.write_columns(tail.first, buffer.slot_range(tail.first, tail.count));
                sink.write_columns(head.first, buffer.slot_range(head.first, head.count));
            }
        }

        self.seen = Some(BufferSnapshot::of(buffer));
        self.force_full = false;
        if plan != UploadPlan::Unchanged {
            self.state = RendererState::Dirty;
        }
        plan
    }

    /// The backing target was reallocated at `width x height`.
    pub fn resize_canvas(&mut self, width: u32, height: u32) {
        self.canvas = (width.max(1), height.max(1));
        self.last_real_width = self.canvas.0;
        self.zoom_override = 1.0;
        self.force_full = true;
        self.state = RendererState::Dirty;
    }

    /// The output is being stretched to `width` without reallocating; zoom is
    /// corrected so columns keep their on-screen size.
    pub fn fast_resize_canvas(&mut self, width: u32, _height: u32) {
        self.zoom_override = f64::from(self.last_real_width) / f64::from(width.max(1));
        self.state = RendererState::Dirty;
    }

    /// Advance smoothing and return the uniforms for the frame to draw.
    pub fn begin_frame(&mut self) -> SpectrogramUniforms {
        self.state = RendererState::Rendering;

        let range_min = self.range_min.step();
        let range_max = self.range_max.step();
        let contrast = self.contrast.step() as f32;
        let sensitivity = self.sensitivity.step() as f32;
        let zoom = self.zoom.step();

        let (width, height, start, len) = match self.seen {
            Some(seen) => (seen.width, seen.height, seen.start, seen.len),
            None => (1, 1, 0, 0),
        };
        let width_f = width as f64;
        let visible_columns =
            f64::from(self.canvas.0) / (zoom * self.zoom_override).max(f64::EPSILON);

        SpectrogramUniforms {
            dims: [width as u32, height as u32, FREQUENCY_LUT_SIZE, 0],
            ring: [
                (start as f64 / width_f) as f32,
                (len as f64 / width_f) as f32,
                (visible_columns / width_f) as f32,
                (0.5 / width_f) as f32,
            ],
            style: [
                if contrast < MIN_CONTRAST { 0.0 } else { contrast },
                sensitivity,
                range_min as f32,
                range_max as f32,
            ],
        }
    }

    pub fn end_frame(&mut self) {
        let settled = [
            &self.range_min,
            &self.range_max,
            &self.contrast,
            &self.sensitivity,
            &self.zoom,
        ]
        .iter()
        .all(|value| value.is_settled());

        self.state = if settled {
            RendererState::Idle
        } else {
            RendererState::Dirty
        };
    }
}

/// Plain memory copy of the uploaded slots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CpuMirror {
    pub data: Vec<f32>,
    pub width: usize,
    pub height: usize,
    pub uploads: usize,
}

impl ColumnSink for CpuMirror {
    fn reallocate(&mut self, width: usize, height: usize) {
        self.data = vec![0.0; width * height];
        self.width = width;
        self.height = height;
    }

    fn write_columns(&mut self, first_column: usize, data: &[f32]) {
        let offset = first_column * self.height;
        self.data[offset..offset + data.len()].copy_from_slice(data);
        self.uploads += 1;
    }
}
