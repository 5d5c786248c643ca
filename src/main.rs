use anyhow::{Context, Result};
use spectrostream::config::SettingsManager;
use spectrostream::pipeline::{ChannelFeeder, ChannelPipeline};
use spectrostream::render::{ParameterPatch, StreamingRenderer};
use spectrostream::util::audio::deinterleave;
use spectrostream::util::telemetry;
use spectrostream::worker::{SpectrogramPool, SpectrogramWorker, default_pool_size};
use std::f32::consts::TAU;
use std::sync::Arc;
use tracing::{error, info, warn};

const CANVAS_WIDTH: u32 = 1024;
const CANVAS_HEIGHT: u32 = 512;
const SAMPLE_RATE: f32 = 48_000.0;
const CHANNELS: usize = 2;
const CHUNK_FRAMES: usize = 960;
const DEMO_SECONDS: f32 = 4.0;

fn main() {
    telemetry::init();
    info!("spectrostream starting up");

    if let Err(err) = pollster::block_on(run()) {
        error!("[demo] failed: {err:#}");
    }
}

async fn run() -> Result<()> {
    let manager = SettingsManager::load_or_default();
    if !manager.path().exists()
        && let Err(err) = manager.save()
    {
        warn!("[settings] failed to write defaults to {:?}: {err}", manager.path());
    }
    let settings = manager.settings().clone();

    let workers = settings.workers.unwrap_or_else(default_pool_size);
    let pool = Arc::new(
        SpectrogramPool::new(SpectrogramWorker, workers).context("failed to start worker pool")?,
    );

    let mut channels = (0..CHANNELS)
        .map(|_| {
            let pipeline = ChannelPipeline::new(Arc::clone(&pool), settings.analysis)?;
            Ok((ChannelFeeder::new(&settings.analysis), pipeline))
        })
        .collect::<Result<Vec<_>>>()?;

    let mut renderer = StreamingRenderer::headless(CANVAS_WIDTH, CANVAS_HEIGHT)
        .await
        .context("failed to create renderer")?;
    renderer.update_parameters(&ParameterPatch {
        sample_rate: Some(SAMPLE_RATE),
        window_size: Some(settings.analysis.window_size),
        ..settings.render
    });

    let target = renderer.create_target(CANVAS_WIDTH, CANVAS_HEIGHT);
    let target_view = target.create_view(&wgpu::TextureViewDescriptor::default());

    let mut source = SyntheticSource::new(SAMPLE_RATE);
    let chunk_count = (DEMO_SECONDS * SAMPLE_RATE) as usize / CHUNK_FRAMES;
    let mut frames = 0usize;

    for chunk in 0..chunk_count {
        let block = source.next_block(CHUNK_FRAMES);
        let per_channel = deinterleave(&block, CHANNELS);
        for ((feeder, pipeline), samples) in channels.iter_mut().zip(per_channel) {
            if let Some(tick) = feeder.push(&samples, SAMPLE_RATE) {
                let processed = pipeline.process(tick).await?;
                feeder.recycle(processed.recycled);
            }
        }

        if chunk == chunk_count / 2 {
            renderer.fast_resize_canvas(CANVAS_WIDTH / 2, CANVAS_HEIGHT);
        }

        let (_, primary) = &mut channels[0];
        let force_full = primary.take_force_full();
        renderer
            .update_spectrogram(primary.buffer(), force_full)
            .context("failed to upload columns")?;

        if renderer.needs_redraw() {
            renderer.render(&target_view);
            frames += 1;
        }
    }

    let _ = renderer.device().poll(wgpu::Maintain::Wait);

    for (index, (_, pipeline)) in channels.iter().enumerate() {
        info!(
            "[demo] channel {index}: {} columns of {} rows",
            pipeline.buffer().len(),
            pipeline.buffer().height()
        );
    }
    info!("[demo] rendered {frames} frames over {chunk_count} chunks");
    Ok(())
}

/// Stereo test signal: an exponential sweep on the left, a fixed chord on
/// the right.
struct SyntheticSource {
    sample_rate: f32,
    elapsed: usize,
    sweep_phase: f32,
}

impl SyntheticSource {
    const SWEEP_START_HZ: f32 = 80.0;
    const SWEEP_END_HZ: f32 = 12_000.0;
    const CHORD_HZ: [f32; 3] = [220.0, 277.18, 329.63];

    fn new(sample_rate: f32) -> Self {
        Self {
            sample_rate,
            elapsed: 0,
            sweep_phase: 0.0,
        }
    }

    fn next_block(&mut self, frames: usize) -> Vec<f32> {
        let duration = DEMO_SECONDS * self.sample_rate;
        let ratio = Self::SWEEP_END_HZ / Self::SWEEP_START_HZ;
        let mut block = Vec::with_capacity(frames * CHANNELS);

        for _ in 0..frames {
            let progress = (self.elapsed as f32 / duration).min(1.0);
            let frequency = Self::SWEEP_START_HZ * ratio.powf(progress);
            self.sweep_phase = (self.sweep_phase + TAU * frequency / self.sample_rate) % TAU;

            let time = self.elapsed as f32 / self.sample_rate;
            let chord = Self::CHORD_HZ
                .iter()
                .map(|hz| (TAU * hz * time).sin())
                .sum::<f32>()
                / Self::CHORD_HZ.len() as f32;

            block.push(0.5 * self.sweep_phase.sin());
            block.push(0.5 * chord);
            self.elapsed += 1;
        }

        block
    }
}
