use std::path::Path;

use glam::{Vec2, Vec3};
use strix_sim::FluidSimulation;

use crate::camera::Camera;
use crate::config::{RendererConfig, Viewport};
use crate::device::{
    AddressMode,
    BindingId,
    BufferDesc,
    BufferId,
    BufferUsage,
    CommandList,
    GpuDevice,
    ImageFormat,
    ResourceScope,
    SamplerDesc,
    align_up,
};
use crate::draw::{Drawable, Encoder, Scratch, Text};
use crate::error::{RenderError, Result};
use crate::heap::{FrameHeaps, HeapStats, StagingHeap};
use crate::model::{Model, ModelDesc};
use crate::text::{FontAtlas, GlyphSource};
use crate::texture::{ImageCrateDecoder, ImageDecoder, Skybox, Texture, TextureDesc, TextureKind, TextureSource};
use crate::time::{FrameClock, FrameTime};

/// Result of [`Renderer::frame`].
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum FrameOutcome {
    /// Commands were recorded and heaps flushed; replay
    /// [`Renderer::commands`] into the backend's pass.
    Presented,
    /// A frame-recoverable error aborted the frame; nothing to replay.
    Skipped,
}

/// Resources owned alongside the device.
struct Parts {
    frames: Vec<FrameHeaps>,
    staging: StagingHeap,
    fallback: Texture,
}

impl Parts {
    /// Creates every frame slot, the staging heap and the white fallback
    /// texture. On failure, whatever was created is released again.
    fn acquire<D: GpuDevice + ?Sized>(device: &mut D, config: &RendererConfig, decoder: &dyn ImageDecoder) -> Result<Self> {
        if config.frames_in_flight == 0 {
            return Err(RenderError::invalid("frames_in_flight must be at least 1"));
        }

        let mut frames = Vec::with_capacity(config.frames_in_flight);
        for _ in 0..config.frames_in_flight {
            match FrameHeaps::new(device, config) {
                Ok(heaps) => frames.push(heaps),
                Err(e) => {
                    release_frames(device, frames);
                    return Err(e);
                }
            }
        }

        let mut staging = match StagingHeap::new(device, config.staging_capacity) {
            Ok(staging) => staging,
            Err(e) => {
                release_frames(device, frames);
                return Err(e);
            }
        };

        let white = [u8::MAX; 4];
        let fallback = match Texture::create(device, &mut staging, decoder, &TextureDesc::from_data(&white, 1, 1, ImageFormat::Rgba8Unorm)) {
            Ok(texture) => texture,
            Err(e) => {
                staging.destroy(device);
                release_frames(device, frames);
                return Err(e);
            }
        };

        Ok(Self { frames, staging, fallback })
    }

    fn release<D: GpuDevice + ?Sized>(self, device: &mut D) {
        self.fallback.destroy(device);
        self.staging.destroy(device);
        release_frames(device, self.frames);
    }
}

fn release_frames<D: GpuDevice + ?Sized>(device: &mut D, frames: Vec<FrameHeaps>) {
    for heaps in frames.into_iter().rev() {
        heaps.destroy(device);
    }
}

/// Frame-heap renderer.
///
/// Owns the device, one [`FrameHeaps`] set per frame in flight, the staging
/// heap and the command list drawables are recorded into. A frame is
/// `begin_frame` → any number of `submit` → `end_frame`, after which the
/// backend replays [`commands`](Renderer::commands).
pub struct Renderer<D: GpuDevice> {
    device: D,
    config: RendererConfig,
    frames: Vec<FrameHeaps>,
    frame_index: usize,
    frames_begun: u64,
    staging: StagingHeap,
    decoder: Box<dyn ImageDecoder>,
    commands: CommandList,
    scratch: Scratch,
    fallback: Texture,
    viewport: Viewport,
    clock: FrameClock,
    in_frame: bool,
}

impl<D: GpuDevice> Renderer<D> {
    pub fn new(device: D, config: RendererConfig) -> Result<Self> {
        Self::with_decoder(device, config, Box::new(ImageCrateDecoder))
    }

    pub fn with_decoder(mut device: D, config: RendererConfig, decoder: Box<dyn ImageDecoder>) -> Result<Self> {
        let Parts { frames, staging, fallback } = Parts::acquire(&mut device, &config, decoder.as_ref())?;

        log::info!(
            "renderer ready: {} frames in flight, viewport {}x{}",
            frames.len(),
            config.viewport.width,
            config.viewport.height
        );

        Ok(Self {
            device,
            viewport: config.viewport,
            config,
            frames,
            frame_index: 0,
            frames_begun: 0,
            staging,
            decoder,
            commands: CommandList::new(),
            scratch: Scratch::default(),
            fallback,
            clock: FrameClock::new(),
            in_frame: false,
        })
    }

    // ── accessors ─────────────────────────────────────────────────────────

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Device access for destroying resources created through the renderer.
    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn config(&self) -> &RendererConfig {
        &self.config
    }

    #[inline]
    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Takes effect for drawables submitted after the call.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        if viewport != self.viewport {
            log::debug!("viewport resized to {}x{}", viewport.width, viewport.height);
            self.viewport = viewport;
        }
    }

    /// Frame-in-flight slot of the current (or last) frame.
    #[inline]
    pub fn frame_index(&self) -> usize {
        self.frame_index
    }

    #[inline]
    pub fn frames_in_flight(&self) -> usize {
        self.frames.len()
    }

    /// Commands recorded by the current (or last) frame.
    #[inline]
    pub fn commands(&self) -> &CommandList {
        &self.commands
    }

    #[inline]
    pub fn fallback_binding(&self) -> BindingId {
        self.fallback.binding()
    }

    #[inline]
    pub fn clock(&self) -> &FrameClock {
        &self.clock
    }

    /// Heap snapshot of the current frame slot.
    pub fn heap_stats(&self) -> [HeapStats; 3] {
        self.frames[self.frame_index].stats()
    }

    // ── frame boundary ────────────────────────────────────────────────────

    /// Advances to the next frame slot, resets its heaps and clears the
    /// command list.
    ///
    /// The caller must have waited for the GPU work that last used the slot.
    pub fn begin_frame(&mut self) -> Result<FrameTime> {
        if self.in_frame {
            return Err(RenderError::invalid("begin_frame called twice without end_frame"));
        }
        if self.frames_begun > 0 {
            self.frame_index = (self.frame_index + 1) % self.frames.len();
        }
        self.frames_begun += 1;

        self.frames[self.frame_index].reset(&mut self.device);
        self.commands.clear();
        self.in_frame = true;
        Ok(self.clock.tick())
    }

    /// Records one drawable into the current frame.
    ///
    /// A failed drawable leaves no commands behind; staged bytes stay
    /// allocated until the slot is next reset.
    pub fn submit(&mut self, camera: &Camera, drawable: Drawable<'_>) -> Result<()> {
        if !self.in_frame {
            return Err(RenderError::invalid(format!(
                "{} submitted outside begin_frame / end_frame",
                drawable.kind()
            )));
        }

        let kind = drawable.kind();
        let mark = self.commands.mark();
        let fallback = self.fallback.binding();
        let result = Encoder {
            device: &mut self.device,
            heaps: &mut self.frames[self.frame_index],
            commands: &mut self.commands,
            scratch: &mut self.scratch,
            camera,
            viewport: self.viewport,
            frame_index: self.frame_index,
            fallback,
        }
        .encode(drawable);

        if let Err(e) = &result {
            self.commands.rewind(mark);
            log::warn!("{kind} submission aborted: {e}");
        }
        result
    }

    /// Flushes the frame heaps and hands out the recorded commands.
    pub fn end_frame(&mut self) -> Result<&CommandList> {
        if !self.in_frame {
            return Err(RenderError::invalid("end_frame without begin_frame"));
        }
        self.in_frame = false;
        self.frames[self.frame_index].flush(&mut self.device)?;
        Ok(&self.commands)
    }

    /// Drops everything recorded in the current frame.
    pub fn abort_frame(&mut self) {
        self.in_frame = false;
        self.commands.clear();
    }

    /// Runs one whole frame around `record`.
    ///
    /// Frame-recoverable errors (see [`RenderError::is_frame_recoverable`])
    /// discard the frame and yield [`FrameOutcome::Skipped`]; any other error
    /// is returned.
    pub fn frame<F>(&mut self, record: F) -> Result<FrameOutcome>
    where
        F: FnOnce(&mut Self, FrameTime) -> Result<()>,
    {
        let time = self.begin_frame()?;
        match record(self, time).and_then(|()| self.end_frame().map(|_| ())) {
            Ok(()) => Ok(FrameOutcome::Presented),
            Err(e) if e.is_frame_recoverable() => {
                log::warn!("frame {} skipped: {e}", time.frame_index);
                self.abort_frame();
                Ok(FrameOutcome::Skipped)
            }
            Err(e) => {
                self.abort_frame();
                Err(e)
            }
        }
    }

    // ── resources ─────────────────────────────────────────────────────────

    pub fn create_texture(&mut self, desc: &TextureDesc<'_>) -> Result<Texture> {
        Texture::create(&mut self.device, &mut self.staging, self.decoder.as_ref(), desc)
    }

    /// Loads a cube map from the six face images under `dir`.
    pub fn create_skybox(&mut self, dir: &Path) -> Result<Skybox> {
        Skybox::load(&mut self.device, &mut self.staging, self.decoder.as_ref(), dir)
    }

    pub fn create_font(&mut self, font_bytes: &[u8], pixel_size: f32) -> Result<FontAtlas> {
        FontAtlas::new(&mut self.device, &mut self.staging, self.decoder.as_ref(), font_bytes, pixel_size)
    }

    /// Black `Rgba8Unorm` compute texture matching the fluid grid, for
    /// [`FluidQuad`](crate::draw::FluidQuad).
    pub fn create_fluid_texture(&mut self, fluid: &FluidSimulation) -> Result<Texture> {
        let (width, height) = (fluid.width() as u32, fluid.height() as u32);
        let pixels = vec![0u8; width as usize * height as usize * 4];
        let desc = TextureDesc {
            kind: TextureKind::Compute,
            source: TextureSource::Data {
                pixels: &pixels,
                width,
                height,
                format: ImageFormat::Rgba8Unorm,
            },
            sampler: SamplerDesc {
                address_mode: AddressMode::ClampToEdge,
                ..SamplerDesc::default()
            },
        };
        self.create_texture(&desc)
    }

    pub fn create_model(&mut self, desc: &ModelDesc<'_>) -> Result<Model> {
        Model::upload(self, desc)
    }

    /// Device-local buffer initialised with `bytes` through the staging heap.
    pub fn upload_buffer(&mut self, usage: BufferUsage, label: &'static str, bytes: &[u8]) -> Result<BufferId> {
        if bytes.is_empty() {
            return Err(RenderError::invalid(format!("empty upload to {label}")));
        }
        let size = align_up(bytes.len() as u64, self.device.limits().copy_alignment);

        let mut scope = ResourceScope::new(&mut self.device);
        let buffer = scope
            .create_buffer(&BufferDesc { label, size, usage })
            .map_err(|e| RenderError::from_allocation(size, e))?;
        self.staging.upload_buffers(scope.device(), &[(buffer, bytes)])?;
        scope.commit();
        Ok(buffer)
    }

    /// Borrows what resource uploads need, split from the rest of the renderer.
    pub(crate) fn upload_parts(&mut self) -> (&mut D, &mut StagingHeap, &dyn ImageDecoder, usize) {
        (&mut self.device, &mut self.staging, self.decoder.as_ref(), self.frames.len())
    }

    // ── stats overlay ─────────────────────────────────────────────────────

    /// One line for the frame rate, one per heap of the current slot.
    pub fn stats_lines(&self) -> Vec<String> {
        let mut lines = Vec::with_capacity(4);
        lines.push(format!("{:.0} fps", self.clock.fps()));
        for stats in self.heap_stats() {
            lines.push(format!(
                "{:?} heap: {} / {} KiB ({} retired)",
                stats.class,
                stats.used / 1024,
                stats.capacity / 1024,
                stats.retired
            ));
        }
        lines
    }

    /// Draws [`stats_lines`](Renderer::stats_lines) as text, starting at
    /// `position` in normalised device coordinates.
    pub fn submit_stats(&mut self, font: &dyn GlyphSource, position: Vec2, color: Vec3) -> Result<()> {
        let text = self.stats_lines().join("\n");
        let text = Text { text: &text, position, color, font };
        self.submit(&Camera::identity(), Drawable::Text(&text))
    }

    // ── teardown ──────────────────────────────────────────────────────────

    /// Releases renderer-owned resources and gives the device back.
    ///
    /// Textures, models and buffers created through the renderer are owned by
    /// the caller and must be destroyed first.
    pub fn destroy(mut self) -> D {
        let parts = Parts {
            frames: self.frames,
            staging: self.staging,
            fallback: self.fallback,
        };
        parts.release(&mut self.device);
        self.device
    }
}
