use anyhow::{Context, Result};

use crate::config::Viewport;
use crate::error::{DeviceError, RenderError};

use super::device::WgpuDevice;
use super::init::WgpuInit;

/// High-level response after a surface error.
#[derive(Debug, Copy, Clone, Eq, PartialEq)]
pub enum SurfaceErrorAction {
    /// Surface was reconfigured; rendering may resume next frame.
    Reconfigured,
    /// Transient error; skip the current frame.
    SkipFrame,
    /// Fatal error (commonly OOM); terminate gracefully.
    Fatal,
}

impl SurfaceErrorAction {
    pub fn of(err: &wgpu::SurfaceError) -> Self {
        match err {
            wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated => SurfaceErrorAction::Reconfigured,
            wgpu::SurfaceError::OutOfMemory => SurfaceErrorAction::Fatal,
            wgpu::SurfaceError::Timeout | wgpu::SurfaceError::Other => SurfaceErrorAction::SkipFrame,
        }
    }
}

pub(crate) fn choose_surface_format(formats: &[wgpu::TextureFormat], prefer_srgb: bool) -> Option<wgpu::TextureFormat> {
    if prefer_srgb {
        let preferred = [wgpu::TextureFormat::Bgra8UnormSrgb, wgpu::TextureFormat::Rgba8UnormSrgb];
        if let Some(f) = preferred.into_iter().find(|f| formats.contains(f)) {
            return Some(f);
        }
    }
    formats.first().copied()
}

pub(crate) fn choose_alpha_mode(
    modes: &[wgpu::CompositeAlphaMode],
    requested: Option<wgpu::CompositeAlphaMode>,
) -> wgpu::CompositeAlphaMode {
    requested
        .filter(|m| modes.contains(m))
        .or_else(|| modes.first().copied())
        .unwrap_or(wgpu::CompositeAlphaMode::Auto)
}

/// Window surface (swapchain) of a [`WgpuDevice`].
///
/// The window itself is owned by the caller; `'w` ties the surface to it.
pub struct WgpuSurface<'w> {
    surface: wgpu::Surface<'w>,
    config: wgpu::SurfaceConfiguration,
    size: Viewport,
}

impl<'w> WgpuSurface<'w> {
    /// Creates a device compatible with `target` and the configured surface.
    pub fn with_device(
        target: impl Into<wgpu::SurfaceTarget<'w>>,
        init: &WgpuInit,
        size: Viewport,
    ) -> Result<(WgpuDevice, Self)> {
        anyhow::ensure!(size.width > 0 && size.height > 0, "surface has zero size");

        // Use all backends to allow wgpu to select the optimal platform backend.
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });
        let surface = instance
            .create_surface(target)
            .context("failed to create wgpu surface")?;

        let device = pollster::block_on(WgpuDevice::request(&instance, Some(&surface), init))?;
        let surface = Self::new(&device, surface, init, size)?;
        Ok((device, surface))
    }

    /// Configures `surface` for `device`.
    pub fn new(device: &WgpuDevice, surface: wgpu::Surface<'w>, init: &WgpuInit, size: Viewport) -> Result<Self> {
        let caps = surface.get_capabilities(device.adapter());
        let format = choose_surface_format(&caps.formats, init.prefer_srgb).context("no supported surface formats")?;
        let alpha_mode = choose_alpha_mode(&caps.alpha_modes, init.alpha_mode);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: init.present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: init.desired_maximum_frame_latency,
        };
        surface.configure(device.device(), &config);
        log::info!("surface configured: {format:?} {}x{}", config.width, config.height);

        Ok(Self { surface, config, size })
    }

    #[inline]
    pub fn format(&self) -> wgpu::TextureFormat {
        self.config.format
    }

    /// Current drawable size in physical pixels.
    #[inline]
    pub fn size(&self) -> Viewport {
        self.size
    }

    /// Reconfigures the surface after a resize.
    ///
    /// wgpu does not support configuring a surface with a 0x0 size; in that case,
    /// only internal state is updated and configuration is deferred.
    pub fn resize(&mut self, device: &WgpuDevice, size: Viewport) {
        self.size = size;
        if size.width == 0 || size.height == 0 {
            return;
        }
        self.config.width = size.width;
        self.config.height = size.height;
        self.surface.configure(device.device(), &self.config);
    }

    /// Acquires the next surface texture.
    ///
    /// Lost or outdated surfaces are reconfigured and reported as
    /// [`RenderError::OutdatedSwapchain`], as are transient timeouts; the frame
    /// should be skipped and retried. Out-of-memory is fatal.
    pub fn acquire(&mut self, device: &WgpuDevice) -> crate::Result<wgpu::SurfaceTexture> {
        let err = match self.surface.get_current_texture() {
            Ok(texture) => return Ok(texture),
            Err(err) => err,
        };

        match SurfaceErrorAction::of(&err) {
            SurfaceErrorAction::Reconfigured => {
                if self.size.width > 0 && self.size.height > 0 {
                    self.surface.configure(device.device(), &self.config);
                }
                log::debug!("surface {err}; reconfigured");
                Err(RenderError::OutdatedSwapchain)
            }
            SurfaceErrorAction::SkipFrame => {
                log::warn!("surface {err}; skipping frame");
                Err(RenderError::OutdatedSwapchain)
            }
            SurfaceErrorAction::Fatal => {
                log::error!("surface {err}");
                Err(RenderError::Device(DeviceError::OutOfMemory { requested: 0 }))
            }
        }
    }
}
