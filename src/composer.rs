//! hwcomposer device adapter
//!
//! Models the HWC 1.0 entry points on top of [`VsyncEmulator`]. Composition
//! is minimal: video overlay buffers are tagged for the overlay path, every
//! other layer is left to GPU composition, and `set` presents by swapping
//! the client target.

use crate::clock::Nsecs;
use crate::config::VsyncConfig;
use crate::vsync::VsyncEmulator;
use crate::{Error, Result};
use std::sync::Arc;
use tracing::{debug, error, info};

/// Device name accepted by [`HwcDevice::open`]
pub const HWC_HARDWARE_COMPOSER: &str = "composer";

/// Layer hint asking SurfaceFlinger to clear the framebuffer under the layer
pub const HWC_HINT_CLEAR_FB: u32 = 0x0000_0002;

/// gralloc private flag marking buffers scanned out by the video layer
pub const PRIV_FLAGS_VIDEO_OVERLAY: u32 = 0x0000_0010;

/// Primary display index
pub const HWC_DISPLAY_PRIMARY: i32 = 0;

/// Events the host can toggle with [`HwcDevice::event_control`]
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HwcEvent {
    Vsync = 0,
}

impl TryFrom<i32> for HwcEvent {
    type Error = Error;

    fn try_from(event: i32) -> Result<Self> {
        match event {
            0 => Ok(HwcEvent::Vsync),
            other => Err(Error::InvalidEvent(other)),
        }
    }
}

/// How a layer reaches the screen
#[repr(i32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompositionType {
    /// Drawn into the framebuffer by the GPU
    #[default]
    Framebuffer = 0,
    /// Shown directly by a hardware plane
    Overlay = 1,
    Background = 2,
    FramebufferTarget = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

/// The part of a gralloc buffer handle the composer looks at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BufferHandle {
    pub flags: u32,
}

impl BufferHandle {
    pub fn is_video_overlay(&self) -> bool {
        self.flags & PRIV_FLAGS_VIDEO_OVERLAY != 0
    }
}

#[derive(Debug, Clone, Default)]
pub struct Layer {
    pub handle: Option<BufferHandle>,
    pub composition: CompositionType,
    pub hints: u32,
    pub transform: u32,
    pub display_frame: Rect,
}

/// Geometry of the last layer routed to the video overlay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OverlayGeometry {
    pub transform: u32,
    pub display_frame: Rect,
}

/// Presents a GPU-composited frame
pub trait SwapTarget {
    /// Returns false if the frame could not be presented
    fn swap_buffers(&mut self) -> bool;
}

/// Per-display layer list plus its client target
pub struct DisplayContents<S> {
    pub layers: Vec<Layer>,
    pub target: S,
}

/// Callbacks into the display host
pub trait HwcProcs: Send + Sync {
    fn vsync(&self, display: i32, timestamp: Nsecs);
}

/// An opened hwcomposer device
pub struct HwcDevice {
    vsync: VsyncEmulator,
    saved_overlay: Option<OverlayGeometry>,
}

impl HwcDevice {
    /// Open the composer and start its vsync thread
    pub fn open(name: &str, config: VsyncConfig) -> Result<Self> {
        if name != HWC_HARDWARE_COMPOSER {
            return Err(Error::UnknownDevice(name.to_string()));
        }

        let mut vsync = VsyncEmulator::new(config)?;
        if let Err(e) = vsync.start() {
            error!("failed to start vsync thread: {}", e);
            return Err(e);
        }

        info!("hwcomposer opened");
        Ok(Self {
            vsync,
            saved_overlay: None,
        })
    }

    pub fn event_control(&self, disp: i32, event: i32, enabled: bool) -> Result<()> {
        match HwcEvent::try_from(event)? {
            HwcEvent::Vsync => {
                debug!("display {} vsync event -> {}", disp, enabled);
                self.vsync.set_enabled(enabled);
                Ok(())
            }
        }
    }

    /// Register the host callbacks; vsync ticks are reported for the primary display
    pub fn register_procs(&self, procs: Arc<dyn HwcProcs>) -> Result<()> {
        self.vsync
            .register_callback(move |ts| procs.vsync(HWC_DISPLAY_PRIMARY, ts))
    }

    /// Decide per layer whether the overlay path can show it
    pub fn prepare<S>(&mut self, displays: &mut [DisplayContents<S>]) -> Result<()> {
        let Some(primary) = displays.first_mut() else {
            return Ok(());
        };

        for layer in primary.layers.iter_mut() {
            let Some(handle) = layer.handle else {
                continue;
            };
            if handle.is_video_overlay() {
                layer.hints |= HWC_HINT_CLEAR_FB;
                layer.composition = CompositionType::Overlay;
                self.saved_overlay = Some(OverlayGeometry {
                    transform: layer.transform,
                    display_frame: layer.display_frame,
                });
            }
        }
        Ok(())
    }

    /// Present the frame. Only a single display is supported; anything else is ignored.
    pub fn set<S: SwapTarget>(&self, displays: &mut [DisplayContents<S>]) -> Result<()> {
        let [display] = displays else {
            return Ok(());
        };
        if !display.target.swap_buffers() {
            return Err(Error::Egl("eglSwapBuffers failed".to_string()));
        }
        Ok(())
    }

    /// Blanking is not supported by this hardware; always succeeds
    pub fn blank(&self, _display: i32, _blank: bool) -> Result<()> {
        Ok(())
    }

    pub fn saved_overlay(&self) -> Option<OverlayGeometry> {
        self.saved_overlay
    }

    pub fn vsync(&self) -> &VsyncEmulator {
        &self.vsync
    }

    /// Stop the vsync thread and release the device
    pub fn close(mut self) -> Result<()> {
        info!("hwcomposer closing");
        self.vsync.shutdown()
    }
}
