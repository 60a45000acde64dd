// Renderer seam driven by the render tick

use serde::{Deserialize, Serialize};
use tracing::info;

/// Size of the render surface in pixels
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowDimensions {
    pub width: u32,
    pub height: u32,
}

impl WindowDimensions {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }
}

/// Scene renderer owned by the engine.
///
/// `init` runs once when the engine starts, `render_frame` once per render tick.
pub trait Renderer: Send {
    fn init(&mut self, dimensions: WindowDimensions, field_of_view: f32);

    fn render_frame(&mut self);
}

/// Renderer that draws nothing and counts frames
#[derive(Debug, Default)]
pub struct HeadlessRenderer {
    dimensions: Option<WindowDimensions>,
    field_of_view: f32,
    frames: u64,
}

impl HeadlessRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Surface size given to `init`, `None` before the engine started
    pub fn dimensions(&self) -> Option<WindowDimensions> {
        self.dimensions
    }

    pub fn field_of_view(&self) -> f32 {
        self.field_of_view
    }

    pub fn frames(&self) -> u64 {
        self.frames
    }
}

impl Renderer for HeadlessRenderer {
    fn init(&mut self, dimensions: WindowDimensions, field_of_view: f32) {
        info!(
            width = dimensions.width,
            height = dimensions.height,
            field_of_view,
            "Headless renderer initialized"
        );
        self.dimensions = Some(dimensions);
        self.field_of_view = field_of_view;
    }

    fn render_frame(&mut self) {
        self.frames += 1;
    }
}
