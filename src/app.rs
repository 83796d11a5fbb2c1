//! Demo window: an analytic flow under the renderer, with a mouse brush.
//!
//! Keys: M cycles visual modes, P palettes, F post filters, B brush modes,
//! E toggles erase, Space pauses the flow.

use std::sync::Arc;

use flowlens::{
    Brush, BrushGeometry, CanvasMapping, FilterKind, FlowRenderer, FlowSolver, GpuContext, GridSize, RenderConfig,
    RenderError, Vec2,
};
use winit::application::ApplicationHandler;
use winit::event::{ElementState, KeyEvent, MouseButton, MouseScrollDelta, WindowEvent};
use winit::event_loop::ActiveEventLoop;
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::{Window, WindowId};

use crate::demo_flow::DemoFlow;

const GRID: GridSize = GridSize {
    width: 256,
    height: 144,
};
const ITERATIONS_PER_FRAME: u32 = 2;

struct DemoState {
    context: GpuContext,
    renderer: FlowRenderer,
    flow: DemoFlow,
}

pub struct App {
    config: RenderConfig,
    window: Option<Arc<Window>>,
    state: Option<DemoState>,
    mouse_pressed: bool,
    cursor: Option<Vec2>,
    last_stroke: Option<Vec2>,
    paused: bool,
}

impl App {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            config,
            window: None,
            state: None,
            mouse_pressed: false,
            cursor: None,
            last_stroke: None,
            paused: false,
        }
    }

    fn apply_config(&mut self) {
        let Some(state) = &mut self.state else {
            return;
        };
        if let Err(e) = state.renderer.configure(self.config) {
            log::error!("Rejected configuration: {}", e);
            self.config = *state.renderer.config();
        }
    }

    fn handle_key(&mut self, code: KeyCode) {
        match code {
            KeyCode::KeyM => {
                self.config.visual.mode = self.config.visual.mode.next();
                log::info!("Visual mode: {}", self.config.visual.mode.label());
            }
            KeyCode::KeyP => {
                self.config.visual.palette = self.config.visual.palette.next();
                log::info!("Palette: {:?}", self.config.visual.palette);
            }
            KeyCode::KeyF => {
                let filter = self.config.post.filter.next();
                self.config.post.filter = filter;
                self.config.post.enabled = filter != FilterKind::Identity;
                log::info!("Post filter: {:?}", filter);
            }
            KeyCode::KeyB => {
                self.config.brush.mode = self.config.brush.mode.next();
                log::info!("Brush mode: {:?}", self.config.brush.mode);
            }
            KeyCode::KeyE => self.config.brush.erase = !self.config.brush.erase,
            KeyCode::Space => {
                self.paused = !self.paused;
                return;
            }
            _ => return,
        }
        self.apply_config();
    }

    /// Grid position of the pointer, if it is over the window.
    fn cursor_cell(&self) -> Option<(Vec2, CanvasMapping)> {
        let state = self.state.as_ref()?;
        let mapping = CanvasMapping::new(state.context.size, state.renderer.grid());
        Some((mapping.to_grid(self.cursor?), mapping))
    }

    fn paint(&mut self) {
        let Some((center, mapping)) = self.cursor_cell() else {
            return;
        };
        let drag = match (self.last_stroke, self.cursor) {
            (Some(last), Some(now)) => mapping.delta_to_grid(now - last),
            _ => Vec2::ZERO,
        };
        self.last_stroke = self.cursor;
        if let Some(state) = &mut self.state {
            self.config.brush.stroke(center, drag).apply(&mut state.flow);
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let center = self.cursor_cell().map(|(center, _)| center);
        let cursor = hover_outline(center, self.mouse_pressed, self.config.brush.geometry);
        let Some(state) = &mut self.state else {
            return;
        };

        if !self.paused {
            state.flow.step_simulation(ITERATIONS_PER_FRAME);
            let boundary = state.flow.boundary();
            state
                .renderer
                .advance_particles(ITERATIONS_PER_FRAME as f32, boundary);
        }
        state.renderer.set_cursor(cursor);

        let Err(e) = state.render() else {
            return;
        };
        match recovery(&e) {
            Recovery::Reconfigure => {
                let (width, height) = state.context.size;
                state.context.resize(width, height);
                state.renderer.resize_surface(state.context.size);
            }
            Recovery::Exit => {
                log::error!("Stopping: {}", e);
                event_loop.exit();
            }
            Recovery::Skip => log::warn!("Frame skipped: {}", e),
        }
    }
}

/// Brush outline to draw, shown only while the pointer hovers without painting.
fn hover_outline(center: Option<Vec2>, painting: bool, geometry: BrushGeometry) -> Option<Brush> {
    if painting {
        return None;
    }
    center.map(|center| Brush::new(center, geometry))
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Recovery {
    Reconfigure,
    Exit,
    Skip,
}

fn recovery(error: &RenderError) -> Recovery {
    match error {
        RenderError::Surface(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => Recovery::Reconfigure,
        RenderError::Surface(wgpu::SurfaceError::OutOfMemory) => Recovery::Exit,
        _ => Recovery::Skip,
    }
}

impl DemoState {
    fn render(&mut self) -> Result<(), RenderError> {
        let frame = self.context.surface.get_current_texture()?;
        let view = frame.texture.create_view(&wgpu::TextureViewDescriptor::default());
        self.renderer.render_frame(&mut self.flow, &view);
        frame.present();
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        let window_attrs = Window::default_attributes()
            .with_title("flowlens")
            .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
        let window = match event_loop.create_window(window_attrs) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                log::error!("Failed to create window: {}", e);
                event_loop.exit();
                return;
            }
        };
        self.window = Some(window.clone());

        let state = pollster::block_on(GpuContext::new(window))
            .map_err(RenderError::from)
            .and_then(|context| {
                let renderer = FlowRenderer::for_context(&context, GRID, self.config)?;
                log::info!("Particles advance on {:?}", renderer.backend());
                Ok(DemoState {
                    context,
                    renderer,
                    flow: DemoFlow::new(GRID),
                })
            });
        match state {
            Ok(state) => self.state = Some(state),
            Err(e) => {
                log::error!("Failed to start renderer: {}", e);
                event_loop.exit();
            }
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                event_loop.exit();
            }
            WindowEvent::Resized(physical_size) => {
                if let Some(state) = &mut self.state {
                    state.context.resize(physical_size.width, physical_size.height);
                    state.renderer.resize_surface(state.context.size);
                }
            }
            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(code),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => self.handle_key(code),
            WindowEvent::MouseInput { state, button, .. } => {
                if button == MouseButton::Left {
                    self.mouse_pressed = state == ElementState::Pressed;
                    self.last_stroke = None;
                    if self.mouse_pressed {
                        self.paint();
                    }
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.cursor = Some(Vec2::new(position.x as f32, position.y as f32));
                if self.mouse_pressed {
                    self.paint();
                }
            }
            WindowEvent::CursorLeft { .. } => {
                self.cursor = None;
                self.last_stroke = None;
            }
            WindowEvent::MouseWheel { delta, .. } => {
                let scroll = match delta {
                    MouseScrollDelta::LineDelta(_, y) => y,
                    MouseScrollDelta::PixelDelta(pos) => pos.y as f32 * 0.1,
                };
                let geometry = &mut self.config.brush.geometry;
                geometry.radius = (geometry.radius + scroll).clamp(1.0, 64.0);
                self.apply_config();
            }
            WindowEvent::RedrawRequested => {
                self.redraw(event_loop);
                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowlens::GpuError;

    #[test]
    fn test_outline_hidden_while_painting() {
        let center = Some(Vec2::new(12.0, 8.0));
        let geometry = BrushGeometry::default();
        assert!(hover_outline(center, true, geometry).is_none());
        assert_eq!(hover_outline(center, false, geometry), Some(Brush::new(Vec2::new(12.0, 8.0), geometry)));
        assert!(hover_outline(None, false, geometry).is_none());
    }

    #[test]
    fn test_surface_errors_pick_recovery() {
        assert_eq!(recovery(&wgpu::SurfaceError::Lost.into()), Recovery::Reconfigure);
        assert_eq!(recovery(&wgpu::SurfaceError::Outdated.into()), Recovery::Reconfigure);
        assert_eq!(recovery(&wgpu::SurfaceError::OutOfMemory.into()), Recovery::Exit);
        assert_eq!(recovery(&wgpu::SurfaceError::Timeout.into()), Recovery::Skip);
        assert_eq!(recovery(&RenderError::Gpu(GpuError::NoAdapter)), Recovery::Skip);
    }
}
