//! Windowing glue around the render pipeline.
//!
//! Owns the winit event loop and drives the viewer's four entry points:
//! GPU bring-up and model upload when the window appears, attachment
//! recreation on resize, one render per frame, and the keyboard bindings
//! (Esc quit, F fullscreen, B blend toggle, W/S zoom).

use std::sync::Arc;
use std::time::Instant;

use anyhow::Context;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

use crate::gfx::{Model, OrbitCamera, RenderEngine};
use crate::scene::{LoadError, LoadedModel};

const WINDOW_TITLE: &str = "sceneview";
const INITIAL_SIZE: (u32, u32) = (1280, 720);
const INITIAL_CAMERA_DISTANCE: f32 = 20.0;
/// W/S move the camera this far per frame while held.
const ZOOM_STEP: f32 = 0.5;

pub struct ViewerApp {
    event_loop: Option<EventLoop<()>>,
    state: ViewerState,
}

struct ViewerState {
    window: Option<Arc<Window>>,
    engine: Option<RenderEngine>,
    /// CPU-side model waiting for GPU upload in `resumed`.
    pending: Option<LoadedModel>,
    model: Option<Model>,
    camera: OrbitCamera,

    zoom_in_held: bool,
    zoom_out_held: bool,

    last_frame: Instant,
    frames_this_second: u32,
    last_title_update: Instant,

    error: Option<LoadError>,
}

impl ViewerApp {
    /// Creates the viewer for an already loaded model. The GPU side comes
    /// up when the event loop delivers the first `resumed`.
    pub fn new(loaded: LoadedModel) -> anyhow::Result<Self> {
        let event_loop = EventLoop::new().context("failed to create event loop")?;
        let (width, height) = INITIAL_SIZE;

        Ok(Self {
            event_loop: Some(event_loop),
            state: ViewerState {
                window: None,
                engine: None,
                pending: Some(loaded),
                model: None,
                camera: OrbitCamera::new(INITIAL_CAMERA_DISTANCE, width as f32 / height as f32),
                zoom_in_held: false,
                zoom_out_held: false,
                last_frame: Instant::now(),
                frames_this_second: 0,
                last_title_update: Instant::now(),
                error: None,
            },
        })
    }

    /// Runs until the window closes or a fatal GPU error stops the loop.
    pub fn run(mut self) -> anyhow::Result<()> {
        let event_loop = self.event_loop.take().expect("event loop already consumed");
        event_loop.set_control_flow(ControlFlow::Poll);
        event_loop
            .run_app(&mut self.state)
            .context("event loop failed")?;

        match self.state.error.take() {
            Some(error) => Err(error).context("viewer stopped"),
            None => Ok(()),
        }
    }
}

impl ViewerState {
    fn fail(&mut self, event_loop: &ActiveEventLoop, error: LoadError) {
        log::error!("{error}");
        self.error = Some(error);
        event_loop.exit();
    }

    /// Uploads the pending model: buffers, textures, bind groups, in that
    /// order. Any failure aborts the whole load.
    fn upload_model(&mut self, engine: &RenderEngine) -> Result<Model, LoadError> {
        let loaded = self
            .pending
            .take()
            .expect("model upload requested twice");
        let mut model = Model::new(loaded);
        model.create_buffers(engine.device())?;
        model.load_textures(engine.device(), engine.queue())?;
        model.bind(engine.device(), engine.layouts())?;
        log::info!("model bound: {} parts", model.part_count());
        Ok(model)
    }

    fn handle_key(&mut self, event_loop: &ActiveEventLoop, event: KeyEvent) {
        let PhysicalKey::Code(code) = event.physical_key else {
            return;
        };
        let pressed = event.state == ElementState::Pressed;

        match code {
            KeyCode::KeyW => self.zoom_in_held = pressed,
            KeyCode::KeyS => self.zoom_out_held = pressed,
            KeyCode::Escape if pressed => event_loop.exit(),
            KeyCode::KeyF if pressed && !event.repeat => {
                if let Some(window) = self.window.as_ref() {
                    let fullscreen = match window.fullscreen() {
                        Some(_) => None,
                        None => Some(Fullscreen::Borderless(None)),
                    };
                    window.set_fullscreen(fullscreen);
                }
            }
            KeyCode::KeyB if pressed && !event.repeat => {
                if let Some(engine) = self.engine.as_mut() {
                    engine.toggle_blend_mode();
                }
            }
            _ => {}
        }
    }

    fn redraw(&mut self, event_loop: &ActiveEventLoop) {
        let now = Instant::now();
        let dt = now.duration_since(self.last_frame).as_secs_f32();
        self.last_frame = now;

        self.camera.advance(dt);
        if self.zoom_in_held {
            self.camera.zoom(-ZOOM_STEP);
        }
        if self.zoom_out_held {
            self.camera.zoom(ZOOM_STEP);
        }

        self.frames_this_second += 1;
        if now.duration_since(self.last_title_update).as_secs_f32() >= 1.0 {
            if let Some(window) = self.window.as_ref() {
                window.set_title(&format!(
                    "{WINDOW_TITLE} ({} FPS)",
                    self.frames_this_second
                ));
            }
            self.frames_this_second = 0;
            self.last_title_update = now;
        }

        let (Some(engine), Some(model)) = (self.engine.as_mut(), self.model.as_ref()) else {
            return;
        };
        if let Err(error) = engine.render_frame(model, self.camera.frame()) {
            self.fail(event_loop, error);
        }
    }
}

impl ApplicationHandler for ViewerState {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let (width, height) = INITIAL_SIZE;
        let window = match event_loop.create_window(
            WindowAttributes::default()
                .with_title(WINDOW_TITLE)
                .with_inner_size(winit::dpi::LogicalSize::new(width, height)),
        ) {
            Ok(window) => Arc::new(window),
            Err(err) => {
                return self.fail(
                    event_loop,
                    LoadError::GpuResourceFailure(format!("window creation: {err}")),
                );
            }
        };
        self.window = Some(window.clone());

        let (width, height) = window.inner_size().into();
        self.camera.resize_projection(width, height);

        let engine = match pollster::block_on(RenderEngine::new(window, width, height)) {
            Ok(engine) => engine,
            Err(error) => return self.fail(event_loop, error),
        };

        match self.upload_model(&engine) {
            Ok(model) => self.model = Some(model),
            Err(error) => return self.fail(event_loop, error),
        }
        self.engine = Some(engine);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _window_id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(PhysicalSize { width, height }) => {
                self.camera.resize_projection(width, height);
                if let Some(engine) = self.engine.as_mut() {
                    engine.resize(width, height);
                }
            }
            WindowEvent::KeyboardInput { event, .. } => self.handle_key(event_loop, event),
            WindowEvent::RedrawRequested => self.redraw(event_loop),
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = self.window.as_ref() {
            window.request_redraw();
        }
    }
}
