// Wayland integration module
// Shows the image on a layer-shell surface using smithay-client-toolkit

use crate::app::{AppState, TerminationReason};
use crate::image_loader::ImageData;
use crate::key_monitor::{classify, Key, KeyAction, KeyMonitor};
use crate::overlay::{OverlayConfig, Placement, ScreenSize};
use crate::wgpu_renderer::WgpuRenderer;
use anyhow::{anyhow, Context, Result};
use log::{debug, error, info, warn};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputState},
    reexports::{
        calloop::{channel, EventLoop},
        calloop_wayland_source::WaylandSource,
    },
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        wlr_layer::{
            Anchor, LayerShell, LayerShellHandler, LayerSurface, LayerSurfaceConfigure,
        },
        WaylandSurface,
    },
    shm::{
        slot::{Buffer, SlotPool},
        Shm, ShmHandler,
    },
};
use std::ffi::c_void;
use wayland_client::{
    globals::registry_queue_init,
    protocol::{wl_output, wl_shm, wl_surface},
    Connection, Proxy, QueueHandle,
};

/// Wayland application state, owned by the event loop
struct WaylandApp {
    registry_state: RegistryState,
    output_state: OutputState,
    shm: Shm,
    layer_shell: LayerShell,
    compositor_state: CompositorState,

    // Wayland display pointer (for GPU rendering)
    display_ptr: *mut c_void,

    image: ImageData,
    config: OverlayConfig,
    state: AppState,
    /// Set when a handler hits an unrecoverable error; returned from `run`
    fatal: Option<anyhow::Error>,

    // Declared before `layer_surface` so the GPU surface is dropped first
    gpu_renderer: Option<WgpuRenderer>,
    use_gpu: bool,

    layer_surface: Option<LayerSurface>,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
    configured: bool,
}

impl WaylandApp {
    fn new(
        registry_state: RegistryState,
        output_state: OutputState,
        shm: Shm,
        layer_shell: LayerShell,
        compositor_state: CompositorState,
        display_ptr: *mut c_void,
        image: ImageData,
        config: OverlayConfig,
    ) -> Self {
        Self {
            registry_state,
            output_state,
            shm,
            layer_shell,
            compositor_state,
            display_ptr,
            image,
            config,
            state: AppState::new(),
            fatal: None,
            gpu_renderer: None,
            use_gpu: true,
            layer_surface: None,
            pool: None,
            buffer: None,
            configured: false,
        }
    }

    /// Create the overlay surface at `placement` on `output`
    fn create_overlay(
        &mut self,
        qh: &QueueHandle<Self>,
        placement: Placement,
        output: Option<&wl_output::WlOutput>,
    ) -> Result<()> {
        let surface = self.compositor_state.create_surface(qh);

        if self.config.click_through {
            // An empty input region lets every pointer event through
            let region = Region::new(&self.compositor_state)
                .context("Failed to create input region")?;
            surface.set_input_region(Some(region.wl_region()));
        }

        let layer_surface = self.layer_shell.create_layer_surface(
            qh,
            surface,
            self.config.layer,
            Some(self.config.namespace),
            output,
        );

        layer_surface.set_anchor(Anchor::TOP | Anchor::LEFT);
        layer_surface.set_margin(placement.y, 0, 0, placement.x);
        layer_surface.set_size(placement.width, placement.height);
        layer_surface.set_exclusive_zone(-1);
        layer_surface.set_keyboard_interactivity(self.config.keyboard_interactivity());

        // Commit the surface to trigger configure
        layer_surface.commit();

        self.layer_surface = Some(layer_surface);
        Ok(())
    }

    fn on_key_down(&mut self, key: Key) {
        match classify(key) {
            KeyAction::Terminate => {
                info!("Escape pressed");
                self.state.terminate(TerminationReason::EscapePressed);
            }
            KeyAction::Ignore => debug!("Ignoring key {:?}", key),
        }
    }

    fn fail(&mut self, err: anyhow::Error) {
        error!("{:#}", err);
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.state.terminate(TerminationReason::Failed);
    }

    /// Initialize GPU renderer from the layer surface
    fn init_gpu_renderer(&mut self) -> Result<()> {
        let layer_surface = self
            .layer_surface
            .as_ref()
            .context("No layer surface to render to")?;

        let surface_ptr = layer_surface.wl_surface().id().as_ptr() as *mut c_void;

        // SAFETY: both pointers come from the live connection and surface owned
        // by `self`, and `gpu_renderer` is dropped before `layer_surface`.
        let renderer = unsafe { WgpuRenderer::new(self.display_ptr, surface_ptr, &self.image)? };
        self.gpu_renderer = Some(renderer);
        info!("GPU renderer initialized");
        Ok(())
    }

    fn draw(&mut self) {
        if !self.configured || self.layer_surface.is_none() {
            return;
        }

        if self.use_gpu && self.gpu_renderer.is_none() {
            if let Err(e) = self.init_gpu_renderer() {
                warn!("GPU rendering unavailable: {:#}", e);
                warn!("Falling back to CPU rendering");
                self.use_gpu = false;
            }
        }

        if self.use_gpu && self.draw_gpu() {
            return;
        }

        if let Err(e) = self.draw_cpu() {
            self.fail(e);
        }
    }

    /// Draw using GPU (wgpu). Returns false if the CPU path has to take over.
    fn draw_gpu(&mut self) -> bool {
        let Some(renderer) = self.gpu_renderer.as_mut() else {
            return false;
        };

        match renderer.render() {
            Ok(true) => {
                if let Some(ref layer_surface) = self.layer_surface {
                    layer_surface.wl_surface().commit();
                }
                true
            }
            Ok(false) => {
                warn!("GPU skipped the frame, falling back to CPU rendering");
                self.disable_gpu();
                false
            }
            Err(e) => {
                warn!("GPU render error: {:#}", e);
                self.disable_gpu();
                false
            }
        }
    }

    fn disable_gpu(&mut self) {
        self.use_gpu = false;
        self.gpu_renderer = None;
    }

    /// Draw using CPU (shared memory buffer)
    fn draw_cpu(&mut self) -> Result<()> {
        let width = self.image.width as i32;
        let height = self.image.height as i32;
        let stride = width * 4;

        let mut pool = SlotPool::new(self.image.bgra_data.len(), &self.shm)
            .context("Failed to create shared memory pool")?;
        let (buffer, canvas) = pool
            .create_buffer(width, height, stride, wl_shm::Format::Argb8888)
            .with_context(|| format!("Failed to create {}x{} buffer", width, height))?;

        // Unscaled: the buffer has exactly the image's size and layout
        canvas.copy_from_slice(&self.image.bgra_data);

        let layer_surface = self
            .layer_surface
            .as_ref()
            .context("No layer surface to draw on")?;
        let surface = layer_surface.wl_surface();
        buffer
            .attach_to(surface)
            .map_err(|e| anyhow!("Failed to attach buffer: {:?}", e))?;
        surface.damage_buffer(0, 0, width, height);
        surface.commit();

        debug!("Drew {}x{} frame from shared memory", width, height);
        self.pool = Some(pool);
        self.buffer = Some(buffer);
        Ok(())
    }
}

impl CompositorHandler for WaylandApp {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_factor: i32,
    ) {
        debug!("Scale factor changed");
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _new_transform: wl_output::Transform,
    ) {
        debug!("Transform changed");
    }

    fn frame(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _time: u32,
    ) {
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &wl_surface::WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for WaylandApp {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("New output detected");
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output updated");
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
        debug!("Output destroyed");
    }
}

impl LayerShellHandler for WaylandApp {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, _layer: &LayerSurface) {
        info!("Layer surface closed");
        self.state.terminate(TerminationReason::SurfaceClosed);
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        debug!("Layer surface configured: {:?}", configure);

        let (width, height) = configure.new_size;
        if (width, height) != (self.image.width, self.image.height) {
            // The buffer size decides the surface size; it stays the image's
            debug!(
                "Compositor suggested {}x{}, keeping {}x{}",
                width, height, self.image.width, self.image.height
            );
        }

        // The image never changes, so only the first configure needs a frame
        if self.configured {
            return;
        }
        self.configured = true;
        self.draw();
    }
}

impl ShmHandler for WaylandApp {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for WaylandApp {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

// Delegate macros
delegate_compositor!(WaylandApp);
delegate_output!(WaylandApp);
delegate_layer!(WaylandApp);
delegate_shm!(WaylandApp);
delegate_registry!(WaylandApp);

/// Show `image` as an overlay and block until Escape or the surface closes
pub fn run(image: ImageData, config: OverlayConfig) -> Result<()> {
    info!("Connecting to Wayland display");

    let conn = Connection::connect_to_env().context("Failed to connect to Wayland display")?;

    let (globals, mut event_queue) =
        registry_queue_init(&conn).context("Failed to initialize registry")?;
    let qh = event_queue.handle();

    let compositor_state =
        CompositorState::bind(&globals, &qh).context("Failed to bind compositor")?;
    let layer_shell = LayerShell::bind(&globals, &qh).context("Failed to bind layer shell")?;
    let shm = Shm::bind(&globals, &qh).context("Failed to bind shm")?;

    let display_ptr = conn.backend().display_ptr() as *mut c_void;

    let mut app = WaylandApp::new(
        RegistryState::new(&globals),
        OutputState::new(&globals, &qh),
        shm,
        layer_shell,
        compositor_state,
        display_ptr,
        image,
        config,
    );

    // Dispatch once to get output info
    event_queue.roundtrip(&mut app)?;

    let primary = primary_output(&app.output_state);
    let screen = match &primary {
        Some((_, size)) => *size,
        None => {
            warn!(
                "No output reported, assuming {}x{}",
                app.config.fallback_screen.width, app.config.fallback_screen.height
            );
            app.config.fallback_screen
        }
    };
    info!("Display dimensions: {}x{}", screen.width, screen.height);

    let placement = Placement::centered(app.image.width, app.image.height, screen);
    info!(
        "Placing {}x{} overlay at ({}, {})",
        placement.width, placement.height, placement.x, placement.y
    );

    let mut event_loop: EventLoop<WaylandApp> =
        EventLoop::try_new().context("Failed to create event loop")?;

    let (key_tx, key_rx) = channel::channel();
    event_loop
        .handle()
        .insert_source(key_rx, |event, _, app: &mut WaylandApp| {
            if let channel::Event::Msg(key) = event {
                app.on_key_down(key);
            }
        })
        .map_err(|e| anyhow!("Failed to register key channel: {}", e.error))?;

    // Before the surface exists: an overlay nothing can dismiss must never show
    let _key_monitor = KeyMonitor::install(key_tx)?;

    let output = primary.map(|(output, _)| output);
    app.create_overlay(&qh, placement, output.as_ref())?;

    WaylandSource::new(conn, event_queue)
        .insert(event_loop.handle())
        .map_err(|e| anyhow!("Failed to register Wayland source: {}", e.error))?;

    app.state.start();
    info!("Starting event loop");

    while app.state.is_running() {
        event_loop
            .dispatch(None, &mut app)
            .context("Event loop dispatch failed")?;
    }

    if let Some(err) = app.fatal.take() {
        return Err(err);
    }

    info!("Exiting application ({:?})", app.state.phase());
    Ok(())
}

/// The first output the compositor advertised, with its logical size
fn primary_output(output_state: &OutputState) -> Option<(wl_output::WlOutput, ScreenSize)> {
    output_state.outputs().find_map(|output| {
        let info = output_state.info(&output)?;
        let dimensions = match info.logical_size {
            Some(logical) => logical,
            None => {
                let mode = info
                    .modes
                    .iter()
                    .find(|m| m.current)
                    .or_else(|| info.modes.first())?;
                logical_from_mode(mode.dimensions, info.scale_factor)
            }
        };
        let size = screen_size(dimensions)?;
        Some((output, size))
    })
}

/// Mode sizes are physical pixels; margins are logical ones
fn logical_from_mode((width, height): (i32, i32), scale_factor: i32) -> (i32, i32) {
    let scale = scale_factor.max(1);
    (width / scale, height / scale)
}

fn screen_size((width, height): (i32, i32)) -> Option<ScreenSize> {
    let width = u32::try_from(width).ok().filter(|w| *w > 0)?;
    let height = u32::try_from(height).ok().filter(|h| *h > 0)?;
    Some(ScreenSize::new(width, height))
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert2::{assert, let_assert};

    #[test]
    fn positive_dimensions_make_a_screen() {
        let_assert!(Some(size) = screen_size((2560, 1440)));
        assert!(size == ScreenSize::new(2560, 1440));
    }

    #[test]
    fn mode_sizes_are_divided_by_the_output_scale() {
        assert!(logical_from_mode((3840, 2160), 2) == (1920, 1080));
        assert!(logical_from_mode((1920, 1080), 1) == (1920, 1080));
    }

    #[test]
    fn unset_output_scale_leaves_mode_size_alone() {
        assert!(logical_from_mode((2560, 1440), 0) == (2560, 1440));
    }

    #[test]
    fn degenerate_dimensions_are_rejected() {
        assert!(screen_size((0, 1080)).is_none());
        assert!(screen_size((1920, -1)).is_none());
    }
}
