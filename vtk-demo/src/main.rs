#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::undocumented_unsafe_blocks)]

use std::{
    fs::{self, File},
    path::{Path, PathBuf},
    sync::Arc,
};

use clap::Parser;
use raw_window_handle::{
    DisplayHandle, HandleError, HasDisplayHandle, HasWindowHandle, WindowHandle,
};
use tracing_subscriber::{Layer, layer::SubscriberExt, util::SubscriberInitExt};
use vtk::{
    ash::vk,
    backend::GpuDevice,
    buffer::{BufferHandle, Vertex, VertexBuffer},
    context::{Context, ContextConfig},
    device::{AdapterPreference, Device, DeviceConfig},
    frame::FrameOutcome,
    pipeline::PipelineDesc,
    platform::PlatformWindow,
    window::{Geometry, Window, WindowConfig, WindowMessage},
};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, ControlFlow},
    window::{Window as WinitWindow, WindowAttributes, WindowId},
};

#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Default, clap::ValueEnum)]
enum TracingLogLevel {
    Off,
    Trace,
    Info,
    Debug,
    Warn,
    #[default]
    Error,
}

impl From<TracingLogLevel> for tracing::Level {
    fn from(value: TracingLogLevel) -> Self {
        match value {
            //We clamp this to the lowest possible level but this shouldn't happen
            TracingLogLevel::Off => tracing::Level::TRACE,
            TracingLogLevel::Trace => tracing::Level::TRACE,
            TracingLogLevel::Info => tracing::Level::INFO,
            TracingLogLevel::Debug => tracing::Level::DEBUG,
            TracingLogLevel::Warn => tracing::Level::WARN,
            TracingLogLevel::Error => tracing::Level::ERROR,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum CliVulkanLogLevel {
    Verbose,
    Info,
    Warning,
    Error,
}

impl From<CliVulkanLogLevel> for vtk::log::VulkanLogLevel {
    fn from(value: CliVulkanLogLevel) -> Self {
        match value {
            CliVulkanLogLevel::Verbose => vtk::log::VulkanLogLevel::Verbose,
            CliVulkanLogLevel::Info => vtk::log::VulkanLogLevel::Info,
            CliVulkanLogLevel::Warning => vtk::log::VulkanLogLevel::Warning,
            CliVulkanLogLevel::Error => vtk::log::VulkanLogLevel::Error,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
enum CliAdapter {
    #[default]
    First,
    FirstWithGraphics,
    PreferDiscrete,
}

impl From<CliAdapter> for AdapterPreference {
    fn from(value: CliAdapter) -> Self {
        match value {
            CliAdapter::First => AdapterPreference::First,
            CliAdapter::FirstWithGraphics => AdapterPreference::FirstWithGraphics,
            CliAdapter::PreferDiscrete => AdapterPreference::PreferDiscrete,
        }
    }
}

#[derive(clap::Parser, Debug)]
struct CliArgs {
    #[arg(short, long, default_value = "error")]
    tracing_log_level: TracingLogLevel,
    #[arg(short, long)]
    graphics_debug_level: Option<CliVulkanLogLevel>,
    #[arg(long, default_value = "first")]
    adapter: CliAdapter,
    /// SPIR-V vertex shader. With --fragment-shader, draws a triangle over
    /// the clear color.
    #[arg(long, requires = "fragment_shader")]
    vertex_shader: Option<PathBuf>,
    #[arg(long, requires = "vertex_shader")]
    fragment_shader: Option<PathBuf>,
    /// Bound on the per-frame fence wait and image acquire. Unbounded if
    /// unset.
    #[arg(long)]
    fence_timeout_ms: Option<u64>,
}

const TRIANGLE: [Vertex; 3] = [
    Vertex {
        position: [0.0, -0.5, 0.0],
        color: [1.0, 0.0, 0.0],
    },
    Vertex {
        position: [0.5, 0.5, 0.0],
        color: [0.0, 1.0, 0.0],
    },
    Vertex {
        position: [-0.5, 0.5, 0.0],
        color: [0.0, 0.0, 1.0],
    },
];

/// Shader code and vertex data, kept across suspend so the vtk window can
/// be rebuilt on resume.
#[derive(Debug)]
struct Scene {
    vertex_spirv: Vec<u8>,
    fragment_spirv: Vec<u8>,
    vertices: Arc<VertexBuffer>,
}

impl Scene {
    fn load(device: &Arc<Device>, vertex: &Path, fragment: &Path) -> eyre::Result<Self> {
        let vertex_spirv = fs::read(vertex)?;
        let fragment_spirv = fs::read(fragment)?;
        let mut vertices = VertexBuffer::new(device, TRIANGLE.len(), "demo triangle")?;
        vertices.write_pod(&TRIANGLE)?;
        Ok(Self {
            vertex_spirv,
            fragment_spirv,
            vertices: Arc::new(vertices),
        })
    }

    fn geometry(&self) -> Geometry<'_> {
        triangle_geometry(&self.vertex_spirv, &self.fragment_spirv, &self.vertices)
    }
}

fn triangle_geometry<'a, V>(
    vertex_spirv: &'a [u8],
    fragment_spirv: &'a [u8],
    vertices: &Arc<V>,
) -> Geometry<'a>
where
    V: BufferHandle + Send + Sync + 'static,
{
    Geometry {
        pipeline: PipelineDesc {
            vertex_spirv,
            fragment_spirv,
            push_constant_size: 0,
        },
        vertex_buffer: vertices.clone(),
        vertex_count: TRIANGLE.len() as u32,
    }
}

/// Borrowed winit window as a surface source for vtk.
struct SurfaceSource<'a>(&'a WinitWindow);

impl HasDisplayHandle for SurfaceSource<'_> {
    fn display_handle(&self) -> Result<DisplayHandle<'_>, HandleError> {
        self.0.display_handle()
    }
}

impl HasWindowHandle for SurfaceSource<'_> {
    fn window_handle(&self) -> Result<WindowHandle<'_>, HandleError> {
        self.0.window_handle()
    }
}

impl PlatformWindow for SurfaceSource<'_> {
    fn drawable_extent(&self) -> vk::Extent2D {
        let size = self.0.inner_size();
        vk::Extent2D {
            width: size.width,
            height: size.height,
        }
    }
}

fn main() -> eyre::Result<()> {
    let app_dirs = directories::ProjectDirs::from("", "vtk", "vtk-demo");

    let log_dir = match app_dirs
        .as_ref()
        .and_then(|x| x.runtime_dir().or_else(|| Some(x.data_dir())))
        .map(|p| p.to_owned())
    {
        Some(path) => path,
        None => std::env::current_dir()?,
    };

    let cli_args = CliArgs::parse();

    if cli_args.tracing_log_level != TracingLogLevel::Off {
        fs::create_dir_all(&log_dir)?;

        let mut log_file_path = log_dir.clone();
        log_file_path.push("log-file");
        log_file_path.set_extension("txt");
        let log_file = File::create(&log_file_path)?;
        let file_log = tracing_subscriber::fmt::layer()
            .with_writer(log_file)
            .with_ansi(false);

        println!("log_file_path: {}", log_file_path.display());
        println!("cli_args: {:#?}", cli_args);

        let stdout_log = tracing_subscriber::fmt::layer().pretty();

        tracing_subscriber::registry()
            .with(
                stdout_log
                    .with_filter(tracing_subscriber::filter::LevelFilter::from_level(
                        cli_args.tracing_log_level.into(),
                    ))
                    .and_then(file_log),
            )
            .init();
    }

    let event_loop = winit::event_loop::EventLoop::builder().build()?;

    let context_config = ContextConfig {
        validation: cli_args.graphics_debug_level.map(Into::into),
    };
    //SAFETY: Loads vulkan via libloading which is kinda unsafe but we're fine
    let context = Arc::new(unsafe { Context::new(&context_config, &event_loop) }?);
    let device = Arc::new(Device::new(
        &context,
        DeviceConfig {
            adapter: cli_args.adapter.into(),
        },
    )?);

    let scene = match (&cli_args.vertex_shader, &cli_args.fragment_shader) {
        (Some(vertex), Some(fragment)) => Some(Scene::load(&device, vertex, fragment)?),
        _ => None,
    };

    let timeout_ns = cli_args
        .fence_timeout_ms
        .map_or(u64::MAX, |ms| ms.saturating_mul(1_000_000));
    let window_config = WindowConfig {
        fence_timeout_ns: timeout_ns,
        acquire_timeout_ns: timeout_ns,
        name: "vtk-demo".to_owned(),
        ..Default::default()
    };

    let mut app = AppRunner(Some(App::Initializing(InitializingState {
        device,
        scene,
        window_config,
    })));

    tracing::trace!("Entering main event loop");
    Ok(event_loop.run_app(&mut app)?)
}

#[derive(Debug)]
struct AppRunner(Option<App>);

#[derive(Debug)]
enum App {
    Running(RunningState),
    Initializing(InitializingState),
    Suspended(SuspendedState),
    Exiting(ExitingState),
}

#[derive(Debug)]
struct InitializingState {
    device: Arc<Device>,
    scene: Option<Scene>,
    window_config: WindowConfig,
}
#[derive(Debug)]
struct RunningState {
    // Declared before `win` so the surface goes before the native window.
    window: Window<Device>,
    win: Arc<WinitWindow>,
    device: Arc<Device>,
    scene: Option<Scene>,
}
#[derive(Debug)]
struct SuspendedState {
    win: Arc<WinitWindow>,
    device: Arc<Device>,
    scene: Option<Scene>,
    window_config: WindowConfig,
}
#[derive(Debug)]
struct ExitingState {}

fn create_vtk_window(
    device: &Arc<Device>,
    win: &WinitWindow,
    scene: Option<&Scene>,
    window_config: WindowConfig,
) -> Result<Window<Device>, vtk::window::CreateWindowError> {
    let source = SurfaceSource(win);
    //SAFETY: RunningState keeps `win` alive for as long as the vtk window and
    //drops the vtk window first
    unsafe { Window::create(device, &source, window_config, scene.map(Scene::geometry)) }
}

impl ApplicationHandler for AppRunner {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        assert!(self.0.is_some());
        if let Some(InitializingState {
            device,
            scene,
            window_config,
        }) = self.take_initializing()
        {
            event_loop.set_control_flow(ControlFlow::Poll);
            let win = Arc::new(
                match event_loop.create_window(
                    WindowAttributes::default()
                        .with_title("vtk-demo")
                        .with_inner_size(LogicalSize {
                            width: 1600,
                            height: 900,
                        }),
                ) {
                    Ok(w) => w,
                    Err(e) => {
                        tracing::error!("Error while creating window: {}", e);
                        self.transition_to_exiting("Initializing", event_loop);
                        return;
                    }
                },
            );
            let window = match create_vtk_window(&device, &win, scene.as_ref(), window_config) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Error while creating vtk window: {}", e);
                    self.transition_to_exiting("Initializing", event_loop);
                    return;
                }
            };
            tracing::debug!("State transition: Initializing -> Running");
            win.request_redraw();
            self.set_running(RunningState {
                window,
                win,
                device,
                scene,
            });
        } else if let Some(SuspendedState {
            win,
            device,
            scene,
            window_config,
        }) = self.take_suspended()
        {
            event_loop.set_control_flow(ControlFlow::Poll);
            let window = match create_vtk_window(&device, &win, scene.as_ref(), window_config) {
                Ok(w) => w,
                Err(e) => {
                    tracing::error!("Error while recreating vtk window: {}", e);
                    self.transition_to_exiting("Suspended", event_loop);
                    return;
                }
            };
            tracing::debug!("State transition: Suspended -> Running");
            win.request_redraw();
            self.set_running(RunningState {
                window,
                win,
                device,
                scene,
            });
        } else if self.is_exiting() {
            tracing::warn!("resumed() called while in Exiting state");
        }
    }

    fn suspended(&mut self, event_loop: &ActiveEventLoop) {
        assert!(self.0.is_some());
        if let Some(running_state) = self.take_running() {
            event_loop.set_control_flow(ControlFlow::Wait);
            let RunningState {
                mut window,
                win,
                device,
                scene,
            } = running_state;

            // The surface may not outlive the suspend on every platform
            let window_config = window.config().clone();
            if let Err(e) = window.close() {
                tracing::error!("Error while closing window during suspend: {}", e);
                self.transition_to_exiting("Running", event_loop);
                return;
            }
            drop(window);

            tracing::debug!("State transition: Running -> Suspended");
            self.set_suspended(SuspendedState {
                win,
                device,
                scene,
                window_config,
            });
        }
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        window_id: WindowId,
        window_event: WindowEvent,
    ) {
        assert!(self.0.is_some());
        if !self.is_running_window(window_id) {
            return;
        }

        let keep_running = match window_event {
            WindowEvent::CloseRequested => {
                tracing::trace!("Close window request received for window");
                if let Some(running_state) = self.as_running_mut()
                    && let Err(e) = running_state.window.handle_message(WindowMessage::Close)
                {
                    tracing::error!("Error while closing window: {}", e);
                }
                false
            }
            WindowEvent::Resized(size) => self.resize(vk::Extent2D {
                width: size.width,
                height: size.height,
            }),
            WindowEvent::ScaleFactorChanged { .. } => {
                let Some(running_state) = self.as_running() else {
                    return;
                };
                let size = running_state.win.inner_size();
                self.resize(vk::Extent2D {
                    width: size.width,
                    height: size.height,
                })
            }
            WindowEvent::RedrawRequested => self.render_tick(),
            other => {
                tracing::info!("Ignoring window event {:?}", other);
                true
            }
        };

        if !keep_running {
            self.exit_from_running(event_loop);
        }
    }
}

impl AppRunner {
    fn resize(&mut self, extent: vk::Extent2D) -> bool {
        let Some(running_state) = self.as_running_mut() else {
            return true;
        };
        tracing::trace!("Drawable resized to {}x{}", extent.width, extent.height);
        if let Err(e) = running_state
            .window
            .handle_message(WindowMessage::DrawableResized(extent))
        {
            tracing::error!("Error while handling resize: {}", e);
            return false;
        }
        running_state.win.request_redraw();
        true
    }

    fn render_tick(&mut self) -> bool {
        let Some(running_state) = self.as_running_mut() else {
            return true;
        };
        match running_state.window.render_frame() {
            Ok(FrameOutcome::Closed) => false,
            Ok(FrameOutcome::SkippedNoSurface) => {
                // Nothing to draw to until the next resize asks for a redraw
                tracing::trace!("Skipping frame, no drawable surface");
                true
            }
            Ok(outcome) => {
                tracing::trace!("Frame outcome: {:?}", outcome);
                running_state.win.request_redraw();
                true
            }
            Err(e) => {
                tracing::error!("Error while rendering frame: {}", e);
                false
            }
        }
    }

    fn transition_to_exiting(&mut self, from_state: &'static str, event_loop: &ActiveEventLoop) {
        tracing::debug!("State transition: {} -> Exiting", from_state);
        self.set_exiting(ExitingState {});
        event_loop.exit();
    }

    fn exit_from_running(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(running_state) = self.take_running() {
            if let Err(e) = running_state.device.wait_idle() {
                tracing::error!("Error while waiting for device idle on exit: {}", e);
            }
            drop(running_state);
            self.transition_to_exiting("Running", event_loop);
        } else {
            tracing::warn!("Requested Running -> Exiting transition while not in Running state");
            event_loop.exit();
        }
    }

    fn is_running_window(&self, window_id: WindowId) -> bool {
        if let Some(running_state) = self.as_running()
            && window_id == running_state.win.id()
        {
            true
        } else {
            false
        }
    }

    fn take_initializing(&mut self) -> Option<InitializingState> {
        assert!(self.0.is_some());
        if matches!(self.0, Some(App::Initializing(_))) {
            match self.0.take() {
                Some(App::Initializing(s)) => Some(s),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    fn take_running(&mut self) -> Option<RunningState> {
        assert!(self.0.is_some());
        if matches!(self.0, Some(App::Running(_))) {
            match self.0.take() {
                Some(App::Running(s)) => Some(s),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    fn as_running(&self) -> Option<&RunningState> {
        assert!(self.0.is_some());
        match &self.0 {
            Some(App::Running(s)) => Some(s),
            _ => None,
        }
    }

    fn as_running_mut(&mut self) -> Option<&mut RunningState> {
        assert!(self.0.is_some());
        match &mut self.0 {
            Some(App::Running(s)) => Some(s),
            _ => None,
        }
    }

    fn set_running(&mut self, state: RunningState) {
        assert!(self.0.is_none());
        self.0 = Some(App::Running(state));
    }

    fn take_suspended(&mut self) -> Option<SuspendedState> {
        assert!(self.0.is_some());
        if matches!(self.0, Some(App::Suspended(_))) {
            match self.0.take() {
                Some(App::Suspended(s)) => Some(s),
                _ => unreachable!(),
            }
        } else {
            None
        }
    }

    fn set_suspended(&mut self, state: SuspendedState) {
        assert!(self.0.is_none());
        self.0 = Some(App::Suspended(state));
    }

    fn is_exiting(&self) -> bool {
        assert!(self.0.is_some());
        matches!(self.0, Some(App::Exiting(_)))
    }

    fn set_exiting(&mut self, state: ExitingState) {
        assert!(self.0.is_none());
        self.0 = Some(App::Exiting(state));
    }
}
