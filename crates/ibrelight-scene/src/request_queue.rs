//! Long-running operations serialized onto the context thread.
//!
//! Any thread may enqueue; the thread owning the context drains the queue with
//! [`RequestQueue::execute_queue`]. Each request gets its own
//! [`CancellationToken`] and a tracked monitor so a failing request is
//! reported and the queue moves on.

use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use ibrelight_core::{
    CancellationToken, LoadingMonitor, LoadingSession, RenderSettings, TrackedMonitor, ViewSet,
};
use ibrelight_gl::{
    AttachmentSpec, ColorFormat, Context, DefineValue, DepthPrecision, Framebuffer, GlResult,
    ImageFileFormat, PrimitiveMode, Program, ShaderType,
};
use parking_lot::Mutex;

use crate::error::{SceneError, SceneResult};
use crate::scene_model::SubjectGeometry;
use crate::shader_component::ProgramSpec;
use crate::stream::clear_attachments;

/// What requests render against, owned by the context thread.
#[derive(Clone)]
pub struct RequestTarget {
    pub context: Context,
    pub views: Arc<dyn ViewSet>,
    pub settings: RenderSettings,
    pub geometry: Option<SubjectGeometry>,
}

/// A unit of work executed on the context thread.
pub trait Request<T: ?Sized>: Send {
    /// Short description used in log messages.
    fn name(&self) -> &str {
        "request"
    }

    /// Runs the request, reporting progress to `monitor` and stopping early when
    /// `cancel` is set.
    fn execute(
        &mut self,
        target: &T,
        monitor: &dyn LoadingMonitor,
        cancel: &CancellationToken,
    ) -> SceneResult<()>;
}

impl<T, F> Request<T> for F
where
    T: ?Sized,
    F: FnMut(&T, &dyn LoadingMonitor, &CancellationToken) -> SceneResult<()> + Send,
{
    fn execute(
        &mut self,
        target: &T,
        monitor: &dyn LoadingMonitor,
        cancel: &CancellationToken,
    ) -> SceneResult<()> {
        self(target, monitor, cancel)
    }
}

/// Handle to an enqueued request.
#[derive(Debug, Clone)]
pub struct RequestHandle {
    id: u64,
    token: CancellationToken,
}

impl RequestHandle {
    #[must_use]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Requests cancellation; a request that has not started is skipped.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }
}

struct QueuedRequest<T: ?Sized> {
    id: u64,
    token: CancellationToken,
    request: Box<dyn Request<T>>,
}

/// Outcome counts of one [`RequestQueue::execute_queue`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueSummary {
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
}

/// FIFO of requests, safe to share between threads.
pub struct RequestQueue<T: ?Sized = RequestTarget> {
    pending: Mutex<VecDeque<QueuedRequest<T>>>,
    next_id: AtomicU64,
}

impl<T: ?Sized> Default for RequestQueue<T> {
    fn default() -> Self {
        Self {
            pending: Mutex::new(VecDeque::new()),
            next_id: AtomicU64::new(1),
        }
    }
}

impl<T: ?Sized> std::fmt::Debug for RequestQueue<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestQueue")
            .field("pending", &self.len())
            .finish_non_exhaustive()
    }
}

impl<T: ?Sized> RequestQueue<T> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request to the back of the queue.
    pub fn enqueue(&self, request: Box<dyn Request<T>>) -> RequestHandle {
        let handle = RequestHandle {
            id: self.next_id.fetch_add(1, Ordering::Relaxed),
            token: CancellationToken::new(),
        };
        log::debug!("queued {} #{}", request.name(), handle.id);
        self.pending.lock().push_back(QueuedRequest {
            id: handle.id,
            token: handle.token.clone(),
            request,
        });
        handle
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    /// Cancels every request still waiting in the queue.
    pub fn cancel_all(&self) {
        for queued in self.pending.lock().iter() {
            queued.token.cancel();
        }
    }

    /// Runs queued requests in order until the queue is empty.
    ///
    /// Requests enqueued while draining run in the same call. The queue lock
    /// is not held while a request executes.
    pub fn execute_queue(&self, target: &T, monitor: &Arc<dyn LoadingMonitor>) -> QueueSummary {
        let mut summary = QueueSummary::default();
        loop {
            let Some(mut queued) = self.pending.lock().pop_front() else {
                break;
            };
            let name = queued.request.name().to_owned();
            let tracked = TrackedMonitor::new(Arc::clone(monitor));

            if queued.token.is_cancelled() {
                log::info!("skipping cancelled {name} #{}", queued.id);
                tracked.cancel_unfinished();
                summary.cancelled += 1;
                continue;
            }

            match queued.request.execute(target, &tracked, &queued.token) {
                Ok(()) => summary.completed += 1,
                Err(e) if e.is_cancelled() => {
                    log::info!("{name} #{} cancelled", queued.id);
                    tracked.cancel_unfinished();
                    summary.cancelled += 1;
                }
                Err(e) => {
                    log::error!("{name} #{} failed: {e}", queued.id);
                    tracked.fail_unfinished(&e);
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}

/// Vertex stage of a [`RenderRequest`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VertexShaderChoice {
    /// Rasterizes the mesh in texture coordinates.
    TextureSpace,
    /// Projects the mesh through each captured camera.
    CameraSpace,
    Custom(PathBuf),
}

/// Callback configuring uniforms and textures before the first view renders.
pub type ShaderSetup = Box<dyn Fn(&mut Program) -> GlResult<()> + Send>;

/// Renders every captured view with a custom fragment shader and saves one PNG per view.
pub struct RenderRequest {
    width: u32,
    height: u32,
    vertex: VertexShaderChoice,
    fragment: PathBuf,
    output_directory: PathBuf,
    defines: BTreeMap<String, DefineValue>,
    setup: Option<ShaderSetup>,
}

impl std::fmt::Debug for RenderRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderRequest")
            .field("width", &self.width)
            .field("height", &self.height)
            .field("vertex", &self.vertex)
            .field("fragment", &self.fragment)
            .field("output_directory", &self.output_directory)
            .field("defines", &self.defines)
            .field("has_setup", &self.setup.is_some())
            .finish()
    }
}

impl RenderRequest {
    /// Starts a request rendering `fragment` into `output_directory`.
    pub fn builder(
        fragment: impl Into<PathBuf>,
        output_directory: impl Into<PathBuf>,
    ) -> RenderRequestBuilder {
        RenderRequestBuilder {
            request: Self {
                width: 1024,
                height: 1024,
                vertex: VertexShaderChoice::TextureSpace,
                fragment: fragment.into(),
                output_directory: output_directory.into(),
                defines: BTreeMap::new(),
                setup: None,
            },
        }
    }

    fn vertex_path(&self, settings: &RenderSettings) -> PathBuf {
        match &self.vertex {
            VertexShaderChoice::TextureSpace => settings.shader_path("common/texspace.wgsl"),
            VertexShaderChoice::CameraSpace => settings.shader_path("common/imgspace.wgsl"),
            VertexShaderChoice::Custom(path) => path.clone(),
        }
    }

    fn program_spec(&self, settings: &RenderSettings) -> ProgramSpec {
        let mut spec = ProgramSpec::new()
            .with_stage(ShaderType::Vertex, self.vertex_path(settings))
            .with_stage(ShaderType::Fragment, self.fragment.clone());
        for (name, value) in &self.defines {
            spec.set_define(name.clone(), *value);
        }
        spec
    }

    /// File written for view `index`.
    #[must_use]
    pub fn output_path(&self, views: &dyn ViewSet, index: usize) -> PathBuf {
        self.output_directory
            .join(format!("{}.png", views.image_name(index)))
    }
}

impl Request<RequestTarget> for RenderRequest {
    fn name(&self) -> &str {
        "render request"
    }

    fn execute(
        &mut self,
        target: &RequestTarget,
        monitor: &dyn LoadingMonitor,
        cancel: &CancellationToken,
    ) -> SceneResult<()> {
        let geometry = target
            .geometry
            .as_ref()
            .ok_or(SceneError::NotInitialized("subject geometry"))?;
        let context = &target.context;

        let program = self.program_spec(&target.settings).build(context)?;
        let mut drawable = context.create_drawable(program)?;
        for (name, buffer) in geometry.attributes() {
            drawable.add_vertex_buffer(name, &buffer)?;
        }
        if let Some(setup) = &self.setup {
            setup(drawable.program_mut())?;
        }

        let framebuffer = context
            .build_framebuffer_object(self.width, self.height)
            .add_color_attachment(AttachmentSpec::color(ColorFormat::RGBA8))
            .add_depth_attachment(AttachmentSpec::depth(DepthPrecision::Fixed24))
            .create_framebuffer_object()?;
        std::fs::create_dir_all(&self.output_directory)?;

        let views = target.views.as_ref();
        let count = views.camera_pose_count();
        let mut session = LoadingSession::start(monitor, count as f64);
        for index in 0..count {
            cancel.check()?;
            clear_attachments(&framebuffer)?;

            let program = drawable.program_mut();
            program.set_uniform("view_index", index as u32)?;
            program.set_uniform("view_count", count as u32)?;
            program.set_uniform("model_view", views.camera_pose(index))?;
            program.set_uniform("projection", views.camera_projection(index).to_matrix())?;
            drawable.draw(PrimitiveMode::Triangles, &framebuffer)?;

            framebuffer.save_to_file(0, ImageFileFormat::Png, &self.output_path(views, index))?;
            session.set_progress((index + 1) as f64);
        }
        session.complete();

        log::info!(
            "rendered {count} views into {}",
            self.output_directory.display()
        );
        Ok(())
    }
}

/// Fluent configuration of a [`RenderRequest`].
#[derive(Debug)]
pub struct RenderRequestBuilder {
    request: RenderRequest,
}

impl RenderRequestBuilder {
    #[must_use]
    pub fn width(mut self, width: u32) -> Self {
        self.request.width = width;
        self
    }

    #[must_use]
    pub fn height(mut self, height: u32) -> Self {
        self.request.height = height;
        self
    }

    #[must_use]
    pub fn vertex_shader(mut self, vertex: VertexShaderChoice) -> Self {
        self.request.vertex = vertex;
        self
    }

    #[must_use]
    pub fn define(mut self, name: impl Into<String>, value: impl Into<DefineValue>) -> Self {
        self.request.defines.insert(name.into(), value.into());
        self
    }

    /// Runs `setup` on the program once before rendering.
    #[must_use]
    pub fn shader_setup(
        mut self,
        setup: impl Fn(&mut Program) -> GlResult<()> + Send + 'static,
    ) -> Self {
        self.request.setup = Some(Box::new(setup));
        self
    }

    #[must_use]
    pub fn build(self) -> RenderRequest {
        self.request
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error;

    use ibrelight_core::{CoreError, ViewSetData};

    #[derive(Default)]
    struct RecordingMonitor {
        events: Mutex<Vec<String>>,
    }

    impl LoadingMonitor for RecordingMonitor {
        fn start_loading(&self) {
            self.events.lock().push("start".into());
        }

        fn set_maximum(&self, maximum: f64) {
            self.events.lock().push(format!("max {maximum}"));
        }

        fn set_progress(&self, progress: f64) {
            self.events.lock().push(format!("progress {progress}"));
        }

        fn loading_complete(&self) {
            self.events.lock().push("complete".into());
        }

        fn loading_failed(&self, error: &dyn Error) {
            self.events.lock().push(format!("failed: {error}"));
        }

        fn loading_cancelled(&self) {
            self.events.lock().push("cancelled".into());
        }
    }

    type Log = Mutex<Vec<&'static str>>;

    fn monitor() -> (Arc<RecordingMonitor>, Arc<dyn LoadingMonitor>) {
        let recording = Arc::new(RecordingMonitor::default());
        let shared: Arc<dyn LoadingMonitor> = recording.clone();
        (recording, shared)
    }

    #[test]
    fn test_requests_run_in_fifo_order() {
        let queue: RequestQueue<Log> = RequestQueue::new();
        for name in ["first", "second", "third"] {
            queue.enqueue(Box::new(move |log: &Log, _: &dyn LoadingMonitor, _: &CancellationToken| -> SceneResult<()> {
                log.lock().push(name);
                Ok(())
            }));
        }
        assert_eq!(queue.len(), 3);

        let log = Log::default();
        let (_, shared) = monitor();
        let summary = queue.execute_queue(&log, &shared);

        assert_eq!(*log.lock(), ["first", "second", "third"]);
        assert_eq!(summary.completed, 3);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_failure_is_reported_and_queue_continues() {
        let queue: RequestQueue<Log> = RequestQueue::new();
        queue.enqueue(Box::new(|_: &Log, monitor: &dyn LoadingMonitor, _: &CancellationToken| -> SceneResult<()> {
            let mut session = LoadingSession::start(monitor, 4.0);
            session.set_progress(1.0);
            Err(SceneError::NotInitialized("subject geometry"))
        }));
        queue.enqueue(Box::new(|log: &Log, _: &dyn LoadingMonitor, _: &CancellationToken| -> SceneResult<()> {
            log.lock().push("after failure");
            Ok(())
        }));

        let log = Log::default();
        let (recording, shared) = monitor();
        let summary = queue.execute_queue(&log, &shared);

        assert_eq!(summary, QueueSummary { completed: 1, failed: 1, cancelled: 0 });
        assert_eq!(*log.lock(), ["after failure"]);
        let events = recording.events.lock();
        assert_eq!(events[..3], ["start", "max 4", "progress 0"]);
        assert_eq!(events[3], "progress 1");
        assert!(events[4].starts_with("failed: subject geometry"));
        assert_eq!(events.len(), 5);
    }

    #[test]
    fn test_cancelled_request_is_skipped() {
        let queue: RequestQueue<Log> = RequestQueue::new();
        let handle = queue.enqueue(Box::new(|log: &Log, _: &dyn LoadingMonitor, _: &CancellationToken| -> SceneResult<()> {
            log.lock().push("ran");
            Ok(())
        }));
        handle.cancel();

        let log = Log::default();
        let (recording, shared) = monitor();
        let summary = queue.execute_queue(&log, &shared);

        assert!(log.lock().is_empty());
        assert_eq!(summary.cancelled, 1);
        assert_eq!(*recording.events.lock(), ["cancelled"]);
    }

    #[test]
    fn test_cancellation_during_execution() {
        let queue: RequestQueue<Log> = RequestQueue::new();
        queue.enqueue(Box::new(
            |_: &Log, monitor: &dyn LoadingMonitor, cancel: &CancellationToken| -> SceneResult<()> {
                let mut session = LoadingSession::start(monitor, 10.0);
                for view in 0..10 {
                    cancel.check()?;
                    session.set_progress(f64::from(view + 1));
                    if view == 1 {
                        cancel.cancel();
                    }
                }
                session.complete();
                Ok(())
            },
        ));

        let log = Log::default();
        let (recording, shared) = monitor();
        let summary = queue.execute_queue(&log, &shared);

        assert_eq!(summary.cancelled, 1);
        let events = recording.events.lock();
        assert_eq!(events.last().map(String::as_str), Some("cancelled"));
        assert!(!events.iter().any(|e| e == "complete"));
    }

    #[test]
    fn test_cancel_all_marks_pending() {
        let queue: RequestQueue<Log> = RequestQueue::new();
        let handles: Vec<_> = (0..3)
            .map(|_| queue.enqueue(Box::new(|_: &Log, _: &dyn LoadingMonitor, _: &CancellationToken| -> SceneResult<()> { Ok(()) })))
            .collect();
        queue.cancel_all();
        assert!(handles.iter().all(RequestHandle::is_cancelled));
        assert_ne!(handles[0].id(), handles[1].id());
    }

    #[test]
    fn test_render_request_builder() {
        let request = RenderRequest::builder("shaders/fit.wgsl", "out")
            .width(256)
            .height(128)
            .vertex_shader(VertexShaderChoice::CameraSpace)
            .define("SAMPLE_COUNT", 8_u32)
            .build();
        assert_eq!((request.width, request.height), (256, 128));

        let settings = RenderSettings::default();
        let spec = request.program_spec(&settings);
        assert_eq!(
            spec.stage_path(ShaderType::Vertex),
            Some(settings.shader_path("common/imgspace.wgsl").as_path())
        );
        assert_eq!(
            spec.stage_path(ShaderType::Fragment),
            Some(std::path::Path::new("shaders/fit.wgsl"))
        );
        assert_eq!(spec.defines().get("SAMPLE_COUNT"), Some(&DefineValue::UInt(8)));
    }

    #[test]
    fn test_output_path_uses_image_name() {
        let request = RenderRequest::builder("fit.wgsl", "out").build();
        let views = ViewSetData::from_poses([glam::Mat4::IDENTITY; 3]);
        assert_eq!(request.output_path(&views, 2), PathBuf::from("out/view_0002.png"));
    }

    #[test]
    fn test_cancelled_error_is_detected() {
        assert!(SceneError::from(CoreError::Cancelled).is_cancelled());
    }
}
