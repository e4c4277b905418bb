//! Per-view rendering with host readback, sequential or across worker threads.
//!
//! A [`ViewRenderer`] draws one view at a time into its own framebuffer and
//! reads every color attachment back. Streams drive a renderer over all view
//! indices and hand each result to a callback. The readback buffers are reused
//! between views, so callbacks must copy anything they keep.

use std::sync::atomic::{AtomicUsize, Ordering};

use ibrelight_core::{CancellationToken, RenderSettings, ViewSet};
use ibrelight_gl::{
    ColorReadback, Drawable, Framebuffer, FramebufferObject, FramebufferObjectBuilder, GlResult,
    GraphicsResource, PrimitiveMode, ProgramBuilder,
};

use crate::error::{SceneError, SceneResult};

/// Renders single views into host memory.
pub trait ViewRenderer {
    /// Readback buffers matching the renderer's color attachments.
    fn allocate_readbacks(&self) -> SceneResult<Vec<ColorReadback>>;

    /// Renders view `index` and reads every color attachment into `readbacks`.
    fn render_view(&mut self, index: usize, readbacks: &mut [ColorReadback]) -> SceneResult<()>;
}

/// Clears every attachment of `framebuffer`: colors to zero, depth to the far plane.
pub fn clear_attachments(framebuffer: &dyn Framebuffer) -> GlResult<()> {
    let targets = framebuffer.render_targets()?;
    for (index, color) in targets.colors.iter().enumerate() {
        if color.format.is_integer() {
            framebuffer.clear_integer_color_buffer(index, [0; 4])?;
        } else {
            framebuffer.clear_color_buffer(index, [0.0; 4])?;
        }
    }
    if let Some(depth) = &targets.depth {
        if depth.format.has_depth_aspect() {
            framebuffer.clear_depth_buffer()?;
        }
        if depth.format.has_stencil_aspect() {
            framebuffer.clear_stencil_buffer(0)?;
        }
    }
    Ok(())
}

/// Owns a drawable and a framebuffer and renders views with a `view_index` uniform.
pub struct DrawableViewRenderer {
    drawable: Drawable,
    framebuffer: FramebufferObject,
    mode: PrimitiveMode,
}

impl std::fmt::Debug for DrawableViewRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DrawableViewRenderer")
            .field("drawable", &self.drawable)
            .field("framebuffer", &self.framebuffer)
            .field("mode", &self.mode)
            .finish()
    }
}

impl DrawableViewRenderer {
    pub fn new(drawable: Drawable, framebuffer: FramebufferObject) -> SceneResult<Self> {
        drawable.context().ensure_same(framebuffer.context())?;
        Ok(Self {
            drawable,
            framebuffer,
            mode: PrimitiveMode::Triangles,
        })
    }

    /// Builds the program and framebuffer and takes ownership of both.
    pub fn build(program: ProgramBuilder, framebuffer: FramebufferObjectBuilder) -> SceneResult<Self> {
        let program = program.create_program()?;
        let context = program.context().clone();
        let drawable = context.create_drawable(program)?;
        let framebuffer = framebuffer.create_framebuffer_object()?;
        Self::new(drawable, framebuffer)
    }

    #[must_use]
    pub fn with_mode(mut self, mode: PrimitiveMode) -> Self {
        self.mode = mode;
        self
    }

    /// For attaching vertex buffers and setting uniforms shared by every view.
    pub fn drawable_mut(&mut self) -> &mut Drawable {
        &mut self.drawable
    }

    #[must_use]
    pub fn framebuffer(&self) -> &FramebufferObject {
        &self.framebuffer
    }
}

impl ViewRenderer for DrawableViewRenderer {
    fn allocate_readbacks(&self) -> SceneResult<Vec<ColorReadback>> {
        let size = self.framebuffer.size();
        (0..self.framebuffer.color_attachment_count())
            .map(|index| {
                let (_, format) = self.framebuffer.readback_source(index)?;
                Ok(ColorReadback::new(size.width, size.height, format))
            })
            .collect()
    }

    fn render_view(&mut self, index: usize, readbacks: &mut [ColorReadback]) -> SceneResult<()> {
        clear_attachments(&self.framebuffer)?;
        self.drawable
            .program_mut()
            .set_uniform("view_index", index as u32)?;
        self.drawable.draw(self.mode, &self.framebuffer)?;
        for (attachment, readback) in readbacks.iter_mut().enumerate() {
            self.framebuffer.read_color_buffer_into(attachment, readback)?;
        }
        Ok(())
    }
}

impl GraphicsResource for DrawableViewRenderer {
    fn close(&mut self) {
        self.drawable.close();
        self.framebuffer.close();
    }

    fn is_closed(&self) -> bool {
        self.drawable.is_closed() && self.framebuffer.is_closed()
    }
}

/// Visits views in ascending order on the calling thread.
pub struct SequentialViewRenderStream<'a> {
    renderer: &'a mut dyn ViewRenderer,
    view_count: usize,
    cancel: Option<CancellationToken>,
}

impl<'a> SequentialViewRenderStream<'a> {
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.view_count
    }

    /// Renders every view and calls `action` with its index and readbacks.
    ///
    /// Each call starts again from view 0.
    pub fn for_each(&mut self, mut action: impl FnMut(usize, &[ColorReadback])) -> SceneResult<()> {
        self.visit(0, |index, readbacks| action(index, readbacks))
    }

    /// Renders every view and collects `transform` of each, in view order.
    pub fn map<T>(
        &mut self,
        mut transform: impl FnMut(usize, &[ColorReadback]) -> T,
    ) -> SceneResult<Vec<T>> {
        let mut mapped = Vec::with_capacity(self.view_count);
        self.visit(0, |index, readbacks| mapped.push(transform(index, readbacks)))?;
        Ok(mapped)
    }

    /// Narrows the stream to the first color attachment.
    #[must_use]
    pub fn single(self) -> SingleAttachmentStream<'a> {
        SingleAttachmentStream { inner: self }
    }

    fn visit(
        &mut self,
        min_attachments: usize,
        mut action: impl FnMut(usize, &[ColorReadback]),
    ) -> SceneResult<()> {
        let mut readbacks = self.renderer.allocate_readbacks()?;
        if readbacks.len() < min_attachments {
            return Err(SceneError::NoColorAttachments);
        }
        for index in 0..self.view_count {
            if let Some(cancel) = &self.cancel {
                cancel.check()?;
            }
            self.renderer.render_view(index, &mut readbacks)?;
            action(index, &readbacks);
        }
        Ok(())
    }
}

/// A sequential stream that hands out only the first color attachment.
pub struct SingleAttachmentStream<'a> {
    inner: SequentialViewRenderStream<'a>,
}

impl SingleAttachmentStream<'_> {
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.inner.view_count
    }

    /// Renders every view and calls `action` with its index and first readback.
    pub fn for_each(&mut self, mut action: impl FnMut(usize, &ColorReadback)) -> SceneResult<()> {
        self.inner
            .visit(1, |index, readbacks| action(index, &readbacks[0]))
    }

    /// Renders every view and collects `transform` of its first readback, in view order.
    pub fn map<T>(
        &mut self,
        mut transform: impl FnMut(usize, &ColorReadback) -> T,
    ) -> SceneResult<Vec<T>> {
        let mut mapped = Vec::with_capacity(self.inner.view_count);
        self.inner
            .visit(1, |index, readbacks| mapped.push(transform(index, &readbacks[0])))?;
        Ok(mapped)
    }
}

/// Visits every view exactly once across worker threads.
///
/// `factory(worker)` runs on each worker thread and builds that worker's
/// renderer, including its own context. Workers take the next unvisited index,
/// so each worker sees ascending indices while the order across workers is
/// unspecified.
pub struct ParallelViewRenderStream<F> {
    factory: F,
    view_count: usize,
    threads: usize,
    cancel: Option<CancellationToken>,
}

impl<F> ParallelViewRenderStream<F>
where
    F: Fn(usize) -> SceneResult<Box<dyn ViewRenderer>> + Sync,
{
    #[must_use]
    pub fn view_count(&self) -> usize {
        self.view_count
    }

    /// Number of workers that will be started.
    #[must_use]
    pub fn threads(&self) -> usize {
        self.threads.clamp(1, self.view_count.max(1))
    }

    /// Renders every view and calls `action` from the worker that rendered it.
    ///
    /// The first worker error stops the remaining workers and is returned.
    pub fn for_each(&self, action: impl Fn(usize, &[ColorReadback]) + Sync) -> SceneResult<()> {
        if self.view_count == 0 {
            return Ok(());
        }
        let next = AtomicUsize::new(0);
        let stop = CancellationToken::new();

        let first_error = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..self.threads())
                .map(|worker| {
                    let next = &next;
                    let stop = &stop;
                    let action = &action;
                    scope.spawn(move || {
                        let result = self.run_worker(worker, next, stop, action);
                        if result.is_err() {
                            stop.cancel();
                        }
                        result
                    })
                })
                .collect();

            let mut first_error = None;
            for handle in handles {
                let error = match handle.join() {
                    Ok(Ok(())) => continue,
                    Ok(Err(e)) => e,
                    Err(_) => {
                        stop.cancel();
                        SceneError::WorkerPanicked
                    }
                };
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            first_error
        });

        match first_error {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }

    fn run_worker(
        &self,
        worker: usize,
        next: &AtomicUsize,
        stop: &CancellationToken,
        action: &(impl Fn(usize, &[ColorReadback]) + Sync),
    ) -> SceneResult<()> {
        let mut renderer = (self.factory)(worker)?;
        let mut readbacks = renderer.allocate_readbacks()?;
        let mut rendered = 0_usize;
        loop {
            if stop.is_cancelled() {
                break;
            }
            if let Some(cancel) = &self.cancel {
                cancel.check()?;
            }
            let index = next.fetch_add(1, Ordering::Relaxed);
            if index >= self.view_count {
                break;
            }
            renderer.render_view(index, &mut readbacks)?;
            action(index, &readbacks);
            rendered += 1;
        }
        log::debug!("stream worker {worker} rendered {rendered} views");
        Ok(())
    }
}

/// Creates view streams over a view set.
#[derive(Debug, Clone)]
pub struct GraphicsStreamFactory {
    view_count: usize,
    max_threads: usize,
    cancel: Option<CancellationToken>,
}

impl GraphicsStreamFactory {
    pub fn new(views: &dyn ViewSet, settings: &RenderSettings) -> Self {
        Self {
            view_count: views.camera_pose_count(),
            max_threads: settings.stream_threads(),
            cancel: None,
        }
    }

    /// Streams over `view_count` views without a view set.
    #[must_use]
    pub fn with_view_count(view_count: usize, max_threads: usize) -> Self {
        Self {
            view_count,
            max_threads: max_threads.max(1),
            cancel: None,
        }
    }

    /// Streams created afterwards stop between views once `token` is cancelled.
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    #[must_use]
    pub fn view_count(&self) -> usize {
        self.view_count
    }

    pub fn stream<'a>(&self, renderer: &'a mut dyn ViewRenderer) -> SequentialViewRenderStream<'a> {
        SequentialViewRenderStream {
            renderer,
            view_count: self.view_count,
            cancel: self.cancel.clone(),
        }
    }

    /// A sequential stream over the first color attachment of `renderer`.
    pub fn stream_single<'a>(&self, renderer: &'a mut dyn ViewRenderer) -> SingleAttachmentStream<'a> {
        self.stream(renderer).single()
    }

    /// A parallel stream using the configured thread count.
    pub fn parallel<F>(&self, factory: F) -> ParallelViewRenderStream<F>
    where
        F: Fn(usize) -> SceneResult<Box<dyn ViewRenderer>> + Sync,
    {
        self.parallel_with_threads(factory, self.max_threads)
    }

    /// A parallel stream using at most `max_threads` workers.
    pub fn parallel_with_threads<F>(&self, factory: F, max_threads: usize) -> ParallelViewRenderStream<F>
    where
        F: Fn(usize) -> SceneResult<Box<dyn ViewRenderer>> + Sync,
    {
        ParallelViewRenderStream {
            factory,
            view_count: self.view_count,
            threads: max_threads.min(self.max_threads).max(1),
            cancel: self.cancel.clone(),
        }
    }
}
