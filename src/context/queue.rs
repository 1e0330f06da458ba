use std::sync::mpsc::{self, Receiver, Sender};

use super::Context;

/// Work handed to the render thread.
pub type RenderTask = Box<dyn FnOnce(&mut Context) + Send>;

/// Receiving end of the render thread's task queue, owned by a [`Context`].
pub struct RenderQueue {
    sender: Sender<RenderTask>,
    receiver: Receiver<RenderTask>,
}

impl RenderQueue {
    pub fn new() -> Self {
        let (sender, receiver) = mpsc::channel();
        Self { sender, receiver }
    }

    /// A handle other threads use to post tasks.
    pub fn sender(&self) -> RenderQueueSender {
        RenderQueueSender {
            sender: self.sender.clone(),
        }
    }

    /// Take every task posted so far without blocking.
    pub(crate) fn drain(&self) -> Vec<RenderTask> {
        self.receiver.try_iter().collect()
    }
}

impl Default for RenderQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderQueue").finish_non_exhaustive()
    }
}

/// Cloneable, `Send` handle for posting work to a [`Context`].
///
/// ```ignore
/// let sender = context.queue_sender();
/// std::thread::spawn(move || {
///     sender.post(|ctx| ctx.purge_resources());
/// });
/// context.process_queue();
/// ```
#[derive(Clone)]
pub struct RenderQueueSender {
    sender: Sender<RenderTask>,
}

impl RenderQueueSender {
    /// Post `task`. Returns `false` if the context is gone.
    pub fn post(&self, task: impl FnOnce(&mut Context) + Send + 'static) -> bool {
        self.sender.send(Box::new(task)).is_ok()
    }
}

impl std::fmt::Debug for RenderQueueSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderQueueSender").finish_non_exhaustive()
    }
}
