use std::sync::Arc;

use tokio::sync::oneshot;

use launch_daemon::config::Settings;
use launch_daemon::engine::{DaemonCommand, DaemonEvent, DaemonStep, LaunchDaemon};
use launch_daemon::exec::{JobQueue, Launcher, QueueItem};
use launch_daemon::ipc::{Reply, Request};
use launch_daemon::log::Log;
use launch_daemon::session::SessionBroker;
use launch_daemon::types::{Caller, DaemonMode, NameKey};

use crate::fakes::{FakeContext, FakeLauncher};

/// Drives a [`LaunchDaemon`] step by step without a runtime.
///
/// Queue items are executed synchronously against a [`FakeLauncher`] by
/// [`TestDaemon::run_queue`], and the launch results are fed back the way a
/// worker would.
pub struct TestDaemon {
    pub core: LaunchDaemon,
    pub launcher: Arc<FakeLauncher>,
    queue: Arc<JobQueue>,
    /// Commands collected from every step so far.
    pub commands: Vec<DaemonCommand>,
}

impl TestDaemon {
    pub fn new(settings: Settings) -> Self {
        Self::with_context(settings, FakeContext::new())
    }

    pub fn with_context(settings: Settings, context: FakeContext) -> Self {
        let queue = Arc::new(JobQueue::new());
        let log = Arc::new(Log::with_capacity(settings.daemon.log_capacity));
        let core = LaunchDaemon::new(settings, Box::new(context), Arc::clone(&queue), log);
        Self {
            core,
            launcher: Arc::new(FakeLauncher::new()),
            queue,
            commands: Vec::new(),
        }
    }

    pub fn mode(mut self, mode: DaemonMode) -> Self {
        self.core = self.core.with_mode(mode);
        self
    }

    pub fn broker(mut self, broker: Box<dyn SessionBroker>) -> Self {
        self.core = self.core.with_session_broker(broker);
        self
    }

    pub fn start(&mut self) -> bool {
        let step = self.core.start();
        self.absorb(step)
    }

    pub fn step(&mut self, event: DaemonEvent) -> bool {
        let step = self.core.step(event);
        self.absorb(step)
    }

    fn absorb(&mut self, step: DaemonStep) -> bool {
        self.commands.extend(step.commands);
        step.keep_running
    }

    /// Take the commands collected so far.
    pub fn take_commands(&mut self) -> Vec<DaemonCommand> {
        std::mem::take(&mut self.commands)
    }

    /// Names of the jobs waiting on the queue, without executing them.
    pub fn queued(&self) -> Vec<String> {
        self.queue
            .drain()
            .into_iter()
            .filter_map(|item| match item {
                QueueItem::Launch(request) => Some(request.job.to_string()),
                QueueItem::Checkpoint(_) => None,
            })
            .collect()
    }

    /// Execute queued launches until the queue is empty and return the
    /// names launched, in order.
    pub fn run_queue(&mut self) -> Vec<String> {
        let mut names = Vec::new();
        loop {
            let items = self.queue.drain();
            if items.is_empty() {
                return names;
            }
            for item in items {
                let QueueItem::Launch(request) = item else {
                    continue;
                };
                let result = self
                    .launcher
                    .launch(&request, &request.environment)
                    .map_err(|e| e.to_string());
                names.push(request.job.to_string());
                self.step(DaemonEvent::JobLaunched {
                    job: request.job,
                    result,
                });
            }
        }
    }

    pub fn pid_of(&self, job: &str) -> Option<u32> {
        self.core.job(job).and_then(|j| j.pid())
    }

    /// Report the process of `job` as exited.
    pub fn exit(&mut self, job: &str, status: i32) -> bool {
        match self.pid_of(job) {
            Some(pid) => self.step(DaemonEvent::ProcessExited { pid, status }),
            None => panic!("{job} is not running"),
        }
    }

    /// Send `request` as root.
    pub fn request(&mut self, request: Request) -> oneshot::Receiver<Reply> {
        self.request_as(Caller::ROOT, request)
    }

    pub fn request_as(&mut self, caller: Caller, request: Request) -> oneshot::Receiver<Reply> {
        let (tx, rx) = oneshot::channel();
        self.step(DaemonEvent::Request {
            caller,
            request,
            reply: Some(tx),
        });
        rx
    }

    /// Send `request` as root and return the reply it got within the step.
    pub fn call(&mut self, request: Request) -> Reply {
        let mut rx = self.request(request);
        rx.try_recv().expect("request should be answered immediately")
    }

    pub fn is_running(&self, job: &str) -> bool {
        self.core.job(job).is_some_and(|j| j.is_running())
    }

    pub fn is_launching(&self, job: &str) -> bool {
        self.core.job(job).is_some_and(|j| j.is_launching())
    }

    pub fn target_launched(&self, target: &str) -> bool {
        self.core.target(target).is_some_and(|t| t.has_launched())
    }

    pub fn key(name: &str) -> NameKey {
        NameKey::from(name)
    }
}
