use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use launch_daemon::condition::ConditionContext;
use launch_daemon::errors::{LaunchError, Result, StatusCode};
use launch_daemon::exec::{LaunchRequest, Launcher};
use launch_daemon::ipc::{Reply, Request};
use launch_daemon::session::{SessionBroker, SessionLink, UserRecord};

/// First pid handed out by fakes.
pub const FIRST_FAKE_PID: u32 = 1000;

/// A fake launcher that:
/// - records every launch request
/// - hands out increasing pids without starting anything
/// - fails the jobs it was told to fail
/// - records quit and interrupt requests.
#[derive(Debug, Default)]
pub struct FakeLauncher {
    next_pid: AtomicU32,
    launched: Mutex<Vec<LaunchRequest>>,
    failing: Mutex<HashSet<String>>,
    quits: Mutex<Vec<u32>>,
    interrupts: Mutex<Vec<u32>>,
}

impl FakeLauncher {
    pub fn new() -> Self {
        Self {
            next_pid: AtomicU32::new(FIRST_FAKE_PID),
            ..Self::default()
        }
    }

    pub fn fail(&self, job: &str) {
        self.failing.lock().insert(job.to_lowercase());
    }

    pub fn launched(&self) -> Vec<LaunchRequest> {
        self.launched.lock().clone()
    }

    pub fn launched_names(&self) -> Vec<String> {
        self.launched
            .lock()
            .iter()
            .map(|r| r.job.to_string())
            .collect()
    }

    pub fn quits(&self) -> Vec<u32> {
        self.quits.lock().clone()
    }

    pub fn interrupts(&self) -> Vec<u32> {
        self.interrupts.lock().clone()
    }
}

impl Launcher for FakeLauncher {
    fn launch(&self, request: &LaunchRequest, _environment: &[(String, String)]) -> Result<u32> {
        if self.failing.lock().contains(&request.job.as_str().to_lowercase()) {
            return Err(LaunchError::Launch(format!("{}: refused by fake", request.job)));
        }
        self.launched.lock().push(request.clone());
        Ok(self.next_pid.fetch_add(1, Ordering::SeqCst))
    }

    fn request_quit(&self, pid: u32) -> Result<()> {
        self.quits.lock().push(pid);
        Ok(())
    }

    fn interrupt(&self, pid: u32) -> Result<()> {
        self.interrupts.lock().push(pid);
        Ok(())
    }
}

/// Condition facts set by hand.
#[derive(Debug, Clone, Default)]
pub struct FakeContext {
    pub safe_mode: bool,
    pub boot_read_only: bool,
    pub read_only: HashSet<PathBuf>,
    pub files: HashSet<PathBuf>,
}

impl FakeContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn safe_mode(mut self) -> Self {
        self.safe_mode = true;
        self
    }

    pub fn read_only_boot(mut self) -> Self {
        self.boot_read_only = true;
        self
    }

    pub fn with_read_only(mut self, path: &str) -> Self {
        self.read_only.insert(PathBuf::from(path));
        self
    }

    pub fn with_file(mut self, path: &str) -> Self {
        self.files.insert(PathBuf::from(path));
        self
    }
}

impl ConditionContext for FakeContext {
    fn is_safe_mode(&self) -> bool {
        self.safe_mode
    }

    fn boot_volume_is_read_only(&self) -> bool {
        self.boot_read_only
    }

    fn is_read_only(&self, path: &Path) -> bool {
        self.read_only.iter().any(|p| path.starts_with(p))
    }

    fn file_exists(&self, path: &Path) -> bool {
        self.files.contains(path)
    }
}

/// Session link that records what it was sent and answers with a canned
/// reply.
#[derive(Debug)]
pub struct FakeSessionLink {
    reply: Reply,
    forwarded: Mutex<Vec<Request>>,
}

impl FakeSessionLink {
    pub fn new(reply: Reply) -> Self {
        Self {
            reply,
            forwarded: Mutex::new(Vec::new()),
        }
    }

    pub fn forwarded(&self) -> Vec<Request> {
        self.forwarded.lock().clone()
    }
}

impl SessionLink for FakeSessionLink {
    fn forward(&self, request: Request) -> Pin<Box<dyn Future<Output = Reply> + Send + '_>> {
        self.forwarded.lock().push(request);
        let reply = self.reply.clone();
        Box::pin(async move { reply })
    }
}

/// Broker with a fixed user table. Every connection goes to the same
/// [`FakeSessionLink`].
#[derive(Debug, Clone)]
pub struct FakeSessionBroker {
    users: HashMap<String, UserRecord>,
    link: Arc<FakeSessionLink>,
}

impl FakeSessionBroker {
    pub fn new(link: Arc<FakeSessionLink>) -> Self {
        Self {
            users: HashMap::new(),
            link,
        }
    }

    pub fn with_user(mut self, login: &str, uid: u32) -> Self {
        self.users.insert(
            login.to_string(),
            UserRecord {
                uid,
                gid: uid,
                home: PathBuf::from(format!("/home/{login}")),
            },
        );
        self
    }
}

impl Default for FakeSessionBroker {
    fn default() -> Self {
        Self::new(Arc::new(FakeSessionLink::new(Err(StatusCode::NameNotFound))))
    }
}

impl SessionBroker for FakeSessionBroker {
    fn lookup_user(&self, login: &str) -> Option<UserRecord> {
        self.users.get(login).cloned()
    }

    fn connect(&self, _socket: &Path) -> Arc<dyn SessionLink> {
        self.link.clone()
    }
}
