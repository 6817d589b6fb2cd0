#![allow(dead_code, unused_imports)]

pub use launch_daemon_test_utils::builders;
pub use launch_daemon_test_utils::fakes;
pub use launch_daemon_test_utils::harness::TestDaemon;
pub use launch_daemon_test_utils::{init_tracing, with_timeout};

use launch_daemon::ipc::{Payload, Reply};

/// Pid out of a `LaunchData` reply.
pub fn launch_pid(reply: &Reply) -> Option<u32> {
    match reply {
        Ok(Payload::LaunchData { pid, .. }) => Some(*pid),
        _ => None,
    }
}

/// Names out of a `Names` reply, panicking on anything else.
pub fn names(reply: Reply) -> Vec<String> {
    match reply {
        Ok(Payload::Names { names }) => names,
        other => panic!("expected names, got {other:?}"),
    }
}
