use std::path::{Path, PathBuf};

use workbench_core::config::workbench_root;

pub const DAEMON_SOCKET: &str = "workbench.sock";

/// `<home>/.workbench/workbench.sock`
pub fn socket_path(home: &Path) -> PathBuf {
    workbench_root(home).join(DAEMON_SOCKET)
}
