use std::path::PathBuf;

const DAEMON_NAME: &str = "zeitrack-daemon";

/// The daemon binary is shipped next to the cli one.
pub fn to_daemon_path(mut path: PathBuf) -> PathBuf {
    path.set_file_name(DAEMON_NAME);
    #[cfg(windows)]
    {
        path.set_extension("exe");
    }
    path
}
