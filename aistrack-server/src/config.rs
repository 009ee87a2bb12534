use directories::ProjectDirs;
use std::path::PathBuf;

/// Platform data directory, e.g. `~/.local/share/aistrack` on Linux.
pub fn get_project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "aistrack", "aistrack")
}

/// Where the vessel store lives when no `--data-dir` is given.
pub fn default_data_dir() -> PathBuf {
    get_project_dirs()
        .map(|dirs| dirs.data_dir().join("vessels"))
        .unwrap_or_else(|| PathBuf::from("./aistrack-data"))
}
