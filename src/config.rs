use std::env;
use std::path::{Path, PathBuf};

/// Filter directive for the tracing subscriber (e.g. `SHAPE_LOG=debug`).
pub const LOG_ENV: &str = "SHAPE_LOG";
/// Set to `1` to skip the static typecheck pass.
pub const NO_TYPECHECK_ENV: &str = "SHAPE_NO_TYPECHECK";
/// Extra `:`-separated directories searched by `import`.
pub const PATH_ENV: &str = "SHAPE_PATH";

pub const SOURCE_EXTENSION: &str = "shape";

#[derive(Clone, Debug)]
pub struct Config {
    /// Entry script; imports resolve relative to its directory.
    pub path: PathBuf,
    /// Script arguments, exposed as `argv` and through `sys.argv()`.
    pub args: Vec<String>,
    pub typecheck: bool,
    pub search_paths: Vec<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            path: PathBuf::from("<main>"),
            args: Vec::new(),
            typecheck: true,
            search_paths: Vec::new(),
        }
    }
}

impl Config {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..Self::default()
        }
    }

    /// Builds a config for `path`, reading the `SHAPE_*` environment.
    pub fn from_env(path: impl Into<PathBuf>, args: Vec<String>) -> Self {
        let typecheck = !matches!(env::var(NO_TYPECHECK_ENV).as_deref(), Ok("1"));
        let search_paths = env::var(PATH_ENV)
            .map(|raw| parse_search_paths(&raw))
            .unwrap_or_default();
        Self {
            path: path.into(),
            args,
            typecheck,
            search_paths,
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    pub fn with_typecheck(mut self, typecheck: bool) -> Self {
        self.typecheck = typecheck;
        self
    }

    pub fn file_name(&self) -> String {
        self.path.display().to_string()
    }

    pub fn base_dir(&self) -> PathBuf {
        self.path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."))
    }
}

fn parse_search_paths(raw: &str) -> Vec<PathBuf> {
    raw.split(':')
        .filter(|entry| !entry.trim().is_empty())
        .map(PathBuf::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn search_paths_skip_empty_entries() {
        assert_eq!(
            parse_search_paths("lib::/opt/shape:"),
            vec![PathBuf::from("lib"), PathBuf::from("/opt/shape")]
        );
    }

    #[test]
    fn base_dir_defaults_to_current_directory() {
        assert_eq!(Config::new("main.shape").base_dir(), PathBuf::from("."));
        assert_eq!(
            Config::new("scripts/main.shape").base_dir(),
            PathBuf::from("scripts")
        );
    }
}
