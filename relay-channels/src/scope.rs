//! Scope resolution.
//!
//! Turns a user argument into the absolute directory the assistant will run
//! in: a named preset, `new` for a fresh timestamped project directory, or a
//! path (`~` expanded, relative paths taken from the current scope).

use relay_common::config::Config;
use std::path::{Path, PathBuf};

/// Preset name that creates a new empty project directory.
pub const NEW_PRESET: &str = "new";

/// Scope resolution failure.
#[derive(Debug, thiserror::Error)]
pub enum ScopeError {
    #[error("'{}' is not a valid directory.", .0.display())]
    NotADirectory(PathBuf),

    #[error("could not create '{}': {source}", path.display())]
    Create {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("could not save scope: {0}")]
    Persist(#[from] relay_common::Error),
}

/// Resolves scope arguments against a fixed set of presets.
#[derive(Debug, Clone)]
pub struct ScopeResolver {
    presets: Vec<(&'static str, PathBuf)>,
    project_root: PathBuf,
    project_prefix: String,
}

impl ScopeResolver {
    /// Build the preset table from the user's standard directories.
    ///
    /// `here` is `start_dir`; `new` directories go under `project_root`,
    /// which defaults to the desktop.
    pub fn new(start_dir: PathBuf, project_root: Option<PathBuf>, project_prefix: impl Into<String>) -> Self {
        let dirs = directories::UserDirs::new();
        let home = dirs
            .as_ref()
            .map(|d| d.home_dir().to_path_buf())
            .unwrap_or_else(|| start_dir.clone());
        let user_dir = |pick: fn(&directories::UserDirs) -> Option<&Path>, fallback: &str| {
            dirs.as_ref()
                .and_then(|d| pick(d).map(Path::to_path_buf))
                .unwrap_or_else(|| home.join(fallback))
        };

        let desktop = user_dir(directories::UserDirs::desktop_dir, "Desktop");
        let documents = user_dir(directories::UserDirs::document_dir, "Documents");
        let downloads = user_dir(directories::UserDirs::download_dir, "Downloads");
        let root = if cfg!(windows) {
            PathBuf::from("C:\\")
        } else {
            PathBuf::from("/")
        };

        Self {
            project_root: project_root.unwrap_or_else(|| desktop.clone()),
            presets: vec![
                ("desktop", desktop),
                ("documents", documents),
                ("downloads", downloads),
                ("home", home),
                ("here", start_dir),
                ("root", root),
            ],
            project_prefix: project_prefix.into(),
        }
    }

    /// Build a resolver from configuration, with `here` as the process start directory.
    pub fn from_config(config: &Config) -> Self {
        let start_dir = std::env::current_dir().unwrap_or_else(|_| config.default_scope());
        let prefix = Path::new(&config.assistant.binary)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "assistant".into());
        Self::new(
            start_dir,
            config.session.project_root.clone(),
            format!("{prefix}_project"),
        )
    }

    /// Named presets in display order.
    pub fn presets(&self) -> &[(&'static str, PathBuf)] {
        &self.presets
    }

    /// Parent directory of `new` projects.
    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    /// Resolve `arg` to an existing absolute directory.
    pub fn resolve(&self, arg: &str, current: &Path) -> Result<PathBuf, ScopeError> {
        let arg = arg.trim();
        let key = arg.to_lowercase();

        let candidate = if key == NEW_PRESET {
            return self.create_project();
        } else if let Some((_, path)) = self.presets.iter().find(|(name, _)| *name == key) {
            path.clone()
        } else {
            let expanded = PathBuf::from(shellexpand::tilde(arg).into_owned());
            if expanded.is_relative() {
                current.join(expanded)
            } else {
                expanded
            }
        };

        if !candidate.is_dir() {
            return Err(ScopeError::NotADirectory(candidate));
        }

        std::fs::canonicalize(&candidate).map_err(|_| ScopeError::NotADirectory(candidate))
    }

    fn create_project(&self) -> Result<PathBuf, ScopeError> {
        let stamp = chrono::Local::now().format("%Y%m%d_%H%M%S");
        let path = self.project_root.join(format!("{}_{stamp}", self.project_prefix));

        std::fs::create_dir_all(&path).map_err(|source| ScopeError::Create {
            path: path.clone(),
            source,
        })?;
        tracing::info!(path = %path.display(), "Created new project scope");

        std::fs::canonicalize(&path).map_err(|source| ScopeError::Create { path, source })
    }
}
