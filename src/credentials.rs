//! `.env` fallback for provider credentials.
//!
//! When no known API key is present in the process environment, the first
//! `.env` file found in the working directory, the executable's directory,
//! or its parent is loaded. Variables already set are never overridden.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Variables that count as "credentials already configured".
pub const CREDENTIAL_VARS: &[&str] = &[
    "OPENAI_API_KEY",
    "ANTHROPIC_API_KEY",
    "GEMINI_API_KEY",
    "GROQ_API_KEY",
    "MISTRAL_API_KEY",
    "OPENROUTER_API_KEY",
    "XAI_API_KEY",
    "EDGEQUAKE_LLM_PROVIDER",
];

/// Whether any credential variable is set to a non-empty value.
pub fn has_credentials() -> bool {
    CREDENTIAL_VARS
        .iter()
        .any(|var| std::env::var(var).is_ok_and(|v| !v.trim().is_empty()))
}

/// Load a nearby `.env` when no credentials are configured.
///
/// Returns the file that was loaded, if any. A malformed file is logged and
/// otherwise ignored.
pub fn load_env_fallback() -> Option<PathBuf> {
    if has_credentials() {
        return None;
    }
    load_first_env_file(&candidate_dirs())
}

fn candidate_dirs() -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        dirs.push(cwd);
    }
    if let Some(exe_dir) = std::env::current_exe()
        .ok()
        .and_then(|exe| exe.parent().map(Path::to_path_buf))
    {
        let parent = exe_dir.parent().map(Path::to_path_buf);
        dirs.push(exe_dir);
        dirs.extend(parent);
    }
    dirs
}

/// Load the first `<dir>/.env` that exists; later candidates are not read.
fn load_first_env_file(dirs: &[PathBuf]) -> Option<PathBuf> {
    let env_path = dirs.iter().map(|d| d.join(".env")).find(|p| p.is_file())?;
    match dotenvy::from_path(&env_path) {
        Ok(()) => {
            debug!("Loaded credentials from {}", env_path.display());
            Some(env_path)
        }
        Err(e) => {
            warn!("Ignoring malformed {}: {}", env_path.display(), e);
            None
        }
    }
}
