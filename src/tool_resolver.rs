//! # Tool Path Resolver
//!
//! Finds the external compressors on this machine:
//! - explicit paths given in the configuration
//! - a tools directory named by `KOMPRESSOR_TOOLS_DIR`
//! - the system `PATH`

use std::env;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming a directory searched before `PATH`
pub const TOOLS_DIR_ENV: &str = "KOMPRESSOR_TOOLS_DIR";

/// Tool path resolver for system-installed and bundled compressors
#[derive(Debug, Clone, Default)]
pub struct ToolPathResolver {
    /// Directory searched before the system PATH
    tools_dir: Option<PathBuf>,
}

impl ToolPathResolver {
    /// Create a resolver honouring `KOMPRESSOR_TOOLS_DIR`
    pub fn new() -> Self {
        let tools_dir = env::var_os(TOOLS_DIR_ENV)
            .map(PathBuf::from)
            .filter(|dir| dir.is_dir());
        if let Some(ref dir) = tools_dir {
            debug!("Using tools directory from {}: {:?}", TOOLS_DIR_ENV, dir);
        }
        Self { tools_dir }
    }

    /// Create a resolver that searches `tools_dir` before `PATH`
    pub fn with_tools_dir(tools_dir: impl Into<PathBuf>) -> Self {
        Self {
            tools_dir: Some(tools_dir.into()),
        }
    }

    /// Resolve the path to a specific tool
    pub fn resolve_tool(&self, tool_name: &str) -> Option<PathBuf> {
        let candidate = Path::new(tool_name);

        // Explicit paths are used as given
        if candidate.components().count() > 1 {
            return candidate.is_file().then(|| candidate.to_path_buf());
        }

        if let Some(ref tools_dir) = self.tools_dir {
            let bundled = tools_dir.join(Self::executable_name(tool_name));
            if bundled.is_file() {
                debug!("Using bundled tool: {} -> {:?}", tool_name, bundled);
                return Some(bundled);
            }
        }

        if let Some(system_path) = self.find_in_system_path(tool_name) {
            debug!("Using system tool: {} -> {:?}", tool_name, system_path);
            return Some(system_path);
        }

        warn!("Tool not found: {}", tool_name);
        None
    }

    /// Check if a specific tool is available
    pub fn is_tool_available(&self, tool_name: &str) -> bool {
        self.resolve_tool(tool_name).is_some()
    }

    fn executable_name(tool_name: &str) -> String {
        if cfg!(windows) && !tool_name.ends_with(".exe") {
            format!("{}.exe", tool_name)
        } else {
            tool_name.to_string()
        }
    }

    /// Find tool in system PATH
    fn find_in_system_path(&self, tool_name: &str) -> Option<PathBuf> {
        let executable = Self::executable_name(tool_name);
        env::split_paths(&env::var_os("PATH")?)
            .map(|dir| dir.join(&executable))
            .find(|path| path.is_file())
    }

    /// Installation hint shown when a tool is missing
    pub fn install_hint(tool_name: &str) -> String {
        let base = Path::new(tool_name)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| tool_name.to_string());

        match base.as_str() {
            "jpegoptim" => "sudo apt-get install jpegoptim".to_string(),
            "pngquant" => "sudo apt-get install pngquant".to_string(),
            "cwebp" | "dwebp" => "sudo apt-get install webp".to_string(),
            _ => format!("sudo apt-get install {}", base),
        }
    }

    /// Get a report of tool availability
    pub fn tools_report(&self, tools: &[&str]) -> String {
        let mut report = String::from("Tool availability:\n");
        for tool in tools {
            match self.resolve_tool(tool) {
                Some(path) => report.push_str(&format!("  ✅ {} -> {}\n", tool, path.display())),
                None => report.push_str(&format!(
                    "  ❌ {} (install with: {})\n",
                    tool,
                    Self::install_hint(tool)
                )),
            }
        }
        report
    }
}
