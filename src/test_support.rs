//! Fixture condivise dai test: compressori finti e immagini generate.

use crate::config::ToolConfig;
use image::{Rgb, RgbImage, Rgba, RgbaImage};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Stand-in for a missing compressor
pub const MISSING_TOOL: &str = "kompressor-no-such-tool-1f2e";

/// Directory of executable shell scripts standing in for the real compressors
pub struct FakeTools {
    dir: TempDir,
}

impl FakeTools {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    /// Writes an executable `#!/bin/sh` script and returns its path
    pub fn script(&self, name: &str, body: &str) -> String {
        let path = self.dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        path.to_string_lossy().into_owned()
    }

    /// Truncates the file named by its last argument to 64 bytes
    pub fn shrinking(&self, name: &str) -> String {
        self.script(
            name,
            r#"for last; do :; done
head -c 64 "$last" > "$last.part" && mv "$last.part" "$last""#,
        )
    }

    /// Succeeds without touching anything
    pub fn noop(&self, name: &str) -> String {
        self.script(name, "exit 0")
    }

    /// Prints a diagnostic and exits with status 2
    pub fn failing(&self, name: &str) -> String {
        self.script(name, "echo \"processing $*\"\necho \"cannot read input\" >&2\nexit 2")
    }

    /// Succeeds after deleting its last argument
    pub fn deleting(&self, name: &str) -> String {
        self.script(name, "for last; do :; done\nrm -f \"$last\"")
    }

    /// Records its arguments, one per line, into `<name>.args`
    pub fn recording(&self, name: &str) -> (String, PathBuf) {
        let log = self.dir.path().join(format!("{}.args", name));
        let body = format!(
            "for arg; do echo \"$arg\" >> '{}'; done",
            log.to_string_lossy()
        );
        (self.script(name, &body), log)
    }

    /// All three formats handled by shrinking scripts
    pub fn shrinking_config(&self) -> ToolConfig {
        ToolConfig {
            jpeg: self.shrinking("jpegoptim"),
            png: self.shrinking("pngquant"),
            webp: self.shrinking("cwebp"),
        }
    }
}

/// Tool configuration in which every compressor is missing
pub fn missing_tools() -> ToolConfig {
    ToolConfig {
        jpeg: MISSING_TOOL.to_string(),
        png: MISSING_TOOL.to_string(),
        webp: MISSING_TOOL.to_string(),
    }
}

fn noise(x: u32, y: u32, salt: u32) -> u8 {
    let mut v = x.wrapping_mul(374_761_393) ^ y.wrapping_mul(668_265_263) ^ salt;
    v = (v ^ (v >> 13)).wrapping_mul(1_274_126_177);
    (v >> 16) as u8
}

/// Noisy RGB image, so encoders cannot shrink it to almost nothing
pub fn write_noisy_image(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([noise(x, y, 1), noise(x, y, 2), noise(x, y, 3)])
    })
    .save(&path)
    .unwrap();
    path
}

/// RGBA image with a transparent half
pub fn write_transparent_png(dir: &Path, name: &str, width: u32, height: u32) -> PathBuf {
    let path = dir.join(name);
    RgbaImage::from_fn(width, height, |x, y| {
        let alpha = if x < width / 2 { 0 } else { 255 };
        Rgba([noise(x, y, 4), noise(x, y, 5), 90, alpha])
    })
    .save(&path)
    .unwrap();
    path
}
