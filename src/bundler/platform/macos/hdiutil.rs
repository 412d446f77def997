//! Disk image host tool access.
//!
//! [`ImageTool`] is the seam between the disk-image state machine and the
//! operating system. [`Hdiutil`] drives the native `hdiutil` binary.

use crate::bundler::{
    error::{Error, Result},
    utils::process::run_tool,
};
use std::ffi::OsStr;
use std::fmt;
use std::future::Future;
use std::path::Path;

/// Disk image container formats the pipeline cares about.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ImageFormat {
    /// Read/write image used while staging and customizing.
    Udrw,
    /// zlib-compressed read-only image used for distribution.
    Udzo,
    /// Any other format reported by the tool.
    Other(String),
}

impl ImageFormat {
    /// Format code as understood by `hdiutil -format`.
    pub fn code(&self) -> &str {
        match self {
            ImageFormat::Udrw => "UDRW",
            ImageFormat::Udzo => "UDZO",
            ImageFormat::Other(code) => code,
        }
    }

    /// Parses a format code such as `UDZO`.
    pub fn from_code(code: &str) -> Self {
        match code.trim() {
            "UDRW" => ImageFormat::Udrw,
            "UDZO" => ImageFormat::Udzo,
            other => ImageFormat::Other(other.to_string()),
        }
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.code())
    }
}

/// How a disk image is attached.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum AttachMode {
    /// Writable and visible to Finder, for window customization.
    ReadWrite,
    /// Read-only and hidden from Finder, for installing from a finished image.
    ReadOnlyHidden,
}

/// Operations on disk image files.
///
/// Every call blocks (asynchronously) until the host tool exits.
pub trait ImageTool {
    /// Creates a writable image at `image` holding the contents of `source_dir`.
    fn create(
        &self,
        source_dir: &Path,
        volume_name: &str,
        image: &Path,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Attaches `image` at `mount_point`.
    fn attach(
        &self,
        image: &Path,
        mount_point: &Path,
        mode: AttachMode,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Detaches the volume mounted at `mount_point`.
    fn detach(&self, mount_point: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Converts `image` into a compressed read-only image at `output`.
    fn convert(&self, image: &Path, output: &Path) -> impl Future<Output = Result<()>> + Send;

    /// Inspects the container format of `image`.
    fn format(&self, image: &Path) -> impl Future<Output = Result<ImageFormat>> + Send;
}

/// [`ImageTool`] backed by macOS `hdiutil`.
#[derive(Clone, Debug, Default)]
pub struct Hdiutil;

impl ImageTool for Hdiutil {
    async fn create(&self, source_dir: &Path, volume_name: &str, image: &Path) -> Result<()> {
        let args: [&OsStr; 11] = [
            "create".as_ref(),
            "-volname".as_ref(),
            volume_name.as_ref(),
            "-srcfolder".as_ref(),
            source_dir.as_os_str(),
            "-ov".as_ref(),
            "-fs".as_ref(),
            "HFS+".as_ref(),
            "-format".as_ref(),
            "UDRW".as_ref(),
            image.as_os_str(),
        ];
        run_tool("hdiutil", args, "hdiutil create").await?;
        Ok(())
    }

    async fn attach(&self, image: &Path, mount_point: &Path, mode: AttachMode) -> Result<()> {
        let mut args: Vec<&OsStr> = vec!["attach".as_ref()];
        match mode {
            AttachMode::ReadWrite => args.push("-readwrite".as_ref()),
            AttachMode::ReadOnlyHidden => {
                args.push("-readonly".as_ref());
                args.push("-nobrowse".as_ref());
            }
        }
        args.push("-noverify".as_ref());
        args.push("-noautoopen".as_ref());
        args.push("-mountpoint".as_ref());
        args.push(mount_point.as_os_str());
        args.push(image.as_os_str());

        run_tool("hdiutil", args, "hdiutil attach").await?;
        Ok(())
    }

    async fn detach(&self, mount_point: &Path) -> Result<()> {
        let args: [&OsStr; 2] = ["detach".as_ref(), mount_point.as_os_str()];
        if let Err(e) = run_tool("hdiutil", args, "hdiutil detach").await {
            log::warn!("DMG detach had issues, forcing: {}", e);
            let forced: [&OsStr; 3] = ["detach".as_ref(), mount_point.as_os_str(), "-force".as_ref()];
            run_tool("hdiutil", forced, "hdiutil detach").await?;
        }
        Ok(())
    }

    async fn convert(&self, image: &Path, output: &Path) -> Result<()> {
        let args: [&OsStr; 8] = [
            "convert".as_ref(),
            image.as_os_str(),
            "-format".as_ref(),
            "UDZO".as_ref(),
            "-imagekey".as_ref(),
            "zlib-level=9".as_ref(),
            "-o".as_ref(),
            output.as_os_str(),
        ];
        run_tool("hdiutil", args, "hdiutil convert").await?;
        Ok(())
    }

    async fn format(&self, image: &Path) -> Result<ImageFormat> {
        let args: [&OsStr; 2] = ["imageinfo".as_ref(), image.as_os_str()];
        let output = run_tool("hdiutil", args, "hdiutil imageinfo").await?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_image_format(&stdout).ok_or_else(|| {
            Error::GenericError(format!(
                "hdiutil imageinfo reported no format for {}",
                image.display()
            ))
        })
    }
}

/// Extracts the `Format:` line from `hdiutil imageinfo` output.
pub fn parse_image_format(imageinfo: &str) -> Option<ImageFormat> {
    imageinfo.lines().find_map(|line| {
        line.trim()
            .strip_prefix("Format:")
            .map(ImageFormat::from_code)
    })
}
