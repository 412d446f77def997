//! Platform-specific bundling implementations.
//!
//! Only macOS artifacts are produced. The modules compile on every host so the
//! bundle layout and the disk-image state machine can be exercised anywhere;
//! the host tools they drive (`hdiutil`, `osascript`) exist only on macOS.
//!
//! # Bundling Order
//!
//! DMG images require the .app bundle to exist. The [`PackageType::priority()`]
//! method encodes that order.

pub mod macos;

use std::fmt;

/// Artifact kinds produced by the bundler.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum PackageType {
    /// macOS application bundle (.app).
    MacOsBundle,

    /// macOS DMG disk image (.dmg).
    ///
    /// Requires [`MacOsBundle`](Self::MacOsBundle) to be built first.
    Dmg,
}

impl PackageType {
    /// Returns the short name for this package type.
    pub fn short_name(&self) -> &'static str {
        match self {
            PackageType::MacOsBundle => "app",
            PackageType::Dmg => "dmg",
        }
    }

    /// Returns the priority for bundling order. Lower numbers are bundled first.
    pub fn priority(&self) -> u32 {
        match self {
            PackageType::MacOsBundle => 0,
            PackageType::Dmg => 1, // Requires .app to be built first
        }
    }

    /// All package types, in bundling order.
    pub fn all() -> [PackageType; 2] {
        [PackageType::MacOsBundle, PackageType::Dmg]
    }
}

impl fmt::Display for PackageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.short_name())
    }
}
