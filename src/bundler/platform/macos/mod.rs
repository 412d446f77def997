//! macOS bundling support for .app bundles and DMG disk images.
//!
//! # Supported Formats
//!
//! - **Application Bundle (.app)**: via [`app`] module
//! - **Disk Image (.dmg)**: via [`dmg`] module
//!
//! # Build Requirements
//!
//! | Step | Required Tools | Notes |
//! |------|----------------|-------|
//! | .app | none | Info.plist written with the `plist` crate |
//! | .dmg | `hdiutil` | Built into macOS |
//! | Window layout | `osascript`, Finder | Optional, skipped when unavailable |
//!
//! # Output Location
//!
//! Both artifacts land in the configured output directory:
//! - `CPU Limiter.app` - Application bundle
//! - `CPU Limiter-0.1.0.dmg` - Disk image

pub mod app;
pub mod customize;
pub mod dmg;
pub mod hdiutil;
