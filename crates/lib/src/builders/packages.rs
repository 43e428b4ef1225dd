//! Pinned system packages for the Debian bookworm based images.
//!
//! Every install in every builder goes through these lists; an unpinned
//! `apt-get install` silently changes the toolchain under a cached layer.

use crate::pipeline::PinnedPackage;

/// Prerequisites for adding the NodeSource apt repository.
pub fn node_repo_prereqs() -> Vec<PinnedPackage> {
  vec![
    PinnedPackage::new("curl", "7.88.1-10+deb12u12"),
    PinnedPackage::new("ca-certificates", "20230311"),
    PinnedPackage::new("gnupg", "2.2.40-1.1"),
  ]
}

/// NodeSource setup script for the Node.js major the app is built with.
pub const NODE_SETUP_URL: &str = "https://deb.nodesource.com/setup_20.x";

/// Tauri build dependencies plus the Node.js runtime.
pub fn tauri() -> Vec<PinnedPackage> {
  vec![
    PinnedPackage::new("libwebkit2gtk-4.1-dev", "2.48.3-1~deb12u1"),
    PinnedPackage::new("build-essential", "12.9"),
    PinnedPackage::new("wget", "1.21.3-1+deb12u1"),
    PinnedPackage::new("file", "1:5.44-3"),
    PinnedPackage::new("libxdo-dev", "1:3.20160805.1-5"),
    PinnedPackage::new("libssl-dev", "3.0.16-1~deb12u1"),
    PinnedPackage::new("libayatana-appindicator3-dev", "0.5.92-1"),
    PinnedPackage::new("librsvg2-dev", "2.54.7+dfsg-1~deb12u1"),
    PinnedPackage::new("xdg-utils", "1.1.3-4.1"),
    PinnedPackage::new("nodejs", "20.19.2-1nodesource1"),
  ]
}

/// Cross linker for building the app for arm64 on an amd64 host.
pub fn arm64_cross() -> Vec<PinnedPackage> {
  vec![PinnedPackage::new("gcc-aarch64-linux-gnu", "4:12.2.0-3")]
}

/// D-Bus development files for the central daemon's BLE stack.
pub fn dbus() -> Vec<PinnedPackage> {
  vec![
    PinnedPackage::new("libdbus-1-3", "1.14.10-1~deb12u1"),
    PinnedPackage::new("libdbus-1-dev", "1.14.10-1~deb12u1"),
    PinnedPackage::new("dbus", "1.14.10-1~deb12u1"),
    PinnedPackage::new("pkg-config", "1.8.1-1"),
  ]
}

/// Host tools espup needs to install the Xtensa toolchain.
pub fn espup() -> Vec<PinnedPackage> {
  vec![
    PinnedPackage::new("gcc", "4:12.2.0-3"),
    PinnedPackage::new("build-essential", "12.9"),
    PinnedPackage::new("curl", "7.88.1-10+deb12u12"),
    PinnedPackage::new("pkg-config", "1.8.1-1"),
  ]
}
