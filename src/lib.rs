//! Inspect, extract, update and create Android boot images.
//!
//! A boot image is a fixed [`Header`] followed by the kernel, ramdisk,
//! optional second stage and optional device tree, each starting on a page
//! boundary. [`BootImage`] ties the header to its section payloads and
//! writes the result back with a freshly computed id.

pub mod checksum;
pub mod config;
pub mod device;
pub mod error;
pub mod header;
pub mod image;
pub mod layout;
pub mod logging;
pub mod reader;
pub mod section;
pub mod types;
pub mod writer;

pub use config::{Edits, HeaderEdit};
pub use device::TargetInfo;
pub use error::{Error, Invalid, Result};
pub use header::Header;
pub use image::BootImage;
pub use layout::{Extent, Layout};
pub use reader::ContainerReader;
pub use section::{Replacements, SectionSource, SectionStore};
pub use types::SectionKind;
pub use writer::Sink;
