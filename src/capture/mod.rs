//! Full-page capture
//!
//! [`sections`] walks a loaded page viewport by viewport, [`stitch`] joins
//! the slices and [`orchestrator`] runs one complete attempt against a
//! render engine.

pub mod orchestrator;
pub mod sections;
pub mod stitch;

pub use orchestrator::{Capture, CaptureOptions, CaptureOrchestrator, CaptureState};
pub use sections::{
    CapturedSections, Chunk, ScrollSnapshot, SectionCapture, SectionOptions, StallPolicy,
    SCROLL_SNAPSHOT_SCRIPT,
};
pub use stitch::{StitchedImage, Stitcher};
