//! JSON Lines output of per-image results.

use crate::detector::{Detection, FrameAnalysis};
use crate::error::{Error, Result};
use crate::species::SpeciesCandidate;
use serde::Serialize;
use std::io::Write;
use std::path::Path;

/// One output line: the detections of one image.
#[derive(Debug, Serialize)]
pub struct FrameRecord<'a> {
    /// Source image path.
    pub file: String,
    /// Detections in model order.
    pub detections: &'a [Detection],
    /// Ranked species candidates per detection, when requested.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub candidates: Option<&'a [Vec<SpeciesCandidate>]>,
}

impl<'a> FrameRecord<'a> {
    /// Record for `analysis` of `file`.
    pub fn new(file: &Path, analysis: &'a FrameAnalysis, with_candidates: bool) -> Self {
        Self {
            file: file.display().to_string(),
            detections: &analysis.detections,
            candidates: with_candidates.then_some(analysis.candidates.as_slice()),
        }
    }
}

/// Write `record` as one JSON line.
pub fn write_record<W: Write>(out: &mut W, record: &FrameRecord<'_>) -> Result<()> {
    serde_json::to_writer(&mut *out, record).map_err(|e| Error::JsonSerialize { source: e })?;
    writeln!(out)?;
    Ok(())
}
