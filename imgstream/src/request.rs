//! Decoded client requests.
//!
//! These are the already-validated, already-deserialized payloads the protocol
//! layer hands to the [`Dispatcher`](crate::dispatch::Dispatcher). Only the
//! fields a task needs to execute are carried; wire framing and message
//! schemas live outside this crate.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Client-assigned identifier of an open image file.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FileId(pub i32);

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a region within an open file.
#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RegionId(pub i32);

impl fmt::Display for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Protocol-level request id echoed back in responses.
pub type RequestId = u32;

/// Open an image file under a client-chosen file id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenFile {
    pub file_id: FileId,
    /// Path relative to the server's root folder.
    pub path: String,
    #[serde(default)]
    pub request_id: RequestId,
}

/// Close a previously opened file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CloseFile {
    pub file_id: FileId,
}

/// Change the displayed channel and/or stokes of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetImageChannels {
    pub file_id: FileId,
    pub channel: i32,
    pub stokes: i32,
    /// Tiles the client wants for the new channel.
    #[serde(default)]
    pub required_tiles: Vec<i32>,
    #[serde(default)]
    pub request_id: RequestId,
}

/// Pixel bounds of a view, half-open on the max side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBounds {
    pub x_min: i32,
    pub x_max: i32,
    pub y_min: i32,
    pub y_max: i32,
}

/// Pan/zoom the raster view of a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetImageView {
    pub file_id: FileId,
    pub bounds: ImageBounds,
    /// Downsampling factor.
    pub mip: i32,
}

/// Move the cursor over a file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SetCursor {
    pub file_id: FileId,
    pub x: f32,
    pub y: f32,
    #[serde(default)]
    pub request_id: RequestId,
}

/// Ask for a region histogram (possibly a whole-cube histogram).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetHistogramRequirements {
    pub file_id: FileId,
    pub region_id: RegionId,
    pub num_bins: u32,
    #[serde(default)]
    pub request_id: RequestId,
}

/// Add tiles to the set the client needs for the current view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AddRequiredTiles {
    pub file_id: FileId,
    pub tiles: Vec<i32>,
    #[serde(default)]
    pub compression_quality: f32,
}

/// Replace the contour configuration of a file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SetContourParameters {
    pub file_id: FileId,
    pub levels: Vec<f64>,
    #[serde(default)]
    pub smoothing_factor: i32,
}

/// Recompute and stream the data of one region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegionDataStream {
    pub file_id: FileId,
    pub region_id: RegionId,
}

/// Compute a spectral profile through a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SpectralProfile {
    pub file_id: FileId,
    pub region_id: RegionId,
    #[serde(default)]
    pub stokes: i32,
}

/// Query a spectral line catalogue.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SpectralLineRequest {
    /// Frequency range in MHz, inclusive.
    pub frequency_range: (f64, f64),
    pub intensity_limit: f64,
    #[serde(default)]
    pub request_id: RequestId,
}

/// Start animation playback over a frame range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartAnimation {
    pub file_id: FileId,
    /// First frame of the range (inclusive).
    pub first_frame: i32,
    /// Frame playback starts from; clamped into the range.
    pub start_frame: i32,
    /// End of the range (exclusive).
    pub last_frame: i32,
    /// Frame increment; negative plays backwards.
    pub step: i32,
    /// Overrides the configured flow window when present.
    #[serde(default)]
    pub flow_window: Option<u32>,
    #[serde(default)]
    pub looping: bool,
    #[serde(default)]
    pub request_id: RequestId,
}

/// Client acknowledgement of a received animation frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationFlowControl {
    pub file_id: FileId,
    pub received_frame: i32,
}

/// Stop animation playback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StopAnimation {
    pub file_id: FileId,
    /// Frame the client is showing when it stopped.
    #[serde(default)]
    pub end_frame: i32,
}

/// Kind of a small message carried in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchedKind {
    SetSpatialRequirements,
    SetSpectralRequirements,
    SetStatsRequirements,
    SetRegion,
    RemoveRegion,
}

impl fmt::Display for BatchedKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BatchedKind::SetSpatialRequirements => "SET_SPATIAL_REQUIREMENTS",
            BatchedKind::SetSpectralRequirements => "SET_SPECTRAL_REQUIREMENTS",
            BatchedKind::SetStatsRequirements => "SET_STATS_REQUIREMENTS",
            BatchedKind::SetRegion => "SET_REGION",
            BatchedKind::RemoveRegion => "REMOVE_REGION",
        };
        f.write_str(name)
    }
}

/// A small message whose payload is decoded by the handler when executed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchedMessage {
    pub kind: BatchedKind,
    #[serde(default)]
    pub request_id: RequestId,
    /// Still-encoded message body.
    #[serde(default)]
    pub payload: Vec<u8>,
}

/// Every decoded request the dispatcher understands.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    OpenFile(OpenFile),
    CloseFile(CloseFile),
    SetImageChannels(SetImageChannels),
    SetImageView(SetImageView),
    SetCursor(SetCursor),
    SetHistogramRequirements(SetHistogramRequirements),
    CancelHistogram,
    AddRequiredTiles(AddRequiredTiles),
    SetContourParameters(SetContourParameters),
    RegionDataStream(RegionDataStream),
    SpectralProfile(SpectralProfile),
    SpectralLineRequest(SpectralLineRequest),
    StartAnimation(StartAnimation),
    AnimationFlowControl(AnimationFlowControl),
    StopAnimation(StopAnimation),
    Batch { messages: Vec<BatchedMessage> },
}

impl Request {
    /// Event name used in logs.
    pub fn name(&self) -> &'static str {
        match self {
            Request::OpenFile(_) => "OPEN_FILE",
            Request::CloseFile(_) => "CLOSE_FILE",
            Request::SetImageChannels(_) => "SET_IMAGE_CHANNELS",
            Request::SetImageView(_) => "SET_IMAGE_VIEW",
            Request::SetCursor(_) => "SET_CURSOR",
            Request::SetHistogramRequirements(_) => "SET_HISTOGRAM_REQUIREMENTS",
            Request::CancelHistogram => "CANCEL_HISTOGRAM",
            Request::AddRequiredTiles(_) => "ADD_REQUIRED_TILES",
            Request::SetContourParameters(_) => "SET_CONTOUR_PARAMETERS",
            Request::RegionDataStream(_) => "REGION_DATA_STREAM",
            Request::SpectralProfile(_) => "SPECTRAL_PROFILE",
            Request::SpectralLineRequest(_) => "SPECTRAL_LINE_REQUEST",
            Request::StartAnimation(_) => "START_ANIMATION",
            Request::AnimationFlowControl(_) => "ANIMATION_FLOW_CONTROL",
            Request::StopAnimation(_) => "STOP_ANIMATION",
            Request::Batch { .. } => "BATCH",
        }
    }
}
