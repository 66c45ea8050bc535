//! Task payloads.

use crate::request::{
    AddRequiredTiles, BatchedMessage, FileId, RegionDataStream, SetContourParameters,
    SetHistogramRequirements, SpectralLineRequest, SpectralProfile,
};

/// What a [`Task`](super::Task) does, with the minimal payload to do it.
///
/// Coalesced request classes carry only the file id: the request itself waits
/// in the session's coalescing slot so a newer one can replace it.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    /// Small messages decoded and applied one by one.
    MultiMessage(Vec<BatchedMessage>),
    /// Drain the channel-change slot of a file.
    SetImageChannels(FileId),
    /// Drain the view-change slot of a file.
    SetImageView(FileId),
    /// Drain the cursor slot of a file.
    SetCursor(FileId),
    SetHistogramRequirements(SetHistogramRequirements),
    /// Produce the next frame of the playback started as `generation`.
    AnimationStep { file_id: FileId, generation: u64 },
    AddRequiredTiles(AddRequiredTiles),
    SetContourParameters(SetContourParameters),
    RegionDataStream(RegionDataStream),
    SpectralProfile(SpectralProfile),
    SpectralLineRequest(SpectralLineRequest),
}

impl TaskKind {
    /// Name used in logs and pool diagnostics.
    pub fn name(&self) -> &'static str {
        match self {
            TaskKind::MultiMessage(_) => "MULTI_MESSAGE",
            TaskKind::SetImageChannels(_) => "SET_IMAGE_CHANNELS",
            TaskKind::SetImageView(_) => "SET_IMAGE_VIEW",
            TaskKind::SetCursor(_) => "SET_CURSOR",
            TaskKind::SetHistogramRequirements(_) => "SET_HISTOGRAM_REQUIREMENTS",
            TaskKind::AnimationStep { .. } => "ANIMATION",
            TaskKind::AddRequiredTiles(_) => "ADD_REQUIRED_TILES",
            TaskKind::SetContourParameters(_) => "SET_CONTOUR_PARAMETERS",
            TaskKind::RegionDataStream(_) => "REGION_DATA_STREAM",
            TaskKind::SpectralProfile(_) => "SPECTRAL_PROFILE",
            TaskKind::SpectralLineRequest(_) => "SPECTRAL_LINE_REQUEST",
        }
    }

    /// File the task works on, if any.
    pub fn file_id(&self) -> Option<FileId> {
        match self {
            TaskKind::MultiMessage(_) | TaskKind::SpectralLineRequest(_) => None,
            TaskKind::SetImageChannels(file_id)
            | TaskKind::SetImageView(file_id)
            | TaskKind::SetCursor(file_id)
            | TaskKind::AnimationStep { file_id, .. } => Some(*file_id),
            TaskKind::SetHistogramRequirements(r) => Some(r.file_id),
            TaskKind::AddRequiredTiles(r) => Some(r.file_id),
            TaskKind::SetContourParameters(r) => Some(r.file_id),
            TaskKind::RegionDataStream(r) => Some(r.file_id),
            TaskKind::SpectralProfile(r) => Some(r.file_id),
        }
    }
}
