//! Request handler used by `imgstream replay`.
//!
//! Serves requests against synthetic image data: each call sleeps for a
//! configurable latency to stand in for I/O, histograms and spectral profiles
//! run as real cancellable reductions, and every call is counted so the
//! command can print a summary.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use imgstream::handler::{HandlerError, RequestHandler};
use imgstream::reduce::{Histogram, ParallelReducer, Reduction};
use imgstream::request::{
    AddRequiredTiles, BatchedMessage, FileId, OpenFile, RegionDataStream, SetContourParameters,
    SetCursor, SetHistogramRequirements, SetImageChannels, SetImageView, SpectralLineRequest,
    SpectralProfile,
};
use imgstream::session::{SessionContext, SessionId};

/// Samples in the synthetic image plane.
const PLANE_SAMPLES: usize = 256 * 1024;

/// Handler that simulates work and records what it was asked to do.
pub struct ReplayHandler {
    root_folder: PathBuf,
    latency: Duration,
    reducer: Arc<ParallelReducer>,
    plane: Vec<f32>,
    calls: Mutex<BTreeMap<&'static str, u64>>,
    cancelled: Mutex<u64>,
}

impl ReplayHandler {
    pub fn new(root_folder: &Path, latency: Duration, reducer: Arc<ParallelReducer>) -> Self {
        let plane = (0..PLANE_SAMPLES)
            .map(|i| ((i % 1024) as f32 / 1024.0) * ((i / 1024) as f32 / 256.0))
            .collect();
        Self {
            root_folder: root_folder.to_path_buf(),
            latency,
            reducer,
            plane,
            calls: Mutex::new(BTreeMap::new()),
            cancelled: Mutex::new(0),
        }
    }

    /// Calls made so far, per request kind.
    pub fn calls(&self) -> BTreeMap<&'static str, u64> {
        self.calls.lock().clone()
    }

    /// Reductions that stopped early because their context was cancelled.
    pub fn cancelled_reductions(&self) -> u64 {
        *self.cancelled.lock()
    }

    fn record(&self, kind: &'static str) {
        *self.calls.lock().entry(kind).or_insert(0) += 1;
    }

    fn simulate_latency(&self) {
        if !self.latency.is_zero() {
            thread::sleep(self.latency);
        }
    }

    fn record_cancelled(&self, kind: &'static str, completed_units: usize) {
        *self.cancelled.lock() += 1;
        info!(kind, completed_units, "Reduction cancelled");
    }
}

impl RequestHandler for ReplayHandler {
    fn on_open_file(&self, session: SessionId, request: &OpenFile) -> Result<(), HandlerError> {
        self.record("OPEN_FILE");
        let path = self.root_folder.join(&request.path);
        if request.path.is_empty() {
            return Err(HandlerError::Failed("empty file path".to_string()));
        }
        debug!(%session, file_id = %request.file_id, path = %path.display(), "Opening file");
        self.simulate_latency();
        Ok(())
    }

    fn on_close_file(&self, session: SessionId, file_id: FileId) -> Result<(), HandlerError> {
        self.record("CLOSE_FILE");
        debug!(%session, %file_id, "Closing file");
        Ok(())
    }

    fn on_set_image_channels(
        &self,
        session: SessionId,
        request: &SetImageChannels,
    ) -> Result<(), HandlerError> {
        self.record("SET_IMAGE_CHANNELS");
        debug!(
            %session,
            file_id = %request.file_id,
            channel = request.channel,
            stokes = request.stokes,
            "Changing channel"
        );
        self.simulate_latency();
        Ok(())
    }

    fn on_set_image_view(
        &self,
        session: SessionId,
        request: &SetImageView,
    ) -> Result<(), HandlerError> {
        self.record("SET_IMAGE_VIEW");
        debug!(%session, file_id = %request.file_id, mip = request.mip, "Rendering view");
        self.simulate_latency();
        Ok(())
    }

    fn on_set_cursor(&self, session: SessionId, request: &SetCursor) -> Result<(), HandlerError> {
        self.record("SET_CURSOR");
        debug!(%session, file_id = %request.file_id, "Cursor moved");
        Ok(())
    }

    fn on_histogram(
        &self,
        session: SessionId,
        request: &SetHistogramRequirements,
        context: &SessionContext,
    ) -> Result<(), HandlerError> {
        self.record("SET_HISTOGRAM_REQUIREMENTS");
        if request.num_bins == 0 {
            return Err(HandlerError::Failed("histogram needs at least one bin".to_string()));
        }

        match Histogram::compute(
            &self.reducer,
            &self.plane,
            request.num_bins as usize,
            0.0,
            1.0,
            &[context],
        ) {
            Reduction::Complete(histogram) => {
                debug!(
                    %session,
                    file_id = %request.file_id,
                    bins = histogram.bins.len(),
                    samples = histogram.total(),
                    "Histogram complete"
                );
            }
            Reduction::Cancelled {
                completed_units, ..
            } => self.record_cancelled("histogram", completed_units),
        }
        Ok(())
    }

    fn on_animation_frame(
        &self,
        session: SessionId,
        file_id: FileId,
        frame: i32,
    ) -> Result<(), HandlerError> {
        self.record("ANIMATION_FRAME");
        debug!(%session, %file_id, frame, "Sending animation frame");
        self.simulate_latency();
        Ok(())
    }

    fn on_add_required_tiles(
        &self,
        session: SessionId,
        request: &AddRequiredTiles,
    ) -> Result<(), HandlerError> {
        self.record("ADD_REQUIRED_TILES");
        debug!(%session, file_id = %request.file_id, tiles = request.tiles.len(), "Sending tiles");
        self.simulate_latency();
        Ok(())
    }

    fn on_set_contour_parameters(
        &self,
        session: SessionId,
        request: &SetContourParameters,
    ) -> Result<(), HandlerError> {
        self.record("SET_CONTOUR_PARAMETERS");
        debug!(%session, file_id = %request.file_id, levels = request.levels.len(), "Tracing contours");
        self.simulate_latency();
        Ok(())
    }

    fn on_region_data_stream(
        &self,
        session: SessionId,
        request: &RegionDataStream,
        context: &SessionContext,
    ) -> Result<(), HandlerError> {
        self.record("REGION_DATA_STREAM");
        if context.is_cancelled() {
            return Ok(());
        }
        debug!(%session, file_id = %request.file_id, region_id = %request.region_id, "Streaming region data");
        self.simulate_latency();
        Ok(())
    }

    fn on_spectral_profile(
        &self,
        session: SessionId,
        request: &SpectralProfile,
        context: &SessionContext,
    ) -> Result<(), HandlerError> {
        self.record("SPECTRAL_PROFILE");
        let channels = 64;
        let width = self.plane.len() / channels;
        let result = self.reducer.reduce(
            channels,
            &[context],
            Vec::new,
            |channel| {
                let start = channel * width;
                let sum: f64 = self.plane[start..start + width]
                    .iter()
                    .map(|&v| f64::from(v))
                    .sum();
                vec![(channel, sum / width as f64)]
            },
            |mut a, b| {
                a.extend(b);
                a
            },
        );

        match result {
            Reduction::Complete(profile) => {
                debug!(
                    %session,
                    file_id = %request.file_id,
                    region_id = %request.region_id,
                    points = profile.len(),
                    "Spectral profile complete"
                );
            }
            Reduction::Cancelled {
                completed_units, ..
            } => self.record_cancelled("spectral_profile", completed_units),
        }
        Ok(())
    }

    fn on_spectral_line_request(
        &self,
        session: SessionId,
        request: &SpectralLineRequest,
    ) -> Result<(), HandlerError> {
        self.record("SPECTRAL_LINE_REQUEST");
        let (low, high) = request.frequency_range;
        if low > high {
            warn!(%session, low, high, "Inverted frequency range");
            return Err(HandlerError::Failed(format!(
                "frequency range {}..{} is inverted",
                low, high
            )));
        }
        self.simulate_latency();
        Ok(())
    }

    fn on_batched_message(
        &self,
        session: SessionId,
        message: &BatchedMessage,
    ) -> Result<(), HandlerError> {
        self.record("BATCHED_MESSAGE");
        if message.payload.is_empty() {
            return Err(HandlerError::malformed(message.kind.to_string(), "empty payload"));
        }
        debug!(%session, kind = %message.kind, request_id = message.request_id, "Batched message");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use imgstream::request::RegionId;

    fn handler() -> ReplayHandler {
        let reducer = Arc::new(ParallelReducer::new(2).unwrap());
        ReplayHandler::new(Path::new("/data"), Duration::ZERO, reducer)
    }

    #[test]
    fn test_calls_are_counted_per_kind() {
        let handler = handler();
        let session = SessionId(1);
        let open = OpenFile {
            file_id: FileId(0),
            path: "cube.fits".to_string(),
            request_id: 0,
        };

        handler.on_open_file(session, &open).unwrap();
        handler.on_open_file(session, &open).unwrap();
        handler.on_close_file(session, FileId(0)).unwrap();

        let calls = handler.calls();
        assert_eq!(calls.get("OPEN_FILE"), Some(&2));
        assert_eq!(calls.get("CLOSE_FILE"), Some(&1));
    }

    #[test]
    fn test_histogram_cancelled_context() {
        let handler = handler();
        let context = SessionContext::new();
        context.cancel();
        let request = SetHistogramRequirements {
            file_id: FileId(0),
            region_id: RegionId(-1),
            num_bins: 64,
            request_id: 0,
        };

        handler.on_histogram(SessionId(1), &request, &context).unwrap();
        assert_eq!(handler.cancelled_reductions(), 1);
    }

    #[test]
    fn test_histogram_completes() {
        let handler = handler();
        let context = SessionContext::new();
        let request = SetHistogramRequirements {
            file_id: FileId(0),
            region_id: RegionId(-1),
            num_bins: 16,
            request_id: 0,
        };

        handler.on_histogram(SessionId(1), &request, &context).unwrap();
        assert_eq!(handler.cancelled_reductions(), 0);
    }

    #[test]
    fn test_empty_batched_payload_is_malformed() {
        let handler = handler();
        let message = BatchedMessage {
            kind: imgstream::request::BatchedKind::RemoveRegion,
            request_id: 3,
            payload: vec![],
        };

        let result = handler.on_batched_message(SessionId(1), &message);
        assert!(matches!(result, Err(HandlerError::Malformed { .. })));
    }
}
