//! Business-logic boundary.
//!
//! Tasks do not compute tiles, profiles or statistics themselves; they call a
//! [`RequestHandler`] synchronously on the worker thread. The handler owns
//! loaders, codecs and numeric kernels. Every method has a no-op default so an
//! implementation only provides what it serves.

use thiserror::Error;

use crate::request::{
    AddRequiredTiles, BatchedMessage, FileId, OpenFile, RegionDataStream, SetContourParameters,
    SetCursor, SetHistogramRequirements, SetImageChannels, SetImageView, SpectralLineRequest,
    SpectralProfile,
};
use crate::session::{SessionContext, SessionId};

/// Errors a handler reports back to the task that invoked it.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// The request payload could not be decoded.
    #[error("malformed {kind} message: {reason}")]
    Malformed { kind: String, reason: String },

    /// The handler could not complete the request.
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// Convenience constructor for [`HandlerError::Malformed`].
    pub fn malformed(kind: impl Into<String>, reason: impl Into<String>) -> Self {
        HandlerError::Malformed {
            kind: kind.into(),
            reason: reason.into(),
        }
    }
}

/// Synchronous request handlers invoked from tasks.
///
/// Implementations are shared by every worker thread, so they must be
/// `Send + Sync`. Methods may block; a blocked handler holds its worker.
#[allow(unused_variables)]
pub trait RequestHandler: Send + Sync {
    /// Load a file. Runs inline on the dispatching thread.
    fn on_open_file(&self, session: SessionId, request: &OpenFile) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Release a file's loader. Runs inline on the dispatching thread.
    fn on_close_file(&self, session: SessionId, file_id: FileId) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_set_image_channels(
        &self,
        session: SessionId,
        request: &SetImageChannels,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_set_image_view(
        &self,
        session: SessionId,
        request: &SetImageView,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_set_cursor(&self, session: SessionId, request: &SetCursor) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Compute a histogram. Long computations should poll `context` between
    /// work units and stop early once it is cancelled.
    fn on_histogram(
        &self,
        session: SessionId,
        request: &SetHistogramRequirements,
        context: &SessionContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Produce and send one animation frame.
    fn on_animation_frame(
        &self,
        session: SessionId,
        file_id: FileId,
        frame: i32,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_add_required_tiles(
        &self,
        session: SessionId,
        request: &AddRequiredTiles,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_set_contour_parameters(
        &self,
        session: SessionId,
        request: &SetContourParameters,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Recompute region data. `context` is cancelled when the client
    /// disconnects.
    fn on_region_data_stream(
        &self,
        session: SessionId,
        request: &RegionDataStream,
        context: &SessionContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_spectral_profile(
        &self,
        session: SessionId,
        request: &SpectralProfile,
        context: &SessionContext,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    fn on_spectral_line_request(
        &self,
        session: SessionId,
        request: &SpectralLineRequest,
    ) -> Result<(), HandlerError> {
        Ok(())
    }

    /// Decode and apply one message of a batch.
    ///
    /// Returning [`HandlerError::Malformed`] drops that message only.
    fn on_batched_message(
        &self,
        session: SessionId,
        message: &BatchedMessage,
    ) -> Result<(), HandlerError> {
        Ok(())
    }
}

/// Handler that accepts every request and does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

impl RequestHandler for NoopHandler {}
