//! Animation playback throttled by client acknowledgements.
//!
//! A session plays at most one animation at a time. Each produced frame is
//! streamed to the client and counted as unacknowledged until the client sends
//! a flow event for it; playback pauses once the flow window is full and
//! resumes on the next acknowledgement. This bounds the frames in flight per
//! client no matter how slowly it consumes them.
//!
//! # Example
//!
//! ```
//! use imgstream::animation::{AnimationController, AnimationSettings, FlowOutcome, FrameStep};
//! use imgstream::request::FileId;
//!
//! let controller = AnimationController::new();
//! let generation = controller
//!     .start(FileId(0), AnimationSettings::new(0, 10).with_flow_window(1))
//!     .unwrap();
//!
//! assert_eq!(controller.next_frame(generation), FrameStep::Produce(0));
//! assert_eq!(controller.next_frame(generation), FrameStep::Wait);
//! assert_eq!(
//!     controller.notify_flow_event(FileId(0), 0),
//!     FlowOutcome::Resume { file_id: FileId(0), generation }
//! );
//! assert_eq!(controller.next_frame(generation), FrameStep::Produce(1));
//! ```

mod controller;
mod settings;
mod state;

pub use controller::AnimationController;
pub use settings::{AnimationError, AnimationSettings};
pub use state::{AnimationSnapshot, AnimationState, CancelReason, FlowOutcome, FrameStep};
