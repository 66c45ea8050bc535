//! Playback parameters and their validation.

use thiserror::Error;

use crate::request::StartAnimation;

/// Errors returned by the animation controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AnimationError {
    /// The frame range is empty.
    #[error("invalid frame range [{first}, {last})")]
    InvalidRange { first: i32, last: i32 },

    /// A step of zero would never advance.
    #[error("animation step must not be zero")]
    ZeroStep,

    /// A flow window of zero would never produce a frame.
    #[error("flow window must be at least 1")]
    ZeroFlowWindow,

    /// The operation needs a running playback.
    #[error("no animation is playing")]
    NotRunning,
}

/// Validated playback configuration.
///
/// The range is half-open: `first_frame` is played, `last_frame` is not.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnimationSettings {
    pub first_frame: i32,
    pub last_frame: i32,
    pub start_frame: i32,
    pub step: i32,
    pub flow_window: u32,
    pub looping: bool,
}

impl AnimationSettings {
    /// Build settings for a forward, non-looping playback of `[first, last)`.
    pub fn new(first_frame: i32, last_frame: i32) -> Self {
        Self {
            first_frame,
            last_frame,
            start_frame: first_frame,
            step: 1,
            flow_window: 1,
            looping: false,
        }
    }

    /// Build settings from a start request, using `default_window` when the
    /// request does not carry its own flow window.
    pub fn from_request(request: &StartAnimation, default_window: u32) -> Self {
        Self {
            first_frame: request.first_frame,
            last_frame: request.last_frame,
            start_frame: request.start_frame,
            step: request.step,
            flow_window: request.flow_window.unwrap_or(default_window),
            looping: request.looping,
        }
    }

    /// Set the frame playback starts from.
    pub fn with_start_frame(mut self, frame: i32) -> Self {
        self.start_frame = frame;
        self
    }

    /// Set the frame increment.
    pub fn with_step(mut self, step: i32) -> Self {
        self.step = step;
        self
    }

    /// Set the number of unacknowledged frames allowed in flight.
    pub fn with_flow_window(mut self, window: u32) -> Self {
        self.flow_window = window;
        self
    }

    /// Wrap around at the range boundary instead of finishing.
    pub fn with_looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    /// Check the settings can drive a playback.
    pub fn validate(&self) -> Result<(), AnimationError> {
        if self.first_frame >= self.last_frame {
            return Err(AnimationError::InvalidRange {
                first: self.first_frame,
                last: self.last_frame,
            });
        }
        if self.step == 0 {
            return Err(AnimationError::ZeroStep);
        }
        if self.flow_window == 0 {
            return Err(AnimationError::ZeroFlowWindow);
        }
        Ok(())
    }

    /// Clamp `frame` into the playable range.
    pub fn clamp(&self, frame: i32) -> i32 {
        frame.clamp(self.first_frame, self.last_frame - 1)
    }

    /// Whether `frame` lies inside the range.
    pub fn contains(&self, frame: i32) -> bool {
        (self.first_frame..self.last_frame).contains(&frame)
    }

    /// Frame after `frame`, or `None` when the range is exhausted.
    ///
    /// Looping playback wraps to the boundary the step is moving away from.
    pub fn advance(&self, frame: i32) -> Option<i32> {
        let next = frame.saturating_add(self.step);
        if self.contains(next) {
            Some(next)
        } else if self.looping {
            Some(if self.step > 0 {
                self.first_frame
            } else {
                self.last_frame - 1
            })
        } else {
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(AnimationSettings::new(0, 10).validate().is_ok());
        assert_eq!(
            AnimationSettings::new(5, 5).validate(),
            Err(AnimationError::InvalidRange { first: 5, last: 5 })
        );
        assert_eq!(
            AnimationSettings::new(0, 10).with_step(0).validate(),
            Err(AnimationError::ZeroStep)
        );
        assert_eq!(
            AnimationSettings::new(0, 10).with_flow_window(0).validate(),
            Err(AnimationError::ZeroFlowWindow)
        );
    }

    #[test]
    fn test_clamp_to_range() {
        let settings = AnimationSettings::new(2, 8);
        assert_eq!(settings.clamp(-4), 2);
        assert_eq!(settings.clamp(5), 5);
        assert_eq!(settings.clamp(8), 7);
        assert_eq!(settings.clamp(100), 7);
    }

    #[test]
    fn test_advance_forward_and_reverse() {
        let forward = AnimationSettings::new(0, 10).with_step(3);
        assert_eq!(forward.advance(0), Some(3));
        assert_eq!(forward.advance(9), None);

        let reverse = AnimationSettings::new(0, 10).with_step(-2);
        assert_eq!(reverse.advance(4), Some(2));
        assert_eq!(reverse.advance(1), None);
    }

    #[test]
    fn test_advance_wraps_when_looping() {
        let forward = AnimationSettings::new(0, 4).with_looping(true);
        assert_eq!(forward.advance(3), Some(0));

        let reverse = AnimationSettings::new(0, 4).with_step(-1).with_looping(true);
        assert_eq!(reverse.advance(0), Some(3));
    }

    #[test]
    fn test_from_request_uses_default_window() {
        let request = StartAnimation {
            file_id: crate::request::FileId(0),
            first_frame: 0,
            start_frame: 0,
            last_frame: 10,
            step: 1,
            flow_window: None,
            looping: false,
            request_id: 0,
        };
        assert_eq!(AnimationSettings::from_request(&request, 5).flow_window, 5);

        let request = StartAnimation {
            flow_window: Some(2),
            ..request
        };
        assert_eq!(AnimationSettings::from_request(&request, 5).flow_window, 2);
    }
}
