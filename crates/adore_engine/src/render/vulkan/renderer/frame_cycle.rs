//! Call-order state machine for the frame loop
//!
//! `Idle -> Begun -> Recording* -> Ended -> Idle`. The frame slot advances by
//! one, modulo the number of frames in flight, each time a frame completes.

use crate::render::vulkan::{VulkanError, VulkanResult};

/// Where the renderer is inside a frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame open
    Idle,
    /// `begin` succeeded, nothing drawn yet
    Begun,
    /// At least one draw recorded
    Recording,
    /// Command buffer closed, waiting for submit and present
    Ended,
}

/// Frame-order bookkeeping, independent of the GPU
#[derive(Debug, Clone)]
pub struct FrameCycle {
    state: FrameState,
    current_frame: usize,
    frames_in_flight: usize,
    completed: u64,
}

impl FrameCycle {
    /// A cycle over `frames_in_flight` slots, starting at slot 0
    pub fn new(frames_in_flight: usize) -> Self {
        Self {
            state: FrameState::Idle,
            current_frame: 0,
            frames_in_flight: frames_in_flight.max(1),
            completed: 0,
        }
    }

    /// Open a frame; fails if one is already open
    pub fn begin(&mut self) -> VulkanResult<usize> {
        match self.state {
            FrameState::Idle => {
                self.state = FrameState::Begun;
                Ok(self.current_frame)
            }
            _ => Err(VulkanError::invalid_operation(
                "begin called while a frame is already open; call end first",
            )),
        }
    }

    /// Check that commands may be recorded into the open frame
    pub fn ensure_open(&self, operation: &str) -> VulkanResult<()> {
        match self.state {
            FrameState::Begun | FrameState::Recording => Ok(()),
            _ => Err(VulkanError::invalid_operation(format!(
                "{operation} called outside a begin/end bracket"
            ))),
        }
    }

    /// Record a draw
    pub fn record(&mut self, operation: &str) -> VulkanResult<()> {
        self.ensure_open(operation)?;
        self.state = FrameState::Recording;
        Ok(())
    }

    /// Close the frame's command stream
    pub fn end(&mut self) -> VulkanResult<usize> {
        self.ensure_open("end")?;
        self.state = FrameState::Ended;
        Ok(self.current_frame)
    }

    /// Finish the frame after submission and advance the slot
    pub fn advance(&mut self) {
        self.state = FrameState::Idle;
        self.current_frame = (self.current_frame + 1) % self.frames_in_flight;
        self.completed += 1;
    }

    /// Drop back to idle without advancing, after a failed frame
    pub fn abort(&mut self) {
        self.state = FrameState::Idle;
    }

    /// Current state
    pub const fn state(&self) -> FrameState {
        self.state
    }

    /// Slot the next or open frame uses
    pub const fn current_frame(&self) -> usize {
        self.current_frame
    }

    /// Number of slots
    pub const fn frames_in_flight(&self) -> usize {
        self.frames_in_flight
    }

    /// Frames completed so far
    pub const fn completed(&self) -> u64 {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_frame(cycle: &mut FrameCycle) {
        cycle.begin().unwrap();
        cycle.record("draw").unwrap();
        cycle.end().unwrap();
        cycle.advance();
    }

    #[test]
    fn test_full_frame_advances_slot() {
        let mut cycle = FrameCycle::new(2);
        assert_eq!(cycle.begin().unwrap(), 0);
        assert_eq!(cycle.state(), FrameState::Begun);
        cycle.record("draw").unwrap();
        assert_eq!(cycle.state(), FrameState::Recording);
        assert_eq!(cycle.end().unwrap(), 0);
        assert_eq!(cycle.state(), FrameState::Ended);
        cycle.advance();
        assert_eq!(cycle.state(), FrameState::Idle);
        assert_eq!(cycle.current_frame(), 1);
        assert_eq!(cycle.completed(), 1);
    }

    #[test]
    fn test_slot_wraps_modulo_frames_in_flight() {
        for frames in 1..=4 {
            let mut cycle = FrameCycle::new(frames);
            for n in 1..=10 {
                run_frame(&mut cycle);
                assert_eq!(cycle.current_frame(), n % frames);
                assert!(cycle.current_frame() < frames);
            }
        }
    }

    #[test]
    fn test_draw_before_begin_is_usage_error() {
        let mut cycle = FrameCycle::new(2);
        let err = cycle.record("draw").unwrap_err();
        assert!(err.is_usage());
        assert_eq!(cycle.state(), FrameState::Idle);
    }

    #[test]
    fn test_double_begin_is_usage_error() {
        let mut cycle = FrameCycle::new(2);
        cycle.begin().unwrap();
        assert!(cycle.begin().unwrap_err().is_usage());
        assert_eq!(cycle.state(), FrameState::Begun);
        assert_eq!(cycle.current_frame(), 0);
    }

    #[test]
    fn test_end_without_begin_is_usage_error() {
        let mut cycle = FrameCycle::new(2);
        assert!(cycle.end().unwrap_err().is_usage());
    }

    #[test]
    fn test_draw_after_end_is_usage_error() {
        let mut cycle = FrameCycle::new(2);
        cycle.begin().unwrap();
        cycle.end().unwrap();
        assert!(cycle.record("draw").is_err());
        assert!(cycle.ensure_open("bind").is_err());
    }

    #[test]
    fn test_abort_keeps_slot() {
        let mut cycle = FrameCycle::new(3);
        run_frame(&mut cycle);
        cycle.begin().unwrap();
        cycle.abort();
        assert_eq!(cycle.state(), FrameState::Idle);
        assert_eq!(cycle.current_frame(), 1);
        assert_eq!(cycle.completed(), 1);
    }

    #[test]
    fn test_zero_frames_clamps_to_one() {
        let cycle = FrameCycle::new(0);
        assert_eq!(cycle.frames_in_flight(), 1);
    }
}
