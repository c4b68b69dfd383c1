use crate::core::entities::ExtractedFrame;
use crate::core::error::{Error, Result};

/// Mutation applied to the frame list.
///
/// Frame indices are 0-based positions in extraction order, not timestamps.
#[derive(Debug, Clone)]
pub enum FrameCommand {
    ToggleSelection(usize),
    SetSelection(usize, bool),
    SetCaption(usize, String),
    SelectAll,
    DeselectAll,
}

/// Owns the extracted frame list and applies selection/caption edits.
///
/// A background job reads a snapshot via `selected_frames()` when it starts;
/// commands are only applied between jobs, so the store itself needs no
/// locking.
#[derive(Debug, Default)]
pub struct FrameStore {
    frames: Vec<ExtractedFrame>,
}

impl FrameStore {
    pub fn new(frames: Vec<ExtractedFrame>) -> Self {
        FrameStore { frames }
    }

    pub fn frames(&self) -> &[ExtractedFrame] {
        &self.frames
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn selected_count(&self) -> usize {
        self.frames.iter().filter(|f| f.selected).count()
    }

    pub fn apply(&mut self, command: FrameCommand) -> Result<()> {
        match command {
            FrameCommand::ToggleSelection(index) => {
                let frame = self.frame_mut(index)?;
                frame.selected = !frame.selected;
            }
            FrameCommand::SetSelection(index, selected) => {
                self.frame_mut(index)?.selected = selected;
            }
            FrameCommand::SetCaption(index, caption) => {
                self.frame_mut(index)?.caption = caption;
            }
            FrameCommand::SelectAll => {
                for frame in &mut self.frames {
                    frame.selected = true;
                }
            }
            FrameCommand::DeselectAll => {
                for frame in &mut self.frames {
                    frame.selected = false;
                }
            }
        }
        Ok(())
    }

    /// Selected frames in extraction order. Assembly renumbers this list
    /// 1..K, so output numbering follows the video timeline regardless of
    /// the order frames were toggled.
    pub fn selected_frames(&self) -> Vec<ExtractedFrame> {
        self.frames.iter().filter(|f| f.selected).cloned().collect()
    }

    fn frame_mut(&mut self, index: usize) -> Result<&mut ExtractedFrame> {
        let count = self.frames.len();
        self.frames.get_mut(index).ok_or_else(|| {
            Error::InvalidArgument(format!("frame index {index} out of range (0..{count})"))
        })
    }
}
