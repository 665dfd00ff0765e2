//! File selection prompt abstraction.

use std::path::PathBuf;

/// Presents a file-selection prompt to the user.
///
/// Blocks until the user picks a file or cancels.
pub trait FilePicker {
    /// `None` means the user cancelled.
    fn pick_file(&self) -> Option<PathBuf>;
}

/// Picker answering with a path decided in advance (e.g., a command-line argument).
#[derive(Debug, Clone, Default)]
pub struct PresetPicker {
    path: Option<PathBuf>,
}

impl PresetPicker {
    pub fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }

    /// A picker that always cancels.
    pub fn cancelled() -> Self {
        Self { path: None }
    }
}

impl FilePicker for PresetPicker {
    fn pick_file(&self) -> Option<PathBuf> {
        self.path.clone()
    }
}
