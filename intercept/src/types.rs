use std::fmt;

/// Why a slot patch (or its preparation) failed.
///
/// Patch failures are per-slot and never fatal for the layer: the caller
/// drops the capture feature for that one entry point and moves on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchError {
    /// The importing module has no IAT slot for the requested symbol.
    SlotNotFound,
    /// The page containing the slot could not be made writable.
    ProtectFailed,
    /// The previous protection could not be restored after the write.
    RestoreFailed,
    /// Slot patching is not supported on this platform.
    Unsupported,
}

impl fmt::Display for PatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            PatchError::SlotNotFound => "import slot not found",
            PatchError::ProtectFailed => "could not make slot writable",
            PatchError::RestoreFailed => "could not restore slot protection",
            PatchError::Unsupported => "slot patching unsupported on this platform",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for PatchError {}
