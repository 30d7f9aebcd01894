/// The default maximum payload size accepted for a single frame, 1 MiB.
///
/// Frames declaring a larger payload are answered with close code 1009
/// before any payload byte is read.
pub const MAX_FRAME_SIZE: usize = 1024 * 1024;

/// The default upper bound for the opening handshake request, 1 KiB.
///
/// The negotiator performs a single bounded read; a client sending a
/// longer request is outside the contract this server supports.
pub const MAX_HANDSHAKE_BYTES: usize = 1024;

/// Tunable protocol limits for a listener and its connections.
///
/// ```
/// use sensorlink::Options;
///
/// let options = Options::default()
///     .with_max_frame_size(64 * 1024)
///     .with_max_handshake_bytes(2048);
/// assert_eq!(options.max_frame_size, 64 * 1024);
/// ```
#[derive(Debug, Clone)]
pub struct Options {
    /// Maximum accepted payload length per incoming frame.
    pub max_frame_size: usize,
    /// Maximum size of the opening handshake request.
    pub max_handshake_bytes: usize,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            max_frame_size: MAX_FRAME_SIZE,
            max_handshake_bytes: MAX_HANDSHAKE_BYTES,
        }
    }
}

impl Options {
    /// Sets the maximum accepted frame payload size.
    pub fn with_max_frame_size(mut self, max_frame_size: usize) -> Self {
        self.max_frame_size = max_frame_size;
        self
    }

    /// Sets the maximum size of the opening handshake request.
    pub fn with_max_handshake_bytes(mut self, max_handshake_bytes: usize) -> Self {
        self.max_handshake_bytes = max_handshake_bytes;
        self
    }
}
