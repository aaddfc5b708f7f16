//! Attach-or-publish decision

/// Largest file the chat platform accepts as an attachment (15 MiB).
///
/// Mirrors the platform's upload ceiling; changing it requires the platform to
/// accept larger uploads first.
pub const MAX_ATTACHMENT_BYTES: u64 = 15_728_640;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    /// Upload the file with the reply
    Attach,
    /// Serve the file from an ephemeral HTTP server and reply with a link
    Publish,
}

pub fn decide(size_bytes: u64) -> Delivery {
    if size_bytes <= MAX_ATTACHMENT_BYTES {
        Delivery::Attach
    } else {
        Delivery::Publish
    }
}
