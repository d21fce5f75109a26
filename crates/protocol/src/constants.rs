//! Header names and media types for the chunk-transfer protocol.

/// Request and response header carrying a byte offset.
///
/// On a chunk PATCH this is the offset the body starts at; the server
/// echoes the new durable offset back in its response. On a HEAD probe
/// the server reports how many bytes it has durably stored.
pub const OFFSET_HEADER: &str = "Upload-Offset";

/// Header carrying the total upload length on chunk requests.
pub const LENGTH_HEADER: &str = "Upload-Length";

/// Header carrying the hex SHA-256 checksum of a chunk body.
///
/// Advisory: servers that do not verify checksums ignore it.
pub const CHECKSUM_HEADER: &str = "Upload-Checksum";

/// Content type for raw chunk bodies.
pub const CHUNK_CONTENT_TYPE: &str = "application/offset+octet-stream";
