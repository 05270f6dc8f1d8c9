//! Message types exchanged between the fetcher and the archive store.

/// One item of a FETCH response, as returned by the protocol client.
///
/// Nothing here is trusted yet: the fetcher checks the UID against the one
/// it asked for and resolves the body sections before building a
/// [`MessageRecord`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchedItem {
    /// Message sequence number within the selected mailbox.
    pub seq: u32,

    /// UID reported by the server, if the response carried one.
    pub uid: Option<u32>,

    /// `RFC822.SIZE` reported by the server.
    pub size: Option<u32>,

    /// Raw envelope subject (possibly RFC 2047 encoded).
    pub subject: Option<Vec<u8>>,

    /// Body sections in the response. A well-formed item has exactly one.
    pub body_sections: Vec<Vec<u8>>,
}

/// A verified message, ready to be written as one archive entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageRecord {
    /// UID the message was fetched by.
    pub uid: u32,

    /// Decoded subject line, if any.
    pub subject: Option<String>,

    /// `RFC822.SIZE` reported by the server.
    pub size: Option<u32>,

    /// Full message bytes, headers and body, unmodified.
    pub payload: Vec<u8>,
}

impl MessageRecord {
    /// Number of payload bytes that will be written.
    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }

    /// Whether the payload length agrees with the server-reported size.
    ///
    /// Servers are not required to send `RFC822.SIZE`; a missing size counts
    /// as agreement.
    pub fn size_matches(&self) -> bool {
        self.size.is_none_or(|size| size as usize == self.payload.len())
    }
}
