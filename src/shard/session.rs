//! Per-shard session bookkeeping used for resumption.

/// Session context carried across reconnects of one shard.
#[derive(Clone, Debug, Default)]
pub struct SessionContext {
    /// Opaque session identifier assigned by the remote at READY.
    pub session_id: Option<String>,
    /// Last sequence number received; echoed in heartbeats and resumes.
    pub last_sequence: u64,
    /// Endpoint override supplied at READY for resuming reconnects.
    pub resume_url: Option<String>,
    /// Reconnect attempts made since the last successful session.
    pub reconnect_tries: u32,
    /// Whether the next connect should resume rather than identify.
    pub resuming: bool,
}

impl SessionContext {
    /// Whether enough context exists to attempt a resume.
    #[must_use]
    pub fn can_resume(&self) -> bool { self.resuming && self.session_id.is_some() }

    /// Record a successful session establishment.
    pub fn established(&mut self, session_id: String, resume_url: String) {
        self.session_id = Some(session_id);
        self.resume_url = (!resume_url.is_empty()).then_some(resume_url);
        self.reconnect_tries = 0;
        self.resuming = false;
    }
}
