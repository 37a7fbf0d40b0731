use async_trait::async_trait;
use sha2::{Digest, Sha256};
use ulid::Ulid;

use crate::model::Span;

#[derive(Debug, thiserror::Error)]
pub enum MeetingError {
    #[error("meeting provider unavailable: {0}")]
    Unavailable(String),
    #[error("meeting provider rejected the request: {0}")]
    Rejected(String),
}

/// What a provider needs to open a room for a lesson.
#[derive(Debug, Clone)]
pub struct MeetingRequest {
    pub booking_id: Ulid,
    pub teacher_id: Ulid,
    pub span: Span,
    pub teacher_name: Option<String>,
    pub teacher_email: String,
    pub student_name: Option<String>,
    pub student_email: String,
}

#[async_trait]
pub trait MeetingLinkGenerator: Send + Sync {
    async fn generate(&self, request: &MeetingRequest) -> Result<String, MeetingError>;
}

/// Deterministic links under a base URL; the room code is derived from the
/// booking id so retries yield the same link.
pub struct MockMeetingLinks {
    base_url: String,
}

impl MockMeetingLinks {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    fn room_code(booking_id: &Ulid) -> String {
        let digest = Sha256::digest(booking_id.to_string().as_bytes());
        let hex = format!("{digest:x}");
        format!("{}-{}-{}", &hex[0..3], &hex[3..7], &hex[7..10])
    }
}

#[async_trait]
impl MeetingLinkGenerator for MockMeetingLinks {
    async fn generate(&self, request: &MeetingRequest) -> Result<String, MeetingError> {
        if request.span.start >= request.span.end {
            return Err(MeetingError::Rejected("empty lesson".into()));
        }
        Ok(format!(
            "{}/{}",
            self.base_url,
            Self::room_code(&request.booking_id)
        ))
    }
}

/// Always fails. Used to exercise the "booking without a link" path.
pub struct UnavailableMeetingLinks;

#[async_trait]
impl MeetingLinkGenerator for UnavailableMeetingLinks {
    async fn generate(&self, _request: &MeetingRequest) -> Result<String, MeetingError> {
        Err(MeetingError::Unavailable("no provider configured".into()))
    }
}
