//! Render service trait and wire types.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use reel_core::RenderRequest;

use crate::error::ServiceResult;

/// Identifiers returned by the service for an accepted job.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JobHandle {
    /// Job identifier assigned by the service
    #[serde(rename = "renderId")]
    pub job_id: String,
    /// Storage location the artifact is written to
    #[serde(rename = "bucketName")]
    pub bucket_ref: String,
}

impl JobHandle {
    pub fn new(job_id: impl Into<String>, bucket_ref: impl Into<String>) -> Self {
        Self {
            job_id: job_id.into(),
            bucket_ref: bucket_ref.into(),
        }
    }
}

/// One status-check answer from the service.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ProgressReport {
    /// Still rendering; fraction complete in `[0, 1]`
    Progress { progress: f64 },
    /// Finished; artifact location and size
    Done {
        url: String,
        #[serde(rename = "size")]
        size_bytes: u64,
    },
    /// The service gave up on the job
    Error { message: String },
}

/// Remote compute service that renders compositions.
#[async_trait]
pub trait RenderService: Send + Sync {
    /// Submit a job. Returns the identifiers used for status checks.
    async fn submit(&self, request: &RenderRequest) -> ServiceResult<JobHandle>;

    /// Query the status of a previously submitted job.
    async fn check(&self, handle: &JobHandle) -> ServiceResult<ProgressReport>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_progress_report_wire_format() {
        let progress: ProgressReport =
            serde_json::from_str(r#"{"type":"progress","progress":0.25}"#).unwrap();
        assert_eq!(progress, ProgressReport::Progress { progress: 0.25 });

        let done: ProgressReport =
            serde_json::from_str(r#"{"type":"done","url":"https://cdn/v.mp4","size":1048576}"#)
                .unwrap();
        assert_eq!(
            done,
            ProgressReport::Done {
                url: "https://cdn/v.mp4".to_string(),
                size_bytes: 1_048_576,
            }
        );

        let error: ProgressReport =
            serde_json::from_str(r#"{"type":"error","message":"out of memory"}"#).unwrap();
        assert_eq!(
            error,
            ProgressReport::Error {
                message: "out of memory".to_string()
            }
        );
    }

    #[test]
    fn test_job_handle_wire_names() {
        let handle: JobHandle =
            serde_json::from_str(r#"{"renderId":"r-1","bucketName":"renders-eu"}"#).unwrap();
        assert_eq!(handle, JobHandle::new("r-1", "renders-eu"));
    }
}
