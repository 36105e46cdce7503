//! Mock render service for testing.
//!
//! Provides a scripted implementation of the [`RenderService`] trait so
//! controller behaviour can be exercised without a real render backend.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;

use reel_core::RenderRequest;

use crate::error::{ServiceError, ServiceResult};
use crate::service::{JobHandle, ProgressReport, RenderService};

/// Scripted answer to one status check.
#[derive(Debug, Clone)]
pub enum MockCheck {
    /// Answer immediately with a report
    Report(ProgressReport),
    /// Fail at the transport level
    Unreachable(String),
    /// Answer after a delay
    Delayed(Duration, ProgressReport),
}

impl MockCheck {
    pub fn progress(progress: f64) -> Self {
        Self::Report(ProgressReport::Progress { progress })
    }

    pub fn done(url: impl Into<String>, size_bytes: u64) -> Self {
        Self::Report(ProgressReport::Done {
            url: url.into(),
            size_bytes,
        })
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::Report(ProgressReport::Error {
            message: message.into(),
        })
    }

    pub fn unreachable() -> Self {
        Self::Unreachable("Failed to fetch".to_string())
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub job_id: Option<String>,
    pub code: Option<String>,
}

/// Mock render service.
///
/// Status checks consume the script in order; once the script runs out
/// the last entry repeats, which models a job that never finishes.
#[derive(Clone)]
pub struct MockRenderService {
    /// Outcome of `submit`.
    submission: Arc<RwLock<Result<JobHandle, String>>>,
    /// Whether a submission failure is a transport failure.
    submission_unreachable: Arc<RwLock<bool>>,
    /// Scripted status checks.
    checks: Arc<RwLock<Vec<MockCheck>>>,
    /// Index of the next check to return.
    check_index: Arc<AtomicUsize>,
    /// Captured calls for verification.
    captured_calls: Arc<RwLock<Vec<CapturedCall>>>,
}

impl Default for MockRenderService {
    fn default() -> Self {
        Self::new()
    }
}

impl MockRenderService {
    /// Create a mock that accepts every job as `mock-job` in `mock-bucket`.
    pub fn new() -> Self {
        Self {
            submission: Arc::new(RwLock::new(Ok(JobHandle::new("mock-job", "mock-bucket")))),
            submission_unreachable: Arc::new(RwLock::new(false)),
            checks: Arc::new(RwLock::new(Vec::new())),
            check_index: Arc::new(AtomicUsize::new(0)),
            captured_calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Set the handle returned on submission.
    pub fn accept_as(self, handle: JobHandle) -> Self {
        *self.submission.write() = Ok(handle);
        self
    }

    /// Make submission fail with a service-reported message.
    pub fn reject_submission(self, message: impl Into<String>) -> Self {
        *self.submission.write() = Err(message.into());
        *self.submission_unreachable.write() = false;
        self
    }

    /// Make submission fail at the transport level.
    pub fn unreachable_submission(self) -> Self {
        *self.submission.write() = Err("Failed to fetch".to_string());
        *self.submission_unreachable.write() = true;
        self
    }

    /// Add a scripted status check.
    pub fn add_check(self, check: MockCheck) -> Self {
        self.checks.write().push(check);
        self
    }

    /// Replace the status check script.
    pub fn with_checks(self, checks: Vec<MockCheck>) -> Self {
        *self.checks.write() = checks;
        self
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.captured_calls.read().clone()
    }

    /// Number of calls to a specific method.
    pub fn call_count(&self, method: &str) -> usize {
        self.captured_calls
            .read()
            .iter()
            .filter(|c| c.method == method)
            .count()
    }

    fn record_call(&self, call: CapturedCall) {
        self.captured_calls.write().push(call);
    }

    fn next_check(&self) -> MockCheck {
        let checks = self.checks.read();
        if checks.is_empty() {
            return MockCheck::progress(0.0);
        }
        let index = self.check_index.fetch_add(1, Ordering::SeqCst);
        checks
            .get(index.min(checks.len() - 1))
            .cloned()
            .unwrap_or_else(|| MockCheck::progress(0.0))
    }
}

#[async_trait]
impl RenderService for MockRenderService {
    async fn submit(&self, request: &RenderRequest) -> ServiceResult<JobHandle> {
        self.record_call(CapturedCall {
            method: "submit".to_string(),
            job_id: None,
            code: Some(request.input_props.code.clone()),
        });

        let outcome = self.submission.read().clone();
        match outcome {
            Ok(handle) => Ok(handle),
            Err(message) if *self.submission_unreachable.read() => {
                Err(ServiceError::Unreachable(message))
            }
            Err(message) => Err(ServiceError::Rejected(message)),
        }
    }

    async fn check(&self, handle: &JobHandle) -> ServiceResult<ProgressReport> {
        self.record_call(CapturedCall {
            method: "check".to_string(),
            job_id: Some(handle.job_id.clone()),
            code: None,
        });

        match self.next_check() {
            MockCheck::Report(report) => Ok(report),
            MockCheck::Unreachable(message) => Err(ServiceError::Unreachable(message)),
            MockCheck::Delayed(delay, report) => {
                tokio::time::sleep(delay).await;
                Ok(report)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_core::CompositionProps;

    fn request() -> RenderRequest {
        RenderRequest::new(CompositionProps::new("export const Comp = () => null;", 150, 30))
    }

    #[tokio::test]
    async fn test_mock_service_scripted_checks() {
        let service = MockRenderService::new().with_checks(vec![
            MockCheck::progress(0.5),
            MockCheck::done("https://cdn/video.mp4", 42),
        ]);

        let handle = service.submit(&request()).await.unwrap();
        assert_eq!(handle.job_id, "mock-job");

        let first = service.check(&handle).await.unwrap();
        assert_eq!(first, ProgressReport::Progress { progress: 0.5 });

        let second = service.check(&handle).await.unwrap();
        assert!(matches!(second, ProgressReport::Done { size_bytes: 42, .. }));

        // Script exhausted: the last answer repeats.
        let third = service.check(&handle).await.unwrap();
        assert!(matches!(third, ProgressReport::Done { .. }));
    }

    #[tokio::test]
    async fn test_mock_service_captures_calls() {
        let service = MockRenderService::new();
        let handle = service.submit(&request()).await.unwrap();
        let _ = service.check(&handle).await;

        assert_eq!(service.call_count("submit"), 1);
        assert_eq!(service.call_count("check"), 1);
        let calls = service.get_calls();
        assert_eq!(calls[1].job_id.as_deref(), Some("mock-job"));
    }

    #[tokio::test]
    async fn test_mock_service_submission_failures() {
        let rejected = MockRenderService::new().reject_submission("quota exceeded");
        let err = rejected.submit(&request()).await.unwrap_err();
        assert!(matches!(err, ServiceError::Rejected(_)));
        assert!(!err.is_unreachable());

        let unreachable = MockRenderService::new().unreachable_submission();
        let err = unreachable.submit(&request()).await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
