//! 비동기 단일 작업 핸들

use tokio::task::{JoinError, JoinHandle};

use crate::tool::error::DataError;

use super::operation::OperationData;

/// `submit`으로 시작된 작업의 핸들
///
/// 핸들을 버려도 작업은 끝까지 실행됩니다.
pub struct JobHandle {
    handle: JoinHandle<Result<OperationData, DataError>>,
}

impl JobHandle {
    pub(crate) fn new(handle: JoinHandle<Result<OperationData, DataError>>) -> Self {
        Self { handle }
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// 작업 완료를 기다립니다.
    pub async fn wait(self) -> Result<OperationData, DataError> {
        match self.handle.await {
            Ok(result) => result,
            Err(e) => Err(join_error(e)),
        }
    }
}

/// 작업 task가 panic 또는 취소로 끝난 경우의 에러
pub(crate) fn join_error(error: JoinError) -> DataError {
    if error.is_panic() {
        let payload = error.into_panic();
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".to_string());
        DataError::Internal(format!("operation panicked: {message}"))
    } else {
        DataError::Internal("operation was cancelled".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_wait_returns_task_result() {
        let job = JobHandle::new(tokio::spawn(async { Ok(OperationData::Count(7)) }));
        assert_eq!(job.wait().await.unwrap(), OperationData::Count(7));
    }

    #[tokio::test]
    async fn test_panics_become_internal_errors() {
        let job = JobHandle::new(tokio::spawn(async {
            if true {
                panic!("boom");
            }
            Ok(OperationData::Count(0))
        }));
        match job.wait().await {
            Err(DataError::Internal(message)) => assert!(message.contains("boom")),
            other => panic!("unexpected result {other:?}"),
        }
    }
}
