//! 병렬 작업 실행기
//!
//! 배치의 각 작업을 tokio task로 띄우고 즉시 반환합니다. 작업은 연결별 세마포어와
//! 전역 세마포어를 순서대로 얻은 뒤 실행되며, 결과는 결과 저장소의 슬롯에 기록됩니다.

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::service::db::core::config::ExecutorConfig;
use crate::tool::error::DataError;

use super::job::{join_error, JobHandle};
use super::operation::{BatchTicket, ItemOutcome, Operation, OperationData};
use super::result_store::ResultStore;

/// 작업 하나를 실행하는 주체 (데이터 서비스가 구현)
#[async_trait]
pub trait OperationRunner: Send + Sync + 'static {
    async fn run(&self, operation: &Operation) -> Result<OperationData, DataError>;
}

pub struct ParallelExecutor {
    global: Arc<Semaphore>,
    per_connection: DashMap<String, Arc<Semaphore>>,
    per_connection_limit: usize,
    store: Arc<ResultStore>,
    sweeper: Mutex<Option<JoinHandle<()>>>,
    config: ExecutorConfig,
}

impl ParallelExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        let worker_count = config.worker_count.max(1);
        let store = Arc::new(ResultStore::new(config.result_ttl));
        let sweeper = ResultStore::spawn_sweeper(&store, config.sweep_interval);

        info!(
            "병렬 실행기 초기화: workers={}, per_connection={}",
            worker_count, config.per_connection_limit
        );

        Self {
            global: Arc::new(Semaphore::new(worker_count)),
            per_connection: DashMap::new(),
            per_connection_limit: config.per_connection_limit.max(1),
            store,
            sweeper: Mutex::new(sweeper),
            config: config.clone(),
        }
    }

    pub fn store(&self) -> &Arc<ResultStore> {
        &self.store
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// 배치를 등록하고 모든 작업을 띄운 뒤 즉시 반환합니다.
    pub fn execute(&self, runner: Arc<dyn OperationRunner>, operations: Vec<Operation>) -> Result<BatchTicket, DataError> {
        let handle = runtime()?;
        self.ensure_sweeper(&handle);

        let total = operations.len();
        let batch_id = self.store.create(total);

        for (index, operation) in operations.into_iter().enumerate() {
            let runner = runner.clone();
            let store = self.store.clone();
            let global = self.global.clone();
            let local = self.connection_semaphore(&operation.connection);
            let batch_id = batch_id.clone();

            handle.spawn(async move {
                let result = run_guarded(runner, operation, local, global).await;
                if let Err(e) = &result {
                    e.log(&format!("batch {batch_id} item {index}"));
                }
                store.record(&batch_id, index, ItemOutcome::from_result(result));
            });
        }

        debug!("배치 {} 작업 {}개 스케줄 완료", batch_id, total);
        Ok(BatchTicket { batch_id, total })
    }

    /// 작업 하나를 띄우고 핸들을 반환합니다.
    pub fn submit(&self, runner: Arc<dyn OperationRunner>, operation: Operation) -> Result<JobHandle, DataError> {
        let handle = runtime()?;
        let global = self.global.clone();
        let local = self.connection_semaphore(&operation.connection);

        let context = format!("job {}.{}", operation.connection, operation.table);
        Ok(JobHandle::new(handle.spawn(async move {
            let result = run_guarded(runner, operation, local, global).await;
            if let Err(e) = &result {
                e.log(&context);
            }
            result
        })))
    }

    fn connection_semaphore(&self, connection: &str) -> Arc<Semaphore> {
        self.per_connection
            .entry(connection.to_string())
            .or_insert_with(|| Arc::new(Semaphore::new(self.per_connection_limit)))
            .clone()
    }

    fn ensure_sweeper(&self, handle: &Handle) {
        let mut sweeper = self.sweeper.lock();
        if sweeper.is_none() {
            let _guard = handle.enter();
            *sweeper = ResultStore::spawn_sweeper(&self.store, self.config.sweep_interval);
        }
    }
}

impl Drop for ParallelExecutor {
    fn drop(&mut self) {
        if let Some(handle) = self.sweeper.lock().take() {
            handle.abort();
        }
    }
}

fn runtime() -> Result<Handle, DataError> {
    Handle::try_current().map_err(|_| DataError::Internal("parallel execution requires a tokio runtime".to_string()))
}

/// 세마포어를 얻은 뒤 별도 task에서 실행합니다. panic은 에러로 바뀝니다.
async fn run_guarded(
    runner: Arc<dyn OperationRunner>,
    operation: Operation,
    local: Arc<Semaphore>,
    global: Arc<Semaphore>,
) -> Result<OperationData, DataError> {
    let closed = |_| DataError::Internal("executor is shutting down".to_string());
    let _local = local.acquire_owned().await.map_err(closed)?;
    let _global = global.acquire_owned().await.map_err(closed)?;

    let task = tokio::spawn(async move { runner.run(&operation).await });
    match task.await {
        Ok(result) => result,
        Err(e) => Err(join_error(e)),
    }
}
