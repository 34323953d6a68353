//! 배치 결과 저장소
//!
//! 배치마다 슬롯 벡터와 남은 작업 수를 보관합니다. 만료된 배치는 조회 시점과
//! 주기적인 정리 작업에서 제거됩니다.

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};
use uuid::Uuid;

use crate::tool::error::DataError;

use super::operation::{BatchResult, BatchStatus, ItemOutcome};

const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

struct BatchEntry {
    created_at: DateTime<Utc>,
    expires_at: Instant,
    slots: RwLock<Vec<Option<ItemOutcome>>>,
    remaining: AtomicUsize,
}

impl BatchEntry {
    fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }

    fn snapshot(&self, batch_id: &str) -> BatchResult {
        let slots = self.slots.read();
        let items: BTreeMap<usize, ItemOutcome> = slots
            .iter()
            .enumerate()
            .filter_map(|(index, slot)| slot.clone().map(|outcome| (index, outcome)))
            .collect();

        let total = slots.len();
        let completed = items.len();
        BatchResult {
            batch_id: batch_id.to_string(),
            status: if completed == total {
                BatchStatus::Complete
            } else {
                BatchStatus::Pending
            },
            total,
            completed,
            created_at: self.created_at,
            items,
        }
    }
}

/// 배치 결과 저장소
pub struct ResultStore {
    batches: DashMap<String, Arc<BatchEntry>>,
    ttl: Duration,
}

impl ResultStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            batches: DashMap::new(),
            ttl,
        }
    }

    /// 주기적으로 만료된 배치를 제거하는 작업을 시작합니다.
    ///
    /// 저장소가 drop되면 작업도 종료됩니다. 런타임 밖에서는 시작하지 않습니다.
    pub fn spawn_sweeper(store: &Arc<ResultStore>, interval: Duration) -> Option<JoinHandle<()>> {
        let handle = Handle::try_current().ok()?;
        let weak: Weak<ResultStore> = Arc::downgrade(store);
        let interval = interval.max(MIN_SWEEP_INTERVAL);

        Some(handle.spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;

            loop {
                ticker.tick().await;
                let Some(store) = weak.upgrade() else {
                    debug!("결과 저장소 정리 작업 종료");
                    break;
                };
                let removed = store.sweep();
                if removed > 0 {
                    debug!("만료된 배치 {}개 정리", removed);
                }
            }
        }))
    }

    /// 새 배치를 `pending` 상태로 등록하고 ID를 반환합니다.
    pub fn create(&self, total: usize) -> String {
        let batch_id = Uuid::new_v4().to_string();
        let entry = BatchEntry {
            created_at: Utc::now(),
            expires_at: Instant::now() + self.ttl,
            slots: RwLock::new(vec![None; total]),
            remaining: AtomicUsize::new(total),
        };
        self.batches.insert(batch_id.clone(), Arc::new(entry));
        info!("배치 생성: {} ({}개 작업)", batch_id, total);
        batch_id
    }

    /// 슬롯에 결과를 기록합니다. 마지막 슬롯이 채워지면 `true`를 반환합니다.
    ///
    /// 이미 만료되었거나 소비된 배치의 결과는 버려집니다.
    pub fn record(&self, batch_id: &str, index: usize, outcome: ItemOutcome) -> bool {
        let Some(entry) = self.batches.get(batch_id).map(|entry| entry.clone()) else {
            debug!("사라진 배치의 결과 폐기: {}[{}]", batch_id, index);
            return false;
        };

        let mut slots = entry.slots.write();
        let Some(slot) = slots.get_mut(index) else {
            return false;
        };
        if slot.is_some() {
            return false;
        }
        *slot = Some(outcome);

        let finished = entry.remaining.fetch_sub(1, Ordering::AcqRel) == 1;
        if finished {
            info!("배치 완료: {}", batch_id);
        }
        finished
    }

    /// 현재 상태의 스냅샷을 반환합니다. 배치는 유지됩니다.
    pub fn get(&self, batch_id: &str) -> Result<BatchResult, DataError> {
        let entry = self.live_entry(batch_id)?;
        Ok(entry.snapshot(batch_id))
    }

    /// 스냅샷을 반환하고 배치를 제거합니다.
    pub fn consume(&self, batch_id: &str) -> Result<BatchResult, DataError> {
        let entry = self.live_entry(batch_id)?;
        self.batches.remove(batch_id);
        Ok(entry.snapshot(batch_id))
    }

    /// 만료된 배치를 제거하고 제거한 개수를 반환합니다.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let before = self.batches.len();
        self.batches.retain(|_, entry| !entry.is_expired(now));
        before.saturating_sub(self.batches.len())
    }

    pub fn len(&self) -> usize {
        self.batches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.batches.is_empty()
    }

    fn live_entry(&self, batch_id: &str) -> Result<Arc<BatchEntry>, DataError> {
        let entry = self
            .batches
            .get(batch_id)
            .map(|entry| entry.clone())
            .ok_or_else(|| DataError::BatchNotFound(batch_id.to_string()))?;

        if entry.is_expired(Instant::now()) {
            self.batches.remove(batch_id);
            debug!("만료된 배치 조회: {}", batch_id);
            return Err(DataError::BatchNotFound(batch_id.to_string()));
        }
        Ok(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::parallel::operation::OperationData;

    fn success(count: i64) -> ItemOutcome {
        ItemOutcome::from_result(Ok(OperationData::Count(count)))
    }

    #[test]
    fn test_batch_lifecycle() {
        let store = ResultStore::new(Duration::from_secs(60));
        let id = store.create(2);

        let pending = store.get(&id).unwrap();
        assert_eq!(pending.status, BatchStatus::Pending);
        assert_eq!(pending.completed, 0);
        assert!(pending.items.is_empty());

        assert!(!store.record(&id, 1, success(1)));
        assert!(!store.record(&id, 1, success(9)));
        assert!(store.record(&id, 0, success(0)));

        let complete = store.get(&id).unwrap();
        assert!(complete.is_complete());
        assert_eq!(complete.items[&1], success(1));

        assert_eq!(store.consume(&id).unwrap().total, 2);
        assert!(matches!(store.get(&id), Err(DataError::BatchNotFound(_))));
    }

    #[test]
    fn test_empty_batch_is_complete() {
        let store = ResultStore::new(Duration::from_secs(60));
        let id = store.create(0);
        assert!(store.get(&id).unwrap().is_complete());
    }

    #[test]
    fn test_unknown_batch() {
        let store = ResultStore::new(Duration::from_secs(60));
        assert!(matches!(store.get("nope"), Err(DataError::BatchNotFound(_))));
        assert!(!store.record("nope", 0, success(0)));
    }

    #[test]
    fn test_concurrent_records_are_not_lost() {
        let store = Arc::new(ResultStore::new(Duration::from_secs(60)));
        let id = store.create(64);

        let handles: Vec<_> = (0..64)
            .map(|index| {
                let store = store.clone();
                let id = id.clone();
                std::thread::spawn(move || store.record(&id, index, success(index as i64)))
            })
            .collect();
        let finished = handles.into_iter().map(|h| h.join().unwrap()).filter(|done| *done).count();

        assert_eq!(finished, 1);
        let result = store.get(&id).unwrap();
        assert_eq!(result.completed, 64);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_expired_batches_are_removed() {
        let store = Arc::new(ResultStore::new(Duration::from_millis(20)));
        let lazy = store.create(1);
        let swept = store.create(1);
        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(matches!(store.get(&lazy), Err(DataError::BatchNotFound(_))));
        assert_eq!(store.sweep(), 1);
        assert!(matches!(store.consume(&swept), Err(DataError::BatchNotFound(_))));
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_sweeper_stops_when_store_dropped() {
        let store = Arc::new(ResultStore::new(Duration::from_millis(5)));
        let handle = ResultStore::spawn_sweeper(&store, Duration::from_millis(10)).unwrap();
        store.create(1);

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(store.is_empty());

        drop(store);
        tokio::time::timeout(Duration::from_secs(1), handle).await.unwrap().unwrap();
    }
}
