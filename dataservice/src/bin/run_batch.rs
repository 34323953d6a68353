//! 배치 실행 스크립트
//!
//! JSON 배열 파일의 작업들을 병렬로 실행하고 결과를 JSON으로 출력합니다.
//!
//! ```text
//! run_batch <operations.json> [poll_ms]
//! ```

use anyhow::{bail, Context, Result};
use dataservice::logging::init_tracing;
use dataservice::service::parallel::load_operations_file;
use dataservice::DataService;
use std::env;
use std::time::Duration;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing("info");

    let mut args = env::args().skip(1);
    let Some(path) = args.next() else {
        bail!("usage: run_batch <operations.json> [poll_ms]");
    };
    let poll = match args.next() {
        Some(ms) => Duration::from_millis(ms.parse().context("poll_ms must be a number")?),
        None => Duration::from_millis(200),
    };

    let service = DataService::from_env().context("데이터 서비스 초기화 실패")?;
    let operations = load_operations_file(&path)?;
    info!("📋 {}개 작업 로드: {}", operations.len(), path);

    let ticket = service.parallel_execute(operations)?;
    info!("🚀 배치 시작: {} ({}개)", ticket.batch_id, ticket.total);

    let result = loop {
        let snapshot = service.get_parallel_results(&ticket.batch_id)?;
        if snapshot.is_complete() {
            break service.consume_parallel_results(&ticket.batch_id)?;
        }
        info!("진행 중: {}/{}", snapshot.completed, snapshot.total);
        tokio::time::sleep(poll).await;
    };

    println!("{}", serde_json::to_string_pretty(&result)?);
    service.close().await;
    Ok(())
}
