// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::Context;
use hookrs::config::settings::Settings;
use hookrs::domain::services::delivery_pipeline::DeliveryPipeline;
use hookrs::domain::use_cases::dispatch_event::DispatchEventUseCase;
use hookrs::infrastructure::database::connection;
use hookrs::infrastructure::repositories::delivery_job_repo_impl::DeliveryJobRepoImpl;
use hookrs::infrastructure::repositories::endpoint_repo_impl::EndpointRepoImpl;
use hookrs::infrastructure::services::http_delivery_service::HttpDeliveryService;
use hookrs::presentation::routes;
use hookrs::workers::manager::WorkerManager;
use hookrs::workers::retry_worker::RetryWorker;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tracing::{error, info};

use hookrs::utils::telemetry;
use migration::{Migrator, MigratorTrait};

/// 关闭时等待工作器退出的最长时间
const WORKER_SHUTDOWN_GRACE: Duration = Duration::from_secs(15);

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Initialize logging
    telemetry::init_telemetry();
    info!("Starting hookrs...");

    // 2. Load configuration
    let settings = Settings::new().context("failed to load configuration")?;
    info!("Configuration loaded");

    // Initialize Prometheus Metrics
    hookrs::infrastructure::metrics::init_metrics(&settings.metrics);

    // 3. Connect to database
    let db = connection::create_pool(&settings.database)
        .await
        .context("failed to connect to database")?;
    let db = Arc::new(db);
    info!("Database connection established");

    // Run database migrations
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Initialize Components
    let endpoint_repo = Arc::new(EndpointRepoImpl::new(db.clone()));
    let job_repo = Arc::new(DeliveryJobRepoImpl::new(db.clone()));
    let delivery_service = Arc::new(
        HttpDeliveryService::new(
            settings.dispatcher.request_timeout(),
            settings.dispatcher.user_agent.clone(),
        )
        .context("failed to build HTTP client")?,
    );
    let pipeline = Arc::new(DeliveryPipeline::new(
        endpoint_repo.clone(),
        job_repo.clone(),
        delivery_service,
        settings.dispatcher.fan_out_limit,
    ));
    let dispatcher = Arc::new(DispatchEventUseCase::new(
        endpoint_repo.clone(),
        pipeline.clone(),
    ));
    info!(
        "Dispatcher initialized (fan-out limit {})",
        settings.dispatcher.fan_out_limit
    );

    // 5. Start Workers
    let mut worker_manager = WorkerManager::new();
    if settings.retry_worker.enabled {
        worker_manager.spawn(Arc::new(RetryWorker::new(
            endpoint_repo.clone(),
            job_repo.clone(),
            pipeline,
            &settings.retry_worker,
            settings.dispatcher.fan_out_limit,
        )));
    } else {
        info!("Retry worker disabled; scheduled retries stay queued");
    }

    // 6. Start HTTP server
    let app = routes::app(dispatcher, endpoint_repo);

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Server listening on {}", addr);

    let (shutdown_tx, mut shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received"),
            Err(err) => error!("Unable to listen for shutdown signal: {}", err),
        }
        let _ = shutdown_tx.send(true);
    });

    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.wait_for(|stop| *stop).await;
        })
        .await?;

    // 7. Stop Workers
    worker_manager.shutdown(WORKER_SHUTDOWN_GRACE).await;
    info!("hookrs stopped");

    Ok(())
}
