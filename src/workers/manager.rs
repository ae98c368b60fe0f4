// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use crate::workers::worker::Worker;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// 工作管理器
///
/// 负责启动后台工作器，并在关闭时通过同一个 `watch` 通道通知它们退出。
pub struct WorkerManager {
    shutdown_tx: watch::Sender<bool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Default for WorkerManager {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerManager {
    pub fn new() -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            shutdown_tx,
            handles: Vec::new(),
        }
    }

    /// 订阅关闭信号
    pub fn shutdown_signal(&self) -> watch::Receiver<bool> {
        self.shutdown_tx.subscribe()
    }

    /// 启动一个工作器
    pub fn spawn<W: Worker + 'static>(&mut self, worker: Arc<W>) {
        let name = worker.name().to_string();
        let shutdown = self.shutdown_signal();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            if let Err(e) = worker.run(shutdown).await {
                error!("Worker {} exited with error: {}", task_name, e);
            }
        });

        info!("Started worker {}", name);
        self.handles.push((name, handle));
    }

    /// 通知所有工作器退出并等待它们结束
    ///
    /// # 参数
    ///
    /// * `grace` - 每个工作器的最长等待时间，超时后强制中止
    pub async fn shutdown(self, grace: Duration) {
        info!("Shutting down workers...");
        // Receivers may already be gone; that is the same as having stopped.
        let _ = self.shutdown_tx.send(true);

        for (name, mut handle) in self.handles {
            match tokio::time::timeout(grace, &mut handle).await {
                Ok(Ok(())) => info!("Worker {} stopped", name),
                Ok(Err(e)) => error!("Worker {} panicked: {}", name, e),
                Err(_) => {
                    warn!("Worker {} did not stop within {:?}, aborting", name, grace);
                    handle.abort();
                }
            }
        }

        info!("Workers shut down successfully");
    }
}
