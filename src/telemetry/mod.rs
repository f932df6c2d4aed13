//! Run telemetry: a background collector writing JSON-lines records.
//!
//! `record` never blocks the simulation; when the channel backs up the
//! record is dropped and counted. The worker buffers and flushes
//! periodically, and once more on shutdown.

use crate::error::Result;
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender};
use serde::Serialize;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

const CHANNEL_CAPACITY: usize = 4096;

#[derive(Debug, Serialize)]
pub struct Record {
    pub ts: f64,
    pub kind: &'static str,
    pub data: serde_json::Value,
}

pub struct DataCollector {
    tx: Option<Sender<Record>>,
    dropped: Arc<AtomicU64>,
    worker: Option<JoinHandle<()>>,
}

impl DataCollector {
    pub fn create(path: &Path, flush_period: Duration) -> Result<DataCollector> {
        let file = File::create(path)?;
        let (tx, rx) = bounded(CHANNEL_CAPACITY);
        let worker = std::thread::Builder::new()
            .name("telemetry".into())
            .spawn(move || collector_loop(rx, file, flush_period))?;
        log::info!("[Telemetry] writing to {}", path.display());
        Ok(DataCollector {
            tx: Some(tx),
            dropped: Arc::new(AtomicU64::new(0)),
            worker: Some(worker),
        })
    }

    /// Queue a record without blocking. Dropped on backpressure.
    pub fn record(&self, ts: f64, kind: &'static str, data: serde_json::Value) {
        if let Some(tx) = &self.tx {
            if tx.try_send(Record { ts, kind, data }).is_err() {
                self.dropped.fetch_add(1, Ordering::Relaxed);
            }
        }
    }

    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Close the channel and wait for the final flush.
    pub fn shutdown(mut self) {
        self.close();
    }

    fn close(&mut self) {
        self.tx.take();
        if let Some(worker) = self.worker.take() {
            if worker.join().is_err() {
                log::error!("[Telemetry] collector thread panicked");
            }
        }
        let dropped = self.dropped();
        if dropped > 0 {
            log::warn!("[Telemetry] dropped {} records under backpressure", dropped);
        }
    }
}

impl Drop for DataCollector {
    fn drop(&mut self) {
        self.close();
    }
}

fn collector_loop(rx: Receiver<Record>, file: File, flush_period: Duration) {
    let mut out = BufWriter::new(file);
    loop {
        match rx.recv_timeout(flush_period) {
            Ok(record) => {
                if let Ok(line) = serde_json::to_string(&record) {
                    if writeln!(out, "{}", line).is_err() {
                        log::error!("[Telemetry] write failed, stopping collector");
                        return;
                    }
                }
            }
            Err(RecvTimeoutError::Timeout) => {
                let _ = out.flush();
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = out.flush();
                return;
            }
        }
    }
}
