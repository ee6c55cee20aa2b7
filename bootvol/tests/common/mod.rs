//! In-memory host that records every storage call.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bootvol::host::{
    HostConnection, HostError, HostResult, PoolHandle, StoragePool, StorageVolume, UploadStream,
    VolumeHandle,
};
use bootvol::{RetryPolicy, VolumeDescriptor};
use parking_lot::Mutex;

pub const IGNITION: &str = r#"{"ignition":{"version":"3.0.0"}}"#;

/// Storage call seen by the host, tagged with its pool.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Call {
    pub pool: String,
    pub op: &'static str,
}

#[derive(Default)]
struct State {
    /// pool -> volume name -> contents
    pools: HashMap<String, HashMap<String, Vec<u8>>>,
    calls: Vec<Call>,
    in_flight: HashMap<String, usize>,
    max_in_flight_per_pool: usize,
    total_in_flight: usize,
    max_total_in_flight: usize,
    refresh_failures: HashMap<String, u32>,
    fail_upload: bool,
    fail_key: bool,
    fail_volume_name: bool,
    fail_volume_pool: bool,
    fail_pool_name: bool,
}

#[derive(Clone, Default)]
pub struct MemoryHost {
    state: Arc<Mutex<State>>,
    /// Delay inside each refresh, to widen race windows.
    refresh_delay: Duration,
}

impl MemoryHost {
    pub fn new(pools: &[&str]) -> Self {
        let host = Self::default();
        {
            let mut state = host.state.lock();
            for pool in pools {
                state.pools.insert(pool.to_string(), HashMap::new());
            }
        }
        host
    }

    pub fn with_refresh_delay(mut self, delay: Duration) -> Self {
        self.refresh_delay = delay;
        self
    }

    /// Fail the next `times` refreshes of `pool`.
    pub fn fail_refresh(&self, pool: &str, times: u32) {
        self.state.lock().refresh_failures.insert(pool.to_string(), times);
    }

    pub fn fail_upload(&self) {
        self.state.lock().fail_upload = true;
    }

    pub fn fail_key(&self) {
        self.state.lock().fail_key = true;
    }

    pub fn fail_volume_name(&self) {
        self.state.lock().fail_volume_name = true;
    }

    pub fn fail_volume_pool(&self) {
        self.state.lock().fail_volume_pool = true;
    }

    pub fn fail_pool_name(&self) {
        self.state.lock().fail_pool_name = true;
    }

    pub fn calls(&self) -> Vec<Call> {
        self.state.lock().calls.clone()
    }

    pub fn calls_for(&self, pool: &str) -> Vec<&'static str> {
        self.calls()
            .into_iter()
            .filter(|c| c.pool == pool)
            .map(|c| c.op)
            .collect()
    }

    pub fn volume(&self, pool: &str, name: &str) -> Option<Vec<u8>> {
        self.state.lock().pools.get(pool)?.get(name).cloned()
    }

    pub fn volume_count(&self, pool: &str) -> usize {
        self.state.lock().pools.get(pool).map_or(0, |v| v.len())
    }

    /// Most provisioning sequences ever running at once on a single pool.
    pub fn max_in_flight_per_pool(&self) -> usize {
        self.state.lock().max_in_flight_per_pool
    }

    /// Most provisioning sequences ever running at once across all pools.
    pub fn max_total_in_flight(&self) -> usize {
        self.state.lock().max_total_in_flight
    }

    fn record(&self, pool: &str, op: &'static str) {
        self.state.lock().calls.push(Call {
            pool: pool.to_string(),
            op,
        });
    }

    fn pool_handle(&self, name: &str) -> PoolHandle {
        Arc::new(MemoryPool {
            host: self.clone(),
            name: name.to_string(),
        })
    }

    fn volume_handle(&self, pool: &str, name: &str) -> VolumeHandle {
        Arc::new(MemoryVolume {
            host: self.clone(),
            pool: pool.to_string(),
            name: name.to_string(),
        })
    }
}

fn key_for(pool: &str, name: &str) -> String {
    format!("mem/{}/{}", pool, name)
}

#[async_trait]
impl HostConnection for MemoryHost {
    async fn lookup_pool_by_name(&self, name: &str) -> HostResult<PoolHandle> {
        if !self.state.lock().pools.contains_key(name) {
            return Err(HostError::NotFound(format!("storage pool '{}'", name)));
        }
        Ok(self.pool_handle(name))
    }

    async fn lookup_volume_by_key(&self, key: &str) -> HostResult<VolumeHandle> {
        let not_found = || HostError::NotFound(format!("volume with key '{}'", key));
        let (pool, name) = key
            .strip_prefix("mem/")
            .and_then(|rest| rest.split_once('/'))
            .ok_or_else(not_found)?;
        let exists = self
            .state
            .lock()
            .pools
            .get(pool)
            .is_some_and(|volumes| volumes.contains_key(name));
        if !exists {
            return Err(not_found());
        }
        Ok(self.volume_handle(pool, name))
    }

    async fn open_upload(
        &self,
        volume: &VolumeHandle,
        offset: u64,
        length: u64,
    ) -> HostResult<Box<dyn UploadStream>> {
        let name = volume.name().await?;
        let pool = volume.pool().await?.name().await?;
        assert_eq!(offset, 0);
        self.record(&pool, "upload");
        if self.state.lock().fail_upload {
            return Err(HostError::Failed("upload rejected".into()));
        }
        Ok(Box::new(MemoryUpload {
            host: self.clone(),
            pool,
            name,
            expected: length,
            buf: Vec::new(),
        }))
    }
}

struct MemoryPool {
    host: MemoryHost,
    name: String,
}

#[async_trait]
impl StoragePool for MemoryPool {
    async fn name(&self) -> HostResult<String> {
        if self.host.state.lock().fail_pool_name {
            return Err(HostError::Failed("pool name unavailable".into()));
        }
        Ok(self.name.clone())
    }

    async fn refresh(&self) -> HostResult<()> {
        self.host.record(&self.name, "refresh");
        {
            let mut state = self.host.state.lock();
            if let Some(left) = state.refresh_failures.get_mut(&self.name) {
                if *left > 0 {
                    *left -= 1;
                    return Err(HostError::Failed("pool busy".into()));
                }
            }
            let count = state.in_flight.entry(self.name.clone()).or_default();
            *count += 1;
            let count = *count;
            state.max_in_flight_per_pool = state.max_in_flight_per_pool.max(count);
            state.total_in_flight += 1;
            state.max_total_in_flight = state.max_total_in_flight.max(state.total_in_flight);
        }
        if !self.host.refresh_delay.is_zero() {
            tokio::time::sleep(self.host.refresh_delay).await;
        }
        Ok(())
    }

    async fn create_volume(&self, xml: &str) -> HostResult<VolumeHandle> {
        self.host.record(&self.name, "create");
        let desc = VolumeDescriptor::from_xml(xml).map_err(|e| HostError::Invalid(e.to_string()))?;
        let mut state = self.host.state.lock();
        let volumes = state
            .pools
            .get_mut(&self.name)
            .ok_or_else(|| HostError::NotFound(self.name.clone()))?;
        if volumes.contains_key(&desc.name) {
            return Err(HostError::AlreadyExists(desc.name));
        }
        let capacity = desc
            .capacity_bytes()
            .map_err(|e| HostError::Invalid(e.to_string()))?;
        volumes.insert(desc.name.clone(), vec![0; capacity as usize]);
        drop(state);
        Ok(self.host.volume_handle(&self.name, &desc.name))
    }
}

struct MemoryVolume {
    host: MemoryHost,
    pool: String,
    name: String,
}

#[async_trait]
impl StorageVolume for MemoryVolume {
    async fn key(&self) -> HostResult<String> {
        self.host.record(&self.pool, "key");
        let mut state = self.host.state.lock();
        if let Some(count) = state.in_flight.get_mut(&self.pool) {
            *count = count.saturating_sub(1);
            state.total_in_flight = state.total_in_flight.saturating_sub(1);
        }
        if state.fail_key {
            return Err(HostError::Failed("key unavailable".into()));
        }
        Ok(key_for(&self.pool, &self.name))
    }

    async fn name(&self) -> HostResult<String> {
        if self.host.state.lock().fail_volume_name {
            return Err(HostError::Failed("volume name unavailable".into()));
        }
        Ok(self.name.clone())
    }

    async fn pool(&self) -> HostResult<PoolHandle> {
        if self.host.state.lock().fail_volume_pool {
            return Err(HostError::Failed("owning pool unavailable".into()));
        }
        Ok(self.host.pool_handle(&self.pool))
    }

    async fn delete(&self) -> HostResult<()> {
        self.host.record(&self.pool, "delete");
        let mut state = self.host.state.lock();
        state
            .pools
            .get_mut(&self.pool)
            .and_then(|volumes| volumes.remove(&self.name))
            .map(|_| ())
            .ok_or_else(|| HostError::NotFound(self.name.clone()))
    }
}

struct MemoryUpload {
    host: MemoryHost,
    pool: String,
    name: String,
    expected: u64,
    buf: Vec<u8>,
}

#[async_trait]
impl UploadStream for MemoryUpload {
    async fn send(&mut self, chunk: &[u8]) -> HostResult<()> {
        self.buf.extend_from_slice(chunk);
        Ok(())
    }

    async fn finish(self: Box<Self>) -> HostResult<()> {
        if self.buf.len() as u64 != self.expected {
            return Err(HostError::Invalid("short upload".into()));
        }
        let mut state = self.host.state.lock();
        let volume = state
            .pools
            .get_mut(&self.pool)
            .and_then(|volumes| volumes.get_mut(&self.name))
            .ok_or_else(|| HostError::NotFound(self.name.clone()))?;
        volume[..self.buf.len()].copy_from_slice(&self.buf);
        Ok(())
    }

    async fn abort(self: Box<Self>) -> HostResult<()> {
        Ok(())
    }
}

pub fn fast_retry(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff: Duration::from_millis(1),
        max_backoff: Duration::from_millis(2),
        multiplier: 2.0,
    }
}
