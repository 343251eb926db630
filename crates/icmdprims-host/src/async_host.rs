use std::sync::Arc;

use bytes::Bytes;
use icmdprims_bus::{ChipSelect, SpiTransfer};
use icmdprims_frame::SlotId;
use tokio::sync::Mutex;

use crate::error::{HostError, Result};
use crate::interface::HostInterface;

/// Async front for a [`HostInterface`].
///
/// Each operation waits for exclusive access, then runs the blocking
/// transaction on tokio's blocking pool while still holding the lock. At
/// most one transaction is in flight across all clones.
pub struct AsyncHostInterface<T, C> {
    inner: Arc<Mutex<HostInterface<T, C>>>,
}

impl<T, C> Clone for AsyncHostInterface<T, C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, C> AsyncHostInterface<T, C>
where
    T: SpiTransfer + Send + 'static,
    C: ChipSelect + Send + 'static,
{
    pub fn new(host: HostInterface<T, C>) -> Self {
        Self {
            inner: Arc::new(Mutex::new(host)),
        }
    }

    pub async fn query_buffer_size(&self, slot: SlotId) -> Result<u16> {
        self.run(move |host| host.query_buffer_size(slot)).await
    }

    pub async fn receive(&self, slot: SlotId, capacity: usize, reserve: bool) -> Result<Bytes> {
        self.run(move |host| host.receive(slot, capacity, reserve))
            .await
    }

    pub async fn send(&self, slot: SlotId, payload: impl Into<Bytes>) -> Result<()> {
        let payload = payload.into();
        self.run(move |host| host.send(slot, &payload)).await
    }

    pub async fn read_slot(&self, slot: SlotId, reserve: bool) -> Result<Bytes> {
        self.run(move |host| host.read_slot(slot, reserve)).await
    }

    pub async fn firmware_version(&self) -> Result<String> {
        self.run(|host| host.firmware_version()).await
    }

    async fn run<R, F>(&self, op: F) -> Result<R>
    where
        F: FnOnce(&mut HostInterface<T, C>) -> Result<R> + Send + 'static,
        R: Send + 'static,
    {
        let mut guard = Arc::clone(&self.inner).lock_owned().await;
        tokio::task::spawn_blocking(move || op(&mut *guard))
            .await
            .map_err(|err| HostError::TaskJoin(err.to_string()))?
    }
}
