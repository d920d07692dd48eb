//! Capability-gated characteristic I/O
//!
//! Every operation checks the characteristic's declared capabilities before
//! touching the native stack. A capability mismatch fails with
//! [`Error::Characteristic`] and performs zero backend calls, so callers can
//! rely on capability errors being side-effect free.

use std::sync::{Arc, Mutex, PoisonError};

use tracing::debug;

use crate::backend::{NotificationSink, SubscriptionKind};
use crate::error::{Error, Result};
use crate::gatt::{Capability, Capabilities, Characteristic, Descriptor};
use crate::peripheral::Peripheral;

type Callback = Box<dyn Fn(Vec<u8>) + Send + Sync>;

// ----------------------------------------------------------------------------
// Subscription Guard
// ----------------------------------------------------------------------------

/// Holds the subscriber callback for one active subscription.
///
/// Delivery runs with the slot lock held, so cancellation observes a hard
/// boundary: once [`cancel`](Self::cancel) returns, no delivery is in flight
/// and none can start. Payloads for one characteristic are therefore also
/// delivered FIFO.
pub(crate) struct SubscriptionGuard {
    callback: Mutex<Option<Callback>>,
}

impl SubscriptionGuard {
    fn new(callback: Callback) -> Self {
        Self {
            callback: Mutex::new(Some(callback)),
        }
    }

    pub(crate) fn deliver(&self, data: Vec<u8>) {
        let slot = self
            .callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(callback) = slot.as_ref() {
            callback(data);
        }
    }

    fn cancel(&self) {
        self.callback
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }
}

// ----------------------------------------------------------------------------
// Characteristic Channel
// ----------------------------------------------------------------------------

/// I/O handle for one characteristic of a connected peripheral.
///
/// Obtained via [`Peripheral::characteristic_channel`]. Operations check the
/// connection first, then the capability set, then call into the native
/// stack.
pub struct CharacteristicChannel {
    peripheral: Peripheral,
    service_uuid: String,
    characteristic: Characteristic,
    subscription: Mutex<Option<Arc<SubscriptionGuard>>>,
}

impl CharacteristicChannel {
    pub(crate) fn new(
        peripheral: Peripheral,
        service_uuid: String,
        characteristic: Characteristic,
    ) -> Self {
        Self {
            peripheral,
            service_uuid,
            characteristic,
            subscription: Mutex::new(None),
        }
    }

    pub fn uuid(&self) -> &str {
        &self.characteristic.uuid
    }

    pub fn service_uuid(&self) -> &str {
        &self.service_uuid
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.characteristic.capabilities
    }

    pub fn descriptors(&self) -> &[Descriptor] {
        &self.characteristic.descriptors
    }

    fn ensure_connected(&self) -> Result<()> {
        if self.peripheral.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn ensure_capability(&self, capability: Capability) -> Result<()> {
        if self.characteristic.capabilities.contains(capability) {
            Ok(())
        } else {
            Err(Error::Characteristic(format!(
                "characteristic {} does not support {}",
                self.characteristic.uuid, capability
            )))
        }
    }

    /// Read the characteristic value. Requires the `read` capability.
    pub async fn read(&self) -> Result<Vec<u8>> {
        self.ensure_connected()?;
        self.ensure_capability(Capability::Read)?;
        self.peripheral
            .backend()
            .read(
                self.peripheral.address(),
                &self.service_uuid,
                &self.characteristic.uuid,
            )
            .await
    }

    /// Acknowledged write. Requires the `write` capability.
    pub async fn write_request(&self, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        self.ensure_capability(Capability::WriteRequest)?;
        self.peripheral
            .backend()
            .write_request(
                self.peripheral.address(),
                &self.service_uuid,
                &self.characteristic.uuid,
                data,
            )
            .await
    }

    /// Fire-and-forget write. Requires the `write-without-response`
    /// capability.
    pub async fn write_command(&self, data: &[u8]) -> Result<()> {
        self.ensure_connected()?;
        self.ensure_capability(Capability::WriteCommand)?;
        self.peripheral
            .backend()
            .write_command(
                self.peripheral.address(),
                &self.service_uuid,
                &self.characteristic.uuid,
                data,
            )
            .await
    }

    /// Subscribe to notifications. Requires the `notify` capability.
    pub async fn subscribe_notify<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        self.subscribe(SubscriptionKind::Notify, Capability::Notify, Box::new(callback))
            .await
    }

    /// Subscribe to indications. Requires the `indicate` capability.
    pub async fn subscribe_indicate<F>(&self, callback: F) -> Result<()>
    where
        F: Fn(Vec<u8>) + Send + Sync + 'static,
    {
        self.subscribe(
            SubscriptionKind::Indicate,
            Capability::Indicate,
            Box::new(callback),
        )
        .await
    }

    async fn subscribe(
        &self,
        kind: SubscriptionKind,
        capability: Capability,
        callback: Callback,
    ) -> Result<()> {
        self.ensure_connected()?;
        self.ensure_capability(capability)?;

        let guard = {
            let mut slot = self
                .subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if slot.is_some() {
                return Err(Error::Characteristic(format!(
                    "subscription already active on {}",
                    self.characteristic.uuid
                )));
            }
            let guard = Arc::new(SubscriptionGuard::new(callback));
            *slot = Some(Arc::clone(&guard));
            guard
        };

        let result = self
            .peripheral
            .backend()
            .subscribe(
                self.peripheral.address(),
                &self.service_uuid,
                &self.characteristic.uuid,
                kind,
                NotificationSink::new(Arc::clone(&guard)),
            )
            .await;

        if let Err(e) = result {
            guard.cancel();
            self.subscription
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take();
            return Err(e);
        }

        debug!(
            "Subscribed ({:?}) to {} on {}",
            kind,
            self.characteristic.uuid,
            self.peripheral.address()
        );
        Ok(())
    }

    /// Cancel the active subscription, if any.
    ///
    /// Idempotent. Once this returns, the subscriber callback will not fire
    /// again even if the native stack still has payloads in flight.
    pub async fn unsubscribe(&self) -> Result<()> {
        let guard = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();

        let Some(guard) = guard else {
            return Ok(());
        };

        // Cut local delivery before telling the stack, so nothing fires
        // after this call returns regardless of what the backend does.
        guard.cancel();

        if self.peripheral.is_connected() {
            self.peripheral
                .backend()
                .unsubscribe(
                    self.peripheral.address(),
                    &self.service_uuid,
                    &self.characteristic.uuid,
                )
                .await?;
        }

        debug!(
            "Unsubscribed from {} on {}",
            self.characteristic.uuid,
            self.peripheral.address()
        );
        Ok(())
    }
}
