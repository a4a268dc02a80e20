use std::{future::Future, pin::Pin, str::FromStr, time::Duration};

use async_trait::async_trait;
use btleplug::{
    api::{
        BDAddr, Central, CentralEvent, Manager as _, Peripheral as _, ScanFilter,
        ValueNotification,
    },
    platform::{Adapter, Manager, Peripheral},
};
use futures::{future, Stream, StreamExt};
use tracing::{debug, info};
use uuid::Uuid;

use super::{Characteristic, DeviceLink, DiscoveredDevice, LinkError, RawNotification};

const ORIENTATION_CHARACTERISTIC: Uuid = uuid::uuid!("c7e70012-c847-11e6-8175-8c89a55d403c");
const BATTERY_LEVEL_CHARACTERISTIC: Uuid = uuid::uuid!("00002a19-0000-1000-8000-00805f9b34fb");

type NotificationStream = Pin<Box<dyn Stream<Item = ValueNotification> + Send>>;

fn backend(e: btleplug::Error) -> LinkError {
    LinkError::Backend(e.to_string())
}

fn parse_address(address: &str) -> Result<BDAddr, LinkError> {
    BDAddr::from_str(address)
        .map_err(|e| LinkError::Backend(format!("Invalid device address {address}: {e}")))
}

fn characteristic_uuid(characteristic: Characteristic) -> Uuid {
    match characteristic {
        Characteristic::Orientation => ORIENTATION_CHARACTERISTIC,
        Characteristic::BatteryLevel => BATTERY_LEVEL_CHARACTERISTIC,
    }
}

fn characteristic_of(uuid: Uuid) -> Option<Characteristic> {
    match uuid {
        ORIENTATION_CHARACTERISTIC => Some(Characteristic::Orientation),
        BATTERY_LEVEL_CHARACTERISTIC => Some(Characteristic::BatteryLevel),
        _ => None,
    }
}

/// Resolves advertised ids in order until one resolves to something. Ends with `None` together
/// with the stream.
async fn first_match<I, P, Fut>(
    ids: impl Stream<Item = I>,
    mut resolve: impl FnMut(I) -> Fut,
) -> Option<P>
where
    Fut: Future<Output = Option<P>>,
{
    let mut ids = std::pin::pin!(ids);
    while let Some(id) = ids.next().await {
        if let Some(found) = resolve(id).await {
            return Some(found);
        }
    }
    None
}

/// [DeviceLink] over the first Bluetooth LE adapter of the system.
pub struct BtleLink {
    adapter: Adapter,
    peripheral: Option<Peripheral>,
    notifications: Option<NotificationStream>,
}

impl BtleLink {
    pub async fn new() -> Result<Self, LinkError> {
        let manager = Manager::new().await.map_err(backend)?;
        let adapter = manager
            .adapters()
            .await
            .map_err(backend)?
            .into_iter()
            .next()
            .ok_or_else(|| LinkError::Backend("No bluetooth adapter found".into()))?;
        info!("Using bluetooth adapter {:?}", adapter.adapter_info().await.ok());
        Ok(Self {
            adapter,
            peripheral: None,
            notifications: None,
        })
    }

    fn peripheral(&self) -> Result<Peripheral, LinkError> {
        self.peripheral.clone().ok_or(LinkError::NotConnected)
    }

    async fn stop_scan(&self) {
        if let Err(e) = self.adapter.stop_scan().await {
            debug!("Failed to stop scanning {e}");
        }
    }
}

#[async_trait]
impl DeviceLink for BtleLink {
    async fn discover(&mut self, address: &str, window: Duration) -> Result<bool, LinkError> {
        let target = parse_address(address)?;
        // Only advertisements received in this window count, `peripherals()` also lists devices
        // cached by earlier scans.
        let events = self.adapter.events().await.map_err(backend)?;
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)?;

        let adapter = &self.adapter;
        let advertised = events.filter_map(|event| {
            future::ready(match event {
                CentralEvent::DeviceDiscovered(id) | CentralEvent::DeviceUpdated(id) => Some(id),
                _ => None,
            })
        });
        let found = tokio::time::timeout(
            window,
            first_match(advertised, |id| async move {
                adapter
                    .peripheral(&id)
                    .await
                    .inspect_err(|e| debug!("Peripheral {id:?} vanished {e}"))
                    .ok()
                    .filter(|v| v.address() == target)
            }),
        )
        .await
        .unwrap_or(None);
        self.stop_scan().await;

        match found {
            Some(peripheral) => {
                debug!("Discovered {address}");
                self.peripheral = Some(peripheral);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn connect(&mut self, address: &str) -> Result<(), LinkError> {
        let peripheral = self.peripheral()?;
        if !peripheral.is_connected().await.unwrap_or(false) {
            peripheral
                .connect()
                .await
                .map_err(|e| LinkError::DeviceUnreachable(format!("{address}: {e}")))?;
        }
        peripheral.discover_services().await.map_err(backend)?;
        self.notifications = None;
        Ok(())
    }

    async fn subscribe(&mut self, characteristic: Characteristic) -> Result<(), LinkError> {
        let peripheral = self.peripheral()?;
        let uuid = characteristic_uuid(characteristic);
        let target = peripheral
            .characteristics()
            .into_iter()
            .find(|c| c.uuid == uuid)
            .ok_or_else(|| LinkError::SubscriptionFailed(format!("{uuid} is not exposed")))?;
        peripheral
            .subscribe(&target)
            .await
            .map_err(|e| LinkError::SubscriptionFailed(e.to_string()))?;

        if self.notifications.is_none() {
            self.notifications = Some(peripheral.notifications().await.map_err(backend)?);
        }
        Ok(())
    }

    async fn wait_for_notification(
        &mut self,
        timeout: Duration,
    ) -> Result<Option<RawNotification>, LinkError> {
        let next = {
            let stream = self.notifications.as_mut().ok_or(LinkError::NotConnected)?;
            tokio::time::timeout(timeout, stream.next()).await
        };

        match next {
            Ok(Some(notification)) => match characteristic_of(notification.uuid) {
                Some(characteristic) => Ok(Some(RawNotification {
                    characteristic,
                    payload: notification.value,
                })),
                None => {
                    debug!("Notification from {}: {:?}", notification.uuid, notification.value);
                    Ok(None)
                }
            },
            Ok(None) => {
                self.notifications = None;
                Err(LinkError::LinkLost)
            }
            Err(_) => {
                let connected = self.peripheral()?.is_connected().await.unwrap_or(false);
                if connected {
                    Ok(None)
                } else {
                    self.notifications = None;
                    Err(LinkError::LinkLost)
                }
            }
        }
    }

    async fn disconnect(&mut self) -> Result<(), LinkError> {
        self.notifications = None;
        if let Some(peripheral) = &self.peripheral {
            if peripheral.is_connected().await.unwrap_or(false) {
                peripheral.disconnect().await.map_err(backend)?;
            }
        }
        Ok(())
    }

    async fn scan(&mut self, window: Duration) -> Result<Vec<DiscoveredDevice>, LinkError> {
        self.adapter
            .start_scan(ScanFilter::default())
            .await
            .map_err(backend)?;
        tokio::time::sleep(window).await;
        self.stop_scan().await;

        let mut devices = vec![];
        for peripheral in self.adapter.peripherals().await.map_err(backend)? {
            let name = peripheral
                .properties()
                .await
                .ok()
                .flatten()
                .and_then(|v| v.local_name);
            devices.push(DiscoveredDevice {
                address: peripheral.address().to_string(),
                name,
            });
        }
        Ok(devices)
    }
}
