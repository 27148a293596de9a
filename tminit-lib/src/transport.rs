use crate::constants::PRIMING_ENDPOINT_INDEX;
use crate::error::TmError;
use crate::packet::{ControlRequest, RequestKind, RequestRecipient};
use futures_lite::future::Boxed;
use nusb::transfer::{ControlIn, ControlOut, ControlType, Recipient, TransferError};
use nusb::{Device, DeviceInfo, Interface};
use tracing::{debug, info};

/// How a transfer ended.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, strum_macros::Display)]
pub enum TransferStatus {
    #[default]
    #[strum(serialize = "success")]
    Completed,
    /// Protocol fault on the bus, EPROTO in the kernel.
    #[strum(serialize = "protocol error")]
    Protocol,
    /// The endpoint halted, EPIPE in the kernel.
    #[strum(serialize = "stall")]
    Stall,
    #[strum(serialize = "device disconnected")]
    Disconnected,
    #[strum(serialize = "cancelled")]
    Cancelled,
    #[strum(serialize = "unknown error")]
    Other,
}

impl TransferStatus {
    pub fn is_ok(&self) -> bool {
        *self == TransferStatus::Completed
    }

    pub fn into_result(self) -> Result<(), TmError> {
        if self.is_ok() {
            Ok(())
        } else {
            Err(TmError::Transfer(self))
        }
    }
}

impl From<TransferError> for TransferStatus {
    fn from(err: TransferError) -> Self {
        match err {
            TransferError::Fault => TransferStatus::Protocol,
            TransferError::Stall => TransferStatus::Stall,
            TransferError::Disconnected => TransferStatus::Disconnected,
            TransferError::Cancelled => TransferStatus::Cancelled,
            _ => TransferStatus::Other,
        }
    }
}

/// The result of a transfer the transport accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion<T> {
    pub data: T,
    pub status: TransferStatus,
}

impl<T> Completion<T> {
    pub fn into_result(self) -> Result<T, TmError> {
        self.status.into_result()?;
        Ok(self.data)
    }
}

impl<T> From<nusb::transfer::Completion<T>> for Completion<T> {
    fn from(completion: nusb::transfer::Completion<T>) -> Self {
        Self {
            data: completion.data,
            status: completion
                .status
                .map_or_else(TransferStatus::from, |()| TransferStatus::Completed),
        }
    }
}

/// A submitted transfer. Resolves exactly once; dropping it cancels the transfer.
pub type Pending<T> = Boxed<Completion<T>>;

/// The USB host side of a session.
///
/// Submitting returns immediately: `Err` when the transfer was rejected,
/// otherwise a [`Pending`] that completes out-of-band.
pub trait Transport: Send + Sync + 'static {
    /// Device-to-host control transfer on the default pipe.
    fn control_in(&self, request: &ControlRequest) -> Result<Pending<Vec<u8>>, TmError>;

    /// Host-to-device control transfer on the default pipe. Resolves to the
    /// number of bytes sent.
    fn control_out(
        &self,
        request: &ControlRequest,
        data: Vec<u8>,
    ) -> Result<Pending<usize>, TmError>;

    /// Interrupt OUT transfer. Resolves to the number of bytes sent.
    fn interrupt_out(&self, endpoint: u8, data: Vec<u8>) -> Result<Pending<usize>, TmError>;

    /// Address of the endpoint the priming sequences are written to.
    fn priming_endpoint(&self) -> Result<u8, TmError>;
}

/// [`Transport`] over a claimed `nusb` interface.
pub struct UsbTransport {
    interface: Interface,
    priming_endpoint: Option<u8>,
}

impl UsbTransport {
    /// Opens the device and claims `interface`, detaching the kernel HID driver.
    pub fn open(device_info: &DeviceInfo, interface: u8) -> Result<Self, TmError> {
        info!(
            "Opening device on bus {} addr {}",
            device_info.bus_number(),
            device_info.device_address()
        );
        let device = device_info.open()?;
        let priming_endpoint = find_priming_endpoint(&device, interface);
        debug!(?priming_endpoint, "Resolved priming endpoint");

        let interface = device.detach_and_claim_interface(interface)?;
        info!("Interface claimed successfully.");

        Ok(Self {
            interface,
            priming_endpoint,
        })
    }
}

/// Address of the second endpoint of the interface's default alternate setting.
fn find_priming_endpoint(device: &Device, interface: u8) -> Option<u8> {
    let config = device.active_configuration().ok()?;
    for group in config.interfaces() {
        for alt in group.alt_settings() {
            if alt.interface_number() == interface && alt.alternate_setting() == 0 {
                return alt
                    .endpoints()
                    .nth(PRIMING_ENDPOINT_INDEX)
                    .map(|endpoint| endpoint.address());
            }
        }
    }
    None
}

fn control_type(request: &ControlRequest) -> Result<(ControlType, Recipient), TmError> {
    let control_type = match request.kind() {
        RequestKind::Standard => ControlType::Standard,
        RequestKind::Class => ControlType::Class,
        RequestKind::Vendor => ControlType::Vendor,
        RequestKind::Reserved(kind) => {
            return Err(TmError::Submit(format!("reserved request type {kind}")));
        }
    };
    let recipient = match request.recipient() {
        RequestRecipient::Device => Recipient::Device,
        RequestRecipient::Interface => Recipient::Interface,
        RequestRecipient::Endpoint => Recipient::Endpoint,
        RequestRecipient::Other => Recipient::Other,
        RequestRecipient::Reserved(recipient) => {
            return Err(TmError::Submit(format!("reserved recipient {recipient}")));
        }
    };
    Ok((control_type, recipient))
}

impl Transport for UsbTransport {
    fn control_in(&self, request: &ControlRequest) -> Result<Pending<Vec<u8>>, TmError> {
        let (control_type, recipient) = control_type(request)?;
        debug!(setup = hex::encode(request.to_bytes()), "USB Control In");
        let transfer = self.interface.control_in(ControlIn {
            control_type,
            recipient,
            request: request.request,
            value: request.value,
            index: request.index,
            length: request.length,
        });
        Ok(Box::pin(async move { Completion::from(transfer.await) }))
    }

    fn control_out(
        &self,
        request: &ControlRequest,
        data: Vec<u8>,
    ) -> Result<Pending<usize>, TmError> {
        let (control_type, recipient) = control_type(request)?;
        debug!(
            setup = hex::encode(request.to_bytes()),
            bytes = hex::encode(&data),
            "USB Control Out"
        );
        // ControlOut borrows its data, so the transfer is submitted from inside the future
        let interface = self.interface.clone();
        let request = *request;
        Ok(Box::pin(async move {
            let transfer = interface.control_out(ControlOut {
                control_type,
                recipient,
                request: request.request,
                value: request.value,
                index: request.index,
                data: &data,
            });
            let completion = Completion::from(transfer.await);
            Completion {
                data: completion.data.actual_length(),
                status: completion.status,
            }
        }))
    }

    fn interrupt_out(&self, endpoint: u8, data: Vec<u8>) -> Result<Pending<usize>, TmError> {
        debug!(endpoint, bytes = hex::encode(&data), "USB Interrupt Out");
        let transfer = self.interface.interrupt_out(endpoint, data);
        Ok(Box::pin(async move {
            let completion = Completion::from(transfer.await);
            Completion {
                data: completion.data.actual_length(),
                status: completion.status,
            }
        }))
    }

    fn priming_endpoint(&self) -> Result<u8, TmError> {
        self.priming_endpoint
            .ok_or_else(|| TmError::Setup("interface has no second endpoint to prime".to_string()))
    }
}
