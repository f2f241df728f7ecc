//! Raw HCI socket backend.
//!
//! This backend uses raw Linux HCI sockets to scan for BLE advertisements
//! without requiring the BlueZ daemon. It requires CAP_NET_RAW and
//! CAP_NET_ADMIN capabilities or root privileges.

use super::{ADVERTISEMENT_CHANNEL_BUFFER_SIZE, ScanError, forward};
use crate::advertisement::RawAdvertisement;
use crate::mac_address::MacAddress;
use libc::{AF_BLUETOOTH, SOCK_CLOEXEC, SOCK_NONBLOCK, SOCK_RAW, c_int, c_void, sockaddr, socklen_t};
use std::io;
use std::mem;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};
use tokio::io::unix::AsyncFd;
use tokio::sync::mpsc;

const BTPROTO_HCI: c_int = 1;
const SOL_HCI: c_int = 0;
const HCI_FILTER: c_int = 2;
const HCI_CHANNEL_RAW: u16 = 0;

/// First adapter (`hci0`).
const HCI_DEV_ID: u16 = 0;

const HCI_COMMAND_PKT: u8 = 0x01;
const HCI_EVENT_PKT: u8 = 0x04;

const EVT_LE_META_EVENT: u8 = 0x3E;
const EVT_LE_ADVERTISING_REPORT: u8 = 0x02;

const OGF_LE_CTL: u16 = 0x08;
const OCF_LE_SET_SCAN_PARAMETERS: u16 = 0x000B;
const OCF_LE_SET_SCAN_ENABLE: u16 = 0x000C;

const LE_SCAN_PASSIVE: u8 = 0x00;
const LE_PUBLIC_ADDRESS: u8 = 0x00;
const FILTER_POLICY_ACCEPT_ALL: u8 = 0x00;

/// Scan interval and window, 10ms in 0.625ms units.
const SCAN_INTERVAL: u16 = 0x0010;
const SCAN_WINDOW: u16 = 0x0010;

/// Largest HCI event: 3 header bytes plus 255 parameter bytes.
const MAX_EVENT_SIZE: usize = 258;

/// Offset of the report count: packet type, event code, parameter length, sub-event.
const REPORTS_OFFSET: usize = 4;

/// Event type, address type, 6 address bytes and the data length.
const REPORT_HEADER_LEN: usize = 9;

#[repr(C)]
struct SockaddrHci {
    hci_family: u16,
    hci_dev: u16,
    hci_channel: u16,
}

/// Kernel-side packet filter of a raw HCI socket.
#[repr(C)]
#[derive(Default)]
struct HciFilter {
    type_mask: u32,
    event_mask: [u32; 2],
    opcode: u16,
}

impl HciFilter {
    fn le_meta_events() -> Self {
        let mut filter = Self::default();
        filter.type_mask |= 1 << u32::from(HCI_EVENT_PKT);
        let bit = usize::from(EVT_LE_META_EVENT);
        filter.event_mask[bit / 32] |= 1 << (bit % 32);
        filter
    }
}

fn os_error(action: &str) -> ScanError {
    ScanError::Bluetooth(format!("Failed to {action}: {}", io::Error::last_os_error()))
}

/// Build an HCI command packet.
fn command_packet(ogf: u16, ocf: u16, params: &[u8]) -> Vec<u8> {
    let opcode = (ogf << 10) | ocf;
    let mut packet = Vec::with_capacity(4 + params.len());
    packet.push(HCI_COMMAND_PKT);
    packet.extend_from_slice(&opcode.to_le_bytes());
    // Command parameters never exceed 255 bytes.
    packet.push(params.len() as u8);
    packet.extend_from_slice(params);
    packet
}

/// Parameters of LE Set Scan Parameters.
fn scan_parameters() -> Vec<u8> {
    let mut params = vec![LE_SCAN_PASSIVE];
    params.extend_from_slice(&SCAN_INTERVAL.to_le_bytes());
    params.extend_from_slice(&SCAN_WINDOW.to_le_bytes());
    params.push(LE_PUBLIC_ADDRESS);
    params.push(FILTER_POLICY_ACCEPT_ALL);
    params
}

/// A raw, non-blocking HCI socket bound to one adapter.
struct HciSocket {
    fd: OwnedFd,
}

impl HciSocket {
    fn open(dev_id: u16) -> Result<Self, ScanError> {
        // SOCK_NONBLOCK is required for AsyncFd
        let raw = unsafe { libc::socket(AF_BLUETOOTH, SOCK_RAW | SOCK_CLOEXEC | SOCK_NONBLOCK, BTPROTO_HCI) };
        if raw < 0 {
            return Err(os_error("create HCI socket"));
        }
        // SAFETY: `raw` is a valid descriptor that nothing else owns.
        let fd = unsafe { OwnedFd::from_raw_fd(raw) };

        let addr = SockaddrHci {
            hci_family: AF_BLUETOOTH as u16,
            hci_dev: dev_id,
            hci_channel: HCI_CHANNEL_RAW,
        };
        let ret = unsafe {
            libc::bind(
                fd.as_raw_fd(),
                (&addr as *const SockaddrHci).cast::<sockaddr>(),
                mem::size_of::<SockaddrHci>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("bind HCI socket"));
        }

        Ok(Self { fd })
    }

    /// Only let LE meta events through to this socket.
    fn subscribe_le_meta_events(&self) -> Result<(), ScanError> {
        let filter = HciFilter::le_meta_events();
        let ret = unsafe {
            libc::setsockopt(
                self.fd.as_raw_fd(),
                SOL_HCI,
                HCI_FILTER,
                (&filter as *const HciFilter).cast::<c_void>(),
                mem::size_of::<HciFilter>() as socklen_t,
            )
        };
        if ret < 0 {
            return Err(os_error("set HCI filter"));
        }
        Ok(())
    }

    fn send_command(&self, ogf: u16, ocf: u16, params: &[u8]) -> Result<(), ScanError> {
        let packet = command_packet(ogf, ocf, params);
        let ret = unsafe { libc::write(self.fd.as_raw_fd(), packet.as_ptr().cast::<c_void>(), packet.len()) };
        if ret < 0 {
            return Err(os_error("send HCI command"));
        }
        Ok(())
    }

    /// Passive scan without controller-side duplicate filtering.
    fn start_passive_scan(&self) -> Result<(), ScanError> {
        self.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_PARAMETERS, &scan_parameters())?;
        self.send_command(OGF_LE_CTL, OCF_LE_SET_SCAN_ENABLE, &[0x01, 0x00])
    }

    fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        let ret = unsafe { libc::read(self.fd.as_raw_fd(), buf.as_mut_ptr().cast::<c_void>(), buf.len()) };
        if ret < 0 {
            Err(io::Error::last_os_error())
        } else {
            Ok(ret as usize)
        }
    }
}

impl AsRawFd for HciSocket {
    fn as_raw_fd(&self) -> RawFd {
        self.fd.as_raw_fd()
    }
}

/// Split an LE Advertising Report event into its reports.
///
/// Other packets yield nothing. A report that runs past the end of the packet
/// ends parsing; the reports before it are kept.
fn parse_advertising_reports(packet: &[u8]) -> Vec<RawAdvertisement> {
    let mut reports = Vec::new();

    let is_report = packet.len() > REPORTS_OFFSET
        && packet[0] == HCI_EVENT_PKT
        && packet[1] == EVT_LE_META_EVENT
        && packet[3] == EVT_LE_ADVERTISING_REPORT;
    if !is_report {
        return reports;
    }

    let num_reports = packet[REPORTS_OFFSET];
    let mut rest = &packet[REPORTS_OFFSET + 1..];

    for _ in 0..num_reports {
        let Some(header) = rest.get(..REPORT_HEADER_LEN) else {
            break;
        };
        let data_len = usize::from(header[8]);
        let data_end = REPORT_HEADER_LEN + data_len;
        let (Some(data), Some(&rssi)) = (rest.get(REPORT_HEADER_LEN..data_end), rest.get(data_end)) else {
            break;
        };

        let mut address = [0u8; 6];
        address.copy_from_slice(&header[2..8]);

        reports.push(RawAdvertisement {
            mac: MacAddress::from_le_bytes(address),
            payload: Some(data.to_vec()),
            rssi: i16::from(i8::from_ne_bytes([rssi])),
        });
        rest = &rest[data_end + 1..];
    }

    reports
}

/// Start a passive scan on `hci0` using a raw HCI socket.
///
/// # Requirements
/// - CAP_NET_RAW and CAP_NET_ADMIN capabilities or root privileges
/// - An available HCI device (typically hci0)
pub async fn start_scan() -> Result<mpsc::Receiver<RawAdvertisement>, ScanError> {
    let socket = HciSocket::open(HCI_DEV_ID)?;
    socket.subscribe_le_meta_events()?;
    socket.start_passive_scan()?;

    let async_fd =
        AsyncFd::new(socket).map_err(|e| ScanError::Bluetooth(format!("Failed to create async fd: {e}")))?;

    let (tx, rx) = mpsc::channel(ADVERTISEMENT_CHANNEL_BUFFER_SIZE);

    tokio::spawn(async move {
        let mut buf = [0u8; MAX_EVENT_SIZE];

        'events: loop {
            let Ok(mut guard) = async_fd.readable().await else {
                break;
            };

            // Drain all available packets before waiting again
            loop {
                let n = match guard.try_io(|inner| inner.get_ref().read(&mut buf)) {
                    Ok(Ok(n)) if n > 0 => n,
                    Ok(Ok(_)) => break 'events,
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "HCI read failed");
                        break 'events;
                    }
                    Err(_would_block) => break,
                };

                for advertisement in parse_advertising_reports(&buf[..n]) {
                    if !forward(&tx, advertisement) {
                        break 'events;
                    }
                }
            }
        }

        tracing::debug!("HCI scan stopped");
    });

    Ok(rx)
}
