//! Dispatcher for the dongle's two bulk RX streams: demultiplexes firmware
//! events and 802.11 frames and maintains the wireless client table.

pub mod controller;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use crate::drivers::mt76::radio::{format_address, Mt76Radio, RadioError};
use crate::drivers::mt76::report::{
    RxInfoCommand, RxInfoGeneric, RxInfoPacket, RxWi, WlanFrame, QOS_FRAME_SIZE, RX_WI_SIZE,
    WLAN_FRAME_SIZE,
};
use crate::drivers::mt76::{
    DmaMsgPort, McuEventType, MT_EP_READ, MT_EP_READ_PACKET, MT_WCID_COUNT, MT_WLAN_ASSOC_REQ,
    MT_WLAN_DATA, MT_WLAN_DISASSOC, MT_WLAN_MGMT, MT_WLAN_QOS_DATA, MT_WLAN_RESERVED,
};
use crate::usb::{UsbTransport, MAX_BULK_TRANSFER_SIZE};

use controller::{Controller, ControllerError};

/// Microsoft's vendor id.
pub const DONGLE_VID: u16 = 0x045e;

/// Product ids for both versions of the dongle.
pub const DONGLE_PID_OLD: u16 = 0x02e6;
pub const DONGLE_PID_NEW: u16 = 0x02fe;

/// Product id for the Surface Book 2 built-in dongle.
pub const DONGLE_PID_SURFACE: u16 = 0x091e;

pub const SUPPORTED_DEVICES: [(u16, u16); 3] = [
    (DONGLE_VID, DONGLE_PID_OLD),
    (DONGLE_VID, DONGLE_PID_NEW),
    (DONGLE_VID, DONGLE_PID_SURFACE),
];

/// A message dequeued from one of the bulk endpoints.
#[derive(Debug, PartialEq, Eq)]
pub enum BulkEvent<'a> {
    /// The dongle's pairing button was pressed.
    ButtonPress,
    /// Connection to the client with this WCID was lost.
    ClientLost(u8),
    /// An 802.11 packet, starting with its receive info header.
    WlanPacket(&'a [u8]),
}

/// Tags a received bulk transfer by DMA port and event type.
pub fn classify_bulk(data: &[u8]) -> Option<BulkEvent<'_>> {
    if data.len() < 4 {
        log::error!("Invalid data received");

        return None;
    }

    let header: [u8; 4] = data[..4].try_into().unwrap();
    let generic = RxInfoGeneric::from_bytes(header);
    let packet = &data[4..];

    match DmaMsgPort::from_bits(generic.port()) {
        Some(DmaMsgPort::CpuRx) => {
            let info = RxInfoCommand::from_bytes(header);

            match McuEventType::from_bits(info.event_type()) {
                Some(McuEventType::PacketRx) => Some(BulkEvent::WlanPacket(packet)),
                Some(McuEventType::ClientLost) if !packet.is_empty() => {
                    Some(BulkEvent::ClientLost(packet[0]))
                }
                Some(McuEventType::ButtonPress) => Some(BulkEvent::ButtonPress),
                _ => None,
            }
        }
        Some(DmaMsgPort::Wlan) => {
            let info = RxInfoPacket::from_bytes(header);

            if info.is_802_11() {
                Some(BulkEvent::WlanPacket(packet))
            } else {
                None
            }
        }
        _ => None,
    }
}

/// A decoded 802.11 frame relevant to the access point.
#[derive(Debug, PartialEq, Eq)]
pub enum WlanEvent<'a> {
    AssociationRequest { source: [u8; 6] },
    Disassociation { wcid: u8 },
    PairingRequest { source: [u8; 6] },
    Data { wcid: u8, payload: &'a [u8] },
}

/// Decodes an 802.11 packet addressed to `address`. Short packets and
/// packets for other destinations are dropped.
pub fn parse_wlan(packet: &[u8], address: [u8; 6]) -> Option<WlanEvent<'_>> {
    if packet.len() < RX_WI_SIZE + WLAN_FRAME_SIZE {
        return None;
    }

    let rx_wi = RxWi::from_bytes(packet[..RX_WI_SIZE].try_into().unwrap());
    let frame = WlanFrame::from_bytes(&packet[RX_WI_SIZE..])?;

    if frame.destination != address {
        return None;
    }

    let frame_type = frame.frame_control.frame_type();
    let subtype = frame.frame_control.subtype();

    if frame_type == MT_WLAN_DATA && subtype == MT_WLAN_QOS_DATA {
        // Skip the QoS header, two bytes of padding and a four byte trailer
        let start = RX_WI_SIZE + WLAN_FRAME_SIZE + QOS_FRAME_SIZE + 2;
        let end = packet.len().checked_sub(4)?;

        if end < start {
            return None;
        }

        return Some(WlanEvent::Data {
            wcid: rx_wi.wcid(),
            payload: &packet[start..end],
        });
    }

    if frame_type != MT_WLAN_MGMT {
        return None;
    }

    match subtype {
        MT_WLAN_ASSOC_REQ => Some(WlanEvent::AssociationRequest {
            source: frame.source,
        }),
        // Kept for compatibility with 1537 controllers: they associate,
        // disassociate and associate again during pairing, without
        // triggering a client-lost event
        MT_WLAN_DISASSOC => Some(WlanEvent::Disassociation {
            wcid: rx_wi.wcid(),
        }),
        // Reserved frames serve multiple purposes, most of them still
        // unknown; type 0x01 is a pairing request
        MT_WLAN_RESERVED
            if packet.get(RX_WI_SIZE + WLAN_FRAME_SIZE + 1) == Some(&0x01) =>
        {
            Some(WlanEvent::PairingRequest {
                source: frame.source,
            })
        }
        _ => None,
    }
}

struct ClientSlot {
    controller: Arc<Mutex<Controller>>,
}

/// Owns the RX loops and the per-WCID client slots. Slot mutations and
/// lookups are serialised by one mutex; the data path drops it before
/// handing a packet to the client's protocol session.
pub struct Dongle {
    usb: Arc<UsbTransport>,
    radio: Arc<Mt76Radio>,
    slots: Mutex<[Option<ClientSlot>; MT_WCID_COUNT]>,
    pairing: AtomicBool,
    stop: Arc<AtomicBool>,
    threads: Mutex<Vec<JoinHandle<()>>>,
}

impl Dongle {
    pub fn new(usb: Arc<UsbTransport>, radio: Arc<Mt76Radio>) -> Arc<Self> {
        Arc::new(Self {
            usb,
            radio,
            slots: Mutex::new(Default::default()),
            pairing: AtomicBool::new(false),
            stop: Arc::new(AtomicBool::new(false)),
            threads: Mutex::new(Vec::new()),
        })
    }

    /// Spawns the two RX loops, one per bulk endpoint.
    pub fn start(self: &Arc<Self>) {
        let mut threads = self.threads.lock().unwrap();

        for endpoint in [MT_EP_READ, MT_EP_READ_PACKET] {
            let dongle = self.clone();

            threads.push(thread::spawn(move || dongle.read_bulk_packets(endpoint)));
        }
    }

    /// Stops the RX loops and powers down all connected controllers.
    pub fn shutdown(&self) {
        self.stop.store(true, Ordering::SeqCst);

        for thread in self.threads.lock().unwrap().drain(..) {
            let _ = thread.join();
        }

        for slot in self.slots.lock().unwrap().iter_mut() {
            *slot = None;
        }
    }

    /// Flips pairing mode, driven by the pairing signal.
    pub fn toggle_pairing(&self) {
        let enable = !self.pairing.load(Ordering::SeqCst);

        if let Err(e) = self.set_pairing(enable) {
            log::error!("Failed to set pairing status: {e}");
        }
    }

    fn set_pairing(&self, enable: bool) -> Result<(), RadioError> {
        self.radio.set_pairing(enable)?;
        self.pairing.store(enable, Ordering::SeqCst);

        Ok(())
    }

    fn read_bulk_packets(&self, endpoint: u8) {
        let mut buffer = [0u8; MAX_BULK_TRANSFER_SIZE];

        while !self.stop.load(Ordering::SeqCst) {
            match self.usb.bulk_read(endpoint, &mut buffer) {
                // The transport has already signalled termination
                Err(_) => break,
                // Read timeout
                Ok(0) => {}
                Ok(count) => self.handle_bulk_data(&buffer[..count]),
            }
        }
    }

    fn handle_bulk_data(&self, data: &[u8]) {
        match classify_bulk(data) {
            Some(BulkEvent::ButtonPress) => {
                if let Err(e) = self.set_pairing(true) {
                    log::error!("Failed to initiate pairing: {e}");
                }
            }
            Some(BulkEvent::ClientLost(wcid)) => self.handle_client_disconnect(wcid),
            Some(BulkEvent::WlanPacket(packet)) => self.handle_wlan_packet(packet),
            None => {}
        }
    }

    fn handle_wlan_packet(&self, packet: &[u8]) {
        match parse_wlan(packet, self.radio.mac_address()) {
            Some(WlanEvent::AssociationRequest { source }) => self.handle_client_connect(source),
            Some(WlanEvent::Disassociation { wcid }) => self.handle_client_disconnect(wcid),
            Some(WlanEvent::PairingRequest { source }) => self.handle_client_pair(source),
            Some(WlanEvent::Data { wcid, payload }) => self.handle_client_packet(wcid, payload),
            None => {}
        }
    }

    fn handle_client_connect(&self, address: [u8; 6]) {
        let mut slots = self.slots.lock().unwrap();

        let wcid = match self.radio.associate_client(address) {
            Ok(wcid) => wcid.get(),
            Err(e) => {
                log::error!("Failed to associate client: {e}");

                return;
            }
        };

        let controller = Controller::new(self.radio.clone(), wcid, address);

        slots[wcid as usize - 1] = Some(ClientSlot {
            controller: Arc::new(Mutex::new(controller)),
        });

        log::info!("Controller '{wcid}' connected");
    }

    fn handle_client_disconnect(&self, wcid: u8) {
        if wcid == 0 || wcid as usize > MT_WCID_COUNT {
            return;
        }

        let mut slots = self.slots.lock().unwrap();

        if let Err(e) = self.radio.remove_client(wcid) {
            log::error!("Failed to remove client: {e}");

            return;
        }

        // Releasing twice is a no-op
        if slots[wcid as usize - 1].take().is_some() {
            log::info!("Controller '{wcid}' disconnected");
        }
    }

    fn handle_client_pair(&self, source: [u8; 6]) {
        if let Err(e) = self.radio.pair_client(source) {
            log::error!("Failed to pair client: {e}");

            return;
        }

        log::debug!("Controller paired: {}", format_address(&source));

        // The pairing exchange is done, return the beacon and LED to normal
        if let Err(e) = self.set_pairing(false) {
            log::error!("Failed to leave pairing mode: {e}");
        }
    }

    fn handle_client_packet(&self, wcid: u8, payload: &[u8]) {
        let controller = {
            let slots = self.slots.lock().unwrap();

            match wcid as usize {
                1..=MT_WCID_COUNT => slots[wcid as usize - 1]
                    .as_ref()
                    .map(|slot| slot.controller.clone()),
                _ => None,
            }
        };

        let Some(controller) = controller else {
            log::warn!("Packet for unconnected controller '{wcid}'");

            return;
        };

        let result = controller.lock().unwrap().handle_packet(payload);

        match result {
            Ok(()) => {}
            // A broken input device takes down only this client
            Err(ControllerError::Input(e)) => {
                log::error!("Input device failed for controller '{wcid}': {e}");

                self.handle_client_disconnect(wcid);
            }
            Err(e) => {
                log::error!("Error handling packet for controller '{wcid}': {e}");
            }
        }
    }
}

#[cfg(test)]
mod mod_test;
