pub mod firmware;
pub mod radio;
pub mod registers;
pub mod report;

/// Endpoint for MCU events and commands.
pub const MT_EP_READ: u8 = 5;
/// Endpoint for 802.11 packets in WLAN port mode.
pub const MT_EP_READ_PACKET: u8 = 4;
pub const MT_EP_WRITE: u8 = 4;

/// Maximum number of wireless clients. WCID 0 is reserved for beacons.
pub const MT_WCID_COUNT: usize = 16;

/* WLAN frame types */
pub const MT_WLAN_MGMT: u8 = 0x00;
pub const MT_WLAN_DATA: u8 = 0x02;

/* WLAN frame subtypes */
pub const MT_WLAN_ASSOC_REQ: u8 = 0x00;
pub const MT_WLAN_ASSOC_RESP: u8 = 0x01;
pub const MT_WLAN_RESERVED: u8 = 0x07;
pub const MT_WLAN_BEACON: u8 = 0x08;
pub const MT_WLAN_DISASSOC: u8 = 0x0a;
pub const MT_WLAN_QOS_DATA: u8 = 0x08;

/// Queue selectors for transmitted packets.
#[derive(Debug, Clone, Copy)]
pub enum Qsel {
    Mgmt = 0,
    Hcca = 1,
    Edca = 2,
    Edca2 = 3,
}

#[derive(Debug, Clone, Copy)]
pub enum PhyType {
    Cck = 0,
    Ofdm = 1,
    Ht = 2,
    HtGf = 3,
    Vht = 4,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LedMode {
    Blink = 0,
    On = 1,
    Off = 2,
}

/// Events produced by the dongle's firmware on the command endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum McuEventType {
    /// The dongle's pairing button was pressed.
    ButtonPress = 0x04,
    /// A packet arrived from a client.
    PacketRx = 0x0c,
    /// Connection to a client was lost.
    ClientLost = 0x0e,
}

impl McuEventType {
    pub fn from_bits(value: u8) -> Option<Self> {
        match value {
            0x04 => Some(Self::ButtonPress),
            0x0c => Some(Self::PacketRx),
            0x0e => Some(Self::ClientLost),
            _ => None,
        }
    }
}

/// Commands specific to the dongle's firmware, wrapped in
/// [`McuCommand::InternalFwOp`].
#[derive(Debug, Clone, Copy)]
pub enum McuFwCommand {
    MacAddressSet = 0,
    ClientAdd = 1,
    ClientRemove = 2,
    ChannelCandidatesSet = 7,
}

#[derive(Debug, Clone, Copy)]
pub enum McuChannelBandwidth {
    Bw20 = 0,
    Bw40 = 1,
    Bw80 = 2,
}

#[derive(Debug, Clone, Copy)]
pub enum McuCalibration {
    R = 1,
    TempSensor = 2,
    Rxdcoc = 3,
    Rc = 4,
}

#[derive(Debug, Clone, Copy)]
pub enum McuPowerMode {
    RadioOff = 0x30,
    RadioOn = 0x31,
}

#[derive(Debug, Clone, Copy)]
pub enum McuCrMode {
    RfCr = 0,
    BbpCr = 1,
    RfBbpCr = 2,
    HlTempCrUpdate = 3,
}

#[derive(Debug, Clone, Copy)]
pub enum McuFunction {
    QSelect = 1,
    BwSetting = 2,
}

#[derive(Debug, Clone, Copy)]
pub enum McuCommand {
    /// Transmits a packet to a client.
    PacketTx = 0,
    FunSetOp = 1,
    LoadCr = 2,
    /// Sends an internal command to the firmware.
    InternalFwOp = 3,
    BurstWrite = 8,
    LedModeOp = 16,
    PowerSavingOp = 20,
    SwitchChannelOp = 30,
    CalibrationOp = 31,
    BeaconOp = 32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxInfoType {
    NormalPacket = 0,
    CmdPacket = 1,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DmaMsgPort {
    Wlan = 0,
    CpuRx = 1,
    CpuTx = 2,
    CpuHost = 3,
    VirtualCpuRx = 4,
    VirtualCpuTx = 5,
    Discard = 6,
}

impl DmaMsgPort {
    pub fn from_bits(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Wlan),
            1 => Some(Self::CpuRx),
            2 => Some(Self::CpuTx),
            3 => Some(Self::CpuHost),
            4 => Some(Self::VirtualCpuRx),
            5 => Some(Self::VirtualCpuTx),
            6 => Some(Self::Discard),
            _ => None,
        }
    }
}

/// Vendor control requests understood by the chip.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VendorRequest {
    DevMode = 0x01,
    Write = 0x02,
    MultiWrite = 0x06,
    MultiRead = 0x07,
    WriteCfg = 0x46,
    ReadCfg = 0x47,
}
