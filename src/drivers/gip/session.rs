//! Per-client GIP state machine: inbound decode with acknowledgement,
//! outbound commands and the two sequence counters.

use std::error::Error;
use std::sync::Arc;

use packed_struct::prelude::*;
use packed_struct::types::SizedInteger;
use thiserror::Error;

use super::report::*;
use super::{
    PowerMode, CMD_ACKNOWLEDGE, CMD_ANNOUNCE, CMD_AUDIO_CONFIG, CMD_AUDIO_SAMPLES, CMD_GUIDE_BTN,
    CMD_INPUT, CMD_LED_MODE, CMD_POWER_MODE, CMD_RUMBLE, CMD_SERIAL_NUM, CMD_STATUS, TYPE_ACK,
    TYPE_COMMAND, TYPE_REQUEST,
};

/// Routes a serialised frame towards the radio. The closure captures the
/// client's WCID and address.
pub type SendPacket = Arc<dyn Fn(&[u8]) -> Result<(), Box<dyn Error + Send + Sync>> + Send + Sync>;

#[derive(Error, Debug)]
pub enum GipError {
    #[error("failed to send packet: {0}")]
    Send(#[source] Box<dyn Error + Send + Sync>),
    #[error("failed to pack frame: {0}")]
    Pack(PackingError),
}

/// Decoded inbound message, handed to the controller logic.
#[derive(Debug, Clone, PartialEq)]
pub enum GipMessage {
    Announce(AnnounceData),
    Status(StatusData),
    GuideButton(GuideButtonData),
    SerialNumber(SerialData),
    Input(InputData),
    AudioConfig(Vec<u8>),
    AudioSamples(Vec<u8>),
}

pub struct GipSession {
    sequence: u8,
    accessory_sequence: u8,
    send: SendPacket,
}

impl GipSession {
    pub fn new(send: SendPacket) -> Self {
        Self {
            sequence: 0x01,
            accessory_sequence: 0x01,
            send,
        }
    }

    /// Decodes one inbound frame, acknowledging it first when requested.
    /// Short frames, frames whose length field disagrees with the payload
    /// and unknown commands are dropped.
    pub fn handle_packet(&mut self, packet: &[u8]) -> Result<Option<GipMessage>, GipError> {
        if packet.len() < GIP_FRAME_SIZE {
            log::debug!("Dropping short frame of {} bytes", packet.len());

            return Ok(None);
        }

        let frame =
            GipFrame::unpack_from_slice(&packet[..GIP_FRAME_SIZE]).map_err(GipError::Pack)?;

        if frame.frame_type.to_primitive() & TYPE_ACK != 0 {
            // Not fatal to the stream, the controller retransmits
            if let Err(e) = self.acknowledge(&frame) {
                log::error!("Failed to acknowledge packet: {e}");
            }
        }

        let data = &packet[GIP_FRAME_SIZE..];
        let length = frame.length as usize;

        let message = match frame.command {
            CMD_ANNOUNCE if length == ANNOUNCE_DATA_SIZE && data.len() >= ANNOUNCE_DATA_SIZE => {
                let announce = AnnounceData::unpack_from_slice(&data[..ANNOUNCE_DATA_SIZE])
                    .map_err(GipError::Pack)?;

                Some(GipMessage::Announce(announce))
            }
            CMD_STATUS if length == STATUS_DATA_SIZE && data.len() >= STATUS_DATA_SIZE => {
                let status = StatusData::unpack_from_slice(&data[..STATUS_DATA_SIZE])
                    .map_err(GipError::Pack)?;

                Some(GipMessage::Status(status))
            }
            CMD_GUIDE_BTN
                if length == GUIDE_BUTTON_DATA_SIZE && data.len() >= GUIDE_BUTTON_DATA_SIZE =>
            {
                let button = GuideButtonData::unpack_from_slice(&data[..GUIDE_BUTTON_DATA_SIZE])
                    .map_err(GipError::Pack)?;

                Some(GipMessage::GuideButton(button))
            }
            CMD_SERIAL_NUM if length == SERIAL_DATA_SIZE && data.len() >= SERIAL_DATA_SIZE => {
                let serial = SerialData::unpack_from_slice(&data[..SERIAL_DATA_SIZE])
                    .map_err(GipError::Pack)?;

                Some(GipMessage::SerialNumber(serial))
            }
            // Elite controllers append the non-remapped input to the packet
            CMD_INPUT if length >= INPUT_DATA_SIZE && data.len() >= INPUT_DATA_SIZE => {
                let input = InputData::unpack_from_slice(&data[..INPUT_DATA_SIZE])
                    .map_err(GipError::Pack)?;

                Some(GipMessage::Input(input))
            }
            CMD_AUDIO_CONFIG => Some(GipMessage::AudioConfig(data.to_vec())),
            CMD_AUDIO_SAMPLES => Some(GipMessage::AudioSamples(data.to_vec())),
            _ => {
                // Unknown commands are ignored so that newer controller
                // generations keep working
                log::debug!("Ignoring unknown command {:#04x}", frame.command);

                None
            }
        };

        Ok(message)
    }

    pub fn set_power_mode(&mut self, id: u8, mode: PowerMode) -> Result<(), GipError> {
        let frame = GipFrame {
            command: CMD_POWER_MODE,
            frame_type: TYPE_REQUEST.into(),
            device_id: id.into(),
            sequence: self.next_sequence(),
            length: 1,
        };

        self.send_frame(&frame, &[mode as u8])
    }

    pub fn set_led_mode(&mut self, mode: super::LedMode, brightness: u8) -> Result<(), GipError> {
        let data = LedModeData {
            mode: mode as u8,
            brightness,
            ..Default::default()
        };

        let frame = GipFrame {
            command: CMD_LED_MODE,
            frame_type: TYPE_REQUEST.into(),
            device_id: 0.into(),
            sequence: self.next_sequence(),
            length: LED_MODE_DATA_SIZE as u8,
        };

        self.send_frame(&frame, &data.pack().map_err(GipError::Pack)?)
    }

    pub fn rumble(&mut self, rumble: &RumbleData) -> Result<(), GipError> {
        let frame = GipFrame {
            command: CMD_RUMBLE,
            frame_type: TYPE_COMMAND.into(),
            device_id: 0.into(),
            sequence: self.next_sequence(),
            length: RUMBLE_DATA_SIZE as u8,
        };

        self.send_frame(&frame, &rumble.pack().map_err(GipError::Pack)?)
    }

    pub fn request_serial_number(&mut self) -> Result<(), GipError> {
        let frame = GipFrame {
            command: CMD_SERIAL_NUM,
            frame_type: (TYPE_REQUEST | TYPE_ACK).into(),
            device_id: 0.into(),
            sequence: self.next_sequence(),
            length: 1,
        };

        // The purpose of other argument values is still to be discovered
        self.send_frame(&frame, &[0x04])
    }

    pub fn enable_audio(&mut self, id: u8) -> Result<(), GipError> {
        let frame = GipFrame {
            command: CMD_AUDIO_CONFIG,
            frame_type: TYPE_REQUEST.into(),
            device_id: id.into(),
            sequence: self.next_sequence(),
            length: 1,
        };

        self.send_frame(&frame, &[0x01])
    }

    pub fn send_audio_samples(&mut self, samples: &[u8]) -> Result<(), GipError> {
        let frame = GipFrame {
            command: CMD_AUDIO_SAMPLES,
            frame_type: TYPE_COMMAND.into(),
            device_id: 0.into(),
            sequence: self.next_accessory_sequence(),
            length: samples.len().min(0xff) as u8,
        };

        self.send_frame(&frame, samples)
    }

    /// Acknowledgement the controller expects: a header with the received
    /// sequence, one zero byte, the received header echoed back with its
    /// length moved into the sequence slot, then a 32-bit zero trailer.
    fn acknowledge(&mut self, frame: &GipFrame) -> Result<(), GipError> {
        let header = GipFrame {
            command: CMD_ACKNOWLEDGE,
            frame_type: TYPE_REQUEST.into(),
            device_id: frame.device_id,
            sequence: frame.sequence,
            length: (GIP_FRAME_SIZE + 5) as u8,
        };

        let echo = GipFrame {
            command: frame.command,
            frame_type: TYPE_REQUEST.into(),
            device_id: frame.device_id,
            sequence: frame.length,
            length: 0,
        };

        let mut out = Vec::with_capacity(GIP_FRAME_SIZE * 2 + 5);

        out.extend_from_slice(&header.pack().map_err(GipError::Pack)?);
        out.push(0);
        out.extend_from_slice(&echo.pack().map_err(GipError::Pack)?);
        out.extend_from_slice(&[0, 0, 0, 0]);

        (self.send)(&out).map_err(GipError::Send)
    }

    fn send_frame(&mut self, frame: &GipFrame, payload: &[u8]) -> Result<(), GipError> {
        let mut out = Vec::with_capacity(GIP_FRAME_SIZE + payload.len());

        out.extend_from_slice(&frame.pack().map_err(GipError::Pack)?);
        out.extend_from_slice(payload);

        (self.send)(&out).map_err(GipError::Send)
    }

    /// Main sequence counter: wraps modulo 256, zero is invalid and skipped.
    fn next_sequence(&mut self) -> u8 {
        if self.sequence == 0x00 {
            self.sequence = 0x01;
        }

        let sequence = self.sequence;

        self.sequence = self.sequence.wrapping_add(1);

        sequence
    }

    /// Separate counter for audio sample frames.
    fn next_accessory_sequence(&mut self) -> u8 {
        if self.accessory_sequence == 0x00 {
            self.accessory_sequence = 0x01;
        }

        let sequence = self.accessory_sequence;

        self.accessory_sequence = self.accessory_sequence.wrapping_add(1);

        sequence
    }
}

#[cfg(test)]
#[path = "session_test.rs"]
mod session_test;
