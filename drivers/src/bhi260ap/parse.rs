//! FIFO frame decoding.
//!
//! A drained FIFO is a packed sequence of frames, each starting with a one
//! byte id followed by a payload whose size is fixed per id. System ids
//! (padding, timestamps, meta events, debug messages) have constant sizes;
//! virtual sensor sizes are read from the hub at init and kept in
//! [`EventSizes`]. Nothing here touches the bus.

use core::str;

use super::sensor::{
    EventSizes, SYS_ID_DEBUG_MSG, SYS_ID_FILLER, SYS_ID_META_EVENT, SYS_ID_META_EVENT_WU,
    SYS_ID_PADDING, SYS_ID_TS_FULL, SYS_ID_TS_FULL_WU, SYS_ID_TS_LARGE_DELTA,
    SYS_ID_TS_LARGE_DELTA_WU, SYS_ID_TS_SMALL_DELTA, SYS_ID_TS_SMALL_DELTA_WU,
};
use super::{HubError, MetaEvent, MetaEventType, SensorData};

/// One hub tick is 1/64000 s.
pub const TICK_NS: u64 = 15_625;

/// Longest payload of a debug message frame.
pub const DEBUG_MSG_MAX_LEN: usize = 16;

/// Running hub timestamp, advanced by the timestamp frames of one FIFO.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Timestamp {
    ticks: u64,
}

impl Timestamp {
    pub const fn new() -> Self {
        Self { ticks: 0 }
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn as_ns(&self) -> u64 {
        self.ticks.wrapping_mul(TICK_NS)
    }

    fn advance(&mut self, delta: u64) {
        self.ticks = self.ticks.wrapping_add(delta);
    }
}

/// A decoded frame, borrowed from the process buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame<'a> {
    /// Channel id: a virtual sensor id, a meta event id or the debug id.
    pub id: u8,
    /// Frame bytes after the id.
    pub payload: &'a [u8],
    pub timestamp_ns: u64,
}

impl<'a> Frame<'a> {
    pub fn is_meta_event(&self) -> bool {
        self.id == SYS_ID_META_EVENT || self.id == SYS_ID_META_EVENT_WU
    }

    pub fn is_debug_message(&self) -> bool {
        self.id == SYS_ID_DEBUG_MSG
    }

    /// Sensor data view of the frame. The payload is passed through as is.
    pub fn sensor_data(&self) -> SensorData<'a> {
        SensorData {
            sensor_id: self.id,
            data: self.payload,
            timestamp_ns: self.timestamp_ns,
        }
    }
}

/// Splits `buf` into frames and hands every meta, debug and data frame to
/// `sink`. Padding and timestamp frames are consumed here.
///
/// Returns the number of bytes consumed. A frame cut off at the end of `buf`
/// is left unconsumed so the caller can prepend it to the next chunk.
pub fn parse_fifo<F>(
    buf: &[u8],
    sizes: &EventSizes,
    timestamp: &mut Timestamp,
    mut sink: F,
) -> Result<usize, HubError>
where
    F: FnMut(&Frame<'_>),
{
    let mut offset = 0;
    while let Some(&id) = buf.get(offset) {
        let size = sizes.get(id).ok_or(HubError::InvalidFrame(id))?;
        let Some(raw) = buf.get(offset..offset + size) else {
            break;
        };
        let payload = &raw[1..];
        match id {
            SYS_ID_PADDING | SYS_ID_FILLER => {}
            SYS_ID_TS_SMALL_DELTA | SYS_ID_TS_SMALL_DELTA_WU => {
                timestamp.advance(u64::from(payload[0]));
            }
            SYS_ID_TS_LARGE_DELTA | SYS_ID_TS_LARGE_DELTA_WU => {
                timestamp.advance(u64::from(u16::from_le_bytes([payload[0], payload[1]])));
            }
            SYS_ID_TS_FULL | SYS_ID_TS_FULL_WU => {
                let mut ticks = [0u8; 8];
                ticks[..5].copy_from_slice(&payload[..5]);
                timestamp.ticks = u64::from_le_bytes(ticks);
            }
            _ => sink(&Frame {
                id,
                payload,
                timestamp_ns: timestamp.as_ns(),
            }),
        }
        offset += size;
    }
    Ok(offset)
}

/// Decodes a meta event frame and logs it.
///
/// A sensor status event stores its new accuracy (byte 2) in `accuracy`.
/// Returns `None` for frames that are not on a meta event channel and for
/// spacer events.
pub fn parse_meta_event(frame: &Frame<'_>, accuracy: &mut u8) -> Option<MetaEvent> {
    let wake_up = match frame.id {
        SYS_ID_META_EVENT => false,
        SYS_ID_META_EVENT_WU => true,
        _ => return None,
    };
    let &[event_type, byte1, byte2, ..] = frame.payload else {
        return None;
    };
    let tag = if wake_up {
        "[META EVENT WAKE UP]"
    } else {
        "[META EVENT]"
    };

    match MetaEventType::try_from(event_type) {
        Ok(MetaEventType::FlushComplete) => {
            info!("{} Flush complete for sensor id {}", tag, byte1)
        }
        Ok(MetaEventType::SampleRateChanged) => {
            info!("{} Sample rate changed for sensor id {}", tag, byte1)
        }
        Ok(MetaEventType::PowerModeChanged) => {
            info!("{} Power mode changed for sensor id {}", tag, byte1)
        }
        Ok(MetaEventType::SensorStatus) => {
            info!("{} Accuracy for sensor id {} changed to {}", tag, byte1, byte2);
            *accuracy = byte2;
        }
        Ok(MetaEventType::SensorError) => {
            info!("{} Sensor id {} reported error {:#x}", tag, byte1, byte2)
        }
        Ok(MetaEventType::DynamicRangeChanged) => {
            info!("{} Dynamic range changed for sensor id {}", tag, byte1)
        }
        Ok(MetaEventType::Initialized) => {
            let version = u16::from_le_bytes([byte1, byte2]);
            info!("{} Firmware initialized. Firmware version {}", tag, version)
        }
        Ok(MetaEventType::TransferCause) => {
            info!("{} Transfer cause for sensor id {}", tag, byte1)
        }
        Ok(MetaEventType::SensorFramework) => {
            info!("{} Sensor framework event for sensor id {}", tag, byte1)
        }
        Ok(MetaEventType::Spacer) => return None,
        Ok(
            kind @ (MetaEventType::AlgorithmEvents
            | MetaEventType::BsxDoStepsMain
            | MetaEventType::BsxDoStepsCalib
            | MetaEventType::BsxGetOutputSignal
            | MetaEventType::FifoOverflow
            | MetaEventType::FifoWatermark
            | MetaEventType::Reset),
        ) => info!("{} {}", tag, kind),
        Err(_) => info!("{} Unknown meta event with id: {}", tag, event_type),
    }

    Some(MetaEvent {
        event_type,
        byte1,
        byte2,
        wake_up,
    })
}

/// Text carried by a debug message frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DebugMessage {
    len: u8,
    bytes: [u8; DEBUG_MSG_MAX_LEN],
}

impl DebugMessage {
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.len as usize]
    }

    /// The message text, cut at the first invalid UTF-8 sequence.
    pub fn as_str(&self) -> &str {
        let bytes = self.as_bytes();
        match str::from_utf8(bytes) {
            Ok(text) => text,
            Err(e) => str::from_utf8(&bytes[..e.valid_up_to()]).unwrap_or_default(),
        }
    }

    pub fn len(&self) -> usize {
        self.len as usize
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// Decodes a debug message frame: a length byte followed by up to 16 bytes
/// of text. Lengths above 16 are clamped.
pub fn parse_debug_message(frame: &Frame<'_>) -> Option<DebugMessage> {
    if !frame.is_debug_message() {
        return None;
    }
    let (&declared, text) = frame.payload.split_first()?;
    let mut len = declared as usize;
    if len > DEBUG_MSG_MAX_LEN {
        warn!("Debug message length {} exceeds {}, truncated", declared, DEBUG_MSG_MAX_LEN);
        len = DEBUG_MSG_MAX_LEN;
    }
    let len = len.min(text.len());

    let mut bytes = [0u8; DEBUG_MSG_MAX_LEN];
    bytes[..len].copy_from_slice(&text[..len]);
    let message = DebugMessage {
        len: len as u8,
        bytes,
    };
    info!("[DEBUG MSG]: {}", message.as_str());
    Some(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bhi260ap::SensorId;
    use alloc::vec;
    use alloc::vec::Vec;

    fn sizes_with_acc() -> EventSizes {
        let mut sizes = EventSizes::new();
        sizes.set(SensorId::Acc.into(), 7);
        sizes
    }

    fn collect(buf: &[u8], sizes: &EventSizes, ts: &mut Timestamp) -> (usize, Vec<(u8, Vec<u8>, u64)>) {
        let mut frames = Vec::new();
        let used = parse_fifo(buf, sizes, ts, |f| {
            frames.push((f.id, f.payload.to_vec(), f.timestamp_ns))
        })
        .unwrap();
        (used, frames)
    }

    #[test]
    fn test_data_frame_payload_is_passed_through() {
        let sizes = sizes_with_acc();
        let mut ts = Timestamp::new();
        let buf = [4, 0x10, 0x00, 0xF0, 0xFF, 0x00, 0x10];
        let (used, frames) = collect(&buf, &sizes, &mut ts);
        assert_eq!(used, 7);
        assert_eq!(frames, vec![(4, vec![0x10, 0x00, 0xF0, 0xFF, 0x00, 0x10], 0)]);
    }

    #[test]
    fn test_timestamp_frames_advance_clock() {
        let sizes = sizes_with_acc();
        let mut ts = Timestamp::new();
        let buf = [
            SYS_ID_TS_FULL, 0x00, 0x01, 0x00, 0x00, 0x00, // 256 ticks
            SYS_ID_TS_SMALL_DELTA, 4,
            SYS_ID_TS_LARGE_DELTA, 0x00, 0x01,
            4, 1, 2, 3, 4, 5, 6,
        ];
        let (_, frames) = collect(&buf, &sizes, &mut ts);
        assert_eq!(ts.ticks(), 516);
        assert_eq!(frames[0].2, 516 * TICK_NS);
    }

    #[test]
    fn test_padding_is_skipped() {
        let sizes = sizes_with_acc();
        let mut ts = Timestamp::new();
        let buf = [0, 0, SYS_ID_FILLER, 4, 1, 2, 3, 4, 5, 6, 0];
        let (used, frames) = collect(&buf, &sizes, &mut ts);
        assert_eq!(used, buf.len());
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_trailing_partial_frame_is_left_for_next_chunk() {
        let sizes = sizes_with_acc();
        let mut ts = Timestamp::new();
        let buf = [4, 1, 2, 3, 4, 5, 6, 4, 1, 2];
        let (used, frames) = collect(&buf, &sizes, &mut ts);
        assert_eq!(used, 7);
        assert_eq!(frames.len(), 1);
    }

    #[test]
    fn test_unknown_frame_id_is_an_error() {
        let sizes = EventSizes::new();
        let mut ts = Timestamp::new();
        let result = parse_fifo(&[4, 1, 2], &sizes, &mut ts, |_| {});
        assert_eq!(result, Err(HubError::InvalidFrame(4)));
    }

    #[test]
    fn test_sensor_status_updates_accuracy() {
        let frame = Frame {
            id: SYS_ID_META_EVENT,
            payload: &[MetaEventType::SensorStatus.into(), 34, 3],
            timestamp_ns: 0,
        };
        let mut accuracy = 0;
        let event = parse_meta_event(&frame, &mut accuracy).unwrap();
        assert_eq!(accuracy, 3);
        assert_eq!(event.kind(), Some(MetaEventType::SensorStatus));
        assert_eq!(event.byte1, 34);
        assert!(!event.wake_up);
    }

    #[test]
    fn test_other_meta_events_leave_accuracy_alone() {
        let frame = Frame {
            id: SYS_ID_META_EVENT_WU,
            payload: &[MetaEventType::SampleRateChanged.into(), 4, 9],
            timestamp_ns: 0,
        };
        let mut accuracy = 2;
        let event = parse_meta_event(&frame, &mut accuracy).unwrap();
        assert_eq!(accuracy, 2);
        assert!(event.wake_up);
    }

    #[test]
    fn test_spacer_and_foreign_channels_are_ignored() {
        let mut accuracy = 0;
        let spacer = Frame {
            id: SYS_ID_META_EVENT,
            payload: &[MetaEventType::Spacer.into(), 0, 0],
            timestamp_ns: 0,
        };
        assert_eq!(parse_meta_event(&spacer, &mut accuracy), None);

        let data = Frame {
            id: 4,
            payload: &[MetaEventType::SensorStatus.into(), 4, 3],
            timestamp_ns: 0,
        };
        assert_eq!(parse_meta_event(&data, &mut accuracy), None);
        assert_eq!(accuracy, 0);
    }

    #[test]
    fn test_unknown_meta_event_is_reported() {
        let frame = Frame {
            id: SYS_ID_META_EVENT,
            payload: &[42, 1, 2],
            timestamp_ns: 0,
        };
        let mut accuracy = 0;
        let event = parse_meta_event(&frame, &mut accuracy).unwrap();
        assert_eq!(event.event_type, 42);
        assert_eq!(event.kind(), None);
    }

    #[test]
    fn test_debug_message_has_declared_length() {
        let mut payload = [0u8; 17];
        payload[0] = 5;
        payload[1..6].copy_from_slice(b"hello");
        payload[6..].fill(b'x');
        let frame = Frame {
            id: SYS_ID_DEBUG_MSG,
            payload: &payload,
            timestamp_ns: 0,
        };
        let message = parse_debug_message(&frame).unwrap();
        assert_eq!(message.as_str(), "hello");
        assert_eq!(message.len(), 5);
    }

    #[test]
    fn test_debug_message_length_is_clamped() {
        let mut payload = [b'a'; 17];
        payload[0] = 40;
        let frame = Frame {
            id: SYS_ID_DEBUG_MSG,
            payload: &payload,
            timestamp_ns: 0,
        };
        let message = parse_debug_message(&frame).unwrap();
        assert_eq!(message.len(), DEBUG_MSG_MAX_LEN);
        assert_eq!(message.as_str(), "aaaaaaaaaaaaaaaa");
    }

    #[test]
    fn test_debug_message_stops_at_invalid_utf8() {
        let mut payload = [0u8; 17];
        payload[0] = 4;
        payload[1..5].copy_from_slice(&[b'o', b'k', 0xFF, b'!']);
        let frame = Frame {
            id: SYS_ID_DEBUG_MSG,
            payload: &payload,
            timestamp_ns: 0,
        };
        let message = parse_debug_message(&frame).unwrap();
        assert_eq!(message.as_bytes().len(), 4);
        assert_eq!(message.as_str(), "ok");
    }
}
