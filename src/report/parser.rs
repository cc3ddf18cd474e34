//! Bit-exact decoding of the standard precision-touchpad report layout.
//!
//! Layout: one report-id byte, then [`SLOT_COUNT`] slots of [`SLOT_LEN`]
//! bytes, then tail bytes we do not interpret. Per slot:
//!
//! ```text
//! byte 0      flags (bit 0 = tip switch, bit 2 = confidence)
//! byte 1      contact id
//! bytes 2-3   x, little endian
//! bytes 4-5   y, little endian
//! byte 6      pressure
//! bytes 7-8   scan time / phase
//! ```
//!
//! The parser decodes every slot as-is. It never filters contacts; the
//! decoder profile decides what counts as populated.

use super::{Frame, ReportError, TouchContact};

/// Touch data report id.
pub const REPORT_ID_TOUCH: u8 = 0x05;

pub const SLOT_COUNT: usize = 5;
pub const SLOT_LEN: usize = 9;

/// Minimum recognized report length: id byte plus five slots.
pub const MIN_REPORT_LEN: usize = 1 + SLOT_COUNT * SLOT_LEN;

const FLAG_TIP: u8 = 1 << 0;
const FLAG_CONFIDENCE: u8 = 1 << 2;

/// Decode `buf` into `frame`, replacing its contact list. The frame's
/// timestamp and side are left untouched; the caller stamps those from the
/// transport. No heap allocation.
pub fn parse_report(buf: &[u8], frame: &mut Frame) -> Result<(), ReportError> {
    if buf.len() < MIN_REPORT_LEN {
        return Err(ReportError::ShortBuffer {
            len: buf.len(),
            need: MIN_REPORT_LEN,
        });
    }
    if buf[0] != REPORT_ID_TOUCH {
        return Err(ReportError::UnknownReportId(buf[0]));
    }

    frame.contacts.clear();
    for i in 0..SLOT_COUNT {
        let s = &buf[1 + i * SLOT_LEN..1 + (i + 1) * SLOT_LEN];
        frame.contacts.push(TouchContact {
            id: u32::from(s[1]),
            x: u16::from_le_bytes([s[2], s[3]]),
            y: u16::from_le_bytes([s[4], s[5]]),
            tip: s[0] & FLAG_TIP != 0,
            confidence: s[0] & FLAG_CONFIDENCE != 0,
            pressure: s[6],
            phase: s[7],
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Side;

    fn slot(flags: u8, id: u8, x: u16, y: u16, pressure: u8, phase: u8) -> [u8; SLOT_LEN] {
        let xb = x.to_le_bytes();
        let yb = y.to_le_bytes();
        [flags, id, xb[0], xb[1], yb[0], yb[1], pressure, phase, 0]
    }

    fn report(slots: &[[u8; SLOT_LEN]]) -> Vec<u8> {
        let mut buf = vec![REPORT_ID_TOUCH];
        for s in slots {
            buf.extend_from_slice(s);
        }
        while buf.len() < MIN_REPORT_LEN {
            buf.push(0);
        }
        buf
    }

    #[test]
    fn decodes_all_slot_fields() {
        let buf = report(&[slot(0b101, 3, 1234, 5678, 42, 7)]);
        let mut frame = Frame::new(Side::Left);
        parse_report(&buf, &mut frame).unwrap();

        assert_eq!(frame.contacts.len(), SLOT_COUNT);
        let c = frame.contacts[0];
        assert_eq!(c.id, 3);
        assert_eq!(c.x, 1234);
        assert_eq!(c.y, 5678);
        assert!(c.tip);
        assert!(c.confidence);
        assert_eq!(c.pressure, 42);
        assert_eq!(c.phase, 7);
    }

    #[test]
    fn tip_and_confidence_bits_independent() {
        let buf = report(&[slot(0b001, 0, 0, 0, 0, 0), slot(0b100, 1, 0, 0, 0, 0)]);
        let mut frame = Frame::new(Side::Left);
        parse_report(&buf, &mut frame).unwrap();
        assert!(frame.contacts[0].tip && !frame.contacts[0].confidence);
        assert!(!frame.contacts[1].tip && frame.contacts[1].confidence);
    }

    #[test]
    fn short_buffer_is_rejected() {
        let mut frame = Frame::new(Side::Right);
        let err = parse_report(&[REPORT_ID_TOUCH; 45], &mut frame).unwrap_err();
        assert_eq!(err, ReportError::ShortBuffer { len: 45, need: 46 });
    }

    #[test]
    fn wrong_report_id_is_rejected() {
        let mut buf = report(&[]);
        buf[0] = 0x01;
        let mut frame = Frame::new(Side::Right);
        assert_eq!(
            parse_report(&buf, &mut frame),
            Err(ReportError::UnknownReportId(0x01))
        );
    }

    #[test]
    fn reuses_frame_storage() {
        let buf = report(&[slot(1, 0, 10, 10, 0, 0)]);
        let mut frame = Frame::new(Side::Left);
        parse_report(&buf, &mut frame).unwrap();
        parse_report(&buf, &mut frame).unwrap();
        assert_eq!(frame.contacts.len(), SLOT_COUNT);
        assert!(!frame.contacts.spilled());
    }
}
