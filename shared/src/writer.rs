//! Packet encoding with a back-patched length header

use crate::reader::{HEADER_LEN, STRING_MARKER};

/// Builds a single outbound packet
///
/// The header is written up front with a zero length; [`PacketWriter::finish`]
/// patches in the payload size once every field has been appended.
#[derive(Debug, Clone)]
pub struct PacketWriter {
    buf: Vec<u8>,
}

impl PacketWriter {
    /// Starts a packet with the given opcode
    pub fn new(id: impl Into<u16>) -> Self {
        let mut buf = Vec::with_capacity(HEADER_LEN + 16);
        buf.extend_from_slice(&id.into().to_le_bytes());
        buf.push(0);
        buf.extend_from_slice(&0u32.to_le_bytes());
        Self { buf }
    }

    /// Payload bytes written so far
    pub fn payload_len(&self) -> usize {
        self.buf.len() - HEADER_LEN
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i8(&mut self, value: i8) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bool(&mut self, value: bool) {
        self.buf.push(u8::from(value));
    }

    pub fn write_u16(&mut self, value: u16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_u64(&mut self, value: u64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_i64(&mut self, value: i64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_f64(&mut self, value: f64) {
        self.buf.extend_from_slice(&value.to_le_bytes());
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub fn write_uleb128(&mut self, mut value: u32) {
        loop {
            let byte = (value & 0x7F) as u8;
            value >>= 7;

            if value == 0 {
                self.buf.push(byte);
                return;
            }

            self.buf.push(byte | 0x80);
        }
    }

    /// Writes a bancho string; the empty string is a lone `0x00`
    pub fn write_string(&mut self, value: &str) {
        if value.is_empty() {
            self.buf.push(0x00);
            return;
        }

        self.buf.push(STRING_MARKER);
        self.write_uleb128(value.len() as u32);
        self.buf.extend_from_slice(value.as_bytes());
    }

    pub fn write_i32_list(&mut self, values: &[i32]) {
        self.write_u16(values.len() as u16);
        for value in values {
            self.write_i32(*value);
        }
    }

    /// Patches the length field and returns the encoded packet
    pub fn finish(mut self) -> Vec<u8> {
        let len = self.payload_len() as u32;
        self.buf[3..HEADER_LEN].copy_from_slice(&len.to_le_bytes());
        self.buf
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::{PacketReader, PacketStream};

    #[test]
    fn test_empty_packet_header() {
        let bytes = PacketWriter::new(8u16).finish();
        assert_eq!(bytes, vec![0x08, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00]);
    }

    #[test]
    fn test_length_is_backpatched() {
        let mut writer = PacketWriter::new(5u16);
        writer.write_i32(-1);
        writer.write_string("hi");
        let bytes = writer.finish();

        assert_eq!(&bytes[3..7], &8u32.to_le_bytes());
        assert_eq!(bytes.len(), HEADER_LEN + 8);
    }

    #[test]
    fn test_string_encoding() {
        let mut writer = PacketWriter::new(0u16);
        writer.write_string("");
        writer.write_string("abc");
        let bytes = writer.finish();

        assert_eq!(&bytes[HEADER_LEN..], &[0x00, 0x0B, 0x03, b'a', b'b', b'c']);
    }

    #[test]
    fn test_long_string_uses_multibyte_length() {
        let text = "x".repeat(200);
        let mut writer = PacketWriter::new(0u16);
        writer.write_string(&text);
        let bytes = writer.finish();

        assert_eq!(&bytes[HEADER_LEN..HEADER_LEN + 3], &[0x0B, 0xC8, 0x01]);

        let mut reader = PacketReader::new(&bytes[HEADER_LEN..]);
        assert_eq!(reader.read_string().unwrap(), text);
    }

    #[test]
    fn test_writer_output_frames_cleanly() {
        let mut first = PacketWriter::new(24u16);
        first.write_string("hello");
        let mut second = PacketWriter::new(72u16);
        second.write_i32_list(&[3, 4, 5]);

        let mut body = first.finish();
        body.extend(second.finish());

        let packets: Vec<_> = PacketStream::new(&body).map(|p| p.unwrap()).collect();
        assert_eq!(packets.len(), 2);
        assert_eq!(packets[0].id, 24);
        assert_eq!(packets[0].reader().read_string().unwrap(), "hello");
        assert_eq!(packets[1].id, 72);
        assert_eq!(packets[1].reader().read_i32_list().unwrap(), vec![3, 4, 5]);
    }
}
