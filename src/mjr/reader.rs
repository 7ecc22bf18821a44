//! MJR track reader

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::rtp::RtpHeader;

use super::format::{self, MjrInfo, LEGACY_HEADER_LEN, MIN_RTP_LEN, RECORD_HEADER_LEN};
use super::MjrError;

/// One RTP frame record located inside the file.
#[derive(Debug, Clone, Copy)]
pub struct PacketRecord {
    /// Byte offset of the RTP packet within the file.
    pub offset: u64,
    /// Length of the RTP packet.
    pub len: u16,
    /// Parsed RTP fixed header.
    pub header: RtpHeader,
}

/// Random-access reader over one track of a recording.
#[derive(Debug)]
pub struct MjrReader {
    file: File,
    size: u64,
    info: MjrInfo,
}

impl MjrReader {
    /// Open a track file and parse its header record.
    ///
    /// Handles both the current (`MJ` info header) and the legacy
    /// (`MEETECHO` + `"video"`/`"audio"`) formats.
    pub fn open(dir: &Path, filename: &str) -> Result<Self, MjrError> {
        let path = format::resolve_path(dir, filename);
        let mut file = File::open(&path)?;
        let size = file.metadata()?.len();

        let mut tag = [0u8; 8];
        read_at(&mut file, 0, &mut tag)?;
        if tag[0] != b'M' {
            return Err(MjrError::InvalidHeader);
        }

        let mut len_buf = [0u8; 2];
        read_at(&mut file, 8, &mut len_buf)?;
        let len = u16::from_be_bytes(len_buf);

        let info = match tag[1] {
            b'E' => {
                // Legacy format: the opening record must be the 5-byte
                // "video"/"audio" header.
                if len != LEGACY_HEADER_LEN {
                    return Err(MjrError::InvalidHeader);
                }
                let mut media = [0u8; LEGACY_HEADER_LEN as usize];
                read_at(&mut file, RECORD_HEADER_LEN, &mut media)?;
                MjrInfo::legacy(media[0])?
            }
            b'J' => {
                if len == 0 {
                    return Err(MjrError::InvalidHeader);
                }
                let mut payload = vec![0u8; len as usize];
                read_at(&mut file, RECORD_HEADER_LEN, &mut payload)?;
                MjrInfo::from_json(&payload)?
            }
            _ => return Err(MjrError::InvalidHeader),
        };

        tracing::debug!(
            path = %path.display(),
            kind = %info.kind,
            codec = info.codec,
            size,
            "Opened MJR reader"
        );

        Ok(Self { file, size, info })
    }

    /// The parsed info header.
    pub fn info(&self) -> &MjrInfo {
        &self.info
    }

    /// Total file size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Walk the whole file and collect every RTP frame record in file
    /// order.
    ///
    /// Header and side-data records (`MJ` tags after the header, payloads
    /// shorter than an RTP header) are skipped. A truncated trailing record
    /// ends the walk with a warning rather than an error.
    pub fn scan(&mut self) -> Result<Vec<PacketRecord>, MjrError> {
        let mut records = Vec::new();
        let mut offset: u64 = 0;

        while offset + RECORD_HEADER_LEN <= self.size {
            let mut tag = [0u8; 8];
            read_at(&mut self.file, offset, &mut tag)?;
            if tag[0] != b'M' || (tag[1] != b'E' && tag[1] != b'J') {
                return Err(MjrError::InvalidHeader);
            }

            let mut len_buf = [0u8; 2];
            read_at(&mut self.file, offset + 8, &mut len_buf)?;
            let len = u16::from_be_bytes(len_buf);
            offset += RECORD_HEADER_LEN;

            // Info header, side-data, or the legacy media header: not RTP.
            if tag[1] == b'J' || len < MIN_RTP_LEN {
                offset += len as u64;
                continue;
            }

            if offset + len as u64 > self.size {
                tracing::warn!(offset, len, "Truncated frame record, stopping scan");
                break;
            }

            let mut header_buf = [0u8; MIN_RTP_LEN as usize];
            read_at(&mut self.file, offset, &mut header_buf)?;
            // Length is >= 12, so the fixed header always parses.
            let header = RtpHeader::parse(&header_buf).ok_or(MjrError::InvalidHeader)?;

            records.push(PacketRecord { offset, len, header });
            offset += len as u64;
        }

        Ok(records)
    }

    /// Read one packet's bytes into `buf` (resized to fit).
    pub fn read_payload(&mut self, offset: u64, len: u16, buf: &mut Vec<u8>) -> Result<(), MjrError> {
        buf.resize(len as usize, 0);
        read_at(&mut self.file, offset, buf)?;
        Ok(())
    }
}

fn read_at(file: &mut File, offset: u64, buf: &mut [u8]) -> Result<(), MjrError> {
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::MediaKind;
    use crate::mjr::writer::MjrWriter;
    use crate::rtp;

    fn write_track(dir: &Path, name: &str, packets: &[Vec<u8>]) {
        let mut writer = MjrWriter::create(dir, MediaKind::Audio, "opus", name).unwrap();
        for p in packets {
            writer.save_frame(p).unwrap();
        }
        writer.close().unwrap();
    }

    #[test]
    fn test_open_parses_info() {
        let dir = tempfile::tempdir().unwrap();
        write_track(dir.path(), "meta", &[]);

        let reader = MjrReader::open(dir.path(), "meta").unwrap();
        assert_eq!(reader.info().kind, MediaKind::Audio);
        assert_eq!(reader.info().codec, "opus");
    }

    #[test]
    fn test_scan_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let packets: Vec<Vec<u8>> = (0..5u16)
            .map(|i| rtp::build_packet(111, i, 960 * i as u32, 0x42, &[i as u8; 40]))
            .collect();
        write_track(dir.path(), "roundtrip", &packets);

        let mut reader = MjrReader::open(dir.path(), "roundtrip").unwrap();
        let records = reader.scan().unwrap();
        assert_eq!(records.len(), packets.len());

        let mut buf = Vec::new();
        for (record, original) in records.iter().zip(&packets) {
            assert_eq!(record.len as usize, original.len());
            reader.read_payload(record.offset, record.len, &mut buf).unwrap();
            assert_eq!(&buf, original);
        }
    }

    #[test]
    fn test_scan_skips_short_records() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "short").unwrap();
        writer.save_frame(&[0u8; 4]).unwrap(); // shorter than an RTP header
        writer.save_frame(&rtp::build_packet(111, 1, 960, 0x42, &[1; 10])).unwrap();
        writer.close().unwrap();

        let mut reader = MjrReader::open(dir.path(), "short").unwrap();
        let records = reader.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header.sequence, 1);
    }

    #[test]
    fn test_open_legacy_format() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(format::FRAME_TAG);
        data.extend_from_slice(&5u16.to_be_bytes());
        data.extend_from_slice(b"video");
        let packet = rtp::build_packet(96, 7, 3000, 0x42, &[9; 16]);
        data.extend_from_slice(format::FRAME_TAG);
        data.extend_from_slice(&(packet.len() as u16).to_be_bytes());
        data.extend_from_slice(&packet);
        std::fs::write(dir.path().join("legacy.mjr"), &data).unwrap();

        let mut reader = MjrReader::open(dir.path(), "legacy").unwrap();
        assert_eq!(reader.info().kind, MediaKind::Video);
        assert_eq!(reader.info().codec, "vp8");

        let records = reader.scan().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].header.sequence, 7);
        assert_eq!(records[0].header.timestamp, 3000);
    }

    #[test]
    fn test_open_invalid_magic() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.mjr"), b"XXR00002\x00\x02{}").unwrap();

        let err = MjrReader::open(dir.path(), "bad").unwrap_err();
        assert!(matches!(err, MjrError::InvalidHeader));
    }

    #[test]
    fn test_open_bad_info_json() {
        let dir = tempfile::tempdir().unwrap();
        let mut data = Vec::new();
        data.extend_from_slice(format::INFO_TAG);
        data.extend_from_slice(&7u16.to_be_bytes());
        data.extend_from_slice(b"not {}!");
        std::fs::write(dir.path().join("badjson.mjr"), &data).unwrap();

        let err = MjrReader::open(dir.path(), "badjson").unwrap_err();
        assert!(matches!(err, MjrError::InvalidJson(_)));
    }

    #[test]
    fn test_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = MjrReader::open(dir.path(), "nope").unwrap_err();
        assert!(matches!(err, MjrError::Io(_)));
    }

    #[test]
    fn test_truncated_trailing_record() {
        let dir = tempfile::tempdir().unwrap();
        write_track(
            dir.path(),
            "trunc",
            &[rtp::build_packet(111, 1, 960, 0x42, &[1; 40])],
        );
        // Claim a longer record than the file holds.
        let path = dir.path().join("trunc.mjr");
        let mut data = std::fs::read(&path).unwrap();
        data.extend_from_slice(format::FRAME_TAG);
        data.extend_from_slice(&100u16.to_be_bytes());
        data.extend_from_slice(&[0u8; 20]);
        std::fs::write(&path, &data).unwrap();

        let mut reader = MjrReader::open(dir.path(), "trunc").unwrap();
        let records = reader.scan().unwrap();
        assert_eq!(records.len(), 1);
    }
}
