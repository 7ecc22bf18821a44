//! MJR track writer

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use crate::codec::MediaKind;

use super::format::{self, FRAME_TAG, INFO_TAG};
use super::MjrError;

/// Append-only writer for one track of a recording.
///
/// Creating the writer atomically creates the target file and emits the
/// info header; each call to [`save_frame`](MjrWriter::save_frame) appends
/// one frame record holding a raw RTP packet. Writers are independent per
/// track; serialization of concurrent saves is the caller's concern.
#[derive(Debug)]
pub struct MjrWriter {
    file: Option<BufWriter<File>>,
    filename: String,
    kind: MediaKind,
    codec: String,
}

impl MjrWriter {
    /// Create the target file and write the info header.
    ///
    /// Fails if the file already exists.
    pub fn create(dir: &Path, kind: MediaKind, codec: &str, filename: &str) -> Result<Self, MjrError> {
        let path = format::resolve_path(dir, filename);
        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)?;
        let mut file = BufWriter::new(file);

        let now = unix_micros();
        let info = format::info_json(kind, codec, now, now);
        write_record(&mut file, INFO_TAG, &info)?;
        file.flush()?;

        tracing::debug!(path = %path.display(), %kind, codec, "Opened MJR writer");

        Ok(Self {
            file: Some(file),
            filename: filename.to_string(),
            kind,
            codec: codec.to_string(),
        })
    }

    /// Append one RTP packet as a frame record.
    pub fn save_frame(&mut self, packet: &[u8]) -> Result<(), MjrError> {
        if packet.is_empty() {
            return Ok(());
        }
        if packet.len() > u16::MAX as usize {
            return Err(MjrError::FrameTooLarge(packet.len()));
        }
        let file = self.file.as_mut().ok_or(MjrError::Sealed)?;
        write_record(file, FRAME_TAG, packet)?;
        Ok(())
    }

    /// Flush and seal the writer. Further frames are rejected.
    pub fn close(&mut self) -> Result<(), MjrError> {
        if let Some(mut file) = self.file.take() {
            file.flush()?;
            file.get_ref().sync_all()?;
        }
        Ok(())
    }

    /// Whether the writer has been sealed.
    pub fn is_sealed(&self) -> bool {
        self.file.is_none()
    }

    /// The track filename (without directory).
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The track's media kind.
    pub fn kind(&self) -> MediaKind {
        self.kind
    }

    /// The negotiated codec recorded in the info header.
    pub fn codec(&self) -> &str {
        &self.codec
    }
}

impl Drop for MjrWriter {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(filename = %self.filename, error = %e, "Error sealing MJR writer");
        }
    }
}

fn write_record(file: &mut BufWriter<File>, tag: &[u8; 8], payload: &[u8]) -> Result<(), MjrError> {
    file.write_all(tag)?;
    file.write_all(&(payload.len() as u16).to_be_bytes())?;
    file.write_all(payload)?;
    Ok(())
}

fn unix_micros() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_micros() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rtp;

    #[test]
    fn test_create_writes_info_header() {
        let dir = tempfile::tempdir().unwrap();
        let writer = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "test-audio").unwrap();
        drop(writer);

        let data = std::fs::read(dir.path().join("test-audio.mjr")).unwrap();
        assert_eq!(&data[0..8], INFO_TAG);

        let len = u16::from_be_bytes([data[8], data[9]]) as usize;
        let info: serde_json::Value = serde_json::from_slice(&data[10..10 + len]).unwrap();
        assert_eq!(info["t"], "a");
        assert_eq!(info["c"], "opus");
        assert!(info["s"].as_i64().unwrap() > 0);
        assert!(info["u"].as_i64().unwrap() > 0);
    }

    #[test]
    fn test_create_refuses_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let _writer = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "dup-audio").unwrap();

        let err = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "dup-audio").unwrap_err();
        assert!(matches!(err, MjrError::Io(_)));
    }

    #[test]
    fn test_save_frame_appends_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MjrWriter::create(dir.path(), MediaKind::Video, "vp8", "frames").unwrap();

        let packet = rtp::build_packet(96, 1, 1000, 0x11, &[0xAA; 20]);
        writer.save_frame(&packet).unwrap();
        writer.close().unwrap();

        let data = std::fs::read(dir.path().join("frames.mjr")).unwrap();
        let header_len = 10 + u16::from_be_bytes([data[8], data[9]]) as usize;
        assert_eq!(&data[header_len..header_len + 8], FRAME_TAG);
        let frame_len =
            u16::from_be_bytes([data[header_len + 8], data[header_len + 9]]) as usize;
        assert_eq!(frame_len, packet.len());
        assert_eq!(&data[header_len + 10..header_len + 10 + frame_len], &packet[..]);
    }

    #[test]
    fn test_sealed_writer_rejects_frames() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "sealed").unwrap();
        writer.close().unwrap();

        assert!(writer.is_sealed());
        let err = writer.save_frame(&[0u8; 20]).unwrap_err();
        assert!(matches!(err, MjrError::Sealed));
    }

    #[test]
    fn test_close_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mut writer = MjrWriter::create(dir.path(), MediaKind::Audio, "opus", "twice").unwrap();
        writer.close().unwrap();
        writer.close().unwrap();
    }
}
