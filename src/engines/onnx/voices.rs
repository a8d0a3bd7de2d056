use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::model::EngineError;

/// Style vector dimension of embedding models.
pub const STYLE_DIM: usize = 256;

/// Style vectors per speaker in a raw `voices.bin`, one per token count.
pub const STYLE_ROWS: usize = 510;

/// Style vectors of every speaker of an embedding model.
///
/// Each speaker has a list of style vectors; the index into the list is the
/// phoneme token count, which keeps prosody consistent across chunk sizes.
/// Two file layouts are read:
/// - raw little-endian f32 of shape `[speakers, 510, 256]` (`voices.bin`)
/// - a numpy `.npz` archive with one `[N, 256]` array per speaker
#[derive(Debug, Clone)]
pub struct VoiceStore {
    names: Vec<String>,
    speakers: Vec<Vec<[f32; STYLE_DIM]>>,
}

impl VoiceStore {
    pub fn load(path: &Path) -> Result<Self, EngineError> {
        let mut data = Vec::new();
        File::open(path)?.read_to_end(&mut data)?;
        let store = if data.starts_with(b"PK") {
            Self::from_npz(std::io::Cursor::new(data))?
        } else {
            Self::from_raw(&data)?
        };
        log::info!(
            "Loaded {} speakers from {}",
            store.num_speakers(),
            path.display()
        );
        Ok(store)
    }

    pub fn from_raw(data: &[u8]) -> Result<Self, EngineError> {
        let floats = le_floats(data, "voices.bin")?;
        let per_speaker = STYLE_ROWS * STYLE_DIM;
        if floats.is_empty() || floats.len() % per_speaker != 0 {
            return Err(EngineError::VoiceParse(format!(
                "voices.bin: {} floats is not a whole number of {STYLE_ROWS}x{STYLE_DIM} speakers",
                floats.len()
            )));
        }

        let speakers: Vec<Vec<[f32; STYLE_DIM]>> = floats
            .chunks_exact(per_speaker)
            .map(to_style_vectors)
            .collect();
        let names = (0..speakers.len()).map(|i| format!("speaker_{i}")).collect();
        Ok(Self { names, speakers })
    }

    /// Load every `.npy` entry of a numpy zip archive, in name order.
    pub fn from_npz<R: std::io::Read + std::io::Seek>(reader: R) -> Result<Self, EngineError> {
        let mut zip = zip::ZipArchive::new(reader)
            .map_err(|e| EngineError::VoiceParse(format!("Failed to open zip archive: {e}")))?;

        let mut voices = Vec::new();
        for i in 0..zip.len() {
            let mut entry = zip.by_index(i).map_err(|e| {
                EngineError::VoiceParse(format!("Failed to read zip entry {i}: {e}"))
            })?;

            let raw_name = entry.name().to_string();
            let voice_name = raw_name
                .trim_end_matches('/')
                .trim_end_matches(".npy")
                .to_string();

            if voice_name.is_empty() || raw_name.ends_with('/') {
                continue;
            }

            let mut data = Vec::new();
            entry
                .read_to_end(&mut data)
                .map_err(|e| EngineError::VoiceParse(format!("Failed to read {raw_name}: {e}")))?;

            voices.push((voice_name, parse_npy(&data, &raw_name)?));
        }

        if voices.is_empty() {
            return Err(EngineError::VoiceParse("voice archive is empty".to_string()));
        }
        voices.sort_by(|a, b| a.0.cmp(&b.0));
        let (names, speakers) = voices.into_iter().unzip();
        Ok(Self { names, speakers })
    }

    /// Style vector for `speaker` at token count `idx`.
    ///
    /// Both indices are clamped to the valid range, so any value is safe.
    pub fn get_style(&self, speaker: usize, idx: usize) -> &[f32; STYLE_DIM] {
        let speaker = speaker.min(self.speakers.len().saturating_sub(1));
        let styles = &self.speakers[speaker];
        &styles[idx.min(styles.len().saturating_sub(1))]
    }

    pub fn num_speakers(&self) -> usize {
        self.speakers.len()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }
}

fn le_floats(data: &[u8], name: &str) -> Result<Vec<f32>, EngineError> {
    if data.len() % 4 != 0 {
        return Err(EngineError::VoiceParse(format!(
            "{name}: float data length {} is not a multiple of 4",
            data.len()
        )));
    }
    Ok(data
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect())
}

fn to_style_vectors(floats: &[f32]) -> Vec<[f32; STYLE_DIM]> {
    floats
        .chunks_exact(STYLE_DIM)
        .map(|row| {
            let mut vec = [0f32; STYLE_DIM];
            vec.copy_from_slice(row);
            vec
        })
        .collect()
}

/// Parse a numpy .npy file into a list of style vectors.
///
/// Expects a float32 array whose element count is a multiple of 256, in
/// little-endian format.
fn parse_npy(data: &[u8], name: &str) -> Result<Vec<[f32; STYLE_DIM]>, EngineError> {
    if data.len() < 10 {
        return Err(EngineError::VoiceParse(format!(
            "{name}: file too short ({} bytes)",
            data.len()
        )));
    }

    if &data[0..6] != b"\x93NUMPY" {
        return Err(EngineError::VoiceParse(format!(
            "{name}: invalid numpy magic bytes"
        )));
    }

    // major version at [6], minor at [7], header_len at [8..10] (little-endian u16)
    let header_len = u16::from_le_bytes([data[8], data[9]]) as usize;
    let data_offset = 10 + header_len;

    if data.len() < data_offset {
        return Err(EngineError::VoiceParse(format!(
            "{name}: header truncated (need {data_offset} bytes, got {})",
            data.len()
        )));
    }

    let floats = le_floats(&data[data_offset..], name)?;
    if floats.is_empty() || floats.len() % STYLE_DIM != 0 {
        return Err(EngineError::VoiceParse(format!(
            "{name}: float count {} is not a multiple of {STYLE_DIM} (style vector dim)",
            floats.len()
        )));
    }

    Ok(to_style_vectors(&floats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};

    fn raw_speakers(count: usize) -> Vec<u8> {
        let mut bytes = Vec::new();
        for speaker in 0..count {
            for row in 0..STYLE_ROWS {
                for _ in 0..STYLE_DIM {
                    let value = speaker as f32 * 1000.0 + row as f32;
                    bytes.extend_from_slice(&value.to_le_bytes());
                }
            }
        }
        bytes
    }

    fn npy(rows: usize, fill: f32) -> Vec<u8> {
        let header = b"{'descr': '<f4', 'fortran_order': False, 'shape': (1, 256), }\n";
        let mut data = b"\x93NUMPY\x01\x00".to_vec();
        data.extend_from_slice(&(header.len() as u16).to_le_bytes());
        data.extend_from_slice(header);
        for _ in 0..rows * STYLE_DIM {
            data.extend_from_slice(&fill.to_le_bytes());
        }
        data
    }

    #[test]
    fn raw_layout_splits_speakers_and_rows() {
        let store = VoiceStore::from_raw(&raw_speakers(2)).unwrap();
        assert_eq!(store.num_speakers(), 2);
        assert_eq!(store.get_style(0, 3)[0], 3.0);
        assert_eq!(store.get_style(1, 7)[STYLE_DIM - 1], 1007.0);
        assert_eq!(store.names(), &["speaker_0".to_string(), "speaker_1".to_string()]);
    }

    #[test]
    fn indices_are_clamped() {
        let store = VoiceStore::from_raw(&raw_speakers(2)).unwrap();
        assert_eq!(store.get_style(9, 0)[0], 1000.0);
        assert_eq!(store.get_style(0, 10_000)[0], (STYLE_ROWS - 1) as f32);
    }

    #[test]
    fn raw_layout_rejects_partial_speakers() {
        let mut bytes = raw_speakers(1);
        bytes.truncate(bytes.len() - 4);
        assert!(matches!(
            VoiceStore::from_raw(&bytes),
            Err(EngineError::VoiceParse(_))
        ));
    }

    #[test]
    fn npz_layout_loads_named_speakers_sorted() {
        let mut buf = Cursor::new(Vec::new());
        {
            let mut zip = zip::ZipWriter::new(&mut buf);
            let options = zip::write::SimpleFileOptions::default()
                .compression_method(zip::CompressionMethod::Stored);
            zip.start_file("bf_emma.npy", options).unwrap();
            zip.write_all(&npy(2, 0.5)).unwrap();
            zip.start_file("af_heart.npy", options).unwrap();
            zip.write_all(&npy(3, 0.25)).unwrap();
            zip.finish().unwrap();
        }
        buf.set_position(0);

        let store = VoiceStore::from_npz(buf).unwrap();
        assert_eq!(store.names(), &["af_heart".to_string(), "bf_emma".to_string()]);
        assert_eq!(store.get_style(0, 99)[0], 0.25);
        assert_eq!(store.get_style(1, 0)[10], 0.5);
    }

    #[test]
    fn load_detects_layout_from_file_contents() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("voices.bin");
        std::fs::write(&path, raw_speakers(1)).unwrap();
        assert_eq!(VoiceStore::load(&path).unwrap().num_speakers(), 1);
    }

    #[test]
    fn rejects_bad_npy_magic() {
        let err = parse_npy(b"NOTNUMPY\x00\x00", "x.npy").unwrap_err();
        assert!(err.to_string().contains("magic"));
    }
}
