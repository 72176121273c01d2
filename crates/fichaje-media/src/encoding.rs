//! Audio encoding negotiation.
//!
//! The candidate list is configuration data, not protocol: devices pick
//! the first entry they can produce, and the file extension of an upload
//! is derived from whatever was negotiated.

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioEncoding {
    /// Content type, possibly with a codec parameter
    /// (e.g. `audio/webm;codecs=opus`).
    pub mime: String,
}

impl AudioEncoding {
    pub fn new(mime: impl Into<String>) -> Self {
        Self { mime: mime.into() }
    }

    /// File extension for uploaded blobs of this encoding.
    pub fn extension(&self) -> &'static str {
        let mime = self.mime.as_str();
        if mime.contains("ogg") {
            "ogg"
        } else if mime.contains("mp4") {
            "mp4"
        } else if mime.contains("mpeg") || mime.contains("mp3") {
            "mp3"
        } else if mime.contains("wav") {
            "wav"
        } else {
            "webm"
        }
    }
}

/// Ordered encoding candidates.
#[derive(Debug, Clone)]
pub struct EncodingPrefs {
    pub candidates: Vec<String>,
    /// Used when no candidate is supported.
    pub fallback: String,
}

impl Default for EncodingPrefs {
    fn default() -> Self {
        Self {
            candidates: vec![
                "audio/webm;codecs=opus".to_string(),
                "audio/ogg;codecs=opus".to_string(),
                "audio/mp4".to_string(),
                "audio/mpeg".to_string(),
                "audio/wav".to_string(),
            ],
            fallback: "audio/webm".to_string(),
        }
    }
}

impl EncodingPrefs {
    /// First candidate the device supports, or the fallback.
    pub fn negotiate(&self, supports: impl Fn(&str) -> bool) -> AudioEncoding {
        self.candidates
            .iter()
            .find(|mime| supports(mime))
            .map(AudioEncoding::new)
            .unwrap_or_else(|| AudioEncoding::new(&self.fallback))
    }
}

/// Wrap raw 16-bit little-endian PCM samples in a WAV container.
pub fn wrap_pcm_wav(pcm: &[u8], sample_rate: u32, channels: u16) -> Vec<u8> {
    let data_len = pcm.len() as u32;
    let byte_rate = sample_rate * u32::from(channels) * 2;
    let block_align = channels * 2;

    let mut out = Vec::with_capacity(44 + pcm.len());
    out.extend_from_slice(b"RIFF");
    out.extend_from_slice(&(36 + data_len).to_le_bytes());
    out.extend_from_slice(b"WAVE");
    out.extend_from_slice(b"fmt ");
    out.extend_from_slice(&16u32.to_le_bytes());
    out.extend_from_slice(&1u16.to_le_bytes()); // PCM
    out.extend_from_slice(&channels.to_le_bytes());
    out.extend_from_slice(&sample_rate.to_le_bytes());
    out.extend_from_slice(&byte_rate.to_le_bytes());
    out.extend_from_slice(&block_align.to_le_bytes());
    out.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    out.extend_from_slice(b"data");
    out.extend_from_slice(&data_len.to_le_bytes());
    out.extend_from_slice(pcm);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negotiation_picks_the_first_supported_candidate() {
        let prefs = EncodingPrefs::default();

        let opus = prefs.negotiate(|_| true);
        assert_eq!(opus.mime, "audio/webm;codecs=opus");

        let mp4_only = prefs.negotiate(|mime| mime == "audio/mp4");
        assert_eq!(mp4_only.mime, "audio/mp4");

        let nothing = prefs.negotiate(|_| false);
        assert_eq!(nothing.mime, "audio/webm");
    }

    #[test]
    fn extensions_follow_the_negotiated_mime() {
        assert_eq!(AudioEncoding::new("audio/ogg;codecs=opus").extension(), "ogg");
        assert_eq!(AudioEncoding::new("audio/mp4").extension(), "mp4");
        assert_eq!(AudioEncoding::new("audio/mpeg").extension(), "mp3");
        assert_eq!(AudioEncoding::new("audio/mp3").extension(), "mp3");
        assert_eq!(AudioEncoding::new("audio/wav").extension(), "wav");
        assert_eq!(AudioEncoding::new("audio/webm;codecs=opus").extension(), "webm");
    }

    #[test]
    fn wav_header_describes_the_payload() {
        let pcm = [0u8; 320];
        let wav = wrap_pcm_wav(&pcm, 16_000, 1);

        assert_eq!(&wav[0..4], b"RIFF");
        assert_eq!(&wav[8..12], b"WAVE");
        assert_eq!(wav.len(), 44 + pcm.len());
        // Data chunk length sits in the last header word.
        assert_eq!(u32::from_le_bytes(wav[40..44].try_into().unwrap()), 320);
        // Sample rate field.
        assert_eq!(u32::from_le_bytes(wav[24..28].try_into().unwrap()), 16_000);
    }
}
