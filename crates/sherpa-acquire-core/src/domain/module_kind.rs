//! The kinds of native speech module a model can back.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Capability group a downloadable model serves.
///
/// This mirrors the native engine's own grouping (recognizer / detector /
/// synthesizer / spotter / enhancer) rather than any particular model
/// architecture, since a single `ModuleKind` may be satisfied by several
/// incompatible model families over time.
///
/// Every variant participates fully in acquisition (path resolution,
/// registry lookup, download/extract/verify). Only the first five have a
/// matching native capability trait in `sherpa-acquire-module`'s `engine`
/// module — the remainder (speaker ID/diarization/verification and the
/// other classifier-shaped kinds) have no binding code upstream to model a
/// streaming contract on, so acquisition treats them identically while
/// `SpeechModule` implementations are only provided for the first five.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModuleKind {
    /// Streaming or offline automatic speech recognition.
    #[serde(rename = "SpeechRecognition")]
    Asr,
    /// Voice activity detection.
    #[serde(rename = "VoiceActivityDetection")]
    Vad,
    /// Text-to-speech synthesis.
    #[serde(rename = "SpeechSynthesis")]
    Tts,
    /// Keyword spotting.
    #[serde(rename = "KeywordSpotting")]
    Kws,
    /// Speech enhancement / denoising.
    SpeechEnhancement,
    /// Speaker identification (closed-set "who is this").
    SpeakerIdentification,
    /// Speaker diarization ("who spoke when").
    SpeakerDiarization,
    /// Speaker verification (one-to-one "is this them").
    SpeakerVerification,
    /// Audio event / scene tagging.
    AudioTagging,
    /// Automatic punctuation restoration for ASR transcripts.
    AddPunctuation,
    /// Source separation (e.g. vocals/accompaniment splitting).
    SourceSeparation,
    /// Spoken language identification.
    SpokenLanguageIdentification,
}

impl ModuleKind {
    /// All known module kinds, in a stable order.
    pub const ALL: [Self; 12] = [
        Self::Asr,
        Self::Vad,
        Self::Tts,
        Self::Kws,
        Self::SpeechEnhancement,
        Self::SpeakerIdentification,
        Self::SpeakerDiarization,
        Self::SpeakerVerification,
        Self::AudioTagging,
        Self::AddPunctuation,
        Self::SourceSeparation,
        Self::SpokenLanguageIdentification,
    ];

    /// Module kinds with a defined native capability trait in
    /// `sherpa-acquire-module::engine` (see SPEC_FULL's resolution of the
    /// "`SpeakerDiarization` and related kinds" open question).
    pub const STREAMING_CAPABLE: [Self; 5] = [
        Self::Asr,
        Self::Vad,
        Self::Tts,
        Self::Kws,
        Self::SpeechEnhancement,
    ];

    /// The kebab-case directory segment this module kind occupies under the
    /// data root, e.g. `speech-enhancement`.
    #[must_use]
    pub const fn as_kebab(self) -> &'static str {
        match self {
            Self::Asr => "speech-recognition",
            Self::Vad => "voice-activity-detection",
            Self::Tts => "speech-synthesis",
            Self::Kws => "keyword-spotting",
            Self::SpeechEnhancement => "speech-enhancement",
            Self::SpeakerIdentification => "speaker-identification",
            Self::SpeakerDiarization => "speaker-diarization",
            Self::SpeakerVerification => "speaker-verification",
            Self::AudioTagging => "audio-tagging",
            Self::AddPunctuation => "add-punctuation",
            Self::SourceSeparation => "source-separation",
            Self::SpokenLanguageIdentification => "spoken-language-identification",
        }
    }

    /// Whether this kind has a native capability trait to drive a
    /// `SpeechModule` (see `STREAMING_CAPABLE`).
    #[must_use]
    pub const fn is_streaming_capable(self) -> bool {
        matches!(
            self,
            Self::Asr | Self::Vad | Self::Tts | Self::Kws | Self::SpeechEnhancement
        )
    }
}

impl fmt::Display for ModuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_kebab())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kebab_round_trips_through_all_variants() {
        for kind in ModuleKind::ALL {
            assert!(!kind.as_kebab().is_empty());
            assert_eq!(kind.to_string(), kind.as_kebab());
        }
    }

    #[test]
    fn speech_enhancement_is_hyphenated() {
        assert_eq!(ModuleKind::SpeechEnhancement.as_kebab(), "speech-enhancement");
    }

    #[test]
    fn kebab_segments_match_the_documented_filesystem_layout() {
        assert_eq!(ModuleKind::Asr.as_kebab(), "speech-recognition");
        assert_eq!(ModuleKind::Vad.as_kebab(), "voice-activity-detection");
        assert_eq!(ModuleKind::Tts.as_kebab(), "speech-synthesis");
        assert_eq!(ModuleKind::Kws.as_kebab(), "keyword-spotting");
    }

    #[test]
    fn serde_representation_matches_the_documented_module_type_names() {
        assert_eq!(
            serde_json::to_string(&ModuleKind::Asr).unwrap(),
            "\"SpeechRecognition\""
        );
        assert_eq!(
            serde_json::to_string(&ModuleKind::Vad).unwrap(),
            "\"VoiceActivityDetection\""
        );
        assert_eq!(
            serde_json::to_string(&ModuleKind::Tts).unwrap(),
            "\"SpeechSynthesis\""
        );
        assert_eq!(
            serde_json::to_string(&ModuleKind::Kws).unwrap(),
            "\"KeywordSpotting\""
        );
        assert_eq!(
            serde_json::to_string(&ModuleKind::SpeechEnhancement).unwrap(),
            "\"SpeechEnhancement\""
        );
    }

    #[test]
    fn streaming_capable_is_exactly_the_first_five() {
        for kind in ModuleKind::ALL {
            assert_eq!(
                kind.is_streaming_capable(),
                ModuleKind::STREAMING_CAPABLE.contains(&kind)
            );
        }
    }

    #[test]
    fn diarization_participates_in_acquisition_without_streaming() {
        assert!(!ModuleKind::SpeakerDiarization.is_streaming_capable());
        assert_eq!(ModuleKind::SpeakerDiarization.as_kebab(), "speaker-diarization");
    }
}
