//! Enrolled voice profile stored as JSON next to `settings.toml`.

use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::voiceprint::{self, VOICEPRINT_DIMS};
use super::{SpeakerVerifier, Verification, VerifyError};
use crate::audio::AudioBuffer;
use crate::config::{AppPaths, VoiceAuthConfig};

/// The averaged voiceprint of the enrolment recordings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VoiceProfile {
    pub voiceprint: Vec<f32>,
    /// Recordings that went into the average.
    pub samples: usize,
    pub enrolled_at: DateTime<Utc>,
}

impl VoiceProfile {
    /// Average the voiceprints of `recordings`.
    pub fn from_recordings(recordings: &[AudioBuffer]) -> Result<Self, VerifyError> {
        let prints = recordings
            .iter()
            .map(voiceprint::compute_voiceprint)
            .collect::<Result<Vec<_>, _>>()?;
        let voiceprint = voiceprint::average(&prints)
            .ok_or_else(|| VerifyError::Engine("no recordings to enrol".into()))?;
        Ok(Self {
            voiceprint,
            samples: prints.len(),
            enrolled_at: Utc::now(),
        })
    }

    pub fn load(path: &Path) -> Result<Self, VerifyError> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| VerifyError::Profile(format!("{}: {e}", path.display())))?;
        let profile: Self = serde_json::from_str(&text)
            .map_err(|e| VerifyError::Profile(format!("{}: {e}", path.display())))?;
        if profile.voiceprint.len() != VOICEPRINT_DIMS {
            return Err(VerifyError::Profile(format!(
                "{}: voiceprint has {} values, expected {VOICEPRINT_DIMS}",
                path.display(),
                profile.voiceprint.len()
            )));
        }
        Ok(profile)
    }

    pub fn save(&self, path: &Path) -> Result<(), VerifyError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| VerifyError::Profile(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| VerifyError::Profile(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| VerifyError::Profile(format!("{}: {e}", path.display())))
    }
}

// ---------------------------------------------------------------------------
// ProfileVerifier
// ---------------------------------------------------------------------------

/// [`SpeakerVerifier`] backed by a [`VoiceProfile`] file.
///
/// A missing or unreadable file means "not enrolled", so commands are
/// accepted from anyone until [`ProfileVerifier::enroll`] succeeds.
pub struct ProfileVerifier {
    path: PathBuf,
    threshold: f32,
    profile: RwLock<Option<VoiceProfile>>,
}

impl ProfileVerifier {
    /// Open the profile at `path`, if there is one.
    pub fn open(path: impl Into<PathBuf>, threshold: f32) -> Self {
        let path = path.into();
        let profile = if path.exists() {
            match VoiceProfile::load(&path) {
                Ok(profile) => {
                    log::info!("auth: voice profile loaded from {}", path.display());
                    Some(profile)
                }
                Err(e) => {
                    log::warn!("auth: ignoring voice profile: {e}");
                    None
                }
            }
        } else {
            None
        };
        Self {
            path,
            threshold,
            profile: RwLock::new(profile),
        }
    }

    /// Profile path from `voice_auth.profile_file`, relative to the config dir.
    pub fn from_config(config: &VoiceAuthConfig, paths: &AppPaths) -> Self {
        Self::open(paths.resolve(&config.profile_file), config.threshold)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Build a profile from `recordings`, save it and start verifying with it.
    pub fn enroll(&self, recordings: &[AudioBuffer]) -> Result<VoiceProfile, VerifyError> {
        let profile = VoiceProfile::from_recordings(recordings)?;
        profile.save(&self.path)?;
        log::info!(
            "auth: enrolled voice from {} recordings into {}",
            profile.samples,
            self.path.display()
        );
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = Some(profile.clone());
        Ok(profile)
    }

    /// Remove the stored profile.  Verification is skipped afterwards.
    pub fn delete(&self) -> Result<(), VerifyError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                return Err(VerifyError::Profile(format!("{}: {e}", self.path.display())))
            }
        }
        *self.profile.write().unwrap_or_else(PoisonError::into_inner) = None;
        Ok(())
    }
}

impl SpeakerVerifier for ProfileVerifier {
    fn has_profile(&self) -> bool {
        self.profile
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn verify(&self, audio: &AudioBuffer) -> Result<Verification, VerifyError> {
        let guard = self.profile.read().unwrap_or_else(PoisonError::into_inner);
        let profile = guard
            .as_ref()
            .ok_or_else(|| VerifyError::Profile("no voice profile enrolled".into()))?;

        let print = voiceprint::compute_voiceprint(audio)?;
        let score = voiceprint::similarity(&profile.voiceprint, &print)
            .ok_or_else(|| VerifyError::Engine("voiceprint size mismatch".into()))?;
        let verdict = Verification::from_score(score, self.threshold);
        log::debug!(
            "auth: similarity {score:.2} (threshold {:.2}) → {}",
            self.threshold,
            if verdict.accepted { "accepted" } else { "rejected" }
        );
        Ok(verdict)
    }
}
