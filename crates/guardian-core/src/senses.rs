//! Optional capabilities — camera, microphone, voice, image synthesis.
//!
//! Each is an explicit handle that may be absent. The guardian checks
//! `is_available()` before every use and treats a missing or unavailable
//! capability as a no-op.

use std::sync::Arc;

use tracing::{debug, warn};

pub trait Camera: Send + Sync {
    fn is_available(&self) -> bool;
    /// Whether a frame could be captured.
    fn capture_frame(&self) -> bool;
}

pub trait Microphone: Send + Sync {
    fn is_available(&self) -> bool;
    /// One buffer of 16-bit samples, or `None` if nothing could be read.
    fn capture(&self) -> Option<Vec<i16>>;
}

pub trait Voice: Send + Sync {
    fn is_available(&self) -> bool;
    fn speak(&self, text: &str) -> anyhow::Result<()>;
}

pub trait ImageSynth: Send + Sync {
    fn is_available(&self) -> bool;
    fn render(&self, prompt: &str) -> anyhow::Result<()>;
}

/// What the senses picked up this cycle. `None` means the sense is absent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SensoryReading {
    pub visual_activity: Option<bool>,
    pub audio_detected: Option<bool>,
}

#[derive(Clone, Default)]
pub struct Capabilities {
    pub camera: Option<Arc<dyn Camera>>,
    pub microphone: Option<Arc<dyn Microphone>>,
    pub voice: Option<Arc<dyn Voice>>,
    pub image: Option<Arc<dyn ImageSynth>>,
}

impl Capabilities {
    /// No optional capabilities at all.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_camera(mut self, camera: Arc<dyn Camera>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn with_microphone(mut self, microphone: Arc<dyn Microphone>) -> Self {
        self.microphone = Some(microphone);
        self
    }

    pub fn with_voice(mut self, voice: Arc<dyn Voice>) -> Self {
        self.voice = Some(voice);
        self
    }

    pub fn with_image(mut self, image: Arc<dyn ImageSynth>) -> Self {
        self.image = Some(image);
        self
    }

    /// Poll camera and microphone. May block on device I/O.
    pub fn sense(&self) -> SensoryReading {
        let visual_activity = self
            .camera
            .as_ref()
            .filter(|c| c.is_available())
            .map(|c| c.capture_frame());
        let audio_detected = self
            .microphone
            .as_ref()
            .filter(|m| m.is_available())
            .map(|m| m.capture().is_some_and(|buf| buf.iter().any(|s| *s != 0)));
        SensoryReading {
            visual_activity,
            audio_detected,
        }
    }

    pub fn speak(&self, text: &str) {
        if let Some(voice) = self.voice.as_ref().filter(|v| v.is_available()) {
            if let Err(e) = voice.speak(text) {
                warn!("Voice output failed: {}", e);
            }
        }
    }

    pub fn render_dream(&self, fragment: &str) {
        if let Some(image) = self.image.as_ref().filter(|i| i.is_available()) {
            debug!("Rendering dream image for: {}", fragment);
            if let Err(e) = image.render(fragment) {
                warn!("Dream image generation failed: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for Capabilities {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Capabilities")
            .field("camera", &self.camera.is_some())
            .field("microphone", &self.microphone.is_some())
            .field("voice", &self.voice.is_some())
            .field("image", &self.image.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct StubCamera {
        available: bool,
        sees: bool,
    }

    impl Camera for StubCamera {
        fn is_available(&self) -> bool {
            self.available
        }
        fn capture_frame(&self) -> bool {
            self.sees
        }
    }

    struct SilentMic;

    impl Microphone for SilentMic {
        fn is_available(&self) -> bool {
            true
        }
        fn capture(&self) -> Option<Vec<i16>> {
            Some(vec![0; 1024])
        }
    }

    #[derive(Default)]
    struct RecordingVoice {
        spoken: Mutex<Vec<String>>,
    }

    impl Voice for RecordingVoice {
        fn is_available(&self) -> bool {
            true
        }
        fn speak(&self, text: &str) -> anyhow::Result<()> {
            self.spoken.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[test]
    fn test_no_capabilities_senses_nothing() {
        assert_eq!(Capabilities::none().sense(), SensoryReading::default());
    }

    #[test]
    fn test_unavailable_camera_is_skipped() {
        let caps = Capabilities::none().with_camera(Arc::new(StubCamera {
            available: false,
            sees: true,
        }));
        assert_eq!(caps.sense().visual_activity, None);
    }

    #[test]
    fn test_camera_and_silent_microphone() {
        let caps = Capabilities::none()
            .with_camera(Arc::new(StubCamera {
                available: true,
                sees: true,
            }))
            .with_microphone(Arc::new(SilentMic));
        let reading = caps.sense();
        assert_eq!(reading.visual_activity, Some(true));
        assert_eq!(reading.audio_detected, Some(false));
    }

    #[test]
    fn test_speak_reaches_voice() {
        let voice = Arc::new(RecordingVoice::default());
        let caps = Capabilities::none().with_voice(voice.clone());
        caps.speak("hello");
        assert_eq!(*voice.spoken.lock().unwrap(), vec!["hello".to_string()]);
    }
}
