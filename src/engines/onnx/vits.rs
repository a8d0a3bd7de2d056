use std::path::Path;

use ort::session::Session;

use super::model::{init_session, input_names, run_waveform, token_feed, EngineError};

/// Single-stage VITS-family model (Piper, MMS, MeloTTS): tokens in, waveform out.
pub struct VitsModel {
    session: Session,
    inputs: Vec<String>,
}

impl VitsModel {
    pub fn load(model: &Path, num_threads: Option<usize>) -> Result<Self, EngineError> {
        let session = init_session(model, num_threads)?;
        let inputs = input_names(&session);
        log::info!("VITS inputs: {inputs:?}");
        Ok(Self { session, inputs })
    }

    pub fn is_multispeaker(&self) -> bool {
        self.inputs
            .iter()
            .any(|name| matches!(name.as_str(), "sid" | "speaker_id" | "speaker"))
    }

    /// Synthesize one framed token sequence. Speed is applied as
    /// `length_scale = 1 / speed`; `tones` is used by graphs with a tone input.
    pub fn generate(
        &mut self,
        tokens: &[i64],
        tones: &[i64],
        speed: f32,
        speaker: usize,
    ) -> Result<Vec<f32>, EngineError> {
        let feed = token_feed(
            &self.inputs,
            tokens,
            tones,
            length_scale(speed),
            speaker as i64,
        )?;
        run_waveform(&mut self.session, feed)
    }
}

pub(crate) fn length_scale(speed: f32) -> f32 {
    if speed.is_finite() && speed > 0.0 {
        1.0 / speed
    } else {
        1.0
    }
}

#[cfg(test)]
mod tests {
    use super::length_scale;

    #[test]
    fn length_scale_inverts_speed() {
        assert_eq!(length_scale(1.0), 1.0);
        assert_eq!(length_scale(2.0), 0.5);
        assert!((length_scale(0.8) - 1.25).abs() < 1e-6);
    }

    #[test]
    fn invalid_speed_falls_back_to_natural_pace() {
        assert_eq!(length_scale(0.0), 1.0);
        assert_eq!(length_scale(-1.0), 1.0);
        assert_eq!(length_scale(f32::NAN), 1.0);
    }
}
