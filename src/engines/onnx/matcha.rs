use std::path::Path;

use ort::session::{Session, SessionInputs};
use ort::value::Tensor;

use super::model::{init_session, input_names, run_waveform, token_feed, EngineError, Feed};
use super::vits::length_scale;

/// Two-stage model: an acoustic model predicts a mel spectrogram and a
/// separate vocoder turns it into a waveform.
pub struct MatchaModel {
    acoustic: Session,
    acoustic_inputs: Vec<String>,
    vocoder: Session,
    vocoder_input: String,
}

impl MatchaModel {
    pub fn load(
        acoustic_model: &Path,
        vocoder: &Path,
        num_threads: Option<usize>,
    ) -> Result<Self, EngineError> {
        let acoustic = init_session(acoustic_model, num_threads)?;
        let acoustic_inputs = input_names(&acoustic);
        let vocoder = init_session(vocoder, num_threads)?;
        let vocoder_input = input_names(&vocoder)
            .into_iter()
            .next()
            .ok_or_else(|| EngineError::Config("vocoder declares no inputs".to_string()))?;
        log::info!("Acoustic inputs: {acoustic_inputs:?}, vocoder input: '{vocoder_input}'");

        Ok(Self {
            acoustic,
            acoustic_inputs,
            vocoder,
            vocoder_input,
        })
    }

    pub fn generate(
        &mut self,
        tokens: &[i64],
        speed: f32,
        speaker: usize,
    ) -> Result<Vec<f32>, EngineError> {
        let feed = token_feed(
            &self.acoustic_inputs,
            tokens,
            &[],
            length_scale(speed),
            speaker as i64,
        )?;

        let mel = {
            let outputs = self.acoustic.run(SessionInputs::from(feed))?;
            let (_, first) = outputs.iter().next().ok_or(EngineError::EmptyOutput)?;
            let mel = first.try_extract_array::<f32>()?.to_owned();
            mel
        };
        log::debug!("Mel spectrogram shape {:?}", mel.shape());

        let mut feed = Feed::new();
        feed.insert(self.vocoder_input.clone(), Tensor::from_array(mel)?.into());
        run_waveform(&mut self.vocoder, feed)
    }
}
