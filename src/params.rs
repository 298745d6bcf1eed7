//! Generation parameters forwarded to the model on every call.

use serde::Serialize;

/// Knobs for one synthesis call.
///
/// Defaults match the settings the service has always shipped with: beam
/// search with three beams and a heavy repetition penalty, which keeps
/// IndexTTS from looping on short prompts.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationParams {
    pub do_sample: bool,
    pub temperature: f32,
    pub top_p: f32,
    /// `0` means unset.
    pub top_k: u32,
    pub num_beams: u32,
    pub repetition_penalty: f32,
    pub length_penalty: f32,
    pub max_mel_tokens: u32,
    pub max_text_tokens_per_sentence: u32,
    pub sentences_bucket_max_size: u32,
    pub verbose: bool,
}

impl Default for GenerationParams {
    fn default() -> Self {
        Self {
            do_sample: true,
            temperature: 1.0,
            top_p: 0.8,
            top_k: 30,
            num_beams: 3,
            repetition_penalty: 10.0,
            length_penalty: 0.0,
            max_mel_tokens: 600,
            max_text_tokens_per_sentence: 120,
            sentences_bucket_max_size: 4,
            verbose: true,
        }
    }
}

/// The sampling-related subset of [`GenerationParams`] as the model sees it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationKwargs {
    pub do_sample: bool,
    pub top_p: f32,
    pub top_k: Option<u32>,
    pub temperature: f32,
    pub length_penalty: f32,
    pub num_beams: u32,
    pub repetition_penalty: f32,
    pub max_mel_tokens: u32,
}

impl GenerationParams {
    /// Build the kwargs actually handed to the model.
    ///
    /// Beam search and sampling are mutually exclusive in the model: with
    /// more than one beam, sampling is switched off.
    pub fn effective(&self) -> GenerationKwargs {
        let do_sample = if self.num_beams > 1 && self.do_sample {
            tracing::debug!(num_beams = self.num_beams, "disabling do_sample for beam search");
            false
        } else {
            self.do_sample
        };
        GenerationKwargs {
            do_sample,
            top_p: self.top_p,
            top_k: (self.top_k > 0).then_some(self.top_k),
            temperature: self.temperature,
            length_penalty: self.length_penalty,
            num_beams: self.num_beams,
            repetition_penalty: self.repetition_penalty,
            max_mel_tokens: self.max_mel_tokens,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_beams_force_sampling_off() {
        let p = GenerationParams { num_beams: 3, do_sample: true, ..Default::default() };
        assert!(!p.effective().do_sample);
    }

    #[test]
    fn test_single_beam_keeps_sampling() {
        let p = GenerationParams { num_beams: 1, do_sample: true, ..Default::default() };
        assert!(p.effective().do_sample);

        let p = GenerationParams { num_beams: 1, do_sample: false, ..Default::default() };
        assert!(!p.effective().do_sample);
    }

    #[test]
    fn test_zero_top_k_is_unset() {
        let p = GenerationParams { top_k: 0, ..Default::default() };
        assert_eq!(p.effective().top_k, None);
        assert_eq!(GenerationParams::default().effective().top_k, Some(30));
    }

    #[test]
    fn test_kwargs_json_shape() {
        let kw = GenerationParams { top_k: 0, ..Default::default() }.effective();
        let v = serde_json::to_value(&kw).unwrap();
        assert_eq!(v["do_sample"], false);
        assert!(v["top_k"].is_null());
        assert_eq!(v["num_beams"], 3);
    }
}
