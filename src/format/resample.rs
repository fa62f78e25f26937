//! Sample rate conversion.
//!
//! Resampling is done in the frequency domain: the whole buffer is
//! transformed, its spectrum truncated (or zero-padded) to the target length,
//! and transformed back. This is band-limited, deterministic, and yields
//! exactly `floor(len × to_rate / from_rate)` samples, which keeps the remote
//! service's 24 kHz response chunks aligned with the device's 16 kHz output.

use rustfft::num_complex::Complex;
use rustfft::FftPlanner;

use crate::FormatError;

/// Returns the number of samples `resample` produces for `len` input samples.
pub fn resampled_len(len: usize, from_rate: u32, to_rate: u32) -> usize {
    if from_rate == 0 {
        return 0;
    }
    (len as u64 * u64::from(to_rate) / u64::from(from_rate)) as usize
}

/// Resamples a mono buffer from one sample rate to another.
///
/// # Arguments
///
/// * `samples` - Input samples (mono)
/// * `from_rate` - Source sample rate in Hz
/// * `to_rate` - Target sample rate in Hz
///
/// # Errors
///
/// Returns [`FormatError::UnsupportedRate`] if either rate is zero.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Result<Vec<f32>, FormatError> {
    if from_rate == 0 {
        return Err(FormatError::UnsupportedRate { rate: from_rate });
    }
    if to_rate == 0 {
        return Err(FormatError::UnsupportedRate { rate: to_rate });
    }
    if from_rate == to_rate || samples.is_empty() {
        return Ok(samples.to_vec());
    }

    let input_len = samples.len();
    let output_len = resampled_len(input_len, from_rate, to_rate);
    if output_len == 0 {
        return Ok(Vec::new());
    }

    let mut planner = FftPlanner::<f32>::new();

    let mut spectrum: Vec<Complex<f32>> = samples.iter().map(|&s| Complex::new(s, 0.0)).collect();
    planner.plan_fft_forward(input_len).process(&mut spectrum);

    let mut resized = vec![Complex::new(0.0, 0.0); output_len];
    copy_spectrum(&spectrum, &mut resized);

    planner.plan_fft_inverse(output_len).process(&mut resized);

    // rustfft is unnormalized; dividing by the input length both undoes the
    // forward transform and rescales for the new length.
    let scale = 1.0 / input_len as f32;
    let output = resized.iter().map(|c| c.re * scale).collect();

    tracing::trace!(
        from_rate,
        to_rate,
        input_len,
        output_len,
        "resampled buffer"
    );

    Ok(output)
}

/// Moves the shared low-frequency bins of `input` into `output`.
///
/// Bins above the smaller Nyquist frequency are dropped (downsampling) or left
/// at zero (upsampling). When the shared length is even, the Nyquist bin is
/// folded (downsampling) or split between both halves (upsampling) so the
/// result stays real.
fn copy_spectrum(input: &[Complex<f32>], output: &mut [Complex<f32>]) {
    let n = input.len();
    let m = output.len();
    let shared = n.min(m);

    let positive = shared / 2 + 1;
    for k in 0..positive.min(shared) {
        output[k] = input[k];
    }

    let negative = shared - positive.min(shared);
    for k in 1..=negative {
        output[m - k] = input[n - k];
    }

    if shared % 2 == 0 && shared > 0 {
        let nyquist = shared / 2;
        if m < n {
            output[nyquist] += input[n - nyquist];
        } else if m > n {
            let half = input[nyquist] * 0.5;
            output[nyquist] = half;
            output[m - nyquist] = half;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(frequency: f32, rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * std::f32::consts::PI * frequency * i as f32 / rate as f32).sin())
            .collect()
    }

    fn peak(samples: &[f32]) -> f32 {
        samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()))
    }

    #[test]
    fn test_resample_same_rate() {
        let samples = vec![0.1, 0.2, 0.3];
        assert_eq!(resample(&samples, 16000, 16000).unwrap(), samples);
    }

    #[test]
    fn test_resample_empty() {
        assert!(resample(&[], 24000, 16000).unwrap().is_empty());
    }

    #[test]
    fn test_resample_one_second_24k_to_16k() {
        let input = sine(440.0, 24000, 24000);
        let output = resample(&input, 24000, 16000).unwrap();
        assert_eq!(output.len(), 16000);
    }

    #[test]
    fn test_resample_100ms_chunk() {
        let input = sine(440.0, 24000, 2400);
        let output = resample(&input, 24000, 16000).unwrap();
        assert_eq!(output.len(), 1600);
    }

    #[test]
    fn test_resample_preserves_amplitude() {
        let input: Vec<f32> = sine(440.0, 24000, 24000).iter().map(|s| s * 0.5).collect();
        let output = resample(&input, 24000, 16000).unwrap();

        let amp_in = peak(&input);
        let amp_out = peak(&output);
        assert!(amp_out > 0.8 * amp_in && amp_out < 1.2 * amp_in);
    }

    #[test]
    fn test_resample_matches_reference_tone() {
        // An in-band tone resampled should match the same tone generated at the target rate
        let output = resample(&sine(440.0, 24000, 2400), 24000, 16000).unwrap();
        let expected = sine(440.0, 16000, 1600);

        let max_err = output
            .iter()
            .zip(&expected)
            .fold(0.0f32, |acc, (a, b)| acc.max((a - b).abs()));
        assert!(max_err < 1e-3, "max error {max_err}");
    }

    #[test]
    fn test_resample_upsample_length() {
        let input = sine(440.0, 16000, 1600);
        let output = resample(&input, 16000, 48000).unwrap();
        assert_eq!(output.len(), 4800);

        let expected = sine(440.0, 48000, 4800);
        let max_err = output
            .iter()
            .zip(&expected)
            .fold(0.0f32, |acc, (a, b)| acc.max((a - b).abs()));
        assert!(max_err < 1e-3, "max error {max_err}");
    }

    #[test]
    fn test_resample_odd_length_floors() {
        let output = resample(&vec![0.0; 7], 24000, 16000).unwrap();
        assert_eq!(output.len(), 4);
    }

    #[test]
    fn test_resample_zero_rate_rejected() {
        assert_eq!(
            resample(&[0.0], 0, 16000),
            Err(FormatError::UnsupportedRate { rate: 0 })
        );
        assert_eq!(
            resample(&[0.0], 16000, 0),
            Err(FormatError::UnsupportedRate { rate: 0 })
        );
    }

    #[test]
    fn test_resampled_len() {
        assert_eq!(resampled_len(24000, 24000, 16000), 16000);
        assert_eq!(resampled_len(2400, 24000, 16000), 1600);
        assert_eq!(resampled_len(5, 24000, 16000), 3);
        assert_eq!(resampled_len(5, 0, 16000), 0);
    }
}
