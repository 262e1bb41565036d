//! Starting points for the box optimizer.

use super::{Background, FitRange};
use crate::numerics::PseudoVoigt;

const INITIAL_SHAPE_FACTOR: f64 = 0.5;
const MIN_GUESS_FWHM: f64 = 1.0;
/// Candidates must stand this many noise sigmas above their valleys.
const NOISE_PROMINENCE_SIGMAS: f64 = 5.0;
/// Median absolute deviation of a unit normal.
const NORMAL_MAD: f64 = 0.674_489_750_196_081_7;

#[derive(Debug, Clone, PartialEq)]
pub(crate) struct InitialGuess {
    pub background: Background,
    pub peaks: Vec<PseudoVoigt>,
}

/// Estimates background and peaks for `counts`, the samples of `range`.
///
/// Returns `None` when no interior local maximum rises clearly above the
/// noise of the box.
pub(crate) fn initial_guess(counts: &[f64], range: FitRange) -> Option<InitialGuess> {
    let width = counts.len();
    if width < 3 || range.peak_count == 0 {
        return None;
    }
    let background = edge_background(counts, range.low);
    let above: Vec<f64> = counts
        .iter()
        .enumerate()
        .map(|(index, value)| value - background.eval((range.low + index) as f64))
        .collect();

    let threshold = NOISE_PROMINENCE_SIGMAS * noise_sigma(counts);
    let mut candidates: Vec<(usize, f64)> = local_maxima(counts)
        .into_iter()
        .map(|index| (index, prominence(counts, index)))
        .filter(|(_, prominence)| *prominence > 0.0 && *prominence > threshold)
        .collect();
    if candidates.is_empty() {
        return None;
    }

    let max_fwhm = width as f64;
    let mut peaks: Vec<PseudoVoigt> = if candidates.len() >= range.peak_count {
        candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        candidates
            .iter()
            .take(range.peak_count)
            .map(|&(index, _)| {
                let height = above[index].max(f64::EPSILON);
                PseudoVoigt::new(
                    (range.low + index) as f64,
                    height,
                    half_maximum_width(&above, index).clamp(MIN_GUESS_FWHM, max_fwhm),
                    INITIAL_SHAPE_FACTOR,
                )
            })
            .collect()
    } else {
        evenly_spaced(&above, range)
    };
    peaks.sort_by(|a, b| a.position.total_cmp(&b.position));

    Some(InitialGuess { background, peaks })
}

/// Noise sigma from the median absolute first difference, which stays small
/// on smooth peaks and background.
fn noise_sigma(counts: &[f64]) -> f64 {
    let mut steps: Vec<f64> = counts
        .windows(2)
        .map(|pair| (pair[1] - pair[0]).abs())
        .filter(|step| step.is_finite())
        .collect();
    if steps.is_empty() {
        return 0.0;
    }
    steps.sort_by(f64::total_cmp);
    let middle = steps.len() / 2;
    let median = if steps.len() % 2 == 0 {
        (steps[middle - 1] + steps[middle]) / 2.0
    } else {
        steps[middle]
    };
    median / (NORMAL_MAD * std::f64::consts::SQRT_2)
}

/// Straight line through the minima of the outer eighths of the box.
fn edge_background(counts: &[f64], low: usize) -> Background {
    let width = counts.len();
    let edge = (width / 8).max(1);
    let (left_index, left_value) = minimum(&counts[..edge], 0);
    let (right_index, right_value) = minimum(&counts[width - edge..], width - edge);
    let slope = if right_index > left_index {
        (right_value - left_value) / (right_index - left_index) as f64
    } else {
        0.0
    };
    let reference = low as f64;
    Background {
        offset: left_value - slope * left_index as f64,
        slope,
        reference,
    }
}

fn minimum(values: &[f64], offset: usize) -> (usize, f64) {
    values
        .iter()
        .enumerate()
        .fold((offset, f64::INFINITY), |best, (index, value)| {
            if *value < best.1 {
                (offset + index, *value)
            } else {
                best
            }
        })
}

/// Interior indices that rise from the left and fall to the right.
/// Plateaus report their first sample.
fn local_maxima(counts: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    let mut index = 1;
    while index + 1 < counts.len() {
        if counts[index] > counts[index - 1] {
            let mut end = index;
            while end + 1 < counts.len() && counts[end + 1] == counts[index] {
                end += 1;
            }
            if end + 1 < counts.len() && counts[end + 1] < counts[index] {
                maxima.push(index);
            }
            index = end + 1;
        } else {
            index += 1;
        }
    }
    maxima
}

/// Height above the higher of the two valleys separating `index` from
/// taller samples (or the box edges).
fn prominence(counts: &[f64], index: usize) -> f64 {
    let height = counts[index];
    let mut left_min = height;
    for value in counts[..index].iter().rev() {
        if *value > height {
            break;
        }
        left_min = left_min.min(*value);
    }
    let mut right_min = height;
    for value in &counts[index + 1..] {
        if *value > height {
            break;
        }
        right_min = right_min.min(*value);
    }
    height - left_min.max(right_min)
}

/// Full width where the background-subtracted signal falls below half of
/// its value at `index`, linearly interpolated.
fn half_maximum_width(above: &[f64], index: usize) -> f64 {
    let half = above[index] / 2.0;
    if half <= 0.0 {
        return MIN_GUESS_FWHM;
    }

    let mut left = index as f64;
    let mut cursor = index;
    while cursor > 0 {
        let next = cursor - 1;
        if above[next] <= half {
            left = next as f64 + crossing(above[next], above[cursor], half);
            break;
        }
        cursor = next;
        left = cursor as f64;
    }

    let mut right = index as f64;
    let mut cursor = index;
    while cursor + 1 < above.len() {
        let next = cursor + 1;
        if above[next] <= half {
            right = cursor as f64 + 1.0 - crossing(above[next], above[cursor], half);
            break;
        }
        cursor = next;
        right = cursor as f64;
    }

    right - left
}

/// Fraction of the step from `outside` to `inside` at which `level` is met.
fn crossing(outside: f64, inside: f64, level: f64) -> f64 {
    let rise = inside - outside;
    if rise <= 0.0 {
        0.0
    } else {
        ((level - outside) / rise).clamp(0.0, 1.0)
    }
}

fn evenly_spaced(above: &[f64], range: FitRange) -> Vec<PseudoVoigt> {
    let width = above.len() as f64;
    let spacing = width / (range.peak_count + 1) as f64;
    let fwhm = (spacing / 2.0).max(MIN_GUESS_FWHM);
    let tallest = above.iter().copied().fold(0.0_f64, f64::max);
    (1..=range.peak_count)
        .map(|slot| {
            let offset = spacing * slot as f64;
            let index = (offset.round() as usize).min(above.len() - 1);
            let height = above[index].max(tallest / 2.0).max(f64::EPSILON);
            PseudoVoigt::new(
                range.low as f64 + offset,
                height,
                fwhm,
                INITIAL_SHAPE_FACTOR,
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{half_maximum_width, initial_guess, local_maxima, noise_sigma, prominence};
    use crate::fitting::FitRange;
    use crate::numerics::PseudoVoigt;

    fn pattern(peaks: &[PseudoVoigt], background: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|channel| {
                let x = channel as f64;
                background + peaks.iter().map(|peak| peak.eval(x)).sum::<f64>()
            })
            .collect()
    }

    #[test]
    fn finds_plateau_and_strict_maxima() {
        let counts = [0.0, 2.0, 2.0, 1.0, 5.0, 3.0, 3.0, 4.0];
        assert_eq!(local_maxima(&counts), vec![1, 4]);
        assert_eq!(prominence(&counts, 1), 1.0);
        assert_eq!(prominence(&counts, 4), 2.0);
    }

    #[test]
    fn half_width_interpolates_between_samples() {
        let above = [0.0, 1.0, 4.0, 1.0, 0.0];
        let width = half_maximum_width(&above, 2);
        assert!((width - 4.0 / 3.0).abs() < 1.0e-12, "width = {width}");
    }

    #[test]
    fn picks_the_most_prominent_peaks_in_position_order() {
        let counts = pattern(
            &[
                PseudoVoigt::new(30.0, 50.0, 5.0, 0.3),
                PseudoVoigt::new(60.0, 200.0, 4.0, 0.3),
                PseudoVoigt::new(80.0, 10.0, 4.0, 0.3),
            ],
            7.0,
            100,
        );
        let guess = initial_guess(&counts, FitRange::new(0, 100, 2)).expect("peaks present");

        let positions: Vec<f64> = guess.peaks.iter().map(|peak| peak.position).collect();
        assert_eq!(positions, vec![30.0, 60.0]);
        assert!((guess.peaks[1].intensity - 200.0).abs() < 1.0);
        assert!((guess.peaks[1].fwhm - 4.0).abs() < 1.0, "fwhm = {}", guess.peaks[1].fwhm);
        assert!((guess.background.eval(0.0) - 7.0).abs() < 0.5);
    }

    #[test]
    fn spreads_guesses_when_too_few_maxima_are_visible() {
        let counts = pattern(&[PseudoVoigt::new(50.0, 100.0, 6.0, 0.5)], 0.0, 90);
        let guess = initial_guess(&counts, FitRange::new(0, 90, 2)).expect("one peak visible");
        assert_eq!(guess.peaks.len(), 2);
        assert!((guess.peaks[0].position - 30.0).abs() < 1.0e-12);
        assert!((guess.peaks[1].position - 60.0).abs() < 1.0e-12);
    }

    fn uniform_noise(seed: u64, level: f64, amplitude: f64, len: usize) -> Vec<f64> {
        let mut state = seed.wrapping_mul(0x9E37_79B9_7F4A_7C15).wrapping_add(1);
        (0..len)
            .map(|_| {
                state = state
                    .wrapping_mul(6_364_136_223_846_793_005)
                    .wrapping_add(1_442_695_040_888_963_407);
                let unit = (state >> 11) as f64 / (1_u64 << 53) as f64;
                level + amplitude * (2.0 * unit - 1.0)
            })
            .collect()
    }

    #[test]
    fn noise_sigma_ignores_smooth_peaks() {
        let clean = pattern(&[PseudoVoigt::new(50.0, 100.0, 8.0, 0.5)], 3.0, 200);
        assert!(noise_sigma(&clean) < 0.5, "sigma = {}", noise_sigma(&clean));
        let noisy = uniform_noise(7, 100.0, 5.0, 200);
        let sigma = noise_sigma(&noisy);
        assert!(sigma > 2.0 && sigma < 4.5, "sigma = {sigma}");
    }

    #[test]
    fn noise_only_boxes_have_no_guess() {
        for seed in 0..20 {
            let counts = uniform_noise(seed, 100.0, 5.0, 200);
            assert!(
                initial_guess(&counts[20..180], FitRange::new(20, 180, 1)).is_none(),
                "seed {seed}"
            );
        }
    }

    #[test]
    fn peak_on_noise_is_still_found() {
        let peak = PseudoVoigt::new(90.0, 80.0, 10.0, 0.5);
        let counts: Vec<f64> = uniform_noise(3, 100.0, 5.0, 200)
            .into_iter()
            .enumerate()
            .map(|(channel, value)| value + peak.eval(channel as f64))
            .collect();
        let guess = initial_guess(&counts[20..180], FitRange::new(20, 180, 1)).expect("peak");
        assert!((guess.peaks[0].position - 90.0).abs() <= 4.0);
    }

    #[test]
    fn flat_or_monotonic_boxes_have_no_guess() {
        assert!(initial_guess(&[4.0; 40], FitRange::new(0, 40, 1)).is_none());
        let ramp: Vec<f64> = (0..40).map(|value| value as f64).collect();
        assert!(initial_guess(&ramp, FitRange::new(0, 40, 1)).is_none());
    }
}
