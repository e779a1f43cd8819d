//! Channel remap rules from §4.2 D, ported from the `sox remix` argument
//! lists in `qua_post_process`'s mono- and 5.1-handling branches.

/// Remap `samples` (interleaved, `src_channels` channels per frame) to the
/// layout §4.2 D specifies, returning the new interleaved buffer and its
/// channel count.
///
/// - 1 channel duplicates to stereo.
/// - 6 channels (5.1, `FL FR FC LFE BL BR` order) downmixes to stereo with
///   `L = FL + 0.707·FC + 0.707·BL`, `R = FR + 0.707·FC + 0.707·BR`; the LFE
///   channel is dropped, matching sox's `remix 1,3v0.707,5v0.707 2,3v0.707,6v0.707`.
/// - any other count passes through untouched.
pub fn remap(samples: &[i32], src_channels: u16) -> (Vec<i32>, u16) {
    match src_channels {
        1 => (duplicate_to_stereo(samples), 2),
        6 => (downmix_5_1(samples), 2),
        other => (samples.to_vec(), other),
    }
}

fn duplicate_to_stereo(samples: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(samples.len() * 2);
    for &s in samples {
        out.push(s);
        out.push(s);
    }
    out
}

const SURROUND_COEFF: f64 = 0.707;

fn downmix_5_1(samples: &[i32]) -> Vec<i32> {
    let mut out = Vec::with_capacity(samples.len() / 3);
    for frame in samples.chunks_exact(6) {
        let [fl, fr, fc, _lfe, bl, br] = [frame[0], frame[1], frame[2], frame[3], frame[4], frame[5]];
        let l = fl as f64 + SURROUND_COEFF * fc as f64 + SURROUND_COEFF * bl as f64;
        let r = fr as f64 + SURROUND_COEFF * fc as f64 + SURROUND_COEFF * br as f64;
        out.push(clamp_i32(l));
        out.push(clamp_i32(r));
    }
    out
}

fn clamp_i32(v: f64) -> i32 {
    v.round().clamp(i32::MIN as f64, i32::MAX as f64) as i32
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn mono_duplicates_to_stereo() {
        let (out, channels) = remap(&[10, 20, 30], 1);
        assert_eq!(channels, 2);
        assert_eq!(out, vec![10, 10, 20, 20, 30, 30]);
    }

    #[test]
    fn five_one_downmixes_dropping_lfe() {
        // one frame: FL=1000 FR=2000 FC=0 LFE=9999 BL=0 BR=0
        let (out, channels) = remap(&[1000, 2000, 0, 9999, 0, 0], 6);
        assert_eq!(channels, 2);
        assert_eq!(out, vec![1000, 2000]);
    }

    #[test]
    fn five_one_applies_center_and_surround_coefficients() {
        let (out, _) = remap(&[0, 0, 1000, 0, 1000, 1000], 6);
        // L = 0 + 0.707*1000 + 0.707*1000 = 1414 (rounded)
        assert_eq!(out[0], (2.0 * SURROUND_COEFF * 1000.0).round() as i32);
    }

    #[test]
    fn other_channel_counts_pass_through() {
        let (out, channels) = remap(&[1, 2, 3, 4], 4);
        assert_eq!(channels, 4);
        assert_eq!(out, vec![1, 2, 3, 4]);
    }
}
