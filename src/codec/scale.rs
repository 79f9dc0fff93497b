//! Scaling and quantization shared by the bit-packed encodings.
//!
//! The quantization map for a plane is `index = round((v - offset) / scale)`
//! clamped to `[0, imiss - 1]`, with the all-ones code `imiss` reserved for
//! the missing value.  `offset` is the plane minimum and `scale` spreads the
//! plane's range over the available codes.

use super::Elem;

/// Minimum and maximum over the non-missing values, `None` when every value
/// is missing.
pub(crate) fn min_max<T: Elem>(data: &[T], miss: f64) -> Option<(f64, f64)> {
    let mut vmin = f64::INFINITY;
    let mut vmax = f64::NEG_INFINITY;
    for &v in data {
        if !v.is_miss(miss) {
            let v = v.to_f64();
            vmin = vmin.min(v);
            vmax = vmax.max(v);
        }
    }
    if vmin > vmax {
        None
    } else {
        Some((vmin, vmax))
    }
}

/// Offset/scale pair spreading `[vmin, vmax]` over `num` quantization steps.
pub(crate) fn scaling_parameters(vmin: f64, vmax: f64, num: u32) -> (f64, f64) {
    (vmin, (vmax - vmin) / f64::from(num))
}

/// Per-plane (offset, extent) pair as stored by URX/MRX: the extent is the
/// scale times the number of steps.
pub(crate) fn urx_plane_params<T: Elem>(data: &[T], miss: f64, nbits: u32) -> (f64, f64) {
    let num = ((1u32 << nbits) - 2).max(1);
    match min_max(data, miss) {
        None => (0.0, 0.0),
        Some((vmin, vmax)) => {
            let (offset, scale) = scaling_parameters(vmin, vmax, num);
            (offset, scale * f64::from(num))
        }
    }
}

/// Per-plane (offset, scale) pair as stored by URY/MRY.
pub(crate) fn ury_plane_params<T: Elem>(data: &[T], miss: f64, nbits: u32) -> (f64, f64) {
    let num = ((1u32 << nbits) - 2).max(1);
    match min_max(data, miss) {
        None => (0.0, 0.0),
        Some((vmin, vmax)) => scaling_parameters(vmin, vmax, num),
    }
}

/// Quantize a full plane; missing values get the reserved code `imiss`.
pub(crate) fn quantize<T: Elem>(
    dest: &mut [u32],
    src: &[T],
    offset: f64,
    scale: f64,
    imiss: u32,
    miss: f64,
) {
    let iscale = if scale == 0.0 { 0.0 } else { 1.0 / scale };
    let top = f64::from(imiss - 1);
    for (d, &s) in dest.iter_mut().zip(src) {
        *d = if s.is_miss(miss) {
            imiss
        } else {
            let v = (s.to_f64() - offset) * iscale + 0.5;
            if v < 0.0 {
                0
            } else if v > top {
                imiss - 1
            } else {
                v as u32
            }
        };
    }
}

/// Quantize only the non-missing values, compacted to the front of `dest`.
/// Returns the number of values written.
pub(crate) fn quantize_masked<T: Elem>(
    dest: &mut [u32],
    src: &[T],
    offset: f64,
    scale: f64,
    imiss: u32,
    miss: f64,
) -> usize {
    let iscale = if scale == 0.0 { 0.0 } else { 1.0 / scale };
    let top = f64::from(imiss - 1);
    let mut cnt = 0;
    for &s in src {
        if s.is_miss(miss) {
            continue;
        }
        let v = (s.to_f64() - offset) * iscale + 0.5;
        dest[cnt] = if v < 0.0 {
            0
        } else if v > top {
            imiss - 1
        } else {
            v as u32
        };
        cnt += 1;
    }
    cnt
}

/// Number of non-missing values.
pub(crate) fn masked_count<T: Elem>(data: &[T], miss: f64) -> usize {
    data.iter().filter(|v| !v.is_miss(miss)).count()
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn min_max_skips_missing() {
        let data = [1.0f32, -999.0, 3.5, -2.0];
        assert_eq!(min_max(&data, -999.0), Some((-2.0, 3.5)));
        assert_eq!(min_max(&[-999.0f32; 4], -999.0), None);
        assert_eq!(min_max::<f32>(&[], -999.0), None);
    }

    #[test]
    fn quantize_clamps_and_reserves_missing() {
        let imiss = (1u32 << 8) - 1;
        let src = [0.0f64, 1.0, 0.5, -999.0, 2.0];
        let mut dest = [0u32; 5];
        // scale chosen so 1.0 maps to the top code 254
        quantize(&mut dest, &src, 0.0, 1.0 / 254.0, imiss, -999.0);
        assert_eq!(dest[0], 0);
        assert_eq!(dest[1], 254);
        assert_eq!(dest[2], 127);
        assert_eq!(dest[3], imiss);
        assert_eq!(dest[4], 254); // clamped

        // degenerate scale maps everything to zero
        quantize(&mut dest, &src, 0.0, 0.0, imiss, -999.0);
        assert_eq!(dest[0], 0);
        assert_eq!(dest[1], 0);
        assert_eq!(dest[3], imiss);
    }

    #[test]
    fn masked_quantize_compacts() {
        let src = [1.0f32, -999.0, 2.0, -999.0, 3.0];
        let mut dest = [0u32; 5];
        let n = quantize_masked(&mut dest, &src, 1.0, 1.0, 255, -999.0);
        assert_eq!(n, 3);
        assert_eq!(&dest[..3], &[0, 1, 2]);
        assert_eq!(masked_count(&src, -999.0), 3);
    }

    #[test]
    fn urx_params_store_the_extent() {
        let data = [2.0f64, 10.0, -999.0];
        let (offset, extent) = urx_plane_params(&data, -999.0, 12);
        assert_eq!(offset, 2.0);
        assert_eq!(extent, 8.0);

        let (offset, scale) = ury_plane_params(&data, -999.0, 12);
        assert_eq!(offset, 2.0);
        assert_eq!(scale, 8.0 / f64::from((1u32 << 12) - 2));

        assert_eq!(urx_plane_params(&[-999.0f64], -999.0, 12), (0.0, 0.0));
    }
}
