//! The real-time PCM streamer (§4.1) — the hard part.
//!
//! Ties together [`device`] (raw ALSA mmap programming), [`hugepage`] (the
//! source buffer), [`simd`] (the non-temporal block copy) and [`sizing`]
//! (the period/buffer formula) into the startup sequence and steady-state
//! loop spec §4.1 describes. Grounded in `qua_player_32.c`'s `main`, with
//! the "near" negotiators replaced by [`device::Device::open`]'s exact ones.

pub mod device;
pub mod hugepage;
pub mod simd;
pub mod sizing;

use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

use tracing::{error, info, warn};

use crate::decoder::wav_header;
use crate::error::{Error, Result};
use device::{Device, SampleFormat};
use hugepage::HugePageBuffer;
use sizing::Sizes;

const ALIGNMENT: usize = 4096;

/// Play `path` (a stereo little-endian PCM WAV) to `device_id`, returning
/// once the stream has drained. Any setup failure is returned before audio
/// begins (§4.1 "Failure semantics").
pub fn run(path: &Path, device_id: &str) -> Result<()> {
    let mut file = BufReader::new(File::open(path).map_err(|e| Error::io(path, e))?);
    let info = wav_header::read_header(&mut file)?;

    if !info.is_pcm() {
        return Err(Error::Format(format!(
            "{}: audio format {} is neither PCM (1) nor extensible (65534)",
            path.display(),
            info.audio_format
        )));
    }
    if info.channels != 2 {
        return Err(Error::Format(format!(
            "{}: expected 2 channels, got {}",
            path.display(),
            info.channels
        )));
    }
    let format = SampleFormat::from_bits(info.bits_per_sample)?;
    let sizes = sizing::compute(info.bits_per_sample, info.sample_rate);

    let mut device = Device::open(device_id, format, info.sample_rate, sizes.period_frames, sizes.buffer_frames)?;

    let mut source = load_source_buffer(&mut file, path, &info, &sizes)?;
    source.mark_read_only()?;

    prefill_and_start(&mut device, &source, &sizes)?;
    steady_state_loop(&mut device, &source, &sizes)?;

    device.drain()?;
    info!(path = %path.display(), "playback drained");
    Ok(())
}

/// Read the `data` chunk sequentially into a huge-page-backed buffer,
/// zero-padded to the next period boundary plus one extra period of
/// silence (§4.1 startup step 6), so the final partial period drains
/// cleanly and the trailing prefill period always has somewhere to come
/// from.
fn load_source_buffer(
    file: &mut BufReader<File>,
    path: &Path,
    info: &wav_header::WavInfo,
    sizes: &Sizes,
) -> Result<HugePageBuffer> {
    file.seek(SeekFrom::Start(info.data_offset)).map_err(|e| Error::io(path, e))?;

    let period_bytes = sizes.period_bytes() as usize;
    let data_len = info.data_len as usize;
    // Pad to the *next* period boundary (strictly past the data, even when
    // data_len lands exactly on one) plus one extra period of silence, per
    // §4.1 startup step 6. A source exactly one period long therefore
    // occupies 3 total periods: the real one, the boundary pad, and the
    // drain period (§8's "exactly three periods are consumed").
    let full_periods = data_len / period_bytes;
    let padded_periods = full_periods + 2;
    let total_len = padded_periods * period_bytes;

    let mut buffer = HugePageBuffer::allocate(total_len)?;
    {
        let slice = buffer.as_mut_slice();
        let mut reader = file.take(info.data_len as u64);
        let mut read_total = 0usize;
        loop {
            let n = reader.read(&mut slice[read_total..data_len]).map_err(|e| Error::io(path, e))?;
            if n == 0 {
                break;
            }
            read_total += n;
        }
        if read_total < data_len {
            return Err(Error::Format(format!(
                "{}: data chunk truncated: expected {data_len} bytes, read {read_total}",
                path.display()
            )));
        }
        // slice[data_len..] is already zero from the anonymous mmap.
    }
    Ok(buffer)
}

/// §4.1 startup steps 8–12: map two full periods, copy them in from the
/// source, sfence once, advance the application pointer by two periods,
/// and start the device.
fn prefill_and_start(device: &mut Device, source: &HugePageBuffer, sizes: &Sizes) -> Result<()> {
    let two_periods = sizes.period_frames * 2;
    let area = device.mmap_begin(two_periods)?;
    assert_eq!(area.base as usize % ALIGNMENT, 0, "mmap destination must be 4 KiB aligned");

    let period_bytes = sizes.period_bytes() as usize;
    let src = source.as_slice();
    assert_eq!(src.as_ptr() as usize % ALIGNMENT, 0, "source buffer must be 4 KiB aligned");

    unsafe {
        simd::copy_period(area.base, src.as_ptr(), period_bytes);
        simd::copy_period(area.base.add(period_bytes), src.as_ptr().add(period_bytes), period_bytes);
    }
    simd::store_fence();

    device.mmap_commit(area.offset_frames, two_periods)?;
    device.start()?;
    Ok(())
}

/// §4.1 "Steady-state loop": one period per half-iteration, blocking on
/// driver-writable space with no timeout and no busy-wait.
fn steady_state_loop(device: &mut Device, source: &HugePageBuffer, sizes: &Sizes) -> Result<()> {
    let period_bytes = sizes.period_bytes() as usize;
    let src = source.as_slice();
    let total_periods = src.len() / period_bytes;

    // The first two periods were already prefilled in `prefill_and_start`.
    let mut cursor_period = 2usize;
    let mut recovered_once = false;

    while cursor_period < total_periods {
        match copy_one_period(device, src, cursor_period, period_bytes, sizes) {
            Ok(()) => {
                cursor_period += 1;
            }
            Err(e) if !recovered_once => {
                warn!(error = %e, "mid-stream underrun, attempting one re-prepare");
                device.recover(-(libc::EPIPE))?;
                device.start()?;
                recovered_once = true;
            }
            Err(e) => {
                error!(error = %e, "underrun recovery already used once, aborting");
                return Err(e);
            }
        }
    }
    Ok(())
}

fn copy_one_period(device: &mut Device, src: &[u8], period_index: usize, period_bytes: usize, sizes: &Sizes) -> Result<()> {
    device.wait_for_space()?;
    let area = device.mmap_begin(sizes.period_frames)?;
    let offset = period_index * period_bytes;
    unsafe {
        simd::copy_period(area.base, src.as_ptr().add(offset), period_bytes);
    }
    device.mmap_commit(area.offset_frames, sizes.period_frames)?;
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::decoder::wav_header::write_canonical_header;
    use std::io::Write as _;

    #[test]
    fn load_source_buffer_zero_pads_to_period_plus_one() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.wav");
        // one frame only, far smaller than any real period size
        let mut f = std::fs::File::create(&path).unwrap();
        write_canonical_header(&mut f, 2, 48_000, 16, 4).unwrap();
        f.write_all(&[1, 0, 2, 0]).unwrap();
        drop(f);

        let mut reader = BufReader::new(File::open(&path).unwrap());
        let info = wav_header::read_header(&mut reader).unwrap();
        let sizes = sizing::compute(info.bits_per_sample, info.sample_rate);

        let buffer = load_source_buffer(&mut reader, &path, &info, &sizes).unwrap();
        let period_bytes = sizes.period_bytes() as usize;
        // one data period plus one silent drain period
        assert_eq!(buffer.len(), period_bytes * 2);
        assert_eq!(&buffer.as_slice()[0..4], &[1, 0, 2, 0]);
        assert!(buffer.as_slice()[4..].iter().all(|&b| b == 0));
    }

    #[test]
    fn source_exactly_one_period_long_yields_three_total_periods() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("one-period.wav");
        let sizes = sizing::compute(16, 48_000);
        let period_bytes = sizes.period_bytes() as usize;

        let mut f = std::fs::File::create(&path).unwrap();
        write_canonical_header(&mut f, 2, 48_000, 16, period_bytes as u32).unwrap();
        f.write_all(&vec![0xABu8; period_bytes]).unwrap();
        drop(f);

        let mut reader = BufReader::new(File::open(&path).unwrap());
        let info = wav_header::read_header(&mut reader).unwrap();
        let buffer = load_source_buffer(&mut reader, &path, &info, &sizes).unwrap();

        assert_eq!(buffer.len(), period_bytes * 3);
        assert!(buffer.as_slice()[period_bytes..].iter().all(|&b| b == 0));
    }
}
