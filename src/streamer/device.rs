//! Raw ALSA device programming via `alsa-sys`, grounded in `setup_alsa` /
//! the main loop of `qua_player_32.c`, with the "near" negotiators
//! (`_set_buffer_size_near`, `_set_period_size_near`) replaced by their
//! exact counterparts per §4.1 ("Any 'near' negotiation is forbidden").

use std::ffi::CString;
use std::os::raw::c_int;
use std::ptr;

use alsa_sys::*;
use libc::EPIPE;

use crate::error::{Error, Result};

/// Sample format the streamer is compiled to move, exclusively (§4.1:
/// "S16_LE or S32_LE, exclusively; no runtime format negotiation").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    S16Le,
    S32Le,
}

impl SampleFormat {
    pub fn from_bits(bits: u16) -> Result<Self> {
        match bits {
            16 => Ok(SampleFormat::S16Le),
            32 => Ok(SampleFormat::S32Le),
            other => Err(Error::Format(format!("unsupported bit depth {other}, expected 16 or 32"))),
        }
    }

    fn alsa_format(self) -> snd_pcm_format_t {
        match self {
            SampleFormat::S16Le => SND_PCM_FORMAT_S16_LE,
            SampleFormat::S32Le => SND_PCM_FORMAT_S32_LE,
        }
    }
}

/// One mmap'd playback area: a base address plus a bit offset/step, matching
/// `snd_pcm_channel_area_t` but pre-resolved to a byte pointer the way
/// `qua_player_32.c`'s `mmap_audio_base = areas[0].addr + (areas[0].first >> 3)`
/// does.
pub struct MmapArea {
    pub base: *mut u8,
    pub offset_frames: u64,
    pub frames: u64,
}

pub struct Device {
    handle: *mut snd_pcm_t,
    last_err: c_int,
}

unsafe impl Send for Device {}

impl Device {
    /// Open `device` for blocking playback and install exact hardware
    /// parameters (§4.1 startup steps 1–3). Any parameter the device
    /// cannot satisfy exactly aborts rather than negotiating a near value.
    pub fn open(device: &str, format: SampleFormat, sample_rate: u32, period_frames: u64, buffer_frames: u64) -> Result<Self> {
        let name = CString::new(device)
            .map_err(|_| Error::Precondition(format!("device name {device:?} contains a NUL byte")))?;

        let mut handle: *mut snd_pcm_t = ptr::null_mut();
        unsafe {
            check("snd_pcm_open", snd_pcm_open(&mut handle, name.as_ptr(), SND_PCM_STREAM_PLAYBACK, 0))?;
        }
        let mut dev = Device { handle, last_err: 0 };

        unsafe {
            let mut hw_params: *mut snd_pcm_hw_params_t = ptr::null_mut();
            check("snd_pcm_hw_params_malloc", snd_pcm_hw_params_malloc(&mut hw_params))?;
            let result = (|| -> Result<()> {
                check("snd_pcm_hw_params_any", snd_pcm_hw_params_any(dev.handle, hw_params))?;
                check(
                    "snd_pcm_hw_params_set_access",
                    snd_pcm_hw_params_set_access(dev.handle, hw_params, SND_PCM_ACCESS_MMAP_INTERLEAVED),
                )?;
                check(
                    "snd_pcm_hw_params_set_format",
                    snd_pcm_hw_params_set_format(dev.handle, hw_params, format.alsa_format()),
                )?;
                check(
                    "snd_pcm_hw_params_set_rate",
                    snd_pcm_hw_params_set_rate(dev.handle, hw_params, sample_rate, 0),
                )?;
                check(
                    "snd_pcm_hw_params_set_channels",
                    snd_pcm_hw_params_set_channels(dev.handle, hw_params, 2),
                )?;
                check(
                    "snd_pcm_hw_params_set_buffer_size",
                    snd_pcm_hw_params_set_buffer_size(dev.handle, hw_params, buffer_frames as snd_pcm_uframes_t),
                )?;
                check(
                    "snd_pcm_hw_params_set_period_size",
                    snd_pcm_hw_params_set_period_size(dev.handle, hw_params, period_frames as snd_pcm_uframes_t, 0),
                )?;
                check("snd_pcm_hw_params", snd_pcm_hw_params(dev.handle, hw_params))?;
                Ok(())
            })();
            snd_pcm_hw_params_free(hw_params);
            result?;

            check("snd_pcm_prepare", snd_pcm_prepare(dev.handle))?;
        }

        Ok(dev)
    }

    /// Request mapping coordinates for exactly `frames` frames. Aborts if
    /// the device cannot yield them contiguously (§4.1 startup step 8).
    pub fn mmap_begin(&mut self, frames: u64) -> Result<MmapArea> {
        let mut areas: *const snd_pcm_channel_area_t = ptr::null();
        let mut offset: snd_pcm_uframes_t = 0;
        let mut got_frames: snd_pcm_uframes_t = frames as snd_pcm_uframes_t;

        let rc = unsafe { snd_pcm_mmap_begin(self.handle, &mut areas, &mut offset, &mut got_frames) };
        if rc < 0 {
            return Err(Error::Device(format!("snd_pcm_mmap_begin failed: {}", alsa_strerror(rc as c_int))));
        }
        if got_frames < frames as snd_pcm_uframes_t {
            return Err(Error::Device(format!(
                "snd_pcm_mmap_begin yielded {got_frames} frames, needed {frames} contiguously"
            )));
        }

        let area = unsafe { *areas };
        let base = unsafe { (area.addr as *mut u8).add((area.first >> 3) as usize) };

        Ok(MmapArea { base, offset_frames: offset as u64, frames: got_frames as u64 })
    }

    pub fn mmap_commit(&mut self, offset: u64, frames: u64) -> Result<()> {
        let offset = offset as snd_pcm_uframes_t;
        let frames_native = frames as snd_pcm_uframes_t;
        let committed = unsafe { snd_pcm_mmap_commit(self.handle, offset, frames_native) };
        if committed < 0 || (committed as snd_pcm_uframes_t) != frames_native {
            return Err(Error::Device(format!(
                "snd_pcm_mmap_commit failed: {}",
                alsa_strerror(committed as c_int)
            )));
        }
        Ok(())
    }

    pub fn start(&mut self) -> Result<()> {
        unsafe { check("snd_pcm_start", snd_pcm_start(self.handle)) }
    }

    pub fn drain(&mut self) -> Result<()> {
        unsafe { check("snd_pcm_drain", snd_pcm_drain(self.handle)) }
    }

    /// Block on the device's poll descriptors until ≥1 period is writable
    /// (§4.1 "Wait semantics"): level-triggered, no timeout, no busy-wait.
    pub fn wait_for_space(&mut self) -> Result<()> {
        let rc = unsafe { snd_pcm_wait(self.handle, -1) };
        if rc < 0 {
            return Err(Error::Device(format!("snd_pcm_wait failed: {}", alsa_strerror(rc))));
        }
        Ok(())
    }

    /// Recover once from a mid-stream xrun (EPIPE) or suspend (ESTRPIPE),
    /// per §4.1/§7's single-retry policy. Returns `Ok` if recovered.
    pub fn recover(&mut self, err: c_int) -> Result<()> {
        let rc = unsafe { snd_pcm_recover(self.handle, err, 0) };
        if rc < 0 {
            return Err(Error::Device(format!(
                "xrun recovery failed after error {}: {}",
                alsa_strerror(err),
                alsa_strerror(rc)
            )));
        }
        Ok(())
    }

    pub fn is_xrun_error(err: c_int) -> bool {
        err == -EPIPE || err == -(libc::ESTRPIPE)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if !self.handle.is_null() {
            unsafe {
                snd_pcm_close(self.handle);
            }
        }
    }
}

fn check(call: &str, rc: c_int) -> Result<()> {
    if rc < 0 {
        Err(Error::Device(format!("{call} failed: {}", alsa_strerror(rc))))
    } else {
        Ok(())
    }
}

fn alsa_strerror(err: c_int) -> String {
    unsafe {
        let ptr = snd_strerror(err);
        if ptr.is_null() {
            format!("error {err}")
        } else {
            std::ffi::CStr::from_ptr(ptr).to_string_lossy().into_owned()
        }
    }
}
