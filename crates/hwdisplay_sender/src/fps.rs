//! FPS da aplicação em foco via RivaTuner Statistics Server (RTSS).
//!
//! O RTSS publica a memória compartilhada `RTSSSharedMemoryV2`:
//!
//! ```text
//! ┌──────────────────────────── header ─────────────────────────────┐
//! │ sig(4) │ ver(4) │ appEntrySize(4) │ appArrOffset(4) │ appArrSize(4) │ …
//! └─────────────────────────────────────────────────────────────────┘
//! app entry: pid(4) │ name[260] │ flags(4) │ time0(4) │ time1(4) │ frames(4) │ …
//! ```
//!
//! Sem RTSS (ou fora do Windows) o FPS é sempre 0.

#![cfg_attr(not(windows), allow(dead_code))]

use tracing::trace;

/// Fonte externa de taxa de quadros.
pub trait FrameRateSource {
    /// FPS instantâneo da aplicação em foco, 0 se nenhuma reporta quadros.
    fn current_fps(&mut self) -> i64;
}

/// Fonte nula: nenhum FPS disponível.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoFrameRate;

impl FrameRateSource for NoFrameRate {
    fn current_fps(&mut self) -> i64 {
        0
    }
}

impl<F: FrameRateSource + ?Sized> FrameRateSource for Box<F> {
    fn current_fps(&mut self) -> i64 {
        (**self).current_fps()
    }
}

/// 'RTSS' como DWORD little-endian.
const RTSS_SIGNATURE: u32 = 0x5254_5353;
/// Versão mínima com app entries no layout v2.
const RTSS_MIN_VERSION: u32 = 0x0002_0000;
/// Bits de uso de API gráfica (OpenGL, D3D*, Vulkan…).
const APPFLAG_API_USAGE_MASK: u32 = 0x0000_FFFF;

const HEADER_LEN: usize = 20;
const ENTRY_FLAGS: usize = 4 + 260;
const ENTRY_TIME0: usize = ENTRY_FLAGS + 4;
const ENTRY_TIME1: usize = ENTRY_TIME0 + 4;
const ENTRY_FRAMES: usize = ENTRY_TIME1 + 4;
const ENTRY_MIN_LEN: usize = ENTRY_FRAMES + 4;

fn read_u32(mem: &[u8], offset: usize) -> Option<u32> {
    let bytes = mem.get(offset..offset + 4)?;
    Some(u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

/// Tamanho total da região descrita pelo header (header + app entries).
pub fn rtss_region_len(header: &[u8]) -> Option<usize> {
    if read_u32(header, 0)? != RTSS_SIGNATURE || read_u32(header, 4)? < RTSS_MIN_VERSION {
        return None;
    }
    let entry_size = read_u32(header, 8)? as usize;
    let arr_offset = read_u32(header, 12)? as usize;
    let arr_size = read_u32(header, 16)? as usize;
    arr_offset.checked_add(entry_size.checked_mul(arr_size)?)
}

/// Extrai o FPS da memória compartilhada do RTSS.
///
/// Percorre as app entries com API gráfica ativa; a última com FPS
/// diferente de zero vence. `None` se o header for inválido.
pub fn parse_rtss_fps(mem: &[u8]) -> Option<i64> {
    rtss_region_len(mem)?;
    let entry_size = read_u32(mem, 8)? as usize;
    let arr_offset = read_u32(mem, 12)? as usize;
    let arr_size = read_u32(mem, 16)? as usize;
    if entry_size < ENTRY_MIN_LEN {
        return None;
    }

    let mut fps = 0;
    for i in 0..arr_size {
        let base = arr_offset + i * entry_size;
        let Some(entry) = mem.get(base..base + entry_size) else {
            break;
        };
        if read_u32(entry, 0)? == 0 {
            continue; // slot livre
        }
        let flags = read_u32(entry, ENTRY_FLAGS)?;
        if flags & APPFLAG_API_USAGE_MASK == 0 {
            continue;
        }
        let time0 = read_u32(entry, ENTRY_TIME0)?;
        let time1 = read_u32(entry, ENTRY_TIME1)?;
        let frames = read_u32(entry, ENTRY_FRAMES)?;
        let elapsed_ms = time1.wrapping_sub(time0);
        if elapsed_ms == 0 {
            continue;
        }
        let instant = 1000 * i64::from(frames) / i64::from(elapsed_ms);
        if instant != 0 {
            fps = instant;
        }
    }

    trace!("RTSS: {fps} fps");
    Some(fps)
}

// ──────────────────────────────────────────────
// Windows: leitura da memória compartilhada
// ──────────────────────────────────────────────

/// FPS via memória compartilhada do RTSS.
#[cfg(windows)]
#[derive(Debug, Default)]
pub struct RtssFrameRate;

#[cfg(windows)]
impl FrameRateSource for RtssFrameRate {
    fn current_fps(&mut self) -> i64 {
        shared_memory::read_fps().unwrap_or(0)
    }
}

#[cfg(windows)]
mod shared_memory {
    use super::{HEADER_LEN, parse_rtss_fps, rtss_region_len};
    use windows::Win32::Foundation::{CloseHandle, HANDLE};
    use windows::Win32::System::Memory::{
        FILE_MAP_READ, MEMORY_MAPPED_VIEW_ADDRESS, MapViewOfFile, OpenFileMappingW,
        UnmapViewOfFile,
    };
    use windows::core::w;

    /// View mapeada; desfeita no drop.
    struct MappedView {
        mapping: HANDLE,
        view: MEMORY_MAPPED_VIEW_ADDRESS,
    }

    impl Drop for MappedView {
        fn drop(&mut self) {
            unsafe {
                let _ = UnmapViewOfFile(self.view);
                let _ = CloseHandle(self.mapping);
            }
        }
    }

    pub(super) fn read_fps() -> Option<i64> {
        let mapped = unsafe {
            let mapping = OpenFileMappingW(FILE_MAP_READ.0, false, w!("RTSSSharedMemoryV2")).ok()?;
            let view = MapViewOfFile(mapping, FILE_MAP_READ, 0, 0, 0);
            if view.Value.is_null() {
                let _ = CloseHandle(mapping);
                return None;
            }
            MappedView { mapping, view }
        };

        let base = mapped.view.Value as *const u8;
        // SAFETY: a view tem pelo menos o header enquanto o RTSS estiver ativo,
        // e o tamanho restante vem do próprio header.
        let header = unsafe { std::slice::from_raw_parts(base, HEADER_LEN) };
        let len = rtss_region_len(header)?;
        let mem = unsafe { std::slice::from_raw_parts(base, len) };
        parse_rtss_fps(mem)
    }
}

// ──────────────────────────────────────────────
// Testes
// ──────────────────────────────────────────────
