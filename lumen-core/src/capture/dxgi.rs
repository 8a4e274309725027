//! DXGI Desktop Duplication screen source for Windows.
//!
//! Wraps the `IDXGIOutputDuplication` pipeline:
//!
//! 1. Create a D3D11 device.
//! 2. Enumerate outputs and duplicate the target monitor.
//! 3. Create a CPU-readable staging texture.
//! 4. On each [`capture`](ScreenSource::capture):
//!    - `AcquireNextFrame` (blocks up to `timeout_ms`).
//!    - Copy the desktop texture to the staging texture.
//!    - Map, memcpy into a `Vec<u8>`, unmap.
//!
//! Desktop Duplication only delivers a frame when something on screen
//! changed. On timeout the previous frame is handed out again, since
//! the screen still shows it.
//!
//! All unsafe FFI calls are confined to this module.

use std::time::Instant;

use windows::{
    Win32::Graphics::{
        Direct3D::D3D_DRIVER_TYPE_HARDWARE,
        Direct3D11::*,
        Dxgi::{Common::*, *},
    },
    core::Interface,
};

use crate::capture::ScreenSource;
use crate::error::LumenError;
use crate::frame::{PixelFormat, RawFrame, Resolution};

fn unavailable(what: &str, e: impl std::fmt::Display) -> LumenError {
    LumenError::CaptureUnavailable(format!("{what}: {e}"))
}

/// Desktop Duplication capturer for one monitor.
///
/// Not `Send`: open it on the capture thread, e.g. through
/// [`spawn_capture`](crate::capture::spawn_capture).
pub struct DxgiSource {
    width: u32,
    height: u32,
    timeout_ms: u32,
    context: ID3D11DeviceContext,
    duplication: IDXGIOutputDuplication,
    staging_texture: ID3D11Texture2D,
    /// Most recent frame, re-emitted when the desktop is idle.
    last: Option<RawFrame>,
    // Keeps the device alive for as long as the context is used.
    _device: ID3D11Device,
}

impl DxgiSource {
    /// Initialise the capturer for monitor `monitor_index` (0 = primary).
    pub fn new(monitor_index: u32, timeout_ms: u32) -> Result<Self, LumenError> {
        unsafe { Self::init_dxgi(monitor_index, timeout_ms) }
    }

    unsafe fn init_dxgi(monitor_index: u32, timeout_ms: u32) -> Result<Self, LumenError> {
        // 1. Create D3D11 device + immediate context.
        let mut device = None;
        let mut context = None;
        unsafe {
            D3D11CreateDevice(
                None,
                D3D_DRIVER_TYPE_HARDWARE,
                None,
                D3D11_CREATE_DEVICE_BGRA_SUPPORT,
                None,
                D3D11_SDK_VERSION,
                Some(&mut device),
                None,
                Some(&mut context),
            )
            .map_err(|e| unavailable("D3D11CreateDevice", e))?;
        }

        let device: ID3D11Device =
            device.ok_or_else(|| LumenError::CaptureUnavailable("D3D11 device is None".into()))?;
        let context = context
            .ok_or_else(|| LumenError::CaptureUnavailable("D3D11 context is None".into()))?;

        // 2. Device → Adapter → Output.
        let dxgi_device: IDXGIDevice = device
            .cast()
            .map_err(|e| unavailable("cast to IDXGIDevice", e))?;
        let adapter = unsafe { dxgi_device.GetAdapter() }.map_err(|e| unavailable("GetAdapter", e))?;
        let output: IDXGIOutput = unsafe { adapter.EnumOutputs(monitor_index) }
            .map_err(|e| unavailable(&format!("EnumOutputs({monitor_index})"), e))?;

        // 3. Duplicate the output.
        let output1: IDXGIOutput1 = output
            .cast()
            .map_err(|e| unavailable("cast to IDXGIOutput1", e))?;
        let duplication = unsafe { output1.DuplicateOutput(&device) }
            .map_err(|e| unavailable("DuplicateOutput", e))?;

        let dup_desc = unsafe { duplication.GetDesc() };
        let width = dup_desc.ModeDesc.Width;
        let height = dup_desc.ModeDesc.Height;

        // 4. CPU-readable staging texture.
        let staging_desc = D3D11_TEXTURE2D_DESC {
            Width: width,
            Height: height,
            MipLevels: 1,
            ArraySize: 1,
            Format: DXGI_FORMAT_B8G8R8A8_UNORM,
            SampleDesc: DXGI_SAMPLE_DESC {
                Count: 1,
                Quality: 0,
            },
            Usage: D3D11_USAGE_STAGING,
            BindFlags: 0,
            CPUAccessFlags: D3D11_CPU_ACCESS_READ.0 as u32,
            MiscFlags: 0,
        };

        let mut staging_texture = None;
        unsafe { device.CreateTexture2D(&staging_desc, None, Some(&mut staging_texture)) }
            .map_err(|e| unavailable("CreateTexture2D (staging)", e))?;
        let staging_texture = staging_texture
            .ok_or_else(|| LumenError::CaptureUnavailable("staging texture is None".into()))?;

        Ok(Self {
            width,
            height,
            timeout_ms,
            context,
            duplication,
            staging_texture,
            last: None,
            _device: device,
        })
    }

    unsafe fn acquire(&mut self) -> Result<Option<RawFrame>, LumenError> {
        let mut frame_info = DXGI_OUTDUPL_FRAME_INFO::default();
        let mut resource = None;

        match unsafe {
            self.duplication
                .AcquireNextFrame(self.timeout_ms, &mut frame_info, &mut resource)
        } {
            Ok(()) => {}
            Err(e) if e.code() == DXGI_ERROR_WAIT_TIMEOUT => return Ok(None),
            Err(e) => return Err(unavailable("AcquireNextFrame", e)),
        }

        let resource = resource
            .ok_or_else(|| LumenError::CaptureUnavailable("acquired resource is None".into()))?;

        let texture: ID3D11Texture2D = resource.cast().map_err(|e| {
            let _ = unsafe { self.duplication.ReleaseFrame() };
            unavailable("cast to ID3D11Texture2D", e)
        })?;

        unsafe { self.context.CopyResource(&self.staging_texture, &texture) };

        // Release the DXGI frame as early as possible.
        let _ = unsafe { self.duplication.ReleaseFrame() };

        let mut mapped = D3D11_MAPPED_SUBRESOURCE::default();
        unsafe {
            self.context
                .Map(&self.staging_texture, 0, D3D11_MAP_READ, 0, Some(&mut mapped))
        }
        .map_err(|e| unavailable("Map", e))?;

        let stride = mapped.RowPitch;
        let total_bytes = stride as usize * self.height as usize;
        let data =
            unsafe { std::slice::from_raw_parts(mapped.pData as *const u8, total_bytes) }.to_vec();

        unsafe { self.context.Unmap(&self.staging_texture, 0) };

        Ok(Some(RawFrame {
            width: self.width,
            height: self.height,
            stride,
            format: PixelFormat::Bgra8,
            data,
            sequence: 0,
            timestamp: Instant::now(),
        }))
    }
}

impl ScreenSource for DxgiSource {
    fn resolution(&self) -> Resolution {
        Resolution::new(self.width, self.height)
    }

    fn capture(&mut self) -> Result<RawFrame, LumenError> {
        match unsafe { self.acquire() }? {
            Some(frame) => {
                self.last = Some(frame.clone());
                Ok(frame)
            }
            None => self.last.clone().ok_or_else(|| {
                LumenError::CaptureUnavailable("no desktop frame delivered yet".into())
            }),
        }
    }
}
